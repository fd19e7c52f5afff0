//! Source resolution for uploaded documents
//!
//! No header validation happens here: anything the caller uploads is handed
//! to the shrink chain, which degrades to truncation for unparseable input.

use crate::error::{Error, Result};
use base64::Engine;
use std::path::Path;

/// Resolved document payload
pub struct ResolvedDocument {
    pub data: Vec<u8>,
    /// File name carried by the source, if any
    pub filename: Option<String>,
    pub source_name: String,
}

fn check_size(size: u64, max_bytes: u64) -> Result<()> {
    if size > max_bytes {
        return Err(Error::UploadTooLarge {
            size,
            max_size: max_bytes,
        });
    }
    Ok(())
}

/// Resolve a file path to document data
pub fn resolve_path<P: AsRef<Path>>(path: P, max_bytes: u64) -> Result<ResolvedDocument> {
    let path = path.as_ref();

    let metadata = std::fs::metadata(path).map_err(|_| Error::PdfNotFound {
        path: path.display().to_string(),
    })?;
    if !metadata.is_file() {
        return Err(Error::PdfNotFound {
            path: path.display().to_string(),
        });
    }
    check_size(metadata.len(), max_bytes)?;

    let data = std::fs::read(path).map_err(Error::Io)?;

    Ok(ResolvedDocument {
        data,
        filename: path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned()),
        source_name: path.display().to_string(),
    })
}

/// Resolve base64 encoded data to document data
pub fn resolve_base64(base64_data: &str, max_bytes: u64) -> Result<ResolvedDocument> {
    // Decoded length is at most 3/4 of the encoded length
    check_size((base64_data.len() as u64 / 4) * 3, max_bytes)?;

    let engine = base64::engine::general_purpose::STANDARD;
    let data = engine.decode(base64_data.trim())?;

    Ok(ResolvedDocument {
        data,
        filename: None,
        source_name: "<base64>".to_string(),
    })
}
