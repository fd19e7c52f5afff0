//! qpdf FFI implementation of the page container
//!
//! Rewrites go through qpdf's writer with stream compression, generated
//! object streams and unreferenced objects dropped, which is where most of
//! the incidental size reduction on re-serialization comes from.

use crate::error::{Error, Result};
use crate::pdf::PageContainer;
use ::qpdf::{ObjectStreamMode, QPdf};

/// Page container backed by qpdf (vendored FFI)
#[derive(Debug, Clone, Copy, Default)]
pub struct QpdfContainer;

fn open_qpdf(data: &[u8]) -> Result<QPdf> {
    QPdf::read_from_memory(data).map_err(map_qpdf_error)
}

fn map_qpdf_error(e: ::qpdf::QPdfError) -> Error {
    Error::QpdfError {
        reason: e.to_string(),
    }
}

fn write_compact(qpdf: &QPdf) -> Result<Vec<u8>> {
    let mut writer = qpdf.writer();
    writer
        .object_stream_mode(ObjectStreamMode::Generate)
        .compress_streams(true)
        .preserve_unreferenced_objects(false)
        .preserve_encryption(false);
    writer.write_to_memory().map_err(map_qpdf_error)
}

impl PageContainer for QpdfContainer {
    fn page_count(&self, data: &[u8]) -> Result<u32> {
        let qpdf = open_qpdf(data)?;
        qpdf.get_num_pages().map_err(map_qpdf_error)
    }

    fn rewrite(&self, data: &[u8]) -> Result<Vec<u8>> {
        let qpdf = open_qpdf(data)?;
        write_compact(&qpdf)
    }

    fn rewrite_leading_pages(&self, data: &[u8], pages: u32) -> Result<Vec<u8>> {
        let source = open_qpdf(data)?;
        let num_pages = source.get_num_pages().map_err(map_qpdf_error)?;
        if num_pages == 0 {
            return Err(Error::QpdfError {
                reason: "PDF has no pages".to_string(),
            });
        }

        let dest = QPdf::empty();
        for idx in 0..pages.clamp(1, num_pages) {
            let page = source.get_page(idx).ok_or_else(|| Error::QpdfError {
                reason: format!("page {} missing (total: {})", idx + 1, num_pages),
            })?;
            let copied = dest.copy_from_foreign(&page);
            dest.add_page(&copied, false).map_err(map_qpdf_error)?;
        }

        write_compact(&dest)
    }
}
