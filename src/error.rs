//! Error types for PDF Shrink Server

use thiserror::Error;

/// Result type alias for PDF Shrink Server
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error classes surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad caller input, rejected before anything is persisted
    Input,
    /// Unknown task or a task without a derived artifact
    NotFound,
    /// Disk read/write/removal failure
    TransientIo,
    /// Every strategy ran and none met the budget
    CompressionExhausted,
    /// Anything else that went wrong inside the server
    Internal,
}

/// Error types for PDF Shrink Server
#[derive(Error, Debug)]
pub enum Error {
    /// No document payload was supplied
    #[error("No file supplied")]
    NoFile,

    /// Filename was absent or empty after sanitizing
    #[error("Invalid filename: {name:?}")]
    InvalidFilename { name: String },

    /// Target size could not be parsed as a positive number of a known unit
    #[error("Invalid target size: {value}")]
    InvalidTarget { value: String },

    /// Upload exceeds the configured limit
    #[error("Upload too large: {size} bytes (max: {max_size} bytes)")]
    UploadTooLarge { size: u64, max_size: u64 },

    /// Source PDF file not found
    #[error("PDF not found: {path}")]
    PdfNotFound { path: String },

    /// Path access denied (outside allowed resource directories)
    #[error("Path access denied: {path}")]
    PathAccessDenied { path: String },

    /// Base64 decode error
    #[error("Invalid base64 data: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// Task identifier is not known to the registry
    #[error("Task not found: {task_id}")]
    TaskNotFound { task_id: String },

    /// Task exists but holds no derived artifact
    #[error("Compressed artifact missing for task {task_id}")]
    ArtifactMissing { task_id: String },

    /// Strict budget mode and the chain only produced a best attempt
    #[error("Failed to compress to target size: {size} bytes (target: {target} bytes)")]
    CompressionFailed { size: u64, target: u64 },

    /// qpdf error
    #[error("qpdf error: {reason}")]
    QpdfError { reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Blocking worker panicked or was cancelled
    #[error("Task join error: {reason}")]
    TaskJoin { reason: String },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NoFile
            | Error::InvalidFilename { .. }
            | Error::InvalidTarget { .. }
            | Error::UploadTooLarge { .. }
            | Error::PdfNotFound { .. }
            | Error::PathAccessDenied { .. }
            | Error::Base64Decode(_) => ErrorKind::Input,
            Error::TaskNotFound { .. } | Error::ArtifactMissing { .. } => ErrorKind::NotFound,
            Error::Io(_) => ErrorKind::TransientIo,
            Error::CompressionFailed { .. } => ErrorKind::CompressionExhausted,
            Error::QpdfError { .. } | Error::TaskJoin { .. } => ErrorKind::Internal,
        }
    }

    /// HTTP-style status class for this error
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Input | ErrorKind::CompressionExhausted => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::TransientIo | ErrorKind::Internal => 500,
        }
    }

    /// Return a sanitized error message safe to send to clients.
    /// Internal details (paths, library errors) are omitted.
    /// Full details should be logged via tracing before calling this.
    pub fn client_message(&self) -> String {
        match self {
            Error::NoFile => "No file supplied".to_string(),
            Error::InvalidFilename { .. } => "No selected file".to_string(),
            Error::InvalidTarget { .. } => "Invalid target size".to_string(),
            Error::UploadTooLarge { max_size, .. } => {
                format!("Upload exceeds maximum size of {} bytes", max_size)
            }
            Error::PdfNotFound { .. } => "PDF not found".to_string(),
            Error::PathAccessDenied { .. } => "Access denied".to_string(),
            Error::Base64Decode(_) => "Invalid base64 data".to_string(),
            Error::TaskNotFound { .. } => "File not found".to_string(),
            Error::ArtifactMissing { .. } => "Compressed file not found".to_string(),
            Error::CompressionFailed { .. } => "Failed to compress to target size".to_string(),
            Error::QpdfError { .. } => "PDF processing error".to_string(),
            Error::Io(_) => "I/O error".to_string(),
            Error::TaskJoin { .. } => "Internal error".to_string(),
        }
    }
}
