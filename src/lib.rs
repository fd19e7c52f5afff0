//! PDF Shrink Server Library
//!
//! This crate shrinks PDFs to a target byte size and tracks the results:
//! - `shrink`: ordered strategy chain (rewrite, page reduction, truncation)
//! - `registry`: task/artifact registry with deferred cleanup
//! - `server`: MCP tools `compress_pdf`, `download_compressed` and `discard_task`

pub mod error;
pub mod pdf;
pub mod registry;
pub mod server;
pub mod shrink;
pub mod source;

pub use error::{Error, ErrorKind, Result};
pub use registry::{ArtifactRegistry, RegistryConfig, RetrievedArtifact, TaskResult};
pub use server::{
    run_server, run_server_with_config, CompressPdfParams, CompressPdfResult,
    DownloadCompressedParams, DownloadCompressedResult, PdfShrinkServer, PdfSource, ServerConfig,
};
pub use shrink::{ShrinkChain, ShrinkOutcome, SizeUnit, Strategy, TargetSpec, TargetValue};
