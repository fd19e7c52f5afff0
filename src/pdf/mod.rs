//! PDF processing layer
//!
//! This module provides the page-container capability and its qpdf implementation.

mod container;
mod qpdf;

pub use self::container::PageContainer;
pub use self::qpdf::QpdfContainer;
