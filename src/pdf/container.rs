//! Page-container capability used by the shrink chain

use crate::error::Result;

/// Read and rewrite access to a paged document.
///
/// Implementations must never mutate the input bytes; every call returns a
/// fresh serialization.
pub trait PageContainer: Send + Sync {
    /// Number of pages in the document
    fn page_count(&self, data: &[u8]) -> Result<u32>;

    /// Full read/rewrite pass keeping every page
    fn rewrite(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// New container holding only the first `pages` pages (clamped to the page count)
    fn rewrite_leading_pages(&self, data: &[u8], pages: u32) -> Result<Vec<u8>>;
}
