//! Size-bounded strategy chain
//!
//! Tries progressively more destructive transformations until one fits the
//! byte budget:
//!
//! 1. unchanged copy when the document already fits
//! 2. full structural rewrite
//! 3. leading-page prefixes at 75%, 50%, 25% and 10% of the original page count
//! 4. raw truncation of the original bytes (output may no longer parse)
//! 5. unchanged copy as the absolute fallback
//!
//! A strategy failure is logged and the chain moves on. `produce` always
//! hands back bytes.

use crate::error::{Error, Result};
use crate::pdf::PageContainer;
use schemars::JsonSchema;
use serde::Serialize;
use std::sync::Arc;

/// Share of the original page count probed by page reduction, in order
pub const KEEP_PERCENTAGES: [u32; 4] = [75, 50, 25, 10];

/// Which strategy produced the output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Strategy {
    Unchanged,
    Rewrite,
    PageReduction {
        percent: u32,
        kept_pages: u32,
        total_pages: u32,
    },
    Truncation,
    Fallback,
}

impl Strategy {
    /// Whether the output is still a complete, structurally intact document
    pub fn preserves_structure(&self) -> bool {
        !matches!(self, Strategy::Truncation | Strategy::Fallback)
    }
}

/// Result of one chain run
#[derive(Debug, Clone)]
pub struct ShrinkOutcome {
    pub data: Vec<u8>,
    pub strategy: Strategy,
    /// Output length is at most the budget
    pub within_budget: bool,
}

impl ShrinkOutcome {
    /// True only when the output fits AND is a real (non-truncated) document
    pub fn succeeded(&self) -> bool {
        self.within_budget && self.strategy.preserves_structure()
    }

    pub fn is_best_attempt(&self) -> bool {
        !self.succeeded()
    }
}

/// Number of leading pages kept for a percentage of `total_pages`, never below 1
pub fn pages_to_keep(total_pages: u32, percent: u32) -> u32 {
    ((u64::from(total_pages) * u64::from(percent) / 100) as u32).max(1)
}

/// Ordered fallback of shrink strategies over a page container
#[derive(Clone)]
pub struct ShrinkChain {
    container: Arc<dyn PageContainer>,
}

impl ShrinkChain {
    pub fn new(container: Arc<dyn PageContainer>) -> Self {
        Self { container }
    }

    /// Shrink `document` to at most `target_bytes`, or return the best attempt.
    pub fn produce(&self, document: &[u8], target_bytes: u64) -> ShrinkOutcome {
        let original_size = document.len() as u64;
        tracing::info!(original_size, target_bytes, "starting shrink chain");

        if original_size <= target_bytes {
            tracing::info!("document already within target size");
            return ShrinkOutcome {
                data: document.to_vec(),
                strategy: Strategy::Unchanged,
                within_budget: true,
            };
        }

        match self.try_rewrite(document, target_bytes) {
            Ok(Some(outcome)) => return outcome,
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "structural rewrite failed"),
        }

        match self.try_page_reduction(document, target_bytes) {
            Ok(Some(outcome)) => return outcome,
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "page reduction failed"),
        }

        match truncate(document, target_bytes) {
            Ok(outcome) => return outcome,
            Err(e) => tracing::warn!(error = %e, "binary truncation failed"),
        }

        tracing::warn!("no strategy met the target size, returning the original");
        ShrinkOutcome {
            data: document.to_vec(),
            strategy: Strategy::Fallback,
            within_budget: original_size <= target_bytes,
        }
    }

    fn try_rewrite(&self, document: &[u8], target_bytes: u64) -> Result<Option<ShrinkOutcome>> {
        let rewritten = self.container.rewrite(document)?;
        let size = rewritten.len() as u64;
        tracing::info!(size, "structural rewrite result");

        if size <= target_bytes {
            return Ok(Some(ShrinkOutcome {
                data: rewritten,
                strategy: Strategy::Rewrite,
                within_budget: true,
            }));
        }
        Ok(None)
    }

    fn try_page_reduction(
        &self,
        document: &[u8],
        target_bytes: u64,
    ) -> Result<Option<ShrinkOutcome>> {
        let total_pages = self.container.page_count(document)?;
        if total_pages <= 1 {
            tracing::debug!(total_pages, "too few pages for page reduction");
            return Ok(None);
        }

        for percent in KEEP_PERCENTAGES {
            let kept_pages = pages_to_keep(total_pages, percent).min(total_pages);
            let reduced = self.container.rewrite_leading_pages(document, kept_pages)?;
            let size = reduced.len() as u64;
            tracing::info!(percent, kept_pages, total_pages, size, "page reduction result");

            if size <= target_bytes {
                return Ok(Some(ShrinkOutcome {
                    data: reduced,
                    strategy: Strategy::PageReduction {
                        percent,
                        kept_pages,
                        total_pages,
                    },
                    within_budget: true,
                }));
            }
        }
        Ok(None)
    }
}

/// Cut the original bytes down to exactly `min(len, target_bytes)`.
///
/// The result is generally not a parseable PDF any more.
pub fn truncate(document: &[u8], target_bytes: u64) -> Result<ShrinkOutcome> {
    let keep = usize::try_from(target_bytes)
        .unwrap_or(usize::MAX)
        .min(document.len());
    if keep == 0 && !document.is_empty() {
        return Err(Error::CompressionFailed {
            size: 0,
            target: target_bytes,
        });
    }
    tracing::info!(size = keep, "truncated to target size");
    Ok(ShrinkOutcome {
        data: document[..keep].to_vec(),
        strategy: Strategy::Truncation,
        within_budget: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    const HEADER: usize = 100;

    /// Container with uniform page weight; output size = header + pages * page_bytes
    struct UniformPages {
        pages: u32,
        page_bytes: usize,
        fail_rewrite: bool,
        fail_count: bool,
        calls: Mutex<Vec<String>>,
    }

    impl UniformPages {
        fn new(pages: u32, page_bytes: usize) -> Self {
            Self {
                pages,
                page_bytes,
                fail_rewrite: false,
                fail_count: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn render(&self, pages: u32) -> Vec<u8> {
            vec![b'p'; HEADER + pages as usize * self.page_bytes]
        }
    }

    impl PageContainer for UniformPages {
        fn page_count(&self, _data: &[u8]) -> Result<u32> {
            self.calls.lock().push("count".to_string());
            if self.fail_count {
                return Err(Error::QpdfError {
                    reason: "broken xref".to_string(),
                });
            }
            Ok(self.pages)
        }

        fn rewrite(&self, _data: &[u8]) -> Result<Vec<u8>> {
            self.calls.lock().push("rewrite".to_string());
            if self.fail_rewrite {
                return Err(Error::QpdfError {
                    reason: "broken xref".to_string(),
                });
            }
            Ok(self.render(self.pages))
        }

        fn rewrite_leading_pages(&self, _data: &[u8], pages: u32) -> Result<Vec<u8>> {
            self.calls.lock().push(format!("prefix:{}", pages));
            Ok(self.render(pages.min(self.pages)))
        }
    }

    fn chain(container: UniformPages) -> (ShrinkChain, Arc<UniformPages>) {
        let container = Arc::new(container);
        (ShrinkChain::new(container.clone()), container)
    }

    fn document(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_unchanged_when_within_budget() {
        let (chain, container) = chain(UniformPages::new(3, 10));
        let doc = document(500);

        let outcome = chain.produce(&doc, 500);
        assert_eq!(outcome.strategy, Strategy::Unchanged);
        assert_eq!(outcome.data, doc);
        assert!(outcome.succeeded());
        assert!(container.calls.lock().is_empty());
    }

    #[test]
    fn test_rewrite_accepted_when_it_fits() {
        // rewrite yields 100 + 4 * 50 = 300 bytes
        let (chain, container) = chain(UniformPages::new(4, 50));
        let outcome = chain.produce(&document(1000), 300);

        assert_eq!(outcome.strategy, Strategy::Rewrite);
        assert_eq!(outcome.data.len(), 300);
        assert!(outcome.succeeded());
        assert_eq!(*container.calls.lock(), vec!["rewrite".to_string()]);
    }

    #[test]
    fn test_page_reduction_picks_first_fitting_percentage() {
        // 10 pages of 30 KB; rewrite = 300 KB + header
        let (chain, container) = chain(UniformPages::new(10, 30 * 1024));
        let target = 100 * 1024;
        let outcome = chain.produce(&document(310 * 1024), target);

        // 75% -> 7 pages (210 KB), 50% -> 5 pages (150 KB), 25% -> 2 pages (60 KB)
        assert_eq!(
            outcome.strategy,
            Strategy::PageReduction {
                percent: 25,
                kept_pages: 2,
                total_pages: 10,
            }
        );
        assert!(outcome.data.len() as u64 <= target);
        assert!(outcome.succeeded());
        assert_eq!(
            *container.calls.lock(),
            vec![
                "rewrite".to_string(),
                "count".to_string(),
                "prefix:7".to_string(),
                "prefix:5".to_string(),
                "prefix:2".to_string(),
            ]
        );
    }

    #[test]
    fn test_page_reduction_keeps_at_least_one_page() {
        // 3 pages: 75% -> 2, 50% -> 1, 25% -> 1, 10% -> 1
        let (chain, container) = chain(UniformPages::new(3, 1000));
        let outcome = chain.produce(&document(5000), 500);

        assert_eq!(outcome.strategy, Strategy::Truncation);
        let calls = container.calls.lock();
        let prefixes: Vec<&String> = calls.iter().filter(|c| c.starts_with("prefix")).collect();
        assert_eq!(prefixes, vec!["prefix:2", "prefix:1", "prefix:1", "prefix:1"]);
    }

    #[test]
    fn test_single_page_skips_reduction_and_truncates() {
        let (chain, container) = chain(UniformPages::new(1, 50 * 1024));
        let doc = document(50 * 1024);
        let target = 10 * 1024;

        let outcome = chain.produce(&doc, target);
        assert_eq!(outcome.strategy, Strategy::Truncation);
        assert_eq!(outcome.data.len() as u64, target);
        assert_eq!(outcome.data, doc[..10 * 1024].to_vec());
        assert!(outcome.within_budget);
        assert!(outcome.is_best_attempt());
        assert!(!container
            .calls
            .lock()
            .iter()
            .any(|c| c.starts_with("prefix")));
    }

    #[test]
    fn test_strategy_failures_fall_through() {
        let mut container = UniformPages::new(5, 100);
        container.fail_rewrite = true;
        container.fail_count = true;
        let (chain, _) = chain(container);
        let doc = document(2000);

        let outcome = chain.produce(&doc, 64);
        assert_eq!(outcome.strategy, Strategy::Truncation);
        assert_eq!(outcome.data, doc[..64].to_vec());
    }

    #[test]
    fn test_fallback_when_budget_rounds_to_zero() {
        let mut container = UniformPages::new(1, 100);
        container.fail_rewrite = true;
        let (chain, _) = chain(container);
        let doc = document(300);

        let outcome = chain.produce(&doc, 0);
        assert_eq!(outcome.strategy, Strategy::Fallback);
        assert_eq!(outcome.data, doc);
        assert!(!outcome.within_budget);
        assert!(!outcome.succeeded());
    }

    #[test]
    fn test_output_never_empty_for_non_empty_input() {
        let (chain, _) = chain(UniformPages::new(8, 400));
        let doc = document(4000);
        for target in [0, 1, 17, 900, 3999, 4000, 10_000] {
            let outcome = chain.produce(&doc, target);
            assert!(!outcome.data.is_empty(), "empty output for target {}", target);
        }
    }

    #[test]
    fn test_pages_to_keep() {
        assert_eq!(pages_to_keep(10, 75), 7);
        assert_eq!(pages_to_keep(10, 10), 1);
        assert_eq!(pages_to_keep(4, 10), 1);
        assert_eq!(pages_to_keep(200, 25), 50);
    }

    #[test]
    fn test_truncate_exact_length() {
        let doc = document(1000);
        assert_eq!(truncate(&doc, 300).unwrap().data.len(), 300);
        assert_eq!(truncate(&doc, 5000).unwrap().data.len(), 1000);
        assert!(truncate(&doc, 0).is_err());
    }
}
