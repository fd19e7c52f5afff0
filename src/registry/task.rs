//! Task bookkeeping

use crate::shrink::Strategy;
use schemars::JsonSchema;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;

/// One submission and the files it owns.
///
/// Only the registry holds these; storage paths never leave it.
#[derive(Debug, Clone)]
pub(crate) struct Task {
    pub filename: String,
    pub original_path: PathBuf,
    pub original_size: u64,
    pub derived: Option<DerivedArtifact>,
}

#[derive(Debug, Clone)]
pub(crate) struct DerivedArtifact {
    pub path: PathBuf,
    pub size: u64,
    /// When the chain finished; abandoned-task age counts from here
    pub recorded_at: Instant,
}

impl DerivedArtifact {
    pub fn new(path: PathBuf, size: u64) -> Self {
        Self {
            path,
            size,
            recorded_at: Instant::now(),
        }
    }
}

impl Task {
    pub fn new(filename: String, original_path: PathBuf, original_size: u64) -> Self {
        Self {
            filename,
            original_path,
            original_size,
            derived: None,
        }
    }

    /// Whether the derived artifact has been waiting at least `ttl`.
    /// Tasks whose chain is still running never qualify.
    pub fn is_abandoned(&self, ttl: Duration) -> bool {
        self.derived
            .as_ref()
            .is_some_and(|d| d.recorded_at.elapsed() >= ttl)
    }

    /// Every path this task owns, original first
    pub fn owned_paths(&self) -> Vec<&Path> {
        let mut paths = vec![self.original_path.as_path()];
        if let Some(derived) = &self.derived {
            paths.push(derived.path.as_path());
        }
        paths
    }
}

/// Submission result handed back to callers
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct TaskResult {
    pub task_id: String,
    pub filename: String,
    /// Original file size in bytes
    pub original_size: u64,
    /// Compressed file size in bytes
    pub compressed_size: u64,
    /// Percentage saved, two decimals, never negative
    pub compression_ratio: f64,
    /// Resolved byte budget
    pub target_bytes: u64,
    /// Whether the output fits the budget and is still a complete document
    pub target_met: bool,
    /// Strategy that produced the output
    pub strategy: Strategy,
}

/// `round(100 - derived / original * 100, 2)` clamped at zero; `0` for an empty original.
pub fn compression_ratio(original_size: u64, derived_size: u64) -> f64 {
    if original_size == 0 {
        return 0.0;
    }
    let ratio = 100.0 - (derived_size as f64 / original_size as f64 * 100.0);
    ((ratio * 100.0).round() / 100.0).max(0.0)
}
