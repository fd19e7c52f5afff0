//! Task/artifact registry
//!
//! Maps task identifiers to the files they own, serves the derived artifact
//! and reclaims storage afterwards. The task map lock is never held across
//! file I/O.

use crate::error::{Error, Result};
use crate::registry::sanitize::sanitize_filename;
use crate::registry::task::{compression_ratio, DerivedArtifact, Task, TaskResult};
use crate::shrink::{ShrinkChain, TargetSpec};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const ORIGINAL_PREFIX: &str = "orig";
const DERIVED_PREFIX: &str = "compressed";

/// Registry settings
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Directory holding original and derived files
    pub storage_dir: PathBuf,
    /// Grace period between serving an artifact and deleting the task's files.
    /// Zero deletes right after the artifact has been read.
    pub cleanup_delay: Duration,
    /// Largest accepted document in bytes
    pub max_upload_bytes: u64,
    /// Surface best attempts as `CompressionFailed` instead of returning them
    pub strict_budget: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            storage_dir: std::env::temp_dir(),
            cleanup_delay: Duration::from_secs(5),
            max_upload_bytes: 500 * 1024 * 1024, // 500MB
            strict_budget: false,
        }
    }
}

/// Derived artifact read back for a caller
#[derive(Debug, Clone)]
pub struct RetrievedArtifact {
    pub data: Vec<u8>,
    /// Attachment name, distinguishable from the original filename
    pub download_name: String,
}

/// Registry of shrink tasks and their files
pub struct ArtifactRegistry {
    config: RegistryConfig,
    chain: ShrinkChain,
    tasks: Mutex<HashMap<String, Task>>,
    scheduled: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl ArtifactRegistry {
    pub fn new(config: RegistryConfig, chain: ShrinkChain) -> Self {
        Self {
            config,
            chain,
            tasks: Mutex::new(HashMap::new()),
            scheduled: Mutex::new(HashMap::new()),
        }
    }

    /// Persist a document, shrink it to the target and record both artifacts.
    pub async fn submit(
        &self,
        document: Option<Vec<u8>>,
        filename: Option<&str>,
        target: &TargetSpec,
    ) -> Result<TaskResult> {
        let document = document.ok_or(Error::NoFile)?;
        let filename = sanitize_filename(filename)?;
        let target_bytes = target.resolve_bytes()?;

        let size = document.len() as u64;
        if size > self.config.max_upload_bytes {
            return Err(Error::UploadTooLarge {
                size,
                max_size: self.config.max_upload_bytes,
            });
        }

        let (task_id, original_path) = self.insert_task(&filename, size);
        tracing::info!(task_id = %task_id, filename = %filename, size, target_bytes, "task submitted");

        match self
            .run_task(&task_id, &filename, &original_path, document, target_bytes)
            .await
        {
            Ok(result) => Ok(result),
            Err(e) => {
                tracing::error!(task_id = %task_id, error = %e, "submission failed");
                self.cleanup(&task_id).await;
                Err(e)
            }
        }
    }

    fn insert_task(&self, filename: &str, size: u64) -> (String, PathBuf) {
        let mut tasks = self.tasks.lock();
        let task_id = loop {
            let key = uuid::Uuid::new_v4().to_string();
            if !tasks.contains_key(&key) {
                break key;
            }
        };
        let original_path = self.task_path(ORIGINAL_PREFIX, &task_id, filename);
        tasks.insert(
            task_id.clone(),
            Task::new(filename.to_string(), original_path.clone(), size),
        );
        (task_id, original_path)
    }

    fn task_path(&self, prefix: &str, task_id: &str, filename: &str) -> PathBuf {
        self.config
            .storage_dir
            .join(format!("{}_{}_{}", prefix, task_id, filename))
    }

    async fn run_task(
        &self,
        task_id: &str,
        filename: &str,
        original_path: &Path,
        document: Vec<u8>,
        target_bytes: u64,
    ) -> Result<TaskResult> {
        tokio::fs::create_dir_all(&self.config.storage_dir).await?;
        tokio::fs::write(original_path, &document).await?;
        let original_size = document.len() as u64;

        let chain = self.chain.clone();
        let outcome = tokio::task::spawn_blocking(move || chain.produce(&document, target_bytes))
            .await
            .map_err(|e| Error::TaskJoin {
                reason: e.to_string(),
            })?;

        let derived_size = outcome.data.len() as u64;
        if outcome.is_best_attempt() {
            tracing::warn!(
                task_id = %task_id,
                strategy = ?outcome.strategy,
                derived_size,
                target_bytes,
                "target not met, keeping best attempt"
            );
            if self.config.strict_budget {
                return Err(Error::CompressionFailed {
                    size: derived_size,
                    target: target_bytes,
                });
            }
        }

        let derived_path = self.task_path(DERIVED_PREFIX, task_id, filename);
        tokio::fs::write(&derived_path, &outcome.data).await?;

        let recorded = match self.tasks.lock().get_mut(task_id) {
            Some(task) => {
                task.derived = Some(DerivedArtifact::new(derived_path.clone(), derived_size));
                true
            }
            None => false,
        };
        if !recorded {
            // Task was discarded while the chain ran
            remove_owned_file(&derived_path).await;
            return Err(Error::TaskNotFound {
                task_id: task_id.to_string(),
            });
        }

        let compression_ratio = compression_ratio(original_size, derived_size);
        tracing::info!(
            task_id = %task_id,
            strategy = ?outcome.strategy,
            original_size,
            derived_size,
            compression_ratio,
            "task completed"
        );

        Ok(TaskResult {
            task_id: task_id.to_string(),
            filename: filename.to_string(),
            original_size,
            compressed_size: derived_size,
            compression_ratio,
            target_bytes,
            target_met: outcome.succeeded(),
            strategy: outcome.strategy,
        })
    }

    /// Read back the derived artifact of a task and schedule its cleanup.
    pub async fn retrieve(
        self: &Arc<Self>,
        task_id: &str,
        filename: &str,
    ) -> Result<RetrievedArtifact> {
        let result = self.fetch(task_id, filename).await;
        if !matches!(result, Err(Error::TaskNotFound { .. })) {
            self.schedule_cleanup(task_id).await;
        }
        result
    }

    /// Read back the derived artifact of a task without touching its lifecycle.
    ///
    /// The path comes from the task's own derived-artifact record; the
    /// requested filename only shapes the download name.
    pub async fn fetch(&self, task_id: &str, filename: &str) -> Result<RetrievedArtifact> {
        let (derived, original_size, fallback_name) = {
            let tasks = self.tasks.lock();
            let task = tasks.get(task_id).ok_or_else(|| Error::TaskNotFound {
                task_id: task_id.to_string(),
            })?;
            (task.derived.clone(), task.original_size, task.filename.clone())
        };

        match derived {
            Some(derived) => {
                tracing::info!(
                    task_id = %task_id,
                    original_size,
                    compressed_size = derived.size,
                    "retrieving compressed artifact"
                );
                self.read_artifact(task_id, &derived.path, filename, fallback_name)
                    .await
            }
            None => {
                tracing::error!(task_id = %task_id, "no compressed artifact recorded");
                Err(Error::ArtifactMissing {
                    task_id: task_id.to_string(),
                })
            }
        }
    }

    async fn read_artifact(
        &self,
        task_id: &str,
        path: &Path,
        filename: &str,
        fallback_name: String,
    ) -> Result<RetrievedArtifact> {
        let data = tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                Error::ArtifactMissing {
                    task_id: task_id.to_string(),
                }
            } else {
                Error::Io(e)
            }
        })?;

        let name = sanitize_filename(Some(filename)).unwrap_or(fallback_name);
        let download_name = format!("{}_{}", DERIVED_PREFIX, name);
        tracing::info!(task_id = %task_id, size = data.len(), download_name = %download_name, "serving compressed artifact");

        Ok(RetrievedArtifact {
            data,
            download_name,
        })
    }

    /// Schedule removal of a task's files after the configured delay.
    ///
    /// Rescheduling replaces (and cancels) a pending timer for the same task.
    pub async fn schedule_cleanup(self: &Arc<Self>, task_id: &str) {
        let delay = self.config.cleanup_delay;
        if delay.is_zero() {
            self.cleanup(task_id).await;
            return;
        }

        let mut scheduled = self.scheduled.lock();
        let registry = Arc::clone(self);
        let id = task_id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            registry.cleanup(&id).await;
        });
        if let Some(previous) = scheduled.insert(task_id.to_string(), handle) {
            previous.abort();
        }
        tracing::debug!(task_id = %task_id, delay_ms = delay.as_millis() as u64, "cleanup scheduled");
    }

    /// Cancel a pending cleanup timer. Returns whether one was pending.
    pub fn cancel_scheduled_cleanup(&self, task_id: &str) -> bool {
        match self.scheduled.lock().remove(task_id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Remove every file owned by a task and evict it.
    ///
    /// Idempotent; returns the number of files actually deleted.
    pub async fn cleanup(&self, task_id: &str) -> usize {
        // Dropping the handle detaches the timer rather than aborting it,
        // which matters when the timer itself is the caller.
        self.scheduled.lock().remove(task_id);

        let task = self.tasks.lock().remove(task_id);
        let Some(task) = task else {
            tracing::debug!(task_id = %task_id, "cleanup: task already gone");
            return 0;
        };

        let mut removed = 0;
        for path in task.owned_paths() {
            if remove_owned_file(path).await {
                removed += 1;
            }
        }
        tracing::info!(task_id = %task_id, removed, "task cleaned up");
        removed
    }

    /// Clean up tasks whose artifact has waited at least `ttl` with no
    /// cleanup pending. Submissions still in the chain are left alone.
    pub async fn sweep_abandoned(&self, ttl: Duration) -> Vec<String> {
        let stale: Vec<String> = {
            let tasks = self.tasks.lock();
            let scheduled = self.scheduled.lock();
            tasks
                .iter()
                .filter(|(id, task)| task.is_abandoned(ttl) && !scheduled.contains_key(id.as_str()))
                .map(|(id, _)| id.clone())
                .collect()
        };

        for task_id in &stale {
            tracing::info!(task_id = %task_id, "reclaiming abandoned task");
            self.cleanup(task_id).await;
        }
        stale
    }

    /// Run `sweep_abandoned` every `interval` until the handle is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration, ttl: Duration) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                registry.sweep_abandoned(ttl).await;
            }
        })
    }

    /// Cancel pending timers and remove every task's files.
    pub async fn purge_all(&self) -> usize {
        let handles: Vec<JoinHandle<()>> =
            self.scheduled.lock().drain().map(|(_, h)| h).collect();
        for handle in handles {
            handle.abort();
        }

        let ids: Vec<String> = self.tasks.lock().keys().cloned().collect();
        let mut removed = 0;
        for task_id in ids {
            removed += self.cleanup(&task_id).await;
        }
        removed
    }

    /// Check if a task is registered
    pub fn contains(&self, task_id: &str) -> bool {
        self.tasks.lock().contains_key(task_id)
    }

    /// Check if a cleanup timer is pending for a task
    pub fn is_cleanup_scheduled(&self, task_id: &str) -> bool {
        self.scheduled.lock().contains_key(task_id)
    }

    /// Get the number of registered tasks
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    #[cfg(test)]
    pub(crate) fn owned_paths(&self, task_id: &str) -> Vec<PathBuf> {
        self.tasks
            .lock()
            .get(task_id)
            .map(|t| t.owned_paths().into_iter().map(Path::to_path_buf).collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn forget_artifact(&self, task_id: &str) {
        if let Some(task) = self.tasks.lock().get_mut(task_id) {
            task.derived = None;
        }
    }
}

/// Delete a file, treating "already gone" as fine. Returns whether it was deleted.
async fn remove_owned_file(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "file already removed");
            false
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "error removing file");
            false
        }
    }
}
