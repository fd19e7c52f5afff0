//! MCP Server implementation using rmcp

use crate::pdf::QpdfContainer;
use crate::registry::{ArtifactRegistry, RegistryConfig, TaskResult};
use crate::shrink::{ShrinkChain, SizeUnit, Strategy, TargetSpec, TargetValue};
use crate::source::{resolve_base64, resolve_path, ResolvedDocument};
use anyhow::{Context, Result};
use base64::Engine;
use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters, model::*,
    schemars::JsonSchema, tool, tool_handler, tool_router, ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Cache headers attached to every served artifact
pub const CACHE_CONTROL: &str = "no-cache, no-store, must-revalidate";
pub const PRAGMA: &str = "no-cache";
pub const EXPIRES: &str = "0";

/// Document source
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum PdfSource {
    /// File path (absolute or relative)
    Path {
        /// Path to the PDF file
        path: String,
    },
    /// Base64 encoded PDF data
    Base64 {
        /// Base64 encoded PDF content
        base64: String,
    },
}

impl<'de> serde::Deserialize<'de> for PdfSource {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;

        if let Some(obj) = value.as_object() {
            if let Some(v) = obj.get("path") {
                if let Some(s) = v.as_str() {
                    return Ok(PdfSource::Path {
                        path: s.to_string(),
                    });
                }
                return Err(serde::de::Error::custom("\"path\" must be a string"));
            }
            if let Some(v) = obj.get("base64") {
                if let Some(s) = v.as_str() {
                    return Ok(PdfSource::Base64 {
                        base64: s.to_string(),
                    });
                }
                return Err(serde::de::Error::custom("\"base64\" must be a string"));
            }
            let keys: Vec<&String> = obj.keys().collect();
            Err(serde::de::Error::custom(format!(
                "Invalid source: expected an object with one of \"path\" or \"base64\", but got keys: {:?}",
                keys
            )))
        } else {
            Err(serde::de::Error::custom(
                "Invalid source: expected an object with one of \"path\" or \"base64\"",
            ))
        }
    }
}

/// Storage, cleanup and sandbox configuration for the PDF Shrink Server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directories that path sources and output paths must live in (empty: no restriction)
    pub resource_dirs: Vec<String>,
    /// Directory holding task files (default: OS temp dir)
    pub storage_dir: PathBuf,
    /// Delay between serving an artifact and deleting its task (default: 5s)
    pub cleanup_delay: Duration,
    /// Age after completion at which never-retrieved tasks are reclaimed (default: 1h)
    pub abandoned_task_ttl: Duration,
    /// How often abandoned tasks are swept (default: 60s)
    pub sweep_interval: Duration,
    /// Maximum accepted document size in bytes (default: 500MB)
    pub max_upload_bytes: u64,
    /// Reject best-attempt results instead of returning them (default: false)
    pub strict_budget: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let registry = RegistryConfig::default();
        Self {
            resource_dirs: Vec::new(),
            storage_dir: registry.storage_dir,
            cleanup_delay: registry.cleanup_delay,
            abandoned_task_ttl: Duration::from_secs(60 * 60),
            sweep_interval: Duration::from_secs(60),
            max_upload_bytes: registry.max_upload_bytes,
            strict_budget: registry.strict_budget,
        }
    }
}

fn parse_secs(key: &str, raw: &str) -> Result<Duration> {
    let secs: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{} must be a whole number of seconds", key))?;
    Ok(Duration::from_secs(secs))
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("{} must be a boolean, got {:?}", key, other),
    }
}

impl ServerConfig {
    /// Build a configuration from `PDF_SHRINK_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup("PDF_SHRINK_STORAGE_DIR") {
            config.storage_dir = PathBuf::from(dir);
        }
        if let Some(dirs) = lookup("PDF_SHRINK_RESOURCE_DIRS") {
            config.resource_dirs = std::env::split_paths(&dirs)
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| p.to_string_lossy().into_owned())
                .collect();
        }
        if let Some(raw) = lookup("PDF_SHRINK_CLEANUP_DELAY_SECS") {
            config.cleanup_delay = parse_secs("PDF_SHRINK_CLEANUP_DELAY_SECS", &raw)?;
        }
        if let Some(raw) = lookup("PDF_SHRINK_TASK_TTL_SECS") {
            config.abandoned_task_ttl = parse_secs("PDF_SHRINK_TASK_TTL_SECS", &raw)?;
        }
        if let Some(raw) = lookup("PDF_SHRINK_MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = raw
                .trim()
                .parse()
                .context("PDF_SHRINK_MAX_UPLOAD_BYTES must be a byte count")?;
        }
        if let Some(raw) = lookup("PDF_SHRINK_STRICT_BUDGET") {
            config.strict_budget = parse_flag("PDF_SHRINK_STRICT_BUDGET", &raw)?;
        }

        Ok(config)
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            storage_dir: self.storage_dir.clone(),
            cleanup_delay: self.cleanup_delay,
            max_upload_bytes: self.max_upload_bytes,
            strict_budget: self.strict_budget,
        }
    }
}

/// PDF Shrink MCP Server
#[derive(Clone)]
pub struct PdfShrinkServer {
    registry: Arc<ArtifactRegistry>,
    tool_router: ToolRouter<Self>,
    /// Server configuration
    config: Arc<ServerConfig>,
}

// ============================================================================
// Request/Response types for compress_pdf
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CompressPdfParams {
    /// Source PDF to shrink
    pub source: PdfSource,
    /// Target size value (number or numeric string), interpreted in `size_unit`
    pub target_size: TargetValue,
    /// Unit of target_size: "KB" or "MB" (default: "MB")
    #[serde(default)]
    pub size_unit: SizeUnit,
    /// Display filename. Defaults to the file name of a path source; required for base64.
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct CompressPdfResult {
    /// Source identifier
    pub source: String,
    /// Task identifier to pass to download_compressed
    pub task_id: String,
    /// Sanitized filename
    pub filename: String,
    /// Original file size in bytes
    pub original_size: u64,
    /// Compressed file size in bytes
    pub compressed_size: u64,
    /// Percentage saved (two decimals)
    pub compression_ratio: f64,
    /// Resolved target in bytes
    pub target_bytes: u64,
    /// Whether the output fits the target and is still a complete PDF
    pub target_met: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// HTTP-style status class of the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl CompressPdfResult {
    fn completed(source: String, task: TaskResult) -> Self {
        Self {
            source,
            task_id: task.task_id,
            filename: task.filename,
            original_size: task.original_size,
            compressed_size: task.compressed_size,
            compression_ratio: task.compression_ratio,
            target_bytes: task.target_bytes,
            target_met: task.target_met,
            strategy: Some(task.strategy),
            error: None,
            status: None,
        }
    }

    fn failed(source: String, error: &crate::error::Error) -> Self {
        Self {
            source,
            task_id: String::new(),
            filename: String::new(),
            original_size: 0,
            compressed_size: 0,
            compression_ratio: 0.0,
            target_bytes: 0,
            target_met: false,
            strategy: None,
            error: Some(error.client_message()),
            status: Some(error.status_code()),
        }
    }
}

// ============================================================================
// Request/Response types for download_compressed
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DownloadCompressedParams {
    /// Task identifier returned by compress_pdf
    pub task_id: String,
    /// Filename used for the download name only
    pub filename: String,
    /// Output file path (optional). If provided, saves the compressed PDF there instead of returning base64.
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct DownloadCompressedResult {
    pub task_id: String,
    /// Attachment name, prefixed to distinguish it from the original
    pub download_name: String,
    /// Size of the compressed PDF in bytes
    pub size: u64,
    pub cache_control: String,
    pub pragma: String,
    pub expires: String,
    /// Base64 encoded compressed PDF (when no output_path was given)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

// ============================================================================
// Request/Response types for discard_task
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DiscardTaskParams {
    /// Task identifier returned by compress_pdf
    pub task_id: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct DiscardTaskResult {
    pub task_id: String,
    /// Number of files deleted (0 when the task was already gone)
    pub removed_files: usize,
}

// ============================================================================
// Tool implementations
// ============================================================================

#[tool_router]
impl PdfShrinkServer {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    /// Create a new PdfShrinkServer with full configuration
    pub fn with_config(config: ServerConfig) -> Self {
        let chain = ShrinkChain::new(Arc::new(QpdfContainer));
        let registry = ArtifactRegistry::new(config.registry_config(), chain);
        Self {
            registry: Arc::new(registry),
            tool_router: Self::tool_router(),
            config: Arc::new(config),
        }
    }

    /// Shrink a PDF to a target size
    #[tool(
        description = "Shrink a PDF to at most a target size. Tries, in order: unchanged copy if it already fits, a structural rewrite, keeping the leading 75/50/25/10% of pages, and finally truncating raw bytes (the result may no longer be a valid PDF; target_met is false in that case).

target_size is read in size_unit (\"KB\" or \"MB\", default \"MB\").
Returns a task_id for download_compressed.

Source format: must be one of {\"path\": \"/absolute/path.pdf\"} or {\"base64\": \"...\"}"
    )]
    async fn compress_pdf(&self, Parameters(params): Parameters<CompressPdfParams>) -> String {
        let source = Self::source_name(&params.source);
        let result = match self.process_compress_pdf(&params).await {
            Ok(task) => CompressPdfResult::completed(source, task),
            Err(e) => {
                tracing::warn!(error = %e, "compress_pdf failed");
                CompressPdfResult::failed(source, &e)
            }
        };

        let response = serde_json::json!({ "results": [result] });
        serde_json::to_string_pretty(&response).unwrap_or_default()
    }

    /// Download the compressed PDF of a task
    #[tool(
        description = "Download the compressed PDF produced by compress_pdf. The files of the task are deleted shortly after, so download once.

Returns base64 data, or writes to output_path when given. The download name is compressed_<filename>."
    )]
    async fn download_compressed(
        &self,
        Parameters(params): Parameters<DownloadCompressedParams>,
    ) -> String {
        let result = self
            .process_download_compressed(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, task_id = %params.task_id, "download_compressed failed");
                DownloadCompressedResult {
                    task_id: params.task_id.clone(),
                    download_name: String::new(),
                    size: 0,
                    cache_control: CACHE_CONTROL.to_string(),
                    pragma: PRAGMA.to_string(),
                    expires: EXPIRES.to_string(),
                    data_base64: None,
                    output_path: None,
                    error: Some(e.client_message()),
                    status: Some(e.status_code()),
                }
            });

        let response = serde_json::json!({ "results": [result] });
        serde_json::to_string_pretty(&response).unwrap_or_default()
    }

    /// Discard a task and its files
    #[tool(description = "Discard a compression task and delete its files without downloading. Safe to call repeatedly.")]
    async fn discard_task(&self, Parameters(params): Parameters<DiscardTaskParams>) -> String {
        self.registry.cancel_scheduled_cleanup(&params.task_id);
        let removed_files = self.registry.cleanup(&params.task_id).await;
        let result = DiscardTaskResult {
            task_id: params.task_id,
            removed_files,
        };

        let response = serde_json::json!({ "results": [result] });
        serde_json::to_string_pretty(&response).unwrap_or_default()
    }
}

impl PdfShrinkServer {
    /// Shared handle to the task registry
    pub fn registry(&self) -> Arc<ArtifactRegistry> {
        Arc::clone(&self.registry)
    }

    fn source_name(source: &PdfSource) -> String {
        match source {
            PdfSource::Path { path } => path.clone(),
            PdfSource::Base64 { .. } => "<base64>".to_string(),
        }
    }

    fn resolve_source(&self, source: &PdfSource) -> crate::error::Result<ResolvedDocument> {
        match source {
            PdfSource::Path { path } => {
                let path = self.validate_path_access(path)?;
                resolve_path(path, self.config.max_upload_bytes)
            }
            PdfSource::Base64 { base64 } => resolve_base64(base64, self.config.max_upload_bytes),
        }
    }

    /// Validate that a path is within allowed resource directories.
    /// If no resource_dirs are configured, all paths are allowed.
    fn validate_path_access(&self, path: &str) -> crate::error::Result<PathBuf> {
        if self.config.resource_dirs.is_empty() {
            return Ok(PathBuf::from(path));
        }

        let canonical = std::fs::canonicalize(path).map_err(|_| {
            crate::error::Error::PathAccessDenied {
                path: path.to_string(),
            }
        })?;

        for dir in &self.config.resource_dirs {
            if let Ok(canonical_dir) = std::fs::canonicalize(dir) {
                if canonical.starts_with(&canonical_dir) {
                    return Ok(canonical);
                }
            }
        }

        Err(crate::error::Error::PathAccessDenied {
            path: path.to_string(),
        })
    }

    /// Validate that an output path is within allowed resource directories.
    /// Canonicalizes the parent directory since the output file may not exist yet.
    fn validate_output_path_access(&self, path: &str) -> crate::error::Result<PathBuf> {
        if self.config.resource_dirs.is_empty() {
            return Ok(PathBuf::from(path));
        }

        let path_obj = Path::new(path);
        let parent = path_obj.parent().unwrap_or(Path::new("."));

        let canonical_parent = std::fs::canonicalize(parent).map_err(|_| {
            crate::error::Error::PathAccessDenied {
                path: path.to_string(),
            }
        })?;

        let canonical_target =
            canonical_parent.join(path_obj.file_name().unwrap_or(std::ffi::OsStr::new("")));

        for dir in &self.config.resource_dirs {
            if let Ok(canonical_dir) = std::fs::canonicalize(dir) {
                if canonical_target.starts_with(&canonical_dir) {
                    return Ok(canonical_target);
                }
            }
        }

        Err(crate::error::Error::PathAccessDenied {
            path: path.to_string(),
        })
    }

    /// Write output data to a file path, with sandbox validation.
    async fn write_output(&self, path_str: &str, data: &[u8]) -> crate::error::Result<String> {
        let path = self.validate_output_path_access(path_str)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        tokio::fs::write(&path, data).await?;
        Ok(path_str.to_string())
    }

    pub async fn process_compress_pdf(
        &self,
        params: &CompressPdfParams,
    ) -> crate::error::Result<TaskResult> {
        let resolved = self.resolve_source(&params.source)?;
        let filename = params.filename.clone().or(resolved.filename);
        let target = TargetSpec {
            value: params.target_size.clone(),
            unit: params.size_unit,
        };

        tracing::info!(
            source = %resolved.source_name,
            size = resolved.data.len(),
            unit = %params.size_unit,
            "compress request"
        );

        self.registry
            .submit(Some(resolved.data), filename.as_deref(), &target)
            .await
    }

    pub async fn process_download_compressed(
        &self,
        params: &DownloadCompressedParams,
    ) -> crate::error::Result<DownloadCompressedResult> {
        // Validate the destination before retrieval starts the cleanup clock
        if let Some(path) = &params.output_path {
            self.validate_output_path_access(path)?;
        }

        let (artifact, data_base64, output_path) = match &params.output_path {
            Some(path) => {
                // Cleanup starts only once the file is on disk so a failed
                // write can be retried
                let artifact = self
                    .registry
                    .fetch(&params.task_id, &params.filename)
                    .await;
                let artifact = match artifact {
                    Ok(artifact) => artifact,
                    Err(e) => {
                        if !matches!(e, crate::error::Error::TaskNotFound { .. }) {
                            self.registry.schedule_cleanup(&params.task_id).await;
                        }
                        return Err(e);
                    }
                };
                let written = self.write_output(path, &artifact.data).await?;
                self.registry.schedule_cleanup(&params.task_id).await;
                (artifact, None, Some(written))
            }
            None => {
                let artifact = self
                    .registry
                    .retrieve(&params.task_id, &params.filename)
                    .await?;
                let encoded = base64::engine::general_purpose::STANDARD.encode(&artifact.data);
                (artifact, Some(encoded), None)
            }
        };
        let size = artifact.data.len() as u64;

        Ok(DownloadCompressedResult {
            task_id: params.task_id.clone(),
            download_name: artifact.download_name,
            size,
            cache_control: CACHE_CONTROL.to_string(),
            pragma: PRAGMA.to_string(),
            expires: EXPIRES.to_string(),
            data_base64,
            output_path,
            error: None,
            status: None,
        })
    }
}

impl Default for PdfShrinkServer {
    fn default() -> Self {
        Self::new()
    }
}

#[tool_handler]
impl ServerHandler for PdfShrinkServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "PDF Shrink Server reduces PDFs to a target byte size. Call compress_pdf, \
                 then download_compressed once with the returned task_id."
                    .into(),
            ),
        }
    }
}

/// Run the MCP server with default configuration
pub async fn run_server() -> Result<()> {
    run_server_with_config(ServerConfig::default()).await
}

/// Run the MCP server with full configuration
pub async fn run_server_with_config(config: ServerConfig) -> Result<()> {
    let sweep_interval = config.sweep_interval;
    let task_ttl = config.abandoned_task_ttl;
    let server = PdfShrinkServer::with_config(config);
    let registry = server.registry();
    let sweeper = registry.spawn_sweeper(sweep_interval, task_ttl);

    tracing::info!("PDF Shrink Server ready, waiting for connections...");

    let service = server.serve(rmcp::transport::io::stdio()).await?;
    let waited = service.waiting().await;

    let removed = shutdown_registry(&registry, sweeper).await;
    tracing::info!(removed, "PDF Shrink Server stopped");

    waited?;
    Ok(())
}

/// Stop the sweeper and remove every file still owned by a task.
async fn shutdown_registry(registry: &ArtifactRegistry, sweeper: JoinHandle<()>) -> usize {
    sweeper.abort();
    registry.purge_all().await
}
