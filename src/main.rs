//! PDF Shrink Server - Entry point
//!
//! An MCP server that shrinks PDFs to a target size.

use pdf_shrink_server::{run_server_with_config, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdf_shrink_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ServerConfig::from_env()?;
    tracing::info!(storage_dir = %config.storage_dir.display(), "Starting PDF Shrink Server");

    run_server_with_config(config).await
}
