//! Task and artifact registry

mod artifacts;
mod sanitize;
mod task;

pub use artifacts::{ArtifactRegistry, RegistryConfig, RetrievedArtifact};
pub use sanitize::sanitize_filename;
pub use task::{compression_ratio, TaskResult};
