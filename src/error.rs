//! Stage error taxonomy.
//!
//! Stages return these as values; only configuration validation is allowed
//! to short-circuit the remaining stages, and even then the run still
//! reaches finalization.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by pipeline stages
#[derive(Debug, Error)]
pub enum StageError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(
        "insufficient disk budget at {}: {free_gb:.1}GB free, {required_gb:.1}GB required",
        .path.display()
    )]
    ResourceExhaustion {
        path: PathBuf,
        free_gb: f64,
        required_gb: f64,
    },

    #[error("no artifacts qualified for packaging")]
    NoArtifacts,

    #[error("export tool failed for source '{source_name}': {detail}")]
    ExternalTool { source_name: String, detail: String },

    #[error("integrity check failed for {}: {detail}", .path.display())]
    IntegrityCheck { path: PathBuf, detail: String },

    #[error("distribution failed: {0}")]
    Distribution(String),

    #[error("notification delivery failed: {0}")]
    Notification(String),

    #[error("unexpected fault: {0}")]
    Unexpected(String),
}
