//! Package artifacts produced and discovered by the pipeline.

use std::path::PathBuf;
use std::time::SystemTime;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

/// Prefix of every package container the pipeline produces
pub const PACKAGE_PREFIX: &str = "backup_";

/// Extension of every package container
pub const PACKAGE_EXTENSION: &str = ".tar.zst";

/// Package filename for a run at the given moment.
///
/// Deterministic within a calendar day, so a same-day re-run replaces the
/// day's package instead of adding a second one.
pub fn package_name(now: &DateTime<Local>) -> String {
    format!(
        "{}{}_{}{}",
        PACKAGE_PREFIX,
        now.format("%A").to_string().to_lowercase(),
        now.format("%Y-%m-%d"),
        PACKAGE_EXTENSION
    )
}

/// The compressed container aggregating one run's qualifying artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageArtifact {
    /// Location of the container on local disk
    pub path: PathBuf,

    /// Summed size of the constituent artifacts before compression
    pub input_bytes: u64,

    /// Size of the container on disk
    pub compressed_bytes: u64,

    /// Hex sha256 digest of the container, computed after the write
    pub sha256: String,

    /// When the container finished writing
    pub created_at: DateTime<Utc>,

    /// File names of the constituent artifacts
    pub members: Vec<String>,
}

impl PackageArtifact {
    /// Space saved by compression, as a percentage of the input size
    pub fn ratio_percent(&self) -> f64 {
        if self.input_bytes == 0 {
            return 0.0;
        }
        let saved = self.input_bytes.saturating_sub(self.compressed_bytes);
        saved as f64 / self.input_bytes as f64 * 100.0
    }
}

/// A previously produced package discovered on disk at retention time.
///
/// Read-only view reconstructed each pass; never persisted.
#[derive(Debug, Clone)]
pub struct HistoricalPackage {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub size_bytes: u64,
}

impl HistoricalPackage {
    /// File name, for logging and stable tie-breaks
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}
