//! Export job results.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Maximum diagnostic lines kept per export result.
///
/// Full tool output goes to the run log only; results carry a bounded
/// excerpt so reports stay readable.
pub const MAX_DIAGNOSTIC_LINES: usize = 10;

/// Exit classification of one export job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStatus {
    /// Tool exited cleanly and the artifact validated
    Success,

    /// Tool exited with an allow-listed warning code, artifact validated
    SuccessWithWarnings,

    /// Tool failed, or the artifact was missing or undersized
    Failed,

    /// Tool exceeded its deadline and was killed
    TimedOut,
}

impl ExportStatus {
    /// Whether the produced artifact qualifies for packaging
    pub fn is_usable(self) -> bool {
        matches!(self, Self::Success | Self::SuccessWithWarnings)
    }
}

impl std::fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Success => "success",
            Self::SuccessWithWarnings => "success-with-warnings",
            Self::Failed => "failed",
            Self::TimedOut => "timed-out",
        };
        write!(f, "{}", label)
    }
}

/// Outcome of one export job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResult {
    /// Logical source name
    pub source: String,

    /// Produced artifact, if any
    pub artifact: Option<PathBuf>,

    /// Artifact size in bytes (0 when absent)
    pub size_bytes: u64,

    /// Wall-clock duration of the job in milliseconds
    pub duration_ms: u64,

    /// Exit classification
    pub status: ExportStatus,

    /// Bounded diagnostic excerpt (stdout/stderr/side-log tail)
    pub diagnostics: Vec<String>,
}

impl ExportResult {
    /// Create a result with no artifact
    pub fn failed(source: impl Into<String>, status: ExportStatus, duration_ms: u64) -> Self {
        Self {
            source: source.into(),
            artifact: None,
            size_bytes: 0,
            duration_ms,
            status,
            diagnostics: Vec::new(),
        }
    }

    /// Attach diagnostics, truncating to the bounded line count
    pub fn with_diagnostics(mut self, lines: Vec<String>) -> Self {
        self.diagnostics = truncate_lines(lines, MAX_DIAGNOSTIC_LINES);
        self
    }

    /// Whether the artifact behind this result can be packaged
    pub fn is_usable(&self) -> bool {
        self.status.is_usable() && self.artifact.is_some()
    }
}

/// Keep at most `max` lines, noting how many were dropped
pub fn truncate_lines(lines: Vec<String>, max: usize) -> Vec<String> {
    if lines.len() <= max {
        return lines;
    }
    let dropped = lines.len() - max;
    let mut kept: Vec<String> = lines.into_iter().take(max).collect();
    kept.push(format!("... {} more lines in the run log", dropped));
    kept
}
