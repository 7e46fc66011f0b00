//! Run counters and terminal outcome classification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-run tallies, owned exclusively by the orchestrator.
///
/// `total` is fixed at run start; the remaining counters only grow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCounters {
    total: usize,

    /// Sources whose export produced a usable artifact
    pub succeeded: usize,

    /// Warning-level observations (benign exit codes, skipped deletes)
    pub warnings: usize,

    /// Error-level observations (failed sources, failed stages)
    pub errors: usize,

    /// When the run started
    pub started_at: DateTime<Utc>,
}

impl RunCounters {
    /// Create counters for a run over `total` configured sources
    pub fn new(total: usize) -> Self {
        Self {
            total,
            succeeded: 0,
            warnings: 0,
            errors: 0,
            started_at: Utc::now(),
        }
    }

    /// Configured source count, set once at run start
    pub fn total(&self) -> usize {
        self.total
    }

    /// Fraction of sources exported successfully, as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.succeeded as f64 / self.total as f64 * 100.0
    }
}

/// Terminal classification of one pipeline invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Package created, distributed, zero errors or warnings
    FullSuccess,

    /// At least one export succeeded and a package exists, but distribution
    /// failed or warnings/errors were recorded
    PartialSuccess,

    /// No package was created
    CriticalFailure,

    /// An uncaught fault escaped a stage
    UnexpectedError,

    /// Operator interrupt
    Interrupted,
}

impl RunOutcome {
    /// Classify a finished run from its counters and stage booleans.
    ///
    /// Evaluated exactly once, at finalization. Total over all inputs.
    pub fn classify(counters: &RunCounters, package_created: bool, distributed: bool) -> Self {
        if !package_created {
            return Self::CriticalFailure;
        }
        if distributed && counters.errors == 0 && counters.warnings == 0 {
            return Self::FullSuccess;
        }
        if counters.succeeded > 0 {
            return Self::PartialSuccess;
        }
        Self::CriticalFailure
    }

    /// Stable process exit code contract for schedulers
    pub fn exit_code(self) -> i32 {
        match self {
            Self::FullSuccess => 0,
            Self::PartialSuccess => 1,
            Self::CriticalFailure => 2,
            Self::UnexpectedError => 3,
            Self::Interrupted => 130,
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::FullSuccess => "full success",
            Self::PartialSuccess => "partial success",
            Self::CriticalFailure => "critical failure",
            Self::UnexpectedError => "unexpected error",
            Self::Interrupted => "interrupted",
        };
        write!(f, "{}", label)
    }
}
