//! Run logging and end-of-run reporting.

pub mod runlog;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::core::retention::RetentionReport;
use crate::domain::{PackageArtifact, RunCounters, RunOutcome};

pub use runlog::RunLog;

/// Log lines carried into the notification report
pub const MAX_REPORT_LOG_LINES: usize = 100;

/// Package statistics for the report
#[derive(Debug, Clone, Serialize)]
pub struct PackageSummary {
    pub file: String,
    pub input_mb: f64,
    pub compressed_mb: f64,
    pub ratio_percent: f64,
    pub sha256: String,
}

impl From<&PackageArtifact> for PackageSummary {
    fn from(pkg: &PackageArtifact) -> Self {
        Self {
            file: pkg
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            input_mb: to_mb(pkg.input_bytes),
            compressed_mb: to_mb(pkg.compressed_bytes),
            ratio_percent: pkg.ratio_percent(),
            sha256: pkg.sha256.clone(),
        }
    }
}

/// Structured end-of-run report handed to the notification collaborator.
///
/// Assembled exactly once per run, at finalization, regardless of where
/// failure occurred.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub outcome: RunOutcome,
    pub exit_code: i32,
    pub total_sources: usize,
    pub succeeded: usize,
    pub warnings: usize,
    pub errors: usize,
    pub success_rate: f64,
    pub duration_seconds: f64,
    pub package: Option<PackageSummary>,
    pub distributed: bool,
    pub retention: Option<RetentionReport>,
    pub log_excerpt: Vec<String>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// Build the report from the orchestrator's end-of-run state
    pub fn assemble(
        run_id: Uuid,
        outcome: RunOutcome,
        counters: &RunCounters,
        package: Option<&PackageArtifact>,
        distributed: bool,
        retention: Option<RetentionReport>,
        log_excerpt: Vec<String>,
    ) -> Self {
        let finished_at = Utc::now();
        let duration_seconds =
            (finished_at - counters.started_at).num_milliseconds() as f64 / 1000.0;

        Self {
            run_id,
            outcome,
            exit_code: outcome.exit_code(),
            total_sources: counters.total(),
            succeeded: counters.succeeded,
            warnings: counters.warnings,
            errors: counters.errors,
            success_rate: counters.success_rate(),
            duration_seconds,
            package: package.map(PackageSummary::from),
            distributed,
            retention,
            log_excerpt,
            finished_at,
        }
    }
}

pub fn to_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_report_serializes_to_json() {
        let counters = RunCounters::new(3);
        let report = RunReport::assemble(
            Uuid::new_v4(),
            RunOutcome::CriticalFailure,
            &counters,
            None,
            false,
            None,
            vec!["[ERROR] nothing exported".to_string()],
        );

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"], "critical_failure");
        assert_eq!(json["exit_code"], 2);
        assert_eq!(json["total_sources"], 3);
        assert!(json["package"].is_null());
    }

    #[test]
    fn test_package_summary_from_artifact() {
        let pkg = PackageArtifact {
            path: PathBuf::from("/data/backup_monday_2024-03-04.tar.zst"),
            input_bytes: 4 * 1024 * 1024,
            compressed_bytes: 1024 * 1024,
            sha256: "ab".repeat(32),
            created_at: Utc::now(),
            members: vec!["a.dmp".to_string()],
        };

        let summary = PackageSummary::from(&pkg);
        assert_eq!(summary.file, "backup_monday_2024-03-04.tar.zst");
        assert!((summary.input_mb - 4.0).abs() < f64::EPSILON);
        assert!((summary.ratio_percent - 75.0).abs() < f64::EPSILON);
    }
}
