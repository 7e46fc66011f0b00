//! Retention passes over transient artifacts and historical packages.
//!
//! Pure policy over file metadata; no network or export-tool dependency.
//! Runs after every successful or partial run, even when distribution
//! failed, to bound local disk growth.

use std::path::Path;

use chrono::{DateTime, Local, NaiveDate};
use serde::Serialize;

use crate::config::ResolvedConfig;
use crate::domain::package::{PACKAGE_EXTENSION, PACKAGE_PREFIX};
use crate::domain::HistoricalPackage;
use crate::report::RunLog;

/// What the retention passes removed and kept
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetentionReport {
    /// Transient export artifacts removed (before-today)
    pub transient_removed: usize,

    /// Package containers removed beyond the keep window
    pub packages_removed: usize,

    /// Package containers kept
    pub packages_kept: usize,

    /// Bytes freed across both passes
    pub removed_bytes: u64,

    /// Deletions that failed; the passes continue past them
    pub failed_deletes: usize,
}

/// Applies the transient and historical pruning policies
pub struct RetentionManager<'a> {
    config: &'a ResolvedConfig,
}

impl<'a> RetentionManager<'a> {
    pub fn new(config: &'a ResolvedConfig) -> Self {
        Self { config }
    }

    /// Run both passes and return combined counts
    pub fn run(&self, log: &RunLog) -> RetentionReport {
        log.info("===== RETENTION STAGE =====");
        log.info(format!(
            "policy: keep {} most recent packages, drop before-today artifacts",
            self.config.retention.max_total_backups
        ));

        let mut report = RetentionReport::default();
        let today = Local::now().date_naive();

        self.transient_pass(today, &mut report, log);
        self.historical_pass(&mut report, log);

        log.info(format!(
            "retention complete: {} removed ({:.1}MB freed), {} packages kept, {} delete failures",
            report.transient_removed + report.packages_removed,
            report.removed_bytes as f64 / (1024.0 * 1024.0),
            report.packages_kept,
            report.failed_deletes
        ));

        report
    }

    /// Delete export artifacts whose modification date precedes today.
    ///
    /// Same-day artifacts stay: a same-day retry or the just-created
    /// package may still need them.
    fn transient_pass(&self, today: NaiveDate, report: &mut RetentionReport, log: &RunLog) {
        let entries = match std::fs::read_dir(&self.config.dump_dir) {
            Ok(entries) => entries,
            Err(e) => {
                log.warn(format!("transient pass skipped: {}", e));
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !self.is_transient(&path) {
                continue;
            }

            let Ok(meta) = entry.metadata() else { continue };
            let Ok(modified) = meta.modified() else { continue };
            let modified_date = DateTime::<Local>::from(modified).date_naive();

            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            if modified_date < today {
                match std::fs::remove_file(&path) {
                    Ok(()) => {
                        log.info(format!(
                            "removed transient artifact {} ({:.1}MB)",
                            name,
                            meta.len() as f64 / (1024.0 * 1024.0)
                        ));
                        report.transient_removed += 1;
                        report.removed_bytes += meta.len();
                    }
                    Err(e) => {
                        log.warn(format!("could not remove {}: {}", name, e));
                        report.failed_deletes += 1;
                    }
                }
            } else {
                log.info(format!("kept same-day artifact {}", name));
            }
        }
    }

    fn is_transient(&self, path: &Path) -> bool {
        if !path.is_file() {
            return false;
        }
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        let ext = ext.to_lowercase();
        self.config
            .retention
            .transient_extensions
            .iter()
            .any(|t| t.to_lowercase() == ext)
    }

    /// Keep the most recent `max_total_backups` packages, delete the rest.
    ///
    /// Per-file deletion failures are counted and the pass continues;
    /// every remaining candidate is still attempted.
    fn historical_pass(&self, report: &mut RetentionReport, log: &RunLog) {
        let mut packages = discover_packages(&self.config.dump_dir);
        log.info(format!("found {} package containers", packages.len()));

        // Most recent first; stable name tie-break for equal mtimes.
        packages.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| a.file_name().cmp(&b.file_name()))
        });

        for (index, package) in packages.iter().enumerate() {
            if index < self.config.retention.max_total_backups {
                log.info(format!(
                    "kept package [{}]: {} ({:.1}MB)",
                    index + 1,
                    package.file_name(),
                    package.size_bytes as f64 / (1024.0 * 1024.0)
                ));
                report.packages_kept += 1;
                continue;
            }

            match std::fs::remove_file(&package.path) {
                Ok(()) => {
                    log.info(format!(
                        "removed package {} ({:.1}MB)",
                        package.file_name(),
                        package.size_bytes as f64 / (1024.0 * 1024.0)
                    ));
                    report.packages_removed += 1;
                    report.removed_bytes += package.size_bytes;
                }
                Err(e) => {
                    log.error(format!(
                        "could not remove package {}: {}",
                        package.file_name(),
                        e
                    ));
                    report.failed_deletes += 1;
                }
            }
        }
    }
}

/// Enumerate package containers matching the run naming convention
pub fn discover_packages(dir: &Path) -> Vec<HistoricalPackage> {
    let pattern = format!("{}/{}*{}", dir.display(), PACKAGE_PREFIX, PACKAGE_EXTENSION);
    let mut packages = Vec::new();

    let paths = match glob::glob(&pattern) {
        Ok(paths) => paths,
        Err(_) => return packages,
    };

    for path in paths.flatten() {
        let Ok(meta) = std::fs::metadata(&path) else {
            continue;
        };
        let Ok(modified) = meta.modified() else { continue };
        packages.push(HistoricalPackage {
            path,
            modified,
            size_bytes: meta.len(),
        });
    }

    packages
}
