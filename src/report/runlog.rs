//! Append-only daily run log.
//!
//! One text file per calendar day; every pipeline event lands both here
//! and in the `tracing` output. The file is the forensic record; results
//! and reports carry only bounded excerpts.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Days, Local, NaiveDate};

/// Daily append-only log writer.
///
/// Degrades to tracing-only when the log directory cannot be used; a
/// broken log destination must never take the pipeline down.
pub struct RunLog {
    path: Option<PathBuf>,
}

impl RunLog {
    /// Open (or create) today's log file under `dir`, pruning log files
    /// older than `retention_days` first.
    pub fn open(dir: &Path, retention_days: u32) -> Self {
        if let Err(e) = std::fs::create_dir_all(dir) {
            tracing::warn!(dir = %dir.display(), error = %e, "run log directory unavailable");
            return Self { path: None };
        }

        let pruned = Self::prune_old_logs(dir, retention_days);
        if pruned > 0 {
            tracing::info!(pruned, "pruned old run logs");
        }

        let path = dir.join(Self::file_name_for(Local::now().date_naive()));
        Self { path: Some(path) }
    }

    /// A log that only forwards to tracing (unit tests, dry paths)
    pub fn disabled() -> Self {
        Self { path: None }
    }

    /// Log file name for a calendar day
    pub fn file_name_for(date: NaiveDate) -> String {
        format!("backup_{}.log", date.format("%Y-%m-%d"))
    }

    /// Path of today's log file, if the log is file-backed
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        tracing::info!("{}", msg.as_ref());
        self.append("INFO", msg.as_ref());
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        tracing::warn!("{}", msg.as_ref());
        self.append("WARNING", msg.as_ref());
    }

    pub fn error(&self, msg: impl AsRef<str>) {
        tracing::error!("{}", msg.as_ref());
        self.append("ERROR", msg.as_ref());
    }

    fn append(&self, level: &str, msg: &str) {
        let Some(path) = &self.path else { return };

        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let line = format!("[{}] [{}] {}\n", stamp, level, msg);

        let written = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| file.write_all(line.as_bytes()));

        if let Err(e) = written {
            tracing::debug!(error = %e, "run log write failed");
        }
    }

    /// Last `max_lines` lines of today's log, oldest first
    pub fn excerpt(&self, max_lines: usize) -> Vec<String> {
        let Some(path) = &self.path else {
            return Vec::new();
        };

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return Vec::new(),
        };

        let lines: Vec<&str> = content.lines().collect();
        let start = lines.len().saturating_sub(max_lines);
        lines[start..].iter().map(|s| s.to_string()).collect()
    }

    /// Delete run logs older than `horizon_days`; returns how many were
    /// removed. Independent of package retention and on a longer horizon.
    pub fn prune_old_logs(dir: &Path, horizon_days: u32) -> usize {
        let cutoff = Local::now().date_naive() - Days::new(u64::from(horizon_days));
        let mut removed = 0;

        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => return 0,
        };

        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with("backup_") || !name.ends_with(".log") {
                continue;
            }

            let modified = entry.metadata().and_then(|m| m.modified());
            let Ok(modified) = modified else { continue };
            let modified_date = DateTime::<Local>::from(modified).date_naive();

            if modified_date < cutoff && std::fs::remove_file(entry.path()).is_ok() {
                removed += 1;
            }
        }

        removed
    }
}
