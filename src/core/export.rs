//! Export stage: one job per configured data source.
//!
//! Jobs run sequentially in configured order so the source system never
//! serves two heavy exports at once. A failed or timed-out source never
//! aborts its siblings; the controller always returns the full result
//! list and leaves viability decisions to the orchestrator.

use std::path::Path;
use std::time::{Duration, Instant};

use chrono::Local;

use crate::adapters::{ExportRequest, ExportTool, ToolRun};
use crate::config::ResolvedConfig;
use crate::domain::{DataSourceSpec, ExportResult, ExportStatus};
use crate::report::RunLog;

use super::disk::{gb_to_bytes, DiskBudgetGuard};

/// Lines of the tool's own side log folded into diagnostics on failure
const SIDE_LOG_TAIL_LINES: usize = 10;

/// Runs the export jobs for one pipeline invocation
pub struct ExportStageController<'a> {
    config: &'a ResolvedConfig,
    tool: ExportTool,
}

impl<'a> ExportStageController<'a> {
    pub fn new(config: &'a ResolvedConfig, tool: ExportTool) -> Self {
        Self { config, tool }
    }

    /// Attempt every configured source and return every result.
    ///
    /// A failed disk-budget pre-flight aborts the stage before any job
    /// launches and yields an empty result list.
    pub async fn run_all(&self, log: &RunLog) -> Vec<ExportResult> {
        log.info("===== EXPORT STAGE =====");

        let required = gb_to_bytes(self.config.thresholds.min_free_export_gb);
        let budget = DiskBudgetGuard::has_budget(&self.config.dump_dir, required);
        if !budget.ok {
            log.error(format!(
                "insufficient disk budget for exports: {:.1}GB free, {:.1}GB required",
                budget.free_gb(),
                self.config.thresholds.min_free_export_gb
            ));
            return Vec::new();
        }
        log.info(format!(
            "disk budget: {:.1}GB free of {:.1}GB",
            budget.free_gb(),
            budget.total_gb()
        ));

        let total = self.config.sources.len();
        let mut results = Vec::with_capacity(total);

        for (index, source) in self.config.sources.iter().enumerate() {
            log.info(format!(
                "[{}/{}] exporting source '{}'",
                index + 1,
                total,
                source.name
            ));
            results.push(self.export_one(source, log).await);
        }

        let succeeded = results.iter().filter(|r| r.status.is_usable()).count();
        log.info(format!("export summary: {}/{} succeeded", succeeded, total));

        results
    }

    async fn export_one(&self, source: &DataSourceSpec, log: &RunLog) -> ExportResult {
        let now = Local::now();
        let filename = source.render_filename(&now);
        let artifact_path = self.config.dump_dir.join(&filename);

        // Idempotent re-run: a retried run targets the same name and must
        // not inherit a stale artifact.
        if artifact_path.exists() {
            match std::fs::remove_file(&artifact_path) {
                Ok(()) => log.info(format!("removed previous artifact {}", filename)),
                Err(e) => log.warn(format!(
                    "could not remove previous artifact {}: {}",
                    filename, e
                )),
            }
        }

        let credential = match std::env::var(&source.credential_env) {
            Ok(value) if !value.is_empty() => value,
            _ => {
                let detail = format!(
                    "credential variable '{}' is not set",
                    source.credential_env
                );
                log.error(format!("'{}': {}", source.name, detail));
                return ExportResult::failed(&source.name, ExportStatus::Failed, 0)
                    .with_diagnostics(vec![detail]);
            }
        };

        let request = ExportRequest {
            connect_string: format!("{}@{}", credential, self.config.exporter.service),
            directory_alias: self.config.exporter.directory_alias.clone(),
            dump_file: filename.clone(),
            log_file: source.side_log_name(&filename),
            workdir: self.config.dump_dir.clone(),
        };
        let limit = Duration::from_secs(
            source
                .timeout_seconds
                .unwrap_or(self.config.exporter.default_timeout_seconds),
        );
        log.info(format!(
            "running export for '{}' into {} (timeout {}s, parameters redacted)",
            source.name,
            filename,
            limit.as_secs()
        ));

        let started = Instant::now();
        let run = self.tool.export(&request, limit).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match run {
            Ok(ToolRun::Completed {
                code,
                stdout,
                stderr,
            }) => {
                // Full tool output goes to the run log only.
                for line in stdout.lines().chain(stderr.lines()) {
                    let line = line.trim();
                    if !line.is_empty() {
                        log.info(format!("  {}", line));
                    }
                }
                self.classify_completed(source, &artifact_path, code, &stderr, duration_ms, log)
            }
            Ok(ToolRun::TimedOut) => {
                log.error(format!(
                    "'{}' timed out after {}s and was killed",
                    source.name,
                    limit.as_secs()
                ));
                ExportResult::failed(&source.name, ExportStatus::TimedOut, duration_ms)
                    .with_diagnostics(vec![format!("timed out after {}s", limit.as_secs())])
            }
            Err(e) => {
                log.error(format!("'{}' failed to launch: {:#}", source.name, e));
                ExportResult::failed(&source.name, ExportStatus::Failed, duration_ms)
                    .with_diagnostics(vec![format!("{:#}", e)])
            }
        }
    }

    fn classify_completed(
        &self,
        source: &DataSourceSpec,
        artifact_path: &Path,
        code: Option<i32>,
        stderr: &str,
        duration_ms: u64,
        log: &RunLog,
    ) -> ExportResult {
        let mut diagnostics = non_empty_lines(stderr);

        let size = match std::fs::metadata(artifact_path) {
            Ok(meta) => meta.len(),
            Err(_) => {
                log.error(format!(
                    "'{}' produced no artifact (exit code {:?})",
                    source.name, code
                ));
                // The tool's own log usually has the real story.
                diagnostics.extend(side_log_tail(
                    artifact_path,
                    source,
                    SIDE_LOG_TAIL_LINES,
                ));
                return ExportResult::failed(&source.name, ExportStatus::Failed, duration_ms)
                    .with_diagnostics(diagnostics);
            }
        };

        if size < self.config.thresholds.min_artifact_bytes {
            log.error(format!(
                "'{}' artifact below minimum size: {} bytes < {}",
                source.name, size, self.config.thresholds.min_artifact_bytes
            ));
            diagnostics.push(format!("artifact only {} bytes", size));
            return ExportResult {
                source: source.name.clone(),
                artifact: None,
                size_bytes: size,
                duration_ms,
                status: ExportStatus::Failed,
                diagnostics: Vec::new(),
            }
            .with_diagnostics(diagnostics);
        }

        let status = match code {
            Some(0) => ExportStatus::Success,
            Some(c) if self.config.exporter.warning_exit_codes.contains(&c) => {
                log.warn(format!(
                    "'{}' finished with warnings (exit code {})",
                    source.name, c
                ));
                ExportStatus::SuccessWithWarnings
            }
            other => {
                log.error(format!(
                    "'{}' exited with unexpected code {:?}",
                    source.name, other
                ));
                diagnostics.push(format!("unexpected exit code {:?}", other));
                ExportStatus::Failed
            }
        };

        if status.is_usable() {
            log.info(format!(
                "'{}' export complete: {:.1}MB in {:.1}s",
                source.name,
                size as f64 / (1024.0 * 1024.0),
                duration_ms as f64 / 1000.0
            ));
        }

        ExportResult {
            source: source.name.clone(),
            artifact: status.is_usable().then(|| artifact_path.to_path_buf()),
            size_bytes: size,
            duration_ms,
            status,
            diagnostics: Vec::new(),
        }
        .with_diagnostics(diagnostics)
    }
}

fn non_empty_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Tail of the export tool's own side log, next to the artifact
fn side_log_tail(artifact_path: &Path, source: &DataSourceSpec, max_lines: usize) -> Vec<String> {
    let Some(artifact_name) = artifact_path.file_name().and_then(|n| n.to_str()) else {
        return Vec::new();
    };
    let Some(dir) = artifact_path.parent() else {
        return Vec::new();
    };

    let side_log = dir.join(source.side_log_name(artifact_name));
    let Ok(content) = std::fs::read_to_string(&side_log) else {
        return Vec::new();
    };

    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].iter().map(|s| s.trim().to_string()).collect()
}
