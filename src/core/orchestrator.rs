//! Pipeline orchestrator.
//!
//! Sequences the stages of one run, accumulates the run counters, and
//! classifies the terminal outcome. Finalization (exactly one
//! notification) happens on every exit path: stage failure,
//! configuration failure, internal fault, or operator interrupt.

use chrono::Utc;
use tracing::instrument;
use uuid::Uuid;

use crate::adapters::{ExportTool, Notifier};
use crate::config::ResolvedConfig;
use crate::domain::{ExportResult, ExportStatus, PackageArtifact, RunCounters, RunOutcome};
use crate::error::StageError;
use crate::report::{RunLog, RunReport, MAX_REPORT_LOG_LINES};

use super::distribution::DistributionStage;
use super::export::ExportStageController;
use super::packaging::PackagingStage;
use super::retention::{RetentionManager, RetentionReport};

/// Pipeline stages, in execution order. Transitions are forward-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Validating,
    Exporting,
    Packaging,
    Distributing,
    Retaining,
    Finalizing,
    Done,
}

/// How the stage sequence ended, before classification
enum ExecEnd {
    /// All reachable stages ran
    Completed,

    /// Configuration was rejected; only finalization runs
    ConfigurationFailed,

    /// An internal fault escaped a stage
    Fault(String),

    /// Operator interrupt
    Interrupted,
}

/// Terminal state of one pipeline invocation
#[derive(Debug)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub report: RunReport,
}

/// Drives one pipeline invocation end to end
pub struct PipelineOrchestrator {
    config: ResolvedConfig,
    notifier: Box<dyn Notifier>,
    run_id: Uuid,
    stage: Stage,
    counters: RunCounters,
    export_results: Vec<ExportResult>,
    package: Option<PackageArtifact>,
    distributed: bool,
    retention: Option<RetentionReport>,
    tool: Option<ExportTool>,
    log: RunLog,
}

impl PipelineOrchestrator {
    /// Create an orchestrator for one run over the given configuration
    pub fn new(config: ResolvedConfig, notifier: Box<dyn Notifier>) -> Self {
        let log = RunLog::open(&config.log_dir, config.retention.log_retention_days);
        let counters = RunCounters::new(config.sources.len());

        Self {
            config,
            notifier,
            run_id: Uuid::new_v4(),
            stage: Stage::Validating,
            counters,
            export_results: Vec::new(),
            package: None,
            distributed: false,
            retention: None,
            tool: None,
            log,
        }
    }

    /// Execute the pipeline and finalize.
    ///
    /// Finalization is not skippable: an interrupt cancels the remaining
    /// stages but still produces the report and the notification.
    #[instrument(skip(self), fields(run_id = %self.run_id))]
    pub async fn run(mut self) -> RunSummary {
        self.log
            .info(format!("===== BACKUP RUN STARTED ({}) =====", self.run_id));
        self.log.info(format!(
            "{} source(s) configured, dump dir {}",
            self.counters.total(),
            self.config.dump_dir.display()
        ));

        let interrupt = async {
            // If the handler cannot be installed, run uninterruptible
            // rather than aborting spuriously.
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        };

        let end = tokio::select! {
            end = self.execute() => end,
            _ = interrupt => {
                tracing::warn!("interrupt received, finalizing");
                ExecEnd::Interrupted
            }
        };

        self.finalize(end).await
    }

    /// Run the stages in order, honoring the skip table:
    /// validation failure skips everything; zero usable exports skip
    /// packaging and distribution; packaging failure skips distribution;
    /// retention runs on every path that passed validation.
    async fn execute(&mut self) -> ExecEnd {
        self.advance(Stage::Validating);
        if let Err(err) = self.validate() {
            self.log.error(format!("{}", err));
            self.counters.errors += 1;
            return ExecEnd::ConfigurationFailed;
        }

        self.advance(Stage::Exporting);
        let tool = match self.tool.take() {
            Some(tool) => tool,
            None => return ExecEnd::Fault("export tool missing after validation".to_string()),
        };
        self.export_results = ExportStageController::new(&self.config, tool)
            .run_all(&self.log)
            .await;

        for result in &self.export_results {
            match result.status {
                ExportStatus::Success => self.counters.succeeded += 1,
                ExportStatus::SuccessWithWarnings => {
                    self.counters.succeeded += 1;
                    self.counters.warnings += 1;
                }
                ExportStatus::Failed | ExportStatus::TimedOut => self.counters.errors += 1,
            }
        }

        let qualifying: Vec<ExportResult> = self
            .export_results
            .iter()
            .filter(|r| r.is_usable())
            .cloned()
            .collect();

        if qualifying.is_empty() {
            self.log
                .error("no usable export artifacts; skipping packaging and distribution");
            self.counters.errors += 1;
        } else {
            self.advance(Stage::Packaging);
            match PackagingStage::new(&self.config).run(&qualifying, &self.log).await {
                Ok(package) => self.package = Some(package),
                Err(StageError::Unexpected(detail)) => return ExecEnd::Fault(detail),
                Err(err) => {
                    self.log.error(format!("packaging failed: {}", err));
                    self.counters.errors += 1;
                }
            }
        }

        if let Some(package) = self.package.clone() {
            self.advance(Stage::Distributing);
            match DistributionStage::new(&self.config).run(&package, &self.log).await {
                Ok(()) => self.distributed = true,
                Err(StageError::Unexpected(detail)) => return ExecEnd::Fault(detail),
                Err(err) => {
                    self.log.error(format!("distribution failed: {}", err));
                    self.counters.errors += 1;
                }
            }
        }

        self.advance(Stage::Retaining);
        let report = RetentionManager::new(&self.config).run(&self.log);
        self.counters.warnings += report.failed_deletes;
        self.retention = Some(report);

        ExecEnd::Completed
    }

    /// Configuration checks and directory setup, before any stage runs
    fn validate(&mut self) -> Result<(), StageError> {
        self.config.validate()?;

        std::fs::create_dir_all(&self.config.dump_dir).map_err(|e| {
            StageError::Configuration(format!(
                "cannot create dump directory {}: {}",
                self.config.dump_dir.display(),
                e
            ))
        })?;

        let tool = ExportTool::discover(&self.config.exporter)?;
        self.log.info(format!("export binary: {}", tool.binary()));
        self.tool = Some(tool);

        match &self.config.remote_dir {
            Some(remote) if !remote.exists() => self.log.warn(format!(
                "remote target {} not reachable; distribution will fail",
                remote.display()
            )),
            None => self
                .log
                .warn("no remote target configured; distribution will fail"),
            _ => {}
        }

        Ok(())
    }

    /// Classify, report, notify. Runs exactly once per invocation.
    async fn finalize(mut self, end: ExecEnd) -> RunSummary {
        self.advance(Stage::Finalizing);

        let outcome = match end {
            ExecEnd::Interrupted => RunOutcome::Interrupted,
            ExecEnd::Fault(detail) => {
                self.log.error(format!("unexpected fault: {}", detail));
                RunOutcome::UnexpectedError
            }
            ExecEnd::Completed | ExecEnd::ConfigurationFailed => {
                RunOutcome::classify(&self.counters, self.package.is_some(), self.distributed)
            }
        };

        let duration = Utc::now() - self.counters.started_at;
        self.log.info("===== FINAL STATISTICS =====");
        self.log.info(format!(
            "duration: {:.1} min",
            duration.num_milliseconds() as f64 / 60_000.0
        ));
        self.log.info(format!(
            "exports: {}/{} | warnings: {} | errors: {}",
            self.counters.succeeded,
            self.counters.total(),
            self.counters.warnings,
            self.counters.errors
        ));
        self.log.info(format!(
            "package: {} | distributed: {}",
            self.package.as_ref().map(|_| "yes").unwrap_or("no"),
            if self.distributed { "yes" } else { "no" }
        ));
        self.log.info(format!(
            "finished: {} (exit code {})",
            outcome,
            outcome.exit_code()
        ));

        let report = RunReport::assemble(
            self.run_id,
            outcome,
            &self.counters,
            self.package.as_ref(),
            self.distributed,
            self.retention.clone(),
            self.log.excerpt(MAX_REPORT_LOG_LINES),
        );

        match self.notifier.notify(&report).await {
            Ok(()) => self
                .log
                .info(format!("report delivered via {}", self.notifier.name())),
            Err(e) => {
                let err = StageError::Notification(format!("{:#}", e));
                // Never escalated: the exit status is already decided.
                self.log.warn(format!("{}", err));
            }
        }

        self.advance(Stage::Done);
        RunSummary { outcome, report }
    }

    /// Stage the run is currently in
    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn advance(&mut self, next: Stage) {
        debug_assert!(next >= self.stage, "stage transitions are forward-only");
        self.stage = next;
    }
}
