//! Command-line interface for dumpkeeper.
//!
//! Provides commands for executing the backup pipeline, validating the
//! configuration, applying retention, and inspecting resolved settings.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::adapters::{ExportTool, NoopNotifier, Notifier, WebhookNotifier};
use crate::config::ResolvedConfig;
use crate::core::disk::{gb_to_bytes, DiskBudgetGuard};
use crate::core::{PipelineOrchestrator, RetentionManager};
use crate::domain::RunOutcome;
use crate::report::RunLog;

/// dumpkeeper - scheduled database export, packaging, and retention
#[derive(Parser, Debug)]
#[command(name = "dumpkeeper")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (also honors DUMPKEEPER_CONFIG)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute the full backup pipeline
    Run {
        /// Skip the end-of-run notification
        #[arg(long)]
        no_notify: bool,
    },

    /// Validate configuration and preflight checks without exporting
    Check,

    /// Apply the retention passes only
    Prune,

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run { no_notify } => run_pipeline(self.config.as_deref(), no_notify).await,
            Commands::Check => check(self.config.as_deref()),
            Commands::Prune => prune(self.config.as_deref()),
            Commands::Config => show_config(self.config.as_deref()),
        }
    }
}

/// Execute the pipeline and exit with the run's outcome code
async fn run_pipeline(config_path: Option<&Path>, no_notify: bool) -> Result<()> {
    let config = match ResolvedConfig::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            // Without a readable configuration there is no notification
            // channel to report through; the exit code is the report.
            eprintln!("configuration unreadable: {:#}", e);
            std::process::exit(RunOutcome::CriticalFailure.exit_code());
        }
    };

    let notifier: Box<dyn Notifier> = match (&config.notification, no_notify) {
        (Some(notification), false) => Box::new(WebhookNotifier::new(&notification.webhook_url)),
        _ => Box::new(NoopNotifier),
    };

    let summary = PipelineOrchestrator::new(config, notifier).run().await;

    eprintln!(
        "Finished: {} (exit code {})",
        summary.outcome,
        summary.outcome.exit_code()
    );
    std::process::exit(summary.outcome.exit_code());
}

/// Preflight diagnosis: configuration, export binary, directories, disk
fn check(config_path: Option<&Path>) -> Result<()> {
    let config = ResolvedConfig::load(config_path).context("Failed to load configuration")?;

    let mut issues = 0usize;

    println!("Configuration: {}", describe_config_source(&config));
    match config.validate() {
        Ok(()) => println!("  settings: OK ({} sources)", config.sources.len()),
        Err(e) => {
            println!("  settings: {}", e);
            issues += 1;
        }
    }

    match ExportTool::discover(&config.exporter) {
        Ok(tool) => println!("  export binary: {}", tool.binary()),
        Err(e) => {
            println!("  export binary: {}", e);
            issues += 1;
        }
    }

    for (label, dir) in [
        ("dump dir", Some(&config.dump_dir)),
        ("log dir", Some(&config.log_dir)),
        ("remote dir", config.remote_dir.as_ref()),
    ] {
        match dir {
            Some(dir) if dir.exists() => println!("  {}: {}", label, dir.display()),
            Some(dir) => {
                println!("  {}: {} (missing)", label, dir.display());
                if label == "remote dir" {
                    issues += 1;
                }
            }
            None => {
                println!("  {}: (not configured)", label);
                issues += 1;
            }
        }
    }

    let budget = DiskBudgetGuard::has_budget(
        &config.dump_dir,
        gb_to_bytes(config.thresholds.min_free_export_gb),
    );
    println!(
        "  disk budget: {:.1}GB free of {:.1}GB (need {:.1}GB) -> {}",
        budget.free_gb(),
        budget.total_gb(),
        config.thresholds.min_free_export_gb,
        if budget.ok { "OK" } else { "insufficient" }
    );
    if !budget.ok {
        issues += 1;
    }

    for source in &config.sources {
        let credential = std::env::var(&source.credential_env)
            .ok()
            .filter(|v| !v.is_empty());
        match credential {
            Some(_) => println!("  source '{}': credential present", source.name),
            None => {
                println!(
                    "  source '{}': credential variable '{}' not set",
                    source.name, source.credential_env
                );
                issues += 1;
            }
        }
    }

    if issues > 0 {
        anyhow::bail!("{} issue(s) found", issues);
    }
    println!("All checks passed");
    Ok(())
}

/// Run the retention passes outside a pipeline run
fn prune(config_path: Option<&Path>) -> Result<()> {
    let config = ResolvedConfig::load(config_path).context("Failed to load configuration")?;
    let log = RunLog::open(&config.log_dir, config.retention.log_retention_days);

    let report = RetentionManager::new(&config).run(&log);

    println!(
        "Removed {} transient artifact(s) and {} package(s), {:.1}MB freed",
        report.transient_removed,
        report.packages_removed,
        report.removed_bytes as f64 / (1024.0 * 1024.0)
    );
    println!("Kept {} package(s)", report.packages_kept);
    if report.failed_deletes > 0 {
        anyhow::bail!("{} deletion(s) failed; see the run log", report.failed_deletes);
    }
    Ok(())
}

/// Show the resolved configuration (for debugging)
fn show_config(config_path: Option<&Path>) -> Result<()> {
    let config = ResolvedConfig::load(config_path).context("Failed to load configuration")?;

    println!("dumpkeeper configuration");
    println!();
    println!("Config file: {}", describe_config_source(&config));
    println!();
    println!("Paths:");
    println!("  dump dir:   {}", config.dump_dir.display());
    println!("  log dir:    {}", config.log_dir.display());
    println!(
        "  remote dir: {}",
        config
            .remote_dir
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(not configured)".to_string())
    );
    println!();
    println!("Sources ({}):", config.sources.len());
    for source in &config.sources {
        println!(
            "  {} (credential ${}, template '{}', timeout {})",
            source.name,
            source.credential_env,
            source.filename_template,
            source
                .timeout_seconds
                .map(|s| format!("{}s", s))
                .unwrap_or_else(|| "default".to_string())
        );
    }
    println!();
    println!("Exporter:");
    println!("  binary:             {}", config.exporter.binary.as_deref().unwrap_or(&config.exporter.binary_name));
    println!("  service:            {}", config.exporter.service);
    println!("  directory alias:    {}", config.exporter.directory_alias);
    println!("  warning exit codes: {:?}", config.exporter.warning_exit_codes);
    println!("  default timeout:    {}s", config.exporter.default_timeout_seconds);
    println!();
    println!("Thresholds:");
    println!("  min free (export):  {}GB", config.thresholds.min_free_export_gb);
    println!("  min artifact size:  {} bytes", config.thresholds.min_artifact_bytes);
    println!("  package estimate:   {}x input", config.thresholds.package_size_fraction);
    println!();
    println!("Retention:");
    println!("  max packages: {}", config.retention.max_total_backups);
    println!("  log horizon:  {} days", config.retention.log_retention_days);
    println!(
        "  transient:    {:?}",
        config.retention.transient_extensions
    );
    println!();
    println!(
        "Notification: {}",
        config
            .notification
            .as_ref()
            .map(|n| n.webhook_url.clone())
            .unwrap_or_else(|| "(none)".to_string())
    );

    Ok(())
}

fn describe_config_source(config: &ResolvedConfig) -> String {
    config
        .config_file
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(none - using defaults)".to_string())
}
