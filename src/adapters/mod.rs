//! Adapter interfaces for external collaborators.
//!
//! The pipeline core talks to the export tool and the notification
//! channel only through these seams.

pub mod exporter;
pub mod webhook;

use anyhow::Result;
use async_trait::async_trait;

use crate::report::RunReport;

pub use exporter::{ExportRequest, ExportTool, ToolRun};
pub use webhook::WebhookNotifier;

/// Delivery channel for the end-of-run report.
///
/// Delivery failure is logged by the orchestrator and never changes the
/// run's exit status.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Human-readable channel name
    fn name(&self) -> &str;

    /// Deliver the report out-of-band
    async fn notify(&self, report: &RunReport) -> Result<()>;
}

/// Notifier used when no delivery channel is configured
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    fn name(&self) -> &str {
        "none"
    }

    async fn notify(&self, _report: &RunReport) -> Result<()> {
        Ok(())
    }
}
