//! Data source definitions.
//!
//! A data source is one exportable unit of the upstream system. Sources are
//! configured before a run starts and never change during one.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Default artifact filename template.
///
/// Weekday-based names give a rolling seven-slot window: a re-run on the
/// same day overwrites, a run a week later reclaims the slot.
pub const DEFAULT_FILENAME_TEMPLATE: &str = "{name}_{weekday}.dmp";

/// One exportable unit of the source system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceSpec {
    /// Logical name (schema, database, tenant)
    pub name: String,

    /// Name of the environment variable holding the connection credential.
    /// The credential itself is never stored in configuration.
    pub credential_env: String,

    /// Artifact filename template; supports `{name}`, `{weekday}`, `{date}`
    #[serde(default = "default_filename_template")]
    pub filename_template: String,

    /// Per-source timeout override in seconds (falls back to the
    /// exporter-wide default)
    pub timeout_seconds: Option<u64>,
}

fn default_filename_template() -> String {
    DEFAULT_FILENAME_TEMPLATE.to_string()
}

impl DataSourceSpec {
    /// Render the artifact filename for this source at the given moment.
    ///
    /// The result is deterministic within a calendar day, so a retried run
    /// targets the same file instead of accumulating a new one.
    pub fn render_filename(&self, now: &DateTime<Local>) -> String {
        render_template(&self.filename_template, &self.name, now)
    }

    /// Name of the export tool's side log, derived from the artifact name
    pub fn side_log_name(&self, artifact: &str) -> String {
        match artifact.rsplit_once('.') {
            Some((stem, _)) => format!("{}.log", stem),
            None => format!("{}.log", artifact),
        }
    }
}

/// Substitute `{name}`, `{weekday}` and `{date}` placeholders
pub fn render_template(template: &str, name: &str, now: &DateTime<Local>) -> String {
    template
        .replace("{name}", name)
        .replace("{weekday}", &now.format("%A").to_string().to_lowercase())
        .replace("{date}", &now.format("%Y-%m-%d").to_string())
}
