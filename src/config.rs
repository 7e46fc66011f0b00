//! Configuration loading and resolution.
//!
//! Configuration sources (highest priority first):
//! 1. `--config <path>` on the command line
//! 2. `DUMPKEEPER_CONFIG` environment variable
//! 3. `./dumpkeeper.yaml`
//! 4. `~/.dumpkeeper/config.yaml`
//!
//! The raw file is parsed into [`ConfigFile`] and resolved into an
//! immutable [`ResolvedConfig`] with absolute paths, which is passed into
//! the orchestrator at construction. There is no process-wide mutable
//! configuration state.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::domain::DataSourceSpec;
use crate::error::StageError;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub sources: Vec<DataSourceSpec>,
    #[serde(default)]
    pub exporter: ExporterConfig,
    #[serde(default)]
    pub thresholds: ThresholdsConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub notification: Option<NotificationConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Where export artifacts and packages are written (relative to the
    /// config file)
    pub dump_dir: Option<String>,
    /// Remote distribution target; distribution fails cleanly when absent
    pub remote_dir: Option<String>,
    /// Run log directory (relative to the config file)
    pub log_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExporterConfig {
    /// Explicit path to the export binary; discovery probes PATH and
    /// `$ORACLE_HOME/bin` when unset
    pub binary: Option<String>,

    /// Binary name used for discovery probes
    #[serde(default = "default_binary_name")]
    pub binary_name: String,

    /// Service name appended to the connect string
    #[serde(default = "default_service")]
    pub service: String,

    /// Server-side directory alias passed to the tool
    #[serde(default = "default_directory_alias")]
    pub directory_alias: String,

    /// Non-zero exit codes treated as success-with-warnings
    #[serde(default = "default_warning_exit_codes")]
    pub warning_exit_codes: Vec<i32>,

    /// Default per-source timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub default_timeout_seconds: u64,
}

fn default_binary_name() -> String {
    "expdp".to_string()
}
fn default_service() -> String {
    "ORCL".to_string()
}
fn default_directory_alias() -> String {
    "DMP_DIR".to_string()
}
fn default_warning_exit_codes() -> Vec<i32> {
    vec![1, 5]
}
fn default_timeout_seconds() -> u64 {
    3600
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            binary: None,
            binary_name: default_binary_name(),
            service: default_service(),
            directory_alias: default_directory_alias(),
            warning_exit_codes: default_warning_exit_codes(),
            default_timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdsConfig {
    /// Free space required at the dump directory before exporting, in GB
    #[serde(default = "default_min_free_export_gb")]
    pub min_free_export_gb: f64,

    /// Minimum artifact size; smaller files are treated as failed exports
    #[serde(default = "default_min_artifact_bytes")]
    pub min_artifact_bytes: u64,

    /// Estimated package size as a fraction of summed input sizes
    #[serde(default = "default_package_size_fraction")]
    pub package_size_fraction: f64,
}

fn default_min_free_export_gb() -> f64 {
    10.0
}
fn default_min_artifact_bytes() -> u64 {
    100 * 1024
}
fn default_package_size_fraction() -> f64 {
    0.7
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            min_free_export_gb: default_min_free_export_gb(),
            min_artifact_bytes: default_min_artifact_bytes(),
            package_size_fraction: default_package_size_fraction(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    /// Most-recent package containers kept by the historical pass
    #[serde(default = "default_max_total_backups")]
    pub max_total_backups: usize,

    /// Run log age horizon in days (longer than package retention)
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u32,

    /// File extensions treated as transient export artifacts
    #[serde(default = "default_transient_extensions")]
    pub transient_extensions: Vec<String>,
}

fn default_max_total_backups() -> usize {
    7
}
fn default_log_retention_days() -> u32 {
    30
}
fn default_transient_extensions() -> Vec<String> {
    vec!["dmp".to_string()]
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_total_backups: default_max_total_backups(),
            log_retention_days: default_log_retention_days(),
            transient_extensions: default_transient_extensions(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// Webhook endpoint receiving the JSON run report
    pub webhook_url: String,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub dump_dir: PathBuf,
    pub remote_dir: Option<PathBuf>,
    pub log_dir: PathBuf,
    pub sources: Vec<DataSourceSpec>,
    pub exporter: ExporterConfig,
    pub thresholds: ThresholdsConfig,
    pub retention: RetentionConfig,
    pub notification: Option<NotificationConfig>,
    /// Path to the config file the values came from (if any)
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Load configuration from an explicit path or the discovery chain
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match find_config_file(explicit) {
            Some(path) => {
                let raw = load_config_file(&path)?;
                Ok(Self::resolve(raw, Some(path)))
            }
            None => Ok(Self::resolve(default_config_file(), None)),
        }
    }

    /// Resolve a raw config file into absolute paths
    pub fn resolve(raw: ConfigFile, config_file: Option<PathBuf>) -> Self {
        let base = config_file
            .as_deref()
            .and_then(|p| p.parent())
            .map(Path::to_path_buf)
            .unwrap_or_else(default_root);

        let default_dump = default_root().join("dumps");
        let default_logs = default_root().join("logs");

        let dump_dir = raw
            .paths
            .dump_dir
            .as_deref()
            .map(|p| resolve_path(&base, p))
            .unwrap_or(default_dump);
        let log_dir = raw
            .paths
            .log_dir
            .as_deref()
            .map(|p| resolve_path(&base, p))
            .unwrap_or(default_logs);
        let remote_dir = raw.paths.remote_dir.as_deref().map(|p| resolve_path(&base, p));

        Self {
            dump_dir,
            remote_dir,
            log_dir,
            sources: raw.sources,
            exporter: raw.exporter,
            thresholds: raw.thresholds,
            retention: raw.retention,
            notification: raw.notification,
            config_file,
        }
    }

    /// Hard validity checks, run before any stage
    pub fn validate(&self) -> Result<(), StageError> {
        if self.sources.is_empty() {
            return Err(StageError::Configuration(
                "no data sources configured".to_string(),
            ));
        }

        let mut names: Vec<&str> = self.sources.iter().map(|s| s.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        if names.len() != self.sources.len() {
            return Err(StageError::Configuration(
                "data source names must be unique".to_string(),
            ));
        }

        for source in &self.sources {
            if source.name.is_empty() {
                return Err(StageError::Configuration(
                    "data source with an empty name".to_string(),
                ));
            }
            if source.credential_env.is_empty() {
                return Err(StageError::Configuration(format!(
                    "source '{}' has no credential variable",
                    source.name
                )));
            }
        }

        let fraction = self.thresholds.package_size_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(StageError::Configuration(format!(
                "package_size_fraction must be in (0, 1], got {}",
                fraction
            )));
        }

        if self.retention.max_total_backups == 0 {
            return Err(StageError::Configuration(
                "max_total_backups must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

fn default_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".dumpkeeper")
}

fn default_config_file() -> ConfigFile {
    ConfigFile {
        version: "1".to_string(),
        paths: PathsConfig::default(),
        sources: Vec::new(),
        exporter: ExporterConfig::default(),
        thresholds: ThresholdsConfig::default(),
        retention: RetentionConfig::default(),
        notification: None,
    }
}

/// Find the config file: explicit path, env var, cwd, then home directory
fn find_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(env_path) = std::env::var("DUMPKEEPER_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    let local = PathBuf::from("dumpkeeper.yaml");
    if local.exists() {
        return Some(local);
    }

    let home = default_root().join("config.yaml");
    if home.exists() {
        return Some(home);
    }

    None
}

/// Load and parse a config file
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const TEST_CONFIG_YAML: &str = r#"
version: "1"
paths:
  dump_dir: ./dumps
  remote_dir: /mnt/offsite/backups
  log_dir: ./logs
sources:
  - name: HORIZONTE
    credential_env: HORIZONTE_CREDENTIAL
  - name: IMG_HORIZONTE
    credential_env: IMG_CREDENTIAL
    filename_template: "img_{name}_{weekday}.dmp"
    timeout_seconds: 10800
exporter:
  service: ORCL
  warning_exit_codes: [1, 5]
thresholds:
  min_free_export_gb: 5
retention:
  max_total_backups: 4
notification:
  webhook_url: https://hooks.example.net/backup
"#;

    fn write_config(temp: &TempDir) -> PathBuf {
        let path = temp.path().join("dumpkeeper.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, "{}", TEST_CONFIG_YAML).unwrap();
        path
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let path = write_config(&temp);

        let raw = load_config_file(&path).unwrap();
        assert_eq!(raw.version, "1");
        assert_eq!(raw.sources.len(), 2);
        assert_eq!(raw.sources[1].timeout_seconds, Some(10800));
        assert_eq!(raw.exporter.warning_exit_codes, vec![1, 5]);
        assert_eq!(raw.retention.max_total_backups, 4);
        // Unspecified fields fall back to defaults
        assert_eq!(raw.exporter.default_timeout_seconds, 3600);
        assert_eq!(raw.thresholds.min_artifact_bytes, 100 * 1024);
    }

    #[test]
    fn test_resolve_paths_relative_to_config_file() {
        let temp = TempDir::new().unwrap();
        let path = write_config(&temp);

        let raw = load_config_file(&path).unwrap();
        let resolved = ResolvedConfig::resolve(raw, Some(path));

        assert_eq!(resolved.dump_dir, temp.path().join("./dumps"));
        assert_eq!(resolved.log_dir, temp.path().join("./logs"));
        assert_eq!(
            resolved.remote_dir,
            Some(PathBuf::from("/mnt/offsite/backups"))
        );
    }

    #[test]
    fn test_validate_rejects_empty_sources() {
        let resolved = ResolvedConfig::resolve(default_config_file(), None);
        assert!(matches!(
            resolved.validate(),
            Err(StageError::Configuration(_))
        ));
    }

    #[test]
    fn test_validate_rejects_duplicate_names() {
        let temp = TempDir::new().unwrap();
        let path = write_config(&temp);
        let raw = load_config_file(&path).unwrap();
        let mut resolved = ResolvedConfig::resolve(raw, Some(path));

        resolved.sources[1].name = resolved.sources[0].name.clone();
        assert!(matches!(
            resolved.validate(),
            Err(StageError::Configuration(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_fraction() {
        let temp = TempDir::new().unwrap();
        let path = write_config(&temp);
        let raw = load_config_file(&path).unwrap();
        let mut resolved = ResolvedConfig::resolve(raw, Some(path));

        resolved.thresholds.package_size_fraction = 1.5;
        assert!(resolved.validate().is_err());

        resolved.thresholds.package_size_fraction = 0.7;
        assert!(resolved.validate().is_ok());
    }
}
