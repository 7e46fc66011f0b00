//! External export tool invocation.
//!
//! The export collaborator is an external CLI that writes a dump file as a
//! side effect. This adapter spawns it per data source, bounded by a hard
//! deadline; an expired process is killed, never left running.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::timeout;

use crate::config::ExporterConfig;
use crate::error::StageError;

/// One invocation of the export tool
#[derive(Debug, Clone)]
pub struct ExportRequest {
    /// `credential@service` connect string; never logged
    pub connect_string: String,

    /// Server-side directory alias the tool writes into
    pub directory_alias: String,

    /// Target dump file name (relative to the directory alias)
    pub dump_file: String,

    /// Tool-side log file name
    pub log_file: String,

    /// Working directory for the child process
    pub workdir: PathBuf,
}

impl ExportRequest {
    fn to_args(&self) -> Vec<String> {
        vec![
            self.connect_string.clone(),
            format!("DIRECTORY={}", self.directory_alias),
            format!("DUMPFILE={}", self.dump_file),
            format!("LOGFILE={}:{}", self.directory_alias, self.log_file),
            "REUSE_DUMPFILES=YES".to_string(),
        ]
    }
}

/// How an invocation ended
#[derive(Debug)]
pub enum ToolRun {
    /// Process exited on its own
    Completed {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// Deadline expired; the process was killed
    TimedOut,
}

/// Export tool subprocess wrapper
pub struct ExportTool {
    /// Path or name of the export binary
    binary_path: String,
}

impl ExportTool {
    /// Create an export tool with an explicit binary path
    pub fn with_binary_path(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    /// Locate the export binary.
    ///
    /// Order: configured path, then a PATH probe (the tool answers `-help`
    /// with exit code 0 or 1), then `$ORACLE_HOME/bin`.
    pub fn discover(config: &ExporterConfig) -> Result<Self, StageError> {
        if let Some(configured) = &config.binary {
            if Path::new(configured).exists() {
                return Ok(Self::with_binary_path(configured));
            }
            return Err(StageError::Configuration(format!(
                "configured export binary not found: {}",
                configured
            )));
        }

        let probe = std::process::Command::new(&config.binary_name)
            .arg("-help")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if let Ok(status) = probe {
            if matches!(status.code(), Some(0) | Some(1)) {
                return Ok(Self::with_binary_path(&config.binary_name));
            }
        }

        if let Ok(home) = std::env::var("ORACLE_HOME") {
            let candidate = Path::new(&home).join("bin").join(&config.binary_name);
            if candidate.exists() {
                return Ok(Self::with_binary_path(candidate.to_string_lossy()));
            }
        }

        Err(StageError::Configuration(format!(
            "export binary '{}' not found on PATH or under ORACLE_HOME",
            config.binary_name
        )))
    }

    /// The binary this tool will spawn
    pub fn binary(&self) -> &str {
        &self.binary_path
    }

    /// Run one export, blocking until exit or deadline.
    ///
    /// Captured output is returned in full; callers decide how much of it
    /// survives into results and reports.
    pub async fn export(&self, request: &ExportRequest, limit: Duration) -> Result<ToolRun> {
        let mut child = Command::new(&self.binary_path)
            .args(request.to_args())
            .current_dir(&request.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn export tool '{}'", self.binary_path))?;

        // Drain both pipes while waiting so a chatty tool cannot stall on
        // a full pipe buffer.
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let io_task = tokio::spawn(async move {
            let read_out = async {
                let mut buf = String::new();
                if let Some(mut pipe) = stdout_pipe {
                    let _ = pipe.read_to_string(&mut buf).await;
                }
                buf
            };
            let read_err = async {
                let mut buf = String::new();
                if let Some(mut pipe) = stderr_pipe {
                    let _ = pipe.read_to_string(&mut buf).await;
                }
                buf
            };
            tokio::join!(read_out, read_err)
        });

        match timeout(limit, child.wait()).await {
            Ok(status) => {
                let status = status.context("Failed to wait for export tool")?;
                let (stdout, stderr) = io_task.await.unwrap_or_default();
                Ok(ToolRun::Completed {
                    code: status.code(),
                    stdout,
                    stderr,
                })
            }
            Err(_) => {
                if let Err(e) = child.start_kill() {
                    tracing::warn!(error = %e, "failed to kill timed-out export tool");
                }
                let _ = child.wait().await;
                io_task.abort();
                Ok(ToolRun::TimedOut)
            }
        }
    }
}
