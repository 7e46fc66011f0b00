//! Distribution stage: copy the run package to the remote target.
//!
//! The copy is byte-preserving, never a move: the local container stays
//! behind for retention bookkeeping. A size mismatch after the copy is a
//! stage failure; the remote file is left in place for inspection.

use std::time::Instant;

use crate::config::ResolvedConfig;
use crate::domain::PackageArtifact;
use crate::error::StageError;
use crate::report::RunLog;

use super::disk::{bytes_to_gb, DiskBudgetGuard};

/// Allowed difference between local and remote sizes after the copy.
/// Near-zero; only filesystem rounding passes.
pub const SIZE_TOLERANCE_BYTES: u64 = 4096;

/// Copies the finished package to the remote target
pub struct DistributionStage<'a> {
    config: &'a ResolvedConfig,
}

impl<'a> DistributionStage<'a> {
    pub fn new(config: &'a ResolvedConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self, package: &PackageArtifact, log: &RunLog) -> Result<(), StageError> {
        log.info("===== DISTRIBUTION STAGE =====");

        let Some(remote) = self.config.remote_dir.clone() else {
            return Err(StageError::Distribution(
                "no remote target configured".to_string(),
            ));
        };
        if !remote.exists() {
            return Err(StageError::Distribution(format!(
                "remote target not reachable: {}",
                remote.display()
            )));
        }

        let budget = DiskBudgetGuard::has_budget(&remote, package.compressed_bytes);
        if !budget.ok {
            return Err(StageError::ResourceExhaustion {
                path: remote,
                free_gb: budget.free_gb(),
                required_gb: bytes_to_gb(package.compressed_bytes),
            });
        }

        let Some(file_name) = package.path.file_name() else {
            return Err(StageError::Distribution(
                "package path has no file name".to_string(),
            ));
        };
        let dest = remote.join(file_name);

        log.info(format!("origin: {}", package.path.display()));
        log.info(format!("target: {}", dest.display()));
        log.info(format!(
            "size:   {:.1}MB",
            package.compressed_bytes as f64 / (1024.0 * 1024.0)
        ));

        let started = Instant::now();
        let src = package.path.clone();
        let dst = dest.clone();
        let copied = tokio::task::spawn_blocking(move || std::fs::copy(&src, &dst)).await;

        match copied {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                return Err(StageError::Distribution(format!("copy failed: {}", e)));
            }
            Err(join_err) => {
                return Err(StageError::Unexpected(format!(
                    "distribution task failed: {}",
                    join_err
                )));
            }
        }

        let dest_len = std::fs::metadata(&dest)
            .map(|m| m.len())
            .map_err(|e| StageError::Distribution(format!("cannot stat copied file: {}", e)))?;

        let diff = package.compressed_bytes.abs_diff(dest_len);
        if diff > SIZE_TOLERANCE_BYTES {
            // Leave the mismatched file at the target for inspection.
            log.error(format!(
                "size mismatch after copy: local {} bytes, remote {} bytes",
                package.compressed_bytes, dest_len
            ));
            return Err(StageError::Distribution(format!(
                "size mismatch: local {} bytes, remote {} bytes",
                package.compressed_bytes, dest_len
            )));
        }

        let seconds = started.elapsed().as_secs_f64();
        let rate = if seconds > 0.0 {
            package.compressed_bytes as f64 / (1024.0 * 1024.0) / seconds
        } else {
            0.0
        };
        log.info(format!(
            "distribution complete in {:.1}s ({:.1}MB/s)",
            seconds, rate
        ));

        Ok(())
    }
}
