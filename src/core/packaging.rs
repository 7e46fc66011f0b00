//! Packaging stage: one compressed container per run.
//!
//! Qualifying export artifacts are streamed into a single `.tar.zst`
//! container named after the run date. The stage checks its disk budget
//! before writing and verifies the container afterwards; a failed attempt
//! never leaves a partial file behind.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use sha2::{Digest, Sha256};

use crate::config::ResolvedConfig;
use crate::domain::package::package_name;
use crate::domain::{ExportResult, PackageArtifact};
use crate::error::StageError;
use crate::report::RunLog;

use super::disk::{bytes_to_gb, DiskBudgetGuard};

/// Zstd level for the run package.
///
/// Bounded effort: dump files are large and the window for the nightly run
/// is finite, so throughput wins over the last few percent of ratio.
const PACKAGE_ZSTD_LEVEL: i32 = 3;

/// Builds the run package from qualifying export artifacts
pub struct PackagingStage<'a> {
    config: &'a ResolvedConfig,
}

impl<'a> PackagingStage<'a> {
    pub fn new(config: &'a ResolvedConfig) -> Self {
        Self { config }
    }

    /// Package the usable artifacts into one container.
    ///
    /// Fails without writing when no artifact qualifies or the disk budget
    /// is insufficient; deletes the container when a write or the
    /// post-write verification fails.
    pub async fn run(
        &self,
        results: &[ExportResult],
        log: &RunLog,
    ) -> Result<PackageArtifact, StageError> {
        log.info("===== PACKAGING STAGE =====");

        let mut inputs: Vec<(PathBuf, String, u64)> = Vec::new();
        for result in results.iter().filter(|r| r.is_usable()) {
            let Some(path) = &result.artifact else { continue };
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            match std::fs::metadata(path) {
                Ok(meta) if meta.len() > 0 => {
                    inputs.push((path.clone(), name.to_string(), meta.len()))
                }
                _ => log.warn(format!("skipping missing or empty artifact {}", name)),
            }
        }

        if inputs.is_empty() {
            log.error("no artifacts qualified for packaging");
            return Err(StageError::NoArtifacts);
        }

        let input_bytes: u64 = inputs.iter().map(|(_, _, size)| size).sum();
        let estimated = (input_bytes as f64 * self.config.thresholds.package_size_fraction) as u64;

        let budget = DiskBudgetGuard::has_budget(&self.config.dump_dir, estimated);
        if !budget.ok {
            log.error(format!(
                "insufficient disk budget for package: ~{:.1}GB needed, {:.1}GB free",
                bytes_to_gb(estimated),
                budget.free_gb()
            ));
            return Err(StageError::ResourceExhaustion {
                path: self.config.dump_dir.clone(),
                free_gb: budget.free_gb(),
                required_gb: bytes_to_gb(estimated),
            });
        }

        let name = package_name(&Local::now());
        let path = self.config.dump_dir.join(&name);
        log.info(format!(
            "creating {} from {} artifacts ({:.1}MB total)",
            name,
            inputs.len(),
            input_bytes as f64 / (1024.0 * 1024.0)
        ));

        let build_path = path.clone();
        let build_inputs = inputs.clone();
        let built =
            tokio::task::spawn_blocking(move || build_archive(&build_path, &build_inputs)).await;

        let sha256 = match built {
            Ok(Ok(digest)) => digest,
            Ok(Err(e)) => {
                remove_partial(&path, log);
                return Err(StageError::IntegrityCheck {
                    path,
                    detail: format!("{:#}", e),
                });
            }
            Err(join_err) => {
                remove_partial(&path, log);
                return Err(StageError::Unexpected(format!(
                    "packaging task failed: {}",
                    join_err
                )));
            }
        };

        // Post-flight: the container must exist with non-zero size.
        let compressed_bytes = match std::fs::metadata(&path) {
            Ok(meta) if meta.len() > 0 => meta.len(),
            _ => {
                remove_partial(&path, log);
                return Err(StageError::IntegrityCheck {
                    path,
                    detail: "container missing or empty after write".to_string(),
                });
            }
        };

        let package = PackageArtifact {
            path,
            input_bytes,
            compressed_bytes,
            sha256,
            created_at: Utc::now(),
            members: inputs.into_iter().map(|(_, name, _)| name).collect(),
        };

        log.info(format!(
            "package ready: {:.1}MB -> {:.1}MB ({:.1}% saved), sha256 {}",
            package.input_bytes as f64 / (1024.0 * 1024.0),
            package.compressed_bytes as f64 / (1024.0 * 1024.0),
            package.ratio_percent(),
            &package.sha256[..16.min(package.sha256.len())]
        ));

        Ok(package)
    }
}

/// Stream the inputs into a zstd-compressed tar and return its sha256
fn build_archive(dest: &Path, inputs: &[(PathBuf, String, u64)]) -> Result<String> {
    let file = std::fs::File::create(dest)
        .with_context(|| format!("Failed to create package {}", dest.display()))?;
    let encoder = zstd::Encoder::new(std::io::BufWriter::new(file), PACKAGE_ZSTD_LEVEL)
        .context("Failed to initialize compressor")?;

    let mut builder = tar::Builder::new(encoder);
    for (path, name, _) in inputs {
        builder
            .append_path_with_name(path, name)
            .with_context(|| format!("Failed to archive {}", path.display()))?;
    }

    let encoder = builder.into_inner().context("Failed to finish archive")?;
    let mut writer = encoder.finish().context("Failed to finish compression")?;
    writer.flush().context("Failed to flush package")?;
    drop(writer);

    file_sha256(dest)
}

fn file_sha256(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {} for checksum", path.display()))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).context("Failed to hash package")?;
    Ok(hex::encode(hasher.finalize()))
}

fn remove_partial(path: &Path, log: &RunLog) {
    if path.exists() {
        match std::fs::remove_file(path) {
            Ok(()) => log.info("partial package removed"),
            Err(e) => log.warn(format!("could not remove partial package: {}", e)),
        }
    }
}
