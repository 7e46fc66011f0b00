//! Packaging Integration Tests
//!
//! Tests for the pre-flight budget gate, container creation, integrity
//! verification, and the no-partial-file guarantee.

use std::path::Path;

use sha2::{Digest, Sha256};
use tempfile::TempDir;

use dumpkeeper::config::{
    ExporterConfig, ResolvedConfig, RetentionConfig, ThresholdsConfig,
};
use dumpkeeper::core::retention::discover_packages;
use dumpkeeper::core::PackagingStage;
use dumpkeeper::domain::{ExportResult, ExportStatus};
use dumpkeeper::report::RunLog;
use dumpkeeper::StageError;

fn test_config(root: &Path) -> ResolvedConfig {
    let config = ResolvedConfig {
        dump_dir: root.join("dumps"),
        remote_dir: None,
        log_dir: root.join("logs"),
        sources: Vec::new(),
        exporter: ExporterConfig::default(),
        thresholds: ThresholdsConfig::default(),
        retention: RetentionConfig::default(),
        notification: None,
        config_file: None,
    };
    std::fs::create_dir_all(&config.dump_dir).unwrap();
    config
}

fn artifact(dir: &Path, name: &str, bytes: usize) -> ExportResult {
    let path = dir.join(name);
    std::fs::write(&path, vec![42u8; bytes]).unwrap();
    ExportResult {
        source: name.trim_end_matches(".dmp").to_string(),
        artifact: Some(path),
        size_bytes: bytes as u64,
        duration_ms: 100,
        status: ExportStatus::Success,
        diagnostics: Vec::new(),
    }
}

fn file_sha256(path: &Path) -> String {
    let mut file = std::fs::File::open(path).unwrap();
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).unwrap();
    hex::encode(hasher.finalize())
}

#[tokio::test]
async fn test_package_created_with_verified_digest() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());

    let results = vec![
        artifact(&config.dump_dir, "HORIZONTE_monday.dmp", 200_000),
        artifact(&config.dump_dir, "SYSALL_monday.dmp", 150_000),
    ];

    let package = PackagingStage::new(&config)
        .run(&results, &RunLog::disabled())
        .await
        .unwrap();

    assert!(package.path.exists());
    assert_eq!(package.input_bytes, 350_000);
    assert!(package.compressed_bytes > 0);
    // Repetitive dumps compress well below the input size
    assert!(package.compressed_bytes < package.input_bytes);
    assert!(package.ratio_percent() > 0.0);
    assert_eq!(package.members.len(), 2);
    assert!(package.members.contains(&"HORIZONTE_monday.dmp".to_string()));
    assert_eq!(package.sha256, file_sha256(&package.path));
}

#[tokio::test]
async fn test_failed_results_are_not_packaged() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());

    let good = artifact(&config.dump_dir, "GOOD_monday.dmp", 120_000);
    let mut bad = artifact(&config.dump_dir, "BAD_monday.dmp", 120_000);
    bad.status = ExportStatus::Failed;

    let package = PackagingStage::new(&config)
        .run(&[good, bad], &RunLog::disabled())
        .await
        .unwrap();

    assert_eq!(package.members, vec!["GOOD_monday.dmp".to_string()]);
}

#[tokio::test]
async fn test_empty_input_fails_without_writing() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());

    let err = PackagingStage::new(&config)
        .run(&[], &RunLog::disabled())
        .await
        .unwrap_err();

    assert!(matches!(err, StageError::NoArtifacts));
    assert!(discover_packages(&config.dump_dir).is_empty());
}

#[tokio::test]
async fn test_vanished_artifacts_fail_without_writing() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());

    // Result claims an artifact that no longer exists on disk
    let mut ghost = artifact(&config.dump_dir, "GHOST_monday.dmp", 120_000);
    std::fs::remove_file(ghost.artifact.clone().unwrap()).unwrap();
    ghost.size_bytes = 120_000;

    let err = PackagingStage::new(&config)
        .run(&[ghost], &RunLog::disabled())
        .await
        .unwrap_err();

    assert!(matches!(err, StageError::NoArtifacts));
    assert!(discover_packages(&config.dump_dir).is_empty());
}

#[tokio::test]
async fn test_budget_refusal_writes_nothing() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(temp.path());

    // Inflate the estimate far beyond any real disk
    config.thresholds.package_size_fraction = 1e12;

    let results = vec![artifact(&config.dump_dir, "HORIZONTE_monday.dmp", 200_000)];

    let err = PackagingStage::new(&config)
        .run(&results, &RunLog::disabled())
        .await
        .unwrap_err();

    assert!(matches!(err, StageError::ResourceExhaustion { .. }));
    assert!(discover_packages(&config.dump_dir).is_empty());
}

#[tokio::test]
async fn test_write_failure_leaves_no_partial_file() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());

    let results = vec![artifact(&config.dump_dir, "HORIZONTE_monday.dmp", 200_000)];

    // Occupy the container's name with a directory so the write fails
    let name = dumpkeeper::domain::package::package_name(&chrono::Local::now());
    std::fs::create_dir(config.dump_dir.join(&name)).unwrap();

    let outcome = PackagingStage::new(&config)
        .run(&results, &RunLog::disabled())
        .await;

    assert!(matches!(outcome, Err(StageError::IntegrityCheck { .. })));
    // The blocking entry is untouched and no partial container appeared
    assert!(config.dump_dir.join(&name).is_dir());
}

#[tokio::test]
async fn test_same_day_rerun_overwrites_package() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());

    let results = vec![artifact(&config.dump_dir, "HORIZONTE_monday.dmp", 200_000)];
    let stage = PackagingStage::new(&config);

    let first = stage.run(&results, &RunLog::disabled()).await.unwrap();
    let second = stage.run(&results, &RunLog::disabled()).await.unwrap();

    // Same calendar day -> same container name, one package on disk
    assert_eq!(first.path, second.path);
    assert_eq!(discover_packages(&config.dump_dir).len(), 1);
}
