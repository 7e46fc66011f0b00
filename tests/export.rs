//! Export Stage Integration Tests
//!
//! The external export tool is stood in by shell scripts that honor the
//! same argument contract (DUMPFILE=..., LOGFILE=...), so the controller's
//! validation, classification, and isolation rules are exercised without
//! the real tool.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use dumpkeeper::adapters::ExportTool;
use dumpkeeper::config::{
    ExporterConfig, ResolvedConfig, RetentionConfig, ThresholdsConfig,
};
use dumpkeeper::core::ExportStageController;
use dumpkeeper::domain::{DataSourceSpec, ExportStatus};
use dumpkeeper::report::RunLog;

/// Stub that extracts DUMPFILE= and LOGFILE= like the real tool would
const STUB_PRELUDE: &str = r#"
for a in "$@"; do
  case "$a" in
    DUMPFILE=*) dump="${a#DUMPFILE=}" ;;
    LOGFILE=*) side="${a#LOGFILE=}" ;;
  esac
done
side="${side#*:}"
"#;

fn write_stub(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n{}\n", STUB_PRELUDE, body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn source(name: &str, credential_env: &str, timeout_seconds: Option<u64>) -> DataSourceSpec {
    DataSourceSpec {
        name: name.to_string(),
        credential_env: credential_env.to_string(),
        filename_template: "{name}_{weekday}.dmp".to_string(),
        timeout_seconds,
    }
}

fn test_config(root: &Path, sources: Vec<DataSourceSpec>) -> ResolvedConfig {
    let config = ResolvedConfig {
        dump_dir: root.join("dumps"),
        remote_dir: None,
        log_dir: root.join("logs"),
        sources,
        exporter: ExporterConfig::default(),
        thresholds: ThresholdsConfig {
            // Tiny floor so stub-produced files qualify
            min_artifact_bytes: 1000,
            min_free_export_gb: 0.001,
            ..Default::default()
        },
        retention: RetentionConfig::default(),
        notification: None,
        config_file: None,
    };
    std::fs::create_dir_all(&config.dump_dir).unwrap();
    config
}

async fn run_with_stub(config: &ResolvedConfig, stub: &Path) -> Vec<dumpkeeper::ExportResult> {
    let tool = ExportTool::with_binary_path(stub.to_string_lossy());
    ExportStageController::new(config, tool)
        .run_all(&RunLog::disabled())
        .await
}

#[tokio::test]
async fn test_clean_export_is_success() {
    std::env::set_var("DK_TEST_CRED_CLEAN", "user/secret");
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path(), vec![source("ALPHA", "DK_TEST_CRED_CLEAN", None)]);
    let stub = write_stub(
        temp.path(),
        "ok.sh",
        "head -c 200000 /dev/zero > \"$dump\"\nexit 0",
    );

    let results = run_with_stub(&config, &stub).await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, ExportStatus::Success);
    assert_eq!(results[0].size_bytes, 200_000);
    let artifact = results[0].artifact.clone().unwrap();
    assert!(artifact.exists());
    assert!(artifact
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("ALPHA_"));
}

#[tokio::test]
async fn test_warning_exit_code_is_success_with_warnings() {
    std::env::set_var("DK_TEST_CRED_WARN", "user/secret");
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path(), vec![source("BETA", "DK_TEST_CRED_WARN", None)]);
    let stub = write_stub(
        temp.path(),
        "warn.sh",
        "head -c 200000 /dev/zero > \"$dump\"\nexit 5",
    );

    let results = run_with_stub(&config, &stub).await;

    assert_eq!(results[0].status, ExportStatus::SuccessWithWarnings);
    assert!(results[0].is_usable());
}

#[tokio::test]
async fn test_unexpected_exit_code_fails_despite_artifact() {
    std::env::set_var("DK_TEST_CRED_BADCODE", "user/secret");
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path(), vec![source("GAMMA", "DK_TEST_CRED_BADCODE", None)]);
    let stub = write_stub(
        temp.path(),
        "badcode.sh",
        "head -c 200000 /dev/zero > \"$dump\"\nexit 12",
    );

    let results = run_with_stub(&config, &stub).await;

    assert_eq!(results[0].status, ExportStatus::Failed);
    assert!(!results[0].is_usable());
    assert!(results[0]
        .diagnostics
        .iter()
        .any(|l| l.contains("exit code")));
}

#[tokio::test]
async fn test_undersized_artifact_fails_despite_clean_exit() {
    std::env::set_var("DK_TEST_CRED_SMALL", "user/secret");
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path(), vec![source("DELTA", "DK_TEST_CRED_SMALL", None)]);
    let stub = write_stub(
        temp.path(),
        "small.sh",
        "head -c 10 /dev/zero > \"$dump\"\nexit 0",
    );

    let results = run_with_stub(&config, &stub).await;

    assert_eq!(results[0].status, ExportStatus::Failed);
    assert_eq!(results[0].size_bytes, 10);
    assert!(results[0].artifact.is_none());
}

#[tokio::test]
async fn test_missing_artifact_folds_in_side_log() {
    std::env::set_var("DK_TEST_CRED_NOFILE", "user/secret");
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path(), vec![source("EPSILON", "DK_TEST_CRED_NOFILE", None)]);
    let stub = write_stub(
        temp.path(),
        "nofile.sh",
        "echo 'ORA-39002: invalid operation' > \"$side\"\nexit 0",
    );

    let results = run_with_stub(&config, &stub).await;

    assert_eq!(results[0].status, ExportStatus::Failed);
    assert!(results[0]
        .diagnostics
        .iter()
        .any(|l| l.contains("ORA-39002")));
}

#[tokio::test]
async fn test_timeout_kills_and_classifies() {
    std::env::set_var("DK_TEST_CRED_SLOW", "user/secret");
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path(), vec![source("ZETA", "DK_TEST_CRED_SLOW", Some(1))]);
    let stub = write_stub(temp.path(), "slow.sh", "sleep 5\nexit 0");

    let results = run_with_stub(&config, &stub).await;

    assert_eq!(results[0].status, ExportStatus::TimedOut);
    assert!(results[0].duration_ms >= 1000);
    assert!(results[0].duration_ms < 5000, "child must be killed, not awaited");
}

#[tokio::test]
async fn test_failed_source_does_not_abort_siblings() {
    std::env::set_var("DK_TEST_CRED_MIXED", "user/secret");
    let temp = TempDir::new().unwrap();
    let config = test_config(
        temp.path(),
        vec![
            source("BAD", "DK_TEST_CRED_MIXED", None),
            source("GOOD", "DK_TEST_CRED_MIXED", None),
        ],
    );
    // Fails for BAD_*, succeeds for everything else
    let stub = write_stub(
        temp.path(),
        "mixed.sh",
        r#"case "$dump" in
  BAD_*) exit 12 ;;
  *) head -c 200000 /dev/zero > "$dump"; exit 0 ;;
esac"#,
    );

    let results = run_with_stub(&config, &stub).await;

    // Every configured source was attempted, in order
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].source, "BAD");
    assert_eq!(results[0].status, ExportStatus::Failed);
    assert_eq!(results[1].source, "GOOD");
    assert_eq!(results[1].status, ExportStatus::Success);
}

#[tokio::test]
async fn test_stale_artifact_removed_before_run() {
    std::env::set_var("DK_TEST_CRED_STALE", "user/secret");
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path(), vec![source("ETA", "DK_TEST_CRED_STALE", None)]);

    // Plant a stale artifact under the exact name today's run will use
    let now = chrono::Local::now();
    let stale = config.dump_dir.join(config.sources[0].render_filename(&now));
    std::fs::write(&stale, vec![1u8; 500_000]).unwrap();

    // The stub writes nothing and fails; the stale file must not survive
    // as a false positive
    let stub = write_stub(temp.path(), "stale.sh", "exit 12");
    let results = run_with_stub(&config, &stub).await;

    assert_eq!(results[0].status, ExportStatus::Failed);
    assert!(!stale.exists(), "stale artifact must be deleted before the job");
}

#[tokio::test]
async fn test_missing_credential_fails_without_launching() {
    let temp = TempDir::new().unwrap();
    let config = test_config(
        temp.path(),
        vec![source("THETA", "DK_TEST_CRED_DEFINITELY_UNSET", None)],
    );
    let stub = write_stub(
        temp.path(),
        "never.sh",
        "head -c 200000 /dev/zero > \"$dump\"\nexit 0",
    );

    let results = run_with_stub(&config, &stub).await;

    assert_eq!(results[0].status, ExportStatus::Failed);
    assert!(results[0]
        .diagnostics
        .iter()
        .any(|l| l.contains("DK_TEST_CRED_DEFINITELY_UNSET")));
    // No artifact was produced
    assert!(results[0].artifact.is_none());
}
