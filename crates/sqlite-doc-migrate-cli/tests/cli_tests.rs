//! CLI integration tests for sqlite-doc-migrate.
//!
//! These tests verify command-line argument parsing, help output,
//! exit codes for setup failures, and a full run against a temp snapshot.

use assert_cmd::Command;
use predicates::prelude::*;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Get a command for the sqlite-doc-migrate binary.
fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("sqlite-doc-migrate").unwrap();
    for var in ["CONFIG_PATH", "SNAPSHOT_URL", "ETL_LOG_CSV", "ETL_LOG_URL"] {
        cmd.env_remove(var);
    }
    cmd
}

/// Write a three-row Fish table, one row without an Id.
fn write_snapshot(path: &Path) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .journal_mode(SqliteJournalMode::Delete)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE Fish (Id INTEGER, tenantId TEXT, Name TEXT, IsReefSafe TEXT, CreatedAt INTEGER)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO Fish VALUES \
             (1, 't1', 'Neon Tetra', 'yes', 1700000000), \
             (NULL, 't1', 'Ghost', 'no', 1700000000), \
             (3, NULL, 'Guppy', 'maybe', NULL)",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool.close().await;
    });
}

/// Write a YAML config for the Fish table using the in-memory destination.
fn write_config(dir: &Path, snapshot: &Path) -> PathBuf {
    let path = dir.join("config.yaml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "database: tankmates").unwrap();
    writeln!(file, "batchSize: 2").unwrap();
    writeln!(file, "concurrency: 2").unwrap();
    writeln!(file, "containers:").unwrap();
    writeln!(file, "  Fish:").unwrap();
    writeln!(file, "    idField: Id").unwrap();
    writeln!(file, "    boolFields: [IsReefSafe]").unwrap();
    writeln!(file, "    dateFields: [CreatedAt]").unwrap();
    writeln!(file, "source:").unwrap();
    writeln!(file, "  path: {}", snapshot.display()).unwrap();
    writeln!(file, "destination:").unwrap();
    writeln!(file, "  kind: memory").unwrap();
    writeln!(file, "audit:").unwrap();
    writeln!(file, "  path: {}", dir.join("etl_log.csv").display()).unwrap();
    path
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_run_subcommand_help() {
    cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--snapshot-url"))
        .stdout(predicate::str::contains("--audit-log"))
        .stdout(predicate::str::contains("--audit-export-url"))
        .stdout(predicate::str::contains("--batch-size"))
        .stdout(predicate::str::contains("--concurrency"))
        .stdout(predicate::str::contains("SNAPSHOT_URL"))
        .stdout(predicate::str::contains("ETL_LOG_URL"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sqlite-doc-migrate"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_output_json_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"));
}

#[test]
fn test_log_format_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"));
}

#[test]
fn test_verbosity_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: info]"));
}

#[test]
fn test_config_default_path() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("[default: config.yaml]"))
        .stdout(predicate::str::contains("CONFIG_PATH"));
}

#[test]
fn test_short_config_flag() {
    cmd()
        .args(["-c", "some_config.yaml", "--help"])
        .assert()
        .success();
}

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

// =============================================================================
// Exit Code Tests - Config Errors (Exit Code 2)
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_2() {
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "validate"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("configuration file not found"));
}

#[test]
fn test_config_path_from_env() {
    cmd()
        .env("CONFIG_PATH", "nonexistent_from_env.yaml")
        .arg("validate")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("nonexistent_from_env.yaml"));
}

#[test]
fn test_invalid_yaml_exits_with_code_2() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "validate"])
        .assert()
        .code(2);
}

#[test]
fn test_missing_required_fields_exits_with_code_2() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "database: tankmates").unwrap();
    writeln!(file, "containers: {{}}").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "validate"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("containers"));
}

#[test]
fn test_invalid_json_config_exits_with_code_2() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    writeln!(file, "{{\"database\": ").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "validate"])
        .assert()
        .code(2);
}

// =============================================================================
// Exit Code Tests - Setup Errors
// =============================================================================

#[test]
fn test_missing_snapshot_exits_with_code_3() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &dir.path().join("missing.db"));

    cmd()
        .args(["--config", config.to_str().unwrap(), "run"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("snapshot file not found"));
}

#[test]
fn test_health_check_reports_tables() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("snapshot.db");
    write_snapshot(&snapshot);
    let config = write_config(dir.path(), &snapshot);

    cmd()
        .args(["--config", config.to_str().unwrap(), "health-check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Fish: OK (3 rows)"))
        .stdout(predicate::str::contains("HEALTHY"));
}

// =============================================================================
// Command Behavior Tests
// =============================================================================

#[test]
fn test_validate_prints_tables() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &dir.path().join("snapshot.db"));

    cmd()
        .args(["--config", config.to_str().unwrap(), "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("Fish: id=Id pk=tenantId"));
}

#[test]
fn test_run_end_to_end_json() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("snapshot.db");
    write_snapshot(&snapshot);
    let config = write_config(dir.path(), &snapshot);

    let output = cmd()
        .args([
            "--config",
            config.to_str().unwrap(),
            "--output-json",
            "--verbosity",
            "warn",
            "run",
        ])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let fish = &summary["tables"][0];
    assert_eq!(fish[0], "Fish");
    assert_eq!(fish[1]["rows_read"], 3);
    assert_eq!(fish[1]["rows_transformed"], 2);
    assert_eq!(fish[1]["missing_id"], 1);
    assert_eq!(fish[1]["ok_upserts"], 2);
    assert_eq!(summary["audit"]["totals"]["processed"], 3);

    let audit = std::fs::read_to_string(dir.path().join("etl_log.csv")).unwrap();
    assert_eq!(audit.lines().count(), 4, "header plus one record per row");
    assert!(audit.starts_with("table,id,status,warnings"));
}

#[test]
fn test_run_audit_log_override() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("snapshot.db");
    write_snapshot(&snapshot);
    let config = write_config(dir.path(), &snapshot);
    let audit = dir.path().join("logs").join("override.csv");

    cmd()
        .env("ETL_LOG_CSV", audit.to_str().unwrap())
        .args(["--config", config.to_str().unwrap(), "run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ETL SUMMARY"))
        .stdout(predicate::str::contains("AUDIT LOG SUMMARY"));

    assert!(audit.exists());
}
