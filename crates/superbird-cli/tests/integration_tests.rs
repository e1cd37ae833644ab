//! Integration tests for the superbird CLI
//!
//! Everything here runs without a device: offline commands, argument
//! handling and the exit codes of failures that happen before or while
//! reaching the USB helper.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use superbird_provision::ToolConfig;
use superbird_provision::env::encode_as_text;
use superbird_test_helpers::prelude::*;
use tempfile::TempDir;

/// Custom predicate to check if output is valid JSON
fn is_json() -> impl predicates::Predicate<[u8]> {
    predicates::function::function(|s: &[u8]| {
        std::str::from_utf8(s)
            .map(|text| serde_json::from_str::<Value>(text).is_ok())
            .unwrap_or(false)
    })
}

fn superbird() -> Result<Command, Box<dyn std::error::Error>> {
    Ok(Command::cargo_bin("superbird")?)
}

/// Config file sized for the fixture environment regions
fn write_config(dir: &TempDir) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let config = ToolConfig {
        env_region_size: TEST_REGION_SIZE,
        ..ToolConfig::default()
    };
    let path = dir.path().join("config.json");
    std::fs::write(&path, serde_json::to_string_pretty(&config)?)?;
    Ok(path)
}

fn write_env_dump(dir: &Path, contents: &[u8]) -> std::io::Result<PathBuf> {
    let path = dir.join("env.dump");
    std::fs::write(&path, contents)?;
    Ok(path)
}

#[test]
fn help_lists_workflows() -> TestResult {
    superbird()?
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("dump-device"))
        .stdout(predicate::str::contains("restore-device"))
        .stdout(predicate::str::contains("env"));
    Ok(())
}

#[test]
fn env_help_lists_subcommands() -> TestResult {
    superbird()?
        .args(["env", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("merge"))
        .stdout(predicate::str::contains("replace"))
        .stdout(predicate::str::contains("restore-stock"))
        .stdout(predicate::str::contains("convert"));
    Ok(())
}

#[test]
fn completion_generates_script() -> TestResult {
    superbird()?
        .args(["completion", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("superbird"));
    Ok(())
}

#[test]
fn convert_writes_text_form_of_dump() -> TestResult {
    let dir = tempfile::tempdir()?;
    let config = write_config(&dir)?;
    let dump = write_env_dump(dir.path(), &env_region(&sample_env()))?;
    let text = dir.path().join("env.txt");

    superbird()?
        .arg("--config")
        .arg(&config)
        .args(["env", "convert"])
        .arg(&dump)
        .arg(&text)
        .assert()
        .success()
        .stdout(predicate::str::contains("7 variables"));

    assert_eq!(std::fs::read_to_string(&text)?, encode_as_text(&sample_env()));
    Ok(())
}

#[test]
fn convert_json_output_carries_the_environment() -> TestResult {
    let dir = tempfile::tempdir()?;
    let config = write_config(&dir)?;
    let dump = write_env_dump(dir.path(), &env_region(&sample_env()))?;
    let text = dir.path().join("env.txt");

    let output = superbird()?
        .arg("--json")
        .arg("--config")
        .arg(&config)
        .args(["env", "convert"])
        .arg(&dump)
        .arg(&text)
        .assert()
        .success()
        .stdout(is_json())
        .get_output()
        .stdout
        .clone();

    let value: Value = serde_json::from_slice(&output)?;
    assert_eq!(value["success"], Value::Bool(true));
    assert_eq!(value["env"]["bootcmd"], Value::from("run check_charger"));
    Ok(())
}

#[test]
fn corrupt_dump_is_rejected_as_invalid_input() -> TestResult {
    let dir = tempfile::tempdir()?;
    let config = write_config(&dir)?;
    let dump = write_env_dump(dir.path(), &[0xff; 128])?;
    let text = dir.path().join("env.txt");

    superbird()?
        .arg("--config")
        .arg(&config)
        .args(["env", "convert"])
        .arg(&dump)
        .arg(&text)
        .assert()
        .code(4)
        .stderr(predicate::str::contains("env.dump"));

    assert!(!text.exists());
    Ok(())
}

#[test]
fn invalid_config_is_rejected() -> TestResult {
    let dir = tempfile::tempdir()?;
    let config = dir.path().join("config.json");
    std::fs::write(&config, r#"{ "schema_version": "superbird.config/0" }"#)?;
    let dump = write_env_dump(dir.path(), &env_region(&sample_env()))?;

    superbird()?
        .arg("--config")
        .arg(&config)
        .args(["env", "convert"])
        .arg(&dump)
        .arg(dir.path().join("env.txt"))
        .assert()
        .code(4)
        .stderr(predicate::str::contains("schema version"));
    Ok(())
}

#[test]
fn offline_command_does_not_create_a_config_file() -> TestResult {
    let dir = tempfile::tempdir()?;
    let config = dir.path().join("nested").join("config.json");

    superbird()?
        .arg("--config")
        .arg(&config)
        .args(["env", "convert"])
        .arg(dir.path().join("absent.dump"))
        .arg(dir.path().join("env.txt"))
        .assert()
        .failure();

    assert!(!config.exists());
    assert!(!dir.path().join("nested").exists());
    Ok(())
}

#[test]
fn device_command_creates_missing_config_with_defaults() -> TestResult {
    let dir = tempfile::tempdir()?;
    let config = dir.path().join("nested").join("config.json");

    superbird()?
        .arg("--config")
        .arg(&config)
        .arg("find-device")
        .env("SUPERBIRD_HELPER", dir.path().join("no-such-helper"))
        .assert()
        .failure();

    let created: ToolConfig = serde_json::from_str(&std::fs::read_to_string(&config)?)?;
    assert_eq!(created, ToolConfig::default());
    Ok(())
}

#[test]
fn unreachable_helper_is_a_transport_failure() -> TestResult {
    let dir = tempfile::tempdir()?;
    let config = write_config(&dir)?;

    superbird()?
        .arg("--json")
        .arg("--config")
        .arg(&config)
        .arg("find-device")
        .env("SUPERBIRD_HELPER", dir.path().join("no-such-helper"))
        .assert()
        .code(5)
        .stdout(is_json())
        .stdout(predicate::str::contains(r#""success": false"#));
    Ok(())
}

#[test]
fn conflicting_burn_speeds_are_a_usage_error() -> TestResult {
    superbird()?
        .args(["--slow-burn", "--slower-burn", "find-device"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("cannot be used with"));
    Ok(())
}
