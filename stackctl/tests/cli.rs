use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

fn stackctl() -> Command {
    let mut cmd = Command::cargo_bin("stackctl").unwrap();
    cmd.env_remove("STACKCTL_HOME")
        .env("STACKCTL_LOG_OUTPUT", "off");
    cmd
}

#[test]
fn test_help_lists_commands() {
    stackctl()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("start"))
        .stdout(predicate::str::contains("update"))
        .stdout(predicate::str::contains("credentials"))
        .stdout(predicate::str::contains("network"));
}

#[test]
fn test_missing_compose_file_is_configuration_error() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempdir()?;
    let install_root = temp_dir.path().join("install");

    stackctl()
        .current_dir(temp_dir.path())
        .arg("--install-root")
        .arg(&install_root)
        .arg("status")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Configuration error"))
        .stderr(predicate::str::contains("No compose file found"))
        .stderr(predicate::str::contains("--compose-file"));
    Ok(())
}

#[test]
fn test_explicit_missing_env_file_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempdir()?;
    let compose = temp_dir.path().join("docker-compose.yml");
    fs::write(&compose, "services: {}\n")?;

    stackctl()
        .current_dir(temp_dir.path())
        .arg("--compose-file")
        .arg(&compose)
        .arg("--env-file")
        .arg(temp_dir.path().join("missing.env"))
        .arg("status")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("missing.env"));
    Ok(())
}

#[test]
fn test_invalid_settings_file_is_configuration_error() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempdir()?;
    fs::write(temp_dir.path().join("docker-compose.yml"), "services: {}\n")?;
    fs::write(temp_dir.path().join(".env"), "POSTGRES_USER=app\n")?;
    fs::write(temp_dir.path().join("stackctl.yaml"), "poll_interval_secs: 0\n")?;

    stackctl()
        .current_dir(temp_dir.path())
        .arg("--install-root")
        .arg(temp_dir.path())
        .arg("status")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("poll_interval_secs"));
    Ok(())
}

#[test]
fn test_unknown_service_is_usage_error() {
    stackctl()
        .args(["stop", "mailer"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown service 'mailer'"));
}

#[test]
fn test_update_requires_a_plan() {
    stackctl()
        .arg("update")
        .assert()
        .failure()
        .stderr(predicate::str::contains("SERVICE=TAG"));
}
