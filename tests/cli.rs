use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

const ACTION_ENV: [&str; 10] = [
    "GITHUB_WORKSPACE",
    "INPUT_RELEASE",
    "INPUT_WORKSPACE",
    "INPUT_CONFIG",
    "GITHUB_SHA",
    "GITHUB_ACTOR",
    "GITHUB_TOKEN",
    "GITHUB_REPOSITORY",
    "GITHUB_REF",
    "GITHUB_OUTPUT",
];

fn bumpr() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("bumpr"));
    for key in ACTION_ENV {
        cmd.env_remove(key);
    }
    cmd.env_remove("BUMPR_LOG").env_remove("RUNNER_DEBUG");
    cmd
}

#[test]
fn missing_manifest_exits_with_error() {
    let temp_dir = tempdir().unwrap();

    bumpr()
        .arg(temp_dir.path())
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("Using working directory:"))
        .stderr(predicate::str::contains("package.json does not exist in directory:"));
}

#[test]
fn invalid_manifest_exits_with_error() {
    let temp_dir = tempdir().unwrap();
    fs::write(
        temp_dir.path().join("package.json"),
        r#"{ "name": "demo" }"#,
    )
    .unwrap();

    bumpr()
        .current_dir(temp_dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing a \"version\" attribute"));
}

#[test]
fn broken_config_is_reported() {
    let temp_dir = tempdir().unwrap();
    fs::write(temp_dir.path().join("bumpr.toml"), "remote = [").unwrap();
    fs::write(
        temp_dir.path().join("package.json"),
        r#"{ "name": "demo", "version": "0.1.0" }"#,
    )
    .unwrap();

    bumpr()
        .current_dir(temp_dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not valid TOML"));
}

#[test]
fn action_rejects_unknown_release_type() {
    let temp_dir = tempdir().unwrap();

    bumpr()
        .arg("action")
        .env("GITHUB_WORKSPACE", temp_dir.path())
        .env("INPUT_RELEASE", "bogus")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Invalid release type \"bogus\""))
        .stdout(predicate::str::contains("::error::Invalid release type"));
}

#[test]
fn action_requires_a_workspace() {
    bumpr()
        .arg("action")
        .env("INPUT_RELEASE", "patch")
        .assert()
        .failure()
        .stderr(predicate::str::contains("GITHUB_WORKSPACE is not set"));
}

#[test]
fn action_refuses_tag_refs() {
    let temp_dir = tempdir().unwrap();
    fs::write(
        temp_dir.path().join("package.json"),
        r#"{ "name": "@acme/widgets", "version": "1.2.3" }"#,
    )
    .unwrap();

    bumpr()
        .arg("action")
        .env("GITHUB_WORKSPACE", temp_dir.path())
        .env("INPUT_RELEASE", "minor")
        .env("GITHUB_REF", "refs/tags/widgets/v1.2.3")
        .env("GITHUB_TOKEN", "ghs_do_not_print")
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not a branch"))
        .stderr(predicate::str::contains("ghs_do_not_print").not());
}

#[test]
fn help_lists_action_subcommand() {
    bumpr()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("action"))
        .stdout(predicate::str::contains("[DIR]"));
}
