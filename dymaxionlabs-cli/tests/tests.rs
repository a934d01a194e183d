//! Integration tests for the `dymaxion` executable.

use cli_test_dir::*;

#[test]
fn help_flag() {
    let testdir = TestDir::new("dymaxion", "help_flag");
    let output = testdir.cmd().arg("--help").expect_success();
    assert!(output.stdout_str().contains("dymaxion"));
    assert!(output.stdout_str().contains("upload"));
    assert!(output.stdout_str().contains("predict"));
}

#[test]
fn version_flag() {
    let testdir = TestDir::new("dymaxion", "version_flag");
    let output = testdir.cmd().arg("--version").expect_success();
    assert!(output.stdout_str().contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn task_help_lists_subcommands() {
    let testdir = TestDir::new("dymaxion", "task_help_lists_subcommands");
    let output = testdir.cmd().args(&["task", "--help"]).expect_success();
    for cmd in &["status", "wait", "cancel", "artifacts"] {
        assert!(output.stdout_str().contains(cmd), "missing {}", cmd);
    }
}

#[test]
fn rejects_malformed_metadata() {
    let testdir = TestDir::new("dymaxion", "rejects_malformed_metadata");
    let output = testdir
        .cmd()
        .args(&["create-estimator", "pools", "--metadata", "no-equals-sign"])
        .expect_failure();
    assert!(output.stderr_str().contains("key=value"));
}

#[test]
fn rejects_unknown_estimator_types() {
    let testdir = TestDir::new("dymaxion", "rejects_unknown_estimator_types");
    testdir
        .cmd()
        .args(&["create-estimator", "pools", "--type", "classification"])
        .expect_failure();
}

#[test]
fn requires_an_api_key() {
    let testdir = TestDir::new("dymaxion", "requires_an_api_key");
    let output = testdir
        .cmd()
        .env_remove("DYM_API_KEY")
        .args(&["files"])
        .expect_failure();
    assert!(output.stderr_str().contains("DYM_API_KEY"));
}
