//! CLI smoke tests
//!
//! Every case here fails before any provider call, so the suite runs
//! offline: argument parsing, config validation, and target parsing are
//! exercised through the real binary.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

fn rq() -> Command {
    let mut cmd = Command::cargo_bin("rq").expect("rq binary");
    // Keep host credentials out of the test environment
    cmd.env_remove("OPENAI_API_KEY").env_remove("ANTHROPIC_API_KEY");
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    rq().arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ask").and(predicate::str::contains("analyze")));
}

#[test]
fn test_version_prints() {
    rq().arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("rq"));
}

#[test]
fn test_ask_requires_question() {
    rq().args(["ask", "./src"]).assert().failure();
}

#[test]
fn test_analyze_requires_target() {
    rq().arg("analyze").assert().failure();
}

#[test]
fn test_missing_api_key_fails_fast() {
    rq().args(["analyze", "@src"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("LLM API key not found"));
}

#[test]
fn test_analyze_rejects_branchless_tree_url() {
    rq().env("OPENAI_API_KEY", "dummy")
        .args(["analyze", "https://github.com/user/repo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected a /tree/<branch>/<dir> URL"));
}

#[test]
fn test_analyze_rejects_mixed_targets() {
    rq().env("OPENAI_API_KEY", "dummy")
        .args(["analyze", "https://github.com/user/repo/tree/main/src", "@local/dir"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("all GitHub URLs or all local paths"));
}

#[test]
fn test_ask_missing_directory() {
    rq().env("OPENAI_API_KEY", "dummy")
        .args(["ask", "/nonexistent/repoquery-cli-test", "what is this?"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not a directory"));
}

#[test]
fn test_invalid_log_level_is_rejected() {
    rq().args(["--log-level", "shouty", "analyze", "@src"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid log level"));
}
