use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// nothing listens on the discard port
const DEAD_URL: &str = "http://127.0.0.1:9";

#[test]
fn help_lists_controller_commands() {
    let mut cmd = cargo_bin_cmd!("casparctl");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("connect"))
        .stdout(predicate::str::contains("watch"));
}

#[test]
fn status_fails_when_daemon_is_down() {
    let mut cmd = cargo_bin_cmd!("casparctl");
    cmd.arg("--url")
        .arg(DEAD_URL)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to reach casparclock"));
}

#[test]
fn url_can_come_from_environment() {
    let mut cmd = cargo_bin_cmd!("casparctl");
    cmd.env("CASPARCLOCK_URL", DEAD_URL)
        .arg("update")
        .assert()
        .failure()
        .stderr(predicate::str::contains("127.0.0.1:9/api/caspar"));
}

#[test]
fn auto_requires_on_or_off() {
    let mut cmd = cargo_bin_cmd!("casparctl");
    cmd.args(["auto", "maybe"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}
