use assert_cmd::Command;
use predicates::prelude::*;
use sha2::{Digest, Sha512};
use std::fs;
use std::path::Path;

const TARBALL: &[u8] = b"local vendored tarball";

fn lockfetch() -> Command {
    let mut cmd = Command::cargo_bin("lockfetch").unwrap();
    cmd.env_remove("LOCKFETCH_LOG");
    cmd
}

fn write_project(dir: &Path, extra: &str) {
    fs::create_dir_all(dir.join("vendor")).unwrap();
    fs::write(dir.join("vendor/pkg.tgz"), TARBALL).unwrap();
    let checksum = hex::encode(Sha512::digest(TARBALL));
    let lock = format!(
        "__metadata:\n  version: 8\n  cacheKey: 10c0\n\n\
\"app@workspace:.\":\n  version: 0.0.0-use.local\n  resolution: \"app@workspace:.\"\n  linkType: soft\n\n\
\"pkg@file:./vendor/pkg.tgz::locator=app%40workspace%3A.\":\n  version: 1.0.0\n  resolution: \"pkg@file:./vendor/pkg.tgz::hash=abc123&locator=app%40workspace%3A.\"\n  checksum: 10c0/{checksum}\n  linkType: hard\n{extra}"
    );
    fs::write(dir.join("yarn.lock"), lock).unwrap();
}

#[test]
fn no_args_prints_help() {
    lockfetch().assert().success().stdout(predicate::str::contains("Usage"));
}

#[test]
fn check_lists_classifications() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path(), "");
    lockfetch()
        .args(["check", "--project"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("dialect 4"))
        .stdout(predicate::str::contains("app@workspace:."))
        .stdout(predicate::str::contains("fetch"));
}

#[test]
fn check_fails_on_denied_entries() {
    let dir = tempfile::tempdir().unwrap();
    write_project(
        dir.path(),
        "\n\"left-pad@exec:./build.js\":\n  version: 0.0.0\n  resolution: \"left-pad@exec:./build.js\"\n  linkType: hard\n",
    );
    lockfetch()
        .args(["check", "--project"])
        .arg(dir.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("arbitrary code execution"));
}

#[test]
fn fetch_populates_cache_and_writes_report() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_project(dir.path(), "");
    let report = dir.path().join("report.json");
    lockfetch()
        .args(["fetch", "--layout", "cas", "--project"])
        .arg(dir.path())
        .arg("--output")
        .arg(out.path())
        .arg("--report")
        .arg(&report)
        .assert()
        .success()
        .stdout(predicate::str::contains("1 fetched"));

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(json["summary"]["fetched"], 1);
    assert_eq!(json["summary"]["skipped"], 1);
    assert_eq!(json["entries"][1]["status"], "fetched");

    lockfetch()
        .args(["cache", "ls", "--json", "--output"])
        .arg(out.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("sha512/"));
}

#[test]
fn fetch_report_to_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_project(dir.path(), "");
    let assert = lockfetch()
        .args(["fetch", "--report", "-", "--project"])
        .arg(dir.path())
        .arg("--output")
        .arg(out.path())
        .assert()
        .success();
    let json: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(json["dialect"], 4);
}

#[test]
fn hardened_fetch_without_checksum_fails() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_project(
        dir.path(),
        "\n\"other@file:./vendor/pkg.tgz\":\n  version: 1.0.0\n  resolution: \"other@file:./vendor/pkg.tgz\"\n  linkType: hard\n",
    );
    lockfetch()
        .args(["fetch", "--hardened", "--project"])
        .arg(dir.path())
        .arg("--output")
        .arg(out.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("integrity required"));
}

#[test]
fn unsupported_metadata_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("yarn.lock"), "__metadata:\n  version: 99\n").unwrap();
    lockfetch()
        .args(["check", "--project"])
        .arg(dir.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unsupported lockfile dialect for metadata version 99"));
}

#[test]
fn cache_path_and_clean() {
    let out = tempfile::tempdir().unwrap();
    fs::write(out.path().join("stale.tgz"), b"x").unwrap();
    lockfetch()
        .args(["cache", "path", "--output"])
        .arg(out.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(out.path().to_string_lossy().as_ref()));
    lockfetch()
        .args(["cache", "clean", "--output"])
        .arg(out.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("cache cleaned"));
    assert!(out.path().exists());
    assert!(!out.path().join("stale.tgz").exists());
}
