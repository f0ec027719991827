use assert_cmd::Command;
use codium::{fs::Workspace, model::LocalConfig};
use predicates::prelude::*;

/// A workspace plus an isolated `$HOME`, so no real `~/.codiumrc` is read.
struct Sandbox {
    home: tempfile::TempDir,
    work: tempfile::TempDir,
}

impl Sandbox {
    async fn new() -> Self {
        let home = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        Workspace::create(
            work.path(),
            &LocalConfig {
                repository_id: "repo-1".to_owned(),
            },
        )
        .await
        .unwrap();
        Self { home, work }
    }

    fn codium(&self) -> Command {
        let mut cmd = Command::cargo_bin("codium").unwrap();
        cmd.current_dir(self.work.path())
            .env("HOME", self.home.path())
            .env("RUST_LOG", "off")
            .env("NO_COLOR", "1")
            .env_remove("CODIUM_TOKEN")
            .env_remove("CODIUM_API_URL")
            .env_remove("CODIUM_STORAGE_URL")
            .env_remove("CODIUM_PASSWORD");
        cmd
    }
}

#[tokio::test]
async fn add_and_commit_then_log() {
    let sandbox = Sandbox::new().await;
    std::fs::write(sandbox.work.path().join("hello.txt"), "hi").unwrap();

    sandbox
        .codium()
        .args(["add", "hello.txt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello.txt"));
    sandbox
        .codium()
        .args(["commit", "first commit"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Committed 1 file(s)"));
    sandbox
        .codium()
        .arg("log")
        .assert()
        .success()
        .stdout(predicate::str::contains("first commit"));
}

#[tokio::test]
async fn empty_commit_is_not_a_failure() {
    let sandbox = Sandbox::new().await;
    sandbox
        .codium()
        .args(["commit", "nothing"])
        .assert()
        .success()
        .stdout(predicate::str::contains("nothing to commit"));
}

#[tokio::test]
async fn revert_of_unknown_commit_fails_with_hint() {
    let sandbox = Sandbox::new().await;
    sandbox
        .codium()
        .args(["revert", "2020-01-01T00-00-00-000Z-abcdefghi"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("was not found locally"));
}

#[tokio::test]
async fn push_without_login_fails() {
    let sandbox = Sandbox::new().await;
    std::fs::write(sandbox.work.path().join("a.txt"), "a").unwrap();
    sandbox.codium().args(["add", "a.txt"]).assert().success();
    sandbox.codium().args(["commit", "c"]).assert().success();
    sandbox
        .codium()
        .arg("push")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not logged in"));
}

#[tokio::test]
async fn commands_outside_a_workspace_point_to_init() {
    let sandbox = Sandbox::new().await;
    let outside = tempfile::tempdir().unwrap();
    sandbox
        .codium()
        .current_dir(outside.path())
        .args(["add", "a.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("codium init"));
}

#[tokio::test]
async fn malformed_codiumrc_is_reported_and_left_alone() {
    let sandbox = Sandbox::new().await;
    let rc = sandbox.home.path().join(".codiumrc");
    std::fs::write(&rc, "{ token: oops").unwrap();

    sandbox
        .codium()
        .arg("log")
        .assert()
        .failure()
        .stderr(predicate::str::contains(".codiumrc").and(predicate::str::contains("not valid JSON")));
    sandbox
        .codium()
        .args(["login", "--username", "alice", "--password", "pw"])
        .assert()
        .failure();
    assert_eq!(std::fs::read_to_string(&rc).unwrap(), "{ token: oops");
}

#[tokio::test]
async fn blank_codiumrc_counts_as_empty() {
    let sandbox = Sandbox::new().await;
    std::fs::write(sandbox.home.path().join(".codiumrc"), "\n").unwrap();
    sandbox.codium().arg("log").assert().success();
}

#[tokio::test]
async fn password_prompt_never_echoes_piped_input() {
    let sandbox = Sandbox::new().await;
    sandbox
        .codium()
        .args(["login", "--username", "alice", "--api-url", "http://127.0.0.1:9"])
        .write_stdin("secret\n")
        .assert()
        .failure()
        .stdout(predicate::str::contains("secret").not())
        .stderr(predicate::str::contains("secret").not());
    assert!(!sandbox.home.path().join(".codiumrc").exists());
}
