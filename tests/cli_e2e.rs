//! End-to-end CLI tests for the library-mirror binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ITEM_PAGE: &str = r#"<html><body>
    <h3 class="card-header">Night Watch
      <small>By Sam Writer</small> | <a href="/player/sam">sam</a>
    </h3>
    <div class="card-body"><p>It was dark.</p></div>
    </body></html>"#;

/// Runs the binary with an isolated config directory.
fn mirror_cmd(config_home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("library-mirror").unwrap();
    cmd.env("XDG_CONFIG_HOME", config_home.path())
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_binary_help_displays_usage() {
    let config = TempDir::new().unwrap();
    mirror_cmd(&config)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Incrementally mirror"));
}

#[test]
fn test_binary_version_displays_version() {
    let config = TempDir::new().unwrap();
    mirror_cmd(&config)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("library-mirror"));
}

#[test]
fn test_binary_without_subcommand_fails() {
    let config = TempDir::new().unwrap();
    mirror_cmd(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_sync_no_prompt_without_token_fails() {
    let config = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    mirror_cmd(&config)
        .args(["sync", "--no-prompt", "--root"])
        .arg(root.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("--no-prompt requires --token"));
}

#[test]
fn test_invalid_config_file_is_reported() {
    let config = TempDir::new().unwrap();
    let dir = config.path().join("library-mirror");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.toml"), "workers = 0\n").unwrap();
    mirror_cmd(&config)
        .args(["sync", "--no-prompt", "--token", "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("workers"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetch_prints_normalized_text() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/library/5"))
        .and(header("cookie", "PHPSESSID=secret"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ITEM_PAGE))
        .mount(&server)
        .await;
    let base_url = format!("{}/library/", server.uri());
    let config = TempDir::new().unwrap();

    let assert = tokio::task::spawn_blocking(move || {
        mirror_cmd(&config)
            .args(["fetch", "PHPSESSID=secret", "5", "--base-url", &base_url])
            .assert()
    })
    .await
    .unwrap();

    assert
        .success()
        .stdout(predicate::str::contains("It was dark"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetch_prompts_for_missing_item() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/library/5"))
        .and(header("cookie", "PHPSESSID=secret"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ITEM_PAGE))
        .mount(&server)
        .await;
    let base_url = format!("{}/library/", server.uri());
    let config = TempDir::new().unwrap();

    let assert = tokio::task::spawn_blocking(move || {
        mirror_cmd(&config)
            .args(["fetch", "secret", "--base-url", &base_url])
            .write_stdin("\n5\n")
            .assert()
    })
    .await
    .unwrap();

    assert
        .success()
        .stdout(predicate::str::contains("It was dark"))
        .stderr(predicate::str::contains("Enter item identifier or link"));
}

#[test]
fn test_fetch_without_input_fails_on_closed_stdin() {
    let config = TempDir::new().unwrap();
    mirror_cmd(&config)
        .arg("fetch")
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("stdin closed"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sync_json_summary_and_files() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/library/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<table><tr><td><a href="/library/2">x</a></td></tr></table>"#,
        ))
        .mount(&server)
        .await;
    for id in 1..=2 {
        Mock::given(method("GET"))
            .and(path(format!("/library/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(ITEM_PAGE))
            .mount(&server)
            .await;
    }
    let base_url = format!("{}/library/", server.uri());
    let config = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let root_path = root.path().to_path_buf();

    let assert = tokio::task::spawn_blocking(move || {
        mirror_cmd(&config)
            .args(["sync", "--no-prompt", "--token", "t", "--json", "--base-url", &base_url])
            .arg("--root")
            .arg(&root_path)
            .assert()
    })
    .await
    .unwrap();

    assert
        .success()
        .stdout(predicate::str::contains("\"stored_normal\": 2"));
    assert!(root.path().join("normal").join("1.text").exists());
    assert!(root.path().join("normal").join("2.text").exists());
    assert!(root.path().join("metadata.csv").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetch_with_rejected_token_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/library/5"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<h1>Authorize remote access</h1>"),
        )
        .mount(&server)
        .await;
    let base_url = format!("{}/library/", server.uri());
    let config = TempDir::new().unwrap();

    let assert = tokio::task::spawn_blocking(move || {
        mirror_cmd(&config)
            .args(["fetch", "bad", "5", "--base-url", &base_url])
            .assert()
    })
    .await
    .unwrap();

    assert
        .failure()
        .stderr(predicate::str::contains("rejected"));
}
