//! 命令行集成测试

use std::path::PathBuf;

use assert_cmd::Command;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

mod common {
    include!("common/mod.rs");
}

use common::StubServer;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn baitblock() -> Command {
    let mut cmd = Command::cargo_bin("baitblock").unwrap();
    cmd.env("BAITBLOCK_LOG_LEVEL", "error");
    cmd
}

#[test]
fn test_classify_url() {
    let output = baitblock()
        .args(["classify-url", "https://kick.com/Alice"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let context: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(context, json!({"platform": "kick", "streamIdentity": "alice"}));

    baitblock()
        .args(["classify-url", "https://kick.com/category/games"])
        .assert()
        .failure();
}

#[test]
fn test_scan_prints_one_line_per_message() {
    let output = baitblock()
        .arg("scan")
        .arg(fixture("kick_chat.html"))
        .args(["--url", "https://kick.com/alice"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let messages: Vec<Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    let ids: Vec<&str> = messages.iter().map(|m| m["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["1000", "1001", "1002", "1003"]);
    assert_eq!(messages[0]["username"], "alice_fan");
    assert_eq!(messages[2]["isReply"], true);
    assert_eq!(messages[3]["text"], Value::Null);
    assert_eq!(messages[3]["emoteId"], "37226");
    assert_eq!(messages[0]["streamContext"]["streamIdentity"], "alice");
}

#[test]
fn test_scan_rejects_unsupported_page() {
    baitblock()
        .arg("scan")
        .arg(fixture("kick_chat.html"))
        .args(["--url", "https://kick.com/browse"])
        .assert()
        .failure();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_scan_with_classifier_writes_annotated_page() {
    let requests = common::recorded();
    let captured = requests.clone();
    let app = Router::new().route(
        "/label_messages",
        post(move |Json(body): Json<Value>| {
            let captured = captured.clone();
            async move {
                let labels: Vec<Value> = body["messages"]
                    .as_array()
                    .map(|texts| {
                        texts
                            .iter()
                            .map(|text| {
                                let label = if text.as_str().unwrap_or_default().contains("free") {
                                    "phishing"
                                } else {
                                    "safe"
                                };
                                json!({ "label": label })
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                captured.lock().unwrap().push(body);
                Json(Value::Array(labels))
            }
        }),
    );
    let base = StubServer::spawn(app).await;

    let dir = tempfile::tempdir().unwrap();
    let output_path = dir.path().join("annotated.html");
    let out = output_path.clone();
    let status = tokio::task::spawn_blocking(move || {
        baitblock()
            .arg("scan")
            .arg(fixture("kick_chat.html"))
            .args(["--url", "https://kick.com/alice", "--classifier", &base])
            .arg("--output")
            .arg(&out)
            .output()
            .unwrap()
            .status
    })
    .await
    .unwrap();
    assert!(status.success());

    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0],
        json!({"messages": ["great stream today everyone", "free skins at csgo-drop.gg claim now"]})
    );

    let html = std::fs::read_to_string(&output_path).unwrap();
    assert_eq!(html.matches(r#"data-baitblock-flag="phishing""#).count(), 1);
    assert!(html.contains("outline: 2px solid red;"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_watch_runs_live_pipeline_from_config() {
    let requests = common::recorded();
    let captured = requests.clone();
    let app = Router::new().route(
        "/label_messages",
        post(move |Json(body): Json<Value>| {
            let captured = captured.clone();
            async move {
                let labels: Vec<Value> = body["messages"]
                    .as_array()
                    .map(|texts| {
                        texts
                            .iter()
                            .map(|text| {
                                let phishing = text.as_str().unwrap_or_default().contains("csgo");
                                json!({ "label": if phishing { "phishing" } else { "safe" } })
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                captured.lock().unwrap().push(body);
                Json(Value::Array(labels))
            }
        }),
    );
    let base = StubServer::spawn(app).await;

    let dir = tempfile::tempdir().unwrap();
    let output_path = dir.path().join("watched.html");
    let out = output_path.clone();
    let status = tokio::task::spawn_blocking(move || {
        baitblock()
            .env("BAITBLOCK_FLUSH_INTERVAL_MS", "200")
            .env("BAITBLOCK_URL_POLL_MS", "50")
            .arg("watch")
            .arg(fixture("kick_chat.html"))
            .args(["--url", "https://kick.com/alice", "--classifier", &base])
            .args(["--duration-ms", "1500"])
            .arg("--output")
            .arg(&out)
            .output()
            .unwrap()
            .status
    })
    .await
    .unwrap();
    assert!(status.success());

    // 快照不再变化，只有第一次换出的批次
    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0],
        json!({"messages": ["great stream today everyone", "free skins at csgo-drop.gg claim now"]})
    );

    let html = std::fs::read_to_string(&output_path).unwrap();
    assert_eq!(html.matches(r#"data-baitblock-flag="phishing""#).count(), 1);
}

#[test]
fn test_watch_rejects_unsupported_page() {
    baitblock()
        .arg("watch")
        .arg(fixture("kick_chat.html"))
        .args(["--url", "https://kick.com/category/games", "--duration-ms", "10"])
        .assert()
        .failure();
}
