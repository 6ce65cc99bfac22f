//! 分类与持久化集成测试
//!
//! 用 axum 启动本地服务验证分类服务和数据库的 HTTP 约定

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};

use baitblock::annotate::{is_flagged, ResultAnnotator};
use baitblock::classify::{ClassificationBatcher, HttpClassifier, SignalFilter};
use baitblock::dom::node::first_element_child;
use baitblock::dom::{LiveDocument, PageDocument};
use baitblock::error::{BaitblockError, ErrorCategory};
use baitblock::extract::{ChatMessage, KICK_LAYOUT};
use baitblock::router::Platform;
use baitblock::sink::{MessageRow, MessageSink, PostgrestSink};

mod common {
    include!("common/mod.rs");
}

use common::{
    kick_context, recorded, GatedClassifier, KeywordClassifier, PageBuilder, StubServer,
    UnreachableClassifier,
};

fn message(id: &str, text: &str) -> ChatMessage {
    ChatMessage {
        id: id.to_string(),
        username: Some("viewer".to_string()),
        text: Some(text.to_string()),
        emote_id: None,
        is_reply: false,
        sent_at: None,
        stream: kick_context("alice"),
    }
}

/// 返回固定结果并记录请求体的分类服务
async fn spawn_classifier(response: Value, requests: common::Recorded) -> String {
    let app = Router::new().route(
        "/label_messages",
        post(move |Json(body): Json<Value>| {
            let requests = requests.clone();
            let response = response.clone();
            async move {
                requests.lock().unwrap().push(body);
                Json(response)
            }
        }),
    );
    StubServer::spawn(app).await
}

#[tokio::test]
async fn test_flagged_identifier_reaches_annotator() {
    let requests = recorded();
    let base = spawn_classifier(
        json!([{"label": "phishing"}, {"label": "safe"}]),
        requests.clone(),
    )
    .await;

    let classifier = HttpClassifier::with_timeout(&base, Duration::from_secs(5)).unwrap();
    let mut batcher =
        ClassificationBatcher::new(Arc::new(classifier)).with_filter(SignalFilter::permissive());
    assert!(batcher.push(message("101", "hello friend")));
    assert!(batcher.push(message("102", "ok")));

    let job = batcher.flush().unwrap();
    assert_eq!(job.ids(), ["101".to_string(), "102".to_string()]);
    let flagged = job.run().await;
    assert_eq!(flagged, vec!["101".to_string()]);

    assert_eq!(
        requests.lock().unwrap().as_slice(),
        &[json!({"messages": ["hello friend", "ok"]})]
    );

    let doc = LiveDocument::parse(&PageBuilder::kick_page(&[
        PageBuilder::kick_message("101", "viewer", "hello friend"),
        PageBuilder::kick_message("102", "viewer", "ok"),
    ]))
    .unwrap();
    let report = ResultAnnotator::for_platform(Platform::Kick).apply(&doc.root(), &flagged);
    assert_eq!(report.marked, vec!["101".to_string()]);

    let content = |id: &str| {
        let element = KICK_LAYOUT.find_message(&doc.root(), id).unwrap();
        first_element_child(&element).unwrap()
    };
    assert!(is_flagged(&content("101")));
    assert!(!is_flagged(&content("102")));
}

#[tokio::test]
async fn test_message_during_inflight_call_goes_to_next_flush() {
    let classifier = Arc::new(GatedClassifier::new());
    let mut batcher =
        ClassificationBatcher::new(classifier.clone()).with_filter(SignalFilter::permissive());

    batcher.push(message("1", "first batch"));
    let job = batcher.flush().unwrap();
    let inflight = tokio::spawn(job.run());

    classifier.entered.notified().await;
    batcher.push(message("2", "arrived during the call"));
    assert_eq!(batcher.len(), 1);

    classifier.release.notify_one();
    assert!(inflight.await.unwrap().is_empty());

    let next = batcher.flush().unwrap();
    assert_eq!(next.ids(), ["2".to_string()]);
    assert_eq!(classifier.batches(), vec![vec!["first batch".to_string()]]);
    assert_eq!(batcher.stats().get_flushed_messages(), 2);
}

#[tokio::test]
async fn test_unreachable_classifier_drops_batch() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let classifier =
        HttpClassifier::with_timeout(&format!("http://{}", addr), Duration::from_secs(2)).unwrap();
    let mut batcher = ClassificationBatcher::new(Arc::new(classifier));
    batcher.push(message("1", "claim your free skins now"));

    let flagged = batcher.flush().unwrap().run().await;
    assert!(flagged.is_empty());
    assert!(batcher.is_empty());
    assert!(batcher.flush().is_none());
    assert_eq!(batcher.stats().get_dropped_batches(), 1);

    batcher.push(message("2", "still trying to reach the model"));
    let err = batcher.flush().unwrap().try_run().await.unwrap_err();
    assert!(err.is_retryable());
    assert!(err.to_string().contains(&addr.to_string()));

    let mut failing = ClassificationBatcher::new(Arc::new(UnreachableClassifier));
    failing.push(message("2", "another long enough message"));
    let err = failing.flush().unwrap().try_run().await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::ExternalService);
}

#[tokio::test]
async fn test_error_status_is_classifier_error() {
    let app = Router::new().route(
        "/label_messages",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model not loaded") }),
    );
    let base = StubServer::spawn(app).await;

    let classifier = HttpClassifier::new(&base).unwrap();
    let mut batcher = ClassificationBatcher::new(Arc::new(classifier));
    batcher.push(message("1", "three words here"));

    let err = batcher.flush().unwrap().try_run().await.unwrap_err();
    assert!(matches!(err, BaitblockError::ClassifierError(_)));
}

#[tokio::test]
async fn test_missing_verdicts_are_unlabeled() {
    let base = spawn_classifier(
        json!([{"label": "phishing", "phishing_score": 0.91, "benign_score": 0.09}]),
        recorded(),
    )
    .await;

    let classifier = HttpClassifier::new(&base).unwrap();
    let mut batcher =
        ClassificationBatcher::new(Arc::new(classifier)).with_filter(SignalFilter::permissive());
    batcher.push(message("a", "visit csgo-drop.gg"));
    batcher.push(message("b", "free case opening at skins dot gg"));

    let flagged = batcher.flush().unwrap().run().await;
    assert_eq!(flagged, vec!["a".to_string()]);
}

#[tokio::test]
async fn test_signal_filter_applies_at_buffering() {
    let classifier = Arc::new(KeywordClassifier::new("free"));
    let mut batcher = ClassificationBatcher::new(classifier.clone());

    assert!(!batcher.push(message("1", "hello friend")));
    assert!(!batcher.push(message("2", "ok")));
    let mut emote = message("3", "");
    emote.text = None;
    emote.emote_id = Some("37226".to_string());
    assert!(!batcher.push(emote));
    assert!(batcher.push(message("4", "free skins at https://bit.ly/x")));
    assert!(batcher.push(message("5", "what a great play")));

    let flagged = batcher.flush().unwrap().run().await;
    assert_eq!(flagged, vec!["4".to_string()]);
    assert_eq!(classifier.batches().len(), 1);
    assert_eq!(classifier.batches()[0].len(), 2);
    assert_eq!(batcher.stats().get_filtered_out(), 3);
}

#[tokio::test]
async fn test_postgrest_sink_contract() {
    let requests = recorded();
    let captured = requests.clone();
    let app = Router::new().route(
        "/rest/v1/kick_messages",
        post(move |headers: HeaderMap, Json(body): Json<Value>| {
            let captured = captured.clone();
            async move {
                let header = |name: &str| {
                    headers
                        .get(name)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string()
                };
                captured.lock().unwrap().push(json!({
                    "apikey": header("apikey"),
                    "authorization": header("authorization"),
                    "prefer": header("prefer"),
                    "body": body,
                }));
                StatusCode::CREATED
            }
        }),
    );
    let base = StubServer::spawn(app).await;

    let sink = PostgrestSink::new(&base, "kick_messages", "anon-key-123", Duration::from_secs(5))
        .unwrap();
    let mut msg = message("9", "hello chat");
    msg.is_reply = true;
    let row = MessageRow::from_message(&msg, Utc::now());
    sink.store(&row).await.unwrap();

    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request["apikey"], "anon-key-123");
    assert_eq!(request["authorization"], "Bearer anon-key-123");
    assert_eq!(request["prefer"], "return=minimal");
    assert_eq!(request["body"][0]["stream"], "alice");
    assert_eq!(request["body"][0]["username"], "viewer");
    assert_eq!(request["body"][0]["text"], "hello chat");
    assert_eq!(request["body"][0]["isReply"], true);
}

#[tokio::test]
async fn test_postgrest_sink_rejection_is_persistence_error() {
    let app = Router::new().route(
        "/rest/v1/kick_messages",
        post(|| async { (StatusCode::UNAUTHORIZED, "invalid api key") }),
    );
    let base = StubServer::spawn(app).await;

    let sink = PostgrestSink::new(&base, "kick_messages", "wrong", Duration::from_secs(5)).unwrap();
    let row = MessageRow::from_message(&message("1", "hi"), Utc::now());
    let err = sink.store(&row).await.unwrap_err();

    assert!(matches!(err, BaitblockError::PersistenceError(_)));
    assert_eq!(err.category(), ErrorCategory::ExternalService);
}
