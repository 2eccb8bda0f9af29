// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Drives the client against a local axum server speaking the OpenAI API.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use dynkube_llm::conversations::FIXED_TURNS;
use dynkube_llm::protocols::openai::Role;
use dynkube_llm::{
    ChatSession, ClientError, ConversationOptions, OpenAiClient, SmokeOptions, SmokeWarning,
    run_conversations, run_smoke_test,
};
use dynkube_parsers::reasoning::REPAIR_INSTRUCTION;
use dynkube_runtime::CancellationToken;
use serde_json::{Value, json};

#[derive(Default)]
struct Mock {
    models: Vec<&'static str>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    requests: Mutex<Vec<Value>>,
}

fn last_user(request: &Value) -> String {
    request["messages"]
        .as_array()
        .and_then(|messages| messages.iter().rev().find(|m| m["role"] == "user"))
        .and_then(|m| m["content"].as_str())
        .unwrap_or_default()
        .to_string()
}

fn completion(content: &str, finish_reason: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "model": "m1",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": finish_reason,
        }],
        "usage": {"prompt_tokens": 5, "completion_tokens": 7, "total_tokens": 12},
    })
}

async fn models(State(mock): State<Arc<Mock>>) -> Json<Value> {
    let data: Vec<Value> = mock.models.iter().map(|id| json!({"id": id})).collect();
    Json(json!({ "data": data }))
}

async fn chat(State(mock): State<Arc<Mock>>, Json(request): Json<Value>) -> Response {
    let now = mock.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    mock.max_in_flight.fetch_max(now, Ordering::SeqCst);
    tokio::time::sleep(mock.delay).await;
    mock.in_flight.fetch_sub(1, Ordering::SeqCst);

    mock.requests.lock().unwrap().push(request.clone());
    if request["model"] == "broken" {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": {"message": "engine crashed", "type": "internal"}})),
        )
            .into_response();
    }

    let prompt = last_user(&request);
    let body = match prompt.as_str() {
        p if p == REPAIR_INSTRUCTION => completion("<think>fine</think>Clean answer", "stop"),
        "repair me" => completion("<think>still going and never closing", "stop"),
        "think" => completion("<think>reasoning</think>Hello", "stop"),
        "truncate" => completion("FINAL: partial", "length"),
        "markup" => completion("<think>leaked</think>", "stop"),
        "empty" => json!({"choices": [{"message": {"content": ""}}]}),
        _ => completion("Let me see.\nFINAL: Paris", "stop"),
    };
    Json(body).into_response()
}

async fn serve(mock: Mock) -> (String, Arc<Mock>) {
    let mock = Arc::new(mock);
    let app = Router::new()
        .route("/v1/models", get(models))
        .route("/v1/chat/completions", post(chat))
        .with_state(mock.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), mock)
}

fn client(base: &str) -> OpenAiClient {
    OpenAiClient::new(base, Duration::from_secs(10))
        .unwrap()
        .with_sampling(0.5, 64)
}

fn with_models() -> Mock {
    Mock {
        models: vec!["m1", "m2"],
        ..Default::default()
    }
}

#[tokio::test]
async fn test_list_models() {
    let (base, _) = serve(with_models()).await;
    let client = client(&base);
    assert_eq!(client.list_models().await.unwrap(), ["m1", "m2"]);
    assert_eq!(client.resolve_model(None).await.unwrap(), "m1");
    assert_eq!(client.resolve_model(Some("other")).await.unwrap(), "other");
}

#[tokio::test]
async fn test_base_url_with_v1_suffix() {
    let (base, _) = serve(with_models()).await;
    let client = client(&format!("{base}/v1/"));
    assert_eq!(client.list_models().await.unwrap(), ["m1", "m2"]);
}

#[tokio::test]
async fn test_empty_models_is_an_error() {
    let (base, _) = serve(Mock::default()).await;
    let err = client(&base).list_models().await.unwrap_err();
    assert!(matches!(err, ClientError::EmptyModels(_)), "{err}");
}

#[tokio::test]
async fn test_wait_for_models_times_out() {
    let (base, _) = serve(Mock::default()).await;
    let err = client(&base)
        .wait_for_models(
            Duration::from_millis(300),
            Duration::from_millis(50),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::ModelsTimeout { .. }), "{err}");
}

#[tokio::test]
async fn test_wait_for_models_cancelled() {
    let (base, _) = serve(Mock::default()).await;
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = client(&base)
        .wait_for_models(Duration::from_secs(30), Duration::from_secs(5), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Cancelled));
}

#[tokio::test]
async fn test_smoke_test_passes() {
    let (base, mock) = serve(with_models()).await;
    let options = SmokeOptions {
        wait: Some(Duration::from_secs(5)),
        ..Default::default()
    };
    let report = run_smoke_test(&client(&base), &options, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.model, "m1");
    assert!(report.content.contains("Paris"));
    assert!(report.passed_cleanly());

    let requests = mock.requests.lock().unwrap();
    assert_eq!(requests[0]["model"], "m1");
    assert_eq!(requests[0]["max_tokens"], 64);
    assert_eq!(requests[0]["temperature"], 0.5);
}

#[tokio::test]
async fn test_smoke_test_warnings() {
    let (base, _) = serve(with_models()).await;
    let cancel = CancellationToken::new();

    let truncated = SmokeOptions {
        prompt: Some("truncate".to_string()),
        ..Default::default()
    };
    let report = run_smoke_test(&client(&base), &truncated, &cancel)
        .await
        .unwrap();
    assert_eq!(report.warnings, [SmokeWarning::Truncated]);

    let markup = SmokeOptions {
        prompt: Some("markup".to_string()),
        ..Default::default()
    };
    let report = run_smoke_test(&client(&base), &markup, &cancel)
        .await
        .unwrap();
    assert_eq!(report.warnings, [SmokeWarning::ReasoningMarkup]);
}

#[tokio::test]
async fn test_smoke_test_empty_content_fails() {
    let (base, _) = serve(with_models()).await;
    let options = SmokeOptions {
        prompt: Some("empty".to_string()),
        ..Default::default()
    };
    let err = run_smoke_test(&client(&base), &options, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::MissingContent));
}

#[tokio::test]
async fn test_status_error_carries_server_message() {
    let (base, _) = serve(with_models()).await;
    let options = SmokeOptions {
        model: Some("broken".to_string()),
        ..Default::default()
    };
    let err = run_smoke_test(&client(&base), &options, &CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        ClientError::Status { status, body, .. } => {
            assert_eq!(status, 500);
            assert_eq!(body, "engine crashed");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_chat_session_extracts_answers() {
    let (base, mock) = serve(with_models()).await;
    let mut session = ChatSession::new(client(&base), "m1");

    let turn = session.send("capital of France?").await.unwrap();
    assert_eq!(turn.answer, "Paris");
    assert!(!turn.repaired);

    let turn = session.send("think").await.unwrap();
    assert_eq!(turn.answer, "Hello");
    assert_eq!(turn.raw, "<think>reasoning</think>Hello");

    let turn = session.send("truncate").await.unwrap();
    assert_eq!(turn.answer, "partial");
    assert!(turn.truncated);

    // system + three user/assistant pairs, answers only
    let history = session.history();
    assert_eq!(history.len(), 7);
    assert_eq!(history[0].role, Role::System);
    assert_eq!(history[2].content, "Paris");
    assert_eq!(history[4].content, "Hello");
    assert_eq!(mock.requests.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_chat_session_repairs_unfinished_reasoning() {
    let (base, mock) = serve(with_models()).await;
    let mut session = ChatSession::new(client(&base), "m1");

    let turn = session.send("repair me").await.unwrap();
    assert!(turn.repaired);
    assert_eq!(turn.answer, "Clean answer");

    let requests = mock.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(last_user(&requests[1]), REPAIR_INSTRUCTION);
    // repair turn is not kept in the session history
    assert_eq!(session.history().len(), 3);
    assert_eq!(session.history()[2].content, "Clean answer");
}

#[tokio::test]
async fn test_failed_turn_is_dropped_from_history() {
    let (base, _) = serve(with_models()).await;
    let mut session = ChatSession::new(client(&base), "broken");
    assert!(session.send("hello").await.is_err());
    assert_eq!(session.history().len(), 1);
}

#[tokio::test]
async fn test_conversations_respect_concurrency() {
    let (base, mock) = serve(Mock {
        models: vec!["m1"],
        delay: Duration::from_millis(40),
        ..Default::default()
    })
    .await;

    let options = ConversationOptions {
        num_convos: 5,
        concurrency: 2,
        model: "m1".to_string(),
        output_dir: None,
    };
    let report = run_conversations(&client(&base), &options, &CancellationToken::new())
        .await
        .unwrap();

    let ids: Vec<usize> = report.transcripts.iter().map(|t| t.id).collect();
    assert_eq!(ids, [1, 2, 3, 4, 5]);
    assert_eq!(report.failed(), 0);
    assert!(report.max_in_flight <= 2, "{}", report.max_in_flight);
    assert!(mock.max_in_flight.load(Ordering::SeqCst) <= 2);
    assert_eq!(mock.requests.lock().unwrap().len(), 5 * FIXED_TURNS.len());

    for transcript in &report.transcripts {
        let written = std::fs::read_to_string(&transcript.path).unwrap();
        assert_eq!(written, transcript.text);
        assert_eq!(written.matches("Assistant: Paris").count(), FIXED_TURNS.len());
    }
    let rendered = report.render();
    let first = rendered.find("conversation 1 ").unwrap();
    let last = rendered.find("conversation 5 ").unwrap();
    assert!(first < last);
}

#[tokio::test]
async fn test_conversations_write_to_output_dir() {
    let (base, _) = serve(with_models()).await;
    let dir = tempfile::tempdir().unwrap();
    let options = ConversationOptions {
        num_convos: 2,
        concurrency: 4,
        model: "broken".to_string(),
        output_dir: Some(dir.path().join("out")),
    };
    let report = run_conversations(&client(&base), &options, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.failed(), 2);
    assert!(dir.path().join("out/conversation-1.txt").exists());
    assert!(dir.path().join("out/conversation-2.txt").exists());
}
