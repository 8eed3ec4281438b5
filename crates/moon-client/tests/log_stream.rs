use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::stream::{self, Stream, StreamExt};
use serde_json::json;

use moon_client::{
    ApiClient, ClientConfig, CloseReason, ConnectionState, LogEventKind, LogStreamHub,
};
use moon_types::{LogStatus, LogTarget};

#[derive(Clone, Default)]
struct Orchestrator {
    stream_hits: Arc<AtomicUsize>,
}

async fn history(Query(params): Query<HashMap<String, String>>) -> Response {
    match params.get("build_id").map(String::as_str) {
        Some("b-ok") => Json(json!({ "data": ["line 1", "line 2"], "len": 2 })).into_response(),
        Some("b-empty") => Json(json!({ "data": [], "len": 0 })).into_response(),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
    }
}

fn finished_stream() -> impl Stream<Item = Result<Event, Infallible>> {
    stream::iter(vec![
        Ok(Event::default().data("one")),
        Ok(Event::default().data("one")),
        Ok(Event::default().event("progress").data("{}")),
        Ok(Event::default().data("two")),
        Ok(Event::default()
            .event("buildResult")
            .data(r#"{"status":"success","exit_code":0}"#)),
    ])
}

fn endless_stream() -> impl Stream<Item = Result<Event, Infallible>> {
    stream::iter(vec![Ok(Event::default().data("warming up"))]).chain(stream::pending())
}

async fn task_output(State(orch): State<Orchestrator>, Path(id): Path<String>) -> Response {
    orch.stream_hits.fetch_add(1, Ordering::SeqCst);
    match id.as_str() {
        "b-fail" => (StatusCode::BAD_GATEWAY, "no stream").into_response(),
        "b-raw" => (
            [(header::CONTENT_TYPE, "text/event-stream")],
            ": hello\r\n\r\ndata: raw line\r\n\r\n",
        )
            .into_response(),
        "b-live" => Sse::new(endless_stream()).into_response(),
        _ => Sse::new(finished_stream()).into_response(),
    }
}

async fn serve() -> (String, Orchestrator) {
    let orch = Orchestrator::default();
    let app = Router::new()
        .route("/task-history-output", get(history))
        .route("/task-output/{id}", get(task_output))
        .with_state(orch.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), orch)
}

async fn hub() -> (LogStreamHub, Orchestrator) {
    let (base, orch) = serve().await;
    let client = ApiClient::new(ClientConfig {
        api_url: base.clone(),
        orchestrator_url: base,
        request_timeout: Duration::from_secs(5),
        ..ClientConfig::default()
    })
    .unwrap();
    (LogStreamHub::new(client), orch)
}

fn target(build_id: &str) -> LogTarget {
    LogTarget {
        build_id: build_id.to_string(),
        task_id: "t1".to_string(),
        repo: "/project".to_string(),
    }
}

async fn wait_for_state(hub: &LogStreamHub, build_id: &str, wanted: ConnectionState) {
    let mut rx = hub.subscribe();
    tokio::time::timeout(Duration::from_secs(5), async {
        while hub.connection_state(build_id) != wanted {
            let _ = rx.recv().await;
        }
    })
    .await
    .unwrap();
}

// ---------------------------------------------------------------------------
// HTTP history
// ---------------------------------------------------------------------------

#[tokio::test]
async fn history_maps_responses_to_statuses() {
    let (hub, _) = hub().await;
    let mut outcome = hub
        .load_history(&[target("b-ok"), target("b-empty"), target("b-err")])
        .await;
    outcome.sort_by(|a, b| a.0.cmp(&b.0));

    assert_eq!(
        outcome,
        vec![
            ("b-empty".to_string(), LogStatus::Empty),
            ("b-err".to_string(), LogStatus::Error),
            ("b-ok".to_string(), LogStatus::Success),
        ]
    );
    assert_eq!(hub.text("b-ok"), "line 1\nline 2");
    // No stream was opened, so nothing is shown yet.
    assert_eq!(hub.view("b-ok"), None);
}

// ---------------------------------------------------------------------------
// Live stream
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stream_appends_until_build_result() {
    let (hub, _) = hub().await;
    hub.open("b-done");
    assert_eq!(hub.status("b-done"), LogStatus::Loading);

    let reason = tokio::time::timeout(Duration::from_secs(5), hub.wait_closed("b-done"))
        .await
        .unwrap();
    assert_eq!(
        reason,
        Some(CloseReason::Completed {
            status: "success".to_string()
        })
    );
    assert_eq!(hub.text("b-done"), "one\ntwo\n");
    assert_eq!(hub.status("b-done"), LogStatus::Success);
    assert_eq!(hub.view("b-done").as_deref(), Some("one\ntwo\n"));
}

#[tokio::test]
async fn raw_crlf_stream_is_decoded() {
    let (hub, _) = hub().await;
    hub.open("b-raw");
    let reason = tokio::time::timeout(Duration::from_secs(5), hub.wait_closed("b-raw"))
        .await
        .unwrap();
    assert_eq!(reason, Some(CloseReason::EndOfStream));
    assert_eq!(hub.text("b-raw"), "raw line\n");
}

#[tokio::test]
async fn rejected_stream_closes_with_error_status() {
    let (hub, _) = hub().await;
    hub.open("b-fail");
    let reason = tokio::time::timeout(Duration::from_secs(5), hub.wait_closed("b-fail"))
        .await
        .unwrap();
    assert!(matches!(reason, Some(CloseReason::StreamError { .. })));
    assert_eq!(hub.status("b-fail"), LogStatus::Error);
    assert_eq!(hub.view("b-fail"), None);
}

#[tokio::test]
async fn open_is_idempotent() {
    let (hub, orch) = hub().await;
    hub.open("b-live");
    hub.open("b-live");
    wait_for_state(&hub, "b-live", ConnectionState::Streaming).await;
    hub.open("b-live");
    assert_eq!(orch.stream_hits.load(Ordering::SeqCst), 1);
    hub.shutdown().await;
}

#[tokio::test]
async fn history_success_is_shown_once_stream_is_open() {
    let (hub, _) = hub().await;
    let outcome = hub.track(&[target("b-ok")]).await;
    assert_eq!(outcome, vec![("b-ok".to_string(), LogStatus::Success)]);
    assert!(hub.view("b-ok").is_some());
    hub.shutdown().await;
}

#[tokio::test]
async fn teardown_closes_and_clears_everything() {
    let (hub, _) = hub().await;
    let mut events = hub.subscribe();
    hub.open("b-live");
    wait_for_state(&hub, "b-live", ConnectionState::Streaming).await;

    hub.teardown();
    assert_eq!(hub.status("b-live"), LogStatus::Idle);
    assert_eq!(hub.text("b-live"), "");
    assert_eq!(hub.connection_state("b-live"), ConnectionState::Idle);

    let mut saw_teardown = false;
    while let Ok(event) = events.try_recv() {
        if event.kind
            == LogEventKind::Connection(ConnectionState::Closed {
                reason: CloseReason::Teardown,
            })
        {
            saw_teardown = true;
        }
    }
    assert!(saw_teardown);
}
