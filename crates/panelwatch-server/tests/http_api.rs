use panelwatch_core::capture::fake::FakeRenderBackend;
use panelwatch_core::capture::CaptureOrchestrator;
use panelwatch_core::config::CaptureConfig;
use panelwatch_core::engine::{RunCoordinator, RunSettings};
use panelwatch_core::errors::PipelineError;
use panelwatch_core::providers::llm::fake::FakeVisionClient;
use panelwatch_core::{QueryInterpreter, Store};
use panelwatch_server::{build_router, AppState};
use serde_json::Value;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const CONTRACT_JSON: &str = r#"{"summary":"steady","graph_descriptions":[],"overall_trend":"completely flat","health_weather_note":"none","relationships":[],"confidence_notes":[]}"#;

struct Harness {
    addr: SocketAddr,
    backend: Arc<FakeRenderBackend>,
    client: Arc<FakeVisionClient>,
    store: Store,
}

async fn start(root: &Path, backend: FakeRenderBackend) -> Harness {
    let backend = Arc::new(backend);
    let client = Arc::new(FakeVisionClient::new(CONTRACT_JSON));

    let store = Store::open(&root.join("panelwatch.db")).expect("open store");
    store.init_schema().expect("schema");

    let capture = Arc::new(CaptureOrchestrator::new(
        backend.clone(),
        "http://dashboard.test/",
        CaptureConfig {
            ready_timeout_ms: 100,
            ready_poll_ms: 5,
            settle_before_scroll_ms: 0,
            settle_after_scroll_ms: 0,
            window_switch_wait_ms: 0,
            ..CaptureConfig::default()
        },
    ));
    let settings = RunSettings {
        snapshot_dir: root.join("snapshots"),
        interval: Duration::from_secs(300),
        refresh_interval_sec: 60,
        extra_context: Default::default(),
    };
    let coordinator = RunCoordinator::new(store.clone(), capture.clone(), client.clone(), settings);
    let query = QueryInterpreter::new(capture, client.clone(), root.join("query_snapshots"));

    let app = build_router(AppState::new(coordinator, query));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move { axum::serve(listener, app).await.expect("serve app") });

    Harness {
        addr,
        backend,
        client,
        store,
    }
}

async fn send_raw(addr: SocketAddr, method: &str, path: &str, body: Option<&str>) -> (u16, Value) {
    send_typed(addr, method, path, body, Some("application/json")).await
}

async fn send_typed(
    addr: SocketAddr,
    method: &str,
    path: &str,
    body: Option<&str>,
    content_type: Option<&str>,
) -> (u16, Value) {
    let mut stream = tokio::net::TcpStream::connect(addr)
        .await
        .expect("connect server");
    let mut req = format!("{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n");
    if let Some(b) = body {
        if let Some(ct) = content_type {
            req.push_str(&format!("Content-Type: {ct}\r\n"));
        }
        req.push_str(&format!("Content-Length: {}\r\n", b.len()));
        req.push_str("\r\n");
        req.push_str(b);
    } else {
        req.push_str("Content-Length: 0\r\n\r\n");
    }
    stream
        .write_all(req.as_bytes())
        .await
        .expect("write request");
    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .await
        .expect("read response");
    let (head, body) = response
        .split_once("\r\n\r\n")
        .expect("http response must have separator");
    let status = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse::<u16>().ok())
        .expect("http status");
    let json = serde_json::from_str(body).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn health_and_empty_store() {
    let dir = tempdir().expect("tempdir");
    let h = start(dir.path(), FakeRenderBackend::ready()).await;

    for path in ["/health", "/api/health"] {
        let (status, body) = send_raw(h.addr, "GET", path, None).await;
        assert_eq!(status, 200);
        assert_eq!(body["ok"], true);
    }

    let (status, body) = send_raw(h.addr, "GET", "/latest-record", None).await;
    assert_eq!(status, 404);
    assert!(body["error"].is_string());

    let (status, body) = send_raw(h.addr, "GET", "/records", None).await;
    assert_eq!(status, 200);
    assert_eq!(body.as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn run_then_read_back() {
    let dir = tempdir().expect("tempdir");
    let h = start(dir.path(), FakeRenderBackend::ready()).await;

    let (status, rec) = send_raw(h.addr, "POST", "/run", None).await;
    assert_eq!(status, 200);
    assert_eq!(rec["parse_ok"], true);
    assert_eq!(rec["structured_result"]["overall_trend"], "completely flat");
    assert_eq!(rec["context"]["trigger"], "on_demand");

    let (status, latest) = send_raw(h.addr, "GET", "/api/latest-analysis", None).await;
    assert_eq!(status, 200);
    assert_eq!(latest, rec);

    let (status, list) = send_raw(h.addr, "GET", "/api/analyses", None).await;
    assert_eq!(status, 200);
    let rows = list.as_array().expect("array");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], rec["id"]);
    assert_eq!(rows[0]["artifact_path"], rec["artifact_paths"][0]);
    assert!(rows[0].get("raw_model_output").is_none());
}

#[tokio::test]
async fn concurrent_run_gets_conflict() {
    let dir = tempdir().expect("tempdir");
    let backend = FakeRenderBackend::ready();
    let hold = backend.hold_next_capture();
    let h = start(dir.path(), backend).await;

    let addr = h.addr;
    let first = tokio::spawn(async move { send_raw(addr, "POST", "/run", None).await });
    hold.entered.notified().await;

    let (status, body) = send_raw(h.addr, "POST", "/api/run-analysis", None).await;
    assert_eq!(status, 409);
    assert_eq!(
        body["error"],
        "Analysis is already running. Try again in a moment."
    );
    assert_eq!(h.backend.launched(), 1);

    hold.release.notify_one();
    let (status, _) = first.await.expect("first request");
    assert_eq!(status, 200);

    let (status, _) = send_raw(h.addr, "POST", "/run", None).await;
    assert_eq!(status, 200);
    assert_eq!(h.backend.open_sessions(), 0);
}

#[tokio::test]
async fn pipeline_failures_are_5xx() {
    let dir = tempdir().expect("tempdir");
    let h = start(dir.path(), FakeRenderBackend::ready()).await;
    h.client
        .push_error(PipelineError::model_status(500, "overloaded"));

    let (status, body) = send_raw(h.addr, "POST", "/run", None).await;
    assert_eq!(status, 502);
    let msg = body["error"].as_str().expect("error message");
    assert!(msg.contains("500") && msg.contains("overloaded"), "{msg}");
    assert_eq!(body["code"], "model_transport_failure");
    assert_eq!(h.store.count_records().expect("count"), 0);
}

#[tokio::test]
async fn readiness_timeout_is_gateway_timeout() {
    let dir = tempdir().expect("tempdir");
    let h = start(dir.path(), FakeRenderBackend::never_ready()).await;

    let (status, body) = send_raw(h.addr, "POST", "/run", None).await;
    assert_eq!(status, 504);
    assert_eq!(body["code"], "readiness_timeout");
    assert_eq!(h.backend.open_sessions(), 0);
}

#[tokio::test]
async fn ask_answers_without_persisting() {
    let dir = tempdir().expect("tempdir");
    let h = start(dir.path(), FakeRenderBackend::ready()).await;
    send_raw(h.addr, "POST", "/run", None).await;
    let (_, before) = send_raw(h.addr, "GET", "/records", None).await;

    h.client.push_reply("```json\nAQI is 42.\n```");
    let (status, body) = send_raw(
        h.addr,
        "POST",
        "/ask",
        Some(r#"{"question": "what is the AQI in the 6h window"}"#),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body, serde_json::json!({ "answer": "AQI is 42." }));
    assert_eq!(
        h.backend.activations().last().map(|(_, label)| label.as_str()),
        Some("6h")
    );

    let (_, after) = send_raw(h.addr, "GET", "/records", None).await;
    assert_eq!(before, after);
}

#[tokio::test]
async fn blank_question_is_bad_request() {
    let dir = tempdir().expect("tempdir");
    let h = start(dir.path(), FakeRenderBackend::ready()).await;

    for body in [r#"{"question": "   "}"#, r#"{}"#] {
        let (status, json) = send_raw(h.addr, "POST", "/api/ask-vlm", Some(body)).await;
        assert_eq!(status, 400);
        assert_eq!(json["error"], "Question is required");
    }
    assert_eq!(h.backend.launched(), 0);
}

#[tokio::test]
async fn malformed_ask_body_is_a_json_400() {
    let dir = tempdir().expect("tempdir");
    let h = start(dir.path(), FakeRenderBackend::ready()).await;

    let (status, body) = send_typed(h.addr, "POST", "/ask", Some("not json"), None).await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "invalid_body");
    assert!(body["error"].as_str().is_some_and(|m| !m.is_empty()), "{body}");

    let (status, body) = send_raw(h.addr, "POST", "/api/ask-vlm", Some("{\"question\":")).await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "invalid_body");

    assert_eq!(h.backend.launched(), 0);
    assert!(h.client.calls().is_empty());
}

#[tokio::test]
async fn client_disconnect_mid_run_still_persists_and_closes() {
    let dir = tempdir().expect("tempdir");
    let backend = FakeRenderBackend::ready();
    let hold = backend.hold_next_capture();
    let h = start(dir.path(), backend).await;

    let mut stream = tokio::net::TcpStream::connect(h.addr)
        .await
        .expect("connect server");
    let req = format!(
        "POST /run HTTP/1.1\r\nHost: {}\r\nContent-Length: 0\r\n\r\n",
        h.addr
    );
    stream.write_all(req.as_bytes()).await.expect("write request");
    hold.entered.notified().await;
    drop(stream);

    // The abandoned run still holds the gate.
    let (status, body) = send_raw(h.addr, "POST", "/run", None).await;
    assert_eq!(status, 409);
    assert_eq!(body["code"], "already_running");

    hold.release.notify_one();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while h.store.count_records().expect("count") == 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(h.store.count_records().expect("count"), 1);
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while h.backend.open_sessions() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(h.backend.open_sessions(), 0);
    assert_eq!(h.backend.launched(), 1);

    let (status, rec) = send_raw(h.addr, "GET", "/latest-record", None).await;
    assert_eq!(status, 200);
    assert_eq!(rec["context"]["trigger"], "on_demand");
}
