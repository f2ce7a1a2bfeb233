use panelwatch_core::errors::{PipelineError, BODY_EXCERPT_CHARS};
use panelwatch_core::model::RunContext;
use panelwatch_core::prompts::PromptSpec;
use panelwatch_core::providers::llm::openai::ChatCompletionsClient;
use panelwatch_core::providers::llm::{VisionClient, VisionRequest};
use serde_json::json;
use std::path::PathBuf;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn artifact() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("shot.png");
    std::fs::write(&p, b"\x89PNG\r\n\x1a\npixels").unwrap();
    (dir, p)
}

fn completion(text: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": text}}],
        "usage": {"prompt_tokens": 900, "completion_tokens": 12}
    })
}

#[tokio::test]
async fn sends_inline_image_and_returns_first_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"model": "vision-test", "temperature": 0.0, "max_tokens": 1200})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("{\"summary\":\"ok\"}")))
        .mount(&server)
        .await;

    let (_dir, image) = artifact();
    let client = ChatCompletionsClient::new(server.uri(), "vision-test");
    let mut ctx = RunContext::new();
    ctx.insert("refresh_interval_sec".into(), json!(60));
    let prompt = PromptSpec::Dashboard;

    let resp = client
        .analyze(&VisionRequest {
            image_path: &image,
            prompt: &prompt,
            context: &ctx,
        })
        .await
        .unwrap();
    assert_eq!(resp.text, "{\"summary\":\"ok\"}");
    assert_eq!(resp.model, "vision-test");
    assert_eq!(resp.meta["usage"]["completion_tokens"], 12);

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    let content = &body["messages"][0]["content"];
    let text = content[0]["text"].as_str().unwrap();
    assert!(text.contains("refresh_interval_sec: 60"));
    let url = content[1]["image_url"]["url"].as_str().unwrap();
    assert!(url.starts_with("data:image/png;base64,"));
}

#[tokio::test]
async fn non_success_status_carries_code_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let (_dir, image) = artifact();
    let client = ChatCompletionsClient::new(server.uri(), "vision-test");
    let err = client
        .analyze(&VisionRequest {
            image_path: &image,
            prompt: &PromptSpec::Dashboard,
            context: &RunContext::new(),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::ModelTransport { status: Some(500), .. }));
    let msg = err.to_string();
    assert!(msg.contains("500"), "{msg}");
    assert!(msg.contains("overloaded"), "{msg}");
}

#[tokio::test]
async fn long_error_bodies_are_truncated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("e".repeat(4000)))
        .mount(&server)
        .await;

    let (_dir, image) = artifact();
    let client = ChatCompletionsClient::new(server.uri(), "vision-test");
    let err = client
        .analyze(&VisionRequest {
            image_path: &image,
            prompt: &PromptSpec::Dashboard,
            context: &RunContext::new(),
        })
        .await
        .unwrap_err();
    match err {
        PipelineError::ModelTransport { detail, .. } => {
            assert_eq!(detail.chars().count(), BODY_EXCERPT_CHARS)
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn blank_completion_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("   \n")))
        .mount(&server)
        .await;

    let (_dir, image) = artifact();
    let client = ChatCompletionsClient::new(server.uri(), "vision-test");
    let err = client
        .analyze(&VisionRequest {
            image_path: &image,
            prompt: &PromptSpec::Question("is it raining?".into()),
            context: &RunContext::new(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::ModelEmptyResponse));
}

#[tokio::test]
async fn unreachable_endpoint_is_a_transport_error() {
    let (_dir, image) = artifact();
    // Nothing listens on port 9 locally.
    let client = ChatCompletionsClient::new("http://127.0.0.1:9", "vision-test");
    let err = client
        .analyze(&VisionRequest {
            image_path: &image,
            prompt: &PromptSpec::Dashboard,
            context: &RunContext::new(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::ModelTransport { status: None, .. }));
}
