use super::{VisionClient, VisionRequest};
use crate::config::ModelConfig;
use crate::errors::PipelineError;
use crate::model::ModelResponse;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Value};
use std::time::Duration;

/// Client for OpenAI-compatible `/v1/chat/completions` servers (Ollama, llama.cpp, vLLM).
pub struct ChatCompletionsClient {
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub api_key: Option<String>,
    pub client: reqwest::Client,
}

impl ChatCompletionsClient {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            temperature: 0.0,
            max_tokens: 1200,
            api_key: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(cfg: &ModelConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds.max(1)))
            .build()?;
        let api_key = cfg
            .api_key_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok());
        Ok(Self {
            endpoint: cfg.endpoint.clone(),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
            api_key,
            client,
        })
    }

    fn url(&self) -> String {
        format!("{}/v1/chat/completions", self.endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl VisionClient for ChatCompletionsClient {
    async fn analyze(&self, req: &VisionRequest<'_>) -> Result<ModelResponse, PipelineError> {
        // The endpoint cannot read our disk, so the image travels inline.
        let bytes =
            tokio::fs::read(req.image_path)
                .await
                .map_err(|e| PipelineError::CaptureIo {
                    path: req.image_path.display().to_string(),
                    message: format!("cannot read artifact for upload: {}", e),
                })?;
        let data_url = format!("data:image/png;base64,{}", BASE64.encode(&bytes));

        let body = json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": req.prompt.render(req.context) },
                    { "type": "image_url", "image_url": { "url": data_url } }
                ]
            }],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        tracing::debug!(
            event = "model_request",
            url = %self.url(),
            image = %req.image_path.display(),
            image_bytes = bytes.len(),
            prompt_version = req.prompt.version()
        );

        let mut request = self
            .client
            .post(self.url())
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let resp = request
            .send()
            .await
            .map_err(|e| PipelineError::ModelTransport {
                status: None,
                detail: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            return Err(PipelineError::model_status(status.as_u16(), &error_text));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| PipelineError::ModelTransport {
                status: Some(status.as_u16()),
                detail: format!("invalid response body: {}", e),
            })?;

        let text = completion_text(&json).unwrap_or_default();
        if text.trim().is_empty() {
            return Err(PipelineError::ModelEmptyResponse);
        }

        tracing::debug!(
            event = "model_response",
            chars = text.len(),
            head = %crate::errors::excerpt(&text, 300)
        );

        Ok(ModelResponse {
            text,
            provider: self.provider_name().to_string(),
            model: self.model.clone(),
            meta: json!({ "usage": json.get("usage").cloned().unwrap_or(Value::Null) }),
        })
    }

    fn provider_name(&self) -> &'static str {
        "openai-compatible"
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// `choices[0].message.content`, either a string or a list of text parts.
fn completion_text(json: &Value) -> Option<String> {
    let content = json.pointer("/choices/0/message/content")?;
    if let Some(s) = content.as_str() {
        return Some(s.to_string());
    }
    let parts = content.as_array()?;
    Some(
        parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
    )
}
