//! W3C WebDriver adapter (chromedriver) for the rendering surface.
//!
//! Pixel density and full-document screenshots go through chromedriver's
//! CDP passthrough, the rest is plain W3C.

use super::{RenderBackend, RenderSession};
use crate::config::{CaptureConfig, Viewport};
use crate::errors::{excerpt, PipelineError};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Method;
use serde_json::{json, Value};
use std::time::Duration;

const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const SCROLL_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight); return true;";
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

pub struct WebDriverBackend {
    base_url: String,
    client: reqwest::Client,
    ready_script: String,
    command_timeout: Duration,
}

impl WebDriverBackend {
    pub fn new(base_url: impl Into<String>, ready_script: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            ready_script: ready_script.into(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn from_config(base_url: &str, capture: &CaptureConfig) -> Self {
        Self::new(base_url, capture.ready_expression.clone())
            .with_command_timeout(capture.command_timeout())
    }

    /// Per-request limit for every call except navigation, which gets the page-load budget on top.
    pub fn with_command_timeout(mut self, limit: Duration) -> Self {
        self.command_timeout = limit;
        self
    }

    fn capabilities(&self, viewport: &Viewport, page_load_timeout: Duration) -> Value {
        let args = vec![
            "--headless=new".to_string(),
            format!("--window-size={},{}", viewport.width, viewport.height),
            format!("--force-device-scale-factor={}", viewport.device_scale_factor),
            "--hide-scrollbars".to_string(),
            "--disable-gpu".to_string(),
        ];
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "pageLoadStrategy": "normal",
                    "timeouts": { "pageLoad": page_load_timeout.as_millis() as u64 },
                    "goog:chromeOptions": { "args": args }
                }
            }
        })
    }
}

#[async_trait]
impl RenderBackend for WebDriverBackend {
    async fn launch(
        &self,
        viewport: &Viewport,
        page_load_timeout: Duration,
    ) -> Result<Box<dyn RenderSession>, PipelineError> {
        let body = self.capabilities(viewport, page_load_timeout);
        let url = format!("{}/session", self.base_url);
        let value = send(
            &self.client,
            Method::POST,
            &url,
            Some(&body),
            "launch",
            self.command_timeout,
        )
        .await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| PipelineError::render("launch", "response carried no sessionId"))?
            .to_string();
        tracing::debug!(event = "webdriver_session_created", session_id = %session_id);

        let mut session = WebDriverSession {
            client: self.client.clone(),
            session_url: format!("{}/session/{}", self.base_url, session_id),
            ready_script: self.ready_script.clone(),
            command_timeout: self.command_timeout,
            closed: false,
        };

        // A session that exists but could not be configured must not leak.
        if let Err(e) = session.set_device_metrics(viewport).await {
            if let Err(close_err) = session.close().await {
                tracing::warn!(event = "webdriver_close_failed", error = %close_err);
            }
            return Err(e);
        }
        Ok(Box::new(session))
    }

    fn name(&self) -> &'static str {
        "webdriver"
    }
}

pub struct WebDriverSession {
    client: reqwest::Client,
    session_url: String,
    ready_script: String,
    command_timeout: Duration,
    closed: bool,
}

impl WebDriverSession {
    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        step: &'static str,
    ) -> Result<Value, PipelineError> {
        self.call_within(method, path, body, step, self.command_timeout)
            .await
    }

    async fn call_within(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        step: &'static str,
        limit: Duration,
    ) -> Result<Value, PipelineError> {
        let url = format!("{}{}", self.session_url, path);
        send(&self.client, method, &url, body, step, limit).await
    }

    async fn cdp(&self, cmd: &str, params: Value, step: &'static str) -> Result<Value, PipelineError> {
        let body = json!({ "cmd": cmd, "params": params });
        self.call(Method::POST, "/goog/cdp/execute", Some(&body), step)
            .await
    }

    async fn execute(&self, script: &str, step: &'static str) -> Result<Value, PipelineError> {
        let body = json!({ "script": script, "args": [] });
        self.call(Method::POST, "/execute/sync", Some(&body), step)
            .await
    }

    async fn set_device_metrics(&self, viewport: &Viewport) -> Result<(), PipelineError> {
        self.cdp(
            "Emulation.setDeviceMetricsOverride",
            json!({
                "width": viewport.width,
                "height": viewport.height,
                "deviceScaleFactor": viewport.device_scale_factor,
                "mobile": false
            }),
            "launch",
        )
        .await?;
        Ok(())
    }

    async fn find_all(&self, selector: &str, step: &'static str) -> Result<Vec<String>, PipelineError> {
        let body = json!({ "using": "css selector", "value": selector });
        let value = self.call(Method::POST, "/elements", Some(&body), step).await?;
        Ok(value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|e| e.get(ELEMENT_KEY).and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl RenderSession for WebDriverSession {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), PipelineError> {
        let body = json!({ "url": url });
        let limit = timeout + self.command_timeout;
        match self
            .call_within(Method::POST, "/url", Some(&body), "navigate", limit)
            .await
        {
            Err(PipelineError::Render { message, .. }) if message.starts_with("timeout") => {
                Err(PipelineError::NavigationTimeout {
                    url: url.to_string(),
                    timeout,
                })
            }
            other => other.map(|_| ()),
        }
    }

    async fn is_ready(&mut self) -> Result<bool, PipelineError> {
        let value = self.execute(&self.ready_script, "await_ready").await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn activate_control(&mut self, selector: &str, label: &str) -> Result<(), PipelineError> {
        for id in self.find_all(selector, "apply_instruction").await? {
            let text = self
                .call(Method::GET, &format!("/element/{}/text", id), None, "apply_instruction")
                .await?;
            if text.as_str().map(str::trim) == Some(label) {
                self.call(
                    Method::POST,
                    &format!("/element/{}/click", id),
                    Some(&json!({})),
                    "apply_instruction",
                )
                .await?;
                return Ok(());
            }
        }
        Err(PipelineError::render(
            "apply_instruction",
            format!("no control {} labelled {:?}", selector, label),
        ))
    }

    async fn scroll_to_bottom(&mut self) -> Result<(), PipelineError> {
        self.execute(SCROLL_SCRIPT, "settle").await?;
        Ok(())
    }

    async fn capture_full_page(&mut self) -> Result<Vec<u8>, PipelineError> {
        let metrics = self
            .cdp("Page.getLayoutMetrics", json!({}), "capture")
            .await?;
        let size = metrics
            .get("cssContentSize")
            .or_else(|| metrics.get("contentSize"))
            .ok_or_else(|| PipelineError::render("capture", "layout metrics missing content size"))?;
        let width = size.get("width").and_then(Value::as_f64).unwrap_or(0.0);
        let height = size.get("height").and_then(Value::as_f64).unwrap_or(0.0);

        let shot = self
            .cdp(
                "Page.captureScreenshot",
                json!({
                    "format": "png",
                    "captureBeyondViewport": true,
                    "clip": { "x": 0, "y": 0, "width": width, "height": height, "scale": 1 }
                }),
                "capture",
            )
            .await?;
        let data = shot
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| PipelineError::render("capture", "screenshot carried no data"))?;
        decode_png(data)
    }

    async fn capture_element(&mut self, selector: &str) -> Result<Vec<u8>, PipelineError> {
        let id = self
            .find_all(selector, "capture")
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::render("capture", format!("no element matches {}", selector)))?;
        let value = self
            .call(Method::GET, &format!("/element/{}/screenshot", id), None, "capture")
            .await?;
        let data = value
            .as_str()
            .ok_or_else(|| PipelineError::render("capture", "element screenshot carried no data"))?;
        decode_png(data)
    }

    async fn close(&mut self) -> Result<(), PipelineError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.call(Method::DELETE, "", None, "teardown").await?;
        Ok(())
    }
}

fn decode_png(data: &str) -> Result<Vec<u8>, PipelineError> {
    BASE64
        .decode(data)
        .map_err(|e| PipelineError::render("capture", format!("invalid base64 screenshot: {}", e)))
}

/// One W3C round trip. Unwraps `value`, maps `{"value":{"error":..}}` to a render error
/// whose message starts with the W3C error code.
async fn send(
    client: &reqwest::Client,
    method: Method,
    url: &str,
    body: Option<&Value>,
    step: &'static str,
    limit: Duration,
) -> Result<Value, PipelineError> {
    let mut req = client.request(method, url).timeout(limit);
    if let Some(b) = body {
        req = req.json(b);
    }
    let failed = |e: reqwest::Error, what: &str| {
        if e.is_timeout() {
            PipelineError::render(step, format!("timeout: no response within {:?}", limit))
        } else {
            PipelineError::render(step, format!("{}: {}", what, e))
        }
    };
    let resp = req
        .send()
        .await
        .map_err(|e| failed(e, "webdriver unreachable"))?;
    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| failed(e, "unreadable response"))?;
    let parsed: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
    let value = parsed.get("value").cloned().unwrap_or(Value::Null);

    if let Some(code) = value.get("error").and_then(Value::as_str) {
        let message = value.get("message").and_then(Value::as_str).unwrap_or("");
        return Err(PipelineError::render(
            step,
            format!("{}: {}", code, excerpt(message, 300)),
        ));
    }
    if !status.is_success() {
        return Err(PipelineError::render(
            step,
            format!("http {}: {}", status.as_u16(), excerpt(&text, 300)),
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_pin_viewport_and_page_load() {
        let backend = WebDriverBackend::new("http://127.0.0.1:9515/", "return true;");
        let caps = backend.capabilities(
            &Viewport {
                width: 1600,
                height: 1800,
                device_scale_factor: 1.2,
            },
            Duration::from_secs(90),
        );
        let always = &caps["capabilities"]["alwaysMatch"];
        assert_eq!(always["timeouts"]["pageLoad"], 90000);
        let args = always["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(args.iter().any(|a| a == "--window-size=1600,1800"));
        assert!(args.iter().any(|a| a == "--headless=new"));
        assert_eq!(backend.base_url, "http://127.0.0.1:9515");
    }

    #[test]
    fn command_timeout_comes_from_capture_settings() {
        let capture = CaptureConfig {
            command_timeout_ms: 1_500,
            ..CaptureConfig::default()
        };
        let backend = WebDriverBackend::from_config("http://127.0.0.1:9515", &capture);
        assert_eq!(backend.command_timeout, Duration::from_millis(1_500));
        assert_eq!(backend.ready_script, capture.ready_expression);
        let defaulted = WebDriverBackend::new("http://127.0.0.1:9515", "return true;");
        assert_eq!(defaulted.command_timeout, DEFAULT_COMMAND_TIMEOUT);
    }

    #[test]
    fn bad_base64_is_a_render_error() {
        let err = decode_png("***").unwrap_err();
        assert_eq!(err.code(), "render_failure");
    }
}
