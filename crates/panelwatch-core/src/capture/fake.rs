use super::{RenderBackend, RenderSession};
use crate::config::Viewport;
use crate::errors::PipelineError;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// PNG signature followed by a marker; enough for anything that only checks the header.
pub const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake-render";

/// Pauses a capture mid-flight so tests can observe the busy state.
#[derive(Default)]
pub struct CaptureHold {
    pub entered: Notify,
    pub release: Notify,
}

#[derive(Default)]
struct Counters {
    launched: usize,
    closed: usize,
    activations: Vec<(String, String)>,
    navigations: Vec<String>,
}

/// Scriptable in-process backend for tests.
pub struct FakeRenderBackend {
    counters: Arc<Mutex<Counters>>,
    ready_after: Option<usize>,
    fail_activation: bool,
    fail_capture: bool,
    stall_close: bool,
    navigate_delay: Duration,
    hold: Arc<Mutex<Option<Arc<CaptureHold>>>>,
}

impl Default for FakeRenderBackend {
    fn default() -> Self {
        Self::ready()
    }
}

impl FakeRenderBackend {
    /// Surface reports ready on the first poll.
    pub fn ready() -> Self {
        Self {
            counters: Arc::new(Mutex::new(Counters::default())),
            ready_after: Some(1),
            fail_activation: false,
            fail_capture: false,
            stall_close: false,
            navigate_delay: Duration::ZERO,
            hold: Arc::new(Mutex::new(None)),
        }
    }

    pub fn never_ready() -> Self {
        Self {
            ready_after: None,
            ..Self::ready()
        }
    }

    /// Ready on the `polls`-th readiness check.
    pub fn ready_after(polls: usize) -> Self {
        Self {
            ready_after: Some(polls.max(1)),
            ..Self::ready()
        }
    }

    pub fn failing_activation(mut self) -> Self {
        self.fail_activation = true;
        self
    }

    pub fn failing_capture(mut self) -> Self {
        self.fail_capture = true;
        self
    }

    /// `close` never answers, like a wedged driver.
    pub fn stalling_close(mut self) -> Self {
        self.stall_close = true;
        self
    }

    pub fn with_navigate_delay(mut self, delay: Duration) -> Self {
        self.navigate_delay = delay;
        self
    }

    /// The next capture blocks in `capture_full_page` until `release` is notified.
    pub fn hold_next_capture(&self) -> Arc<CaptureHold> {
        let hold = Arc::new(CaptureHold::default());
        *self.hold.lock().unwrap() = Some(hold.clone());
        hold
    }

    pub fn launched(&self) -> usize {
        self.counters.lock().unwrap().launched
    }

    pub fn closed(&self) -> usize {
        self.counters.lock().unwrap().closed
    }

    pub fn open_sessions(&self) -> usize {
        let c = self.counters.lock().unwrap();
        c.launched - c.closed
    }

    /// `(selector, label)` pairs in the order they were clicked.
    pub fn activations(&self) -> Vec<(String, String)> {
        self.counters.lock().unwrap().activations.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.counters.lock().unwrap().navigations.clone()
    }
}

#[async_trait]
impl RenderBackend for FakeRenderBackend {
    async fn launch(
        &self,
        _viewport: &Viewport,
        _page_load_timeout: Duration,
    ) -> Result<Box<dyn RenderSession>, PipelineError> {
        self.counters.lock().unwrap().launched += 1;
        Ok(Box::new(FakeSession {
            counters: self.counters.clone(),
            ready_after: self.ready_after,
            polls: 0,
            fail_activation: self.fail_activation,
            fail_capture: self.fail_capture,
            stall_close: self.stall_close,
            navigate_delay: self.navigate_delay,
            hold: self.hold.lock().unwrap().take(),
            closed: false,
        }))
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

struct FakeSession {
    counters: Arc<Mutex<Counters>>,
    ready_after: Option<usize>,
    polls: usize,
    fail_activation: bool,
    fail_capture: bool,
    stall_close: bool,
    navigate_delay: Duration,
    hold: Option<Arc<CaptureHold>>,
    closed: bool,
}

#[async_trait]
impl RenderSession for FakeSession {
    async fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<(), PipelineError> {
        self.counters.lock().unwrap().navigations.push(url.to_string());
        if !self.navigate_delay.is_zero() {
            tokio::time::sleep(self.navigate_delay).await;
        }
        Ok(())
    }

    async fn is_ready(&mut self) -> Result<bool, PipelineError> {
        self.polls += 1;
        Ok(matches!(self.ready_after, Some(n) if self.polls >= n))
    }

    async fn activate_control(&mut self, selector: &str, label: &str) -> Result<(), PipelineError> {
        if self.fail_activation {
            return Err(PipelineError::render(
                "apply_instruction",
                format!("no control {} labelled {:?}", selector, label),
            ));
        }
        self.counters
            .lock()
            .unwrap()
            .activations
            .push((selector.to_string(), label.to_string()));
        Ok(())
    }

    async fn scroll_to_bottom(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }

    async fn capture_full_page(&mut self) -> Result<Vec<u8>, PipelineError> {
        if let Some(hold) = self.hold.take() {
            hold.entered.notify_one();
            hold.release.notified().await;
        }
        if self.fail_capture {
            return Err(PipelineError::render("capture", "screenshot failed"));
        }
        Ok(FAKE_PNG.to_vec())
    }

    async fn capture_element(&mut self, _selector: &str) -> Result<Vec<u8>, PipelineError> {
        if self.fail_capture {
            return Err(PipelineError::render("capture", "screenshot failed"));
        }
        Ok(FAKE_PNG.to_vec())
    }

    async fn close(&mut self) -> Result<(), PipelineError> {
        if self.stall_close {
            std::future::pending::<()>().await;
        }
        if !self.closed {
            self.closed = true;
            self.counters.lock().unwrap().closed += 1;
        }
        Ok(())
    }
}
