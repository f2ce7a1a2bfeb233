//! Driving the rendering surface to a capturable state.
//!
//! The pixel primitive lives behind [`RenderBackend`]/[`RenderSession`]; the
//! orchestrator owns the protocol around it.

use crate::config::Viewport;
use crate::errors::PipelineError;
use async_trait::async_trait;
use std::time::Duration;

pub mod fake;
pub mod orchestrator;
pub mod webdriver;

pub use orchestrator::{ArtifactNaming, ArtifactTarget, CaptureOrchestrator};

#[async_trait]
pub trait RenderBackend: Send + Sync {
    /// Acquire an isolated session with a fixed viewport and pixel density.
    async fn launch(
        &self,
        viewport: &Viewport,
        page_load_timeout: Duration,
    ) -> Result<Box<dyn RenderSession>, PipelineError>;

    fn name(&self) -> &'static str;
}

/// One live page. Exclusively owned by a single capture; always closed by the orchestrator.
#[async_trait]
pub trait RenderSession: Send {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), PipelineError>;

    /// Readiness handle published by the surface itself.
    async fn is_ready(&mut self) -> Result<bool, PipelineError>;

    /// Click the control matching `selector` whose visible text equals `label`.
    async fn activate_control(&mut self, selector: &str, label: &str)
        -> Result<(), PipelineError>;

    async fn scroll_to_bottom(&mut self) -> Result<(), PipelineError>;

    /// PNG of the full document extent, not just the viewport.
    async fn capture_full_page(&mut self) -> Result<Vec<u8>, PipelineError>;

    async fn capture_element(&mut self, selector: &str) -> Result<Vec<u8>, PipelineError>;

    async fn close(&mut self) -> Result<(), PipelineError>;
}
