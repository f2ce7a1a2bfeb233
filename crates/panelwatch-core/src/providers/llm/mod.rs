use crate::errors::PipelineError;
use crate::model::{ModelResponse, RunContext};
use crate::prompts::PromptSpec;
use async_trait::async_trait;
use std::path::Path;

/// One image-plus-instruction call. The prompt is explicit per call.
#[derive(Debug, Clone, Copy)]
pub struct VisionRequest<'a> {
    pub image_path: &'a Path,
    pub prompt: &'a PromptSpec,
    pub context: &'a RunContext,
}

#[async_trait]
pub trait VisionClient: Send + Sync {
    /// Single attempt, no retries. Returns the first completion's text.
    async fn analyze(&self, req: &VisionRequest<'_>) -> Result<ModelResponse, PipelineError>;
    fn provider_name(&self) -> &'static str;
    fn endpoint(&self) -> &str;
    fn model(&self) -> &str;
}

pub mod fake;
pub mod openai;
