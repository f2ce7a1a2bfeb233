use super::{VisionClient, VisionRequest};
use crate::errors::PipelineError;
use crate::model::ModelResponse;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

/// What the fake saw on each call.
#[derive(Debug, Clone)]
pub struct SeenCall {
    pub prompt: String,
    pub prompt_version: &'static str,
    pub image_path: PathBuf,
    pub image_existed: bool,
}

/// Scripted client for tests. Queued replies are served first, then `fallback`.
pub struct FakeVisionClient {
    replies: Mutex<VecDeque<Result<String, PipelineError>>>,
    fallback: String,
    calls: Mutex<Vec<SeenCall>>,
}

impl FakeVisionClient {
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: fallback.into(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push_reply(&self, text: impl Into<String>) {
        self.replies.lock().unwrap().push_back(Ok(text.into()));
    }

    pub fn push_error(&self, err: PipelineError) {
        self.replies.lock().unwrap().push_back(Err(err));
    }

    pub fn calls(&self) -> Vec<SeenCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl VisionClient for FakeVisionClient {
    async fn analyze(&self, req: &VisionRequest<'_>) -> Result<ModelResponse, PipelineError> {
        self.calls.lock().unwrap().push(SeenCall {
            prompt: req.prompt.render(req.context),
            prompt_version: req.prompt.version(),
            image_path: req.image_path.to_path_buf(),
            image_existed: req.image_path.exists(),
        });

        let next = self.replies.lock().unwrap().pop_front();
        let text = match next {
            Some(reply) => reply?,
            None => self.fallback.clone(),
        };
        if text.trim().is_empty() {
            return Err(PipelineError::ModelEmptyResponse);
        }
        Ok(ModelResponse {
            text,
            provider: "fake".to_string(),
            model: "fake-vision".to_string(),
            meta: serde_json::json!({}),
        })
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }

    fn endpoint(&self) -> &str {
        "fake://vision"
    }

    fn model(&self) -> &str {
        "fake-vision"
    }
}
