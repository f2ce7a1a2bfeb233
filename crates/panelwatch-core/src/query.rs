//! Ephemeral question answering over the live dashboard.
//!
//! Shares the capture path with persisted runs but never writes a record.

use crate::capture::{ArtifactTarget, CaptureOrchestrator};
use crate::errors::PipelineError;
use crate::interpret::clean_answer;
use crate::model::{CaptureInstruction, RunContext, TimeWindow};
use crate::prompts::PromptSpec;
use crate::providers::llm::{VisionClient, VisionRequest};
use chrono::Utc;
use regex::Regex;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

fn window_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(15m|1h|6h|24h|all)\b").expect("static window regex"))
}

/// First window token in the question, if any. Absence means "leave the dashboard as is".
pub fn extract_time_window(question: &str) -> Option<TimeWindow> {
    window_pattern()
        .captures(question)
        .and_then(|c| c.get(1))
        .and_then(|m| TimeWindow::from_hint(m.as_str()))
}

pub struct QueryInterpreter {
    capture: Arc<CaptureOrchestrator>,
    client: Arc<dyn VisionClient>,
    query_dir: PathBuf,
    retain_artifacts: bool,
}

impl QueryInterpreter {
    pub fn new(
        capture: Arc<CaptureOrchestrator>,
        client: Arc<dyn VisionClient>,
        query_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            capture,
            client,
            query_dir: query_dir.into(),
            retain_artifacts: false,
        }
    }

    /// Keep question screenshots on disk instead of deleting them after the model call.
    pub fn retain_artifacts(mut self, retain: bool) -> Self {
        self.retain_artifacts = retain;
        self
    }

    pub async fn ask(&self, question: &str) -> Result<String, PipelineError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(PipelineError::EmptyQuestion);
        }

        let window = extract_time_window(question);
        let instruction = match window {
            Some(w) => CaptureInstruction::window(w.token()),
            None => CaptureInstruction::none(),
        };
        tracing::info!(
            event = "ask_start",
            window = window.map(|w| w.token()).unwrap_or("current")
        );

        let captured_at = Utc::now();
        let target = ArtifactTarget::queries(&self.query_dir);
        let artifacts = self
            .capture
            .capture(&instruction, &target, &captured_at)
            .await?;
        let primary = artifacts
            .first()
            .ok_or_else(|| PipelineError::render("capture", "capture produced no artifacts"))?;

        let prompt = PromptSpec::Question(question.to_string());
        let context = RunContext::new();
        let result = self
            .client
            .analyze(&VisionRequest {
                image_path: &primary.path,
                prompt: &prompt,
                context: &context,
            })
            .await;

        if !self.retain_artifacts {
            for artifact in &artifacts {
                if let Err(e) = tokio::fs::remove_file(&artifact.path).await {
                    tracing::warn!(
                        event = "query_artifact_cleanup_failed",
                        path = %artifact.path.display(),
                        error = %e
                    );
                }
            }
        }

        let answer = clean_answer(&result?.text);
        tracing::info!(event = "ask_done", answer_chars = answer.chars().count());
        Ok(answer)
    }
}
