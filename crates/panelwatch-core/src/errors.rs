use std::time::Duration;
use thiserror::Error;

/// Longest slice of a failing model response body kept for diagnosis.
pub const BODY_EXCERPT_CHARS: usize = 1000;

#[derive(Debug, Clone)]
pub struct ConfigError(pub String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ConfigError {}

/// Failures that abort a pipeline run.
///
/// Instruction-apply and decode failures never appear here; both are
/// recovered inside the pipeline and only logged.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("navigation to {url} did not settle within {timeout:?}")]
    NavigationTimeout { url: String, timeout: Duration },

    #[error("rendering surface did not report ready within {0:?}")]
    ReadinessTimeout(Duration),

    #[error("render session failed during {step}: {message}")]
    Render { step: &'static str, message: String },

    #[error("failed to write artifact {path}: {message}")]
    CaptureIo { path: String, message: String },

    #[error("{}", transport_message(*status, detail))]
    ModelTransport { status: Option<u16>, detail: String },

    #[error("model returned an empty response")]
    ModelEmptyResponse,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("question is required")]
    EmptyQuestion,
}

fn transport_message(status: Option<u16>, detail: &str) -> String {
    match status {
        Some(code) => format!("model endpoint error {}: {}", code, detail),
        None => format!("model endpoint unreachable: {}", detail),
    }
}

impl PipelineError {
    pub fn render(step: &'static str, message: impl Into<String>) -> Self {
        Self::Render {
            step,
            message: message.into(),
        }
    }

    pub fn model_status(status: u16, body: &str) -> Self {
        Self::ModelTransport {
            status: Some(status),
            detail: excerpt(body, BODY_EXCERPT_CHARS),
        }
    }

    /// Store calls return `anyhow::Error`; flatten the context chain into the message.
    pub fn storage(e: anyhow::Error) -> Self {
        Self::Storage(format!("{:#}", e))
    }

    /// Stable machine-readable code, used in API error bodies and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NavigationTimeout { .. } => "navigation_timeout",
            Self::ReadinessTimeout(_) => "readiness_timeout",
            Self::Render { .. } => "render_failure",
            Self::CaptureIo { .. } => "capture_io_failure",
            Self::ModelTransport { .. } => "model_transport_failure",
            Self::ModelEmptyResponse => "model_empty_response",
            Self::Storage(_) => "storage_failure",
            Self::EmptyQuestion => "empty_question",
        }
    }
}

impl From<rusqlite::Error> for PipelineError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

/// Truncate on a char boundary.
pub fn excerpt(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
