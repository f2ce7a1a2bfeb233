use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Trusted key/value metadata recorded with a run. Never model-derived.
pub type RunContext = BTreeMap<String, serde_json::Value>;

/// One persisted pipeline run, as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: i64,
    pub created_at: String,
    pub source_url: String,
    pub artifact_paths: Vec<String>,
    pub prompt_version: String,
    pub model_endpoint: String,
    pub raw_model_output: String,
    pub structured_result: Option<serde_json::Value>,
    pub parse_ok: bool,
    #[serde(default)]
    pub context: RunContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Row about to be inserted. The store assigns the id.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub created_at: String,
    pub source_url: String,
    pub artifact_paths: Vec<String>,
    pub prompt_version: String,
    pub model_endpoint: String,
    pub model_name: Option<String>,
    pub raw_model_output: String,
    pub structured_result: Option<serde_json::Value>,
    pub context: RunContext,
    pub duration_ms: Option<u64>,
}

impl NewRecord {
    pub fn parse_ok(&self) -> bool {
        self.structured_result.is_some()
    }
}

/// Listing projection for `/records`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub id: i64,
    pub created_at: String,
    pub artifact_path: String,
    pub prompt_version: String,
}

/// Optional steering applied to the rendering surface before capture.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureInstruction {
    /// Raw window hint such as "6h". Unknown hints fall back to the default window.
    pub time_window: Option<String>,
}

impl CaptureInstruction {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn window(hint: impl Into<String>) -> Self {
        Self {
            time_window: Some(hint.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeWindow {
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "24h")]
    OneDay,
    #[serde(rename = "all")]
    All,
}

impl TimeWindow {
    pub fn from_hint(hint: &str) -> Option<Self> {
        match hint.trim().to_ascii_lowercase().as_str() {
            "15m" => Some(Self::FifteenMinutes),
            "1h" => Some(Self::OneHour),
            "6h" => Some(Self::SixHours),
            "24h" => Some(Self::OneDay),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    pub fn token(&self) -> &'static str {
        match self {
            Self::FifteenMinutes => "15m",
            Self::OneHour => "1h",
            Self::SixHours => "6h",
            Self::OneDay => "24h",
            Self::All => "all",
        }
    }

    /// Text of the dashboard control that selects this window.
    pub fn control_label(&self) -> &'static str {
        match self {
            Self::All => "All",
            other => other.token(),
        }
    }
}

/// A captured image plus its position in the run's artifact list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub label: String,
}

impl Artifact {
    pub fn path_string(&self) -> String {
        self.path.to_string_lossy().to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    pub text: String,
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub meta: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    Scheduled,
    OnDemand,
    Cli,
}

impl RunTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::OnDemand => "on_demand",
            Self::Cli => "cli",
        }
    }
}

/// Result of asking the coordinator for a run.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(Box<AnalysisRecord>),
    /// Another run holds the gate; nothing was started.
    AlreadyRunning,
}

/// ISO-8601 UTC with millisecond precision, e.g. `2026-10-16T08:15:02.123Z`.
pub fn iso_millis(t: &chrono::DateTime<chrono::Utc>) -> String {
    t.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
