use crate::errors::ConfigError;
use crate::model::{RunContext, TimeWindow};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub version: u32,
    pub dashboard_url: String,
    pub webdriver_url: String,
    pub model: ModelConfig,
    pub capture: CaptureConfig,
    pub storage: StorageConfig,
    pub schedule: ScheduleConfig,
    /// Extra trusted context copied into every record.
    pub context: RunContext,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            version: SUPPORTED_CONFIG_VERSION,
            dashboard_url: "http://localhost:5175/".to_string(),
            webdriver_url: "http://127.0.0.1:9515".to_string(),
            model: ModelConfig::default(),
            capture: CaptureConfig::default(),
            storage: StorageConfig::default(),
            schedule: ScheduleConfig::default(),
            context: RunContext::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
    /// Name of an env var holding a bearer token, if the endpoint needs one.
    pub api_key_env: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:11434".to_string(),
            model: "hf.co/unsloth/qwen3-vl-4b-instruct-gguf:q4_k_m".to_string(),
            temperature: 0.0,
            max_tokens: 1200,
            timeout_seconds: 300,
            api_key_env: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub device_scale_factor: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        // Tall enough that the lowest panel is not clipped.
        Self {
            width: 1600,
            height: 1800,
            device_scale_factor: 1.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ElementCapture {
    pub label: String,
    pub selector: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureConfig {
    pub viewport: Viewport,
    pub navigation_timeout_ms: u64,
    /// Upper bound on any single browser call after navigation, teardown included.
    pub command_timeout_ms: u64,
    pub ready_timeout_ms: u64,
    pub ready_poll_ms: u64,
    pub ready_expression: String,
    pub settle_before_scroll_ms: u64,
    pub settle_after_scroll_ms: u64,
    pub window_control_selector: String,
    pub window_switch_wait_ms: u64,
    pub default_window: TimeWindow,
    pub extra_captures: Vec<ElementCapture>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            navigation_timeout_ms: 90_000,
            command_timeout_ms: 30_000,
            ready_timeout_ms: 90_000,
            ready_poll_ms: 250,
            ready_expression: "return window.__DASH_READY__ === true;".to_string(),
            settle_before_scroll_ms: 3_000,
            settle_after_scroll_ms: 2_000,
            window_control_selector: "button.segBtn".to_string(),
            window_switch_wait_ms: 1_500,
            default_window: TimeWindow::OneHour,
            extra_captures: Vec::new(),
        }
    }
}

impl CaptureConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms.max(1))
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn ready_poll(&self) -> Duration {
        Duration::from_millis(self.ready_poll_ms.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
    pub snapshot_dir: PathBuf,
    pub query_snapshot_dir: PathBuf,
    /// Keep artifacts captured for ad-hoc questions instead of deleting them.
    pub retain_query_artifacts: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(".panelwatch/panelwatch.db"),
            snapshot_dir: PathBuf::from(".panelwatch/snapshots"),
            query_snapshot_dir: PathBuf::from(".panelwatch/query_snapshots"),
            retain_query_artifacts: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScheduleConfig {
    pub interval_seconds: u64,
    /// Front-end data refresh cadence, reported in the trusted context.
    pub refresh_interval_sec: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 300,
            refresh_interval_sec: 60,
        }
    }
}

impl ScheduleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds.max(1))
    }
}

pub fn load_config(path: &Path) -> Result<PipelineConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read config {}: {}", path.display(), e)))?;
    parse_config(&raw)
}

pub fn parse_config(raw: &str) -> Result<PipelineConfig, ConfigError> {
    let cfg: PipelineConfig = if raw.trim().is_empty() {
        PipelineConfig::default()
    } else {
        serde_yaml::from_str(raw).map_err(|e| ConfigError(format!("failed to parse YAML: {}", e)))?
    };
    if cfg.version != SUPPORTED_CONFIG_VERSION {
        return Err(ConfigError(format!(
            "unsupported config version {} (supported: {})",
            cfg.version, SUPPORTED_CONFIG_VERSION
        )));
    }
    if cfg.dashboard_url.trim().is_empty() {
        return Err(ConfigError("dashboard_url must not be empty".into()));
    }
    if cfg.model.endpoint.trim().is_empty() {
        return Err(ConfigError("model.endpoint must not be empty".into()));
    }
    Ok(cfg)
}

/// Load `path` if it exists, otherwise start from defaults. Env overrides apply either way.
pub fn load_or_default(path: &Path) -> Result<PipelineConfig, ConfigError> {
    let mut cfg = if path.exists() {
        load_config(path)?
    } else {
        PipelineConfig::default()
    };
    cfg.apply_env();
    Ok(cfg)
}

impl PipelineConfig {
    pub fn apply_env(&mut self) {
        self.apply_overrides(|k| std::env::var(k).ok());
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("PANELWATCH_DASHBOARD_URL") {
            self.dashboard_url = v;
        }
        if let Some(v) = lookup("PANELWATCH_WEBDRIVER_URL") {
            self.webdriver_url = v;
        }
        if let Some(v) = lookup("PANELWATCH_MODEL_ENDPOINT") {
            self.model.endpoint = v;
        }
        if let Some(v) = lookup("PANELWATCH_MODEL") {
            self.model.model = v;
        }
        if let Some(v) = lookup("PANELWATCH_DB") {
            self.storage.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("PANELWATCH_INTERVAL_SECS") {
            if let Ok(n) = v.parse() {
                self.schedule.interval_seconds = n;
            }
        }
    }
}

pub fn write_sample_config(path: &Path) -> Result<(), ConfigError> {
    std::fs::write(path, include_str!("../assets/panelwatch.yaml"))
        .map_err(|e| ConfigError(format!("failed to write sample config: {}", e)))?;
    Ok(())
}
