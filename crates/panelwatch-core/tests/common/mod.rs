#![allow(dead_code)]

use panelwatch_core::capture::fake::FakeRenderBackend;
use panelwatch_core::capture::CaptureOrchestrator;
use panelwatch_core::config::CaptureConfig;
use panelwatch_core::engine::{RunCoordinator, RunSettings};
use panelwatch_core::prompts::PANEL_TITLES;
use panelwatch_core::providers::llm::VisionClient;
use panelwatch_core::storage::Store;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const DASHBOARD_URL: &str = "http://dashboard.test/";

/// Capture settings with every wait shrunk to keep tests fast.
pub fn quick_capture() -> CaptureConfig {
    CaptureConfig {
        navigation_timeout_ms: 2_000,
        ready_timeout_ms: 200,
        ready_poll_ms: 5,
        settle_before_scroll_ms: 0,
        settle_after_scroll_ms: 0,
        window_switch_wait_ms: 0,
        ..CaptureConfig::default()
    }
}

pub fn orchestrator(backend: Arc<FakeRenderBackend>) -> Arc<CaptureOrchestrator> {
    Arc::new(CaptureOrchestrator::new(backend, DASHBOARD_URL, quick_capture()))
}

pub fn coordinator(
    root: &Path,
    backend: Arc<FakeRenderBackend>,
    client: Arc<dyn VisionClient>,
) -> anyhow::Result<RunCoordinator> {
    coordinator_every(root, backend, client, Duration::from_secs(300))
}

/// Same wiring with a custom scheduler cadence.
pub fn coordinator_every(
    root: &Path,
    backend: Arc<FakeRenderBackend>,
    client: Arc<dyn VisionClient>,
    interval: Duration,
) -> anyhow::Result<RunCoordinator> {
    let store = Store::open(&root.join("panelwatch.db"))?;
    store.init_schema()?;
    let settings = RunSettings {
        snapshot_dir: root.join("snapshots"),
        interval,
        refresh_interval_sec: 60,
        extra_context: Default::default(),
    };
    Ok(RunCoordinator::new(store, orchestrator(backend), client, settings))
}

/// Poll `cond` every 10ms until it holds or `limit` passes.
pub async fn eventually(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

/// A response that follows the six-panel dashboard template field for field.
pub fn six_panel_json() -> Value {
    json!({
        "summary": "PM2.5 sits at 107 and PM10 at 36, both flat. Temperature holds at 23°C and humidity at 57%. AQI bars read 107 with no change. PM2.5 dominates the pollutant pie and the change chart shows 0% everywhere.",
        "graph_descriptions": [
            {
                "graph_title": PANEL_TITLES[0],
                "visible_recent_values": "PM2.5 = 107, PM10 = 36",
                "trend": "completely flat",
                "recent_change_3_5min": "no change visible"
            },
            {
                "graph_title": PANEL_TITLES[1],
                "visible_recent_values": "Temp = 23°C",
                "trend": "completely flat",
                "recent_change_3_5min": "no change visible"
            },
            {
                "graph_title": PANEL_TITLES[2],
                "visible_recent_values": "Humidity = 57%",
                "trend": "up",
                "recent_change_3_5min": "rose from 55% to 57%"
            },
            {
                "graph_title": PANEL_TITLES[3],
                "visible_recent_value": "107",
                "trend": "completely flat",
                "recent_change_3_5min": "no change visible",
                "health_risk": "Unhealthy for sensitive groups"
            },
            {
                "graph_title": PANEL_TITLES[4],
                "visible_values": "PM2.5 40%, PM10 30%, O3 15%",
                "dominant_pollutant": "PM2.5",
                "description": "no change visible"
            },
            {
                "graph_title": PANEL_TITLES[5],
                "visible_changes": "PM2.5 +0%, PM10 +0%, AQI +0%",
                "overall_change_trend": "flat",
                "description": "no metric changed"
            }
        ],
        "overall_trend": "completely flat",
        "health_weather_note": "PM2.5 at 107 indicates unhealthy air for sensitive groups.",
        "relationships": [
            {"statement": "AQI tracks the PM2.5 level", "confidence": 0.8}
        ],
        "confidence_notes": ["All lines flat"]
    })
}
