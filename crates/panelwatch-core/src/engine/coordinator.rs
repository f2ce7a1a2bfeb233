use crate::capture::{ArtifactTarget, CaptureOrchestrator, RenderBackend};
use crate::config::PipelineConfig;
use crate::errors::PipelineError;
use crate::interpret::{contract_warnings, interpret_strict, panel_titles, Interpretation};
use crate::model::{iso_millis, CaptureInstruction, NewRecord, RunContext, RunOutcome, RunTrigger};
use crate::prompts::PromptSpec;
use crate::providers::llm::{VisionClient, VisionRequest};
use crate::storage::Store;
use chrono::Utc;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// The parts of [`PipelineConfig`] a run needs after startup.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub snapshot_dir: PathBuf,
    pub interval: Duration,
    pub refresh_interval_sec: u64,
    pub extra_context: RunContext,
}

impl RunSettings {
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self {
            snapshot_dir: cfg.storage.snapshot_dir.clone(),
            interval: cfg.schedule.interval(),
            refresh_interval_sec: cfg.schedule.refresh_interval_sec,
            extra_context: cfg.context.clone(),
        }
    }
}

/// Runs at most one capture-analyze-persist pipeline at a time.
///
/// Cloning is cheap and every clone shares the same gate.
#[derive(Clone)]
pub struct RunCoordinator {
    store: Store,
    capture: Arc<CaptureOrchestrator>,
    client: Arc<dyn VisionClient>,
    settings: RunSettings,
    gate: Arc<Mutex<()>>,
}

impl RunCoordinator {
    pub fn new(
        store: Store,
        capture: Arc<CaptureOrchestrator>,
        client: Arc<dyn VisionClient>,
        settings: RunSettings,
    ) -> Self {
        Self {
            store,
            capture,
            client,
            settings,
            gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn from_config(
        cfg: &PipelineConfig,
        store: Store,
        backend: Arc<dyn RenderBackend>,
        client: Arc<dyn VisionClient>,
    ) -> Self {
        let capture = CaptureOrchestrator::new(backend, cfg.dashboard_url.clone(), cfg.capture.clone());
        Self::new(store, Arc::new(capture), client, RunSettings::from_config(cfg))
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn capture(&self) -> &Arc<CaptureOrchestrator> {
        &self.capture
    }

    pub fn client(&self) -> &Arc<dyn VisionClient> {
        &self.client
    }

    pub fn is_running(&self) -> bool {
        self.gate.try_lock().is_err()
    }

    /// Start a run unless one is already in flight. Never queues.
    ///
    /// The pipeline runs on its own task holding the gate, so a caller that
    /// goes away mid-run neither strands the session nor frees the gate early.
    pub async fn try_run(&self, trigger: RunTrigger) -> Result<RunOutcome, PipelineError> {
        let guard = match self.gate.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::info!(event = "run_rejected_busy", trigger = trigger.as_str());
                return Ok(RunOutcome::AlreadyRunning);
            }
        };

        let this = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            this.execute(trigger).await
        })
        .await
        .unwrap_or_else(|e| {
            Err(PipelineError::render(
                "run",
                format!("run task failed: {}", e),
            ))
        })
    }

    /// Resolve once no run holds the gate.
    pub async fn wait_idle(&self) {
        let _idle = self.gate.lock().await;
    }

    async fn execute(&self, trigger: RunTrigger) -> Result<RunOutcome, PipelineError> {
        let started = Instant::now();
        tracing::info!(event = "run_start", trigger = trigger.as_str());
        match self.run_pipeline(trigger, started).await {
            Ok(record) => {
                tracing::info!(
                    event = "run_done",
                    trigger = trigger.as_str(),
                    record_id = record.id,
                    parse_ok = record.parse_ok,
                    duration_ms = started.elapsed().as_millis() as u64
                );
                Ok(RunOutcome::Completed(Box::new(record)))
            }
            Err(e) => {
                tracing::warn!(
                    event = "run_failed",
                    trigger = trigger.as_str(),
                    code = e.code(),
                    error = %e,
                    duration_ms = started.elapsed().as_millis() as u64
                );
                Err(e)
            }
        }
    }

    /// Fire immediately, then every `interval`. Failures are logged and the cadence continues.
    pub async fn run_scheduled(&self) {
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            event = "scheduler_start",
            interval_secs = self.settings.interval.as_secs()
        );
        loop {
            ticker.tick().await;
            match self.try_run(RunTrigger::Scheduled).await {
                Ok(RunOutcome::Completed(_)) => {}
                Ok(RunOutcome::AlreadyRunning) => {
                    tracing::info!(event = "scheduler_tick_skipped", reason = "run in flight")
                }
                Err(e) => tracing::error!(event = "scheduler_tick_failed", code = e.code(), error = %e),
            }
        }
    }

    fn run_context(&self, trigger: RunTrigger, captured_at: &str) -> RunContext {
        let mut ctx = self.settings.extra_context.clone();
        let snapshot_interval_min = match trigger {
            RunTrigger::Scheduled => self.settings.interval.as_secs() / 60,
            RunTrigger::OnDemand | RunTrigger::Cli => 0,
        };
        ctx.insert("captured_at_iso".into(), Value::from(captured_at));
        ctx.insert("dashboard_url".into(), Value::from(self.capture.source_url()));
        ctx.insert(
            "refresh_interval_sec".into(),
            Value::from(self.settings.refresh_interval_sec),
        );
        ctx.insert("snapshot_interval_min".into(), Value::from(snapshot_interval_min));
        ctx.insert("trigger".into(), Value::from(trigger.as_str()));
        ctx
    }

    async fn run_pipeline(
        &self,
        trigger: RunTrigger,
        started: Instant,
    ) -> Result<crate::model::AnalysisRecord, PipelineError> {
        // Stamped before any I/O; names the artifact and orders the record.
        let captured_at = Utc::now();
        let created_at = iso_millis(&captured_at);
        let context = self.run_context(trigger, &created_at);

        let target = ArtifactTarget::snapshots(&self.settings.snapshot_dir);
        let artifacts = self
            .capture
            .capture(&CaptureInstruction::none(), &target, &captured_at)
            .await?;
        let primary = artifacts
            .first()
            .ok_or_else(|| PipelineError::render("capture", "capture produced no artifacts"))?;

        let prompt = PromptSpec::Dashboard;
        let response = self
            .client
            .analyze(&VisionRequest {
                image_path: &primary.path,
                prompt: &prompt,
                context: &context,
            })
            .await?;

        let structured = match interpret_strict(&response.text) {
            Interpretation::Parsed(value) => {
                tracing::debug!(event = "decoded", panels = ?panel_titles(&value));
                for warning in contract_warnings(&value) {
                    tracing::warn!(event = "prompt_contract_deviation", detail = %warning);
                }
                Some(value)
            }
            Interpretation::Unparsed { error } => {
                tracing::warn!(event = "decode_failed", error = %error);
                None
            }
            Interpretation::Raw(_) => None,
        };

        let new = NewRecord {
            created_at,
            source_url: self.capture.source_url().to_string(),
            artifact_paths: artifacts.iter().map(|a| a.path_string()).collect(),
            prompt_version: prompt.version().to_string(),
            model_endpoint: self.client.endpoint().to_string(),
            model_name: Some(response.model.clone()),
            raw_model_output: response.text,
            structured_result: structured,
            context,
            duration_ms: Some(started.elapsed().as_millis() as u64),
        };
        let id = self.store.insert_record(&new).map_err(PipelineError::storage)?;

        self.store
            .get_record(id)
            .map_err(PipelineError::storage)?
            .ok_or_else(|| PipelineError::Storage(format!("record {} vanished after insert", id)))
    }
}
