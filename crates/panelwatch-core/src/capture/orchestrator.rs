use super::{RenderBackend, RenderSession};
use crate::config::CaptureConfig;
use crate::errors::PipelineError;
use crate::model::{iso_millis, Artifact, CaptureInstruction, TimeWindow};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::time::{sleep, timeout, Instant};

const MAX_NAME_ATTEMPTS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactNaming {
    /// `dash_<iso stamp>__dashboard.png`, used by persisted runs.
    Snapshot,
    /// `chat_analysis_<unix millis>.png`, used by the question flow.
    Query,
}

/// Where a capture writes its files and how they are named.
#[derive(Debug, Clone)]
pub struct ArtifactTarget {
    pub dir: PathBuf,
    pub naming: ArtifactNaming,
}

impl ArtifactTarget {
    pub fn snapshots(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            naming: ArtifactNaming::Snapshot,
        }
    }

    pub fn queries(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            naming: ArtifactNaming::Query,
        }
    }

    pub fn file_stem(&self, captured_at: &DateTime<Utc>, label: Option<&str>) -> String {
        let suffix = label.map(slug).unwrap_or_else(|| "dashboard".to_string());
        match self.naming {
            ArtifactNaming::Snapshot => {
                let safe = iso_millis(captured_at).replace([':', '.'], "-");
                format!("dash_{}__{}", safe, suffix)
            }
            ArtifactNaming::Query => match label {
                None => format!("chat_analysis_{}", captured_at.timestamp_millis()),
                Some(_) => format!(
                    "chat_analysis_{}__{}",
                    captured_at.timestamp_millis(),
                    suffix
                ),
            },
        }
    }
}

fn slug(label: &str) -> String {
    let s: String = label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    let s = s.trim_matches('_').to_string();
    if s.is_empty() {
        "element".to_string()
    } else {
        s
    }
}

/// Launch → Navigate → AwaitReady → ApplyInstruction → Settle → Capture → Teardown.
#[derive(Clone)]
pub struct CaptureOrchestrator {
    backend: Arc<dyn RenderBackend>,
    url: String,
    settings: CaptureConfig,
}

impl CaptureOrchestrator {
    pub fn new(backend: Arc<dyn RenderBackend>, url: impl Into<String>, settings: CaptureConfig) -> Self {
        Self {
            backend,
            url: url.into(),
            settings,
        }
    }

    pub fn source_url(&self) -> &str {
        &self.url
    }

    pub fn settings(&self) -> &CaptureConfig {
        &self.settings
    }

    /// Capture the surface. The session is closed on every path, success or not.
    ///
    /// The work runs on its own task, so dropping the returned future does not
    /// abandon an open session.
    pub async fn capture(
        &self,
        instruction: &CaptureInstruction,
        target: &ArtifactTarget,
        captured_at: &DateTime<Utc>,
    ) -> Result<Vec<Artifact>, PipelineError> {
        let this = self.clone();
        let instruction = instruction.clone();
        let target = target.clone();
        let captured_at = *captured_at;
        let task = tokio::spawn(async move {
            this.capture_detached(&instruction, &target, &captured_at)
                .await
        });
        task.await.unwrap_or_else(|e| {
            Err(PipelineError::render(
                "capture",
                format!("capture task failed: {}", e),
            ))
        })
    }

    async fn capture_detached(
        &self,
        instruction: &CaptureInstruction,
        target: &ArtifactTarget,
        captured_at: &DateTime<Utc>,
    ) -> Result<Vec<Artifact>, PipelineError> {
        tracing::info!(
            event = "capture_launch",
            backend = self.backend.name(),
            url = %self.url,
            width = self.settings.viewport.width,
            height = self.settings.viewport.height
        );
        let mut session = self
            .backend
            .launch(&self.settings.viewport, self.settings.navigation_timeout())
            .await?;

        let outcome = self
            .drive(session.as_mut(), instruction, target, captured_at)
            .await;

        if let Err(e) = self.bounded("close", session.close()).await {
            tracing::warn!(event = "capture_teardown_failed", error = %e);
        }

        match &outcome {
            Ok(artifacts) => tracing::info!(event = "capture_done", artifacts = artifacts.len()),
            Err(e) => tracing::warn!(event = "capture_failed", code = e.code(), error = %e),
        }
        outcome
    }

    /// Cap a single browser call at `command_timeout_ms`.
    async fn bounded<T>(
        &self,
        step: &'static str,
        call: impl Future<Output = Result<T, PipelineError>>,
    ) -> Result<T, PipelineError> {
        let limit = self.settings.command_timeout();
        match timeout(limit, call).await {
            Ok(res) => res,
            Err(_) => Err(PipelineError::render(
                step,
                format!("timeout: no response within {:?}", limit),
            )),
        }
    }

    async fn drive(
        &self,
        session: &mut dyn RenderSession,
        instruction: &CaptureInstruction,
        target: &ArtifactTarget,
        captured_at: &DateTime<Utc>,
    ) -> Result<Vec<Artifact>, PipelineError> {
        let nav_timeout = self.settings.navigation_timeout();
        match timeout(nav_timeout, session.navigate(&self.url, nav_timeout)).await {
            Ok(res) => res?,
            Err(_) => {
                return Err(PipelineError::NavigationTimeout {
                    url: self.url.clone(),
                    timeout: nav_timeout,
                })
            }
        }

        self.await_ready(session).await?;

        if let Some(hint) = instruction.time_window.as_deref() {
            self.apply_window(session, hint).await;
        }

        sleep(ms(self.settings.settle_before_scroll_ms)).await;
        self.bounded("scroll", session.scroll_to_bottom()).await?;
        sleep(ms(self.settings.settle_after_scroll_ms)).await;

        let mut artifacts = Vec::with_capacity(1 + self.settings.extra_captures.len());
        let png = self.bounded("screenshot", session.capture_full_page()).await?;
        let path = write_artifact(&target.dir, &target.file_stem(captured_at, None), &png).await?;
        artifacts.push(Artifact {
            path,
            label: "Current Dashboard".to_string(),
        });

        for extra in &self.settings.extra_captures {
            let png = self
                .bounded("element_screenshot", session.capture_element(&extra.selector))
                .await?;
            let stem = target.file_stem(captured_at, Some(&extra.label));
            let path = write_artifact(&target.dir, &stem, &png).await?;
            artifacts.push(Artifact {
                path,
                label: extra.label.clone(),
            });
        }
        Ok(artifacts)
    }

    async fn await_ready(&self, session: &mut dyn RenderSession) -> Result<(), PipelineError> {
        let limit = self.settings.ready_timeout();
        let deadline = Instant::now() + limit;
        let mut polls = 0u32;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(PipelineError::ReadinessTimeout(limit));
            }
            polls += 1;
            match timeout(remaining, session.is_ready()).await {
                Ok(Ok(true)) => {
                    tracing::debug!(event = "surface_ready", polls);
                    return Ok(());
                }
                Ok(Ok(false)) => {}
                // The page may still be booting its scripts; keep polling until the deadline.
                Ok(Err(e)) => tracing::debug!(event = "readiness_check_error", error = %e),
                Err(_) => return Err(PipelineError::ReadinessTimeout(limit)),
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            sleep(self.settings.ready_poll().min(remaining)).await;
        }
    }

    /// Best effort: a failure here leaves whatever window is active.
    async fn apply_window(&self, session: &mut dyn RenderSession, hint: &str) {
        let window = TimeWindow::from_hint(hint).unwrap_or_else(|| {
            tracing::debug!(event = "window_hint_unmapped", hint = %hint);
            self.settings.default_window
        });
        let label = window.control_label();
        let click = session.activate_control(&self.settings.window_control_selector, label);
        match self.bounded("activate_control", click).await {
            Ok(()) => {
                tracing::info!(event = "window_applied", window = label);
                sleep(ms(self.settings.window_switch_wait_ms)).await;
            }
            Err(e) => tracing::warn!(
                event = "instruction_apply_failed",
                window = label,
                error = %e
            ),
        }
    }
}

fn ms(v: u64) -> std::time::Duration {
    std::time::Duration::from_millis(v)
}

/// Write into a lazily created dir without ever overwriting an existing file.
async fn write_artifact(dir: &Path, stem: &str, bytes: &[u8]) -> Result<PathBuf, PipelineError> {
    let io_err = |path: &Path, e: std::io::Error| PipelineError::CaptureIo {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| io_err(dir, e))?;

    for attempt in 0..MAX_NAME_ATTEMPTS {
        let name = if attempt == 0 {
            format!("{}.png", stem)
        } else {
            format!("{}-{}.png", stem, attempt)
        };
        let path = dir.join(name);
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await;
        let mut file = match file {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(io_err(&path, e)),
        };
        file.write_all(bytes).await.map_err(|e| io_err(&path, e))?;
        file.sync_all().await.map_err(|e| io_err(&path, e))?;
        return Ok(path);
    }

    Err(PipelineError::CaptureIo {
        path: dir.join(stem).display().to_string(),
        message: "no free file name".to_string(),
    })
}
