mod common;

use common::{coordinator_every, eventually, six_panel_json};
use panelwatch_core::capture::fake::FakeRenderBackend;
use panelwatch_core::errors::PipelineError;
use panelwatch_core::model::{RunOutcome, RunTrigger};
use panelwatch_core::providers::llm::fake::FakeVisionClient;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

const HOUR: Duration = Duration::from_secs(3600);
const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn first_tick_fires_at_startup() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let backend = Arc::new(FakeRenderBackend::ready());
    let client = Arc::new(FakeVisionClient::new(six_panel_json().to_string()));
    let coord = coordinator_every(dir.path(), backend.clone(), client, HOUR)?;

    let scheduler = {
        let coord = coord.clone();
        tokio::spawn(async move { coord.run_scheduled().await })
    };
    let store = coord.store().clone();
    assert!(eventually(WAIT, || store.count_records().unwrap_or(0) == 1).await);

    let rec = store.latest_record()?.expect("record");
    assert_eq!(rec.context["trigger"], "scheduled");
    assert_eq!(rec.context["snapshot_interval_min"], 60);
    assert_eq!(backend.launched(), 1);

    scheduler.abort();
    Ok(())
}

#[tokio::test]
async fn failed_tick_is_swallowed_and_the_next_one_persists() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let backend = Arc::new(FakeRenderBackend::ready());
    let client = Arc::new(FakeVisionClient::new(six_panel_json().to_string()));
    client.push_error(PipelineError::ModelEmptyResponse);
    let coord = coordinator_every(
        dir.path(),
        backend.clone(),
        client.clone(),
        Duration::from_millis(50),
    )?;

    let scheduler = {
        let coord = coord.clone();
        tokio::spawn(async move { coord.run_scheduled().await })
    };
    let store = coord.store().clone();
    assert!(eventually(WAIT, || store.count_records().unwrap_or(0) >= 1).await);

    // The failing first tick produced a model call but no record.
    assert!(client.calls().len() >= 2);
    assert_eq!(store.get_record(1)?.map(|r| r.parse_ok), Some(true));
    assert!(!scheduler.is_finished());
    assert_eq!(backend.open_sessions(), 0);

    scheduler.abort();
    Ok(())
}

#[tokio::test]
async fn busy_tick_is_skipped_not_queued() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let backend = Arc::new(FakeRenderBackend::ready());
    let hold = backend.hold_next_capture();
    let client = Arc::new(FakeVisionClient::new(six_panel_json().to_string()));
    let coord = coordinator_every(dir.path(), backend.clone(), client, HOUR)?;

    let on_demand = {
        let coord = coord.clone();
        tokio::spawn(async move { coord.try_run(RunTrigger::OnDemand).await })
    };
    hold.entered.notified().await;

    // Startup tick lands while the on-demand run holds the gate.
    let scheduler = {
        let coord = coord.clone();
        tokio::spawn(async move { coord.run_scheduled().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(backend.launched(), 1);

    hold.release.notify_one();
    assert!(matches!(on_demand.await??, RunOutcome::Completed(_)));

    // Nothing replays the skipped tick once the gate frees up.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(backend.launched(), 1);
    assert_eq!(coord.store().count_records()?, 1);
    assert_eq!(
        coord.store().latest_record()?.map(|r| r.context["trigger"].clone()),
        Some(serde_json::json!("on_demand"))
    );
    assert!(!scheduler.is_finished());

    scheduler.abort();
    Ok(())
}
