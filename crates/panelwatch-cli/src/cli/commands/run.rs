use super::{build_coordinator, exit_codes, load};
use crate::cli::args::{RunArgs, WatchArgs};
use anyhow::Result;
use panelwatch_core::model::{RunOutcome, RunTrigger};

pub async fn cmd_run(args: RunArgs) -> Result<i32> {
    let cfg = load(&args.config.config)?;
    let coordinator = build_coordinator(&cfg)?;

    match coordinator.try_run(RunTrigger::Cli).await {
        Ok(RunOutcome::Completed(rec)) => {
            println!("{}", serde_json::to_string_pretty(&rec)?);
            if !rec.parse_ok {
                eprintln!("warning: model output was not valid JSON; stored raw text only");
            }
            Ok(exit_codes::OK)
        }
        Ok(RunOutcome::AlreadyRunning) => {
            eprintln!("a run is already in progress");
            Ok(exit_codes::BUSY)
        }
        Err(e) => {
            eprintln!("run failed [{}]: {}", e.code(), e);
            Ok(exit_codes::RUN_FAILED)
        }
    }
}

/// Scheduler only, no HTTP surface. Runs until interrupted.
pub async fn cmd_watch(args: WatchArgs) -> Result<i32> {
    let mut cfg = load(&args.config.config)?;
    if let Some(secs) = args.interval {
        cfg.schedule.interval_seconds = secs;
    }
    let coordinator = build_coordinator(&cfg)?;

    tokio::select! {
        _ = coordinator.run_scheduled() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(
                event = "watch_stopping",
                reason = "interrupt",
                run_in_flight = coordinator.is_running()
            );
        }
    }
    // A tick cut off by the interrupt keeps going on its own task; let it persist and close.
    coordinator.wait_idle().await;
    tracing::info!(event = "watch_stopped");
    Ok(exit_codes::OK)
}
