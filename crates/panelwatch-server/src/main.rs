use anyhow::{Context, Result};
use clap::Parser;
use panelwatch_core::capture::webdriver::WebDriverBackend;
use panelwatch_core::config;
use panelwatch_core::providers::llm::openai::ChatCompletionsClient;
use panelwatch_core::{QueryInterpreter, RunCoordinator, Store};
use panelwatch_server::config::ServerConfig;
use panelwatch_server::{build_router, AppState};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Pipeline config; a missing file means built-in defaults.
    #[arg(long, env = "PANELWATCH_CONFIG", default_value = "panelwatch.yaml")]
    config: PathBuf,
}

use tracing_subscriber::{fmt, EnvFilter};

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_current_span(false)
        .with_span_list(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = ServerConfig::from_env();

    init_logging(&cfg.log_level);

    let pipeline = config::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    tracing::info!(
        event = "server_start",
        config_path = ?args.config,
        bind = %cfg.bind,
        scheduler = cfg.scheduler,
        dashboard_url = %pipeline.dashboard_url,
        model_endpoint = %pipeline.model.endpoint
    );

    let store = Store::open(&pipeline.storage.db_path)?;
    store.init_schema()?;

    let backend = Arc::new(WebDriverBackend::from_config(
        &pipeline.webdriver_url,
        &pipeline.capture,
    ));
    let client = Arc::new(ChatCompletionsClient::from_config(&pipeline.model)?);
    let coordinator = RunCoordinator::from_config(&pipeline, store, backend, client);
    let query = QueryInterpreter::new(
        coordinator.capture().clone(),
        coordinator.client().clone(),
        pipeline.storage.query_snapshot_dir.clone(),
    )
    .retain_artifacts(pipeline.storage.retain_query_artifacts);

    if cfg.scheduler {
        let scheduled = coordinator.clone();
        tokio::spawn(async move { scheduled.run_scheduled().await });
    }

    let app = build_router(AppState::new(coordinator.clone(), query));
    let listener = tokio::net::TcpListener::bind(&cfg.bind)
        .await
        .with_context(|| format!("binding {}", cfg.bind))?;
    tracing::info!(event = "listening", addr = %listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    coordinator.wait_idle().await;
    tracing::info!(event = "stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(event = "signal_listener_failed", error = %e);
        std::future::pending::<()>().await;
    }
    tracing::info!(event = "shutdown_requested");
}
