use crate::cli::args::{Cli, Command};
use anyhow::{Context, Result};
use panelwatch_core::capture::webdriver::WebDriverBackend;
use panelwatch_core::config::{self, PipelineConfig};
use panelwatch_core::providers::llm::openai::ChatCompletionsClient;
use panelwatch_core::{RunCoordinator, Store};
use std::path::Path;
use std::sync::Arc;

pub mod ask;
pub mod init;
pub mod migrate;
pub mod records;
pub mod run;

pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const RUN_FAILED: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
    pub const BUSY: i32 = 3;
}

pub async fn dispatch(cli: Cli) -> Result<i32> {
    match cli.cmd {
        Command::Run(args) => run::cmd_run(args).await,
        Command::Watch(args) => run::cmd_watch(args).await,
        Command::Latest(args) => records::cmd_latest(args),
        Command::Records(args) => records::cmd_records(args),
        Command::Ask(args) => ask::cmd_ask(args).await,
        Command::Migrate(args) => migrate::cmd_migrate(args),
        Command::Init(args) => init::cmd_init(args),
    }
}

pub(crate) fn load(path: &Path) -> Result<PipelineConfig> {
    config::load_or_default(path).with_context(|| format!("failed to load config {}", path.display()))
}

pub(crate) fn open_store(cfg: &PipelineConfig) -> Result<Store> {
    let store = Store::open(&cfg.storage.db_path)?;
    store.init_schema()?;
    Ok(store)
}

/// Production wiring: chromedriver for rendering, OpenAI-compatible endpoint for the model.
pub(crate) fn build_coordinator(cfg: &PipelineConfig) -> Result<RunCoordinator> {
    let store = open_store(cfg)?;
    let backend = Arc::new(WebDriverBackend::from_config(
        &cfg.webdriver_url,
        &cfg.capture,
    ));
    let client = Arc::new(ChatCompletionsClient::from_config(&cfg.model)?);
    Ok(RunCoordinator::from_config(cfg, store, backend, client))
}
