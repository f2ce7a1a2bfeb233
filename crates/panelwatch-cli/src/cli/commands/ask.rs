use super::{exit_codes, load};
use crate::cli::args::AskArgs;
use anyhow::Result;
use panelwatch_core::capture::webdriver::WebDriverBackend;
use panelwatch_core::capture::CaptureOrchestrator;
use panelwatch_core::errors::PipelineError;
use panelwatch_core::providers::llm::openai::ChatCompletionsClient;
use panelwatch_core::QueryInterpreter;
use std::sync::Arc;

pub async fn cmd_ask(args: AskArgs) -> Result<i32> {
    let cfg = load(&args.config.config)?;
    let backend = Arc::new(WebDriverBackend::from_config(
        &cfg.webdriver_url,
        &cfg.capture,
    ));
    let capture = Arc::new(CaptureOrchestrator::new(
        backend,
        cfg.dashboard_url.clone(),
        cfg.capture.clone(),
    ));
    let client = Arc::new(ChatCompletionsClient::from_config(&cfg.model)?);
    let query = QueryInterpreter::new(capture, client, cfg.storage.query_snapshot_dir.clone())
        .retain_artifacts(cfg.storage.retain_query_artifacts);

    match query.ask(&args.question).await {
        Ok(answer) => {
            println!("{}", answer);
            Ok(exit_codes::OK)
        }
        Err(PipelineError::EmptyQuestion) => {
            eprintln!("Question is required");
            Ok(exit_codes::CONFIG_ERROR)
        }
        Err(e) => {
            eprintln!("ask failed [{}]: {}", e.code(), e);
            Ok(exit_codes::RUN_FAILED)
        }
    }
}
