use super::{exit_codes, load, open_store};
use crate::cli::args::{LatestArgs, RecordsArgs};
use anyhow::Result;

pub fn cmd_latest(args: LatestArgs) -> Result<i32> {
    let cfg = load(&args.config.config)?;
    let store = open_store(&cfg)?;

    let Some(rec) = store.latest_record()? else {
        eprintln!("no records yet in {}", cfg.storage.db_path.display());
        return Ok(exit_codes::RUN_FAILED);
    };
    if args.result_only {
        match &rec.structured_result {
            Some(v) => println!("{}", serde_json::to_string_pretty(v)?),
            None => println!("{}", rec.raw_model_output),
        }
    } else {
        println!("{}", serde_json::to_string_pretty(&rec)?);
    }
    Ok(exit_codes::OK)
}

pub fn cmd_records(args: RecordsArgs) -> Result<i32> {
    let cfg = load(&args.config.config)?;
    let store = open_store(&cfg)?;
    let rows = store.recent_records(args.limit)?;

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&rows)?),
        "text" => {
            for r in &rows {
                println!(
                    "{:>6}  {}  {:<26}  {}",
                    r.id, r.created_at, r.prompt_version, r.artifact_path
                );
            }
            if rows.is_empty() {
                eprintln!("no records yet");
            }
        }
        other => anyhow::bail!("unknown format: {} (expected text or json)", other),
    }
    Ok(exit_codes::OK)
}
