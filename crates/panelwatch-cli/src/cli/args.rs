use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "panelwatch",
    version,
    about = "Capture a dashboard, ask a vision model about it, keep the answers"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the pipeline once and print the stored record
    Run(RunArgs),
    /// Run the pipeline now and then on the configured interval
    Watch(WatchArgs),
    /// Print the most recent record
    Latest(LatestArgs),
    /// List recent records, newest first
    Records(RecordsArgs),
    /// Ask one question about the live dashboard (nothing is stored)
    Ask(AskArgs),
    /// Create or upgrade the record database
    Migrate(MigrateArgs),
    /// Write a commented sample config
    Init(InitArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct ConfigArg {
    #[arg(long, default_value = "panelwatch.yaml")]
    pub config: PathBuf,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArg,
}

#[derive(clap::Args, Debug, Clone)]
pub struct WatchArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Override the schedule interval in seconds
    #[arg(long)]
    pub interval: Option<u64>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct LatestArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Print only the structured result (or raw output when unparsed)
    #[arg(long)]
    pub result_only: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RecordsArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    #[arg(long, default_value_t = 50)]
    pub limit: u32,

    /// Output format: text | json
    #[arg(long, default_value = "text")]
    pub format: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct AskArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Free-text question; a window token like "6h" switches the dashboard first
    pub question: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Override the database path from the config
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Check if migration is needed (exit 2 if needed, 0 if clean)
    #[arg(long)]
    pub check: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct InitArgs {
    #[arg(long, default_value = "panelwatch.yaml")]
    pub out: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}
