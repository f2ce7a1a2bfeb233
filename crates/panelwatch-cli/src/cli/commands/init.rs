use super::exit_codes;
use crate::cli::args::InitArgs;
use anyhow::Result;
use panelwatch_core::config::write_sample_config;

pub fn cmd_init(args: InitArgs) -> Result<i32> {
    if args.out.exists() && !args.force {
        eprintln!(
            "{} already exists (use --force to overwrite)",
            args.out.display()
        );
        return Ok(exit_codes::CONFIG_ERROR);
    }
    write_sample_config(&args.out)?;
    println!("Wrote {}", args.out.display());
    Ok(exit_codes::OK)
}
