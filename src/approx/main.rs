use anyhow::{Context, Result};
use approx_mpsi::approx::run;
use approx_mpsi::cli_utils::Args;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(?args, "arguments parsed");

    run(args).with_context(|| "Failed to run the protocol.")?;

    Ok(())
}
