//! posa-offline operator entry point.
//!
//! Inspects and maintains the offline cache of a POS terminal. Reports go
//! to stdout as JSON; logging goes to stderr.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{Cli, run};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let config = posa_offline_core::AppConfig::load()?;
    tracing::debug!(db_path = %config.db_path.display(), "configuration loaded");

    let report = run(cli.command, &config).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
