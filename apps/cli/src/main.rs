//! rosterboard CLI — roster-to-channel publication tool.
//!
//! Aggregates a guild roster into per-world team compositions and keeps a
//! set of channel messages synchronized with it, republishing only what
//! changed since the last run.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
