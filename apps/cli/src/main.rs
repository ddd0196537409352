//! Leadpipe CLI: healthcare practice lead pipeline.
//!
//! Enriches practice websites into scored leads, stores them, and can
//! provision a practice site for each one. Also serves the pipeline over HTTP.

mod commands;
mod server;

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
