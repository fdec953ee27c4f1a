//! Enhancer CLI: AI enrichment of LMS course modules.
//!
//! Imports modules into a local database, runs them through the enhancement
//! pipeline one at a time, and stores the enriched renditions.

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
