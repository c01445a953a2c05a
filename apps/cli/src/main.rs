//! cultureseg CLI: split culture-profile documents into titled segments.
//!
//! Segments are stamped, optionally enriched, classified for confidence,
//! flagged for review, and exported or merged into a persisted repo.

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
