//! Autoblog CLI: generate blog drafts from Slack threads and Google Docs.
//!
//! One run fetches the source, has Gemini draft a structured post, renders
//! its diagrams with Imagen and exports the result as a `.docx` file.

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
