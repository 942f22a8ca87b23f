use anyhow::Result;
use clap::Parser;
use tracing::{debug, Level};
use tracing_subscriber::EnvFilter;

mod cli;

use callflow::analysis::Engine;
use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging. Diagrams go to stdout, so logs go to stderr.
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!("Starting Callflow v{}", env!("CARGO_PKG_VERSION"));

    let engine = Engine::new(cli.config.as_deref()).await?;

    cli.execute(engine).await
}
