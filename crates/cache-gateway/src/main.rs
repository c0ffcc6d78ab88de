//! `cache-server` binary entry point: parses the CLI, loads the INI
//! config, and dispatches into [`commands::run`]. Errors propagate to the
//! top unhandled — printed to stderr, exit code 1.

use cache_gateway::cli;
use cache_gateway::commands;
use clap::Parser;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = cli::Cli::parse();

    if let Err(e) = commands::run(cli).await {
        eprintln!("ERROR: {e}");
        std::process::exit(1);
    }
}
