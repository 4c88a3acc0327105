mod cmd;
mod config;
mod error;

use clap::Parser;
use config::{Cli, Commands};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run => cmd::run::run(&cli.config).await,
        Commands::Validate => cmd::validate::run(&cli.config),
        Commands::Enrich(args) => cmd::enrich::run(args).await,
    };
    if let Err(e) = result {
        tracing::error!(error = %e, "ingest-server failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
