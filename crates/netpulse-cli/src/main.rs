//! Netpulse CLI entrypoint.

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;
mod handlers;

use commands::{Commands, SchemaCommands};

#[derive(Parser)]
#[command(name = "netpulse")]
#[command(author, version, about = "Netpulse fleet agent", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => handlers::run(&config).await?,
        Commands::Probe {
            ip,
            timeout_ms,
            retries,
            backend,
            port,
        } => handlers::probe(&ip, timeout_ms, retries, backend.into(), port).await?,
        Commands::Expand { cidr, limit } => handlers::expand(&cidr, limit)?,
        Commands::Schema { command } => match command {
            SchemaCommands::Job => handlers::job_schema()?,
            SchemaCommands::Telemetry => handlers::telemetry_schema()?,
        },
    }

    Ok(())
}
