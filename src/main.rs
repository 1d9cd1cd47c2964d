//! FIDO2 relying party server binary

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use rp_server::{cli::Cli, config::Config, gateway::Server, setup_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    // Seed the environment from an env file when one is given; a default
    // .env is picked up when present.
    match &cli.env_file {
        Some(path) => {
            if let Err(e) = dotenvy::from_path(path) {
                error!("Failed to load env file {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        }
        None => {
            if dotenvy::dotenv().is_ok() {
                info!("Loaded configuration from .env");
            }
        }
    }

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        platform = %config.platform,
        "Starting FIDO2 relying party server"
    );

    if let Err(e) = Server::new(config).run(&cli.host, cli.port).await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
