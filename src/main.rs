//! Edge Gateway binary

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use edge_gateway::{
    cli::{Cli, Command},
    config::Config,
    gateway::Gateway,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    match cli.command {
        Some(Command::CheckConfig { file }) => match Config::load(Some(&file)) {
            Ok(config) => {
                println!(
                    "{} - valid ({} routes, auth {})",
                    file.display(),
                    config.routes.len(),
                    if config.auth.enabled { "enabled" } else { "disabled" }
                );
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Validation failed: {e}");
                ExitCode::FAILURE
            }
        },
        Some(Command::Serve) | None => run_server(cli).await,
    }
}

/// Run the gateway server
async fn run_server(cli: Cli) -> ExitCode {
    let config = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            // CLI overrides
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(ref host) = cli.host {
                config.server.host = host.clone();
            }
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        routes = config.routes.len(),
        auth = config.auth.enabled,
        "Starting edge gateway"
    );

    let reload_path = if cli.no_reload { None } else { cli.config };
    let gateway = Gateway::new(config, reload_path);

    if let Err(e) = gateway.run().await {
        error!("Gateway error: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
