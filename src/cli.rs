//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Edge Gateway - dynamic route dispatch with per-route circuit breaking
#[derive(Parser, Debug)]
#[command(name = "edge-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "EDGE_GATEWAY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "EDGE_GATEWAY_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "EDGE_GATEWAY_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "EDGE_GATEWAY_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "EDGE_GATEWAY_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Disable config hot-reload
    #[arg(long)]
    pub no_reload: bool,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the gateway server (default)
    Serve,

    /// Parse and validate a configuration file, then exit
    CheckConfig {
        /// Path to the configuration file
        #[arg(required = true)]
        file: PathBuf,
    },
}
