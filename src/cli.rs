//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// BrandHalo credential gateway - OAuth and API key access to brand data
#[derive(Parser, Debug)]
#[command(name = "brandhalo-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "BRANDHALO_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "BRANDHALO_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "BRANDHALO_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "BRANDHALO_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "BRANDHALO_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Start the gateway server (default)
    Serve,

    /// Print the OAuth authorization server metadata for the configured issuer
    Metadata,
}
