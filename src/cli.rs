//! Command-line interface

use std::path::PathBuf;

use clap::Parser;

/// FIDO2 relying party server for IBM Security Verify and Verify Access
#[derive(Parser, Debug)]
#[command(name = "rp-server")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0", env = "RP_SERVER_HOST")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8080, env = "RP_SERVER_PORT")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RP_SERVER_LOG_LEVEL")]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "RP_SERVER_LOG_FORMAT")]
    pub log_format: Option<String>,

    /// Env file to seed configuration variables from
    #[arg(long, env = "RP_SERVER_ENV_FILE")]
    pub env_file: Option<PathBuf>,
}
