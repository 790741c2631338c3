//! CLI argument parsing with clap
//!
//! Defines the command-line surface: global flags plus the `serve`,
//! `worker` and `migrate` subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Outbound SMS/LMS and Kakao authority-template delivery queue
#[derive(Parser, Debug)]
#[command(name = "courier-rs")]
#[command(about = "Outbound SMS/LMS and Kakao authority-template delivery queue")]
#[command(long_about = "
Courier-rs accepts outbound message requests over HTTP, stores them in a
durable delivery queue and dispatches them through the configured SMS/Kakao
provider with bounded retries.

EXAMPLES:
    # Start the API server and the dispatch worker
    courier-rs serve

    # Bind to all interfaces on a custom port
    courier-rs serve --host 0.0.0.0 --port 8080

    # Run the API only; dispatch happens in a separate process
    courier-rs serve --no-worker

    # Run the dispatch worker on its own
    courier-rs worker

    # Drain one batch and exit (cron style)
    courier-rs worker --once

    # Use a custom configuration file
    courier-rs --config /etc/courier/production.toml serve

    # Check configuration without starting anything
    courier-rs serve --dry-run

    # Apply, preview or roll back database migrations
    courier-rs migrate
    courier-rs migrate --dry-run
    courier-rs migrate --rollback 2
")]
#[command(version = crate::clap_long_version())]
pub struct Cli {
    /// Subcommand to execute (defaults to `serve`)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file path
    ///
    /// Load exactly this TOML file instead of the layered configuration
    /// directory. `COURIER_*` environment variables still apply on top.
    ///
    /// Example: --config /etc/courier/production.toml
    #[arg(short, long, value_name = "FILE", value_parser = super::validation::validate_config_file_path)]
    pub config: Option<PathBuf>,

    /// Override environment detection
    ///
    /// Selects which `{environment}.toml` layer is loaded.
    ///
    /// Available values: development (dev), staging (stage), production (prod), test
    #[arg(short, long, value_enum)]
    pub env: Option<Environment>,

    /// Enable verbose logging (debug level)
    #[arg(short, long)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP API and, unless disabled, the dispatch worker (default)
    ///
    /// Examples:
    ///   courier-rs serve                           # Start with defaults
    ///   courier-rs serve --host 0.0.0.0 --port 80 # Bind to all interfaces on port 80
    ///   courier-rs serve --dry-run                 # Validate config without starting
    Serve {
        /// Host address to bind to
        ///
        /// Use 127.0.0.1 for localhost only, or 0.0.0.0 for every interface.
        ///
        /// Default: 127.0.0.1
        #[arg(long, value_name = "ADDRESS", value_parser = super::validation::validate_host_address)]
        host: Option<String>,

        /// Port number to listen on
        ///
        /// Default: 3000
        #[arg(short, long, value_name = "PORT", value_parser = super::validation::validate_port)]
        port: Option<u16>,

        /// Log level override; wins over --verbose/--quiet
        #[arg(long, value_enum)]
        log_level: Option<LogLevel>,

        /// Validate configuration and exit
        #[arg(long)]
        dry_run: bool,

        /// Do not start the in-process dispatch worker
        #[arg(long)]
        no_worker: bool,
    },
    /// Run the dispatch worker without the HTTP API
    ///
    /// Examples:
    ///   courier-rs worker           # Poll until Ctrl+C / SIGTERM
    ///   courier-rs worker --once    # Run a single dispatch pass and exit
    Worker {
        /// Run one dispatch pass, print a summary and exit
        #[arg(long)]
        once: bool,

        /// Log level override; wins over --verbose/--quiet
        #[arg(long, value_enum)]
        log_level: Option<LogLevel>,
    },
    /// Database migration operations
    ///
    /// Examples:
    ///   courier-rs migrate                    # Apply all pending migrations
    ///   courier-rs migrate --dry-run          # Show pending migrations without applying
    ///   courier-rs migrate --rollback 3       # Rollback the last 3 migrations
    Migrate {
        /// Show pending migrations without applying
        #[arg(long, conflicts_with = "rollback")]
        dry_run: bool,

        /// Number of migrations to rollback (1 to 100)
        #[arg(long, value_name = "STEPS", conflicts_with = "dry_run", value_parser = super::validation::validate_rollback_steps)]
        rollback: Option<u32>,
    },
}

/// Environment options
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    #[value(name = "development", alias = "dev")]
    Development,
    #[value(name = "staging", alias = "stage")]
    Staging,
    #[value(name = "production", alias = "prod")]
    Production,
    #[value(name = "test")]
    Test,
}

/// Log level options
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    #[value(name = "error")]
    Error,
    #[value(name = "warn", alias = "warning")]
    Warn,
    #[value(name = "info")]
    Info,
    #[value(name = "debug")]
    Debug,
    #[value(name = "trace")]
    Trace,
}

impl Commands {
    /// Command-level log level override, if the subcommand takes one.
    pub fn log_level(&self) -> Option<LogLevel> {
        match self {
            Commands::Serve { log_level, .. } | Commands::Worker { log_level, .. } => *log_level,
            Commands::Migrate { .. } => None,
        }
    }
}

impl From<LogLevel> for String {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => "error".to_string(),
            LogLevel::Warn => "warn".to_string(),
            LogLevel::Info => "info".to_string(),
            LogLevel::Debug => "debug".to_string(),
            LogLevel::Trace => "trace".to_string(),
        }
    }
}

impl From<Environment> for crate::config::Environment {
    fn from(env: Environment) -> Self {
        match env {
            Environment::Development => crate::config::Environment::Development,
            Environment::Staging => crate::config::Environment::Staging,
            Environment::Production => crate::config::Environment::Production,
            Environment::Test => crate::config::Environment::Test,
        }
    }
}
