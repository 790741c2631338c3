//! Configuration management for courier-rs
//!
//! # Configuration Priority (lowest to highest)
//! 1. `default.toml`
//! 2. `{environment}.toml`
//! 3. `local.toml` (not committed)
//! 4. `COURIER_*` environment variables
//! 5. CLI flags, merged by [`crate::cli::ConfigurationMerger`]

pub mod environment;
pub mod error;
pub mod loader;
pub mod settings;
pub mod validation;

pub use environment::Environment;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use settings::{
    ApplicationConfig, ComplianceConfig, DatabaseConfig, DispatchConfig, FormKeyConfig,
    HmacRestConfig, LoggerSettings, MessagingConfig, ServerConfig, Settings, StoreBackend,
};
