//! Configuration merger for CLI arguments and config files
//!
//! CLI flags sit on top of the file and environment layers: command-level
//! flags beat global ones, which beat everything loaded by
//! [`ConfigLoader`].

use super::parser::{Cli, Commands};
use crate::config::error::ConfigError;
use crate::config::{ConfigLoader, settings::Settings};

/// Applies CLI overrides to a loaded (not yet validated) [`Settings`].
pub struct ConfigurationMerger {
    base_config: Settings,
}

impl ConfigurationMerger {
    pub fn new(base_config: Settings) -> Self {
        Self { base_config }
    }

    /// Loads the base configuration the way `cli` asks for: an explicit
    /// `--config` file or the layered directory, under the `--env`
    /// environment when given.
    ///
    /// Validation is deferred to [`merge_cli_args`](Self::merge_cli_args)
    /// so that flags can repair values the files leave invalid.
    ///
    /// # Errors
    /// Returns ConfigError if a file cannot be read or deserialized
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let mut loader = ConfigLoader::new()?;
        if let Some(path) = &cli.config {
            loader = loader.with_config_file(path);
        }
        if let Some(env) = cli.env {
            loader = loader.with_environment(env.into());
        }
        Ok(Self::new(loader.load_unvalidated()?))
    }

    /// Returns the merged and validated settings.
    pub fn merge_cli_args(&self, cli: &Cli) -> Result<Settings, ConfigError> {
        let mut config = self.base_config.clone();

        Self::apply_global_overrides(&mut config, cli);
        if let Some(command) = &cli.command {
            Self::apply_command_overrides(&mut config, command);
        }

        config.validate()?;
        Ok(config)
    }

    fn apply_global_overrides(config: &mut Settings, cli: &Cli) {
        if cli.verbose {
            config.logger.level = "debug".to_string();
        } else if cli.quiet {
            config.logger.level = "error".to_string();
        }
    }

    fn apply_command_overrides(config: &mut Settings, command: &Commands) {
        if let Some(level) = command.log_level() {
            config.logger.level = level.into();
        }

        match command {
            Commands::Serve {
                host,
                port,
                no_worker,
                ..
            } => {
                if let Some(host) = host {
                    config.server.host = host.clone();
                }
                if let Some(port) = port {
                    config.server.port = *port;
                }
                if *no_worker {
                    config.dispatch.enabled = false;
                }
            }
            Commands::Worker { .. } | Commands::Migrate { .. } => {}
        }
    }

    pub fn config(&self) -> &Settings {
        &self.base_config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn create_valid_base_config() -> Settings {
        let mut config = Settings::default();
        config.database.url = "postgres://localhost/courier".to_string();
        config.messaging.hmac_rest.api_key = "key".to_string();
        config.messaging.hmac_rest.api_secret = "secret".to_string();
        config
    }

    fn merge(args: &[&str]) -> Result<Settings, ConfigError> {
        let cli = Cli::try_parse_from(args).unwrap();
        ConfigurationMerger::new(create_valid_base_config()).merge_cli_args(&cli)
    }

    #[test]
    fn test_merger_keeps_base_config() {
        let base_config = create_valid_base_config();
        let merger = ConfigurationMerger::new(base_config.clone());
        assert_eq!(merger.config(), &base_config);
    }

    #[test]
    fn test_verbose_and_quiet_flags() {
        assert_eq!(merge(&["courier-rs", "--verbose"]).unwrap().logger.level, "debug");
        assert_eq!(merge(&["courier-rs", "--quiet"]).unwrap().logger.level, "error");
    }

    #[test]
    fn test_serve_overrides() {
        let merged = merge(&[
            "courier-rs",
            "serve",
            "--host",
            "0.0.0.0",
            "--port",
            "8080",
            "--no-worker",
        ])
        .unwrap();
        assert_eq!(merged.server.host, "0.0.0.0");
        assert_eq!(merged.server.port, 8080);
        assert!(!merged.dispatch.enabled);
    }

    #[test]
    fn test_command_log_level_overrides_global() {
        let merged = merge(&["courier-rs", "--verbose", "serve", "--log-level", "warn"]).unwrap();
        assert_eq!(merged.logger.level, "warn");

        let merged = merge(&["courier-rs", "--quiet", "worker", "--log-level", "trace"]).unwrap();
        assert_eq!(merged.logger.level, "trace");
    }

    #[test]
    fn test_merge_validates_result() {
        let cli = Cli::try_parse_from(["courier-rs", "serve"]).unwrap();
        let mut base = create_valid_base_config();
        base.messaging.hmac_rest.api_key.clear();
        let err = ConfigurationMerger::new(base).merge_cli_args(&cli).unwrap_err();
        assert_eq!(err.field(), Some("messaging.hmac_rest.api_key"));
    }
}
