//! Configuration validation logic
//!
//! Every section validates itself; [`Settings::validate`] returns the first
//! error encountered.

use crate::config::error::ConfigError;
use crate::config::settings::{
    ComplianceConfig, DatabaseConfig, DispatchConfig, FileSettings, LoggerSettings,
    MessagingConfig, ServerConfig, Settings, StoreBackend,
};
use crate::messaging::provider::ProviderKind;

const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

const VALID_LOG_FORMATS: &[&str] = &["full", "compact", "json"];

const VALID_DATABASE_SCHEMES: &[&str] = &["postgres://", "postgresql://"];

/// Minimum gap between the provider request timeout and the stale threshold.
pub const STALE_MARGIN_SECS: u64 = 30;

fn require(field: &str, value: &str, message: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::validation(field, message));
    }
    Ok(())
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::validation(
                "server.port",
                "Port must be between 1 and 65535. Please specify a valid port number.",
            ));
        }
        require("server.host", &self.host, "Server host must not be empty.")
    }
}

impl DatabaseConfig {
    /// # Validation Rules
    /// - URL must not be empty and must be a PostgreSQL URL
    /// - Min connections must not exceed max connections, both non-zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        require(
            "database.url",
            &self.url,
            "Database URL is required when dispatch.store is \"postgres\".",
        )?;

        if !VALID_DATABASE_SCHEMES
            .iter()
            .any(|scheme| self.url.starts_with(scheme))
        {
            return Err(ConfigError::validation(
                "database.url",
                "Invalid database URL format. Expected postgres://[user:password@]host[:port]/database",
            ));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::validation(
                "database.max_connections",
                "Max connections must be greater than 0.",
            ));
        }

        if self.min_connections == 0 {
            return Err(ConfigError::validation(
                "database.min_connections",
                "Min connections must be greater than 0.",
            ));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::validation(
                "database.min_connections",
                format!(
                    "Min connections ({}) cannot exceed max connections ({}).",
                    self.min_connections, self.max_connections
                ),
            ));
        }

        Ok(())
    }
}

impl FileSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.path.trim().is_empty() {
            return Err(ConfigError::validation(
                "logger.file.path",
                "File path is required when file logging is enabled.",
            ));
        }

        if !VALID_LOG_FORMATS.contains(&self.format.to_lowercase().as_str()) {
            return Err(ConfigError::validation(
                "logger.file.format",
                format!(
                    "Invalid log format '{}'. Valid formats are: {}",
                    self.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            ));
        }

        if self.rotation.max_size == 0 || self.rotation.max_files == 0 {
            return Err(ConfigError::validation(
                "logger.file.rotation",
                "Rotation max_size and max_files must be greater than 0.",
            ));
        }

        Ok(())
    }
}

impl LoggerSettings {
    /// Accepts a bare level or an `EnvFilter` directive such as
    /// `info,courier_rs::queue=debug`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.level.to_lowercase();
        let is_directive = level.contains('=') || level.contains(',');
        if !is_directive && !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::validation(
                "logger.level",
                format!(
                    "Invalid log level '{}'. Valid levels are: {}",
                    self.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            ));
        }

        self.file.validate()
    }
}

impl DispatchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::validation(
                "dispatch.batch_size",
                "Batch size must be greater than 0.",
            ));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::validation(
                "dispatch.concurrency",
                "Concurrency must be greater than 0.",
            ));
        }
        if self.max_attempts < 1 {
            return Err(ConfigError::validation(
                "dispatch.max_attempts",
                "Max attempts must be at least 1.",
            ));
        }
        if self.stale_after_secs == 0 {
            return Err(ConfigError::validation(
                "dispatch.stale_after_secs",
                "Stale threshold must be greater than 0 seconds.",
            ));
        }
        if !self.retry_multiplier.is_finite() || self.retry_multiplier < 1.0 {
            return Err(ConfigError::validation(
                "dispatch.retry_multiplier",
                format!(
                    "Retry multiplier must be a finite number >= 1.0, got {}.",
                    self.retry_multiplier
                ),
            ));
        }
        if self.retry_max_delay_secs < self.retry_base_delay_secs {
            return Err(ConfigError::validation(
                "dispatch.retry_max_delay_secs",
                "Retry max delay cannot be shorter than the base delay.",
            ));
        }
        Ok(())
    }
}

impl ComplianceConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        require(
            "messaging.compliance.secret",
            &self.secret,
            "Compliance footer requires a signing secret.",
        )?;
        require(
            "messaging.compliance.base_url",
            &self.base_url,
            "Compliance footer requires the public opt-out base URL.",
        )?;
        reqwest::Url::parse(&self.base_url).map_err(|e| {
            ConfigError::validation(
                "messaging.compliance.base_url",
                format!("Invalid opt-out base URL '{}': {}", self.base_url, e),
            )
        })?;
        Ok(())
    }
}

impl MessagingConfig {
    /// Only the active provider's credentials are required.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::validation(
                "messaging.request_timeout_secs",
                "Request timeout must be greater than 0 seconds.",
            ));
        }

        match self.provider {
            ProviderKind::HmacRest => {
                let creds = &self.hmac_rest;
                require("messaging.hmac_rest.base_url", &creds.base_url, "Base URL is required.")?;
                require("messaging.hmac_rest.api_key", &creds.api_key, "API key is required.")?;
                require(
                    "messaging.hmac_rest.api_secret",
                    &creds.api_secret,
                    "API secret is required.",
                )?;
            }
            ProviderKind::FormKey => {
                let creds = &self.form_key;
                require("messaging.form_key.base_url", &creds.base_url, "Base URL is required.")?;
                require(
                    "messaging.form_key.kakao_base_url",
                    &creds.kakao_base_url,
                    "Kakao base URL is required.",
                )?;
                require("messaging.form_key.api_key", &creds.api_key, "API key is required.")?;
                require("messaging.form_key.user_id", &creds.user_id, "User id is required.")?;
            }
        }

        self.compliance.validate()
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        if self.dispatch.store == StoreBackend::Postgres {
            self.database.validate()?;
        }
        self.logger.validate()?;
        self.dispatch.validate()?;
        self.messaging.validate()?;

        let min_stale = self.messaging.request_timeout_secs + STALE_MARGIN_SECS;
        if self.dispatch.stale_after_secs <= min_stale {
            return Err(ConfigError::validation(
                "dispatch.stale_after_secs",
                format!(
                    "Stale threshold ({}s) must exceed the provider request timeout ({}s) by more than {}s.",
                    self.dispatch.stale_after_secs,
                    self.messaging.request_timeout_secs,
                    STALE_MARGIN_SECS
                ),
            ));
        }
        Ok(())
    }
}
