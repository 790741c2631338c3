//! Configuration settings structures for courier-rs
//!
//! Every section deserializes from TOML and `COURIER_*` environment
//! variables; missing keys fall back to the defaults below.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::error::ConfigError;
use crate::logger::{ConsoleConfig, FileConfig, LogFormat, LoggerConfig, RotationConfig};
use crate::messaging::footer::DEFAULT_LABEL;
use crate::messaging::phone::DEFAULT_LMS_SUBJECT;
use crate::messaging::provider::ProviderKind;

// ============================================================================
// Default value functions
// ============================================================================

fn default_app_name() -> String {
    "courier-rs".to_string()
}

fn default_app_version() -> String {
    crate::pkg_version().to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connection_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_log_path() -> String {
    "logs/courier.log".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_max_size() -> u64 {
    10 * 1024 * 1024 // 10MB
}

fn default_max_files() -> usize {
    5
}

// ============================================================================
// Application Configuration
// ============================================================================

/// Application basic information configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    #[serde(default = "default_app_name")]
    pub name: String,

    #[serde(default = "default_app_version")]
    pub version: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            version: default_app_version(),
        }
    }
}

// ============================================================================
// Server Configuration
// ============================================================================

/// Operator API server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Origins allowed by CORS; empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl ServerConfig {
    /// Get the full server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

// ============================================================================
// Database Configuration
// ============================================================================

/// Diesel database connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[serde(default)]
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of idle connections kept in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,

    /// Run pending migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connection_timeout: default_connection_timeout(),
            auto_migrate: false,
        }
    }
}

// ============================================================================
// Logger Settings
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub colored: bool,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            colored: default_true(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationSettings {
    /// Maximum file size in bytes before rotation
    #[serde(default = "default_max_size")]
    pub max_size: u64,

    /// Rotated files kept next to the live file
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

impl Default for RotationSettings {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            max_files: default_max_files(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_log_path")]
    pub path: String,

    #[serde(default = "default_true")]
    pub append: bool,

    /// "full", "compact", or "json"
    #[serde(default = "default_log_format")]
    pub format: String,

    #[serde(default)]
    pub rotation: RotationSettings,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_log_path(),
            append: default_true(),
            format: default_log_format(),
            rotation: RotationSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerSettings {
    /// Level name or `EnvFilter` directive
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub console: ConsoleSettings,

    #[serde(default)]
    pub file: FileSettings,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            console: ConsoleSettings::default(),
            file: FileSettings::default(),
        }
    }
}

impl LoggerSettings {
    /// Converts the file representation into the runtime [`LoggerConfig`].
    pub fn into_logger_config(self) -> Result<LoggerConfig, ConfigError> {
        let console = ConsoleConfig::new(self.console.enabled, self.console.colored);
        let file = self.file.into_file_config()?;

        LoggerConfig::new(console, file, self.level)
            .map_err(|e| ConfigError::validation("logger".to_string(), e.to_string()))
    }
}

impl FileSettings {
    pub fn into_file_config(self) -> Result<FileConfig, ConfigError> {
        let format = self.format.parse::<LogFormat>().map_err(|e| {
            ConfigError::validation("logger.file.format".to_string(), e.to_string())
        })?;
        let rotation = RotationConfig::new(self.rotation.max_size, self.rotation.max_files)
            .map_err(|e| {
                ConfigError::validation("logger.file.rotation".to_string(), e.to_string())
            })?;

        FileConfig::new(self.enabled, PathBuf::from(self.path), self.append, format, rotation)
            .map_err(|e| ConfigError::validation("logger.file".to_string(), e.to_string()))
    }
}

// ============================================================================
// Dispatch Configuration
// ============================================================================

fn default_batch_size() -> u32 {
    50
}

fn default_concurrency() -> u32 {
    8
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_stale_after_secs() -> u64 {
    300
}

fn default_max_attempts() -> i32 {
    3
}

fn default_retry_base_delay() -> u64 {
    60
}

fn default_retry_multiplier() -> f64 {
    2.0
}

fn default_retry_max_delay() -> u64 {
    3600
}

/// Where delivery jobs and templates live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Postgres,
    /// In-process, lost on restart
    Memory,
}

/// Delivery queue worker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Run the dispatch worker inside `serve`
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub store: StoreBackend,

    /// Jobs claimed per pass
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Concurrent provider calls per pass
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Pause between passes that found less than a full batch
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// SENDING jobs claimed longer ago than this are expired
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    /// Default for jobs enqueued without an explicit limit
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,

    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_secs: u64,

    #[serde(default = "default_retry_multiplier")]
    pub retry_multiplier: f64,

    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            store: StoreBackend::default(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            poll_interval_ms: default_poll_interval_ms(),
            stale_after_secs: default_stale_after_secs(),
            max_attempts: default_max_attempts(),
            retry_base_delay_secs: default_retry_base_delay(),
            retry_multiplier: default_retry_multiplier(),
            retry_max_delay_secs: default_retry_max_delay(),
        }
    }
}

// ============================================================================
// Messaging Configuration
// ============================================================================

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_lms_subject() -> String {
    DEFAULT_LMS_SUBJECT.to_string()
}

fn default_hmac_rest_base_url() -> String {
    "https://api.solapi.com".to_string()
}

fn default_form_key_base_url() -> String {
    "https://apis.aligo.in".to_string()
}

fn default_form_key_kakao_base_url() -> String {
    "https://kakaoapi.aligo.in".to_string()
}

fn default_footer_label() -> String {
    DEFAULT_LABEL.to_string()
}

/// Transport A credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HmacRestConfig {
    #[serde(default = "default_hmac_rest_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub api_secret: String,
}

impl Default for HmacRestConfig {
    fn default() -> Self {
        Self {
            base_url: default_hmac_rest_base_url(),
            api_key: String::new(),
            api_secret: String::new(),
        }
    }
}

/// Transport B credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormKeyConfig {
    #[serde(default = "default_form_key_base_url")]
    pub base_url: String,

    /// Host for authority-template sends
    #[serde(default = "default_form_key_kakao_base_url")]
    pub kakao_base_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub user_id: String,

    /// Forward the provider's dry-run flag
    #[serde(default)]
    pub test_mode: bool,
}

impl Default for FormKeyConfig {
    fn default() -> Self {
        Self {
            base_url: default_form_key_base_url(),
            kakao_base_url: default_form_key_kakao_base_url(),
            api_key: String::new(),
            user_id: String::new(),
            test_mode: false,
        }
    }
}

/// Opt-out footer for plain SMS/LMS
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Public base URL hosting the `/optout` endpoint
    #[serde(default)]
    pub base_url: String,

    /// Shared HMAC secret for link signatures
    #[serde(default)]
    pub secret: String,

    #[serde(default = "default_footer_label")]
    pub label: String,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: String::new(),
            secret: String::new(),
            label: default_footer_label(),
        }
    }
}

/// Outbound messaging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// Active transport for this deployment
    #[serde(default)]
    pub provider: ProviderKind,

    /// Registered sender number
    #[serde(default)]
    pub sender: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_lms_subject")]
    pub default_lms_subject: String,

    #[serde(default)]
    pub hmac_rest: HmacRestConfig,

    #[serde(default)]
    pub form_key: FormKeyConfig,

    #[serde(default)]
    pub compliance: ComplianceConfig,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            sender: String::new(),
            request_timeout_secs: default_request_timeout_secs(),
            default_lms_subject: default_lms_subject(),
            hmac_rest: HmacRestConfig::default(),
            form_key: FormKeyConfig::default(),
            compliance: ComplianceConfig::default(),
        }
    }
}

// ============================================================================
// Main Settings Structure
// ============================================================================

/// Complete application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub application: ApplicationConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logger: LoggerSettings,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub messaging: MessagingConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_settings_default() {
        let settings = Settings::default();
        assert_eq!(settings.server.address(), "127.0.0.1:3000");
        assert_eq!(settings.dispatch.max_attempts, 3);
        assert_eq!(settings.dispatch.store, StoreBackend::Postgres);
        assert_eq!(settings.messaging.provider, ProviderKind::HmacRest);
        assert_eq!(settings.messaging.default_lms_subject, DEFAULT_LMS_SUBJECT);
        assert!(!settings.messaging.compliance.enabled);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
            [messaging]
            provider = "form_key"
            sender = "0212345678"

            [messaging.form_key]
            api_key = "k"
            user_id = "door"

            [dispatch]
            store = "memory"
            batch_size = 10
        "#;
        let settings: Settings = toml::from_str(toml_str).unwrap();
        assert_eq!(settings.messaging.provider, ProviderKind::FormKey);
        assert_eq!(settings.messaging.form_key.base_url, "https://apis.aligo.in");
        assert_eq!(settings.dispatch.store, StoreBackend::Memory);
        assert_eq!(settings.dispatch.batch_size, 10);
        assert_eq!(settings.dispatch.concurrency, 8);
        assert_eq!(settings.server.port, 3000);
    }

    #[test]
    fn test_logger_settings_conversion() {
        let settings = LoggerSettings {
            file: FileSettings {
                format: "compact".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        let config = settings.into_logger_config().unwrap();
        assert_eq!(config.file.format, LogFormat::Compact);
        assert_eq!(config.file.rotation.max_files, 5);
    }

    #[test]
    fn test_logger_settings_rejects_bad_format() {
        let settings = LoggerSettings {
            file: FileSettings {
                format: "yaml".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            settings.into_logger_config(),
            Err(ConfigError::ValidationError { field, .. }) if field == "logger.file.format"
        ));
    }

    fn arb_dispatch_config() -> impl Strategy<Value = DispatchConfig> {
        (1u32..=500, 1u32..=64, 100u64..=60_000, 1i32..=10, 1u64..=600)
            .prop_map(|(batch_size, concurrency, poll_interval_ms, max_attempts, base)| {
                DispatchConfig {
                    batch_size,
                    concurrency,
                    poll_interval_ms,
                    max_attempts,
                    retry_base_delay_secs: base,
                    ..Default::default()
                }
            })
    }

    proptest! {
        #[test]
        fn prop_settings_toml_roundtrip(dispatch in arb_dispatch_config()) {
            let settings = Settings { dispatch, ..Default::default() };
            let encoded = toml::to_string(&settings).unwrap();
            let decoded: Settings = toml::from_str(&encoded).unwrap();
            prop_assert_eq!(settings, decoded);
        }
    }
}
