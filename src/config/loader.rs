//! Layered configuration loading.

use std::path::{Path, PathBuf};

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};

use crate::config::environment::Environment as AppEnvironment;
use crate::config::error::ConfigError;
use crate::config::settings::Settings;

const CONFIG_DIR_ENV: &str = "COURIER_CONFIG_DIR";

const CONFIG_FILE_ENV: &str = "COURIER_CONFIG_FILE";

const DEFAULT_CONFIG_DIR: &str = "config";

const ENV_PREFIX: &str = "COURIER";

/// Separator for nested keys: `COURIER_MESSAGING__SENDER` -> `messaging.sender`
const ENV_SEPARATOR: &str = "__";

/// Loads [`Settings`] from, lowest priority first:
/// 1. `default.toml` (required)
/// 2. `{environment}.toml`
/// 3. `local.toml`
/// 4. `COURIER_*` environment variables
///
/// When a single config file is selected, steps 1-3 are replaced by that
/// file.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_dir: PathBuf,
    config_file: Option<PathBuf>,
    environment: AppEnvironment,
}

impl ConfigLoader {
    /// Reads `COURIER_CONFIG_DIR`, `COURIER_CONFIG_FILE` and
    /// `COURIER_APP_ENV`.
    ///
    /// # Errors
    ///
    /// Fails if both `COURIER_CONFIG_DIR` and `COURIER_CONFIG_FILE` are set.
    pub fn new() -> Result<Self, ConfigError> {
        let dir_override = std::env::var(CONFIG_DIR_ENV).ok().map(PathBuf::from);
        let config_file = std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from);

        if dir_override.is_some() && config_file.is_some() {
            return Err(ConfigError::mutual_exclusivity(
                "COURIER_CONFIG_DIR and COURIER_CONFIG_FILE cannot both be set. \
                 Use COURIER_CONFIG_DIR for layered configuration or \
                 COURIER_CONFIG_FILE for a single configuration file.",
            ));
        }

        Ok(Self {
            config_dir: dir_override.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR)),
            config_file,
            environment: AppEnvironment::from_env(),
        })
    }

    /// Loads exactly this file (plus environment overrides).
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Switches to layered loading from `dir`.
    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = dir.into();
        self.config_file = None;
        self
    }

    pub fn with_environment(mut self, environment: AppEnvironment) -> Self {
        self.environment = environment;
        self
    }

    pub fn environment(&self) -> AppEnvironment {
        self.environment
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }

    /// Loads, deserializes and validates the settings.
    pub fn load(&self) -> Result<Settings, ConfigError> {
        let settings = self.load_unvalidated()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads without validation so CLI overrides can be merged first.
    pub fn load_unvalidated(&self) -> Result<Settings, ConfigError> {
        self.build_config()?.try_deserialize().map_err(|e| {
            ConfigError::ParseError(format!("Failed to deserialize configuration: {}", e))
        })
    }

    fn build_config(&self) -> Result<Config, ConfigError> {
        let builder = match &self.config_file {
            Some(file) => add_file_source(Config::builder(), file, true)?,
            None => self.add_layered_sources(Config::builder())?,
        };

        add_env_source(builder).build().map_err(ConfigError::from)
    }

    fn add_layered_sources(
        &self,
        builder: ConfigBuilder<DefaultState>,
    ) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let builder = add_file_source(builder, &self.config_dir.join("default.toml"), true)?;
        let env_file = self
            .config_dir
            .join(format!("{}.toml", self.environment.as_str()));
        let builder = add_file_source(builder, &env_file, false)?;
        add_file_source(builder, &self.config_dir.join("local.toml"), false)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| Self {
            config_dir: PathBuf::from(DEFAULT_CONFIG_DIR),
            config_file: None,
            environment: AppEnvironment::default(),
        })
    }
}

fn add_file_source(
    builder: ConfigBuilder<DefaultState>,
    path: &Path,
    required: bool,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    if required && !path.exists() {
        return Err(ConfigError::file_not_found(format!(
            "Required configuration file not found: {}",
            path.display()
        )));
    }
    let Some(name) = path.to_str() else {
        return Err(ConfigError::ParseError(format!(
            "Configuration path is not valid UTF-8: {}",
            path.display()
        )));
    };
    Ok(builder.add_source(File::new(name, FileFormat::Toml).required(required)))
}

fn add_env_source(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator(ENV_SEPARATOR)
            .ignore_empty(true)
            .try_parsing(true),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::StoreBackend;
    use crate::messaging::provider::ProviderKind;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // Tests touching process env vars run one at a time.
    static TEST_MUTEX: Mutex<()> = Mutex::new(());

    const DEFAULT_TOML: &str = r#"
[server]
port = 8080

[database]
url = "postgres://localhost/courier"

[messaging]
sender = "0212345678"

[messaging.hmac_rest]
api_key = "key"
api_secret = "secret"
"#;

    fn setup_config_dir(files: &[(&str, &str)]) -> TempDir {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        for (name, content) in files {
            fs::write(temp_dir.path().join(name), content).expect("Failed to write config file");
        }
        temp_dir
    }

    struct EnvGuard {
        vars_to_restore: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self {
                vars_to_restore: Vec::new(),
            }
        }

        fn set(&mut self, key: &str, value: &str) {
            self.vars_to_restore
                .push((key.to_string(), std::env::var(key).ok()));
            unsafe {
                std::env::set_var(key, value);
            }
        }

        fn remove(&mut self, key: &str) {
            self.vars_to_restore
                .push((key.to_string(), std::env::var(key).ok()));
            unsafe {
                std::env::remove_var(key);
            }
        }

        fn clear_courier(&mut self) {
            self.remove(CONFIG_DIR_ENV);
            self.remove(CONFIG_FILE_ENV);
            self.remove(AppEnvironment::ENV_VAR);
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, original) in self.vars_to_restore.iter().rev() {
                unsafe {
                    match original {
                        Some(value) => std::env::set_var(key, value),
                        None => std::env::remove_var(key),
                    }
                }
            }
        }
    }

    #[test]
    fn test_new_uses_defaults() {
        let _lock = TEST_MUTEX.lock().unwrap();
        let mut env = EnvGuard::new();
        env.clear_courier();

        let loader = ConfigLoader::new().unwrap();
        assert_eq!(loader.config_dir(), Path::new("config"));
        assert!(loader.config_file().is_none());
        assert_eq!(loader.environment(), AppEnvironment::Development);
    }

    #[test]
    fn test_dir_and_file_are_mutually_exclusive() {
        let _lock = TEST_MUTEX.lock().unwrap();
        let mut env = EnvGuard::new();
        env.set(CONFIG_DIR_ENV, "/etc/courier");
        env.set(CONFIG_FILE_ENV, "/etc/courier/app.toml");

        match ConfigLoader::new() {
            Err(ConfigError::MutualExclusivityError(msg)) => {
                assert!(msg.contains(CONFIG_DIR_ENV));
                assert!(msg.contains(CONFIG_FILE_ENV));
            }
            other => panic!("expected MutualExclusivityError, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_default_toml() {
        let _lock = TEST_MUTEX.lock().unwrap();
        let mut env = EnvGuard::new();
        env.clear_courier();
        let dir = setup_config_dir(&[]);

        let result = ConfigLoader::new().unwrap().with_config_dir(dir.path()).load();
        assert!(matches!(result, Err(ConfigError::FileNotFound(msg)) if msg.contains("default.toml")));
    }

    #[test]
    fn test_layered_precedence() {
        let _lock = TEST_MUTEX.lock().unwrap();
        let mut env = EnvGuard::new();
        env.clear_courier();
        let dir = setup_config_dir(&[
            ("default.toml", DEFAULT_TOML),
            ("production.toml", "[server]\nport = 9000\n[dispatch]\nbatch_size = 200\n"),
            ("local.toml", "[dispatch]\nbatch_size = 5\n"),
        ]);

        let settings = ConfigLoader::new()
            .unwrap()
            .with_config_dir(dir.path())
            .with_environment(AppEnvironment::Production)
            .load()
            .unwrap();

        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.dispatch.batch_size, 5);
        assert_eq!(settings.messaging.sender, "0212345678");
    }

    #[test]
    fn test_env_vars_override_files() {
        let _lock = TEST_MUTEX.lock().unwrap();
        let mut env = EnvGuard::new();
        env.clear_courier();
        env.set("COURIER_MESSAGING__SENDER", "0311112222");
        env.set("COURIER_DISPATCH__MAX_ATTEMPTS", "7");
        let dir = setup_config_dir(&[("default.toml", DEFAULT_TOML)]);

        let settings = ConfigLoader::new()
            .unwrap()
            .with_config_dir(dir.path())
            .load()
            .unwrap();

        assert_eq!(settings.messaging.sender, "0311112222");
        assert_eq!(settings.dispatch.max_attempts, 7);
    }

    #[test]
    fn test_single_file_skips_layers() {
        let _lock = TEST_MUTEX.lock().unwrap();
        let mut env = EnvGuard::new();
        env.clear_courier();
        let dir = setup_config_dir(&[
            ("default.toml", DEFAULT_TOML),
            (
                "standalone.toml",
                r#"
[dispatch]
store = "memory"

[messaging]
provider = "form_key"

[messaging.form_key]
api_key = "k"
user_id = "door"
"#,
            ),
        ]);

        let settings = ConfigLoader::new()
            .unwrap()
            .with_config_file(dir.path().join("standalone.toml"))
            .load()
            .unwrap();

        assert_eq!(settings.dispatch.store, StoreBackend::Memory);
        assert_eq!(settings.messaging.provider, ProviderKind::FormKey);
        assert_eq!(settings.server.port, 3000);
    }

    #[test]
    fn test_load_rejects_invalid_settings() {
        let _lock = TEST_MUTEX.lock().unwrap();
        let mut env = EnvGuard::new();
        env.clear_courier();
        let dir = setup_config_dir(&[(
            "default.toml",
            "[database]\nurl = \"postgres://localhost/courier\"\n",
        )]);

        let loader = ConfigLoader::new().unwrap().with_config_dir(dir.path());
        let err = loader.load().unwrap_err();
        assert_eq!(err.field(), Some("messaging.hmac_rest.api_key"));
        assert!(loader.load_unvalidated().is_ok());
    }
}
