//! Serve command handler
//!
//! Starts the API server, or with `--dry-run` only reports what it would
//! start.

use crate::config::StoreBackend;
use crate::config::settings::Settings;
use crate::error::{AppError, AppResult};
use crate::server::Server;

pub struct ServeCommandHandler {
    config: Settings,
}

impl ServeCommandHandler {
    pub fn new(config: Settings) -> Self {
        Self { config }
    }

    pub async fn execute(self, dry_run: bool) -> AppResult<()> {
        if dry_run {
            return self.validate_only();
        }
        Server::new(self.config)
            .run()
            .await
            .map_err(|source| AppError::Internal { source })
    }

    /// Prints the effective configuration summary without binding or
    /// connecting to anything.
    pub fn validate_only(&self) -> AppResult<()> {
        self.config.validate()?;
        for line in self.summary() {
            println!("✓ {}", line);
        }
        println!("Dry run completed successfully - configuration is ready for deployment");
        Ok(())
    }

    fn summary(&self) -> Vec<String> {
        let config = &self.config;
        let store = match config.dispatch.store {
            StoreBackend::Postgres => "PostgreSQL",
            StoreBackend::Memory => "in-memory (not durable)",
        };
        let worker = if config.dispatch.enabled {
            format!(
                "Dispatch worker enabled: batch {}, concurrency {}, max attempts {}",
                config.dispatch.batch_size,
                config.dispatch.concurrency,
                config.dispatch.max_attempts
            )
        } else {
            "Dispatch worker disabled".to_string()
        };
        vec![
            "Configuration is valid".to_string(),
            format!("Server would bind to: {}", config.server.address()),
            format!("Delivery store: {}", store),
            format!("Message provider: {}", config.messaging.provider.as_str()),
            worker,
            format!(
                "Compliance footer: {}",
                if config.messaging.compliance.enabled { "on" } else { "off" }
            ),
        ]
    }

    pub fn config(&self) -> &Settings {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_valid_config() -> Settings {
        let mut config = Settings::default();
        config.database.url = "postgres://localhost/courier".to_string();
        config.messaging.hmac_rest.api_key = "key".to_string();
        config.messaging.hmac_rest.api_secret = "secret".to_string();
        config
    }

    #[test]
    fn test_serve_handler_new() {
        let config = create_valid_config();
        let handler = ServeCommandHandler::new(config.clone());
        assert_eq!(handler.config(), &config);
    }

    #[tokio::test]
    async fn test_serve_handler_dry_run() {
        let handler = ServeCommandHandler::new(create_valid_config());
        assert!(handler.execute(true).await.is_ok());
    }

    #[tokio::test]
    async fn test_serve_handler_dry_run_invalid_config() {
        let mut config = create_valid_config();
        config.server.port = 0;
        let result = ServeCommandHandler::new(config).execute(true).await;
        assert!(matches!(result, Err(AppError::Configuration { .. })));
    }

    #[test]
    fn test_summary_reports_store_and_worker() {
        let mut config = create_valid_config();
        config.dispatch.store = StoreBackend::Memory;
        config.dispatch.enabled = false;
        let summary = ServeCommandHandler::new(config).summary();
        assert!(summary.iter().any(|l| l.contains("in-memory")));
        assert!(summary.iter().any(|l| l == "Dispatch worker disabled"));
        assert!(summary.iter().any(|l| l.contains("hmac_rest")));
    }
}
