//! Migrate command handler
//!
//! Applies, previews or reverts the embedded schema migrations.

use crate::config::settings::Settings;
use crate::db::{pending_migrations, revert_migrations, run_migrations};
use crate::error::{AppError, AppResult};

pub struct MigrateCommandHandler {
    config: Settings,
}

impl MigrateCommandHandler {
    pub fn new(config: Settings) -> Self {
        Self { config }
    }

    /// # Errors
    /// - Database configuration or connection errors
    /// - Migration execution errors
    pub async fn execute(&self, dry_run: bool, rollback: Option<u32>) -> AppResult<()> {
        if rollback == Some(0) {
            return Err(AppError::validation(
                "rollback_steps",
                "Number of rollback steps must be greater than 0",
            ));
        }
        // Migrations need PostgreSQL even when the queue runs in memory.
        self.config.database.validate()?;
        let url = &self.config.database.url;

        if dry_run {
            println!("Checking for pending migrations...");
            let pending = pending_migrations(url).await?;
            if pending.is_empty() {
                println!("✓ No pending migrations found - database is up to date");
            } else {
                println!("Found {} pending migration(s):", pending.len());
                for name in &pending {
                    println!("  - {}", name);
                }
                println!("\nRun without --dry-run to apply these migrations");
            }
            return Ok(());
        }

        if let Some(steps) = rollback {
            println!("Rolling back {} migration(s)...", steps);
            let reverted = revert_migrations(url, steps).await?;
            if reverted.len() < steps as usize {
                println!(
                    "Only {} migration(s) were applied; nothing further to revert",
                    reverted.len()
                );
            }
            for version in &reverted {
                println!("  - reverted {}", version);
            }
            println!("✓ Rolled back {} migration(s)", reverted.len());
            return Ok(());
        }

        println!("Running database migrations...");
        let applied = run_migrations(url).await?;
        if applied.is_empty() {
            println!("✓ No migrations to apply - database is already up to date");
        } else {
            println!("✓ Applied {} migration(s):", applied.len());
            for version in &applied {
                println!("  - {}", version);
            }
        }
        Ok(())
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
        config
    }

    #[test]
    fn test_migrate_handler_new() {
        let config = create_valid_config();
        let handler = MigrateCommandHandler::new(config.clone());
        assert_eq!(handler.config(), &config);
    }

    #[tokio::test]
    async fn test_zero_rollback_steps() {
        let handler = MigrateCommandHandler::new(create_valid_config());
        match handler.execute(false, Some(0)).await {
            Err(AppError::Validation { field, reason }) => {
                assert_eq!(field, "rollback_steps");
                assert!(reason.contains("must be greater than 0"));
            }
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_database_url() {
        let handler = MigrateCommandHandler::new(Settings::default());
        let result = handler.execute(true, None).await;
        assert!(matches!(result, Err(AppError::Configuration { .. })));
    }
}
