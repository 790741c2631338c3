//! Command executor: dispatches a parsed [`Cli`] to its handler.

use super::handlers::{MigrateCommandHandler, ServeCommandHandler, WorkerCommandHandler};
use super::parser::{Cli, Commands};
use crate::config::settings::Settings;
use crate::error::AppResult;

/// Runs the requested subcommand; no subcommand means `serve`.
///
/// # Errors
/// Returns errors from the command handlers
pub async fn execute_command(cli: &Cli, settings: Settings) -> AppResult<()> {
    warn_on_risky_args(cli);

    match &cli.command {
        Some(Commands::Serve { dry_run, .. }) => {
            ServeCommandHandler::new(settings).execute(*dry_run).await
        }
        None => ServeCommandHandler::new(settings).execute(false).await,
        Some(Commands::Worker { once, .. }) => {
            WorkerCommandHandler::new(settings).execute(*once).await
        }
        Some(Commands::Migrate { dry_run, rollback }) => {
            MigrateCommandHandler::new(settings)
                .execute(*dry_run, *rollback)
                .await
        }
    }
}

/// Warnings for argument combinations that are legal but often a mistake.
fn risky_arg_warnings(cli: &Cli) -> Vec<String> {
    let mut warnings = Vec::new();
    match &cli.command {
        Some(Commands::Serve {
            host: Some(host),
            port: Some(port),
            ..
        }) if *port < 1024 && host == "0.0.0.0" => {
            warnings.push(format!(
                "Binding to 0.0.0.0 on port {} requires root privileges",
                port
            ));
        }
        Some(Commands::Migrate {
            rollback: Some(steps),
            ..
        }) if *steps > 50 => {
            warnings.push(format!(
                "Rolling back {} migrations is a large operation. Consider using smaller steps.",
                steps
            ));
        }
        _ => {}
    }
    warnings
}

fn warn_on_risky_args(cli: &Cli) {
    for warning in risky_arg_warnings(cli) {
        tracing::warn!("{}", warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn create_valid_config() -> Settings {
        let mut config = Settings::default();
        config.database.url = "postgres://localhost/courier".to_string();
        config.messaging.hmac_rest.api_key = "key".to_string();
        config.messaging.hmac_rest.api_secret = "secret".to_string();
        config
    }

    #[tokio::test]
    async fn test_execute_serve_dry_run() {
        let cli = Cli::try_parse_from(["courier-rs", "serve", "--dry-run"]).unwrap();
        assert!(execute_command(&cli, create_valid_config()).await.is_ok());
    }

    #[tokio::test]
    async fn test_execute_worker_once_on_memory_store() {
        let cli = Cli::try_parse_from(["courier-rs", "worker", "--once"]).unwrap();
        let mut config = create_valid_config();
        config.dispatch.store = crate::config::StoreBackend::Memory;
        assert!(execute_command(&cli, config).await.is_ok());
    }

    #[test]
    fn test_risky_arg_warnings() {
        let cli = Cli::try_parse_from(["courier-rs", "serve", "--host", "0.0.0.0", "--port", "80"])
            .unwrap();
        assert_eq!(risky_arg_warnings(&cli).len(), 1);

        let cli = Cli::try_parse_from(["courier-rs", "migrate", "--rollback", "60"]).unwrap();
        assert_eq!(risky_arg_warnings(&cli).len(), 1);

        let cli = Cli::try_parse_from(["courier-rs", "serve", "--port", "8080"]).unwrap();
        assert!(risky_arg_warnings(&cli).is_empty());
    }
}
