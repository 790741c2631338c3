//! Process lifecycle: store selection, HTTP server, dispatch worker and
//! graceful shutdown.

use crate::api::routes::create_router;
use crate::config::{Environment, StoreBackend, settings::Settings};
use crate::db::{AsyncDbPool, establish_async_connection_pool, run_migrations};
use crate::error::AppResult;
use crate::messaging::authority::AuthorityResolver;
use crate::messaging::dispatcher::Dispatcher;
use crate::queue::DispatchWorker;
use crate::repositories::Repositories;
use crate::state::AppState;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// HTTP server manager
pub struct Server {
    settings: Settings,
}

impl Server {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Starts the API (and the dispatch worker when enabled) and runs until
    /// Ctrl+C or SIGTERM.
    ///
    /// On shutdown the HTTP server stops accepting connections first, then
    /// the worker finishes its in-flight pass before this returns.
    ///
    /// # Errors
    /// - Database connection pool or migration errors
    /// - Address binding errors
    /// - Server runtime errors
    pub async fn run(self) -> anyhow::Result<()> {
        let settings = &self.settings;
        tracing::info!(
            app_name = %settings.application.name,
            app_version = %settings.application.version,
            environment = %Environment::from_env().as_str(),
            "Application starting"
        );
        tracing::info!(
            host = %settings.server.host,
            port = settings.server.port,
            cors_origins = settings.server.cors_origins.len(),
            "Server configuration loaded"
        );
        tracing::info!(
            provider = settings.messaging.provider.as_str(),
            compliance_footer = settings.messaging.compliance.enabled,
            "Messaging configuration loaded"
        );

        let (repos, pool) = build_repositories(settings).await?;
        let state = AppState::new(&repos, pool, settings);
        let router = create_router(state, &settings.server.cors_origins);

        let address = settings.server.address();
        let listener = TcpListener::bind(&address).await.map_err(|e| {
            tracing::error!(error = %e, address = %address, "Failed to bind to address");
            anyhow::anyhow!("Failed to bind to {}: {}", address, e)
        })?;

        let shutdown = CancellationToken::new();
        let worker = if settings.dispatch.enabled {
            let worker = build_worker(settings, &repos);
            let token = shutdown.clone();
            Some(tokio::spawn(async move { worker.run(token).await }))
        } else {
            tracing::info!("Dispatch worker disabled for this process");
            None
        };

        tracing::info!(address = %address, "Server listening");

        let server_token = shutdown.clone();
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                server_token.cancel();
            })
            .await;

        // Stop the worker even when the server exited on an error.
        shutdown.cancel();
        if let Some(handle) = worker
            && let Err(e) = handle.await
        {
            tracing::error!(error = %e, "Dispatch worker task failed");
        }

        served?;
        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

/// Opens the configured store. The pool is returned alongside so the health
/// check can probe it; it is `None` for the in-memory backend.
///
/// Pending migrations are applied first when `database.auto_migrate` is set.
pub async fn build_repositories(
    settings: &Settings,
) -> AppResult<(Repositories, Option<AsyncDbPool>)> {
    match settings.dispatch.store {
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; queued deliveries are lost on restart");
            Ok((Repositories::memory(), None))
        }
        StoreBackend::Postgres => {
            if settings.database.auto_migrate {
                let applied = run_migrations(&settings.database.url).await?;
                tracing::info!(applied = applied.len(), "Database migrations checked");
            }
            tracing::info!(
                max_connections = settings.database.max_connections,
                min_connections = settings.database.min_connections,
                "Initializing database connection pool"
            );
            let pool = establish_async_connection_pool(&settings.database).await?;
            Ok((Repositories::postgres(pool.clone()), Some(pool)))
        }
    }
}

/// Wires the worker to the stores and the configured transport.
pub fn build_worker(settings: &Settings, repos: &Repositories) -> DispatchWorker {
    DispatchWorker::new(
        repos.jobs.clone(),
        AuthorityResolver::new(repos.templates.clone()),
        Dispatcher::from_config(&settings.messaging),
        &settings.dispatch,
    )
}

/// Resolves on Ctrl+C or SIGTERM. A handler that fails to install is
/// logged and never fires, leaving the other one in charge.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_has_no_pool() {
        let mut settings = Settings::default();
        settings.dispatch.store = StoreBackend::Memory;
        let (repos, pool) = build_repositories(&settings).await.unwrap();
        assert!(pool.is_none());

        let worker = build_worker(&settings, &repos);
        let summary = worker.run_once().await.unwrap();
        assert_eq!(summary.claimed, 0);
    }
}
