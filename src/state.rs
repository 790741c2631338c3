//! Application state for Axum web framework.

use crate::config::Settings;
use crate::db::AsyncDbPool;
use crate::messaging::ProviderKind;
use crate::repositories::Repositories;
use crate::services::Services;

/// Shared handler state. Cloning is cheap; services hold `Arc`ed stores.
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    /// Present only when the PostgreSQL store is selected
    pub db_pool: Option<AsyncDbPool>,
    /// Active message transport, reported by the health check
    pub provider: ProviderKind,
}

impl AppState {
    /// Builds services over `repos`. Pass the pool that backs `repos`, if
    /// any, so health checks can probe it.
    ///
    /// ```ignore
    /// let pool = establish_async_connection_pool(&settings.database).await?;
    /// let state = AppState::new(&Repositories::postgres(pool.clone()), Some(pool), &settings);
    /// ```
    pub fn new(repos: &Repositories, db_pool: Option<AsyncDbPool>, settings: &Settings) -> Self {
        Self {
            services: Services::new(repos, &settings.dispatch),
            db_pool,
            provider: settings.messaging.provider,
        }
    }
}
