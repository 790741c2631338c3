//! Storage backends for delivery jobs and authority templates.

mod delivery_job_repo;
mod template_repo;

use std::sync::Arc;

pub use delivery_job_repo::PgJobStore;
pub use template_repo::PgTemplateStore;

use crate::db::AsyncDbPool;
use crate::messaging::authority::TemplateStore;
use crate::queue::{JobStore, MemoryJobStore, MemoryTemplateStore};

/// The pair of stores shared by the API and the dispatch worker.
///
/// Cloning only bumps reference counts.
#[derive(Clone)]
pub struct Repositories {
    pub jobs: Arc<dyn JobStore>,
    pub templates: Arc<dyn TemplateStore>,
}

impl Repositories {
    pub fn postgres(pool: AsyncDbPool) -> Self {
        Self {
            jobs: Arc::new(PgJobStore::new(pool.clone())),
            templates: Arc::new(PgTemplateStore::new(pool)),
        }
    }

    /// In-process stores; contents are lost on restart.
    pub fn memory() -> Self {
        Self {
            jobs: Arc::new(MemoryJobStore::new()),
            templates: Arc::new(MemoryTemplateStore::new()),
        }
    }
}
