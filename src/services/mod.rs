//! Service layer: business rules between the API and the stores.

mod queue_service;
mod template_service;

pub use queue_service::{QueueService, QueueStats};
pub use template_service::TemplateService;

use crate::config::DispatchConfig;
use crate::repositories::Repositories;

/// Aggregates all services for use as Axum application state.
#[derive(Clone)]
pub struct Services {
    pub queue: QueueService,
    pub templates: TemplateService,
}

impl Services {
    pub fn new(repos: &Repositories, dispatch: &DispatchConfig) -> Self {
        Self {
            queue: QueueService::new(repos.jobs.clone(), dispatch.max_attempts),
            templates: TemplateService::new(repos.templates.clone()),
        }
    }
}
