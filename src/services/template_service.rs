//! Authority-template lookup, registration and dry-run resolution.

use std::sync::Arc;

use tracing::info;

use crate::error::{AppError, AppResult};
use crate::messaging::authority::{AuthorityResolver, AuthorityTemplate, Resolution, TemplateStore};
use crate::models::delivery::AuthorityPayload;

#[derive(Clone)]
pub struct TemplateService {
    store: Arc<dyn TemplateStore>,
    resolver: AuthorityResolver,
}

impl TemplateService {
    pub fn new(store: Arc<dyn TemplateStore>) -> Self {
        Self {
            resolver: AuthorityResolver::new(store.clone()),
            store,
        }
    }

    pub async fn list(&self) -> AppResult<Vec<AuthorityTemplate>> {
        self.store.list().await
    }

    pub async fn get(&self, key: &str) -> AppResult<AuthorityTemplate> {
        self.store
            .find_by_key(key)
            .await?
            .ok_or_else(|| AppError::not_found("authority_template", "key", key))
    }

    pub async fn upsert(&self, template: AuthorityTemplate) -> AppResult<AuthorityTemplate> {
        if template.key.trim().is_empty() {
            return Err(AppError::validation("key", "Template key must not be empty"));
        }
        let template = self.store.upsert(template).await?;
        info!(template_key = %template.key, "Authority template saved");
        Ok(template)
    }

    /// Runs the resolver exactly as the dispatch pass would, without sending.
    /// The path key wins over any key in `request`.
    pub async fn preview(&self, key: &str, mut request: AuthorityPayload) -> AppResult<Resolution> {
        request.template_key = Some(key.to_string());
        self.resolver.resolve(&request).await
    }
}
