//! PostgreSQL-backed [`TemplateStore`].

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::RunQueryDsl;
use jiff::Timestamp;

use crate::db::AsyncDbPool;
use crate::error::{AppError, AppResult};
use crate::messaging::authority::{AuthorityTemplate, TemplateStore};
use crate::models::template::AuthorityTemplateRow;

#[derive(Clone)]
pub struct PgTemplateStore {
    pool: AsyncDbPool,
}

impl PgTemplateStore {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateStore for PgTemplateStore {
    async fn find_by_key(&self, key: &str) -> AppResult<Option<AuthorityTemplate>> {
        use crate::schema::authority_templates::dsl::*;
        let mut conn = self.pool.get().await?;

        authority_templates
            .filter(template_key.eq(key))
            .select(AuthorityTemplateRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(AppError::from)?
            .map(AuthorityTemplateRow::into_template)
            .transpose()
    }

    async fn list(&self) -> AppResult<Vec<AuthorityTemplate>> {
        use crate::schema::authority_templates::dsl::*;
        let mut conn = self.pool.get().await?;

        authority_templates
            .order(template_key.asc())
            .select(AuthorityTemplateRow::as_select())
            .load(&mut conn)
            .await
            .map_err(AppError::from)?
            .into_iter()
            .map(AuthorityTemplateRow::into_template)
            .collect()
    }

    async fn upsert(&self, template: AuthorityTemplate) -> AppResult<AuthorityTemplate> {
        use crate::schema::authority_templates::dsl::*;
        let row = AuthorityTemplateRow::from_template(&template, Timestamp::now())?;
        let mut conn = self.pool.get().await?;

        diesel::insert_into(authority_templates)
            .values(&row)
            .on_conflict(template_key)
            .do_update()
            .set((
                channel_id.eq(excluded(channel_id)),
                provider_template_id.eq(excluded(provider_template_id)),
                required_variables.eq(excluded(required_variables)),
                enable_sms_fallback.eq(excluded(enable_sms_fallback)),
                strict_variables.eq(excluded(strict_variables)),
                fallback_body.eq(excluded(fallback_body)),
                content.eq(excluded(content)),
                buttons.eq(excluded(buttons)),
                updated_at.eq(excluded(updated_at)),
            ))
            .returning(AuthorityTemplateRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(AppError::from)?
            .into_template()
    }
}
