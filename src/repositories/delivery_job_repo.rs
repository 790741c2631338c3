//! PostgreSQL-backed [`JobStore`].
//!
//! Claiming runs as a single `UPDATE ... WHERE id IN (SELECT ... FOR UPDATE
//! SKIP LOCKED) RETURNING *`, so concurrent workers never receive the same
//! row. Every other transition is an `UPDATE` filtered on the status and
//! attempt count the caller observed.

use std::collections::HashMap;

use async_trait::async_trait;
use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Timestamptz};
use diesel_async::RunQueryDsl;
use jiff::Timestamp;
use jiff_diesel::ToDiesel;
use uuid::Uuid;

use crate::db::AsyncDbPool;
use crate::error::{AppError, AppResult};
use crate::models::delivery::{DeliveryJob, DeliveryJobChangeset, DeliveryJobRow, DeliveryStatus};
use crate::queue::{JobFilter, JobStore, Transition};

/// Mirrors `queue::state::is_claimable`; `$1` is the claim time.
const CLAIMABLE: &str = "scheduled_for <= $1 AND ( \
     (status = 'ready' AND (next_retry_at IS NULL OR next_retry_at <= $1)) \
     OR (status = 'failed' AND attempts < max_attempts \
         AND next_retry_at IS NOT NULL AND next_retry_at <= $1))";

const CLAIM_SET: &str = "SET status = 'sending', attempts = attempts + 1, \
     claimed_at = $1, next_retry_at = NULL, updated_at = $1";

fn rows_into_jobs(rows: Vec<DeliveryJobRow>) -> AppResult<Vec<DeliveryJob>> {
    rows.into_iter().map(DeliveryJobRow::into_job).collect()
}

/// Escapes `%`, `_` and `\` for use inside an ILIKE pattern.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[derive(Clone)]
pub struct PgJobStore {
    pool: AsyncDbPool,
}

impl PgJobStore {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, job: DeliveryJob) -> AppResult<DeliveryJob> {
        use crate::schema::delivery_jobs::dsl::*;
        let row = DeliveryJobRow::from_job(&job)?;
        let mut conn = self.pool.get().await?;

        diesel::insert_into(delivery_jobs)
            .values(&row)
            .returning(DeliveryJobRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(AppError::from)?
            .into_job()
    }

    async fn find(&self, job_id: Uuid) -> AppResult<Option<DeliveryJob>> {
        use crate::schema::delivery_jobs::dsl::*;
        let mut conn = self.pool.get().await?;

        delivery_jobs
            .filter(id.eq(job_id))
            .select(DeliveryJobRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(AppError::from)?
            .map(DeliveryJobRow::into_job)
            .transpose()
    }

    async fn list(&self, filter: &JobFilter) -> AppResult<Vec<DeliveryJob>> {
        use crate::schema::delivery_jobs::dsl::*;
        let mut conn = self.pool.get().await?;

        let mut query = delivery_jobs
            .select(DeliveryJobRow::as_select())
            .into_boxed();
        if let Some(wanted) = filter.status {
            query = query.filter(status.eq(wanted));
        }
        if let Some(term) = filter.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let pattern = like_pattern(term);
            query = query.filter(
                recipient_phone
                    .ilike(pattern.clone())
                    .or(recipient_phone_normalized.ilike(pattern.clone()))
                    .or(recipient_name.ilike(pattern.clone()))
                    .or(campaign_key.ilike(pattern.clone()))
                    .or(trigger_key.ilike(pattern)),
            );
        }

        let rows = query
            .order(created_at.desc())
            .limit(filter.limit.max(0))
            .offset(filter.offset.max(0))
            .load(&mut conn)
            .await
            .map_err(AppError::from)?;
        rows_into_jobs(rows)
    }

    async fn count_by_status(&self) -> AppResult<HashMap<DeliveryStatus, i64>> {
        use crate::schema::delivery_jobs::dsl::*;
        let mut conn = self.pool.get().await?;

        let counts: Vec<(DeliveryStatus, i64)> = delivery_jobs
            .group_by(status)
            .select((status, count_star()))
            .load(&mut conn)
            .await
            .map_err(AppError::from)?;
        Ok(counts.into_iter().collect())
    }

    async fn claim(&self, job_id: Uuid, now: Timestamp) -> AppResult<Option<DeliveryJob>> {
        let mut conn = self.pool.get().await?;
        let sql = format!(
            "UPDATE delivery_jobs {} WHERE id = $2 AND {} RETURNING *",
            CLAIM_SET, CLAIMABLE
        );

        diesel::sql_query(sql)
            .bind::<Timestamptz, _>(now.to_diesel())
            .bind::<diesel::sql_types::Uuid, _>(job_id)
            .get_result::<DeliveryJobRow>(&mut conn)
            .await
            .optional()
            .map_err(AppError::from)?
            .map(DeliveryJobRow::into_job)
            .transpose()
    }

    async fn claim_due(&self, now: Timestamp, limit: i64) -> AppResult<Vec<DeliveryJob>> {
        let mut conn = self.pool.get().await?;
        let sql = format!(
            "UPDATE delivery_jobs {} WHERE id IN ( \
                 SELECT id FROM delivery_jobs WHERE {} \
                 ORDER BY scheduled_for, created_at \
                 LIMIT $2 FOR UPDATE SKIP LOCKED) \
             RETURNING *",
            CLAIM_SET, CLAIMABLE
        );

        let rows: Vec<DeliveryJobRow> = diesel::sql_query(sql)
            .bind::<Timestamptz, _>(now.to_diesel())
            .bind::<BigInt, _>(limit.max(0))
            .load(&mut conn)
            .await
            .map_err(AppError::from)?;

        // RETURNING order is unspecified.
        let mut jobs = rows_into_jobs(rows)?;
        jobs.sort_by_key(|job| (job.scheduled_for, job.created_at));
        Ok(jobs)
    }

    async fn stale_sending(&self, before: Timestamp, limit: i64) -> AppResult<Vec<DeliveryJob>> {
        use crate::schema::delivery_jobs::dsl::*;
        let mut conn = self.pool.get().await?;

        let rows = delivery_jobs
            .filter(status.eq(DeliveryStatus::Sending))
            .filter(claimed_at.le(before.to_diesel()).or(claimed_at.is_null()))
            .order(claimed_at.asc())
            .limit(limit.max(0))
            .select(DeliveryJobRow::as_select())
            .load(&mut conn)
            .await
            .map_err(AppError::from)?;
        rows_into_jobs(rows)
    }

    async fn apply(&self, job_id: Uuid, transition: &Transition) -> AppResult<Option<DeliveryJob>> {
        use crate::schema::delivery_jobs::dsl::*;
        let changeset = DeliveryJobChangeset::from(&transition.change);
        let mut conn = self.pool.get().await?;

        diesel::update(
            delivery_jobs
                .filter(id.eq(job_id))
                .filter(status.eq(transition.expected))
                .filter(attempts.eq(transition.expected_attempts)),
        )
        .set(&changeset)
        .returning(DeliveryJobRow::as_returning())
        .get_result(&mut conn)
        .await
        .optional()
        .map_err(AppError::from)?
        .map(DeliveryJobRow::into_job)
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("010"), "%010%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn test_claim_sql_shapes() {
        assert!(CLAIMABLE.contains("status = 'ready'"));
        assert!(CLAIMABLE.contains("attempts < max_attempts"));
        assert!(CLAIM_SET.contains("attempts = attempts + 1"));
    }
}
