//! Enqueue and operator actions on delivery jobs.

use std::collections::BTreeMap;
use std::sync::Arc;

use jiff::Timestamp;
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::messaging::phone::{mask_phone, normalize_phone};
use crate::models::delivery::{DeliveryJob, DeliveryStatus, JobPayload, NewDeliveryJob};
use crate::queue::state::{self, Transition};
use crate::queue::{JobFilter, JobStore};

/// Job counts per status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct QueueStats {
    /// Every status is present, zero when no job has it
    #[schema(value_type = Object)]
    pub by_status: BTreeMap<String, i64>,
    pub total: i64,
}

#[derive(Clone)]
pub struct QueueService {
    jobs: Arc<dyn JobStore>,
    default_max_attempts: i32,
}

impl QueueService {
    pub fn new(jobs: Arc<dyn JobStore>, default_max_attempts: i32) -> Self {
        Self {
            jobs,
            default_max_attempts,
        }
    }

    /// Creates a READY job. Only the shape is checked here; template
    /// resolution happens at dispatch time.
    pub async fn enqueue(&self, new_job: NewDeliveryJob) -> AppResult<DeliveryJob> {
        if normalize_phone(&new_job.recipient_phone).is_empty() {
            return Err(AppError::validation(
                "recipient_phone",
                "Recipient phone must contain digits",
            ));
        }
        if new_job.max_attempts.is_some_and(|n| n < 1) {
            return Err(AppError::validation("max_attempts", "Must be at least 1"));
        }
        match &new_job.payload {
            JobPayload::FreeText(text) if text.body.trim().is_empty() => {
                return Err(AppError::validation("body", "Message body must not be empty"));
            }
            JobPayload::Authority(authority) => {
                let has_key = authority
                    .template_key
                    .as_deref()
                    .is_some_and(|k| !k.trim().is_empty());
                let has_identifiers = authority.channel_id.is_some()
                    && authority.provider_template_id.is_some();
                if !has_key && !has_identifiers {
                    return Err(AppError::validation(
                        "template_key",
                        "Either a template key or channel and provider template ids are required",
                    ));
                }
            }
            JobPayload::FreeText(_) => {}
        }

        let job = new_job.into_job(Timestamp::now(), self.default_max_attempts);
        let job = self.jobs.insert(job).await?;
        info!(
            job_id = %job.id,
            to = %mask_phone(&job.recipient_phone_normalized),
            authority = job.payload.is_authority(),
            scheduled_for = %job.scheduled_for,
            "Delivery job enqueued"
        );
        Ok(job)
    }

    pub async fn get(&self, id: Uuid) -> AppResult<DeliveryJob> {
        self.jobs
            .find(id)
            .await?
            .ok_or_else(|| AppError::not_found("delivery_job", "id", id))
    }

    pub async fn list(&self, filter: &JobFilter) -> AppResult<Vec<DeliveryJob>> {
        self.jobs.list(filter).await
    }

    /// FAILED/SKIPPED -> READY; attempts and last error are kept.
    pub async fn retry(&self, id: Uuid) -> AppResult<DeliveryJob> {
        let job = self.get(id).await?;
        let transition = state::retry(&job, Timestamp::now())?;
        let job = self.apply(&job, &transition).await?;
        info!(job_id = %id, attempts = job.attempts, "Delivery job requeued by operator");
        Ok(job)
    }

    pub async fn force_fail(&self, id: Uuid, reason: &str) -> AppResult<DeliveryJob> {
        let job = self.get(id).await?;
        let transition = state::force_fail(&job, reason, Timestamp::now())?;
        let job = self.apply(&job, &transition).await?;
        info!(job_id = %id, reason = reason.trim(), "Delivery job force-failed by operator");
        Ok(job)
    }

    pub async fn skip(&self, id: Uuid, reason: &str) -> AppResult<DeliveryJob> {
        let job = self.get(id).await?;
        let transition = state::skip(&job, reason, Timestamp::now())?;
        let job = self.apply(&job, &transition).await?;
        info!(job_id = %id, reason = reason.trim(), "Delivery job skipped by operator");
        Ok(job)
    }

    pub async fn stats(&self) -> AppResult<QueueStats> {
        let counts = self.jobs.count_by_status().await?;
        let by_status: BTreeMap<String, i64> = DeliveryStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), counts.get(s).copied().unwrap_or(0)))
            .collect();
        let total = by_status.values().sum();
        Ok(QueueStats { by_status, total })
    }

    async fn apply(&self, job: &DeliveryJob, transition: &Transition) -> AppResult<DeliveryJob> {
        self.jobs.apply(job.id, transition).await?.ok_or_else(|| {
            AppError::conflict(format!(
                "delivery job {} left {} before the update was applied",
                job.id, transition.expected
            ))
        })
    }
}
