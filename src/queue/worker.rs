//! Dispatch pass: sweep stale SENDING jobs, claim a batch, deliver
//! concurrently, record each outcome.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use jiff::{SignedDuration, Timestamp};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::state::{self, RetryPolicy};
use super::store::JobStore;
use crate::config::DispatchConfig;
use crate::error::AppResult;
use crate::messaging::authority::AuthorityResolver;
use crate::messaging::dispatcher::{Dispatcher, SendRequest};
use crate::messaging::phone::mask_phone;
use crate::models::delivery::{DeliveryJob, JobPayload};

/// Counters for one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// SENDING jobs expired by the stale sweep
    pub stale: usize,
    pub claimed: usize,
    pub sent: usize,
    pub failed: usize,
    /// Outcomes not recorded because the job changed underneath us
    pub conflicts: usize,
    pub errors: usize,
}

enum Attempt {
    Sent {
        provider: String,
        message_id: Option<String>,
    },
    Failed {
        error: String,
        provider: Option<String>,
        retryable: bool,
    },
}

enum Outcome {
    Sent,
    Failed,
    Conflict,
    Error,
}

pub struct DispatchWorker {
    store: Arc<dyn JobStore>,
    resolver: AuthorityResolver,
    dispatcher: Dispatcher,
    policy: RetryPolicy,
    batch_size: i64,
    concurrency: usize,
    poll_interval: Duration,
    stale_after: SignedDuration,
}

impl DispatchWorker {
    pub fn new(
        store: Arc<dyn JobStore>,
        resolver: AuthorityResolver,
        dispatcher: Dispatcher,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            store,
            resolver,
            dispatcher,
            policy: RetryPolicy::from_config(config),
            batch_size: i64::from(config.batch_size),
            concurrency: config.concurrency.max(1) as usize,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            stale_after: SignedDuration::from_secs(config.stale_after_secs as i64),
        }
    }

    /// Runs passes until `shutdown` is cancelled. A full batch triggers the
    /// next pass immediately.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            provider = %self.dispatcher.provider(),
            batch_size = self.batch_size,
            concurrency = self.concurrency,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Dispatch worker started"
        );

        loop {
            let mut saturated = false;
            match self.run_once().await {
                Ok(summary) if summary.claimed > 0 || summary.stale > 0 => {
                    info!(
                        claimed = summary.claimed,
                        sent = summary.sent,
                        failed = summary.failed,
                        stale = summary.stale,
                        conflicts = summary.conflicts,
                        "Dispatch pass finished"
                    );
                    saturated = summary.claimed as i64 >= self.batch_size;
                }
                Ok(_) => debug!("Dispatch pass found no due jobs"),
                Err(e) => error!(error = %e, "Dispatch pass failed"),
            }

            if saturated && !shutdown.is_cancelled() {
                continue;
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!("Dispatch worker stopped");
    }

    #[instrument(skip(self), fields(provider = %self.dispatcher.provider()))]
    pub async fn run_once(&self) -> AppResult<PassSummary> {
        let now = Timestamp::now();
        let mut summary = PassSummary {
            stale: self.sweep_stale(now).await?,
            ..Default::default()
        };

        let jobs = self.store.claim_due(now, self.batch_size).await?;
        summary.claimed = jobs.len();

        let outcomes: Vec<Outcome> = stream::iter(jobs)
            .map(|job| self.deliver(job))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                Outcome::Sent => summary.sent += 1,
                Outcome::Failed => summary.failed += 1,
                Outcome::Conflict => summary.conflicts += 1,
                Outcome::Error => summary.errors += 1,
            }
        }
        Ok(summary)
    }

    /// Expires SENDING jobs whose worker never reported back.
    async fn sweep_stale(&self, now: Timestamp) -> AppResult<usize> {
        let before = now.checked_sub(self.stale_after).unwrap_or(Timestamp::MIN);
        let jobs = self.store.stale_sending(before, self.batch_size).await?;

        let mut swept = 0;
        for job in jobs {
            let Ok(transition) = state::stale(&job, before, now) else {
                continue;
            };
            if self.store.apply(job.id, &transition).await?.is_some() {
                warn!(job_id = %job.id, attempts = job.attempts, "Expired stale SENDING job");
                swept += 1;
            }
        }
        Ok(swept)
    }

    /// Resolves and sends one claimed job. Never fails: store lookups that
    /// error out become retryable failures.
    async fn attempt(&self, job: &DeliveryJob) -> Attempt {
        let request = match &job.payload {
            JobPayload::FreeText(payload) => {
                SendRequest::text(&job.recipient_phone, &payload.body, payload.channel.into())
                    .with_subject(payload.subject.clone())
            }
            JobPayload::Authority(payload) => match self.resolver.resolve(payload).await {
                Ok(Ok(resolved)) => SendRequest::authority(&job.recipient_phone, resolved),
                Ok(Err(rejection)) => {
                    return Attempt::Failed {
                        error: rejection.to_string(),
                        provider: None,
                        retryable: false,
                    };
                }
                Err(e) => {
                    return Attempt::Failed {
                        error: format!("TEMPLATE_LOOKUP_FAILED: {}", e),
                        provider: None,
                        retryable: true,
                    };
                }
            },
        };

        let result = self.dispatcher.send(&request).await;
        if result.ok {
            Attempt::Sent {
                provider: result.provider,
                message_id: result.message_id,
            }
        } else {
            let retryable = result.retryable();
            Attempt::Failed {
                error: result.error.unwrap_or_else(|| "UNKNOWN_ERROR".to_string()),
                provider: Some(result.provider),
                retryable,
            }
        }
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, attempt = job.attempts))]
    async fn deliver(&self, job: DeliveryJob) -> Outcome {
        let attempt = self.attempt(&job).await;
        let now = Timestamp::now();

        let transition = match &attempt {
            Attempt::Sent { provider, message_id } => {
                state::succeed(&job, provider, message_id.clone(), now)
            }
            Attempt::Failed { error, provider, retryable } => state::fail(
                &job,
                error,
                provider.as_deref(),
                *retryable,
                &self.policy,
                now,
            ),
        };
        let transition = match transition {
            Ok(t) => t,
            Err(e) => {
                error!(error = %e, "Claimed job is not in SENDING state");
                return Outcome::Error;
            }
        };

        match self.store.apply(job.id, &transition).await {
            Ok(Some(updated)) => match attempt {
                Attempt::Sent { provider, message_id } => {
                    info!(
                        to = %mask_phone(&job.recipient_phone_normalized),
                        provider = %provider,
                        message_id = message_id.as_deref().unwrap_or(""),
                        "Delivery sent"
                    );
                    Outcome::Sent
                }
                Attempt::Failed { error, .. } => {
                    warn!(
                        to = %mask_phone(&job.recipient_phone_normalized),
                        error = %error,
                        attempts = updated.attempts,
                        max_attempts = updated.max_attempts,
                        next_retry_at = ?updated.next_retry_at,
                        "Delivery failed"
                    );
                    Outcome::Failed
                }
            },
            Ok(None) => {
                warn!("Job changed while in flight; outcome not recorded");
                Outcome::Conflict
            }
            Err(e) => {
                error!(error = %e, "Failed to record delivery outcome");
                Outcome::Error
            }
        }
    }
}
