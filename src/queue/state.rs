//! Delivery job state machine.
//!
//! Each transition validates the job's current status and returns a
//! [`Transition`]: the status and attempt count the caller observed plus the
//! [`JobChange`] to apply. Stores apply it as a compare-and-set on both, so a
//! job that moved in the meantime is left untouched. The attempt count fences
//! out a worker whose claim was expired and re-claimed by another worker.

use jiff::{SignedDuration, Timestamp};
use thiserror::Error;

use crate::config::DispatchConfig;
use crate::models::delivery::{DeliveryJob, DeliveryStatus, JobChange};

/// `last_error` recorded by the stale SENDING sweep.
pub const STALE_ERROR: &str = "SENDING_STALE";
/// `last_error` prefix for operator force-fail.
pub const FORCED_PREFIX: &str = "FORCED_BY_ADMIN";
/// `last_error` prefix for operator skip.
pub const SKIPPED_PREFIX: &str = "SKIPPED_BY_ADMIN";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("cannot {action} a job in {from} state")]
    InvalidState {
        action: &'static str,
        from: DeliveryStatus,
    },
    #[error("a reason is required to {action} a job")]
    ReasonRequired { action: &'static str },
}

/// A validated transition, applied with compare-and-set on `expected` and
/// `expected_attempts`.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub expected: DeliveryStatus,
    pub expected_attempts: i32,
    pub change: JobChange,
}

impl Transition {
    /// Whether `job` is still in the state this transition was computed from.
    pub fn matches(&self, job: &DeliveryJob) -> bool {
        job.status == self.expected && job.attempts == self.expected_attempts
    }
}

/// Exponential backoff between automatic attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub base_delay_secs: u64,
    pub multiplier: f64,
    pub max_delay_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_secs: 60,
            multiplier: 2.0,
            max_delay_secs: 3600,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            base_delay_secs: config.retry_base_delay_secs,
            multiplier: config.retry_multiplier,
            max_delay_secs: config.retry_max_delay_secs,
        }
    }

    /// Delay after the `attempts`-th failed attempt: `base * multiplier^(attempts-1)`.
    pub fn delay_for(&self, attempts: i32) -> SignedDuration {
        let exponent = attempts.max(1) - 1;
        let secs = self.base_delay_secs as f64 * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_delay_secs as f64).max(0.0);
        SignedDuration::from_secs(capped as i64)
    }
}

fn later(now: Timestamp, delay: SignedDuration) -> Timestamp {
    now.checked_add(delay).unwrap_or(Timestamp::MAX)
}

fn require(
    job: &DeliveryJob,
    action: &'static str,
    allowed: &[DeliveryStatus],
) -> Result<(), TransitionError> {
    if allowed.contains(&job.status) {
        Ok(())
    } else {
        Err(TransitionError::InvalidState {
            action,
            from: job.status,
        })
    }
}

fn require_reason(reason: &str, action: &'static str) -> Result<String, TransitionError> {
    let reason = reason.trim();
    if reason.is_empty() {
        Err(TransitionError::ReasonRequired { action })
    } else {
        Ok(reason.to_string())
    }
}

/// Whether the dispatch pass may pick this job up at `now`.
///
/// READY jobs wait for `scheduled_for` and any pending `next_retry_at`.
/// FAILED jobs are only revisited when attempts remain and a retry time was
/// scheduled; exhausted and validation-failed jobs have none.
pub fn is_claimable(job: &DeliveryJob, now: Timestamp) -> bool {
    if job.scheduled_for > now {
        return false;
    }
    match job.status {
        DeliveryStatus::Ready => job.next_retry_at.is_none_or(|at| at <= now),
        DeliveryStatus::Failed => {
            job.attempts < job.max_attempts && job.next_retry_at.is_some_and(|at| at <= now)
        }
        DeliveryStatus::Sending | DeliveryStatus::Sent | DeliveryStatus::Skipped => false,
    }
}

/// READY/FAILED -> SENDING. Counts the attempt up front so a crash mid-send
/// still consumes it.
pub fn claim(job: &DeliveryJob, now: Timestamp) -> Result<Transition, TransitionError> {
    if !is_claimable(job, now) {
        return Err(TransitionError::InvalidState {
            action: "claim",
            from: job.status,
        });
    }
    let mut change = JobChange::to(DeliveryStatus::Sending, now);
    change.attempts = Some(job.attempts + 1);
    change.claimed_at = Some(Some(now));
    change.next_retry_at = Some(None);
    Ok(Transition {
        expected: job.status,
        expected_attempts: job.attempts,
        change,
    })
}

/// SENDING -> SENT.
pub fn succeed(
    job: &DeliveryJob,
    provider: &str,
    message_id: Option<String>,
    now: Timestamp,
) -> Result<Transition, TransitionError> {
    require(job, "complete", &[DeliveryStatus::Sending])?;
    let mut change = JobChange::to(DeliveryStatus::Sent, now);
    change.provider = Some(Some(provider.to_string()));
    change.provider_message_id = Some(message_id);
    change.sent_at = Some(Some(now));
    change.last_error = Some(None);
    change.next_retry_at = Some(None);
    change.claimed_at = Some(None);
    Ok(Transition {
        expected: DeliveryStatus::Sending,
        expected_attempts: job.attempts,
        change,
    })
}

/// SENDING -> FAILED. A retry is scheduled only for retryable failures with
/// attempts remaining.
pub fn fail(
    job: &DeliveryJob,
    error: &str,
    provider: Option<&str>,
    retryable: bool,
    policy: &RetryPolicy,
    now: Timestamp,
) -> Result<Transition, TransitionError> {
    require(job, "fail", &[DeliveryStatus::Sending])?;
    let next_retry_at = (retryable && job.attempts < job.max_attempts)
        .then(|| later(now, policy.delay_for(job.attempts)));

    let mut change = JobChange::to(DeliveryStatus::Failed, now);
    change.last_error = Some(Some(error.to_string()));
    change.next_retry_at = Some(next_retry_at);
    change.claimed_at = Some(None);
    if let Some(provider) = provider {
        change.provider = Some(Some(provider.to_string()));
    }
    Ok(Transition {
        expected: DeliveryStatus::Sending,
        expected_attempts: job.attempts,
        change,
    })
}

/// SENDING (claimed before `stale_before`) -> FAILED with an immediate retry
/// when attempts remain.
pub fn stale(
    job: &DeliveryJob,
    stale_before: Timestamp,
    now: Timestamp,
) -> Result<Transition, TransitionError> {
    require(job, "expire", &[DeliveryStatus::Sending])?;
    if job.claimed_at.is_some_and(|at| at > stale_before) {
        return Err(TransitionError::InvalidState {
            action: "expire",
            from: job.status,
        });
    }
    let mut change = JobChange::to(DeliveryStatus::Failed, now);
    change.last_error = Some(Some(STALE_ERROR.to_string()));
    change.next_retry_at = Some((job.attempts < job.max_attempts).then_some(now));
    change.claimed_at = Some(None);
    Ok(Transition {
        expected: DeliveryStatus::Sending,
        expected_attempts: job.attempts,
        change,
    })
}

/// Operator retry: FAILED/SKIPPED -> READY. `attempts` and `last_error` are
/// kept as history.
pub fn retry(job: &DeliveryJob, now: Timestamp) -> Result<Transition, TransitionError> {
    require(job, "retry", &[DeliveryStatus::Failed, DeliveryStatus::Skipped])?;
    let mut change = JobChange::to(DeliveryStatus::Ready, now);
    change.next_retry_at = Some(None);
    change.claimed_at = Some(None);
    Ok(Transition {
        expected: job.status,
        expected_attempts: job.attempts,
        change,
    })
}

/// Operator force-fail: READY/SENDING/FAILED -> FAILED, never revisited
/// automatically.
pub fn force_fail(
    job: &DeliveryJob,
    reason: &str,
    now: Timestamp,
) -> Result<Transition, TransitionError> {
    let reason = require_reason(reason, "force-fail")?;
    require(
        job,
        "force-fail",
        &[DeliveryStatus::Ready, DeliveryStatus::Sending, DeliveryStatus::Failed],
    )?;
    let mut change = JobChange::to(DeliveryStatus::Failed, now);
    change.last_error = Some(Some(format!("{}: {}", FORCED_PREFIX, reason)));
    change.next_retry_at = Some(None);
    change.claimed_at = Some(None);
    Ok(Transition {
        expected: job.status,
        expected_attempts: job.attempts,
        change,
    })
}

/// Operator skip: READY/SENDING/FAILED -> SKIPPED.
pub fn skip(
    job: &DeliveryJob,
    reason: &str,
    now: Timestamp,
) -> Result<Transition, TransitionError> {
    let reason = require_reason(reason, "skip")?;
    require(
        job,
        "skip",
        &[DeliveryStatus::Ready, DeliveryStatus::Sending, DeliveryStatus::Failed],
    )?;
    let mut change = JobChange::to(DeliveryStatus::Skipped, now);
    change.last_error = Some(Some(format!("{}: {}", SKIPPED_PREFIX, reason)));
    change.next_retry_at = Some(None);
    change.claimed_at = Some(None);
    Ok(Transition {
        expected: job.status,
        expected_attempts: job.attempts,
        change,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::phone::MessageKind;
    use crate::models::delivery::{FreeTextPayload, JobPayload, NewDeliveryJob};
    use proptest::prelude::*;

    fn ts(secs: i64) -> Timestamp {
        Timestamp::from_second(1_700_000_000 + secs).unwrap()
    }

    fn job() -> DeliveryJob {
        NewDeliveryJob {
            recipient_phone: "01012345678".to_string(),
            recipient_name: None,
            payload: JobPayload::FreeText(FreeTextPayload {
                channel: MessageKind::Sms,
                body: "hi".to_string(),
                subject: None,
            }),
            scheduled_for: None,
            max_attempts: Some(3),
            campaign_key: None,
            trigger_key: None,
        }
        .into_job(ts(0), 3)
    }

    fn step(job: &mut DeliveryJob, t: Result<Transition, TransitionError>) {
        let t = t.unwrap();
        assert_eq!(t.expected, job.status);
        t.change.apply_to(job);
    }

    #[test]
    fn test_ready_cannot_go_directly_to_sent() {
        let job = job();
        assert_eq!(
            succeed(&job, "hmac_rest", None, ts(1)),
            Err(TransitionError::InvalidState {
                action: "complete",
                from: DeliveryStatus::Ready
            })
        );
    }

    #[test]
    fn test_claim_then_succeed() {
        let mut job = job();
        let t = claim(&job, ts(1));
        step(&mut job, t);
        assert_eq!(job.status, DeliveryStatus::Sending);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.claimed_at, Some(ts(1)));

        let t = succeed(&job, "hmac_rest", Some("M1".to_string()), ts(2));

        step(&mut job, t);
        assert_eq!(job.status, DeliveryStatus::Sent);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.sent_at, Some(ts(2)));
        assert_eq!(job.last_error, None);
        assert_eq!(job.provider_message_id.as_deref(), Some("M1"));

        assert!(!is_claimable(&job, ts(10_000)));
        assert!(retry(&job, ts(3)).is_err());
        assert!(force_fail(&job, "x", ts(3)).is_err());
        assert!(skip(&job, "x", ts(3)).is_err());
    }

    #[test]
    fn test_failures_back_off_then_exhaust() {
        let policy = RetryPolicy::default();
        let mut job = job();

        let t = claim(&job, ts(0));

        step(&mut job, t);
        let t = fail(&job, "HTTP_500", Some("hmac_rest"), true, &policy, ts(0));
        step(&mut job, t);
        assert_eq!(job.next_retry_at, Some(ts(60)));
        assert!(!is_claimable(&job, ts(59)));
        assert!(is_claimable(&job, ts(60)));

        let t = claim(&job, ts(60));

        step(&mut job, t);
        let t = fail(&job, "HTTP_500", Some("hmac_rest"), true, &policy, ts(60));
        step(&mut job, t);
        assert_eq!(job.next_retry_at, Some(ts(180)));

        let t = claim(&job, ts(180));

        step(&mut job, t);
        let t = fail(&job, "HTTP_500", Some("hmac_rest"), true, &policy, ts(180));
        step(&mut job, t);
        assert_eq!(job.status, DeliveryStatus::Failed);
        assert_eq!(job.attempts, 3);
        assert_eq!(job.next_retry_at, None);
        assert!(!is_claimable(&job, ts(1_000_000)));
    }

    #[test]
    fn test_validation_failure_is_not_rescheduled() {
        let mut job = job();
        let t = claim(&job, ts(0));
        step(&mut job, t);
        let t = fail(&job, "MISSING_VARS:name", None, false, &RetryPolicy::default(), ts(0));
        step(&mut job, t);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.next_retry_at, None);
        assert!(!is_claimable(&job, ts(1_000_000)));
    }

    #[test]
    fn test_retry_preserves_history() {
        let mut job = job();
        job.status = DeliveryStatus::Failed;
        job.attempts = 3;
        job.last_error = Some("HTTP_500".to_string());

        let t = retry(&job, ts(5));

        step(&mut job, t);
        assert_eq!(job.status, DeliveryStatus::Ready);
        assert_eq!(job.attempts, 3);
        assert_eq!(job.last_error.as_deref(), Some("HTTP_500"));
        assert!(is_claimable(&job, ts(5)));
    }

    #[test]
    fn test_force_fail_and_skip_need_reason() {
        let job = job();
        assert_eq!(
            force_fail(&job, "  ", ts(1)),
            Err(TransitionError::ReasonRequired { action: "force-fail" })
        );

        let mut forced = job.clone();
        step(&mut forced, force_fail(&job, "customer cancelled", ts(1)));
        assert_eq!(forced.status, DeliveryStatus::Failed);
        assert_eq!(forced.last_error.as_deref(), Some("FORCED_BY_ADMIN: customer cancelled"));
        assert!(!is_claimable(&forced, ts(1_000_000)));

        let mut skipped = job.clone();
        step(&mut skipped, skip(&job, "duplicate", ts(1)));
        assert_eq!(skipped.status, DeliveryStatus::Skipped);
        assert_eq!(skipped.last_error.as_deref(), Some("SKIPPED_BY_ADMIN: duplicate"));
        assert!(skip(&skipped, "again", ts(2)).is_err());
    }

    #[test]
    fn test_stale_sweep() {
        let mut job = job();
        let t = claim(&job, ts(0));
        step(&mut job, t);
        assert!(stale(&job, ts(-1), ts(400)).is_err());

        let t = stale(&job, ts(100), ts(400));

        step(&mut job, t);
        assert_eq!(job.status, DeliveryStatus::Failed);
        assert_eq!(job.last_error.as_deref(), Some(STALE_ERROR));
        assert_eq!(job.next_retry_at, Some(ts(400)));
        assert!(is_claimable(&job, ts(400)));
    }

    #[test]
    fn test_scheduled_for_is_honoured() {
        let mut job = job();
        job.scheduled_for = ts(100);
        assert!(!is_claimable(&job, ts(99)));
        assert!(is_claimable(&job, ts(100)));
        assert!(claim(&job, ts(50)).is_err());
    }

    proptest! {
        #[test]
        fn prop_backoff_is_monotonic_and_capped(attempts in 1i32..64) {
            let policy = RetryPolicy::default();
            let current = policy.delay_for(attempts);
            let next = policy.delay_for(attempts + 1);
            prop_assert!(next >= current);
            prop_assert!(current <= SignedDuration::from_secs(policy.max_delay_secs as i64));
            prop_assert!(current >= SignedDuration::from_secs(policy.base_delay_secs as i64));
        }
    }
}
