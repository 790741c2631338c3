//! Durable job storage contract and the in-process implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use jiff::Timestamp;
use uuid::Uuid;

use super::state::{self, Transition};
use crate::error::AppResult;
use crate::messaging::authority::{AuthorityTemplate, TemplateStore};
use crate::models::delivery::{DeliveryJob, DeliveryStatus};

/// Operator list filter.
#[derive(Debug, Clone)]
pub struct JobFilter {
    pub status: Option<DeliveryStatus>,
    /// Matched against phone, name, campaign and trigger keys
    pub search: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for JobFilter {
    fn default() -> Self {
        Self {
            status: None,
            search: None,
            limit: 50,
            offset: 0,
        }
    }
}

impl JobFilter {
    fn search_term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    fn matches(&self, job: &DeliveryJob) -> bool {
        if self.status.is_some_and(|s| s != job.status) {
            return false;
        }
        let Some(term) = self.search_term() else {
            return true;
        };
        let term = term.to_lowercase();
        [
            Some(&job.recipient_phone),
            Some(&job.recipient_phone_normalized),
            job.recipient_name.as_ref(),
            job.campaign_key.as_ref(),
            job.trigger_key.as_ref(),
        ]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&term))
    }
}

/// Storage contract required by the queue.
///
/// Every mutation is atomic per job. `claim`, `claim_due` and `apply` are
/// compare-and-set operations: they return `None` (or skip the job) when
/// its status is no longer the one the caller observed, so two workers can
/// never both move the same job to SENDING.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: DeliveryJob) -> AppResult<DeliveryJob>;

    async fn find(&self, id: Uuid) -> AppResult<Option<DeliveryJob>>;

    /// Newest first.
    async fn list(&self, filter: &JobFilter) -> AppResult<Vec<DeliveryJob>>;

    async fn count_by_status(&self) -> AppResult<HashMap<DeliveryStatus, i64>>;

    /// Claims one job if it is claimable at `now`.
    async fn claim(&self, id: Uuid, now: Timestamp) -> AppResult<Option<DeliveryJob>>;

    /// Claims up to `limit` claimable jobs, oldest schedule first.
    async fn claim_due(&self, now: Timestamp, limit: i64) -> AppResult<Vec<DeliveryJob>>;

    /// SENDING jobs claimed at or before `before`.
    async fn stale_sending(&self, before: Timestamp, limit: i64) -> AppResult<Vec<DeliveryJob>>;

    /// Applies `transition` if the job still has the status and attempt count
    /// it was computed from.
    async fn apply(&self, id: Uuid, transition: &Transition) -> AppResult<Option<DeliveryJob>>;
}

/// `DashMap`-backed store. Shard locks make each per-job update atomic.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: DashMap<Uuid, DeliveryJob>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: DeliveryJob) -> AppResult<DeliveryJob> {
        self.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn find(&self, id: Uuid) -> AppResult<Option<DeliveryJob>> {
        Ok(self.jobs.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list(&self, filter: &JobFilter) -> AppResult<Vec<DeliveryJob>> {
        let mut jobs: Vec<DeliveryJob> = self
            .jobs
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }

    async fn count_by_status(&self) -> AppResult<HashMap<DeliveryStatus, i64>> {
        let mut counts = HashMap::new();
        for entry in self.jobs.iter() {
            *counts.entry(entry.value().status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn claim(&self, id: Uuid, now: Timestamp) -> AppResult<Option<DeliveryJob>> {
        let Some(mut entry) = self.jobs.get_mut(&id) else {
            return Ok(None);
        };
        let job = entry.value_mut();
        match state::claim(job, now) {
            Ok(transition) => {
                transition.change.apply_to(job);
                Ok(Some(job.clone()))
            }
            Err(_) => Ok(None),
        }
    }

    async fn claim_due(&self, now: Timestamp, limit: i64) -> AppResult<Vec<DeliveryJob>> {
        // Collect candidates first; holding an iterator guard while taking
        // `get_mut` on the same shard would deadlock.
        let mut candidates: Vec<(Timestamp, Uuid)> = self
            .jobs
            .iter()
            .filter(|entry| state::is_claimable(entry.value(), now))
            .map(|entry| (entry.value().scheduled_for, *entry.key()))
            .collect();
        candidates.sort();

        let mut claimed = Vec::new();
        for (_, id) in candidates {
            if claimed.len() as i64 >= limit {
                break;
            }
            if let Some(job) = self.claim(id, now).await? {
                claimed.push(job);
            }
        }
        Ok(claimed)
    }

    async fn stale_sending(&self, before: Timestamp, limit: i64) -> AppResult<Vec<DeliveryJob>> {
        let mut stale: Vec<DeliveryJob> = self
            .jobs
            .iter()
            .filter(|entry| {
                let job = entry.value();
                job.status == DeliveryStatus::Sending
                    && job.claimed_at.is_none_or(|at| at <= before)
            })
            .map(|entry| entry.value().clone())
            .collect();
        stale.sort_by_key(|job| job.claimed_at);
        stale.truncate(limit.max(0) as usize);
        Ok(stale)
    }

    async fn apply(&self, id: Uuid, transition: &Transition) -> AppResult<Option<DeliveryJob>> {
        let Some(mut entry) = self.jobs.get_mut(&id) else {
            return Ok(None);
        };
        let job = entry.value_mut();
        if !transition.matches(job) {
            return Ok(None);
        }
        transition.change.apply_to(job);
        Ok(Some(job.clone()))
    }
}

/// In-process template registry.
#[derive(Debug, Default)]
pub struct MemoryTemplateStore {
    templates: DashMap<String, AuthorityTemplate>,
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_templates(templates: impl IntoIterator<Item = AuthorityTemplate>) -> Self {
        let store = Self::new();
        for template in templates {
            store.templates.insert(template.key.clone(), template);
        }
        store
    }
}

#[async_trait]
impl TemplateStore for MemoryTemplateStore {
    async fn find_by_key(&self, key: &str) -> AppResult<Option<AuthorityTemplate>> {
        Ok(self.templates.get(key).map(|entry| entry.value().clone()))
    }

    async fn list(&self) -> AppResult<Vec<AuthorityTemplate>> {
        let mut templates: Vec<AuthorityTemplate> =
            self.templates.iter().map(|entry| entry.value().clone()).collect();
        templates.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(templates)
    }

    async fn upsert(&self, template: AuthorityTemplate) -> AppResult<AuthorityTemplate> {
        self.templates.insert(template.key.clone(), template.clone());
        Ok(template)
    }
}
