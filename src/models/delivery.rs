//! Delivery job model.
//!
//! `DeliveryJob` is the domain record the queue works with. The diesel row
//! types below it mirror the `delivery_jobs` table and convert at the
//! repository boundary.

use diesel::prelude::*;
use diesel_derive_enum::DbEnum;
use jiff::Timestamp;
use jiff_diesel::ToDiesel;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::messaging::phone::{MessageKind, normalize_phone};
use crate::messaging::render::Variables;

// ============================================================================
// Status
// ============================================================================

/// Lifecycle state of a delivery job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, DbEnum, ToSchema)]
#[db_enum(existing_type_path = "crate::schema::sql_types::DeliveryStatus")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Ready,
    Sending,
    Sent,
    Failed,
    Skipped,
}

impl DeliveryStatus {
    pub const ALL: [DeliveryStatus; 5] = [
        DeliveryStatus::Ready,
        DeliveryStatus::Sending,
        DeliveryStatus::Sent,
        DeliveryStatus::Failed,
        DeliveryStatus::Skipped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Ready => "READY",
            DeliveryStatus::Sending => "SENDING",
            DeliveryStatus::Sent => "SENT",
            DeliveryStatus::Failed => "FAILED",
            DeliveryStatus::Skipped => "SKIPPED",
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Payload
// ============================================================================

/// Button attached to an authority-template message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct KakaoButton {
    /// Label shown on the button
    pub name: String,
    /// Provider button type code, e.g. `WL` (web link) or `AL` (app link)
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_mobile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_pc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_android: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_ios: Option<String>,
}

/// Plain SMS/LMS content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FreeTextPayload {
    pub channel: MessageKind,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

/// Authority-template content, resolved at dispatch time.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct AuthorityPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_key: Option<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub variables: Variables,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buttons: Option<Vec<KakaoButton>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_template_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_text: Option<String>,
    #[serde(default)]
    pub disable_sms_fallback: bool,
    /// Overrides the template's strict-variable default when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

/// What a job sends. Stored as JSONB with a `kind` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    FreeText(FreeTextPayload),
    Authority(AuthorityPayload),
}

impl JobPayload {
    pub fn is_authority(&self) -> bool {
        matches!(self, JobPayload::Authority(_))
    }

    pub fn template_key(&self) -> Option<&str> {
        match self {
            JobPayload::Authority(p) => p.template_key.as_deref(),
            JobPayload::FreeText(_) => None,
        }
    }
}

// ============================================================================
// Domain record
// ============================================================================

/// The durable unit of work tracked by the delivery queue.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryJob {
    pub id: Uuid,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub scheduled_for: Timestamp,
    pub recipient_phone: String,
    pub recipient_phone_normalized: String,
    pub recipient_name: Option<String>,
    pub payload: JobPayload,
    pub status: DeliveryStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub next_retry_at: Option<Timestamp>,
    pub claimed_at: Option<Timestamp>,
    pub last_error: Option<String>,
    pub provider: Option<String>,
    pub provider_message_id: Option<String>,
    pub sent_at: Option<Timestamp>,
    pub campaign_key: Option<String>,
    pub trigger_key: Option<String>,
}

/// Enqueue input. Becomes a READY `DeliveryJob` via [`NewDeliveryJob::into_job`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewDeliveryJob {
    pub recipient_phone: String,
    pub recipient_name: Option<String>,
    pub payload: JobPayload,
    pub scheduled_for: Option<Timestamp>,
    pub max_attempts: Option<i32>,
    pub campaign_key: Option<String>,
    pub trigger_key: Option<String>,
}

impl NewDeliveryJob {
    pub fn into_job(self, now: Timestamp, default_max_attempts: i32) -> DeliveryJob {
        DeliveryJob {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            scheduled_for: self.scheduled_for.unwrap_or(now),
            recipient_phone_normalized: normalize_phone(&self.recipient_phone),
            recipient_phone: self.recipient_phone,
            recipient_name: self.recipient_name,
            payload: self.payload,
            status: DeliveryStatus::Ready,
            attempts: 0,
            max_attempts: self.max_attempts.unwrap_or(default_max_attempts),
            next_retry_at: None,
            claimed_at: None,
            last_error: None,
            provider: None,
            provider_message_id: None,
            sent_at: None,
            campaign_key: self.campaign_key,
            trigger_key: self.trigger_key,
        }
    }
}

/// A partial update produced by a state transition.
///
/// Outer `None` leaves a field untouched; `Some(None)` clears it.
#[derive(Debug, Clone, PartialEq)]
pub struct JobChange {
    pub status: DeliveryStatus,
    pub updated_at: Timestamp,
    pub attempts: Option<i32>,
    pub next_retry_at: Option<Option<Timestamp>>,
    pub claimed_at: Option<Option<Timestamp>>,
    pub last_error: Option<Option<String>>,
    pub provider: Option<Option<String>>,
    pub provider_message_id: Option<Option<String>>,
    pub sent_at: Option<Option<Timestamp>>,
}

impl JobChange {
    pub fn to(status: DeliveryStatus, now: Timestamp) -> Self {
        Self {
            status,
            updated_at: now,
            attempts: None,
            next_retry_at: None,
            claimed_at: None,
            last_error: None,
            provider: None,
            provider_message_id: None,
            sent_at: None,
        }
    }

    pub fn apply_to(&self, job: &mut DeliveryJob) {
        job.status = self.status;
        job.updated_at = self.updated_at;
        if let Some(attempts) = self.attempts {
            job.attempts = attempts;
        }
        if let Some(v) = self.next_retry_at {
            job.next_retry_at = v;
        }
        if let Some(v) = self.claimed_at {
            job.claimed_at = v;
        }
        if let Some(v) = &self.last_error {
            job.last_error = v.clone();
        }
        if let Some(v) = &self.provider {
            job.provider = v.clone();
        }
        if let Some(v) = &self.provider_message_id {
            job.provider_message_id = v.clone();
        }
        if let Some(v) = self.sent_at {
            job.sent_at = v;
        }
    }
}

// ============================================================================
// Diesel rows
// ============================================================================

/// Row shape of `delivery_jobs`, used for SELECT, RETURNING and raw SQL.
#[derive(Debug, Clone, Queryable, Selectable, QueryableByName, Insertable)]
#[diesel(table_name = crate::schema::delivery_jobs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DeliveryJobRow {
    pub id: Uuid,
    pub created_at: jiff_diesel::Timestamp,
    pub updated_at: jiff_diesel::Timestamp,
    pub scheduled_for: jiff_diesel::Timestamp,
    pub recipient_phone: String,
    pub recipient_phone_normalized: String,
    pub recipient_name: Option<String>,
    pub payload: JsonValue,
    pub status: DeliveryStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub next_retry_at: Option<jiff_diesel::Timestamp>,
    pub claimed_at: Option<jiff_diesel::Timestamp>,
    pub last_error: Option<String>,
    pub provider: Option<String>,
    pub provider_message_id: Option<String>,
    pub sent_at: Option<jiff_diesel::Timestamp>,
    pub campaign_key: Option<String>,
    pub trigger_key: Option<String>,
}

impl DeliveryJobRow {
    pub fn from_job(job: &DeliveryJob) -> AppResult<Self> {
        let payload = serde_json::to_value(&job.payload).map_err(|e| AppError::Internal {
            source: anyhow::Error::from(e).context("serialize delivery payload"),
        })?;
        Ok(Self {
            id: job.id,
            created_at: job.created_at.to_diesel(),
            updated_at: job.updated_at.to_diesel(),
            scheduled_for: job.scheduled_for.to_diesel(),
            recipient_phone: job.recipient_phone.clone(),
            recipient_phone_normalized: job.recipient_phone_normalized.clone(),
            recipient_name: job.recipient_name.clone(),
            payload,
            status: job.status,
            attempts: job.attempts,
            max_attempts: job.max_attempts,
            next_retry_at: job.next_retry_at.map(|t| t.to_diesel()),
            claimed_at: job.claimed_at.map(|t| t.to_diesel()),
            last_error: job.last_error.clone(),
            provider: job.provider.clone(),
            provider_message_id: job.provider_message_id.clone(),
            sent_at: job.sent_at.map(|t| t.to_diesel()),
            campaign_key: job.campaign_key.clone(),
            trigger_key: job.trigger_key.clone(),
        })
    }

    pub fn into_job(self) -> AppResult<DeliveryJob> {
        let payload: JobPayload =
            serde_json::from_value(self.payload).map_err(|e| AppError::Internal {
                source: anyhow::Error::from(e)
                    .context(format!("decode payload of delivery job {}", self.id)),
            })?;
        Ok(DeliveryJob {
            id: self.id,
            created_at: self.created_at.to_jiff(),
            updated_at: self.updated_at.to_jiff(),
            scheduled_for: self.scheduled_for.to_jiff(),
            recipient_phone: self.recipient_phone,
            recipient_phone_normalized: self.recipient_phone_normalized,
            recipient_name: self.recipient_name,
            payload,
            status: self.status,
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            next_retry_at: self.next_retry_at.map(|t| t.to_jiff()),
            claimed_at: self.claimed_at.map(|t| t.to_jiff()),
            last_error: self.last_error,
            provider: self.provider,
            provider_message_id: self.provider_message_id,
            sent_at: self.sent_at.map(|t| t.to_jiff()),
            campaign_key: self.campaign_key,
            trigger_key: self.trigger_key,
        })
    }
}

/// Changeset for a single transition.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = crate::schema::delivery_jobs)]
pub struct DeliveryJobChangeset {
    pub status: DeliveryStatus,
    pub updated_at: jiff_diesel::Timestamp,
    pub attempts: Option<i32>,
    pub next_retry_at: Option<Option<jiff_diesel::Timestamp>>,
    pub claimed_at: Option<Option<jiff_diesel::Timestamp>>,
    pub last_error: Option<Option<String>>,
    pub provider: Option<Option<String>>,
    pub provider_message_id: Option<Option<String>>,
    pub sent_at: Option<Option<jiff_diesel::Timestamp>>,
}

impl From<&JobChange> for DeliveryJobChangeset {
    fn from(change: &JobChange) -> Self {
        Self {
            status: change.status,
            updated_at: change.updated_at.to_diesel(),
            attempts: change.attempts,
            next_retry_at: change.next_retry_at.map(|o| o.map(|t| t.to_diesel())),
            claimed_at: change.claimed_at.map(|o| o.map(|t| t.to_diesel())),
            last_error: change.last_error.clone(),
            provider: change.provider.clone(),
            provider_message_id: change.provider_message_id.clone(),
            sent_at: change.sent_at.map(|o| o.map(|t| t.to_diesel())),
        }
    }
}
