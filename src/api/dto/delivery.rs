//! Delivery queue DTOs for API requests and responses.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::messaging::phone::{MessageKind, classify};
use crate::messaging::render::Variables;
use crate::models::delivery::{
    AuthorityPayload, DeliveryJob, DeliveryStatus, FreeTextPayload, JobPayload, KakaoButton,
    NewDeliveryJob,
};
use crate::queue::JobFilter;

// ============================================================================
// Request DTOs
// ============================================================================

/// Request body for enqueueing a delivery.
///
/// Supply either `body` (free text) or `template_key` and/or
/// `channel_id` + `provider_template_id` (authority template), not both.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[schema(example = json!({
    "recipient_phone": "010-1234-5678",
    "recipient_name": "Kim",
    "template_key": "measure_done",
    "variables": {"name": "Kim", "date": "5/1"},
    "campaign_key": "spring-2026"
}))]
pub struct EnqueueRequest {
    #[validate(length(min = 1, max = 32, message = "Recipient phone must be between 1 and 32 characters"))]
    #[schema(example = "010-1234-5678")]
    pub recipient_phone: String,

    #[validate(length(max = 100, message = "Recipient name must be at most 100 characters"))]
    pub recipient_name: Option<String>,

    /// Forces SMS or LMS; classified from the body length when absent
    pub channel_type: Option<MessageKind>,

    #[validate(length(max = 2000, message = "Body must be at most 2000 characters"))]
    pub body: Option<String>,

    #[validate(length(max = 40, message = "Subject must be at most 40 characters"))]
    pub subject: Option<String>,

    #[validate(length(min = 1, max = 100, message = "Template key must be between 1 and 100 characters"))]
    pub template_key: Option<String>,

    #[serde(default)]
    #[schema(value_type = Object)]
    pub variables: Variables,

    pub buttons: Option<Vec<KakaoButton>>,

    pub channel_id: Option<String>,

    pub provider_template_id: Option<String>,

    pub fallback_text: Option<String>,

    #[serde(default)]
    pub disable_sms_fallback: bool,

    /// Overrides the template's strict-variable setting
    pub strict: Option<bool>,

    /// RFC 3339; the job is not claimable before this instant
    #[schema(value_type = Option<String>, format = DateTime, example = "2026-03-02T09:00:00Z")]
    pub scheduled_for: Option<Timestamp>,

    #[validate(range(min = 1, max = 20, message = "Max attempts must be between 1 and 20"))]
    pub max_attempts: Option<i32>,

    pub campaign_key: Option<String>,

    pub trigger_key: Option<String>,
}

impl EnqueueRequest {
    fn is_authority(&self) -> bool {
        self.template_key.is_some()
            || self.channel_id.is_some()
            || self.provider_template_id.is_some()
    }

    /// Picks the payload variant from the fields present.
    pub fn into_new_job(self) -> AppResult<NewDeliveryJob> {
        let payload = match (self.is_authority(), self.body) {
            (true, Some(_)) => {
                return Err(AppError::bad_request(
                    "A delivery carries either a free-text body or an authority template, not both",
                ));
            }
            (true, None) => JobPayload::Authority(AuthorityPayload {
                template_key: self.template_key,
                variables: self.variables,
                buttons: self.buttons,
                channel_id: self.channel_id,
                provider_template_id: self.provider_template_id,
                fallback_text: self.fallback_text,
                disable_sms_fallback: self.disable_sms_fallback,
                strict: self.strict,
            }),
            (false, Some(body)) => JobPayload::FreeText(FreeTextPayload {
                channel: self.channel_type.unwrap_or_else(|| classify(&body)),
                body,
                subject: self.subject,
            }),
            (false, None) => {
                return Err(AppError::validation(
                    "body",
                    "Either a body or a template key is required",
                ));
            }
        };

        Ok(NewDeliveryJob {
            recipient_phone: self.recipient_phone,
            recipient_name: self.recipient_name,
            payload,
            scheduled_for: self.scheduled_for,
            max_attempts: self.max_attempts,
            campaign_key: self.campaign_key,
            trigger_key: self.trigger_key,
        })
    }
}

/// Query parameters for listing deliveries.
#[derive(Debug, Deserialize, IntoParams, Validate)]
#[into_params(parameter_in = Query)]
pub struct ListDeliveriesQuery {
    /// Only jobs in this status
    pub status: Option<DeliveryStatus>,

    /// Substring of phone, name, campaign key or trigger key
    #[validate(length(max = 100, message = "Search term must be at most 100 characters"))]
    pub search: Option<String>,

    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 500, message = "Limit must be between 1 and 500"))]
    #[param(minimum = 1, maximum = 500, example = 50)]
    pub limit: i64,

    #[serde(default)]
    #[validate(range(min = 0, message = "Offset must not be negative"))]
    #[param(minimum = 0, example = 0)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

impl From<ListDeliveriesQuery> for JobFilter {
    fn from(query: ListDeliveriesQuery) -> Self {
        Self {
            status: query.status,
            search: query.search,
            limit: query.limit,
            offset: query.offset,
        }
    }
}

/// Body for force-fail and skip.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ReasonRequest {
    #[validate(length(min = 1, max = 500, message = "Reason must be between 1 and 500 characters"))]
    #[schema(example = "customer asked not to be contacted")]
    pub reason: String,
}

// ============================================================================
// Response DTOs
// ============================================================================

/// A delivery job as shown in the operator queue view.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeliveryJobResponse {
    pub id: Uuid,
    pub status: DeliveryStatus,
    pub recipient_phone: String,
    pub recipient_phone_normalized: String,
    pub recipient_name: Option<String>,
    pub payload: JobPayload,
    pub attempts: i32,
    pub max_attempts: i32,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub next_retry_at: Option<Timestamp>,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub claimed_at: Option<Timestamp>,
    /// Verbatim failure code or message from the last attempt
    pub last_error: Option<String>,
    pub provider: Option<String>,
    pub provider_message_id: Option<String>,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub sent_at: Option<Timestamp>,
    pub campaign_key: Option<String>,
    pub trigger_key: Option<String>,
    #[schema(value_type = String, format = DateTime)]
    pub scheduled_for: Timestamp,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: Timestamp,
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: Timestamp,
}

impl From<DeliveryJob> for DeliveryJobResponse {
    fn from(job: DeliveryJob) -> Self {
        Self {
            id: job.id,
            status: job.status,
            recipient_phone: job.recipient_phone,
            recipient_phone_normalized: job.recipient_phone_normalized,
            recipient_name: job.recipient_name,
            payload: job.payload,
            attempts: job.attempts,
            max_attempts: job.max_attempts,
            next_retry_at: job.next_retry_at,
            claimed_at: job.claimed_at,
            last_error: job.last_error,
            provider: job.provider,
            provider_message_id: job.provider_message_id,
            sent_at: job.sent_at,
            campaign_key: job.campaign_key,
            trigger_key: job.trigger_key,
            scheduled_for: job.scheduled_for,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> EnqueueRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_free_text_is_classified_by_length() {
        let job = parse(json!({"recipient_phone": "01012345678", "body": "short"}))
            .into_new_job()
            .unwrap();
        match job.payload {
            JobPayload::FreeText(p) => assert_eq!(p.channel, MessageKind::Sms),
            other => panic!("expected free text, got {:?}", other),
        }

        let job = parse(json!({"recipient_phone": "01012345678", "body": "x".repeat(81)}))
            .into_new_job()
            .unwrap();
        assert!(matches!(job.payload, JobPayload::FreeText(ref p) if p.channel == MessageKind::Lms));
    }

    #[test]
    fn test_explicit_channel_type_wins() {
        let job = parse(json!({
            "recipient_phone": "01012345678",
            "body": "short",
            "channel_type": "LMS",
            "subject": "Notice"
        }))
        .into_new_job()
        .unwrap();
        match job.payload {
            JobPayload::FreeText(p) => {
                assert_eq!(p.channel, MessageKind::Lms);
                assert_eq!(p.subject.as_deref(), Some("Notice"));
            }
            other => panic!("expected free text, got {:?}", other),
        }
    }

    #[test]
    fn test_template_request_becomes_authority_payload() {
        let job = parse(json!({
            "recipient_phone": "010-1234-5678",
            "template_key": "measure_done",
            "variables": {"name": "Kim"},
            "scheduled_for": "2026-03-02T09:00:00Z",
            "max_attempts": 5
        }))
        .into_new_job()
        .unwrap();
        assert_eq!(job.payload.template_key(), Some("measure_done"));
        assert_eq!(job.max_attempts, Some(5));
        assert_eq!(
            job.scheduled_for,
            Some("2026-03-02T09:00:00Z".parse::<Timestamp>().unwrap())
        );
    }

    #[test]
    fn test_body_and_template_conflict() {
        let err = parse(json!({
            "recipient_phone": "01012345678",
            "body": "hello",
            "template_key": "welcome"
        }))
        .into_new_job()
        .unwrap_err();
        assert_eq!(err.code(), "BAD_REQUEST");

        let err = parse(json!({"recipient_phone": "01012345678"}))
            .into_new_job()
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "body"));
    }

    #[test]
    fn test_list_query_defaults() {
        let query: ListDeliveriesQuery =
            serde_json::from_value(json!({"status": "FAILED"})).unwrap();
        assert!(query.validate().is_ok());
        let filter = JobFilter::from(query);
        assert_eq!(filter.status, Some(DeliveryStatus::Failed));
        assert_eq!(filter.limit, 50);
        assert_eq!(filter.offset, 0);
    }

    #[test]
    fn test_response_serializes_timestamps_as_strings() {
        let job = NewDeliveryJob {
            recipient_phone: "01012345678".to_string(),
            recipient_name: None,
            payload: JobPayload::FreeText(FreeTextPayload {
                channel: MessageKind::Sms,
                body: "hi".to_string(),
                subject: None,
            }),
            scheduled_for: None,
            max_attempts: None,
            campaign_key: None,
            trigger_key: None,
        }
        .into_job("2026-03-02T00:00:00Z".parse().unwrap(), 3);
        let body = serde_json::to_value(DeliveryJobResponse::from(job)).unwrap();
        assert_eq!(body["status"], "READY");
        assert_eq!(body["created_at"], "2026-03-02T00:00:00Z");
        assert_eq!(body["payload"]["kind"], "free_text");
        assert!(body["sent_at"].is_null());
    }
}
