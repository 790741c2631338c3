//! Authority template DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::messaging::authority::{AuthorityTemplate, Resolution, ResolvedAuthority};
use crate::messaging::render::Variables;
use crate::models::delivery::{AuthorityPayload, KakaoButton};

/// Request body for registering or replacing a template under a key.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[schema(example = json!({
    "channel_id": "@door-co",
    "provider_template_id": "TPL_001",
    "required_variables": ["name", "date"],
    "content": "#{name}님, #{date} 실측이 완료되었습니다."
}))]
pub struct TemplateRequest {
    #[validate(length(min = 1, max = 100, message = "Channel id must be between 1 and 100 characters"))]
    pub channel_id: String,

    #[validate(length(min = 1, max = 100, message = "Provider template id must be between 1 and 100 characters"))]
    pub provider_template_id: String,

    /// Order is kept in MISSING_VARS reports
    #[serde(default)]
    pub required_variables: Vec<String>,

    #[serde(default = "default_true")]
    pub enable_sms_fallback: bool,

    #[serde(default = "default_true")]
    pub strict_variables: bool,

    pub fallback_body: Option<String>,

    #[validate(length(min = 1, max = 1000, message = "Content must be between 1 and 1000 characters"))]
    pub content: String,

    #[serde(default)]
    pub buttons: Vec<KakaoButton>,
}

fn default_true() -> bool {
    true
}

impl TemplateRequest {
    pub fn into_template(self, key: String) -> AuthorityTemplate {
        AuthorityTemplate {
            key,
            channel_id: self.channel_id,
            provider_template_id: self.provider_template_id,
            required_variables: self.required_variables,
            enable_sms_fallback: self.enable_sms_fallback,
            strict_variables: self.strict_variables,
            fallback_body: self.fallback_body,
            content: self.content,
            buttons: self.buttons,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TemplateResponse {
    pub key: String,
    pub channel_id: String,
    pub provider_template_id: String,
    pub required_variables: Vec<String>,
    pub enable_sms_fallback: bool,
    pub strict_variables: bool,
    pub fallback_body: Option<String>,
    pub content: String,
    pub buttons: Vec<KakaoButton>,
}

impl From<AuthorityTemplate> for TemplateResponse {
    fn from(t: AuthorityTemplate) -> Self {
        Self {
            key: t.key,
            channel_id: t.channel_id,
            provider_template_id: t.provider_template_id,
            required_variables: t.required_variables,
            enable_sms_fallback: t.enable_sms_fallback,
            strict_variables: t.strict_variables,
            fallback_body: t.fallback_body,
            content: t.content,
            buttons: t.buttons,
        }
    }
}

/// Variables and overrides to resolve a template against without sending.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct PreviewRequest {
    #[serde(default)]
    #[schema(value_type = Object)]
    pub variables: Variables,
    pub buttons: Option<Vec<KakaoButton>>,
    pub fallback_text: Option<String>,
    #[serde(default)]
    pub disable_sms_fallback: bool,
    pub strict: Option<bool>,
}

impl From<PreviewRequest> for AuthorityPayload {
    fn from(req: PreviewRequest) -> Self {
        AuthorityPayload {
            template_key: None,
            variables: req.variables,
            buttons: req.buttons,
            channel_id: None,
            provider_template_id: None,
            fallback_text: req.fallback_text,
            disable_sms_fallback: req.disable_sms_fallback,
            strict: req.strict,
        }
    }
}

/// Result of a dry-run resolution. `error` carries the same code a
/// dispatch pass would record as `last_error`.
#[derive(Debug, Serialize, ToSchema)]
pub struct PreviewResponse {
    pub ok: bool,
    #[schema(example = "MISSING_VARS:name,date")]
    pub error: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub resolved: Option<ResolvedAuthority>,
}

impl From<Resolution> for PreviewResponse {
    fn from(resolution: Resolution) -> Self {
        match resolution {
            Ok(resolved) => Self {
                ok: true,
                error: None,
                resolved: Some(resolved),
            },
            Err(rejection) => Self {
                ok: false,
                error: Some(rejection.to_string()),
                resolved: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::authority::ResolveError;
    use serde_json::json;

    #[test]
    fn test_template_request_defaults() {
        let req: TemplateRequest = serde_json::from_value(json!({
            "channel_id": "@door",
            "provider_template_id": "TPL",
            "content": "hello #{name}"
        }))
        .unwrap();
        assert!(req.validate().is_ok());
        let template = req.into_template("welcome".to_string());
        assert_eq!(template.key, "welcome");
        assert!(template.enable_sms_fallback);
        assert!(template.strict_variables);
        assert!(template.required_variables.is_empty());
    }

    #[test]
    fn test_template_request_rejects_empty_content() {
        let req: TemplateRequest = serde_json::from_value(json!({
            "channel_id": "@door",
            "provider_template_id": "TPL",
            "content": ""
        }))
        .unwrap();
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("content"));
    }

    #[test]
    fn test_preview_response_from_rejection() {
        let response = PreviewResponse::from(Err(ResolveError::MissingVariables {
            missing: vec!["name".to_string(), "date".to_string()],
        }));
        assert!(!response.ok);
        assert_eq!(response.error.as_deref(), Some("MISSING_VARS:name,date"));
        assert!(response.resolved.is_none());
    }
}
