//! Persisted authority-template rows.

use diesel::prelude::*;
use jiff::Timestamp;
use jiff_diesel::ToDiesel;
use serde_json::Value as JsonValue;

use crate::error::{AppError, AppResult};
use crate::messaging::authority::AuthorityTemplate;
use crate::models::delivery::KakaoButton;

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::authority_templates)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AuthorityTemplateRow {
    pub template_key: String,
    pub channel_id: String,
    pub provider_template_id: String,
    pub required_variables: Vec<String>,
    pub enable_sms_fallback: bool,
    pub strict_variables: bool,
    pub fallback_body: Option<String>,
    pub content: String,
    pub buttons: JsonValue,
    pub created_at: jiff_diesel::Timestamp,
    pub updated_at: jiff_diesel::Timestamp,
}

impl AuthorityTemplateRow {
    pub fn from_template(template: &AuthorityTemplate, now: Timestamp) -> AppResult<Self> {
        let buttons = serde_json::to_value(&template.buttons).map_err(|e| AppError::Internal {
            source: anyhow::Error::from(e).context("serialize template buttons"),
        })?;
        Ok(Self {
            template_key: template.key.clone(),
            channel_id: template.channel_id.clone(),
            provider_template_id: template.provider_template_id.clone(),
            required_variables: template.required_variables.clone(),
            enable_sms_fallback: template.enable_sms_fallback,
            strict_variables: template.strict_variables,
            fallback_body: template.fallback_body.clone(),
            content: template.content.clone(),
            buttons,
            created_at: now.to_diesel(),
            updated_at: now.to_diesel(),
        })
    }

    pub fn into_template(self) -> AppResult<AuthorityTemplate> {
        let buttons: Vec<KakaoButton> =
            serde_json::from_value(self.buttons).map_err(|e| AppError::Internal {
                source: anyhow::Error::from(e)
                    .context(format!("decode buttons of template {}", self.template_key)),
            })?;
        Ok(AuthorityTemplate {
            key: self.template_key,
            channel_id: self.channel_id,
            provider_template_id: self.provider_template_id,
            required_variables: self.required_variables,
            enable_sms_fallback: self.enable_sms_fallback,
            strict_variables: self.strict_variables,
            fallback_body: self.fallback_body,
            content: self.content,
            buttons,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_conversion_keeps_buttons_and_variable_order() {
        let template = AuthorityTemplate {
            key: "measure_done".to_string(),
            channel_id: "@door".to_string(),
            provider_template_id: "TP_001".to_string(),
            required_variables: vec!["name".to_string(), "date".to_string()],
            enable_sms_fallback: true,
            strict_variables: false,
            fallback_body: Some("#{name}님 실측 완료".to_string()),
            content: "#{name}님, #{date} 실측이 완료되었습니다.".to_string(),
            buttons: vec![KakaoButton {
                name: "확인".to_string(),
                kind: "WL".to_string(),
                link_mobile: Some("https://m.example.com".to_string()),
                link_pc: None,
                link_android: None,
                link_ios: None,
            }],
        };

        let row = AuthorityTemplateRow::from_template(&template, Timestamp::UNIX_EPOCH).unwrap();
        assert_eq!(row.buttons[0]["type"], "WL");
        assert_eq!(row.into_template().unwrap(), template);
    }

    #[test]
    fn test_malformed_buttons_are_internal_errors() {
        let row = AuthorityTemplateRow {
            template_key: "broken".to_string(),
            channel_id: "@door".to_string(),
            provider_template_id: "TP".to_string(),
            required_variables: Vec::new(),
            enable_sms_fallback: false,
            strict_variables: false,
            fallback_body: None,
            content: String::new(),
            buttons: serde_json::json!({"not": "a list"}),
            created_at: Timestamp::UNIX_EPOCH.to_diesel(),
            updated_at: Timestamp::UNIX_EPOCH.to_diesel(),
        };
        assert!(matches!(row.into_template(), Err(AppError::Internal { .. })));
    }
}
