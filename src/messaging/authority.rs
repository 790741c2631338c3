//! Authority-template (Kakao ATA) resolution.
//!
//! Resolution turns a template key plus caller variables into the exact
//! identifiers and content a transport needs, or a named rejection that is
//! recorded verbatim as the job's `last_error`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::render::{Variables, is_blank, render};
use crate::error::AppResult;
use crate::models::delivery::{AuthorityPayload, KakaoButton};

/// A provider-registered template as stored by operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorityTemplate {
    pub key: String,
    pub channel_id: String,
    pub provider_template_id: String,
    /// Declared order is preserved in `MISSING_VARS` reports
    pub required_variables: Vec<String>,
    pub enable_sms_fallback: bool,
    pub strict_variables: bool,
    pub fallback_body: Option<String>,
    /// Approved template content with placeholders
    pub content: String,
    pub buttons: Vec<KakaoButton>,
}

/// Registered templates, keyed by [`AuthorityTemplate::key`].
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn find_by_key(&self, key: &str) -> AppResult<Option<AuthorityTemplate>>;

    /// All templates ordered by key.
    async fn list(&self) -> AppResult<Vec<AuthorityTemplate>>;

    /// Inserts or replaces the template with the same key.
    async fn upsert(&self, template: AuthorityTemplate) -> AppResult<AuthorityTemplate>;
}

/// Everything a transport needs for one authority send.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedAuthority {
    pub channel_id: String,
    pub provider_template_id: String,
    pub variables: Variables,
    pub buttons: Vec<KakaoButton>,
    /// Plain-text body used by the provider when it falls back to SMS/LMS
    pub fallback_text: Option<String>,
    /// Template content with variables substituted
    pub rendered_content: String,
    pub disable_sms_fallback: bool,
}

/// Named rejection reasons. `Display` yields the operator-facing code.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("TEMPLATE_NOT_FOUND")]
    TemplateNotFound { key: String },
    #[error("MISSING_VARS:{}", .missing.join(","))]
    MissingVariables { missing: Vec<String> },
    #[error("KAKAO_PF_OR_TEMPLATE_MISSING")]
    IdentifiersMissing,
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn non_empty_opt(value: Option<&String>) -> Option<String> {
    value.and_then(|v| non_empty(v))
}

/// The caller's fallback override, rendered with the request variables.
fn fallback_override(request: &AuthorityPayload) -> Option<String> {
    request
        .fallback_text
        .as_deref()
        .and_then(|t| non_empty(&render(t, &request.variables)))
}

/// Pure resolution step. `template` is the looked-up template, or `None`
/// when the request carries no key (manual override path) or the key was
/// not found.
pub fn resolve_template(
    template: Option<&AuthorityTemplate>,
    request: &AuthorityPayload,
) -> Result<ResolvedAuthority, ResolveError> {
    let Some(key) = request.template_key.as_deref().and_then(non_empty) else {
        return resolve_manual(request);
    };
    let template = template.ok_or(ResolveError::TemplateNotFound { key })?;

    let buttons = match &request.buttons {
        Some(overrides) if !overrides.is_empty() => overrides.clone(),
        _ => template.buttons.clone(),
    };

    let rendered_content = render(&template.content, &request.variables);
    let fallback_text = fallback_override(request).or_else(|| {
        let source = template
            .fallback_body
            .as_deref()
            .filter(|b| !b.trim().is_empty())
            .unwrap_or(&template.content);
        non_empty(&render(source, &request.variables))
    });

    let disable_sms_fallback = !template.enable_sms_fallback || request.disable_sms_fallback;

    let strict = request.strict.unwrap_or(template.strict_variables);
    if strict {
        let missing: Vec<String> = template
            .required_variables
            .iter()
            .filter(|name| is_blank(request.variables.get(name.as_str())))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(ResolveError::MissingVariables { missing });
        }
    }

    let channel_id = non_empty(&template.channel_id)
        .or_else(|| non_empty_opt(request.channel_id.as_ref()))
        .ok_or(ResolveError::IdentifiersMissing)?;
    let provider_template_id = non_empty(&template.provider_template_id)
        .or_else(|| non_empty_opt(request.provider_template_id.as_ref()))
        .ok_or(ResolveError::IdentifiersMissing)?;

    Ok(ResolvedAuthority {
        channel_id,
        provider_template_id,
        variables: request.variables.clone(),
        buttons,
        fallback_text,
        rendered_content,
        disable_sms_fallback,
    })
}

fn resolve_manual(request: &AuthorityPayload) -> Result<ResolvedAuthority, ResolveError> {
    let channel_id =
        non_empty_opt(request.channel_id.as_ref()).ok_or(ResolveError::IdentifiersMissing)?;
    let provider_template_id = non_empty_opt(request.provider_template_id.as_ref())
        .ok_or(ResolveError::IdentifiersMissing)?;
    let fallback_text = fallback_override(request);

    Ok(ResolvedAuthority {
        channel_id,
        provider_template_id,
        variables: request.variables.clone(),
        buttons: request.buttons.clone().unwrap_or_default(),
        rendered_content: fallback_text.clone().unwrap_or_default(),
        fallback_text,
        disable_sms_fallback: request.disable_sms_fallback,
    })
}

/// Outcome of an async resolution: a store failure is an infrastructure
/// error, a rejection is a property of the job.
pub type Resolution = Result<ResolvedAuthority, ResolveError>;

/// Looks templates up in a [`TemplateStore`] and resolves them.
#[derive(Clone)]
pub struct AuthorityResolver {
    store: Arc<dyn TemplateStore>,
}

impl AuthorityResolver {
    pub fn new(store: Arc<dyn TemplateStore>) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, request: &AuthorityPayload) -> AppResult<Resolution> {
        let template = match request.template_key.as_deref().and_then(non_empty) {
            Some(key) => self.store.find_by_key(&key).await?,
            None => None,
        };
        Ok(resolve_template(template.as_ref(), request))
    }
}
