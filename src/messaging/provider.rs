//! Transport provider abstraction.
//!
//! Exactly one transport is active per deployment. Every implementation
//! exposes the same three operations (send text, send authority message,
//! interpret a raw reply) and reports outcomes as a [`SendResult`]; no
//! transport error crosses this boundary as an `Err` the caller must
//! handle specially.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::authority::ResolvedAuthority;
use super::phone::MessageKind;

/// Which transport implementation is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Timestamped HMAC-signed JSON REST API
    #[default]
    HmacRest,
    /// Static key/secret form-encoded API
    FormKey,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::HmacRest => "hmac_rest",
            ProviderKind::FormKey => "form_key",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A plain SMS/LMS ready for transmission (footer already applied).
#[derive(Debug, Clone, PartialEq)]
pub struct TextMessage {
    pub to: String,
    pub text: String,
    pub kind: MessageKind,
    pub subject: Option<String>,
}

/// An authority-template message ready for transmission.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorityMessage {
    pub to: String,
    pub authority: ResolvedAuthority,
}

/// Raw HTTP reply handed to [`TransportProvider::interpret`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportReply {
    pub status: u16,
    pub body: String,
}

/// Failures that happen before a reply exists.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("PROVIDER_TIMEOUT")]
    Timeout,
    #[error("NETWORK_ERROR: {0}")]
    Network(String),
    #[error("REQUEST_BUILD_ERROR: {0}")]
    Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Network(error.to_string())
        }
    }
}

/// Why a send did not succeed; drives retry scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Rejected before any provider was contacted
    Validation,
    /// HTTP failure, provider soft failure or network error
    Transport,
    Timeout,
}

/// Uniform outcome of one send.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendResult {
    pub ok: bool,
    pub provider: String,
    pub message_id: Option<String>,
    pub error: Option<String>,
    pub failure: Option<FailureKind>,
    pub status_code: Option<u16>,
    pub duration_ms: u64,
}

impl SendResult {
    pub fn success(provider: impl Into<String>, message_id: Option<String>) -> Self {
        Self {
            ok: true,
            provider: provider.into(),
            message_id,
            error: None,
            failure: None,
            status_code: None,
            duration_ms: 0,
        }
    }

    pub fn failure(
        provider: impl Into<String>,
        kind: FailureKind,
        error: impl Into<String>,
    ) -> Self {
        Self {
            ok: false,
            provider: provider.into(),
            message_id: None,
            error: Some(error.into()),
            failure: Some(kind),
            status_code: None,
            duration_ms: 0,
        }
    }

    pub fn from_transport_error(provider: impl Into<String>, error: &TransportError) -> Self {
        let kind = match error {
            TransportError::Timeout => FailureKind::Timeout,
            TransportError::Network(_) | TransportError::Request(_) => FailureKind::Transport,
        };
        Self::failure(provider, kind, error.to_string())
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Validation failures are deterministic and never retried automatically.
    pub fn retryable(&self) -> bool {
        !self.ok && !matches!(self.failure, Some(FailureKind::Validation))
    }
}

/// A delivery transport. Implementations must be cheap to share across
/// worker tasks.
#[async_trait]
pub trait TransportProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Sends a plain SMS/LMS from `from`.
    async fn send_text(&self, from: &str, message: &TextMessage) -> SendResult;

    /// Sends an authority-template message from `from`.
    async fn send_authority(&self, from: &str, message: &AuthorityMessage) -> SendResult;

    /// Maps a raw provider reply to the uniform result.
    fn interpret(&self, reply: &TransportReply) -> SendResult;
}

/// Extracts a string from a JSON field that may be a string or a number.
pub(crate) fn json_text(value: Option<&serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
