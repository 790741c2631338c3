//! Provider dispatcher.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::authority::ResolvedAuthority;
use super::footer::ComplianceFooter;
use super::form_key::FormKeyProvider;
use super::hmac_rest::HmacRestProvider;
use super::phone::{DEFAULT_LMS_SUBJECT, MessageKind, classify, mask_phone, normalize_phone};
use super::provider::{
    AuthorityMessage, FailureKind, ProviderKind, SendResult, TextMessage, TransportError,
    TransportProvider,
};
use crate::config::MessagingConfig;

/// Channel requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChannelType {
    Sms,
    Lms,
    Authority,
}

impl From<MessageKind> for ChannelType {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Sms => ChannelType::Sms,
            MessageKind::Lms => ChannelType::Lms,
        }
    }
}

/// A normalised send request.
#[derive(Debug, Clone, PartialEq)]
pub struct SendRequest {
    pub to: String,
    pub text: String,
    pub channel: ChannelType,
    /// LMS only
    pub subject: Option<String>,
    /// Required when `channel` is [`ChannelType::Authority`]
    pub authority: Option<ResolvedAuthority>,
}

impl SendRequest {
    pub fn text(to: impl Into<String>, text: impl Into<String>, channel: ChannelType) -> Self {
        Self {
            to: to.into(),
            text: text.into(),
            channel,
            subject: None,
            authority: None,
        }
    }

    pub fn authority(to: impl Into<String>, authority: ResolvedAuthority) -> Self {
        Self {
            to: to.into(),
            text: authority.rendered_content.clone(),
            channel: ChannelType::Authority,
            subject: None,
            authority: Some(authority),
        }
    }

    pub fn with_subject(mut self, subject: Option<String>) -> Self {
        self.subject = subject;
        self
    }
}

/// Instantiates the configured transport. Called once at process start.
pub fn build_transport(config: &MessagingConfig) -> Arc<dyn TransportProvider> {
    let timeout = Duration::from_secs(config.request_timeout_secs);
    match config.provider {
        ProviderKind::HmacRest => {
            Arc::new(HmacRestProvider::new(config.hmac_rest.clone(), timeout))
        }
        ProviderKind::FormKey => {
            Arc::new(FormKeyProvider::new(config.form_key.clone(), timeout))
        }
    }
}

/// Sends through exactly one transport and always yields a [`SendResult`].
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn TransportProvider>,
    footer: Option<ComplianceFooter>,
    sender: String,
    timeout: Duration,
    default_subject: String,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn TransportProvider>, sender: &str, timeout: Duration) -> Self {
        Self {
            transport,
            footer: None,
            sender: normalize_phone(sender),
            timeout,
            default_subject: DEFAULT_LMS_SUBJECT.to_string(),
        }
    }

    pub fn with_footer(mut self, footer: Option<ComplianceFooter>) -> Self {
        self.footer = footer;
        self
    }

    pub fn with_default_subject(mut self, subject: &str) -> Self {
        if !subject.trim().is_empty() {
            self.default_subject = subject.trim().to_string();
        }
        self
    }

    pub fn from_config(config: &MessagingConfig) -> Self {
        let footer = config.compliance.enabled.then(|| {
            ComplianceFooter::new(
                config.compliance.base_url.clone(),
                config.compliance.secret.clone(),
                config.compliance.label.clone(),
            )
        });
        Self::new(
            build_transport(config),
            &config.sender,
            Duration::from_secs(config.request_timeout_secs),
        )
        .with_footer(footer)
        .with_default_subject(&config.default_lms_subject)
    }

    pub fn provider(&self) -> ProviderKind {
        self.transport.kind()
    }

    /// Footer, classification and subject for a plain SMS/LMS.
    fn text_message(&self, to: &str, request: &SendRequest) -> TextMessage {
        let text = match &self.footer {
            Some(footer) => footer.append_or_original(&request.text, to),
            None => request.text.clone(),
        };
        let kind = match request.channel {
            ChannelType::Lms => MessageKind::Lms,
            _ => classify(&text),
        };
        let subject = match kind {
            MessageKind::Lms => Some(
                request
                    .subject
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .unwrap_or(&self.default_subject)
                    .to_string(),
            ),
            MessageKind::Sms => None,
        };
        TextMessage {
            to: to.to_string(),
            text,
            kind,
            subject,
        }
    }

    pub async fn send(&self, request: &SendRequest) -> SendResult {
        let provider = self.transport.kind().as_str();
        let to = normalize_phone(&request.to);
        if to.is_empty() {
            return SendResult::failure(provider, FailureKind::Validation, "TO_PHONE_EMPTY");
        }
        if self.sender.is_empty() {
            return SendResult::failure(provider, FailureKind::Validation, "SENDER_EMPTY");
        }

        let start = Instant::now();
        let outcome = match request.channel {
            ChannelType::Authority => {
                let Some(authority) = &request.authority else {
                    return SendResult::failure(
                        provider,
                        FailureKind::Validation,
                        "KAKAO_PF_OR_TEMPLATE_MISSING",
                    );
                };
                let message = AuthorityMessage {
                    to: to.clone(),
                    authority: authority.clone(),
                };
                debug!(
                    to = %mask_phone(&to),
                    provider,
                    template = %authority.provider_template_id,
                    "Sending authority message"
                );
                let send = self.transport.send_authority(&self.sender, &message);
                tokio::time::timeout(self.timeout, send).await
            }
            ChannelType::Sms | ChannelType::Lms => {
                let message = self.text_message(&to, request);
                debug!(
                    to = %mask_phone(&to),
                    provider,
                    kind = %message.kind,
                    "Sending text message"
                );
                let send = self.transport.send_text(&self.sender, &message);
                tokio::time::timeout(self.timeout, send).await
            }
        };

        match outcome {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    to = %mask_phone(&to),
                    provider,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Provider call timed out"
                );
                SendResult::from_transport_error(provider, &TransportError::Timeout)
                    .with_duration(start.elapsed().as_millis() as u64)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::provider::TransportReply;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        texts: Mutex<Vec<TextMessage>>,
        authorities: Mutex<Vec<AuthorityMessage>>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl TransportProvider for RecordingTransport {
        fn kind(&self) -> ProviderKind {
            ProviderKind::HmacRest
        }

        async fn send_text(&self, _from: &str, message: &TextMessage) -> SendResult {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.texts.lock().unwrap().push(message.clone());
            SendResult::success("hmac_rest", Some("M1".to_string()))
        }

        async fn send_authority(&self, _from: &str, message: &AuthorityMessage) -> SendResult {
            self.authorities.lock().unwrap().push(message.clone());
            SendResult::success("hmac_rest", Some("A1".to_string()))
        }

        fn interpret(&self, _reply: &TransportReply) -> SendResult {
            SendResult::success("hmac_rest", None)
        }
    }

    fn footer() -> ComplianceFooter {
        ComplianceFooter::new("https://door.example.com", "s3cret", "")
    }

    fn dispatcher(transport: Arc<RecordingTransport>) -> Dispatcher {
        Dispatcher::new(transport, "02-123-4567", Duration::from_secs(5))
            .with_footer(Some(footer()))
    }

    fn resolved() -> ResolvedAuthority {
        ResolvedAuthority {
            channel_id: "PF".to_string(),
            provider_template_id: "T1".to_string(),
            variables: Default::default(),
            buttons: vec![],
            fallback_text: Some("fallback".to_string()),
            rendered_content: "approved content".to_string(),
            disable_sms_fallback: false,
        }
    }

    #[tokio::test]
    async fn test_rejects_empty_recipient_without_contacting_provider() {
        let transport = Arc::new(RecordingTransport::default());
        let result = dispatcher(transport.clone())
            .send(&SendRequest::text("---", "hi", ChannelType::Sms))
            .await;
        assert!(!result.ok);
        assert_eq!(result.error.as_deref(), Some("TO_PHONE_EMPTY"));
        assert_eq!(result.failure, Some(FailureKind::Validation));
        assert!(transport.texts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_empty_sender() {
        let transport = Arc::new(RecordingTransport::default());
        let result = Dispatcher::new(transport.clone(), "", Duration::from_secs(5))
            .send(&SendRequest::text("01012345678", "hi", ChannelType::Sms))
            .await;
        assert_eq!(result.error.as_deref(), Some("SENDER_EMPTY"));
        assert!(transport.texts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_text_gets_footer_and_is_reclassified() {
        let transport = Arc::new(RecordingTransport::default());
        let result = dispatcher(transport.clone())
            .send(&SendRequest::text("010-1234-5678", "short body", ChannelType::Sms))
            .await;
        assert!(result.ok);

        let texts = transport.texts.lock().unwrap();
        let sent = &texts[0];
        assert_eq!(sent.to, "01012345678");
        assert!(footer().is_present(&sent.text));
        // The footer URL pushes the body past the SMS limit.
        assert_eq!(sent.kind, MessageKind::Lms);
        assert_eq!(sent.subject.as_deref(), Some(DEFAULT_LMS_SUBJECT));
    }

    #[tokio::test]
    async fn test_explicit_lms_keeps_subject() {
        let transport = Arc::new(RecordingTransport::default());
        let d = Dispatcher::new(transport.clone(), "0212345678", Duration::from_secs(5));
        d.send(
            &SendRequest::text("01012345678", "hi", ChannelType::Lms)
                .with_subject(Some("견적 안내".to_string())),
        )
        .await;
        let texts = transport.texts.lock().unwrap();
        assert_eq!(texts[0].kind, MessageKind::Lms);
        assert_eq!(texts[0].subject.as_deref(), Some("견적 안내"));
    }

    #[tokio::test]
    async fn test_short_text_without_footer_is_sms() {
        let transport = Arc::new(RecordingTransport::default());
        let d = Dispatcher::new(transport.clone(), "0212345678", Duration::from_secs(5));
        d.send(&SendRequest::text("01012345678", "hi", ChannelType::Sms)).await;
        let texts = transport.texts.lock().unwrap();
        assert_eq!(texts[0].kind, MessageKind::Sms);
        assert_eq!(texts[0].subject, None);
    }

    #[tokio::test]
    async fn test_authority_send_never_gets_footer() {
        let transport = Arc::new(RecordingTransport::default());
        let result = dispatcher(transport.clone())
            .send(&SendRequest::authority("01012345678", resolved()))
            .await;
        assert!(result.ok);
        assert_eq!(result.message_id.as_deref(), Some("A1"));

        let sent = transport.authorities.lock().unwrap();
        assert_eq!(sent[0].authority.rendered_content, "approved content");
        assert!(!footer().is_present(&sent[0].authority.rendered_content));
        assert!(transport.texts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_authority_without_payload_is_validation_failure() {
        let transport = Arc::new(RecordingTransport::default());
        let mut request = SendRequest::authority("01012345678", resolved());
        request.authority = None;
        let result = dispatcher(transport).send(&request).await;
        assert_eq!(result.error.as_deref(), Some("KAKAO_PF_OR_TEMPLATE_MISSING"));
        assert!(!result.retryable());
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let transport = Arc::new(RecordingTransport {
            delay: Some(Duration::from_secs(5)),
            ..Default::default()
        });
        let d = Dispatcher::new(transport, "0212345678", Duration::from_millis(50));
        let result = d
            .send(&SendRequest::text("01012345678", "hi", ChannelType::Sms))
            .await;
        assert!(!result.ok);
        assert_eq!(result.error.as_deref(), Some("PROVIDER_TIMEOUT"));
        assert_eq!(result.failure, Some(FailureKind::Timeout));
        assert!(result.retryable());
    }
}
