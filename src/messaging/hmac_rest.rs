//! Transport A: JSON REST API authenticated by a timestamped HMAC header.
//!
//! `Authorization: HMAC-SHA256 apiKey=<key>, date=<iso8601>, salt=<hex>, signature=<hex>`
//! where `signature = hex(HMAC-SHA256(secret, date + salt))`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use jiff::Timestamp;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::{Map, Value, json};

use super::authority::ResolvedAuthority;
use super::hmac_sha256_hex;
use super::provider::{
    AuthorityMessage, FailureKind, ProviderKind, SendResult, TextMessage, TransportError,
    TransportProvider, TransportReply, json_text,
};
use super::render::value_to_text;
use crate::config::HmacRestConfig;
use crate::external::HTTP_CLIENT;
use crate::models::delivery::KakaoButton;

const SEND_PATH: &str = "/messages/v4/send";

pub struct HmacRestProvider {
    config: HmacRestConfig,
    timeout: Duration,
}

impl HmacRestProvider {
    pub fn new(config: HmacRestConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    fn endpoint(&self) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), SEND_PATH)
    }

    /// Builds the authorization header for a given date and salt.
    pub fn authorization(&self, date: &str, salt: &str) -> Result<String, TransportError> {
        let signature = hmac_sha256_hex(
            self.config.api_secret.as_bytes(),
            format!("{}{}", date, salt).as_bytes(),
        )
        .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(format!(
            "HMAC-SHA256 apiKey={}, date={}, salt={}, signature={}",
            self.config.api_key, date, salt, signature
        ))
    }

    pub fn text_body(&self, from: &str, message: &TextMessage) -> Value {
        let mut inner = Map::new();
        inner.insert("to".into(), json!(message.to));
        inner.insert("from".into(), json!(from));
        inner.insert("text".into(), json!(message.text));
        inner.insert("type".into(), json!(message.kind.as_str()));
        if let Some(subject) = &message.subject {
            inner.insert("subject".into(), json!(subject));
        }
        json!({ "message": inner })
    }

    pub fn authority_body(&self, from: &str, message: &AuthorityMessage) -> Value {
        let authority = &message.authority;
        json!({
            "message": {
                "to": message.to,
                "from": from,
                "text": authority.rendered_content,
                "type": "ATA",
                "kakaoOptions": kakao_options(authority),
            }
        })
    }

    async fn post(&self, body: &Value) -> Result<TransportReply, TransportError> {
        let date = Timestamp::now().to_string();
        let salt = hex::encode(rand::random::<[u8; 16]>());
        let authorization = self.authorization(&date, &salt)?;

        let response = HTTP_CLIENT
            .post(self.endpoint())
            .timeout(self.timeout)
            .header(AUTHORIZATION, authorization)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(TransportReply { status, body })
    }

    async fn deliver(&self, body: Value) -> SendResult {
        let start = Instant::now();
        let result = match self.post(&body).await {
            Ok(reply) => self.interpret(&reply),
            Err(error) => SendResult::from_transport_error(self.kind().as_str(), &error),
        };
        result.with_duration(start.elapsed().as_millis() as u64)
    }
}

fn kakao_options(authority: &ResolvedAuthority) -> Value {
    let variables: Map<String, Value> = authority
        .variables
        .iter()
        .map(|(key, value)| (kakao_variable_key(key), Value::String(value_to_text(value))))
        .collect();
    let buttons: Vec<Value> = authority.buttons.iter().map(button_json).collect();

    json!({
        "pfId": authority.channel_id,
        "templateId": authority.provider_template_id,
        "variables": variables,
        "disableSms": authority.disable_sms_fallback,
        "buttons": buttons,
    })
}

/// The provider expects variable names in `#{name}` form.
pub fn kakao_variable_key(key: &str) -> String {
    let trimmed = key.trim();
    if trimmed.starts_with("#{") && trimmed.ends_with('}') {
        trimmed.to_string()
    } else {
        format!("#{{{}}}", trimmed)
    }
}

fn button_json(button: &KakaoButton) -> Value {
    let mut map = Map::new();
    map.insert("buttonName".into(), json!(button.name));
    map.insert("buttonType".into(), json!(button.kind));
    for (field, value) in [
        ("linkMo", &button.link_mobile),
        ("linkPc", &button.link_pc),
        ("linkAnd", &button.link_android),
        ("linkIos", &button.link_ios),
    ] {
        if let Some(link) = value {
            map.insert(field.into(), json!(link));
        }
    }
    Value::Object(map)
}

#[async_trait]
impl TransportProvider for HmacRestProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::HmacRest
    }

    async fn send_text(&self, from: &str, message: &TextMessage) -> SendResult {
        self.deliver(self.text_body(from, message)).await
    }

    async fn send_authority(&self, from: &str, message: &AuthorityMessage) -> SendResult {
        self.deliver(self.authority_body(from, message)).await
    }

    fn interpret(&self, reply: &TransportReply) -> SendResult {
        let provider = self.kind().as_str();
        let parsed: Option<Value> = serde_json::from_str(&reply.body).ok();
        let field = |name: &str| parsed.as_ref().and_then(|v| json_text(v.get(name)));

        let error_text = || match (field("errorCode"), field("errorMessage")) {
            (Some(code), Some(message)) => Some(format!("{}: {}", code, message)),
            (Some(code), None) => Some(code),
            (None, Some(message)) => Some(message),
            (None, None) => None,
        };

        if !(200..300).contains(&reply.status) {
            let error = error_text().unwrap_or_else(|| format!("HTTP_{}", reply.status));
            return SendResult::failure(provider, FailureKind::Transport, error)
                .with_status(reply.status);
        }

        if let Some(error) = error_text().filter(|_| field("errorCode").is_some()) {
            return SendResult::failure(provider, FailureKind::Transport, error)
                .with_status(reply.status);
        }

        if let Some(code) = field("statusCode")
            && !code.starts_with('2')
        {
            let error = match field("statusMessage") {
                Some(message) => format!("{}: {}", code, message),
                None => code,
            };
            return SendResult::failure(provider, FailureKind::Transport, error)
                .with_status(reply.status);
        }

        let message_id = field("messageId").or_else(|| field("groupId"));
        SendResult::success(provider, message_id).with_status(reply.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::phone::MessageKind;
    use serde_json::json;

    fn provider() -> HmacRestProvider {
        HmacRestProvider::new(
            HmacRestConfig {
                base_url: "https://api.example.com/".to_string(),
                api_key: "KEY".to_string(),
                api_secret: "SECRET".to_string(),
            },
            Duration::from_secs(5),
        )
    }

    fn reply(status: u16, body: Value) -> TransportReply {
        TransportReply { status, body: body.to_string() }
    }

    #[test]
    fn test_authorization_header_shape() {
        let p = provider();
        let header = p.authorization("2024-01-01T00:00:00Z", "abcd").unwrap();
        let expected_sig =
            hmac_sha256_hex(b"SECRET", b"2024-01-01T00:00:00Zabcd").unwrap();
        assert_eq!(
            header,
            format!(
                "HMAC-SHA256 apiKey=KEY, date=2024-01-01T00:00:00Z, salt=abcd, signature={}",
                expected_sig
            )
        );
        assert_eq!(expected_sig.len(), 64);
        assert_eq!(p.endpoint(), "https://api.example.com/messages/v4/send");
    }

    #[test]
    fn test_text_body() {
        let body = provider().text_body(
            "0212345678",
            &TextMessage {
                to: "01012345678".to_string(),
                text: "hello".to_string(),
                kind: MessageKind::Lms,
                subject: Some("알림".to_string()),
            },
        );
        assert_eq!(
            body,
            json!({"message": {
                "to": "01012345678",
                "from": "0212345678",
                "text": "hello",
                "type": "LMS",
                "subject": "알림",
            }})
        );
    }

    #[test]
    fn test_authority_body_normalizes_variable_keys() {
        let authority = ResolvedAuthority {
            channel_id: "PF01".to_string(),
            provider_template_id: "T01".to_string(),
            variables: [
                ("name".to_string(), json!("Kim")),
                ("#{amount}".to_string(), json!(1000)),
            ]
            .into_iter()
            .collect(),
            buttons: vec![KakaoButton {
                name: "open".to_string(),
                kind: "WL".to_string(),
                link_mobile: Some("https://m".to_string()),
                link_pc: None,
                link_android: None,
                link_ios: None,
            }],
            fallback_text: None,
            rendered_content: "Kim 1000".to_string(),
            disable_sms_fallback: true,
        };
        let body = provider().authority_body(
            "0212345678",
            &AuthorityMessage { to: "01012345678".to_string(), authority },
        );
        let options = &body["message"]["kakaoOptions"];
        assert_eq!(body["message"]["type"], "ATA");
        assert_eq!(body["message"]["text"], "Kim 1000");
        assert_eq!(options["pfId"], "PF01");
        assert_eq!(options["variables"]["#{name}"], "Kim");
        assert_eq!(options["variables"]["#{amount}"], "1000");
        assert_eq!(options["disableSms"], true);
        assert_eq!(
            options["buttons"][0],
            json!({"buttonName": "open", "buttonType": "WL", "linkMo": "https://m"})
        );
    }

    #[test]
    fn test_interpret_success() {
        let result = provider().interpret(&reply(
            200,
            json!({"groupId": "G1", "messageId": "M1", "statusCode": "2000"}),
        ));
        assert!(result.ok);
        assert_eq!(result.message_id.as_deref(), Some("M1"));

        let result = provider().interpret(&reply(200, json!({"groupId": "G1"})));
        assert_eq!(result.message_id.as_deref(), Some("G1"));
    }

    #[test]
    fn test_interpret_http_failure() {
        let result = provider().interpret(&reply(
            400,
            json!({"errorCode": "ValidationError", "errorMessage": "bad to"}),
        ));
        assert!(!result.ok);
        assert_eq!(result.error.as_deref(), Some("ValidationError: bad to"));
        assert_eq!(result.status_code, Some(400));

        let result = provider().interpret(&TransportReply {
            status: 502,
            body: "<html>".to_string(),
        });
        assert_eq!(result.error.as_deref(), Some("HTTP_502"));
        assert_eq!(result.failure, Some(FailureKind::Transport));
    }

    #[test]
    fn test_interpret_soft_failure() {
        let result = provider().interpret(&reply(200, json!({"errorCode": "NotEnoughBalance"})));
        assert!(!result.ok);
        assert_eq!(result.error.as_deref(), Some("NotEnoughBalance"));

        let result = provider().interpret(&reply(
            200,
            json!({"statusCode": "3059", "statusMessage": "blocked"}),
        ));
        assert_eq!(result.error.as_deref(), Some("3059: blocked"));
    }

    #[test]
    fn test_kakao_variable_key() {
        assert_eq!(kakao_variable_key("name"), "#{name}");
        assert_eq!(kakao_variable_key("#{name}"), "#{name}");
    }
}
