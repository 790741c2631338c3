//! Transport B: form-encoded API keyed by a static key and user id.
//!
//! Text sends go to `{base_url}/send/`, authority sends to
//! `{kakao_base_url}/akv10/alimtalk/send/`. Success is reported in the body
//! as `success: true`, a `result_code` starting with `1`, or `code: 0`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Url;
use reqwest::header::CONTENT_TYPE;
use serde_json::{Value, json};

use super::phone::{DEFAULT_LMS_SUBJECT, MessageKind};
use super::provider::{
    AuthorityMessage, FailureKind, ProviderKind, SendResult, TextMessage, TransportError,
    TransportProvider, TransportReply, json_text,
};
use crate::config::FormKeyConfig;
use crate::external::HTTP_CLIENT;

const TEXT_PATH: &str = "/send/";
const AUTHORITY_PATH: &str = "/akv10/alimtalk/send/";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

type FormFields = Vec<(&'static str, String)>;

pub struct FormKeyProvider {
    config: FormKeyConfig,
    timeout: Duration,
}

impl FormKeyProvider {
    pub fn new(config: FormKeyConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    fn yn(flag: bool) -> String {
        if flag { "Y" } else { "N" }.to_string()
    }

    pub fn text_fields(&self, from: &str, message: &TextMessage) -> FormFields {
        let mut fields: FormFields = vec![
            ("key", self.config.api_key.clone()),
            ("user_id", self.config.user_id.clone()),
            ("sender", from.to_string()),
            ("receiver", message.to.clone()),
            ("msg", message.text.clone()),
            ("msg_type", message.kind.as_str().to_string()),
        ];
        if message.kind == MessageKind::Lms
            && let Some(subject) = &message.subject
        {
            fields.push(("title", subject.clone()));
        }
        if self.config.test_mode {
            fields.push(("testmode_yn", Self::yn(true)));
        }
        fields
    }

    pub fn authority_fields(&self, from: &str, message: &AuthorityMessage) -> FormFields {
        let authority = &message.authority;
        let mut fields: FormFields = vec![
            ("apikey", self.config.api_key.clone()),
            ("userid", self.config.user_id.clone()),
            ("senderkey", authority.channel_id.clone()),
            ("tpl_code", authority.provider_template_id.clone()),
            ("sender", from.to_string()),
            ("receiver_1", message.to.clone()),
            ("subject_1", DEFAULT_LMS_SUBJECT.to_string()),
            ("message_1", authority.rendered_content.clone()),
        ];

        if !authority.buttons.is_empty() {
            let buttons: Vec<Value> = authority
                .buttons
                .iter()
                .map(|b| {
                    json!({
                        "name": b.name,
                        "linkType": b.kind,
                        "linkMo": b.link_mobile,
                        "linkPc": b.link_pc,
                        "linkAnd": b.link_android,
                        "linkIos": b.link_ios,
                    })
                })
                .collect();
            fields.push(("button_1", json!({ "button": buttons }).to_string()));
        }

        let failover = !authority.disable_sms_fallback && authority.fallback_text.is_some();
        fields.push(("failover", Self::yn(failover)));
        if failover && let Some(text) = &authority.fallback_text {
            fields.push(("fsubject_1", DEFAULT_LMS_SUBJECT.to_string()));
            fields.push(("fmessage_1", text.clone()));
        }
        if self.config.test_mode {
            fields.push(("testMode", Self::yn(true)));
        }
        fields
    }

    async fn post(&self, url: &str, fields: &FormFields) -> Result<TransportReply, TransportError> {
        let body = encode_form(fields)?;
        let response = HTTP_CLIENT
            .post(url)
            .timeout(self.timeout)
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(TransportReply { status, body })
    }

    async fn deliver(&self, url: String, fields: FormFields) -> SendResult {
        let start = Instant::now();
        let result = match self.post(&url, &fields).await {
            Ok(reply) => self.interpret(&reply),
            Err(error) => SendResult::from_transport_error(self.kind().as_str(), &error),
        };
        result.with_duration(start.elapsed().as_millis() as u64)
    }
}

/// `application/x-www-form-urlencoded` serialisation of ordered fields.
pub fn encode_form(fields: &[(&'static str, String)]) -> Result<String, TransportError> {
    let mut url = Url::parse("http://form.invalid/")
        .map_err(|e| TransportError::Request(e.to_string()))?;
    url.query_pairs_mut()
        .extend_pairs(fields.iter().map(|(k, v)| (*k, v.as_str())));
    Ok(url.query().unwrap_or_default().to_string())
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

#[async_trait]
impl TransportProvider for FormKeyProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::FormKey
    }

    async fn send_text(&self, from: &str, message: &TextMessage) -> SendResult {
        let url = join_url(&self.config.base_url, TEXT_PATH);
        self.deliver(url, self.text_fields(from, message)).await
    }

    async fn send_authority(&self, from: &str, message: &AuthorityMessage) -> SendResult {
        let url = join_url(&self.config.kakao_base_url, AUTHORITY_PATH);
        self.deliver(url, self.authority_fields(from, message)).await
    }

    fn interpret(&self, reply: &TransportReply) -> SendResult {
        let provider = self.kind().as_str();
        let parsed: Option<Value> = serde_json::from_str(&reply.body).ok();
        let field = |name: &str| parsed.as_ref().and_then(|v| json_text(v.get(name)));
        let message = field("message");

        if !(200..300).contains(&reply.status) {
            let error = message.unwrap_or_else(|| format!("HTTP_{}", reply.status));
            return SendResult::failure(provider, FailureKind::Transport, error)
                .with_status(reply.status);
        }

        let success_flag = parsed
            .as_ref()
            .and_then(|v| v.get("success"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let result_code = field("result_code");
        let code = field("code");
        let ok = success_flag
            || result_code.as_deref().is_some_and(|c| c.starts_with('1'))
            || code.as_deref() == Some("0");

        if ok {
            let message_id = field("msg_id").or_else(|| {
                parsed
                    .as_ref()
                    .and_then(|v| v.get("info"))
                    .and_then(|info| json_text(info.get("mid")))
            });
            return SendResult::success(provider, message_id).with_status(reply.status);
        }

        let error = match (result_code.or(code), message) {
            (Some(code), Some(message)) => format!("{}: {}", code, message),
            (None, Some(message)) => message,
            (Some(code), None) => format!("RESULT_{}", code),
            (None, None) => format!("HTTP_{}", reply.status),
        };
        SendResult::failure(provider, FailureKind::Transport, error).with_status(reply.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::authority::ResolvedAuthority;
    use crate::models::delivery::KakaoButton;

    fn provider(test_mode: bool) -> FormKeyProvider {
        FormKeyProvider::new(
            FormKeyConfig {
                base_url: "https://apis.example.com".to_string(),
                kakao_base_url: "https://kakao.example.com/".to_string(),
                api_key: "K".to_string(),
                user_id: "door".to_string(),
                test_mode,
            },
            Duration::from_secs(5),
        )
    }

    fn value<'a>(fields: &'a FormFields, key: &str) -> Option<&'a str> {
        fields.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str())
    }

    fn reply(status: u16, body: Value) -> TransportReply {
        TransportReply { status, body: body.to_string() }
    }

    #[test]
    fn test_text_fields() {
        let fields = provider(true).text_fields(
            "0212345678",
            &TextMessage {
                to: "01012345678".to_string(),
                text: "본문".to_string(),
                kind: MessageKind::Lms,
                subject: Some("제목".to_string()),
            },
        );
        assert_eq!(value(&fields, "key"), Some("K"));
        assert_eq!(value(&fields, "user_id"), Some("door"));
        assert_eq!(value(&fields, "msg_type"), Some("LMS"));
        assert_eq!(value(&fields, "title"), Some("제목"));
        assert_eq!(value(&fields, "testmode_yn"), Some("Y"));
    }

    #[test]
    fn test_sms_has_no_title() {
        let fields = provider(false).text_fields(
            "0212345678",
            &TextMessage {
                to: "01012345678".to_string(),
                text: "hi".to_string(),
                kind: MessageKind::Sms,
                subject: Some("ignored".to_string()),
            },
        );
        assert_eq!(value(&fields, "title"), None);
        assert_eq!(value(&fields, "testmode_yn"), None);
    }

    #[test]
    fn test_authority_fields_with_failover() {
        let message = AuthorityMessage {
            to: "01012345678".to_string(),
            authority: ResolvedAuthority {
                channel_id: "SENDERKEY".to_string(),
                provider_template_id: "TP01".to_string(),
                variables: Default::default(),
                buttons: vec![KakaoButton {
                    name: "보기".to_string(),
                    kind: "WL".to_string(),
                    link_mobile: Some("https://m".to_string()),
                    link_pc: None,
                    link_android: None,
                    link_ios: None,
                }],
                fallback_text: Some("대체 문자".to_string()),
                rendered_content: "템플릿 본문".to_string(),
                disable_sms_fallback: false,
            },
        };
        let fields = provider(false).authority_fields("0212345678", &message);
        assert_eq!(value(&fields, "senderkey"), Some("SENDERKEY"));
        assert_eq!(value(&fields, "tpl_code"), Some("TP01"));
        assert_eq!(value(&fields, "message_1"), Some("템플릿 본문"));
        assert_eq!(value(&fields, "failover"), Some("Y"));
        assert_eq!(value(&fields, "fmessage_1"), Some("대체 문자"));
        let buttons: Value = serde_json::from_str(value(&fields, "button_1").unwrap()).unwrap();
        assert_eq!(buttons["button"][0]["linkType"], "WL");

        let mut disabled = message.clone();
        disabled.authority.disable_sms_fallback = true;
        let fields = provider(false).authority_fields("0212345678", &disabled);
        assert_eq!(value(&fields, "failover"), Some("N"));
        assert_eq!(value(&fields, "fmessage_1"), None);
    }

    #[test]
    fn test_encode_form() {
        let encoded =
            encode_form(&[("msg", "a b&c".to_string()), ("k", "한".to_string())]).unwrap();
        assert_eq!(encoded, "msg=a+b%26c&k=%ED%95%9C");
    }

    #[test]
    fn test_interpret_result_codes() {
        let p = provider(false);
        let ok = p.interpret(&reply(
            200,
            json!({"result_code": "1", "message": "success", "msg_id": "123"}),
        ));
        assert!(ok.ok);
        assert_eq!(ok.message_id.as_deref(), Some("123"));

        let ok = p.interpret(&reply(
            200,
            json!({"code": 0, "message": "ok", "info": {"mid": 987}}),
        ));
        assert!(ok.ok);
        assert_eq!(ok.message_id.as_deref(), Some("987"));

        let ok = p.interpret(&reply(200, json!({"success": true})));
        assert!(ok.ok);

        let soft = p.interpret(&reply(
            200,
            json!({"result_code": "-101", "message": "인증오류"}),
        ));
        assert!(!soft.ok);
        assert_eq!(soft.error.as_deref(), Some("-101: 인증오류"));

        let soft = p.interpret(&reply(200, json!({"code": -99})));
        assert_eq!(soft.error.as_deref(), Some("RESULT_-99"));
    }

    #[test]
    fn test_interpret_http_failure() {
        let p = provider(false);
        let failed = p.interpret(&TransportReply { status: 503, body: String::new() });
        assert!(!failed.ok);
        assert_eq!(failed.error.as_deref(), Some("HTTP_503"));
        assert_eq!(failed.status_code, Some(503));
        assert!(failed.retryable());
    }
}
