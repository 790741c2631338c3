//! Recipient normalisation and SMS/LMS classification.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Bodies longer than this many characters are sent as LMS.
pub const SMS_MAX_CHARS: usize = 80;

/// Subject used for LMS sends when the caller supplies none.
pub const DEFAULT_LMS_SUBJECT: &str = "알림";

/// Text message class as understood by both transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageKind {
    Sms,
    Lms,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Sms => "SMS",
            MessageKind::Lms => "LMS",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strips every non-digit character. Never fails; an empty result means
/// "no recipient" and must be rejected by the caller.
pub fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Classifies a rendered body by character count (not bytes).
pub fn classify(body: &str) -> MessageKind {
    if body.chars().count() > SMS_MAX_CHARS {
        MessageKind::Lms
    } else {
        MessageKind::Sms
    }
}

/// Masks the middle of a phone number for log output (`010****5678`).
pub fn mask_phone(phone: &str) -> String {
    let digits = normalize_phone(phone);
    let len = digits.len();
    if len < 7 {
        return "*".repeat(len);
    }
    let head = &digits[..3];
    let tail = &digits[len - 4..];
    format!("{}{}{}", head, "*".repeat(len - 7), tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_strips_separators() {
        assert_eq!(normalize_phone("010-1234-5678"), "01012345678");
        assert_eq!(normalize_phone("+82 (10) 1234 5678"), "821012345678");
        assert_eq!(normalize_phone(""), "");
        assert_eq!(normalize_phone("no digits"), "");
    }

    #[test]
    fn test_classify_boundary() {
        let sms = "a".repeat(80);
        let lms = "a".repeat(81);
        assert_eq!(classify(&sms), MessageKind::Sms);
        assert_eq!(classify(&lms), MessageKind::Lms);
    }

    #[test]
    fn test_classify_counts_characters_not_bytes() {
        let korean = "가".repeat(80);
        assert_eq!(classify(&korean), MessageKind::Sms);
        assert_eq!(classify(&format!("{}가", korean)), MessageKind::Lms);
    }

    #[test]
    fn test_mask_phone() {
        assert_eq!(mask_phone("010-1234-5678"), "010****5678");
        assert_eq!(mask_phone("0212345678"), "021***5678");
        assert_eq!(mask_phone("123"), "***");
    }

    proptest! {
        #[test]
        fn prop_normalize_yields_only_digits(raw in ".{0,40}") {
            let normalized = normalize_phone(&raw);
            prop_assert!(normalized.chars().all(|c| c.is_ascii_digit()));
            prop_assert_eq!(normalize_phone(&normalized), normalized.clone());
        }
    }
}
