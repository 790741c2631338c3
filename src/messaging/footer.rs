//! Signed opt-out footer for plain SMS/LMS bodies.
//!
//! The link is a pure function of the normalised phone and the shared
//! secret, so a body that already carries it can be recognised by substring
//! match and left alone.

use reqwest::Url;
use thiserror::Error;

use super::hmac_sha256_hex;
use super::phone::{mask_phone, normalize_phone};

/// Path segment of the opt-out endpoint, also used for idempotency checks.
pub const OPT_OUT_PATH: &str = "/optout";

/// Label prefixed to the link when none is configured.
pub const DEFAULT_LABEL: &str = "무료수신거부";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FooterError {
    #[error("opt-out signing secret is not configured")]
    MissingSecret,
    #[error("opt-out base URL is missing or invalid")]
    MissingBaseUrl,
    #[error("recipient phone is not a valid number")]
    InvalidPhone,
}

/// Builds and appends the compliance footer.
#[derive(Debug, Clone)]
pub struct ComplianceFooter {
    base_url: String,
    secret: String,
    label: String,
}

impl ComplianceFooter {
    pub fn new(
        base_url: impl Into<String>,
        secret: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        let label = label.into();
        Self {
            base_url: base_url.into(),
            secret: secret.into(),
            label: if label.trim().is_empty() {
                DEFAULT_LABEL.to_string()
            } else {
                label
            },
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Signed, deterministic opt-out URL for one recipient.
    pub fn opt_out_url(&self, phone: &str) -> Result<String, FooterError> {
        if self.secret.is_empty() {
            return Err(FooterError::MissingSecret);
        }
        let digits = normalize_phone(phone);
        if !(8..=15).contains(&digits.len()) {
            return Err(FooterError::InvalidPhone);
        }

        let base = self.base_url.trim_end_matches('/');
        if base.is_empty() {
            return Err(FooterError::MissingBaseUrl);
        }
        let mut url = Url::parse(&format!("{}{}", base, OPT_OUT_PATH))
            .map_err(|_| FooterError::MissingBaseUrl)?;

        let signature = hmac_sha256_hex(self.secret.as_bytes(), digits.as_bytes())
            .map_err(|_| FooterError::MissingSecret)?;
        url.query_pairs_mut()
            .append_pair("p", &digits)
            .append_pair("sig", &signature);

        Ok(url.to_string())
    }

    /// True when the body already carries a footer line.
    pub fn is_present(&self, body: &str) -> bool {
        body.contains(&self.label) && body.contains(OPT_OUT_PATH)
    }

    /// Appends `"<label>: <url>"` on its own line unless already present.
    pub fn append(&self, body: &str, phone: &str) -> Result<String, FooterError> {
        if self.is_present(body) {
            return Ok(body.to_string());
        }
        let url = self.opt_out_url(phone)?;
        let trimmed = body.trim_end();
        if trimmed.is_empty() {
            return Ok(format!("{}: {}", self.label, url));
        }
        Ok(format!("{}\n{}: {}", trimmed, self.label, url))
    }

    /// Fail-open variant used on the send path: a footer problem is logged
    /// and the original body goes out unchanged.
    pub fn append_or_original(&self, body: &str, phone: &str) -> String {
        match self.append(body, phone) {
            Ok(with_footer) => with_footer,
            Err(error) => {
                tracing::warn!(
                    to = %mask_phone(phone),
                    error = %error,
                    "Compliance footer skipped"
                );
                body.to_string()
            }
        }
    }
}
