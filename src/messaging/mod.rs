//! Outbound message construction and transport.
//!
//! Leaves first: [`phone`] and [`render`] are pure helpers, [`footer`] and
//! [`authority`] shape content, [`provider`] defines the transport seam with
//! two implementations, and [`dispatcher`] ties them together behind a
//! single `send` call that never returns an `Err`.

pub mod authority;
pub mod dispatcher;
pub mod footer;
pub mod form_key;
pub mod hmac_rest;
pub mod phone;
pub mod provider;
pub mod render;

use hmac::{Hmac, Mac};
use sha2::Sha256;

pub use authority::{
    AuthorityResolver, AuthorityTemplate, ResolveError, ResolvedAuthority, TemplateStore,
    resolve_template,
};
pub use dispatcher::{ChannelType, Dispatcher, SendRequest, build_transport};
pub use footer::{ComplianceFooter, FooterError};
pub use phone::{MessageKind, classify, mask_phone, normalize_phone};
pub use provider::{FailureKind, ProviderKind, SendResult, TransportProvider};
pub use render::{Variables, render};

type HmacSha256 = Hmac<Sha256>;

/// Lower-case hex HMAC-SHA256 of `message` under `key`.
pub(crate) fn hmac_sha256_hex(
    key: &[u8],
    message: &[u8],
) -> Result<String, hmac::digest::InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(key)?;
    mac.update(message);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hmac_sha256_known_vector() {
        // RFC 4231 test case 2
        let sig = hmac_sha256_hex(b"Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            sig,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }
}
