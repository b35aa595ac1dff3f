//! `X-Payment-Signature: t=<unix>,v1=<hex>[,v1=<hex>...]`
//!
//! Each `v1` is `HMAC-SHA256(secret, "<t>.<raw body>")`. Several `v1`
//! entries may be present while the processor rotates secrets; any match is
//! accepted. Timestamps further than the tolerance from now are rejected to
//! bound replay of captured requests.

use std::fmt;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::CommerceError;

/// Header carrying the notification signature.
pub const SIGNATURE_HEADER: &str = "x-payment-signature";

type HmacSha256 = Hmac<Sha256>;

/// Verifies notification signatures with a shared secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Vec<u8>,
    tolerance_secs: i64,
}

impl fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish_non_exhaustive()
    }
}

struct ParsedHeader {
    timestamp: i64,
    signatures: Vec<Vec<u8>>,
}

fn parse_header(header: &str) -> Option<ParsedHeader> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse().ok(),
            "v1" => {
                if let Ok(sig) = hex::decode(value) {
                    signatures.push(sig);
                }
            }
            _ => {}
        }
    }
    Some(ParsedHeader {
        timestamp: timestamp?,
        signatures,
    })
}

impl SignatureVerifier {
    /// Creates a verifier for `secret` accepting timestamps within
    /// `tolerance_secs` of the current time.
    #[must_use]
    pub fn new(secret: &[u8], tolerance_secs: i64) -> Self {
        Self {
            secret: secret.to_vec(),
            tolerance_secs,
        }
    }

    fn mac(&self, timestamp: i64, body: &[u8]) -> Result<HmacSha256, CommerceError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.secret)
            .map_err(|e| CommerceError::Internal(format!("webhook signing key: {e}")))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        Ok(mac)
    }

    /// Verifies `header` against the raw `body` at unix time `now`.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::InvalidSignature`] if the header is missing
    /// or malformed, the timestamp is outside the tolerance, or no `v1`
    /// signature matches, and [`CommerceError::Internal`] if the signing key
    /// cannot be used.
    pub fn verify(&self, header: Option<&str>, body: &[u8], now: i64) -> Result<(), CommerceError> {
        let parsed = header
            .and_then(parse_header)
            .ok_or(CommerceError::InvalidSignature)?;
        if now.abs_diff(parsed.timestamp) > self.tolerance_secs.unsigned_abs() {
            return Err(CommerceError::InvalidSignature);
        }
        let expected = self.mac(parsed.timestamp, body)?.finalize().into_bytes();
        let matched = parsed
            .signatures
            .iter()
            .any(|sig| bool::from(expected.as_slice().ct_eq(sig)));
        if matched {
            Ok(())
        } else {
            Err(CommerceError::InvalidSignature)
        }
    }

    /// Produces a header value for `body` at `timestamp`, as the processor
    /// would. Used by tests and local tooling.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::Internal`] if the signing key cannot be used.
    pub fn sign(&self, body: &[u8], timestamp: i64) -> Result<String, CommerceError> {
        let sig = hex::encode(self.mac(timestamp, body)?.finalize().into_bytes());
        Ok(format!("t={timestamp},v1={sig}"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const NOW: i64 = 1_760_000_000;
    const BODY: &[u8] = br#"{"id":"evt_1","type":"payment_intent.succeeded"}"#;

    fn verifier() -> SignatureVerifier {
        SignatureVerifier::new(b"whsec_test", 300)
    }

    #[test]
    fn accepts_own_signature() {
        let v = verifier();
        let header = v.sign(BODY, NOW).unwrap();
        assert!(v.verify(Some(&header), BODY, NOW + 10).is_ok());
    }

    #[test]
    fn rejects_tampered_body() {
        let v = verifier();
        let header = v.sign(BODY, NOW).unwrap();
        assert!(v.verify(Some(&header), b"{}", NOW).is_err());
    }

    #[test]
    fn rejects_other_secret() {
        let header = SignatureVerifier::new(b"whsec_other", 300).sign(BODY, NOW).unwrap();
        assert!(verifier().verify(Some(&header), BODY, NOW).is_err());
    }

    #[test]
    fn rejects_stale_timestamp() {
        let v = verifier();
        let header = v.sign(BODY, NOW).unwrap();
        assert!(v.verify(Some(&header), BODY, NOW + 301).is_err());
        assert!(v.verify(Some(&header), BODY, NOW - 301).is_err());
    }

    #[test]
    fn accepts_any_matching_v1() {
        let v = verifier();
        let good = v.sign(BODY, NOW).unwrap();
        let Some((_, sig)) = good.split_once(",v1=") else {
            unreachable!("signed header always has v1");
        };
        let header = format!("t={NOW},v1=deadbeef,v1={sig}");
        assert!(v.verify(Some(&header), BODY, NOW).is_ok());
    }

    #[test]
    fn rejects_missing_or_malformed_header() {
        let v = verifier();
        assert!(v.verify(None, BODY, NOW).is_err());
        assert!(v.verify(Some("v1=abcd"), BODY, NOW).is_err());
        assert!(v.verify(Some(&format!("t={NOW}")), BODY, NOW).is_err());
        assert!(v.verify(Some("garbage"), BODY, NOW).is_err());
    }

    #[test]
    fn empty_secret_signs_without_panicking() {
        let v = SignatureVerifier::new(b"", 300);
        let header = v.sign(BODY, NOW).unwrap();
        assert!(v.verify(Some(&header), BODY, NOW).is_ok());
        assert!(verifier().verify(Some(&header), BODY, NOW).is_err());
    }
}
