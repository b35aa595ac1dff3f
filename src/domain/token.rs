//! Redemption tokens: the sole credential presented at pickup or entry.

use std::fmt;

use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Number of random bytes behind each token.
const TOKEN_BYTES: usize = 32;

/// Globally unique, unguessable redemption credential.
///
/// Generated from 256 bits of OS randomness and hex encoded. One token is
/// minted per merchandise order and one per issued ticket; the store
/// rejects any reuse across entities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RedemptionToken(String);

impl RedemptionToken {
    /// Mints a fresh random token.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Parses a token scanned from a QR code.
    ///
    /// Returns `None` when the input cannot possibly be a token, which
    /// callers treat the same as an unknown token.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let well_formed = raw.len() == TOKEN_BYTES * 2
            && raw.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        well_formed.then(|| Self(raw.to_string()))
    }

    /// Wraps a token read back from storage without validation.
    #[must_use]
    pub fn from_stored(raw: String) -> Self {
        Self(raw)
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RedemptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which scanner a token is presented to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RedemptionMode {
    /// Merchandise pickup or delivery confirmation; resolves orders.
    Merchandise,
    /// Event entry; resolves issued tickets.
    Ticket,
}

impl RedemptionMode {
    /// Wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Merchandise => "merchandise",
            Self::Ticket => "ticket",
        }
    }
}
