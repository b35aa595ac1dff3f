//! Integer yen amounts and the platform fee split.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::CommerceError;

/// Basis-point denominator (100% = 10 000 bps).
const BPS_DENOMINATOR: i64 = 10_000;

/// An amount of Japanese yen. Yen has no minor unit, so the value is exact.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    ToSchema,
)]
#[serde(transparent)]
pub struct Yen(i64);

impl Yen {
    /// Zero yen.
    pub const ZERO: Self = Self(0);

    /// Wraps a raw yen value.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw yen value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Multiplies a unit price by a quantity.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::InvalidRequest`] on overflow.
    pub fn times(self, quantity: u32) -> Result<Self, CommerceError> {
        self.0
            .checked_mul(i64::from(quantity))
            .map(Self)
            .ok_or_else(|| CommerceError::InvalidRequest("order total overflows".to_string()))
    }
}

impl fmt::Display for Yen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "¥{}", self.0)
    }
}

/// How an order total is divided between the platform and the artist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSplit {
    /// Amount charged to the buyer.
    pub total: Yen,
    /// Platform commission, rounded down.
    pub platform_fee: Yen,
    /// Amount owed to the selling artist.
    pub payout: Yen,
}

impl FeeSplit {
    /// Splits `total` using a fee rate expressed in basis points.
    ///
    /// The fee is rounded down so the artist never receives less than the
    /// exact share.
    #[must_use]
    pub fn compute(total: Yen, fee_bps: u32) -> Self {
        let bps = i64::from(fee_bps.min(10_000));
        let fee = i128::from(total.0) * i128::from(bps) / i128::from(BPS_DENOMINATOR);
        let platform_fee = Yen(i64::try_from(fee).unwrap_or(total.0));
        Self {
            total,
            platform_fee,
            payout: Yen(total.0 - platform_fee.0),
        }
    }
}
