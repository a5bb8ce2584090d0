//! Commission arithmetic in basis points over minor currency units.

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Default affiliate commission: 500 bp = 5.00%.
pub const DEFAULT_COMMISSION_BPS: u32 = 500;

const BPS_DENOMINATOR: u128 = 10_000;

/// A commission rate in basis points (1 bp = 0.01%).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommissionRate(u32);

impl CommissionRate {
    pub const DEFAULT: Self = Self(DEFAULT_COMMISSION_BPS);

    pub const fn from_bps(bps: u32) -> Self {
        Self(bps)
    }

    /// Accepts a signed value from an untyped source, rejecting anything
    /// outside `0..=u32::MAX`.
    pub fn try_from_bps(bps: i64) -> Result<Self, LedgerError> {
        u32::try_from(bps)
            .map(Self)
            .map_err(|_| LedgerError::InvalidCommissionRate(bps))
    }

    pub const fn bps(self) -> u32 {
        self.0
    }
}

impl Default for CommissionRate {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// `round(revenue_cents * rate / 10000)`, halves rounded away from zero.
///
/// Both inputs are unsigned so the result is never negative. The product is
/// taken in 128 bits; results beyond `u64::MAX` saturate.
pub fn compute_commission_cents(revenue_cents: u64, rate: CommissionRate) -> u64 {
    let scaled = u128::from(revenue_cents) * u128::from(rate.bps());
    let rounded = (scaled + BPS_DENOMINATOR / 2) / BPS_DENOMINATOR;
    u64::try_from(rounded).unwrap_or(u64::MAX)
}
