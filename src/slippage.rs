//! Slippage bounds on collateral and token amounts
//!
//! Amounts the trader pays get a ceiling (estimate inflated by the tolerance),
//! amounts the trader receives get a floor (estimate deflated). Everything is
//! integer arithmetic on 256-bit values; floating point only appears when a
//! user-facing percentage is converted into basis points.

use alloy::primitives::{I256, U256};
use serde::{Deserialize, Serialize};

/// 100% expressed in basis points
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Slippage tolerance in basis points (50 = 0.5%)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tolerance(u32);

impl Tolerance {
    pub const ZERO: Tolerance = Tolerance(0);

    /// Create from basis points, capped at 100%
    pub fn from_bps(bps: u32) -> Self {
        Self(bps.min(BPS_DENOMINATOR))
    }

    /// Convert a percentage (e.g., 0.5 for 0.5%) via `floor(percent * 100)`
    ///
    /// Negative and non-finite inputs yield zero tolerance.
    pub fn from_percent(percent: f64) -> Self {
        if !percent.is_finite() || percent <= 0.0 {
            return Self::ZERO;
        }
        let bps = (percent * 100.0).floor();
        if bps >= BPS_DENOMINATOR as f64 {
            Self(BPS_DENOMINATOR)
        } else {
            Self(bps as u32)
        }
    }

    pub fn bps(&self) -> u32 {
        self.0
    }

    pub fn percent(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl std::fmt::Display for Tolerance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}%", self.percent())
    }
}

/// `value * factor / BPS_DENOMINATOR`, rounded down, without overflowing the
/// intermediate product.
fn scale_bps(value: U256, factor: u32) -> U256 {
    let denominator = U256::from(BPS_DENOMINATOR);
    let factor = U256::from(factor);
    let quotient = value / denominator;
    let remainder = value % denominator;
    // remainder * factor < 10_000 * 20_000, so only the first term can saturate
    quotient
        .saturating_mul(factor)
        .saturating_add(remainder * factor / denominator)
}

/// Maximum acceptable amount to pay: `estimate * (10000 + bps) / 10000`
pub fn bound_for_payment(estimate: U256, tolerance: Tolerance) -> U256 {
    if estimate.is_zero() {
        return U256::ZERO;
    }
    scale_bps(estimate, BPS_DENOMINATOR + tolerance.bps())
}

/// Minimum acceptable amount to receive: `estimate * (10000 - bps) / 10000`
pub fn bound_for_receipt(estimate: U256, tolerance: Tolerance) -> U256 {
    if estimate.is_zero() {
        return U256::ZERO;
    }
    scale_bps(estimate, BPS_DENOMINATOR - tolerance.bps())
}

/// Bound a signed collateral delta.
///
/// A positive delta is paid by the trader and gets the payment ceiling; a
/// negative delta is returned to the trader and gets the receipt floor on its
/// magnitude, which moves the limit toward zero.
pub fn bound_for_delta(delta: I256, tolerance: Tolerance) -> I256 {
    if delta.is_zero() {
        return I256::ZERO;
    }
    let magnitude = delta.unsigned_abs();
    if delta.is_positive() {
        I256::try_from(bound_for_payment(magnitude, tolerance)).unwrap_or(I256::MAX)
    } else {
        // receipt bound never exceeds |delta|, which already fits
        let bounded = I256::try_from(bound_for_receipt(magnitude, tolerance)).unwrap_or(I256::MAX);
        -bounded
    }
}
