//! User intents
//!
//! An intent is the caller's declared on-chain action. It carries the
//! estimates (quoted collateral, token amounts) that slippage bounds are
//! derived from, but never the bounds themselves: those are recomputed every
//! time a plan is built.

use crate::error::SubmissionError;
use crate::slippage::{bound_for_payment, Tolerance};
use alloy::primitives::{Address, I256, U256};
use serde::{Deserialize, Serialize};

/// Identifies a market inside a market group contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarketRef {
    /// Chain the market group is deployed on
    pub chain_id: u64,
    /// Market group contract (action target and approval spender)
    pub address: Address,
    /// Market (epoch) id within the group
    pub market_id: U256,
    /// ERC-20 collateral token
    pub collateral_asset: Address,
}

/// Direction of a liquidity modification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiquidityMode {
    Add,
    Remove,
}

/// A user-declared on-chain action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Intent {
    /// Open a trader position of `size` (negative = short)
    OpenTrade {
        market: MarketRef,
        size: I256,
        /// Quoted collateral the position requires
        max_collateral: U256,
    },
    /// Resize an existing trader position to `new_size`
    ModifyTrade {
        market: MarketRef,
        position_id: U256,
        new_size: I256,
        /// Quoted collateral change (positive = trader pays)
        collateral_delta: I256,
    },
    /// Close a trader position (resize to zero)
    CloseTrade {
        market: MarketRef,
        position_id: U256,
        /// Quoted collateral change, normally negative (returned to trader)
        #[serde(default)]
        collateral_delta: I256,
    },
    /// Open a liquidity position within a tick range
    OpenLiquidity {
        market: MarketRef,
        lower_tick: i32,
        upper_tick: i32,
        amount0: U256,
        amount1: U256,
        collateral: U256,
    },
    /// Add or remove liquidity from an existing position
    ModifyLiquidity {
        market: MarketRef,
        position_id: U256,
        mode: LiquidityMode,
        #[serde(default)]
        liquidity_delta: u128,
        amount0: U256,
        amount1: U256,
        /// Additional collateral deposited when adding
        #[serde(default)]
        collateral_delta: U256,
    },
}

impl Intent {
    /// Parse an intent from JSON, rejecting unknown kinds loudly
    pub fn from_json(value: serde_json::Value) -> Result<Self, SubmissionError> {
        let kind = value
            .get("kind")
            .and_then(|k| k.as_str())
            .map(str::to_string)
            .ok_or_else(|| SubmissionError::UnsupportedIntent("missing 'kind'".to_string()))?;

        serde_json::from_value(value).map_err(|e| {
            SubmissionError::UnsupportedIntent(format!("intent '{}' rejected: {}", kind, e))
        })
    }

    pub fn market(&self) -> &MarketRef {
        match self {
            Intent::OpenTrade { market, .. }
            | Intent::ModifyTrade { market, .. }
            | Intent::CloseTrade { market, .. }
            | Intent::OpenLiquidity { market, .. }
            | Intent::ModifyLiquidity { market, .. } => market,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.market().chain_id
    }

    /// Short name used in logs and notifications
    pub fn label(&self) -> &'static str {
        match self {
            Intent::OpenTrade { .. } => "open_trade",
            Intent::ModifyTrade { .. } => "modify_trade",
            Intent::CloseTrade { .. } => "close_trade",
            Intent::OpenLiquidity { .. } => "open_liquidity",
            Intent::ModifyLiquidity {
                mode: LiquidityMode::Add,
                ..
            } => "add_liquidity",
            Intent::ModifyLiquidity {
                mode: LiquidityMode::Remove,
                ..
            } => "remove_liquidity",
        }
    }

    /// Collateral the market group may pull from the trader for this intent.
    ///
    /// Trades are approved up to their slippage ceiling, not the raw quoted
    /// collateral, so a fill anywhere inside the limit never fails on
    /// allowance. The approval is still exact for that ceiling, never
    /// unlimited. Liquidity deposits are exact amounts.
    /// Zero means no approval step is needed.
    pub fn required_collateral(&self, tolerance: Tolerance) -> U256 {
        match self {
            Intent::OpenTrade { max_collateral, .. } => {
                bound_for_payment(*max_collateral, tolerance)
            }
            Intent::ModifyTrade {
                collateral_delta, ..
            }
            | Intent::CloseTrade {
                collateral_delta, ..
            } => {
                if collateral_delta.is_positive() {
                    bound_for_payment(collateral_delta.unsigned_abs(), tolerance)
                } else {
                    U256::ZERO
                }
            }
            Intent::OpenLiquidity { collateral, .. } => *collateral,
            Intent::ModifyLiquidity {
                mode: LiquidityMode::Add,
                collateral_delta,
                ..
            } => *collateral_delta,
            Intent::ModifyLiquidity {
                mode: LiquidityMode::Remove,
                ..
            } => U256::ZERO,
        }
    }

    pub fn requires_collateral(&self, tolerance: Tolerance) -> bool {
        !self.required_collateral(tolerance).is_zero()
    }
}
