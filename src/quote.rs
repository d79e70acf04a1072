//! On-chain trade and liquidity quotes
//!
//! Quotes are the estimates intents carry. They are read fresh before each
//! submission; slippage bounds are applied later, when the plan is built.

use crate::contracts::IMarketGroup;
use crate::error::SubmissionError;
use crate::intent::{Intent, LiquidityMode, MarketRef};
use crate::plan::{Call, CallKind};
use crate::tick_math::sqrt_ratio_at_tick;
use crate::wallet::WalletClient;
use alloy::primitives::aliases::U160;
use alloy::primitives::{I256, U256};
use alloy::sol_types::SolCall;
use serde::Serialize;

/// Quote for opening a trader position
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenQuote {
    pub required_collateral: U256,
    pub fill_price: U256,
    /// Pool price after the fill (18 decimals)
    pub price_after: U256,
}

impl OpenQuote {
    pub fn into_intent(self, market: MarketRef, size: I256) -> Intent {
        Intent::OpenTrade {
            market,
            size,
            max_collateral: self.required_collateral,
        }
    }
}

/// Quote for resizing (or closing) a trader position
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModifyQuote {
    /// Positive: trader pays; negative: trader receives
    pub collateral_delta: I256,
    pub close_pnl: I256,
    pub fill_price: U256,
    pub price_after: U256,
}

impl ModifyQuote {
    pub fn into_intent(self, market: MarketRef, position_id: U256, new_size: I256) -> Intent {
        if new_size.is_zero() {
            Intent::CloseTrade {
                market,
                position_id,
                collateral_delta: self.collateral_delta,
            }
        } else {
            Intent::ModifyTrade {
                market,
                position_id,
                new_size,
                collateral_delta: self.collateral_delta,
            }
        }
    }
}

pub async fn quote_open_trade(
    wallet: &dyn WalletClient,
    market: &MarketRef,
    size: I256,
) -> Result<OpenQuote, SubmissionError> {
    if size.is_zero() {
        return Err(SubmissionError::UnsupportedIntent(
            "cannot quote a zero-size trade".to_string(),
        ));
    }

    let call = Call::new(
        market.address,
        IMarketGroup::quoteCreateTraderPositionCall {
            marketId: market.market_id,
            size,
        },
        CallKind::Read,
    );
    let raw = read(wallet, market, &call, "quoteCreateTraderPosition").await?;

    let ret = IMarketGroup::quoteCreateTraderPositionCall::abi_decode_returns(&raw)
        .map_err(|e| SubmissionError::ReadError(format!("undecodable open quote: {}", e)))?;

    tracing::debug!(
        market_id = %market.market_id,
        %size,
        required_collateral = %ret.requiredCollateral,
        fill_price = %ret.fillPrice,
        "Quoted open trade"
    );

    Ok(OpenQuote {
        required_collateral: ret.requiredCollateral,
        fill_price: ret.fillPrice,
        price_after: ret.price18DigitsAfter,
    })
}

pub async fn quote_modify_trade(
    wallet: &dyn WalletClient,
    market: &MarketRef,
    position_id: U256,
    new_size: I256,
) -> Result<ModifyQuote, SubmissionError> {
    let call = Call::new(
        market.address,
        IMarketGroup::quoteModifyTraderPositionCall {
            positionId: position_id,
            size: new_size,
        },
        CallKind::Read,
    );
    let raw = read(wallet, market, &call, "quoteModifyTraderPosition").await?;

    let ret = IMarketGroup::quoteModifyTraderPositionCall::abi_decode_returns(&raw)
        .map_err(|e| SubmissionError::ReadError(format!("undecodable modify quote: {}", e)))?;

    tracing::debug!(
        %position_id,
        %new_size,
        collateral_delta = %ret.expectedCollateralDelta,
        "Quoted position change"
    );

    Ok(ModifyQuote {
        collateral_delta: ret.expectedCollateralDelta,
        close_pnl: ret.closePnL,
        fill_price: ret.fillPrice,
        price_after: ret.price18DigitsAfter,
    })
}

/// Quote for opening a liquidity position
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiquidityQuote {
    pub lower_tick: i32,
    pub upper_tick: i32,
    pub collateral: U256,
    pub amount0: U256,
    pub amount1: U256,
    pub liquidity: u128,
}

impl LiquidityQuote {
    pub fn into_intent(self, market: MarketRef) -> Intent {
        Intent::OpenLiquidity {
            market,
            lower_tick: self.lower_tick,
            upper_tick: self.upper_tick,
            amount0: self.amount0,
            amount1: self.amount1,
            collateral: self.collateral,
        }
    }
}

/// An existing liquidity position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LiquidityPosition {
    pub id: U256,
    pub lower_tick: i32,
    pub upper_tick: i32,
    pub liquidity: u128,
    /// Collateral currently backing the position
    pub deposited_collateral: U256,
}

/// Quote for adding to or removing from a liquidity position
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModifyLiquidityQuote {
    pub mode: LiquidityMode,
    pub liquidity_delta: u128,
    pub new_liquidity: u128,
    pub amount0: U256,
    pub amount1: U256,
    /// Collateral the position needs after the change (zero when closed out)
    pub required_collateral: U256,
}

impl ModifyLiquidityQuote {
    /// Intent for this change. Adding deposits only the collateral the
    /// position is short of.
    pub fn into_intent(self, market: MarketRef, position: &LiquidityPosition) -> Intent {
        let collateral_delta = match self.mode {
            LiquidityMode::Add => self
                .required_collateral
                .saturating_sub(position.deposited_collateral),
            LiquidityMode::Remove => U256::ZERO,
        };
        Intent::ModifyLiquidity {
            market,
            position_id: position.id,
            mode: self.mode,
            liquidity_delta: self.liquidity_delta,
            amount0: self.amount0,
            amount1: self.amount1,
            collateral_delta,
        }
    }
}

pub async fn quote_create_liquidity(
    wallet: &dyn WalletClient,
    market: &MarketRef,
    collateral: U256,
    lower_tick: i32,
    upper_tick: i32,
) -> Result<LiquidityQuote, SubmissionError> {
    if collateral.is_zero() {
        return Err(SubmissionError::UnsupportedIntent(
            "cannot quote liquidity without collateral".to_string(),
        ));
    }
    let (lower, upper) = price_range(lower_tick, upper_tick)?;
    let current = sqrt_price(wallet, market).await?;

    let call = Call::new(
        market.address,
        IMarketGroup::quoteLiquidityPositionTokensCall {
            marketId: market.market_id,
            depositedCollateralAmount: collateral,
            sqrtPriceX96: current,
            sqrtPriceAX96: lower,
            sqrtPriceBX96: upper,
        },
        CallKind::Read,
    );
    let raw = read(wallet, market, &call, "quoteLiquidityPositionTokens").await?;
    let ret = IMarketGroup::quoteLiquidityPositionTokensCall::abi_decode_returns(&raw)
        .map_err(|e| SubmissionError::ReadError(format!("undecodable liquidity quote: {}", e)))?;

    tracing::debug!(
        market_id = %market.market_id,
        lower_tick,
        upper_tick,
        %collateral,
        amount0 = %ret.amount0,
        amount1 = %ret.amount1,
        "Quoted liquidity position"
    );

    Ok(LiquidityQuote {
        lower_tick,
        upper_tick,
        collateral,
        amount0: ret.amount0,
        amount1: ret.amount1,
        liquidity: ret.liquidity,
    })
}

pub async fn quote_modify_liquidity(
    wallet: &dyn WalletClient,
    market: &MarketRef,
    position: &LiquidityPosition,
    mode: LiquidityMode,
    liquidity_delta: u128,
) -> Result<ModifyLiquidityQuote, SubmissionError> {
    if liquidity_delta == 0 {
        return Err(SubmissionError::UnsupportedIntent(
            "cannot quote a zero liquidity change".to_string(),
        ));
    }
    let new_liquidity = match mode {
        LiquidityMode::Add => position.liquidity.checked_add(liquidity_delta),
        LiquidityMode::Remove => position.liquidity.checked_sub(liquidity_delta),
    }
    .ok_or_else(|| {
        SubmissionError::UnsupportedIntent(format!(
            "liquidity change of {} is out of range for position {} holding {}",
            liquidity_delta, position.id, position.liquidity
        ))
    })?;

    let (lower, upper) = price_range(position.lower_tick, position.upper_tick)?;
    let current = sqrt_price(wallet, market).await?;

    let call = Call::new(
        market.address,
        IMarketGroup::getTokensFromLiquidityCall {
            liquidity: liquidity_delta,
            sqrtPriceX96: current,
            sqrtPriceAX96: lower,
            sqrtPriceBX96: upper,
        },
        CallKind::Read,
    );
    let raw = read(wallet, market, &call, "getTokensFromLiquidity").await?;
    let tokens = IMarketGroup::getTokensFromLiquidityCall::abi_decode_returns(&raw)
        .map_err(|e| SubmissionError::ReadError(format!("undecodable token amounts: {}", e)))?;

    // a fully removed position needs no collateral
    let required_collateral = if new_liquidity == 0 {
        U256::ZERO
    } else {
        let call = Call::new(
            market.address,
            IMarketGroup::quoteRequiredCollateralCall {
                positionId: position.id,
                liquidity: new_liquidity,
            },
            CallKind::Read,
        );
        let raw = read(wallet, market, &call, "quoteRequiredCollateral").await?;
        IMarketGroup::quoteRequiredCollateralCall::abi_decode_returns(&raw).map_err(|e| {
            SubmissionError::ReadError(format!("undecodable collateral quote: {}", e))
        })?
    };

    tracing::debug!(
        position_id = %position.id,
        ?mode,
        liquidity_delta,
        new_liquidity,
        %required_collateral,
        "Quoted liquidity change"
    );

    Ok(ModifyLiquidityQuote {
        mode,
        liquidity_delta,
        new_liquidity,
        amount0: tokens.amount0,
        amount1: tokens.amount1,
        required_collateral,
    })
}

fn price_range(lower_tick: i32, upper_tick: i32) -> Result<(U160, U160), SubmissionError> {
    if lower_tick >= upper_tick {
        return Err(SubmissionError::UnsupportedIntent(format!(
            "empty tick range [{}, {}]",
            lower_tick, upper_tick
        )));
    }
    let ratio = |tick| {
        sqrt_ratio_at_tick(tick).ok_or_else(|| {
            SubmissionError::UnsupportedIntent(format!("tick {} is out of range", tick))
        })
    };
    Ok((ratio(lower_tick)?, ratio(upper_tick)?))
}

async fn sqrt_price(wallet: &dyn WalletClient, market: &MarketRef) -> Result<U160, SubmissionError> {
    let call = Call::new(
        market.address,
        IMarketGroup::getSqrtPriceX96Call {
            marketId: market.market_id,
        },
        CallKind::Read,
    );
    let raw = read(wallet, market, &call, "getSqrtPriceX96").await?;
    IMarketGroup::getSqrtPriceX96Call::abi_decode_returns(&raw)
        .map_err(|e| SubmissionError::ReadError(format!("undecodable pool price: {}", e)))
}

async fn read(
    wallet: &dyn WalletClient,
    market: &MarketRef,
    call: &Call,
    what: &str,
) -> Result<alloy::primitives::Bytes, SubmissionError> {
    wallet
        .read_contract(market.chain_id, call)
        .await
        .map_err(|e| SubmissionError::ReadError(format!("{} on {}: {}", what, market.address, e)))
}
