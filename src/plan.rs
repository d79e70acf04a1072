//! Call plan construction
//!
//! Turns an intent plus its approval state into the ordered list of calls
//! that realise it. When an approval is required it is always the first call;
//! a plan is never reordered after it is built.

use crate::allowance::{has_sufficient_allowance, ApprovalState};
use crate::contracts::{
    IMarketGroup, IERC20, LiquidityDecreaseParams, LiquidityIncreaseParams, LiquidityMintParams,
};
use crate::error::SubmissionError;
use crate::intent::{Intent, LiquidityMode};
use crate::slippage::{bound_for_delta, bound_for_payment, bound_for_receipt, Tolerance};
use alloy::primitives::aliases::I24;
use alloy::primitives::{Address, Bytes, I256, U256};
use alloy::sol_types::SolCall;
use serde::Serialize;
use std::time::Duration;

/// Default window between plan build and the on-chain deadline
pub const DEFAULT_DEADLINE_WINDOW: Duration = Duration::from_secs(30 * 60);

/// What a call does, for logging and notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    /// Read-only `eth_call`, never broadcast
    Read,
    Approval,
    CreateTraderPosition,
    ModifyTraderPosition,
    CreateLiquidityPosition,
    IncreaseLiquidityPosition,
    DecreaseLiquidityPosition,
}

/// A single on-chain call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Call {
    pub to: Address,
    pub data: Bytes,
    pub value: Option<U256>,
    pub kind: CallKind,
}

impl Call {
    pub(crate) fn new(to: Address, call: impl SolCall, kind: CallKind) -> Self {
        Self {
            to,
            data: Bytes::from(call.abi_encode()),
            value: None,
            kind,
        }
    }

    pub fn is_approval(&self) -> bool {
        self.kind == CallKind::Approval
    }
}

/// Ordered calls for one intent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallPlan {
    calls: Vec<Call>,
    chain_id: u64,
    /// Unix timestamp stamped into every deadline-bearing call
    deadline: u64,
    /// Collateral approved by the leading approval call (zero if none)
    approval_amount: U256,
}

impl CallPlan {
    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn deadline(&self) -> u64 {
        self.deadline
    }

    pub fn needs_approval(&self) -> bool {
        self.calls.first().is_some_and(Call::is_approval)
    }

    pub fn approval_amount(&self) -> U256 {
        self.approval_amount
    }

    pub fn approval(&self) -> Option<&Call> {
        self.calls.first().filter(|c| c.is_approval())
    }

    /// The action call (always last)
    pub fn action(&self) -> Option<&Call> {
        self.calls.last().filter(|c| !c.is_approval())
    }
}

/// Builds call plans from intents
#[derive(Debug, Clone)]
pub struct PlanBuilder {
    deadline_window: Duration,
}

impl Default for PlanBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_DEADLINE_WINDOW)
    }
}

impl PlanBuilder {
    pub fn new(deadline_window: Duration) -> Self {
        Self { deadline_window }
    }

    /// Build the plan for `intent`.
    ///
    /// `now` is the unix time the deadline is stamped from. `approval` is the
    /// tracked allowance of the intent's collateral toward its market group,
    /// or `None` when the intent needs no collateral.
    pub fn build(
        &self,
        intent: &Intent,
        approval: Option<&ApprovalState>,
        tolerance: Tolerance,
        now: u64,
    ) -> Result<CallPlan, SubmissionError> {
        let market = intent.market();
        let deadline = now.saturating_add(self.deadline_window.as_secs());
        let required = intent.required_collateral(tolerance);

        let needs_approval = !required.is_zero()
            && !approval.is_some_and(|state| {
                state.token == market.collateral_asset
                    && state.spender == market.address
                    && state.chain_id == market.chain_id
                    && has_sufficient_allowance(state, required)
            });

        let action = self.action_call(intent, tolerance, deadline)?;

        let mut calls = Vec::with_capacity(2);
        if needs_approval {
            calls.push(Call::new(
                market.collateral_asset,
                IERC20::approveCall {
                    spender: market.address,
                    amount: required,
                },
                CallKind::Approval,
            ));
        }
        calls.push(action);

        tracing::debug!(
            intent = intent.label(),
            chain_id = market.chain_id,
            calls = calls.len(),
            needs_approval,
            %required,
            deadline,
            "Built call plan"
        );

        Ok(CallPlan {
            calls,
            chain_id: market.chain_id,
            deadline,
            approval_amount: if needs_approval { required } else { U256::ZERO },
        })
    }

    fn action_call(
        &self,
        intent: &Intent,
        tolerance: Tolerance,
        deadline: u64,
    ) -> Result<Call, SubmissionError> {
        let deadline = U256::from(deadline);

        let call = match intent {
            Intent::OpenTrade {
                market,
                size,
                max_collateral,
            } => {
                if size.is_zero() {
                    return Err(unsupported("open_trade with zero size"));
                }
                if max_collateral.is_zero() {
                    return Err(unsupported("open_trade without collateral estimate"));
                }
                Call::new(
                    market.address,
                    IMarketGroup::createTraderPositionCall {
                        marketId: market.market_id,
                        size: *size,
                        deltaCollateralLimit: bound_for_payment(*max_collateral, tolerance),
                        deadline,
                    },
                    CallKind::CreateTraderPosition,
                )
            }
            Intent::ModifyTrade {
                market,
                position_id,
                new_size,
                collateral_delta,
            } => Call::new(
                market.address,
                IMarketGroup::modifyTraderPositionCall {
                    positionId: *position_id,
                    size: *new_size,
                    deltaCollateralLimit: bound_for_delta(*collateral_delta, tolerance),
                    deadline,
                },
                CallKind::ModifyTraderPosition,
            ),
            Intent::CloseTrade {
                market,
                position_id,
                collateral_delta,
            } => Call::new(
                market.address,
                IMarketGroup::modifyTraderPositionCall {
                    positionId: *position_id,
                    size: I256::ZERO,
                    deltaCollateralLimit: bound_for_delta(*collateral_delta, tolerance),
                    deadline,
                },
                CallKind::ModifyTraderPosition,
            ),
            Intent::OpenLiquidity {
                market,
                lower_tick,
                upper_tick,
                amount0,
                amount1,
                collateral,
            } => {
                if lower_tick >= upper_tick {
                    return Err(unsupported(&format!(
                        "open_liquidity with empty tick range [{}, {}]",
                        lower_tick, upper_tick
                    )));
                }
                if collateral.is_zero() {
                    return Err(unsupported("open_liquidity without collateral"));
                }
                Call::new(
                    market.address,
                    IMarketGroup::createLiquidityPositionCall {
                        params: LiquidityMintParams {
                            epochId: market.market_id,
                            amountTokenA: *amount0,
                            amountTokenB: *amount1,
                            collateralAmount: *collateral,
                            lowerTick: tick(*lower_tick)?,
                            upperTick: tick(*upper_tick)?,
                            minAmountTokenA: bound_for_receipt(*amount0, tolerance),
                            minAmountTokenB: bound_for_receipt(*amount1, tolerance),
                            deadline,
                        },
                    },
                    CallKind::CreateLiquidityPosition,
                )
            }
            Intent::ModifyLiquidity {
                market,
                position_id,
                mode: LiquidityMode::Add,
                amount0,
                amount1,
                collateral_delta,
                ..
            } => Call::new(
                market.address,
                IMarketGroup::increaseLiquidityPositionCall {
                    params: LiquidityIncreaseParams {
                        positionId: *position_id,
                        collateralAmount: *collateral_delta,
                        gasTokenAmount: *amount0,
                        ethTokenAmount: *amount1,
                        minGasAmount: bound_for_receipt(*amount0, tolerance),
                        minEthAmount: bound_for_receipt(*amount1, tolerance),
                        deadline,
                    },
                },
                CallKind::IncreaseLiquidityPosition,
            ),
            Intent::ModifyLiquidity {
                market,
                position_id,
                mode: LiquidityMode::Remove,
                liquidity_delta,
                amount0,
                amount1,
                ..
            } => {
                if *liquidity_delta == 0 {
                    return Err(unsupported("remove_liquidity with zero liquidity"));
                }
                Call::new(
                    market.address,
                    IMarketGroup::decreaseLiquidityPositionCall {
                        params: LiquidityDecreaseParams {
                            positionId: *position_id,
                            liquidity: *liquidity_delta,
                            minGasAmount: bound_for_receipt(*amount0, tolerance),
                            minEthAmount: bound_for_receipt(*amount1, tolerance),
                            deadline,
                        },
                    },
                    CallKind::DecreaseLiquidityPosition,
                )
            }
        };

        Ok(call)
    }
}

fn unsupported(reason: &str) -> SubmissionError {
    SubmissionError::UnsupportedIntent(reason.to_string())
}

fn tick(value: i32) -> Result<I24, SubmissionError> {
    I24::try_from(value).map_err(|_| unsupported(&format!("tick {} out of int24 range", value)))
}
