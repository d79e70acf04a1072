//! Trade Submitter
//!
//! Turns a trading or liquidity intent against a market group contract into
//! on-chain calls:
//! - switches the wallet to the market's chain
//! - gates on the collateral allowance, approving exactly what is needed
//! - bounds collateral and token amounts by the slippage tolerance
//! - submits approval + action as one atomic batch when the wallet can,
//!   sequentially otherwise, and tracks the receipt
//!
//! # Security Model
//!
//! - Private keys never leave the wallet signer module
//! - Approvals are never unlimited
//! - Every submission transition can be written to a JSONL audit log

pub mod allowance;
pub mod config;
pub mod contracts;
pub mod intent;
pub mod market;
pub mod observers;
pub mod orchestrator;
pub mod plan;
pub mod quote;
pub mod slippage;
pub mod tick_math;
pub mod tokens;
pub mod wallet;

mod error;

pub use allowance::{has_sufficient_allowance, AllowanceTracker, ApprovalState};
pub use config::{BatchMode, Config, RpcConfig, SubmissionSettings};
pub use error::{Error, Remediation, Result, Step, SubmissionError};
pub use intent::{Intent, LiquidityMode, MarketRef};
pub use orchestrator::state::{Phase, SubmissionState};
pub use orchestrator::SubmissionOrchestrator;
pub use plan::{Call, CallKind, CallPlan, PlanBuilder};
pub use slippage::Tolerance;
