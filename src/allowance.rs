//! Token allowance tracking
//!
//! Reads ERC-20 allowances toward a spender and issues exact-amount approvals.
//! Reads are cached per (token, spender, chain) for the lifetime of one
//! submission; a confirmed approval always invalidates the cached entry so
//! the dependent action is gated on a fresh read.

use crate::contracts::IERC20;
use crate::error::{Step, SubmissionError};
use crate::plan::{Call, CallKind};
use crate::wallet::{WalletClient, WalletError};
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::sol_types::SolCall;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Allowance of `owner`'s `token` toward `spender` on `chain_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalState {
    pub token: Address,
    pub owner: Address,
    pub spender: Address,
    pub chain_id: u64,
    pub current_allowance: U256,
    pub required_amount: U256,
}

impl ApprovalState {
    pub fn has_allowance(&self) -> bool {
        has_sufficient_allowance(self, self.required_amount)
    }

    pub fn with_required(mut self, required_amount: U256) -> Self {
        self.required_amount = required_amount;
        self
    }
}

/// `current_allowance >= required`; a zero requirement is always sufficient
pub fn has_sufficient_allowance(state: &ApprovalState, required: U256) -> bool {
    required.is_zero() || state.current_allowance >= required
}

/// Cache key: (token, spender, chain)
pub type AllowanceKey = (Address, Address, u64);

/// Reads and caches allowances, submits approvals
pub struct AllowanceTracker {
    wallet: Arc<dyn WalletClient>,
    cache: Mutex<HashMap<AllowanceKey, U256>>,
}

impl AllowanceTracker {
    pub fn new(wallet: Arc<dyn WalletClient>) -> Self {
        Self {
            wallet,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Read the allowance, serving from cache when possible.
    ///
    /// An account that never approved reads as zero, which is a valid state.
    pub async fn check_allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
        chain_id: u64,
        required: U256,
    ) -> Result<ApprovalState, SubmissionError> {
        let key = (token, spender, chain_id);

        let current_allowance = match self.cached(&key) {
            Some(value) => value,
            None => {
                let value = self.read_allowance(token, owner, spender, chain_id).await?;
                self.store(key, value);
                value
            }
        };

        tracing::debug!(
            %token,
            %spender,
            chain_id,
            %current_allowance,
            %required,
            "Checked allowance"
        );

        Ok(ApprovalState {
            token,
            owner,
            spender,
            chain_id,
            current_allowance,
            required_amount: required,
        })
    }

    async fn read_allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
        chain_id: u64,
    ) -> Result<U256, SubmissionError> {
        let call = Call {
            to: token,
            data: Bytes::from(IERC20::allowanceCall { owner, spender }.abi_encode()),
            value: None,
            kind: CallKind::Read,
        };

        let raw = self
            .wallet
            .read_contract(chain_id, &call)
            .await
            .map_err(|e| SubmissionError::ReadError(format!("allowance of {}: {}", token, e)))?;

        IERC20::allowanceCall::abi_decode_returns(&raw).map_err(|e| {
            SubmissionError::ReadError(format!("undecodable allowance from {}: {}", token, e))
        })
    }

    /// Submit an approval for exactly `amount` (never unlimited)
    pub async fn request_approval(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
        chain_id: u64,
    ) -> Result<TxHash, SubmissionError> {
        let call = approval_call(token, spender, amount);

        tracing::info!(%token, %spender, %amount, chain_id, "Requesting token approval");

        self.wallet
            .send_transaction(chain_id, &call)
            .await
            .map_err(|e| match e {
                WalletError::UserRejected(msg) => SubmissionError::ApprovalRejected(msg),
                other => SubmissionError::ApprovalTxFailed(other.to_string()),
            })
    }

    /// Wait for an approval receipt, then drop the cached allowance so the
    /// next check reads the chain again.
    pub async fn confirm_approval(
        &self,
        token: Address,
        spender: Address,
        hash: TxHash,
        chain_id: u64,
        timeout: Duration,
    ) -> Result<(), SubmissionError> {
        let receipt = tokio::time::timeout(timeout, self.wallet.wait_for_receipt(hash, chain_id))
            .await
            .map_err(|_| SubmissionError::ConfirmationTimeout {
                step: Step::Approval,
                waited_secs: timeout.as_secs(),
            })?
            .map_err(|e| SubmissionError::ApprovalTxFailed(e.to_string()))?;

        self.invalidate(&(token, spender, chain_id));

        if !receipt.success {
            return Err(SubmissionError::ApprovalTxFailed(format!(
                "approval {} reverted",
                hash
            )));
        }

        tracing::info!(%hash, %token, chain_id, "Approval confirmed");
        Ok(())
    }

    pub fn invalidate(&self, key: &AllowanceKey) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.remove(key);
        }
    }

    /// Forget every cached allowance (called at the start of each submission)
    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    fn cached(&self, key: &AllowanceKey) -> Option<U256> {
        self.cache.lock().ok().and_then(|c| c.get(key).copied())
    }

    fn store(&self, key: AllowanceKey, value: U256) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, value);
        }
    }
}

pub(crate) fn approval_call(token: Address, spender: Address, amount: U256) -> Call {
    Call {
        to: token,
        data: Bytes::from(IERC20::approveCall { spender, amount }.abi_encode()),
        value: None,
        kind: CallKind::Approval,
    }
}
