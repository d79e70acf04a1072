//! Wallet and chain access
//!
//! The orchestrator talks to the chain exclusively through [`WalletClient`].
//! The private key never leaves the signer module.

#[cfg(test)]
pub(crate) mod mock;
mod provider;
mod signer;

pub use provider::RpcWalletClient;
pub use signer::{SecureWallet, PRIVATE_KEY_VAR};

use crate::plan::Call;
use alloy::primitives::{Address, Bytes, TxHash};
use async_trait::async_trait;
use serde::Serialize;

/// Failures reported by a wallet/chain collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalletError {
    #[error("User rejected the request: {0}")]
    UserRejected(String),

    #[error("Batched calls are not supported by this wallet")]
    BatchUnsupported,

    #[error("Chain {0} is not configured")]
    UnknownChain(u64),

    #[error("Transaction reverted: {0}")]
    Reverted(String),

    #[error("RPC error: {0}")]
    Rpc(String),
}

impl WalletError {
    /// Classify a raw provider error message.
    ///
    /// EIP-1193 code 4001 and the common wallet phrasings are user rejections;
    /// revert reasons are reverts; everything else is an RPC failure.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("user rejected")
            || lower.contains("user denied")
            || lower.contains("rejected by user")
            || lower.contains("code: 4001")
            || lower.contains("code 4001")
        {
            WalletError::UserRejected(message)
        } else if lower.contains("execution reverted") {
            WalletError::Reverted(message)
        } else {
            WalletError::Rpc(message)
        }
    }
}

/// Minimal view of a mined transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxReceipt {
    pub hash: TxHash,
    pub success: bool,
    pub block_number: Option<u64>,
}

/// Wallet/chain collaborator.
///
/// Every method suspends on the network; implementations must be safe to
/// share between independent orchestrators.
#[async_trait]
pub trait WalletClient: Send + Sync {
    /// Connected account
    fn account(&self) -> Address;

    /// Chain the wallet is currently pointed at
    async fn active_chain(&self) -> Result<u64, WalletError>;

    /// Ask the wallet to switch chains
    async fn switch_chain(&self, chain_id: u64) -> Result<(), WalletError>;

    /// Execute a read-only call and return the raw return data
    async fn read_contract(&self, chain_id: u64, call: &Call) -> Result<Bytes, WalletError>;

    /// Sign and broadcast a single call
    async fn send_transaction(&self, chain_id: u64, call: &Call) -> Result<TxHash, WalletError>;

    /// Whether the wallet advertises atomic batched calls on `chain_id`
    async fn supports_batch(&self, chain_id: u64) -> bool;

    /// Sign and broadcast `calls` atomically, returning the bundle's tx hash
    async fn send_batch(&self, chain_id: u64, calls: &[Call]) -> Result<TxHash, WalletError>;

    /// Wait until `hash` is mined on `chain_id`
    async fn wait_for_receipt(&self, hash: TxHash, chain_id: u64)
        -> Result<TxReceipt, WalletError>;
}
