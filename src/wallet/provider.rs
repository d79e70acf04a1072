//! RPC-backed wallet client
//!
//! Signs locally with [`SecureWallet`] and talks to one HTTP endpoint per
//! chain. Every send is simulated with `eth_call` first so reverts surface
//! with a readable reason before anything is signed.

use super::{SecureWallet, TxReceipt, WalletClient, WalletError};
use crate::config::RpcConfig;
use crate::plan::Call;
use alloy::hex;
use alloy::primitives::{Address, Bytes, TxHash};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Externally-owned account client: no atomic batching
pub struct RpcWalletClient {
    /// `None` for read-only use (quotes, allowance checks, dry runs)
    signer: Option<SecureWallet>,
    account: Address,
    rpc: RpcConfig,
    active_chain: AtomicU64,
    poll_interval: Duration,
}

impl RpcWalletClient {
    pub fn new(signer: SecureWallet, rpc: RpcConfig, chain_id: u64, poll_interval: Duration) -> Self {
        Self {
            account: signer.address(),
            signer: Some(signer),
            rpc,
            active_chain: AtomicU64::new(chain_id),
            poll_interval,
        }
    }

    /// Client that can read as `account` but never sign
    pub fn read_only(account: Address, rpc: RpcConfig, chain_id: u64, poll_interval: Duration) -> Self {
        Self {
            signer: None,
            account,
            rpc,
            active_chain: AtomicU64::new(chain_id),
            poll_interval,
        }
    }

    fn provider(&self, chain_id: u64) -> Result<DynProvider, WalletError> {
        let url: url::Url = self
            .rpc
            .get(chain_id)
            .ok_or(WalletError::UnknownChain(chain_id))?
            .parse()
            .map_err(|e| WalletError::Rpc(format!("invalid RPC URL for chain {}: {}", chain_id, e)))?;

        Ok(match &self.signer {
            Some(signer) => ProviderBuilder::new()
                .wallet(signer.wallet().clone())
                .connect_http(url)
                .erased(),
            None => ProviderBuilder::new().connect_http(url).erased(),
        })
    }

    fn request(&self, call: &Call) -> TransactionRequest {
        let tx = TransactionRequest::default()
            .from(self.account)
            .to(call.to)
            .input(call.data.clone().into());

        match call.value {
            Some(value) => tx.value(value),
            None => tx,
        }
    }
}

#[async_trait]
impl WalletClient for RpcWalletClient {
    fn account(&self) -> Address {
        self.account
    }

    async fn active_chain(&self) -> Result<u64, WalletError> {
        Ok(self.active_chain.load(Ordering::SeqCst))
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), WalletError> {
        let provider = self.provider(chain_id)?;

        let remote = provider
            .get_chain_id()
            .await
            .map_err(|e| WalletError::from_message(e.to_string()))?;
        if remote != chain_id {
            return Err(WalletError::Rpc(format!(
                "endpoint for chain {} reports chain {}",
                chain_id, remote
            )));
        }

        self.active_chain.store(chain_id, Ordering::SeqCst);
        tracing::info!(chain_id, "Switched active chain");
        Ok(())
    }

    async fn read_contract(&self, chain_id: u64, call: &Call) -> Result<Bytes, WalletError> {
        let provider = self.provider(chain_id)?;
        provider
            .call(self.request(call))
            .await
            .map_err(|e| WalletError::from_message(e.to_string()))
    }

    async fn send_transaction(&self, chain_id: u64, call: &Call) -> Result<TxHash, WalletError> {
        if self.signer.is_none() {
            return Err(WalletError::Rpc("read-only client cannot sign".to_string()));
        }
        let provider = self.provider(chain_id)?;
        let tx = self.request(call);

        if let Err(e) = provider.call(tx.clone()).await {
            let reason = parse_revert_reason(&e.to_string());
            tracing::warn!(kind = ?call.kind, to = %call.to, %reason, "Simulation reverted");
            return Err(WalletError::Reverted(reason));
        }

        let pending = provider
            .send_transaction(tx)
            .await
            .map_err(|e| WalletError::from_message(e.to_string()))?;

        let hash = *pending.tx_hash();
        tracing::info!(kind = ?call.kind, %hash, chain_id, "Transaction broadcast");
        Ok(hash)
    }

    async fn supports_batch(&self, _chain_id: u64) -> bool {
        false
    }

    async fn send_batch(&self, _chain_id: u64, _calls: &[Call]) -> Result<TxHash, WalletError> {
        Err(WalletError::BatchUnsupported)
    }

    async fn wait_for_receipt(
        &self,
        hash: TxHash,
        chain_id: u64,
    ) -> Result<TxReceipt, WalletError> {
        let provider = self.provider(chain_id)?;

        loop {
            let receipt = provider
                .get_transaction_receipt(hash)
                .await
                .map_err(|e| WalletError::from_message(e.to_string()))?;

            if let Some(receipt) = receipt {
                return Ok(TxReceipt {
                    hash,
                    success: receipt.status(),
                    block_number: receipt.block_number,
                });
            }

            tracing::trace!(%hash, "Receipt not yet available");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Extract a readable revert reason from an RPC error message
pub(crate) fn parse_revert_reason(error: &str) -> String {
    if !error.contains("execution reverted") {
        return error.to_string();
    }

    if let Some(start) = error.find("revert: ") {
        let reason = &error[start + 8..];
        return match reason.find('"') {
            Some(end) => reason[..end].to_string(),
            None => reason.to_string(),
        };
    }

    if let Some(start) = error.find("0x") {
        let data = &error[start..];
        let end = data[2..]
            .find(|c: char| !c.is_ascii_hexdigit())
            .map_or(data.len(), |i| i + 2);
        let data = &data[..end];

        // Error(string): selector + offset word + length word, then the bytes
        if data.starts_with("0x08c379a0") && data.len() > 138 {
            if let Ok(decoded) = hex::decode(&data[138..]) {
                let filtered: Vec<u8> = decoded.into_iter().filter(|&b| b != 0).collect();
                if let Ok(s) = String::from_utf8(filtered) {
                    return s;
                }
            }
        }
        return format!("Reverted with data: {}", data);
    }

    "execution reverted".to_string()
}
