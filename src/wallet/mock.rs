//! Scripted in-memory wallet for tests

use super::{TxReceipt, WalletClient, WalletError};
use crate::contracts::IERC20;
use crate::plan::{Call, CallKind};
use alloy::primitives::{address, Address, Bytes, TxHash, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

pub const ACCOUNT: Address = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");

/// Everything the mock was asked to do, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    SwitchChain(u64),
    Send(CallKind, TxHash),
    Batch(Vec<CallKind>, TxHash),
    BatchRefused,
    Receipt(TxHash),
}

#[derive(Default)]
struct Script {
    active_chain: u64,
    allowances: HashMap<(Address, Address), U256>,
    read_failure: Option<String>,
    read_response: Option<Bytes>,
    responses_by_selector: HashMap<[u8; 4], Bytes>,
    batch_supported: bool,
    batch_error: Option<WalletError>,
    switch_error: Option<WalletError>,
    reject_sends: bool,
    fail_kind: Option<(CallKind, WalletError)>,
    revert_receipts: bool,
    revert_kind: Option<CallKind>,
    stall_receipts: bool,
    receipt_gate: Option<Arc<Semaphore>>,
    sent: Vec<Call>,
    events: Vec<WalletEvent>,
    kinds_by_hash: HashMap<TxHash, CallKind>,
    next_hash: u8,
}

pub struct MockWallet {
    script: Mutex<Script>,
    reads: AtomicUsize,
}

impl MockWallet {
    pub fn new(active_chain: u64) -> Self {
        Self {
            script: Mutex::new(Script {
                active_chain,
                ..Default::default()
            }),
            reads: AtomicUsize::new(0),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Script) -> R) -> R {
        f(&mut self.script.lock().unwrap())
    }

    pub fn set_allowance(&self, token: Address, spender: Address, value: U256) {
        self.with(|s| s.allowances.insert((token, spender), value));
    }

    pub fn fail_reads(&self, message: &str) {
        self.with(|s| s.read_failure = Some(message.to_string()));
    }

    /// Raw return data for any non-allowance read
    pub fn respond_to_reads(&self, data: Vec<u8>) {
        self.with(|s| s.read_response = Some(Bytes::from(data)));
    }

    /// Answer reads of the function with `selector` with `data`
    pub fn respond_to(&self, selector: [u8; 4], data: Vec<u8>) {
        self.with(|s| {
            s.responses_by_selector.insert(selector, Bytes::from(data));
        });
    }

    pub fn support_batch(&self) {
        self.with(|s| s.batch_supported = true);
    }

    /// Batch support is advertised but `send_batch` fails with `error`
    pub fn fail_batch(&self, error: WalletError) {
        self.with(|s| {
            s.batch_supported = true;
            s.batch_error = Some(error);
        });
    }

    pub fn reject_switch(&self) {
        self.with(|s| {
            s.switch_error = Some(WalletError::UserRejected("User rejected the request.".into()))
        });
    }

    pub fn fail_switch(&self, error: WalletError) {
        self.with(|s| s.switch_error = Some(error));
    }

    pub fn reject_sends(&self) {
        self.with(|s| s.reject_sends = true);
    }

    pub fn fail_sends_of(&self, kind: CallKind, error: WalletError) {
        self.with(|s| s.fail_kind = Some((kind, error)));
    }

    pub fn revert_receipts(&self) {
        self.with(|s| s.revert_receipts = true);
    }

    pub fn revert_receipts_of(&self, kind: CallKind) {
        self.with(|s| s.revert_kind = Some(kind));
    }

    /// Receipts never arrive
    pub fn stall_receipts(&self) {
        self.with(|s| s.stall_receipts = true);
    }

    /// Each receipt waits for one permit on the returned semaphore
    pub fn hold_receipts(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.with(|s| s.receipt_gate = Some(gate.clone()));
        gate
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn sent_calls(&self) -> Vec<Call> {
        self.with(|s| s.sent.clone())
    }

    pub fn events(&self) -> Vec<WalletEvent> {
        self.with(|s| s.events.clone())
    }

    pub fn sent_kinds(&self) -> Vec<CallKind> {
        self.with(|s| s.sent.iter().map(|c| c.kind).collect())
    }

    pub fn current_chain(&self) -> u64 {
        self.with(|s| s.active_chain)
    }
}

impl Script {
    fn mint_hash(&mut self, kind: CallKind) -> TxHash {
        self.next_hash += 1;
        let hash = TxHash::with_last_byte(self.next_hash);
        self.kinds_by_hash.insert(hash, kind);
        hash
    }

    /// Mined immediately: approvals take effect on send
    fn apply(&mut self, call: &Call) {
        if call.is_approval() {
            if let Ok(approve) = IERC20::approveCall::abi_decode(&call.data) {
                self.allowances
                    .insert((call.to, approve.spender), approve.amount);
            }
        }
        self.sent.push(call.clone());
    }
}

#[async_trait]
impl WalletClient for MockWallet {
    fn account(&self) -> Address {
        ACCOUNT
    }

    async fn active_chain(&self) -> Result<u64, WalletError> {
        Ok(self.with(|s| s.active_chain))
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), WalletError> {
        tokio::task::yield_now().await;
        self.with(|s| {
            s.events.push(WalletEvent::SwitchChain(chain_id));
            match s.switch_error.clone() {
                Some(err) => Err(err),
                None => {
                    s.active_chain = chain_id;
                    Ok(())
                }
            }
        })
    }

    async fn read_contract(&self, _chain_id: u64, call: &Call) -> Result<Bytes, WalletError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.with(|s| {
            if let Some(msg) = &s.read_failure {
                return Err(WalletError::Rpc(msg.clone()));
            }
            if let Ok(query) = IERC20::allowanceCall::abi_decode(&call.data) {
                let value = s
                    .allowances
                    .get(&(call.to, query.spender))
                    .copied()
                    .unwrap_or_default();
                return Ok(Bytes::from(value.to_be_bytes::<32>().to_vec()));
            }
            if let Some(data) = call
                .data
                .get(..4)
                .and_then(|selector| s.responses_by_selector.get(selector))
            {
                return Ok(data.clone());
            }
            s.read_response
                .clone()
                .ok_or_else(|| WalletError::Rpc("no scripted response".into()))
        })
    }

    async fn send_transaction(&self, _chain_id: u64, call: &Call) -> Result<TxHash, WalletError> {
        tokio::task::yield_now().await;
        self.with(|s| {
            if s.reject_sends {
                return Err(WalletError::UserRejected("User denied transaction signature.".into()));
            }
            if let Some((kind, err)) = &s.fail_kind {
                if *kind == call.kind {
                    return Err(err.clone());
                }
            }
            s.apply(call);
            let hash = s.mint_hash(call.kind);
            s.events.push(WalletEvent::Send(call.kind, hash));
            Ok(hash)
        })
    }

    async fn supports_batch(&self, _chain_id: u64) -> bool {
        self.with(|s| s.batch_supported)
    }

    async fn send_batch(&self, _chain_id: u64, calls: &[Call]) -> Result<TxHash, WalletError> {
        tokio::task::yield_now().await;
        self.with(|s| {
            if !s.batch_supported {
                s.events.push(WalletEvent::BatchRefused);
                return Err(WalletError::BatchUnsupported);
            }
            if let Some(err) = s.batch_error.clone() {
                s.events.push(WalletEvent::BatchRefused);
                return Err(err);
            }
            for call in calls {
                s.apply(call);
            }
            let last = calls.last().map(|c| c.kind).unwrap_or(CallKind::Approval);
            let hash = s.mint_hash(last);
            s.events
                .push(WalletEvent::Batch(calls.iter().map(|c| c.kind).collect(), hash));
            Ok(hash)
        })
    }

    async fn wait_for_receipt(
        &self,
        hash: TxHash,
        _chain_id: u64,
    ) -> Result<TxReceipt, WalletError> {
        let (stall, gate) = self.with(|s| (s.stall_receipts, s.receipt_gate.clone()));
        if stall {
            std::future::pending::<()>().await;
        }
        if let Some(gate) = gate {
            gate.acquire()
                .await
                .map_err(|e| WalletError::Rpc(e.to_string()))?
                .forget();
        }

        self.with(|s| {
            s.events.push(WalletEvent::Receipt(hash));
            let kind = s.kinds_by_hash.get(&hash).copied();
            let reverted = s.revert_receipts || (kind.is_some() && kind == s.revert_kind);
            Ok(TxReceipt {
                hash,
                success: !reverted,
                block_number: Some(u64::from(s.next_hash)),
            })
        })
    }
}
