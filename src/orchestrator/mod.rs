//! Submission orchestrator
//!
//! Drives one intent at a time through chain selection, approval gating,
//! batched or sequential submission, and receipt tracking. State only changes
//! through [`state::next`]; every change is published on a `watch` channel and
//! delivered to observers.
//!
//! Guarantees:
//! - at most one submission in flight per instance (`AlreadyInFlight` otherwise)
//! - the action call is never broadcast while a standalone approval is pending
//! - nothing is retried; a failed submission needs `reset()` then `submit()`

pub mod state;

use crate::allowance::{AllowanceTracker, ApprovalState};
use crate::config::{BatchMode, SubmissionSettings};
use crate::error::{Step, SubmissionError};
use crate::intent::Intent;
use crate::observers::{Notice, SubmissionObserver};
use crate::plan::{CallPlan, PlanBuilder};
use crate::slippage::Tolerance;
use crate::wallet::{WalletClient, WalletError};
use alloy::primitives::TxHash;
use state::{next, Event, Phase, SubmissionState};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::{watch, Notify};
use uuid::Uuid;

/// Per-submission facts observers need alongside the state
#[derive(Debug, Clone, Copy)]
struct Context {
    intent: &'static str,
    chain_id: u64,
}

/// Cooperative cancellation up to the point of broadcast
#[derive(Default)]
struct CancelSignal {
    requested: AtomicBool,
    notify: Notify,
}

/// Clears the in-flight flag however `submit` exits
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct SubmissionOrchestrator {
    wallet: Arc<dyn WalletClient>,
    allowance: AllowanceTracker,
    builder: PlanBuilder,
    settings: SubmissionSettings,
    observers: Vec<Arc<dyn SubmissionObserver>>,
    state: watch::Sender<SubmissionState>,
    /// Held by `submit` and `reset`; they exclude each other
    in_flight: AtomicBool,
    cancel: CancelSignal,
    /// Context of the latest submission, for the reset notice
    last: Mutex<Option<Context>>,
}

impl SubmissionOrchestrator {
    pub fn new(wallet: Arc<dyn WalletClient>, settings: SubmissionSettings) -> Self {
        let (state, _) = watch::channel(SubmissionState::default());
        Self {
            allowance: AllowanceTracker::new(wallet.clone()),
            builder: PlanBuilder::new(settings.deadline_window()),
            wallet,
            settings,
            observers: Vec::new(),
            state,
            in_flight: AtomicBool::new(false),
            cancel: CancelSignal::default(),
            last: Mutex::new(None),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SubmissionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Current state snapshot
    pub fn state(&self) -> SubmissionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SubmissionState> {
        self.state.subscribe()
    }

    pub fn settings(&self) -> &SubmissionSettings {
        &self.settings
    }

    /// Submit `intent` and drive it to a terminal state.
    ///
    /// Only `AlreadyInFlight` is returned as an error; every other failure is
    /// recorded in the returned state's `error`.
    pub async fn submit(&self, intent: Intent) -> Result<SubmissionState, SubmissionError> {
        let Some(_guard) = self.claim() else {
            tracing::warn!("Rejected re-entrant submit while a submission is in flight");
            return Err(SubmissionError::AlreadyInFlight);
        };

        let phase = self.state.borrow().phase;
        if phase != Phase::Idle {
            tracing::warn!(%phase, "Submit requires reset()");
            return Err(SubmissionError::AlreadyInFlight);
        }

        self.cancel.requested.store(false, Ordering::SeqCst);

        let ctx = Context {
            intent: intent.label(),
            chain_id: intent.chain_id(),
        };
        if let Ok(mut last) = self.last.lock() {
            *last = Some(ctx);
        }

        if let Err(error) = self.drive(ctx, &intent).await {
            self.fail(ctx, error).await;
        }

        Ok(self.state())
    }

    /// Return to `Idle`. Refused (returns `false`) while a submission runs.
    pub async fn reset(&self) -> bool {
        let Some(_guard) = self.claim() else {
            tracing::warn!("Ignoring reset() while a submission is in flight");
            return false;
        };

        let ctx = self
            .last
            .lock()
            .ok()
            .and_then(|last| *last)
            .unwrap_or(Context {
                intent: "none",
                chain_id: 0,
            });
        if let Err(e) = self.apply(ctx, Event::Reset).await {
            tracing::error!(error = %e, "Could not reset submission state");
            return false;
        }
        self.cancel.requested.store(false, Ordering::SeqCst);
        true
    }

    /// Request cancellation. Only honoured before the action is broadcast.
    ///
    /// The check runs under the state lock, so a `true` return guarantees the
    /// `BeginSubmit` transition (which checks the flag under the same lock)
    /// has not happened and will not.
    pub fn cancel(&self) -> bool {
        let mut accepted = None;
        self.state.send_if_modified(|current| {
            if self.in_flight.load(Ordering::SeqCst) && current.phase.is_cancellable() {
                self.cancel.requested.store(true, Ordering::SeqCst);
                accepted = Some(current.phase);
            }
            false
        });

        match accepted {
            Some(phase) => {
                tracing::info!(%phase, "Cancellation requested");
                self.cancel.notify.notify_waiters();
                true
            }
            None => false,
        }
    }

    fn claim(&self) -> Option<InFlight<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| InFlight(&self.in_flight))
    }

    async fn drive(&self, ctx: Context, intent: &Intent) -> Result<(), SubmissionError> {
        let chain_id = ctx.chain_id;

        let chain_ok = matches!(self.wallet.active_chain().await, Ok(active) if active == chain_id);
        self.apply(
            ctx,
            Event::Start {
                id: Uuid::new_v4(),
                chain_ok,
            },
        )
        .await?;

        if !chain_ok {
            self.switch_chain(chain_id).await?;
            self.apply(ctx, Event::ChainSwitched).await?;
        }

        // Approving
        self.allowance.clear();
        let tolerance = self.settings.tolerance();
        let built_at = now();
        let approval = self.read_approval(intent, tolerance).await?;
        let mut plan = self
            .builder
            .build(intent, approval.as_ref(), tolerance, built_at)?;

        self.apply(
            ctx,
            Event::AllowanceChecked {
                needs_approval: plan.needs_approval(),
            },
        )
        .await?;

        let batch = plan.len() > 1 && self.batch_available(chain_id).await;

        if plan.needs_approval() && !batch {
            plan = self
                .approve_standalone(ctx, intent, &plan, tolerance, built_at)
                .await?;
        }

        self.apply(
            ctx,
            Event::BeginSubmit {
                approval_in_batch: plan.needs_approval(),
            },
        )
        .await?;

        // Submitting
        let hash = self.submit_plan(ctx, intent, plan, batch, tolerance, built_at).await?;
        self.apply(ctx, Event::Broadcast { hash }).await?;

        // Confirming
        let timeout = self.settings.confirmation_timeout();
        let receipt = tokio::time::timeout(timeout, self.wallet.wait_for_receipt(hash, chain_id))
            .await
            .map_err(|_| SubmissionError::ConfirmationTimeout {
                step: Step::Action,
                waited_secs: timeout.as_secs(),
            })?
            .map_err(|e| SubmissionError::ActionTxFailed(e.to_string()))?;

        if !receipt.success {
            return Err(SubmissionError::ActionTxFailed(format!(
                "transaction {} reverted",
                hash
            )));
        }

        self.apply(ctx, Event::Confirmed).await?;
        tracing::info!(%hash, block = ?receipt.block_number, intent = ctx.intent, "Submission confirmed");
        Ok(())
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), SubmissionError> {
        self.cancellable(async {
            self.wallet
                .switch_chain(chain_id)
                .await
                .map_err(|e| match e {
                    WalletError::UserRejected(message) => SubmissionError::UserRejected {
                        step: Step::ChainSwitch,
                        message,
                    },
                    other => SubmissionError::ChainSwitchFailed {
                        chain_id,
                        message: other.to_string(),
                    },
                })
        })
        .await
    }

    async fn read_approval(
        &self,
        intent: &Intent,
        tolerance: Tolerance,
    ) -> Result<Option<ApprovalState>, SubmissionError> {
        let required = intent.required_collateral(tolerance);
        if required.is_zero() {
            return Ok(None);
        }

        let market = intent.market();
        let state = self
            .cancellable(self.allowance.check_allowance(
                market.collateral_asset,
                self.wallet.account(),
                market.address,
                market.chain_id,
                required,
            ))
            .await?;
        Ok(Some(state))
    }

    async fn batch_available(&self, chain_id: u64) -> bool {
        match self.settings.batch_mode {
            BatchMode::Never => false,
            BatchMode::TryAndCatch => true,
            BatchMode::Probe => self.wallet.supports_batch(chain_id).await,
        }
    }

    /// Send the plan's approval alone, wait for it, re-read the allowance, and
    /// return a plan without the approval call.
    async fn approve_standalone(
        &self,
        ctx: Context,
        intent: &Intent,
        plan: &CallPlan,
        tolerance: Tolerance,
        built_at: u64,
    ) -> Result<CallPlan, SubmissionError> {
        let market = intent.market();
        let started = Instant::now();

        self.ensure_not_cancelled()?;
        let hash = self
            .allowance
            .request_approval(
                market.collateral_asset,
                market.address,
                plan.approval_amount(),
                ctx.chain_id,
            )
            .await?;
        self.apply(ctx, Event::ApprovalSent { hash }).await?;

        self.cancellable(self.allowance.confirm_approval(
            market.collateral_asset,
            market.address,
            hash,
            ctx.chain_id,
            self.settings.confirmation_timeout(),
        ))
        .await?;

        // the cache entry was invalidated on confirmation: this is a fresh read
        let refreshed = self.read_approval(intent, tolerance).await?;
        if refreshed.as_ref().is_some_and(|s| !s.has_allowance()) {
            return Err(SubmissionError::ApprovalTxFailed(
                "allowance still insufficient after approval confirmed".to_string(),
            ));
        }
        self.apply(ctx, Event::ApprovalConfirmed).await?;
        tokio::time::sleep(self.settings.fallback_delay()).await;

        let stamp = if started.elapsed() >= self.settings.restamp_after() {
            tracing::info!(
                waited_secs = started.elapsed().as_secs(),
                "Approval took long; re-stamping deadline"
            );
            now()
        } else {
            built_at
        };

        let rebuilt = self
            .builder
            .build(intent, refreshed.as_ref(), tolerance, stamp)?;
        if rebuilt.needs_approval() {
            return Err(SubmissionError::ApprovalTxFailed(
                "plan still requires approval after approval confirmed".to_string(),
            ));
        }
        Ok(rebuilt)
    }

    /// Broadcast the plan and return the hash that carries the action
    async fn submit_plan(
        &self,
        ctx: Context,
        intent: &Intent,
        plan: CallPlan,
        batch: bool,
        tolerance: Tolerance,
        built_at: u64,
    ) -> Result<TxHash, SubmissionError> {
        let chain_id = ctx.chain_id;

        if batch && plan.len() > 1 {
            match self.wallet.send_batch(chain_id, plan.calls()).await {
                Ok(hash) => {
                    tracing::info!(%hash, calls = plan.len(), "Batch submitted");
                    return Ok(hash);
                }
                // the user declined the approval and action together
                Err(WalletError::UserRejected(message)) => {
                    return Err(if plan.needs_approval() {
                        SubmissionError::ApprovalRejected(message)
                    } else {
                        SubmissionError::UserRejected {
                            step: Step::Action,
                            message,
                        }
                    });
                }
                Err(WalletError::BatchUnsupported) => {
                    tracing::debug!("Wallet does not support batching, sending sequentially");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Batch submission failed, sending sequentially");
                }
            }
        }

        // Sequential fallback: approval (if any) is confirmed before the action
        let plan = if plan.needs_approval() {
            self.approve_standalone(ctx, intent, &plan, tolerance, built_at)
                .await?
        } else {
            plan
        };

        let action = plan.action().ok_or_else(|| {
            SubmissionError::UnsupportedIntent("plan has no action call".to_string())
        })?;

        self.wallet
            .send_transaction(chain_id, action)
            .await
            .map_err(|e| match e {
                WalletError::UserRejected(message) => SubmissionError::UserRejected {
                    step: Step::Action,
                    message,
                },
                other => SubmissionError::ActionTxFailed(other.to_string()),
            })
    }

    fn ensure_not_cancelled(&self) -> Result<(), SubmissionError> {
        if self.cancel.requested.load(Ordering::SeqCst) {
            Err(SubmissionError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Run `fut` unless cancellation is requested first
    async fn cancellable<T>(
        &self,
        fut: impl Future<Output = Result<T, SubmissionError>>,
    ) -> Result<T, SubmissionError> {
        let notified = self.cancel.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        self.ensure_not_cancelled()?;

        tokio::select! {
            biased;
            _ = &mut notified => Err(SubmissionError::Cancelled),
            result = fut => result,
        }
    }

    async fn fail(&self, ctx: Context, error: SubmissionError) {
        tracing::warn!(intent = ctx.intent, %error, "Submission failed");
        if let Err(e) = self.apply(ctx, Event::Fail { error }).await {
            tracing::error!(error = %e, "Could not record submission failure");
        }
    }

    /// Apply `event` atomically, then publish the notice.
    ///
    /// `BeginSubmit` is refused once cancellation was accepted.
    async fn apply(&self, ctx: Context, event: Event) -> Result<(), SubmissionError> {
        let mut outcome = None;
        self.state.send_if_modified(|current| {
            if matches!(event, Event::BeginSubmit { .. })
                && self.cancel.requested.load(Ordering::SeqCst)
            {
                outcome = Some(Err(SubmissionError::Cancelled));
                return false;
            }
            match next(current, &event) {
                Ok(after) => {
                    outcome = Some(Ok((current.clone(), after.clone())));
                    *current = after;
                    true
                }
                Err(e) => {
                    tracing::error!(error = %e, "Invalid submission transition");
                    outcome = Some(Err(SubmissionError::ActionTxFailed(e.to_string())));
                    false
                }
            }
        });

        let (before, after) = match outcome {
            Some(Ok(pair)) => pair,
            Some(Err(e)) => return Err(e),
            None => return Ok(()),
        };

        tracing::debug!(from = %before.phase, to = %after.phase, event = event.name(), "Transition");

        if let Some(notice) =
            Notice::for_transition(ctx.intent, ctx.chain_id, &before, &after, &event)
        {
            for observer in &self.observers {
                observer.on_notice(&notice).await;
            }
        }
        Ok(())
    }
}

fn now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::IMarketGroup;
    use crate::intent::fixtures::*;
    use crate::plan::CallKind;
    use crate::wallet::mock::{MockWallet, WalletEvent};
    use alloy::primitives::U256;
    use alloy::sol_types::SolCall;
    use std::sync::{Mutex, OnceLock, Weak};
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    const OTHER_CHAIN: u64 = 84532;

    fn settings() -> SubmissionSettings {
        SubmissionSettings {
            slippage_percent: 0.0,
            fallback_delay_ms: 0,
            confirmation_timeout_secs: 5,
            ..Default::default()
        }
    }

    fn orchestrator(wallet: &Arc<MockWallet>) -> SubmissionOrchestrator {
        SubmissionOrchestrator::new(wallet.clone(), settings())
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Notice>>);

    #[async_trait::async_trait]
    impl SubmissionObserver for Recorder {
        async fn on_notice(&self, notice: &Notice) {
            self.0.lock().unwrap().push(notice.clone());
        }
    }

    impl Recorder {
        fn titles(&self) -> Vec<String> {
            self.0.lock().unwrap().iter().map(|n| n.title.clone()).collect()
        }
    }

    /// Calls `cancel()` when a notice titled `title` arrives
    struct CancelOn {
        title: &'static str,
        orch: OnceLock<Weak<SubmissionOrchestrator>>,
        accepted: Mutex<Option<bool>>,
    }

    impl CancelOn {
        fn new(title: &'static str) -> Self {
            Self {
                title,
                orch: OnceLock::new(),
                accepted: Mutex::new(None),
            }
        }
    }

    #[async_trait::async_trait]
    impl SubmissionObserver for CancelOn {
        async fn on_notice(&self, notice: &Notice) {
            if notice.title != self.title {
                return;
            }
            if let Some(orch) = self.orch.get().and_then(Weak::upgrade) {
                *self.accepted.lock().unwrap() = Some(orch.cancel());
            }
        }
    }

    /// Calls `submit()` when a notice titled `title` arrives
    struct SubmitOn {
        title: &'static str,
        orch: OnceLock<Weak<SubmissionOrchestrator>>,
        outcome: Mutex<Option<Result<SubmissionState, SubmissionError>>>,
    }

    impl SubmitOn {
        fn new(title: &'static str) -> Self {
            Self {
                title,
                orch: OnceLock::new(),
                outcome: Mutex::new(None),
            }
        }
    }

    #[async_trait::async_trait]
    impl SubmissionObserver for SubmitOn {
        async fn on_notice(&self, notice: &Notice) {
            if notice.title != self.title {
                return;
            }
            if let Some(orch) = self.orch.get().and_then(Weak::upgrade) {
                let outcome = orch.submit(open_trade(1000)).await;
                *self.outcome.lock().unwrap() = Some(outcome);
            }
        }
    }

    fn sent_deadline(wallet: &MockWallet) -> U256 {
        let call = wallet
            .sent_calls()
            .into_iter()
            .find(|c| c.kind == CallKind::CreateTraderPosition)
            .expect("action sent");
        IMarketGroup::createTraderPositionCall::abi_decode(&call.data)
            .unwrap()
            .deadline
    }

    /// Submit an open trade whose approval receipt arrives only after the
    /// wall clock moved past at least one second boundary. Returns the unix
    /// second at which the receipts were released.
    async fn submit_with_slow_approval(wallet: &Arc<MockWallet>, restamp_after_secs: u64) -> u64 {
        let gate = wallet.hold_receipts();
        let orch = Arc::new(SubmissionOrchestrator::new(
            wallet.clone(),
            SubmissionSettings {
                restamp_after_secs,
                ..settings()
            },
        ));
        let mut rx = orch.subscribe();

        let task = tokio::spawn({
            let orch = orch.clone();
            async move { orch.submit(open_trade(1000)).await }
        });
        wait_for(&mut rx, |s| s.approval_tx_hash.is_some()).await;
        tokio::time::sleep(Duration::from_millis(1_100)).await;

        let released_at = now();
        gate.add_permits(2);
        let state = task.await.unwrap().unwrap();
        assert_eq!(state.phase, Phase::Succeeded);
        released_at
    }

    async fn wait_for(rx: &mut watch::Receiver<SubmissionState>, f: impl Fn(&SubmissionState) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| f(s)))
            .await
            .expect("state reached")
            .expect("channel open");
    }

    #[tokio::test]
    async fn test_no_approval_needed_single_call() {
        let wallet = Arc::new(MockWallet::new(BASE));
        wallet.set_allowance(COLLATERAL, MARKET_GROUP, U256::from(5_000u64));
        let orch = orchestrator(&wallet);

        let state = orch.submit(open_trade(1000)).await.unwrap();

        assert_eq!(state.phase, Phase::Succeeded);
        assert!(state.chain_ok && state.approval_ok && !state.needs_approval);
        assert_eq!(wallet.sent_kinds(), vec![CallKind::CreateTraderPosition]);
        assert_eq!(state.all_tx_hashes.len(), 1);
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_batch_unsupported_falls_back_in_order() {
        let wallet = Arc::new(MockWallet::new(BASE));
        wallet.set_allowance(COLLATERAL, MARKET_GROUP, U256::from(500u64));
        wallet.fail_batch(WalletError::BatchUnsupported);
        let orch = orchestrator(&wallet);

        let state = orch.submit(open_trade(1000)).await.unwrap();

        assert_eq!(state.phase, Phase::Succeeded);
        assert_eq!(
            wallet.sent_kinds(),
            vec![CallKind::Approval, CallKind::CreateTraderPosition]
        );

        let sends: Vec<_> = wallet
            .events()
            .into_iter()
            .filter_map(|e| match e {
                WalletEvent::Send(kind, hash) => Some((kind, hash)),
                _ => None,
            })
            .collect();
        assert_eq!(sends.len(), 2);
        assert_eq!(state.tx_hash, Some(sends[1].1));
        assert_eq!(state.approval_tx_hash, Some(sends[0].1));
        assert_eq!(state.all_tx_hashes, vec![sends[0].1, sends[1].1]);
    }

    #[tokio::test]
    async fn test_rejected_batch_is_not_resent() {
        let wallet = Arc::new(MockWallet::new(BASE));
        wallet.set_allowance(COLLATERAL, MARKET_GROUP, U256::from(500u64));
        wallet.fail_batch(WalletError::UserRejected("User rejected the request.".into()));
        let orch = orchestrator(&wallet);

        let state = orch.submit(open_trade(1000)).await.unwrap();

        assert_eq!(state.phase, Phase::Failed);
        let error = state.error.unwrap();
        assert!(matches!(error, SubmissionError::ApprovalRejected(_)));
        assert!(error.is_user_rejection());
        assert!(wallet.sent_calls().is_empty());
        assert_eq!(wallet.events(), vec![WalletEvent::BatchRefused]);
    }

    #[tokio::test]
    async fn test_batch_rpc_failure_still_falls_back() {
        let wallet = Arc::new(MockWallet::new(BASE));
        wallet.fail_batch(WalletError::Rpc("wallet_sendCalls timed out".into()));
        let orch = orchestrator(&wallet);

        let state = orch.submit(open_trade(1000)).await.unwrap();

        assert_eq!(state.phase, Phase::Succeeded);
        assert_eq!(
            wallet.sent_kinds(),
            vec![CallKind::Approval, CallKind::CreateTraderPosition]
        );
    }

    #[tokio::test]
    async fn test_try_and_catch_pays_one_round_trip() {
        let wallet = Arc::new(MockWallet::new(BASE));
        let orch = SubmissionOrchestrator::new(
            wallet.clone(),
            SubmissionSettings {
                batch_mode: BatchMode::TryAndCatch,
                ..settings()
            },
        );

        let state = orch.submit(open_trade(1000)).await.unwrap();

        assert_eq!(state.phase, Phase::Succeeded);
        assert_eq!(wallet.events()[0], WalletEvent::BatchRefused);
        assert_eq!(wallet.sent_kinds().len(), 2);
    }

    #[tokio::test]
    async fn test_capability_check_skips_batch_on_unsupported_wallet() {
        let wallet = Arc::new(MockWallet::new(BASE));
        let orch = orchestrator(&wallet);

        orch.submit(open_trade(1000)).await.unwrap();

        assert!(!wallet.events().contains(&WalletEvent::BatchRefused));
    }

    #[tokio::test]
    async fn test_supported_batch_sends_atomically() {
        let wallet = Arc::new(MockWallet::new(BASE));
        wallet.support_batch();
        let orch = orchestrator(&wallet);

        let state = orch.submit(open_trade(1000)).await.unwrap();

        assert_eq!(state.phase, Phase::Succeeded);
        assert!(state.approval_ok);
        assert!(state.approval_tx_hash.is_none());
        match &wallet.events()[0] {
            WalletEvent::Batch(kinds, hash) => {
                assert_eq!(kinds, &vec![CallKind::Approval, CallKind::CreateTraderPosition]);
                assert_eq!(state.tx_hash, Some(*hash));
            }
            other => panic!("expected batch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_chain_switch_rejection_requires_reset() {
        let wallet = Arc::new(MockWallet::new(OTHER_CHAIN));
        wallet.reject_switch();
        let recorder = Arc::new(Recorder::default());
        let orch = orchestrator(&wallet).with_observer(recorder.clone());

        let state = orch.submit(open_trade(1000)).await.unwrap();

        assert_eq!(state.phase, Phase::Failed);
        assert!(matches!(
            state.error,
            Some(SubmissionError::UserRejected {
                step: Step::ChainSwitch,
                ..
            })
        ));
        let notices = recorder.0.lock().unwrap().clone();
        let last = notices.last().unwrap();
        assert_eq!(last.from, Phase::SwitchingChain);
        assert_eq!(last.to, Phase::Failed);
        assert!(wallet.sent_calls().is_empty());

        // submit again without reset is refused
        assert_eq!(
            orch.submit(open_trade(1000)).await.unwrap_err(),
            SubmissionError::AlreadyInFlight
        );

        assert!(orch.reset().await);
        assert_eq!(orch.state(), SubmissionState::default());
        assert_eq!(recorder.titles().last().map(String::as_str), Some("Ready"));
    }

    #[tokio::test]
    async fn test_chain_switch_rpc_failure_is_distinct() {
        let wallet = Arc::new(MockWallet::new(OTHER_CHAIN));
        wallet.fail_switch(WalletError::Rpc("wallet_switchEthereumChain unsupported".into()));
        let orch = orchestrator(&wallet);

        let state = orch.submit(open_trade(1000)).await.unwrap();
        assert!(matches!(
            state.error,
            Some(SubmissionError::ChainSwitchFailed { chain_id: BASE, .. })
        ));
    }

    #[tokio::test]
    async fn test_switches_chain_before_approving() {
        let wallet = Arc::new(MockWallet::new(OTHER_CHAIN));
        wallet.set_allowance(COLLATERAL, MARKET_GROUP, U256::from(5_000u64));
        let recorder = Arc::new(Recorder::default());
        let orch = orchestrator(&wallet).with_observer(recorder.clone());

        let state = orch.submit(open_trade(1000)).await.unwrap();

        assert_eq!(state.phase, Phase::Succeeded);
        assert_eq!(wallet.current_chain(), BASE);
        assert_eq!(wallet.events()[0], WalletEvent::SwitchChain(BASE));
        assert_eq!(
            recorder.titles(),
            vec![
                "Network Switch Required",
                "Checking Allowance",
                "Confirm Transaction",
                "Transaction Submitted",
                "Transaction Confirmed",
            ]
        );
    }

    #[tokio::test]
    async fn test_slow_approval_blocks_action() {
        let wallet = Arc::new(MockWallet::new(BASE));
        wallet.set_allowance(COLLATERAL, MARKET_GROUP, U256::from(500u64));
        let gate = wallet.hold_receipts();
        let orch = Arc::new(orchestrator(&wallet));
        let mut rx = orch.subscribe();

        let task = tokio::spawn({
            let orch = orch.clone();
            async move { orch.submit(open_trade(1000)).await }
        });

        wait_for(&mut rx, |s| s.approval_tx_hash.is_some()).await;
        // give the submit task every chance to run ahead
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }

        let snapshot = orch.state();
        assert_eq!(snapshot.phase, Phase::Approving);
        assert!(!snapshot.approval_ok);
        assert_eq!(wallet.sent_kinds(), vec![CallKind::Approval]);

        // approval receipt, then the action receipt
        gate.add_permits(2);
        let state = assert_ok!(task.await.unwrap());

        assert_eq!(state.phase, Phase::Succeeded);
        let events = wallet.events();
        let approval_receipt = events
            .iter()
            .position(|e| matches!(e, WalletEvent::Receipt(h) if Some(*h) == state.approval_tx_hash))
            .unwrap();
        let action_send = events
            .iter()
            .position(|e| matches!(e, WalletEvent::Send(CallKind::CreateTraderPosition, _)))
            .unwrap();
        assert!(approval_receipt < action_send);
    }

    #[tokio::test]
    async fn test_confirmed_approval_is_reflected_in_next_plan() {
        let wallet = Arc::new(MockWallet::new(BASE));
        wallet.set_allowance(COLLATERAL, MARKET_GROUP, U256::from(500u64));
        let orch = orchestrator(&wallet);

        let first = orch.submit(open_trade(1000)).await.unwrap();
        assert!(first.needs_approval);

        assert!(orch.reset().await);
        let second = orch.submit(open_trade(1000)).await.unwrap();

        assert_eq!(second.phase, Phase::Succeeded);
        assert!(!second.needs_approval);
        assert_eq!(
            wallet.sent_kinds(),
            vec![
                CallKind::Approval,
                CallKind::CreateTraderPosition,
                CallKind::CreateTraderPosition
            ]
        );
    }

    #[tokio::test]
    async fn test_action_confirmation_timeout() {
        let wallet = Arc::new(MockWallet::new(BASE));
        wallet.set_allowance(COLLATERAL, MARKET_GROUP, U256::from(5_000u64));
        wallet.stall_receipts();
        let orch = SubmissionOrchestrator::new(
            wallet.clone(),
            SubmissionSettings {
                confirmation_timeout_secs: 1,
                ..settings()
            },
        );

        let state = orch.submit(open_trade(1000)).await.unwrap();

        assert_eq!(state.phase, Phase::Failed);
        assert_eq!(
            state.error,
            Some(SubmissionError::ConfirmationTimeout {
                step: Step::Action,
                waited_secs: 1
            })
        );
        assert!(state.tx_hash.is_some());
    }

    #[tokio::test]
    async fn test_reverted_action_and_approval() {
        let wallet = Arc::new(MockWallet::new(BASE));
        wallet.set_allowance(COLLATERAL, MARKET_GROUP, U256::from(5_000u64));
        wallet.revert_receipts_of(CallKind::CreateTraderPosition);
        let orch = orchestrator(&wallet);
        let state = orch.submit(open_trade(1000)).await.unwrap();
        assert!(matches!(state.error, Some(SubmissionError::ActionTxFailed(_))));

        let wallet = Arc::new(MockWallet::new(BASE));
        wallet.revert_receipts_of(CallKind::Approval);
        let orch = orchestrator(&wallet);
        let state = orch.submit(open_trade(1000)).await.unwrap();
        assert!(matches!(state.error, Some(SubmissionError::ApprovalTxFailed(_))));
        assert_eq!(wallet.sent_kinds(), vec![CallKind::Approval]);
    }

    #[tokio::test]
    async fn test_rejected_action_is_user_rejection() {
        let wallet = Arc::new(MockWallet::new(BASE));
        wallet.set_allowance(COLLATERAL, MARKET_GROUP, U256::from(5_000u64));
        wallet.fail_sends_of(
            CallKind::CreateTraderPosition,
            WalletError::UserRejected("User denied transaction signature.".into()),
        );
        let orch = orchestrator(&wallet);

        let state = orch.submit(open_trade(1000)).await.unwrap();
        let error = state.error.unwrap();
        assert!(error.is_user_rejection());
        assert!(matches!(error, SubmissionError::UserRejected { step: Step::Action, .. }));
    }

    #[tokio::test]
    async fn test_double_submit_is_rejected() {
        let wallet = Arc::new(MockWallet::new(BASE));
        wallet.set_allowance(COLLATERAL, MARKET_GROUP, U256::from(5_000u64));
        let gate = wallet.hold_receipts();
        let orch = Arc::new(orchestrator(&wallet));
        let mut rx = orch.subscribe();

        let task = tokio::spawn({
            let orch = orch.clone();
            async move { orch.submit(open_trade(1000)).await }
        });
        wait_for(&mut rx, |s| s.phase == Phase::Confirming).await;

        assert_err!(orch.submit(open_trade(1000)).await);
        assert!(!orch.reset().await);

        gate.add_permits(1);
        let state = task.await.unwrap().unwrap();
        assert_eq!(state.phase, Phase::Succeeded);
        assert_eq!(wallet.sent_kinds(), vec![CallKind::CreateTraderPosition]);
    }

    #[tokio::test]
    async fn test_cancel_during_approval_wait() {
        let wallet = Arc::new(MockWallet::new(BASE));
        let _gate = wallet.hold_receipts();
        let orch = Arc::new(orchestrator(&wallet));
        let mut rx = orch.subscribe();

        let task = tokio::spawn({
            let orch = orch.clone();
            async move { orch.submit(open_trade(1000)).await }
        });
        wait_for(&mut rx, |s| s.approval_tx_hash.is_some()).await;

        assert!(orch.cancel());
        let state = task.await.unwrap().unwrap();

        assert_eq!(state.phase, Phase::Failed);
        assert_eq!(state.error, Some(SubmissionError::Cancelled));
        assert_eq!(wallet.sent_kinds(), vec![CallKind::Approval]);
    }

    #[tokio::test]
    async fn test_cancel_is_refused_after_broadcast() {
        let wallet = Arc::new(MockWallet::new(BASE));
        wallet.set_allowance(COLLATERAL, MARKET_GROUP, U256::from(5_000u64));
        let gate = wallet.hold_receipts();
        let orch = Arc::new(orchestrator(&wallet));
        let mut rx = orch.subscribe();

        let task = tokio::spawn({
            let orch = orch.clone();
            async move { orch.submit(open_trade(1000)).await }
        });
        wait_for(&mut rx, |s| s.phase == Phase::Confirming).await;

        assert!(!orch.cancel());
        gate.add_permits(1);
        assert_eq!(task.await.unwrap().unwrap().phase, Phase::Succeeded);
    }

    #[tokio::test]
    async fn test_read_error_fails_in_approving() {
        let wallet = Arc::new(MockWallet::new(BASE));
        wallet.fail_reads("token contract missing");
        let orch = orchestrator(&wallet);

        let state = orch.submit(open_trade(1000)).await.unwrap();
        assert!(matches!(state.error, Some(SubmissionError::ReadError(_))));
        assert!(wallet.sent_calls().is_empty());
    }

    #[tokio::test]
    async fn test_independent_instances_share_wallet() {
        let wallet = Arc::new(MockWallet::new(BASE));
        wallet.set_allowance(COLLATERAL, MARKET_GROUP, U256::from(50_000u64));
        let a = orchestrator(&wallet);
        let b = orchestrator(&wallet);

        let (ra, rb) = tokio::join!(a.submit(open_trade(1000)), b.submit(open_trade(2000)));

        assert_eq!(ra.unwrap().phase, Phase::Succeeded);
        assert_eq!(rb.unwrap().phase, Phase::Succeeded);
        assert_eq!(wallet.sent_kinds().len(), 2);
    }

    #[tokio::test]
    async fn test_submit_is_refused_while_reset_runs() {
        let wallet = Arc::new(MockWallet::new(OTHER_CHAIN));
        wallet.reject_switch();
        let hook = Arc::new(SubmitOn::new("Ready"));
        let orch = Arc::new(orchestrator(&wallet).with_observer(hook.clone()));
        hook.orch.set(Arc::downgrade(&orch)).unwrap();

        let failed = orch.submit(open_trade(1000)).await.unwrap();
        assert_eq!(failed.phase, Phase::Failed);

        assert!(orch.reset().await);
        assert_eq!(
            hook.outcome.lock().unwrap().clone(),
            Some(Err(SubmissionError::AlreadyInFlight))
        );
        assert_eq!(orch.state(), SubmissionState::default());
    }

    #[tokio::test]
    async fn test_cancel_accepted_after_approval_stops_action() {
        let wallet = Arc::new(MockWallet::new(BASE));
        let hook = Arc::new(CancelOn::new("Token Approved"));
        let orch = Arc::new(orchestrator(&wallet).with_observer(hook.clone()));
        hook.orch.set(Arc::downgrade(&orch)).unwrap();

        let state = orch.submit(open_trade(1000)).await.unwrap();

        assert_eq!(*hook.accepted.lock().unwrap(), Some(true));
        assert_eq!(state.phase, Phase::Failed);
        assert_eq!(state.error, Some(SubmissionError::Cancelled));
        assert_eq!(wallet.sent_kinds(), vec![CallKind::Approval]);
    }

    #[tokio::test]
    async fn test_sequential_approval_waits_fallback_delay() {
        let wallet = Arc::new(MockWallet::new(BASE));
        let orch = SubmissionOrchestrator::new(
            wallet.clone(),
            SubmissionSettings {
                fallback_delay_ms: 200,
                ..settings()
            },
        );

        let started = std::time::Instant::now();
        let state = orch.submit(open_trade(1000)).await.unwrap();

        assert_eq!(state.phase, Phase::Succeeded);
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert_eq!(
            wallet.sent_kinds(),
            vec![CallKind::Approval, CallKind::CreateTraderPosition]
        );
    }

    #[tokio::test]
    async fn test_slow_approval_restamps_deadline() {
        let wallet = Arc::new(MockWallet::new(BASE));
        let window = settings().deadline_window().as_secs();

        let released_at = submit_with_slow_approval(&wallet, 0).await;

        assert!(sent_deadline(&wallet) >= U256::from(released_at + window));
    }

    #[tokio::test]
    async fn test_approval_under_restamp_threshold_keeps_deadline() {
        let wallet = Arc::new(MockWallet::new(BASE));
        let window = settings().deadline_window().as_secs();

        let released_at = submit_with_slow_approval(&wallet, 300).await;

        // stamped before the approval was even confirmed
        assert!(sent_deadline(&wallet) < U256::from(released_at + window));
    }
}
