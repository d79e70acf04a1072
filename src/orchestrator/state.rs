//! Submission state machine
//!
//! `next` is a pure function of (state, event). The orchestrator owns the
//! side effects and only ever mutates its state through it.

use crate::error::SubmissionError;
use alloy::primitives::TxHash;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    SwitchingChain,
    Approving,
    Submitting,
    Confirming,
    Succeeded,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Failed)
    }

    /// Phases in which the orchestrator is doing work
    pub fn is_active(self) -> bool {
        !self.is_terminal() && self != Phase::Idle
    }

    /// Phases in which nothing dependent has been broadcast yet
    pub fn is_cancellable(self) -> bool {
        matches!(self, Phase::SwitchingChain | Phase::Approving)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::SwitchingChain => "switching_chain",
            Phase::Approving => "approving",
            Phase::Submitting => "submitting",
            Phase::Confirming => "confirming",
            Phase::Succeeded => "succeeded",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Observable state of one submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionState {
    pub id: Option<Uuid>,
    pub phase: Phase,
    pub chain_ok: bool,
    pub needs_approval: bool,
    pub approval_ok: bool,
    pub approval_tx_hash: Option<TxHash>,
    /// Hash of the action (or the batch carrying it)
    pub tx_hash: Option<TxHash>,
    /// Every hash broadcast for this submission, in order
    pub all_tx_hashes: Vec<TxHash>,
    pub error: Option<SubmissionError>,
}

impl Default for SubmissionState {
    fn default() -> Self {
        Self {
            id: None,
            phase: Phase::Idle,
            chain_ok: false,
            needs_approval: false,
            approval_ok: false,
            approval_tx_hash: None,
            tx_hash: None,
            all_tx_hashes: Vec::new(),
            error: None,
        }
    }
}

/// Inputs that drive the machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// `submit()` accepted; `chain_ok` skips the switch
    Start { id: Uuid, chain_ok: bool },
    ChainSwitched,
    /// Plan built; records whether it carries an approval call
    AllowanceChecked { needs_approval: bool },
    ApprovalSent { hash: TxHash },
    ApprovalConfirmed,
    /// About to broadcast the action; `approval_in_batch` when an approval
    /// rides in the same atomic batch
    BeginSubmit { approval_in_batch: bool },
    Broadcast { hash: TxHash },
    Confirmed,
    Fail { error: SubmissionError },
    Reset,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Start { .. } => "start",
            Event::ChainSwitched => "chain_switched",
            Event::AllowanceChecked { .. } => "allowance_checked",
            Event::ApprovalSent { .. } => "approval_sent",
            Event::ApprovalConfirmed => "approval_confirmed",
            Event::BeginSubmit { .. } => "begin_submit",
            Event::Broadcast { .. } => "broadcast",
            Event::Confirmed => "confirmed",
            Event::Fail { .. } => "fail",
            Event::Reset => "reset",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Event '{event}' is not valid in phase {from}")]
pub struct InvalidTransition {
    pub from: Phase,
    pub event: &'static str,
}

/// Compute the state that follows `event`
pub fn next(state: &SubmissionState, event: &Event) -> Result<SubmissionState, InvalidTransition> {
    let invalid = || InvalidTransition {
        from: state.phase,
        event: event.name(),
    };
    let mut s = state.clone();

    match (state.phase, event) {
        (_, Event::Reset) => return Ok(SubmissionState::default()),

        (Phase::Idle, Event::Start { id, chain_ok }) => {
            s.id = Some(*id);
            s.chain_ok = *chain_ok;
            s.phase = if *chain_ok {
                Phase::Approving
            } else {
                Phase::SwitchingChain
            };
        }

        (Phase::SwitchingChain, Event::ChainSwitched) => {
            s.chain_ok = true;
            s.phase = Phase::Approving;
        }

        (Phase::Approving, Event::AllowanceChecked { needs_approval }) => {
            s.needs_approval = *needs_approval;
            s.approval_ok = !*needs_approval;
        }

        // The sequential fallback may send a standalone approval while submitting
        (Phase::Approving | Phase::Submitting, Event::ApprovalSent { hash })
            if s.needs_approval && s.approval_tx_hash.is_none() =>
        {
            s.approval_tx_hash = Some(*hash);
            s.all_tx_hashes.push(*hash);
        }

        (Phase::Approving | Phase::Submitting, Event::ApprovalConfirmed)
            if s.approval_tx_hash.is_some() =>
        {
            s.approval_ok = true;
        }

        (Phase::Approving, Event::BeginSubmit { approval_in_batch }) => {
            if s.needs_approval && !s.approval_ok && !*approval_in_batch {
                return Err(invalid());
            }
            s.phase = Phase::Submitting;
        }

        (Phase::Submitting, Event::Broadcast { hash }) => {
            if s.needs_approval && !s.approval_ok && s.approval_tx_hash.is_some() {
                // standalone approval still pending
                return Err(invalid());
            }
            s.tx_hash = Some(*hash);
            s.all_tx_hashes.push(*hash);
            s.phase = Phase::Confirming;
        }

        (Phase::Confirming, Event::Confirmed) => {
            // a batched approval lands atomically with the action
            s.approval_ok = true;
            s.phase = Phase::Succeeded;
        }

        (phase, Event::Fail { error }) if phase.is_active() => {
            s.error = Some(error.clone());
            s.phase = Phase::Failed;
        }

        _ => return Err(invalid()),
    }

    Ok(s)
}
