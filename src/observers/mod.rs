//! Submission observers
//!
//! Every state transition is turned into a [`Notice`] and handed to each
//! registered observer. Notices carry enough detail for a UI to tell a user
//! rejection apart from an approval or submission failure.

mod audit_log;
mod tracing_log;

pub use audit_log::AuditLogObserver;
pub use tracing_log::TracingObserver;

use crate::config::rpc::chain_name;
use crate::error::{Remediation, Step, SubmissionError};
use crate::orchestrator::state::{Event, Phase, SubmissionState};
use alloy::primitives::TxHash;
use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// One observable transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub submission_id: Option<Uuid>,
    pub intent: &'static str,
    pub chain_id: u64,
    pub from: Phase,
    pub to: Phase,
    pub event: &'static str,
    pub step: Option<Step>,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub tx_hash: Option<TxHash>,
    pub error: Option<SubmissionError>,
    pub remediation: Option<Remediation>,
}

impl Notice {
    /// Describe the transition from `before` to `after` caused by `event`.
    ///
    /// Returns `None` for events the user does not need to hear about.
    pub fn for_transition(
        intent: &'static str,
        chain_id: u64,
        before: &SubmissionState,
        after: &SubmissionState,
        event: &Event,
    ) -> Option<Self> {
        let network = chain_name(chain_id)
            .map(str::to_string)
            .unwrap_or_else(|| format!("chain {}", chain_id));

        let (step, severity, title, description, tx_hash) = match event {
            Event::Start { chain_ok: false, .. } => (
                Some(Step::ChainSwitch),
                Severity::Info,
                "Network Switch Required",
                format!("Please switch to {} in your wallet.", network),
                None,
            ),
            Event::Start { chain_ok: true, .. } | Event::ChainSwitched => (
                Some(Step::Approval),
                Severity::Info,
                "Checking Allowance",
                format!("Reading collateral allowance on {}.", network),
                None,
            ),
            Event::AllowanceChecked {
                needs_approval: true,
            } => (
                Some(Step::Approval),
                Severity::Info,
                "Approval Required",
                "Please approve the collateral token in your wallet.".to_string(),
                None,
            ),
            Event::AllowanceChecked {
                needs_approval: false,
            } => return None,
            Event::ApprovalSent { hash } => (
                Some(Step::Approval),
                Severity::Info,
                "Approval Submitted",
                "Waiting for the approval to confirm.".to_string(),
                Some(*hash),
            ),
            Event::ApprovalConfirmed => (
                Some(Step::Approval),
                Severity::Success,
                "Token Approved",
                "Collateral approved. Submitting your transaction.".to_string(),
                after.approval_tx_hash,
            ),
            Event::BeginSubmit { .. } => (
                Some(Step::Action),
                Severity::Info,
                "Confirm Transaction",
                "Please confirm the transaction in your wallet.".to_string(),
                None,
            ),
            Event::Broadcast { hash } => (
                Some(Step::Action),
                Severity::Info,
                "Transaction Submitted",
                "Waiting for confirmation.".to_string(),
                Some(*hash),
            ),
            Event::Confirmed => (
                Some(Step::Action),
                Severity::Success,
                "Transaction Confirmed",
                "Your transaction was confirmed.".to_string(),
                after.tx_hash,
            ),
            Event::Fail { error } => {
                let severity = if error.is_user_rejection() || *error == SubmissionError::Cancelled
                {
                    Severity::Warning
                } else {
                    Severity::Error
                };
                (
                    Some(failed_step(before.phase, error)),
                    severity,
                    "Transaction Failed",
                    failure_description(error),
                    after.tx_hash.or(after.approval_tx_hash),
                )
            }
            Event::Reset if before.phase == Phase::Idle => return None,
            Event::Reset => (
                None,
                Severity::Info,
                "Ready",
                "The previous submission was cleared.".to_string(),
                None,
            ),
        };

        let error = after.error.clone().filter(|_| after.phase == Phase::Failed);

        Some(Self {
            submission_id: after.id.or(before.id),
            intent,
            chain_id,
            from: before.phase,
            to: after.phase,
            event: event.name(),
            step,
            severity,
            title: title.to_string(),
            description,
            tx_hash,
            remediation: error.as_ref().map(SubmissionError::remediation),
            error,
        })
    }

    /// Title and description for a toast
    pub fn toast(&self) -> (&str, &str) {
        (&self.title, &self.description)
    }
}

fn failed_step(phase: Phase, error: &SubmissionError) -> Step {
    match error {
        SubmissionError::UserRejected { step, .. }
        | SubmissionError::ConfirmationTimeout { step, .. } => *step,
        SubmissionError::ChainSwitchFailed { .. } => Step::ChainSwitch,
        SubmissionError::ApprovalRejected(_) | SubmissionError::ApprovalTxFailed(_) => {
            Step::Approval
        }
        _ => match phase {
            Phase::SwitchingChain => Step::ChainSwitch,
            Phase::Approving => Step::Approval,
            _ => Step::Action,
        },
    }
}

fn failure_description(error: &SubmissionError) -> String {
    match error {
        SubmissionError::UserRejected { step, .. } => {
            format!("You rejected the {} request in your wallet.", step)
        }
        SubmissionError::ApprovalRejected(_) => {
            "You rejected the token approval in your wallet.".to_string()
        }
        SubmissionError::ApprovalTxFailed(reason) => {
            format!("The token approval failed on-chain: {}", reason)
        }
        SubmissionError::ConfirmationTimeout { step, waited_secs } => format!(
            "The {} was not confirmed within {}s. It may still land; check your wallet.",
            step, waited_secs
        ),
        SubmissionError::Cancelled => "The submission was cancelled.".to_string(),
        other => other.to_string(),
    }
}

/// Receives a notice for every submission transition
#[async_trait]
pub trait SubmissionObserver: Send + Sync {
    async fn on_notice(&self, notice: &Notice);
}
