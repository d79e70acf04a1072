//! Error types for the trade submitter

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Market data query failed: {0}")]
    Market(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Submission failed: {0}")]
    Submission(#[from] SubmissionError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// The submission step a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    ChainSwitch,
    Approval,
    Action,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::ChainSwitch => write!(f, "chain switch"),
            Step::Approval => write!(f, "approval"),
            Step::Action => write!(f, "transaction"),
        }
    }
}

/// What the user should do about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Remediation {
    /// The user declined or the call failed before broadcast; submit again.
    Retry,
    /// The approval did not land; the approval has to be redone.
    Reapprove,
    /// The network was slow; the transaction may still land.
    Wait,
    /// The intent itself is wrong; nothing on-chain was attempted.
    FixInput,
}

/// Typed failures attached to a submission.
///
/// Every wallet/RPC failure is converted into one of these at the phase
/// boundary where it occurred, so the variant tells the caller which step
/// failed and whether the user or the chain was responsible.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SubmissionError {
    #[error("{step} rejected by user: {message}")]
    UserRejected { step: Step, message: String },

    #[error("Failed to switch to chain {chain_id}: {message}")]
    ChainSwitchFailed { chain_id: u64, message: String },

    #[error("Token approval rejected by user: {0}")]
    ApprovalRejected(String),

    #[error("Token approval transaction failed: {0}")]
    ApprovalTxFailed(String),

    /// Expected on wallets without atomic batching; absorbed by the fallback.
    #[error("Wallet does not support batched calls")]
    BatchUnsupported,

    #[error("Transaction failed: {0}")]
    ActionTxFailed(String),

    #[error("Timed out after {waited_secs}s waiting for {step} confirmation")]
    ConfirmationTimeout { step: Step, waited_secs: u64 },

    #[error("Unsupported intent: {0}")]
    UnsupportedIntent(String),

    #[error("Failed to read on-chain state: {0}")]
    ReadError(String),

    #[error("Submission cancelled before broadcast")]
    Cancelled,

    #[error("A submission is already in flight")]
    AlreadyInFlight,
}

impl SubmissionError {
    /// True when the user declined a wallet prompt.
    pub fn is_user_rejection(&self) -> bool {
        matches!(
            self,
            SubmissionError::UserRejected { .. } | SubmissionError::ApprovalRejected(_)
        )
    }

    pub fn remediation(&self) -> Remediation {
        match self {
            SubmissionError::UserRejected { .. }
            | SubmissionError::ChainSwitchFailed { .. }
            | SubmissionError::ApprovalRejected(_)
            | SubmissionError::BatchUnsupported
            | SubmissionError::ActionTxFailed(_)
            | SubmissionError::ReadError(_)
            | SubmissionError::Cancelled
            | SubmissionError::AlreadyInFlight => Remediation::Retry,
            SubmissionError::ApprovalTxFailed(_) => Remediation::Reapprove,
            SubmissionError::ConfirmationTimeout { .. } => Remediation::Wait,
            SubmissionError::UnsupportedIntent(_) => Remediation::FixInput,
        }
    }
}
