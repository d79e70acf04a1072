//! Configuration for the trade submitter

pub mod rpc;

use crate::slippage::Tolerance;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub use rpc::RpcConfig;

/// Data API endpoint override
pub const GRAPHQL_URL_ENV: &str = "TRADE_SUBMITTER_GRAPHQL_URL";

pub const DEFAULT_GRAPHQL_URL: &str = "https://api.sapience.xyz/graphql";

/// How the orchestrator decides whether to try an atomic batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    /// Ask the wallet for batch capability before sending (no wasted round trip)
    #[default]
    Probe,
    /// Always attempt a batch and fall back on any failure
    TryAndCatch,
    /// Always submit calls one at a time
    Never,
}

/// Submission behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionSettings {
    /// Slippage tolerance (e.g., 0.5 for 0.5%)
    pub slippage_percent: f64,
    /// Seconds between plan build and the on-chain deadline
    pub deadline_secs: u64,
    /// Receipt wait before a submission is reported as timed out
    pub confirmation_timeout_secs: u64,
    /// Pause between sequential sends
    pub fallback_delay_ms: u64,
    pub receipt_poll_interval_ms: u64,
    pub batch_mode: BatchMode,
    /// Rebuild the plan with a fresh deadline when an approval took longer
    pub restamp_after_secs: u64,
}

impl Default for SubmissionSettings {
    fn default() -> Self {
        Self {
            slippage_percent: 0.5,
            deadline_secs: 30 * 60,
            confirmation_timeout_secs: 120,
            fallback_delay_ms: 1_000,
            receipt_poll_interval_ms: 2_000,
            batch_mode: BatchMode::Probe,
            restamp_after_secs: 300,
        }
    }
}

impl SubmissionSettings {
    pub fn tolerance(&self) -> Tolerance {
        Tolerance::from_percent(self.slippage_percent)
    }

    pub fn deadline_window(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn fallback_delay(&self) -> Duration {
        Duration::from_millis(self.fallback_delay_ms)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }

    pub fn restamp_after(&self) -> Duration {
        Duration::from_secs(self.restamp_after_secs)
    }
}

/// Data API settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub graphql_url: String,
    pub request_timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            graphql_url: std::env::var(GRAPHQL_URL_ENV)
                .unwrap_or_else(|_| DEFAULT_GRAPHQL_URL.to_string()),
            request_timeout_secs: 30,
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub submission: SubmissionSettings,
    #[serde(default)]
    pub api: ApiSettings,
    /// Path to audit log file
    #[serde(default)]
    pub audit_log_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            submission: SubmissionSettings::default(),
            api: ApiSettings::default(),
            audit_log_path: Some("submissions.jsonl".to_string()),
        }
    }
}

impl Config {
    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.submission;
        if !(0.0..=100.0).contains(&s.slippage_percent) {
            return Err(Error::Config(format!(
                "slippage_percent must be within 0..=100, got {}",
                s.slippage_percent
            )));
        }
        if s.deadline_secs == 0 {
            return Err(Error::Config("deadline_secs must be positive".to_string()));
        }
        if s.confirmation_timeout_secs == 0 {
            return Err(Error::Config(
                "confirmation_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
