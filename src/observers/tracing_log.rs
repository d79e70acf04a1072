use super::{Notice, Severity, SubmissionObserver};
use async_trait::async_trait;

/// Emits each notice as a structured tracing event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

#[async_trait]
impl SubmissionObserver for TracingObserver {
    async fn on_notice(&self, notice: &Notice) {
        let id = notice.submission_id.map(|id| id.to_string()).unwrap_or_default();
        let hash = notice.tx_hash.map(|h| h.to_string()).unwrap_or_default();
        let step = notice.step.map(|s| s.to_string()).unwrap_or_default();

        match notice.severity {
            Severity::Warning | Severity::Error => tracing::warn!(
                submission = %id,
                intent = notice.intent,
                chain_id = notice.chain_id,
                from = %notice.from,
                to = %notice.to,
                step = %step,
                tx_hash = %hash,
                error = ?notice.error,
                "{}: {}",
                notice.title,
                notice.description
            ),
            Severity::Info | Severity::Success => tracing::info!(
                submission = %id,
                intent = notice.intent,
                chain_id = notice.chain_id,
                from = %notice.from,
                to = %notice.to,
                step = %step,
                tx_hash = %hash,
                "{}: {}",
                notice.title,
                notice.description
            ),
        }
    }
}
