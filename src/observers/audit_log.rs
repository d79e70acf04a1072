//! Audit log observer
//!
//! Appends every submission notice to a JSONL file.

use super::{Notice, SubmissionObserver};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::Mutex;

/// Entry in the audit log
#[derive(Debug, Serialize)]
struct AuditEntry<'a> {
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    notice: &'a Notice,
}

struct AuditLogWriter {
    path: PathBuf,
}

impl AuditLogWriter {
    fn write(&self, entry: &AuditEntry<'_>) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let json = serde_json::to_string(entry)?;
        writeln!(file, "{}", json)?;
        Ok(())
    }
}

pub struct AuditLogObserver {
    writer: Mutex<AuditLogWriter>,
}

impl AuditLogObserver {
    /// `log_path` is created on first write and appended to afterwards
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            writer: Mutex::new(AuditLogWriter {
                path: log_path.into(),
            }),
        }
    }
}

#[async_trait]
impl SubmissionObserver for AuditLogObserver {
    async fn on_notice(&self, notice: &Notice) {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            notice,
        };

        // Audit logging never blocks a submission
        let writer = self.writer.lock().await;
        if let Err(e) = writer.write(&entry) {
            tracing::warn!(error = %e, path = %writer.path.display(), "Failed to write audit log entry");
        }
    }
}
