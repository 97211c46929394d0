//! Report and notification delivery.
//!
//! Every output channel implements [`Reporter`]. The pipeline calls each
//! configured reporter exactly once per run and records the attempt; a
//! failing reporter never changes the decision.

pub mod email;
pub mod generator;

use crate::analysis::{Decision, ReviewRecord};
use crate::models::ReviewJob;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

pub use email::{EmailReporter, EmailSettings};
pub use generator::{generate_json_report, generate_markdown_report, generate_summary};

/// One output channel.
#[async_trait]
pub trait Reporter: Send + Sync {
    /// Short channel name used in logs and notification records.
    fn channel(&self) -> &str;

    async fn deliver(&self, job: &ReviewJob, record: &ReviewRecord, decision: &Decision) -> Result<()>;
}

/// Outcome of handing the result to one reporter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationAttempt {
    pub channel: String,
    pub delivered: bool,
    pub error: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

/// Call every reporter once, in order. Failures are logged and recorded.
pub async fn deliver_all(
    reporters: &[Arc<dyn Reporter>],
    job: &ReviewJob,
    record: &ReviewRecord,
    decision: &Decision,
) -> Vec<NotificationAttempt> {
    let mut attempts = Vec::with_capacity(reporters.len());

    for reporter in reporters {
        let attempted_at = Utc::now();
        let result = reporter.deliver(job, record, decision).await;
        let error = match result {
            Ok(()) => {
                debug!("Delivered review {} via {}", job.id(), reporter.channel());
                None
            }
            Err(e) => {
                warn!("Reporter '{}' failed: {:#}", reporter.channel(), e);
                Some(format!("{:#}", e))
            }
        };
        attempts.push(NotificationAttempt {
            channel: reporter.channel().to_string(),
            delivered: error.is_none(),
            error,
            attempted_at,
        });
    }

    attempts
}

/// Writes the Markdown report to a file.
pub struct MarkdownFileReporter {
    path: PathBuf,
}

impl MarkdownFileReporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Reporter for MarkdownFileReporter {
    fn channel(&self) -> &str {
        "markdown"
    }

    async fn deliver(&self, job: &ReviewJob, record: &ReviewRecord, decision: &Decision) -> Result<()> {
        let content = generate_markdown_report(job, record, decision);
        tokio::fs::write(&self.path, content)
            .await
            .with_context(|| format!("Failed to write report to {}", self.path.display()))?;
        println!("📝 Report saved to: {}", self.path.display());
        Ok(())
    }
}

/// Writes the JSON report to a file.
pub struct JsonFileReporter {
    path: PathBuf,
}

impl JsonFileReporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Reporter for JsonFileReporter {
    fn channel(&self) -> &str {
        "json"
    }

    async fn deliver(&self, job: &ReviewJob, record: &ReviewRecord, decision: &Decision) -> Result<()> {
        let content = generate_json_report(job, record, decision)?;
        tokio::fs::write(&self.path, content)
            .await
            .with_context(|| format!("Failed to write report to {}", self.path.display()))?;
        println!("📝 Report saved to: {}", self.path.display());
        Ok(())
    }
}

/// Prints the summary to stdout.
pub struct ConsoleReporter;

#[async_trait]
impl Reporter for ConsoleReporter {
    fn channel(&self) -> &str {
        "console"
    }

    async fn deliver(&self, job: &ReviewJob, record: &ReviewRecord, decision: &Decision) -> Result<()> {
        println!("\n{}", generate_summary(job, record, decision));
        Ok(())
    }
}
