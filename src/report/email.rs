//! SMTP email notification.

use super::generator::generate_summary;
use super::Reporter;
use crate::analysis::{Decision, ReviewRecord};
use crate::models::ReviewJob;
use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use serde::{Deserialize, Serialize};
use tracing::info;

/// SMTP connection and addressing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailSettings {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: String,
    /// Normally supplied through `SMTP_PASSWORD` rather than the file.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    pub from: String,
    pub to: Vec<String>,
}

fn default_smtp_port() -> u16 {
    587
}

/// Sends the review summary by email over STARTTLS.
pub struct EmailReporter {
    settings: EmailSettings,
}

impl EmailReporter {
    pub fn new(settings: EmailSettings) -> Self {
        Self { settings }
    }

    /// Build the message for a finished review.
    pub fn compose(&self, job: &ReviewJob, record: &ReviewRecord, decision: &Decision) -> Result<Message> {
        let from: Mailbox = self
            .settings
            .from
            .parse()
            .with_context(|| format!("Invalid sender address: {}", self.settings.from))?;

        let mut builder = Message::builder().from(from).subject(subject(job, decision));
        for to in &self.settings.to {
            let mailbox: Mailbox = to
                .parse()
                .with_context(|| format!("Invalid recipient address: {}", to))?;
            builder = builder.to(mailbox);
        }

        builder
            .header(ContentType::TEXT_PLAIN)
            .body(generate_summary(job, record, decision))
            .context("Failed to build email message")
    }
}

fn subject(job: &ReviewJob, decision: &Decision) -> String {
    let verdict = decision.verdict();
    let title = &job.metadata().title;
    if title.is_empty() {
        format!("{} Code review {}: {}", verdict.emoji(), job.id(), verdict.label())
    } else {
        format!("{} {}: {}", verdict.emoji(), title, verdict.label())
    }
}

#[async_trait]
impl Reporter for EmailReporter {
    fn channel(&self) -> &str {
        "email"
    }

    async fn deliver(&self, job: &ReviewJob, record: &ReviewRecord, decision: &Decision) -> Result<()> {
        if self.settings.to.is_empty() {
            anyhow::bail!("No email recipients configured");
        }
        let message = self.compose(job, record, decision)?;

        let mut builder = SmtpTransport::starttls_relay(&self.settings.smtp_host)
            .with_context(|| format!("Invalid SMTP host: {}", self.settings.smtp_host))?
            .port(self.settings.smtp_port);
        if let Some(password) = &self.settings.password {
            builder = builder.credentials(Credentials::new(
                self.settings.username.clone(),
                password.clone(),
            ));
        }
        let transport = builder.build();

        // lettre's SMTP transport is blocking.
        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .context("Email worker failed")?
            .context("Failed to send email")?;

        info!("Email sent to {} recipient(s)", self.settings.to.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::canned_security;
    use crate::analysis::aggregator::tests::{job_with, report_with};
    use crate::analysis::{aggregate, decide};
    use crate::models::TaskOutcome;

    fn settings(to: Vec<&str>) -> EmailSettings {
        EmailSettings {
            smtp_host: "smtp.example.com".to_string(),
            smtp_port: 587,
            username: "gate".to_string(),
            password: None,
            from: "ReviewGate <gate@example.com>".to_string(),
            to: to.into_iter().map(String::from).collect(),
        }
    }

    fn review() -> (ReviewJob, ReviewRecord, Decision) {
        let job = job_with(&["a.py"]);
        let report = report_with(&["a.py"], |_, _| TaskOutcome::Success(canned_security(2.0, 1)));
        let record = aggregate(&job, report);
        let decision = decide(&record, job.thresholds());
        (job, record, decision)
    }

    #[test]
    fn test_compose_message() {
        let (job, record, decision) = review();
        let reporter = EmailReporter::new(settings(vec!["lead@example.com"]));
        let message = reporter.compose(&job, &record, &decision).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("To: lead@example.com"));
        assert!(subject(&job, &decision).ends_with("CRITICAL ESCALATION"));
    }

    #[test]
    fn test_invalid_recipient_is_rejected() {
        let (job, record, decision) = review();
        let reporter = EmailReporter::new(settings(vec!["not an address"]));
        let err = reporter.compose(&job, &record, &decision).unwrap_err();
        assert!(err.to_string().contains("Invalid recipient address"));
    }

    #[tokio::test]
    async fn test_no_recipients_fails_without_connecting() {
        let (job, record, decision) = review();
        let reporter = EmailReporter::new(settings(vec![]));
        assert!(reporter.deliver(&job, &record, &decision).await.is_err());
    }

    #[test]
    fn test_password_is_not_serialized() {
        let mut s = settings(vec!["a@example.com"]);
        s.password = Some("hunter2".to_string());
        let text = toml::to_string(&s).unwrap();
        assert!(!text.contains("hunter2"));
    }
}
