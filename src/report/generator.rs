//! Report rendering.
//!
//! Turns a finalized review (job, record, decision) into a Markdown
//! document, a JSON document or a short console summary.

use crate::analysis::{approval_criteria, Decision, ReviewRecord, Verdict};
use crate::models::{
    FailureReason, JobMetadata, Payload, ReviewJob, Severity, TaskKind, TaskOutcome,
    ThresholdConfig,
};
use std::collections::BTreeSet;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(job: &ReviewJob, record: &ReviewRecord, decision: &Decision) -> String {
    let mut output = String::new();

    output.push_str("# ReviewGate Report\n\n");
    output.push_str(&generate_metadata_section(job));
    output.push_str(&generate_decision_section(decision));
    output.push_str(&generate_scores_section(record, job.thresholds()));
    output.push_str(&generate_failures_section(record));
    output.push_str(&generate_security_section(record));
    output.push_str(&generate_details_section(record));
    output.push_str(&generate_ai_section(record));
    output.push_str(&generate_next_steps_section(record, decision, job.thresholds()));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(job: &ReviewJob) -> String {
    let metadata = job.metadata();
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Review ID:** `{}`\n", job.id()));
    if !metadata.reference.is_empty() {
        section.push_str(&format!("- **Reference:** {}\n", metadata.reference));
    }
    if !metadata.title.is_empty() {
        section.push_str(&format!("- **Title:** {}\n", metadata.title));
    }
    if !metadata.author.is_empty() {
        section.push_str(&format!("- **Author:** {}\n", metadata.author));
    }
    if let Some(branches) = branch_range(metadata) {
        section.push_str(&format!("- **Branches:** {}\n", branches));
    }
    section.push_str(&format!(
        "- **Review Date:** {}\n",
        job.created_at().format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Files Reviewed:** {}\n\n", job.files().len()));

    section
}

fn branch_range(metadata: &JobMetadata) -> Option<String> {
    match (metadata.head_branch.is_empty(), metadata.base_branch.is_empty()) {
        (true, true) => None,
        _ => Some(format!("`{}` → `{}`", metadata.head_branch, metadata.base_branch)),
    }
}

/// Generate the decision section.
fn generate_decision_section(decision: &Decision) -> String {
    let verdict = decision.verdict();
    let mut section = String::new();

    section.push_str("## Decision\n\n");
    section.push_str(&format!("{} **{}**\n\n", verdict.emoji(), verdict.label()));
    for finding in decision.key_findings() {
        section.push_str(&format!("- {}\n", finding));
    }
    section.push('\n');

    section
}

/// Display form of a derived value for one kind.
pub fn format_score(kind: TaskKind, value: f64) -> String {
    match kind {
        TaskKind::Security | TaskKind::Quality => format!("{:.1}/10", value),
        TaskKind::Coverage | TaskKind::Documentation => format!("{:.1}%", value),
        TaskKind::AiReview => format!("{:.2}", value),
    }
}

/// Generate the score table.
fn generate_scores_section(record: &ReviewRecord, thresholds: &ThresholdConfig) -> String {
    let scores = record.scores();
    let mut section = String::new();

    section.push_str("## Scores\n\n");
    section.push_str("| Dimension | Value | Threshold | Status |\n");
    section.push_str("|:---|:---:|:---:|:---:|\n");

    for kind in TaskKind::ALL {
        let observed = scores.for_kind(kind);
        let threshold = thresholds.for_kind(kind);
        let passed = observed >= threshold
            && !(kind == TaskKind::Security && scores.high_severity_findings > 0);
        section.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            kind.label(),
            format_score(kind, observed),
            format_score(kind, threshold),
            if passed { "✅" } else { "❌" }
        ));
    }
    section.push('\n');

    section
}

/// Generate the failed-task section; empty when every task succeeded.
fn generate_failures_section(record: &ReviewRecord) -> String {
    if record.failures().is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Failed Tasks\n\n");
    section.push_str(
        "These tasks produced no result and counted as the lowest possible value.\n\n",
    );
    section.push_str("| Task | File | Reason | Detail |\n");
    section.push_str("|:---|:---|:---:|:---|\n");
    for failure in record.failures() {
        section.push_str(&format!(
            "| {} | `{}` | {} | {} |\n",
            failure.kind.label(),
            failure.file,
            failure.reason,
            failure.detail.replace('|', "\\|")
        ));
    }
    section.push('\n');

    section
}

/// Generate the security findings section.
fn generate_security_section(record: &ReviewRecord) -> String {
    let findings = record.security_findings();
    let mut section = String::new();

    section.push_str("## Security Findings\n\n");
    if findings.is_empty() {
        section.push_str("No security findings. 🎉\n\n");
        return section;
    }

    for (file, finding) in findings {
        section.push_str(&format!(
            "#### {} **{}** `{}`:{} - {}\n\n",
            finding.severity.emoji(),
            finding.severity,
            file,
            finding.line,
            finding.description
        ));
        if !finding.snippet.is_empty() {
            section.push_str("```\n");
            section.push_str(&finding.snippet);
            section.push_str("\n```\n\n");
        }
    }

    section
}

/// Generate the per-file quality, coverage and documentation details.
fn generate_details_section(record: &ReviewRecord) -> String {
    let mut section = String::new();
    section.push_str("## File Details\n\n");

    for file in record.files() {
        let mut notes = Vec::new();

        for kind in TaskKind::ALL {
            if record.outcome(kind, file).is_some_and(TaskOutcome::is_failure) {
                notes.push(format!("⚠️ {} produced no result", kind.label()));
            }
        }
        if let Some(TaskOutcome::Success(Payload::Security(s))) = record.outcome(TaskKind::Security, file) {
            notes.push(format!(
                "Security {:.1}/10: {} high, {} medium, {} low",
                s.score,
                s.count_at(Severity::High),
                s.count_at(Severity::Medium),
                s.count_at(Severity::Low)
            ));
        }
        if let Some(TaskOutcome::Success(Payload::Quality(q))) = record.outcome(TaskKind::Quality, file) {
            notes.push(format!(
                "Quality {:.1}/10, maintainability {:.1}, debt {:.1} day(s)",
                q.score, q.maintainability_index, q.technical_debt_days
            ));
            notes.extend(q.code_smells.iter().map(|s| format!("Smell: {}", s)));
        }
        if let Some(TaskOutcome::Success(Payload::Coverage(c))) = record.outcome(TaskKind::Coverage, file) {
            let label = if c.is_test_file { " (test file)" } else { "" };
            notes.push(format!("Estimated coverage {:.1}%{}", c.coverage_percent, label));
            notes.extend(c.untested_items.iter().map(|i| format!("Untested: {}", i)));
        }
        if let Some(TaskOutcome::Success(Payload::Documentation(d))) =
            record.outcome(TaskKind::Documentation, file)
        {
            notes.push(format!(
                "Documentation {:.1}% ({}/{})",
                d.coverage_percent, d.documented_items, d.total_items
            ));
            notes.extend(d.missing.iter().cloned());
        }

        section.push_str(&format!("### `{}`\n\n", file));
        if notes.is_empty() {
            section.push_str("*No analysis results available.*\n\n");
            continue;
        }
        for note in notes {
            section.push_str(&format!("- {}\n", note));
        }
        section.push('\n');
    }

    section
}

/// Generate the AI review section.
fn generate_ai_section(record: &ReviewRecord) -> String {
    let reviews: Vec<_> = record
        .payloads(TaskKind::AiReview)
        .filter_map(|(file, payload)| match payload {
            Payload::AiReview(review) => Some((file, review)),
            _ => None,
        })
        .collect();
    if reviews.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## AI Review\n\n");

    for (file, review) in reviews {
        section.push_str(&format!(
            "### `{}` (score {:.2}, confidence {:.2})\n\n",
            file, review.overall_score, review.confidence
        ));
        for (title, items) in [
            ("Strengths", &review.strengths),
            ("Issues", &review.issues),
            ("Security concerns", &review.security_concerns),
            ("Recommendations", &review.recommendations),
        ] {
            if items.is_empty() {
                continue;
            }
            section.push_str(&format!("**{}:**\n", title));
            for item in items {
                section.push_str(&format!("- {}\n", item));
            }
            section.push('\n');
        }
    }

    section
}

/// Generate the action items and approval criteria.
fn generate_next_steps_section(
    record: &ReviewRecord,
    decision: &Decision,
    thresholds: &ThresholdConfig,
) -> String {
    let mut section = String::new();

    let actions = decision.action_items();
    if !actions.is_empty() {
        section.push_str("## Action Items\n\n");
        for (i, item) in actions.iter().enumerate() {
            section.push_str(&format!("{}. {}\n", i + 1, item));
        }
        section.push('\n');
    }

    section.push_str("## Approval Criteria\n\n");
    for criterion in approval_criteria(record, thresholds) {
        section.push_str(&format!("- {}\n", criterion));
    }
    section.push('\n');

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    "---\n\n*Report generated by ReviewGate*\n".to_string()
}

#[derive(Serialize)]
struct JsonOutcome<'a> {
    kind: TaskKind,
    file: &'a str,
    outcome: &'a TaskOutcome,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    review_id: &'a str,
    created_at: DateTime<Utc>,
    metadata: &'a JobMetadata,
    files: &'a [String],
    completed_kinds: &'a BTreeSet<TaskKind>,
    thresholds: &'a ThresholdConfig,
    verdict: Verdict,
    decision: &'a Decision,
    scores: &'a crate::analysis::DerivedScores,
    failures: &'a [crate::analysis::FailedTask],
    outcomes: Vec<JsonOutcome<'a>>,
    action_items: Vec<String>,
    approval_criteria: Vec<String>,
}

/// Generate a JSON report.
pub fn generate_json_report(job: &ReviewJob, record: &ReviewRecord, decision: &Decision) -> Result<String> {
    let report = JsonReport {
        review_id: job.id(),
        created_at: job.created_at(),
        metadata: job.metadata(),
        files: record.files(),
        completed_kinds: record.completed_kinds(),
        thresholds: job.thresholds(),
        verdict: decision.verdict(),
        decision,
        scores: record.scores(),
        failures: record.failures(),
        outcomes: record
            .outcomes()
            .iter()
            .map(|(key, outcome)| JsonOutcome {
                kind: key.kind,
                file: &key.file,
                outcome,
            })
            .collect(),
        action_items: decision.action_items(),
        approval_criteria: approval_criteria(record, job.thresholds()),
    };
    serde_json::to_string_pretty(&report).map_err(Into::into)
}

/// Generate the short summary printed to the terminal.
///
/// Failed or timed-out kinds are always listed.
pub fn generate_summary(job: &ReviewJob, record: &ReviewRecord, decision: &Decision) -> String {
    let verdict = decision.verdict();
    let scores = record.scores();
    let mut out = String::new();

    out.push_str(&format!("📊 Review Summary ({})\n", job.id()));
    out.push_str(&format!("   Files reviewed: {}\n", job.files().len()));
    out.push_str(&format!(
        "   Analyses completed: {}/{}\n",
        record.completed_kinds().len(),
        TaskKind::ALL.len()
    ));
    for kind in TaskKind::ALL {
        out.push_str(&format!(
            "   {:<14} {}\n",
            format!("{}:", kind.label()),
            format_score(kind, scores.for_kind(kind))
        ));
    }
    if scores.high_severity_findings > 0 {
        out.push_str(&format!(
            "   🔴 High severity findings: {}\n",
            scores.high_severity_findings
        ));
    }

    let failed = record.failed_kinds();
    if !failed.is_empty() {
        let kinds: Vec<String> = failed
            .iter()
            .map(|kind| {
                let timed_out = record
                    .failures()
                    .iter()
                    .any(|f| f.kind == *kind && f.reason == FailureReason::Timeout);
                if timed_out {
                    format!("{} (timeout)", kind)
                } else {
                    kind.to_string()
                }
            })
            .collect();
        out.push_str(&format!("   ⚠️  Failed tasks: {}\n", kinds.join(", ")));
    }

    out.push_str(&format!("\n{} Verdict: {}\n", verdict.emoji(), verdict.label()));
    for breach in decision.breaches() {
        out.push_str(&format!("   - {}\n", breach.reason));
    }

    out
}
