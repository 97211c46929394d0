//! Decision engine.
//!
//! A pure function of a finalized [`ReviewRecord`] and a [`ThresholdConfig`].
//! Security is evaluated first and pre-empts everything else; the remaining
//! dimensions are evaluated in priority order and every breach is collected.

use super::aggregator::ReviewRecord;
use crate::models::{TaskKind, ThresholdConfig};
use serde::Serialize;
use std::fmt;

/// Final verdict of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    AutoApprove,
    HumanReview,
    CriticalEscalation,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::AutoApprove => "auto_approve",
            Verdict::HumanReview => "human_review",
            Verdict::CriticalEscalation => "critical_escalation",
        }
    }

    /// Upper-case label used in report headings.
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::AutoApprove => "AUTO APPROVE",
            Verdict::HumanReview => "HUMAN REVIEW",
            Verdict::CriticalEscalation => "CRITICAL ESCALATION",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Verdict::AutoApprove => "✅",
            Verdict::HumanReview => "👀",
            Verdict::CriticalEscalation => "🚨",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dimension that failed its gate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Breach {
    pub dimension: TaskKind,
    pub observed: f64,
    pub threshold: f64,
    pub reason: String,
}

/// Verdict plus the breaches that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    verdict: Verdict,
    breaches: Vec<Breach>,
}

impl Decision {
    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    pub fn breaches(&self) -> &[Breach] {
        &self.breaches
    }

    /// Breached dimensions in priority order.
    pub fn breached_dimensions(&self) -> Vec<TaskKind> {
        self.breaches.iter().map(|b| b.dimension).collect()
    }

    fn breached(&self, kind: TaskKind) -> bool {
        self.breaches.iter().any(|b| b.dimension == kind)
    }

    /// The breach reasons, or a single all-clear line.
    pub fn key_findings(&self) -> Vec<String> {
        if self.breaches.is_empty() {
            return vec!["All quality thresholds met".to_string()];
        }
        self.breaches.iter().map(|b| b.reason.clone()).collect()
    }

    /// Follow-up work implied by the breaches.
    pub fn action_items(&self) -> Vec<String> {
        let mut items = Vec::new();
        if self.verdict == Verdict::CriticalEscalation {
            items.push("Address critical security vulnerabilities immediately".to_string());
            items.push("Follow security best practices for affected code".to_string());
            return items;
        }
        if self.breached(TaskKind::Quality) {
            items.push("Address code quality issues flagged by the quality analysis".to_string());
        }
        if self.breached(TaskKind::Coverage) {
            items.push("Improve test coverage for affected code".to_string());
        }
        if self.breached(TaskKind::AiReview) {
            items.push("Review AI suggestions for code improvements".to_string());
        }
        if self.breached(TaskKind::Documentation) {
            items.push("Add missing documentation to functions and types".to_string());
        }
        items
    }
}

/// What must hold before the change can be approved.
///
/// Lists every gate the record currently fails, independent of which
/// dimensions the verdict short-circuited.
pub fn approval_criteria(record: &ReviewRecord, thresholds: &ThresholdConfig) -> Vec<String> {
    let scores = record.scores();
    let mut criteria = Vec::new();

    if scores.security < thresholds.security {
        criteria.push(format!(
            "Security score must be at least {:.1}/10.0",
            thresholds.security
        ));
    }
    if scores.high_severity_findings > 0 {
        criteria.push("All high-severity security vulnerabilities must be addressed".to_string());
    }
    if scores.quality < thresholds.quality {
        criteria.push(format!(
            "Quality score must be at least {:.1}/10.0",
            thresholds.quality
        ));
    }
    if scores.coverage < thresholds.coverage {
        criteria.push(format!(
            "Test coverage must be at least {:.1}%",
            thresholds.coverage
        ));
    }
    if scores.ai_confidence < thresholds.ai_confidence {
        criteria.push("AI-identified code issues must be resolved".to_string());
    }
    if scores.documentation < thresholds.documentation {
        criteria.push(format!(
            "Documentation coverage must be at least {:.1}%",
            thresholds.documentation
        ));
    }

    if criteria.is_empty() {
        criteria.push("All quality thresholds are met".to_string());
    }
    criteria
}

/// Evaluate the gates.
///
/// 1. Security below threshold, or any HIGH finding, escalates immediately.
/// 2. Quality, coverage, AI confidence and documentation are then checked in
///    that order and every breach is kept.
/// 3. No breach approves; otherwise a human reviews.
///
/// A score equal to its threshold passes.
pub fn decide(record: &ReviewRecord, thresholds: &ThresholdConfig) -> Decision {
    let scores = record.scores();

    if scores.security < thresholds.security || scores.high_severity_findings > 0 {
        let reason = format!(
            "Security issues detected: score {:.1}/{:.1} with {} high severity finding(s)",
            scores.security, thresholds.security, scores.high_severity_findings
        );
        return Decision {
            verdict: Verdict::CriticalEscalation,
            breaches: vec![Breach {
                dimension: TaskKind::Security,
                observed: scores.security,
                threshold: thresholds.security,
                reason,
            }],
        };
    }

    let breaches: Vec<Breach> = [
        TaskKind::Quality,
        TaskKind::Coverage,
        TaskKind::AiReview,
        TaskKind::Documentation,
    ]
    .into_iter()
    .filter_map(|kind| {
        let observed = scores.for_kind(kind);
        let threshold = thresholds.for_kind(kind);
        (observed < threshold).then(|| Breach {
            dimension: kind,
            observed,
            threshold,
            reason: breach_reason(kind, observed, threshold),
        })
    })
    .collect();

    let verdict = if breaches.is_empty() {
        Verdict::AutoApprove
    } else {
        Verdict::HumanReview
    };

    Decision { verdict, breaches }
}

fn breach_reason(kind: TaskKind, observed: f64, threshold: f64) -> String {
    match kind {
        TaskKind::Quality => format!("Quality score too low: {:.2} < {:.1}", observed, threshold),
        TaskKind::Coverage => format!("Test coverage too low: {:.1}% < {:.1}%", observed, threshold),
        TaskKind::AiReview => format!("AI confidence too low: {:.2} < {:.2}", observed, threshold),
        TaskKind::Documentation => format!(
            "Documentation coverage too low: {:.1}% < {:.1}%",
            observed, threshold
        ),
        TaskKind::Security => format!("Security score too low: {:.1} < {:.1}", observed, threshold),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{canned, canned_security};
    use crate::analysis::aggregator::aggregate;
    use crate::analysis::aggregator::tests::{job_with, report_with};
    use crate::models::TaskOutcome;

    /// Record for one file with the given headline values.
    fn record(
        security: f64,
        high: usize,
        quality: f64,
        coverage: Option<f64>,
        ai: f64,
        documentation: f64,
    ) -> ReviewRecord {
        let job = job_with(&["app.py"]);
        let report = report_with(&["app.py"], |kind, _| match kind {
            TaskKind::Security => TaskOutcome::Success(canned_security(security, high)),
            TaskKind::Quality => TaskOutcome::Success(canned(kind, quality)),
            TaskKind::Coverage => match coverage {
                Some(value) => TaskOutcome::Success(canned(kind, value)),
                None => TaskOutcome::timeout("coverage did not finish within 60s"),
            },
            TaskKind::AiReview => TaskOutcome::Success(canned(kind, ai)),
            TaskKind::Documentation => TaskOutcome::Success(canned(kind, documentation)),
        });
        aggregate(&job, report)
    }

    fn thresholds() -> ThresholdConfig {
        ThresholdConfig::default()
    }

    #[test]
    fn test_all_passing_auto_approves() {
        let decision = decide(&record(8.5, 0, 7.8, Some(85.0), 0.85, 75.0), &thresholds());
        assert_eq!(decision.verdict(), Verdict::AutoApprove);
        assert!(decision.breaches().is_empty());
        assert_eq!(decision.key_findings(), vec!["All quality thresholds met".to_string()]);
        assert!(decision.action_items().is_empty());
    }

    #[test]
    fn test_single_high_finding_escalates() {
        let rec = record(8.5, 1, 7.8, Some(85.0), 0.85, 75.0);
        let decision = decide(&rec, &thresholds());
        assert_eq!(decision.verdict(), Verdict::CriticalEscalation);
        assert_eq!(decision.breached_dimensions(), vec![TaskKind::Security]);
        assert!(approval_criteria(&rec, &thresholds())
            .contains(&"All high-severity security vulnerabilities must be addressed".to_string()));
    }

    #[test]
    fn test_high_finding_escalates_even_above_threshold() {
        let job = job_with(&["a.py", "b.py"]);
        let report = report_with(&["a.py", "b.py"], |kind, file| match (kind, file) {
            (TaskKind::Security, "a.py") => TaskOutcome::Success(canned_security(10.0, 0)),
            (TaskKind::Security, _) => TaskOutcome::Success(canned_security(9.0, 1)),
            (TaskKind::Quality, _) => TaskOutcome::Success(canned(kind, 9.0)),
            (TaskKind::AiReview, _) => TaskOutcome::Success(canned(kind, 0.9)),
            (_, _) => TaskOutcome::Success(canned(kind, 95.0)),
        });
        let decision = decide(&aggregate(&job, report), &thresholds());
        assert_eq!(decision.verdict(), Verdict::CriticalEscalation);
    }

    #[test]
    fn test_security_preempts_other_breaches() {
        let decision = decide(&record(3.0, 0, 2.0, Some(10.0), 0.1, 5.0), &thresholds());
        assert_eq!(decision.verdict(), Verdict::CriticalEscalation);
        assert_eq!(decision.breaches().len(), 1);
        assert_eq!(decision.breaches()[0].observed, 3.0);
        assert_eq!(decision.action_items().len(), 2);
    }

    #[test]
    fn test_low_quality_needs_human_review() {
        let decision = decide(&record(8.5, 0, 6.5, Some(85.0), 0.85, 75.0), &thresholds());
        assert_eq!(decision.verdict(), Verdict::HumanReview);
        assert_eq!(decision.breached_dimensions(), vec![TaskKind::Quality]);
        assert_eq!(
            decision.action_items(),
            vec!["Address code quality issues flagged by the quality analysis".to_string()]
        );
    }

    #[test]
    fn test_coverage_timeout_fails_closed() {
        let rec = record(8.5, 0, 7.8, None, 0.85, 75.0);
        assert_eq!(rec.scores().coverage, 0.0);

        let decision = decide(&rec, &thresholds());
        assert_eq!(decision.verdict(), Verdict::HumanReview);
        assert_eq!(decision.breached_dimensions(), vec![TaskKind::Coverage]);
        assert_eq!(decision.breaches()[0].observed, 0.0);
    }

    #[test]
    fn test_breaches_accumulate_in_priority_order() {
        let decision = decide(&record(9.0, 0, 6.0, Some(50.0), 0.5, 10.0), &thresholds());
        assert_eq!(
            decision.breached_dimensions(),
            vec![
                TaskKind::Quality,
                TaskKind::Coverage,
                TaskKind::AiReview,
                TaskKind::Documentation
            ]
        );
        assert_eq!(decision.action_items().len(), 4);
    }

    #[test]
    fn test_equal_to_threshold_passes() {
        let decision = decide(&record(8.0, 0, 7.0, Some(80.0), 0.8, 70.0), &thresholds());
        assert_eq!(decision.verdict(), Verdict::AutoApprove);
    }

    #[test]
    fn test_decision_is_deterministic() {
        let rec = record(8.5, 0, 6.5, Some(70.0), 0.85, 75.0);
        let first = decide(&rec, &thresholds());
        for _ in 0..10 {
            assert_eq!(decide(&rec, &thresholds()), first);
        }
    }

    #[test]
    fn test_approval_criteria_all_met() {
        let rec = record(8.5, 0, 7.8, Some(85.0), 0.85, 75.0);
        assert_eq!(
            approval_criteria(&rec, &thresholds()),
            vec!["All quality thresholds are met".to_string()]
        );
    }

    #[test]
    fn test_verdict_serializes_snake_case() {
        let json = serde_json::to_string(&Verdict::CriticalEscalation).unwrap();
        assert_eq!(json, "\"critical_escalation\"");
    }
}
