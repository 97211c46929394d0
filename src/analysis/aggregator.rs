//! Result aggregation.
//!
//! Folds the settled outcomes of a run into an immutable [`ReviewRecord`]
//! with one derived value per task kind. Failed tasks count as the worst
//! possible value, so missing evidence can never pass a gate.

use crate::models::{
    FailureReason, OutcomeKey, Payload, ReviewJob, SecurityFinding, TaskKind, TaskOutcome,
};
use crate::orchestrator::DispatchReport;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Value a failed task contributes to its kind's derived score.
pub const FAILURE_SENTINEL: f64 = 0.0;

/// A task that produced no usable payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedTask {
    pub kind: TaskKind,
    pub file: String,
    pub reason: FailureReason,
    pub detail: String,
}

/// One number per kind, as the decision engine sees them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedScores {
    /// Minimum across files (0-10).
    pub security: f64,
    /// Mean across files (0-10).
    pub quality: f64,
    /// Mean percentage.
    pub coverage: f64,
    /// Mean confidence (0-1).
    pub ai_confidence: f64,
    /// Mean percentage.
    pub documentation: f64,
    /// Total HIGH findings across all files.
    pub high_severity_findings: usize,
}

impl DerivedScores {
    pub fn for_kind(&self, kind: TaskKind) -> f64 {
        match kind {
            TaskKind::Security => self.security,
            TaskKind::Quality => self.quality,
            TaskKind::Coverage => self.coverage,
            TaskKind::AiReview => self.ai_confidence,
            TaskKind::Documentation => self.documentation,
        }
    }
}

/// The consolidated, read-only result of a run.
#[derive(Debug, Clone)]
pub struct ReviewRecord {
    files: Vec<String>,
    outcomes: BTreeMap<OutcomeKey, TaskOutcome>,
    completed: BTreeSet<TaskKind>,
    scores: DerivedScores,
    failures: Vec<FailedTask>,
}

impl ReviewRecord {
    /// File paths in job order.
    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn outcomes(&self) -> &BTreeMap<OutcomeKey, TaskOutcome> {
        &self.outcomes
    }

    pub fn outcome(&self, kind: TaskKind, file: &str) -> Option<&TaskOutcome> {
        self.outcomes.get(&OutcomeKey::new(kind, file))
    }

    /// Kinds that were dispatched and fully settled.
    pub fn completed_kinds(&self) -> &BTreeSet<TaskKind> {
        &self.completed
    }

    pub fn scores(&self) -> &DerivedScores {
        &self.scores
    }

    pub fn failures(&self) -> &[FailedTask] {
        &self.failures
    }

    /// Kinds with at least one failed file.
    pub fn failed_kinds(&self) -> BTreeSet<TaskKind> {
        self.failures.iter().map(|f| f.kind).collect()
    }

    /// Successful payloads of one kind, with their file.
    pub fn payloads(&self, kind: TaskKind) -> impl Iterator<Item = (&str, &Payload)> {
        self.outcomes
            .iter()
            .filter(move |(key, _)| key.kind == kind)
            .filter_map(|(key, outcome)| outcome.payload().map(|p| (key.file.as_str(), p)))
    }

    /// Every security finding, grouped by file, highest severity first.
    pub fn security_findings(&self) -> Vec<(&str, &SecurityFinding)> {
        let mut findings: Vec<(&str, &SecurityFinding)> = self
            .payloads(TaskKind::Security)
            .flat_map(|(file, payload)| match payload {
                Payload::Security(report) => report.findings.iter().map(|f| (file, f)).collect(),
                _ => Vec::new(),
            })
            .collect();
        findings.sort_by(|a, b| b.1.severity.cmp(&a.1.severity).then(a.0.cmp(b.0)));
        findings
    }
}

/// The value one outcome contributes to its kind.
fn contribution(kind: TaskKind, outcome: &TaskOutcome) -> f64 {
    let Some(payload) = outcome.payload() else {
        return FAILURE_SENTINEL;
    };
    match (kind, payload) {
        (TaskKind::Security, Payload::Security(r)) if r.high_severity_count() > 0 => 0.0,
        (TaskKind::Security, Payload::Security(r)) => r.score,
        (TaskKind::Quality, Payload::Quality(r)) => r.score,
        (TaskKind::Coverage, Payload::Coverage(r)) => r.coverage_percent,
        (TaskKind::AiReview, Payload::AiReview(r)) => r.confidence,
        (TaskKind::Documentation, Payload::Documentation(r)) => r.coverage_percent,
        _ => FAILURE_SENTINEL,
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return FAILURE_SENTINEL;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn minimum(values: &[f64]) -> f64 {
    values
        .iter()
        .copied()
        .reduce(f64::min)
        .unwrap_or(FAILURE_SENTINEL)
}

/// Build the review record for a job from its dispatch report.
///
/// Any dispatched key without an outcome is filled with an error failure so
/// that every dispatched key has exactly one outcome.
pub fn aggregate(job: &ReviewJob, report: DispatchReport) -> ReviewRecord {
    let mut outcomes = report.settled.outcomes;
    let files: Vec<String> = job.files().iter().map(|f| f.path.clone()).collect();

    for &kind in &report.dispatched {
        for file in &files {
            outcomes
                .entry(OutcomeKey::new(kind, file))
                .or_insert_with(|| {
                    warn!("No outcome recorded for {}:{}", kind, file);
                    TaskOutcome::failure(FailureReason::Error, "no outcome recorded")
                });
        }
    }

    let values = |kind: TaskKind| -> Vec<f64> {
        files
            .iter()
            .map(|file| {
                outcomes
                    .get(&OutcomeKey::new(kind, file))
                    .map_or(FAILURE_SENTINEL, |o| contribution(kind, o))
            })
            .collect()
    };
    let dispatched = |kind: TaskKind| report.dispatched.contains(&kind);
    let derive = |kind: TaskKind, fold: fn(&[f64]) -> f64| {
        if dispatched(kind) {
            fold(&values(kind))
        } else {
            FAILURE_SENTINEL
        }
    };

    let high_severity_findings: usize = outcomes
        .iter()
        .filter(|(key, _)| key.kind == TaskKind::Security)
        .filter_map(|(_, outcome)| match outcome.payload() {
            Some(Payload::Security(r)) => Some(r.high_severity_count()),
            _ => None,
        })
        .sum();

    let scores = DerivedScores {
        security: derive(TaskKind::Security, minimum),
        quality: derive(TaskKind::Quality, mean),
        coverage: derive(TaskKind::Coverage, mean),
        ai_confidence: derive(TaskKind::AiReview, mean),
        documentation: derive(TaskKind::Documentation, mean),
        high_severity_findings,
    };

    let failures: Vec<FailedTask> = outcomes
        .iter()
        .filter_map(|(key, outcome)| match outcome {
            TaskOutcome::Failure { reason, detail } => Some(FailedTask {
                kind: key.kind,
                file: key.file.clone(),
                reason: *reason,
                detail: detail.clone(),
            }),
            TaskOutcome::Success(_) => None,
        })
        .collect();

    debug!(
        "Aggregated {} outcome(s) for {}, {} failure(s)",
        outcomes.len(),
        job.id(),
        failures.len()
    );

    ReviewRecord {
        files,
        completed: report.dispatched.iter().copied().collect(),
        outcomes,
        scores,
        failures,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::agents::{canned, canned_security};
    use crate::models::{JobMetadata, SourceFile, ThresholdConfig};
    use crate::orchestrator::barrier::Settled;

    pub(crate) fn job_with(paths: &[&str]) -> ReviewJob {
        ReviewJob::new(
            JobMetadata::default(),
            paths.iter().map(|p| SourceFile::new(*p, "")).collect(),
            ThresholdConfig::default(),
        )
    }

    /// Dispatch report with one outcome per (kind, file) from `make`.
    pub(crate) fn report_with(
        paths: &[&str],
        make: impl Fn(TaskKind, &str) -> TaskOutcome,
    ) -> DispatchReport {
        let mut outcomes = BTreeMap::new();
        for kind in TaskKind::ALL {
            for path in paths {
                outcomes.insert(OutcomeKey::new(kind, *path), make(kind, path));
            }
        }
        DispatchReport {
            dispatched: TaskKind::ALL.to_vec(),
            settled: Settled {
                outcomes,
                forced: Vec::new(),
            },
        }
    }

    #[test]
    fn test_empty_file_set_derives_zero() {
        let job = job_with(&[]);
        let record = aggregate(&job, report_with(&[], |k, _| TaskOutcome::Success(canned(k, 1.0))));
        let scores = record.scores();
        for kind in TaskKind::ALL {
            assert_eq!(scores.for_kind(kind), 0.0);
        }
        assert_eq!(record.completed_kinds().len(), 5);
    }

    #[test]
    fn test_security_is_minimum_and_high_finding_zeroes() {
        let job = job_with(&["a.py", "b.py"]);
        let report = report_with(&["a.py", "b.py"], |kind, file| match (kind, file) {
            (TaskKind::Security, "a.py") => TaskOutcome::Success(canned_security(9.5, 0)),
            (TaskKind::Security, _) => TaskOutcome::Success(canned_security(8.5, 0)),
            (k, _) => TaskOutcome::Success(canned(k, 0.9)),
        });
        assert_eq!(aggregate(&job, report).scores().security, 8.5);

        let report = report_with(&["a.py", "b.py"], |kind, file| match (kind, file) {
            (TaskKind::Security, "a.py") => TaskOutcome::Success(canned_security(9.5, 0)),
            (TaskKind::Security, _) => TaskOutcome::Success(canned_security(9.0, 1)),
            (k, _) => TaskOutcome::Success(canned(k, 0.9)),
        });
        let record = aggregate(&job, report);
        assert_eq!(record.scores().security, 0.0);
        assert_eq!(record.scores().high_severity_findings, 1);
        assert_eq!(record.security_findings().len(), 1);
    }

    #[test]
    fn test_failures_contribute_sentinel() {
        let job = job_with(&["a.py", "b.py"]);
        let report = report_with(&["a.py", "b.py"], |kind, file| match (kind, file) {
            (TaskKind::Coverage, "b.py") => TaskOutcome::timeout("slow"),
            (TaskKind::Coverage, _) => TaskOutcome::Success(canned(TaskKind::Coverage, 90.0)),
            (k, _) => TaskOutcome::Success(canned(k, 0.9)),
        });
        let record = aggregate(&job, report);

        assert_eq!(record.scores().coverage, 45.0);
        assert_eq!(record.failures().len(), 1);
        assert_eq!(record.failures()[0].reason, FailureReason::Timeout);
        assert!(record.failed_kinds().contains(&TaskKind::Coverage));
    }

    #[test]
    fn test_missing_outcome_is_filled() {
        let job = job_with(&["a.py"]);
        let mut report = report_with(&["a.py"], |k, _| TaskOutcome::Success(canned(k, 0.9)));
        report
            .settled
            .outcomes
            .remove(&OutcomeKey::new(TaskKind::Quality, "a.py"));

        let record = aggregate(&job, report);
        assert_eq!(record.outcomes().len(), 5);
        assert!(record
            .outcome(TaskKind::Quality, "a.py")
            .is_some_and(TaskOutcome::is_failure));
        assert_eq!(record.scores().quality, 0.0);
    }

    #[test]
    fn test_means() {
        let job = job_with(&["a.py", "b.py"]);
        let report = report_with(&["a.py", "b.py"], |kind, file| {
            let value = match (kind, file) {
                (TaskKind::Quality, "a.py") => 6.0,
                (TaskKind::Quality, _) => 8.0,
                (TaskKind::AiReview, "a.py") => 0.7,
                (TaskKind::AiReview, _) => 0.9,
                (TaskKind::Documentation, "a.py") => 50.0,
                (TaskKind::Documentation, _) => 100.0,
                (TaskKind::Security, _) => 9.0,
                (TaskKind::Coverage, _) => 80.0,
            };
            TaskOutcome::Success(canned(kind, value))
        });
        let scores = aggregate(&job, report).scores().clone();

        assert_eq!(scores.quality, 7.0);
        assert!((scores.ai_confidence - 0.8).abs() < 1e-9);
        assert_eq!(scores.documentation, 75.0);
        assert_eq!(scores.coverage, 80.0);
        assert_eq!(scores.security, 9.0);
    }
}
