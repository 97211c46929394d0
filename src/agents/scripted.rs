//! Analyzer with canned behaviour, used by the self-test scenarios.

use super::{AnalysisError, AnalysisInput, Analyzer};
use crate::models::{
    AiReviewReport, CoverageReport, DocumentationReport, Payload, QualityReport, SecurityFinding,
    SecurityReport, Severity, TaskKind,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// What a scripted analyzer does when called.
#[derive(Debug, Clone)]
pub enum Script {
    /// Return this payload.
    Respond(Payload),
    /// Return this payload after a delay.
    Delayed(Duration, Payload),
    /// Return an analysis error.
    Fail(String),
    /// Never complete.
    Hang,
    /// Panic with this message.
    Panic(String),
}

/// Minimal payload of `kind` whose headline value is `value`.
///
/// The headline value is the score, percentage or confidence the aggregator
/// reads for that kind.
pub fn canned(kind: TaskKind, value: f64) -> Payload {
    match kind {
        TaskKind::Security => canned_security(value, 0),
        TaskKind::Quality => Payload::Quality(QualityReport {
            score: value,
            maintainability_index: 75.0,
            code_smells: Vec::new(),
            technical_debt_days: 0.0,
        }),
        TaskKind::Coverage => Payload::Coverage(CoverageReport {
            coverage_percent: value,
            is_test_file: false,
            untested_items: Vec::new(),
            missing_test_types: Vec::new(),
        }),
        TaskKind::AiReview => Payload::AiReview(AiReviewReport {
            overall_score: value,
            confidence: value,
            strengths: Vec::new(),
            issues: Vec::new(),
            recommendations: Vec::new(),
            security_concerns: Vec::new(),
        }),
        TaskKind::Documentation => Payload::Documentation(DocumentationReport {
            coverage_percent: value,
            total_items: 0,
            documented_items: 0,
            missing: Vec::new(),
        }),
    }
}

/// Security payload with the given score and number of HIGH findings.
pub fn canned_security(score: f64, high_findings: usize) -> Payload {
    let findings = (0..high_findings)
        .map(|i| SecurityFinding {
            line: i + 1,
            severity: Severity::High,
            description: "Hardcoded credential".to_string(),
            snippet: "api_key = \"...\"".to_string(),
        })
        .collect();
    Payload::Security(SecurityReport {
        score,
        findings,
        recommendations: Vec::new(),
    })
}

/// Analyzer whose behaviour is fixed up front, optionally per file.
#[derive(Debug, Clone)]
pub struct ScriptedAnalyzer {
    kind: TaskKind,
    default: Script,
    per_file: HashMap<String, Script>,
}

impl ScriptedAnalyzer {
    pub fn new(kind: TaskKind, default: Script) -> Self {
        Self {
            kind,
            default,
            per_file: HashMap::new(),
        }
    }

    /// Override the behaviour for one file.
    pub fn for_file(mut self, path: impl Into<String>, script: Script) -> Self {
        self.per_file.insert(path.into(), script);
        self
    }
}

#[async_trait]
impl Analyzer for ScriptedAnalyzer {
    fn kind(&self) -> TaskKind {
        self.kind
    }

    async fn analyze(&self, input: &AnalysisInput<'_>) -> Result<Payload, AnalysisError> {
        let script = self
            .per_file
            .get(&input.file.path)
            .unwrap_or(&self.default)
            .clone();

        match script {
            Script::Respond(payload) => Ok(payload),
            Script::Delayed(delay, payload) => {
                tokio::time::sleep(delay).await;
                Ok(payload)
            }
            Script::Fail(message) => Err(AnalysisError::Failed(message)),
            Script::Hang => std::future::pending().await,
            Script::Panic(message) => panic!("{}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceFile;

    fn doc(percent: f64) -> Payload {
        canned(TaskKind::Documentation, percent)
    }

    #[tokio::test]
    async fn test_per_file_override() {
        let analyzer = ScriptedAnalyzer::new(TaskKind::Documentation, Script::Respond(doc(90.0)))
            .for_file("b.py", Script::Fail("nope".to_string()));

        let a = SourceFile::new("a.py", "");
        let b = SourceFile::new("b.py", "");

        let ok = analyzer
            .analyze(&AnalysisInput { file: &a, prior: None })
            .await;
        assert_eq!(ok.unwrap(), doc(90.0));

        let err = analyzer
            .analyze(&AnalysisInput { file: &b, prior: None })
            .await;
        assert!(matches!(err, Err(AnalysisError::Failed(_))));
    }

    #[test]
    fn test_canned_payloads_match_kind() {
        for kind in TaskKind::ALL {
            let payload = canned(kind, 0.5);
            assert_eq!(payload.kind(), kind);
            assert!(payload.validate().is_ok());
        }
        match canned_security(9.0, 2) {
            Payload::Security(report) => assert_eq!(report.high_severity_count(), 2),
            other => panic!("unexpected payload {:?}", other),
        }
    }
}
