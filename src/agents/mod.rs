//! Analysis agents.
//!
//! Every analysis dimension is served by an [`Analyzer`]. The dispatcher only
//! sees this trait, so built-in heuristics, the Ollama reviewer and scripted
//! test doubles are interchangeable.

pub mod ai_review;
pub mod coverage;
pub mod documentation;
pub mod quality;
pub mod scripted;
pub mod security;
mod shape;

use crate::models::{OutcomeKey, Payload, SourceFile, TaskKind, TaskOutcome};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

pub use ai_review::{AiSettings, OfflineReviewer, OllamaReviewer};
pub use coverage::CoverageEstimator;
pub use documentation::DocumentationChecker;
pub use quality::QualityAnalyzer;
pub use scripted::{canned, canned_security, Script, ScriptedAnalyzer};
pub use security::SecurityScanner;

/// Errors an analyzer may return for one file.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// A backing service (LLM endpoint, tool) could not be reached.
    #[error("analyzer unavailable: {0}")]
    Unavailable(String),

    /// The analysis ran but could not complete.
    #[error("analysis failed: {0}")]
    Failed(String),

    /// The backing service answered with something unparseable.
    #[error("malformed analyzer output: {0}")]
    Malformed(String),

    /// A blocking worker panicked.
    #[error("analysis worker panicked: {0}")]
    Panicked(String),
}

/// Wave-one outcomes, handed to analyzers that need context.
#[derive(Debug, Clone, Default)]
pub struct PriorFindings {
    outcomes: BTreeMap<OutcomeKey, TaskOutcome>,
}

impl PriorFindings {
    pub fn new(outcomes: BTreeMap<OutcomeKey, TaskOutcome>) -> Self {
        Self { outcomes }
    }

    /// Outcome of `kind` for the given file, if that kind was dispatched.
    pub fn get(&self, kind: TaskKind, file: &str) -> Option<&TaskOutcome> {
        self.outcomes.get(&OutcomeKey::new(kind, file))
    }

    /// Successful payload of `kind` for the given file.
    pub fn payload(&self, kind: TaskKind, file: &str) -> Option<&Payload> {
        self.get(kind, file).and_then(TaskOutcome::payload)
    }

    /// Number of outcomes carried.
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Everything an analyzer sees for one file.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisInput<'a> {
    pub file: &'a SourceFile,
    /// Present only for kinds that need prior results.
    pub prior: Option<&'a PriorFindings>,
}

/// One analysis dimension.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// The kind of payload this analyzer produces.
    fn kind(&self) -> TaskKind;

    /// Analyze one file.
    async fn analyze(&self, input: &AnalysisInput<'_>) -> Result<Payload, AnalysisError>;
}

/// The analyzer registered for each kind.
#[derive(Clone, Default)]
pub struct AnalyzerSet {
    analyzers: BTreeMap<TaskKind, Arc<dyn Analyzer>>,
}

impl AnalyzerSet {
    /// Built-in heuristic analyzers plus the given AI reviewer.
    pub fn builtin(ai_reviewer: Arc<dyn Analyzer>) -> Self {
        Self::default()
            .with(Arc::new(SecurityScanner::new()))
            .with(Arc::new(QualityAnalyzer::new()))
            .with(Arc::new(CoverageEstimator::new()))
            .with(Arc::new(DocumentationChecker::new()))
            .with(ai_reviewer)
    }

    /// Register an analyzer, replacing any previous one of the same kind.
    pub fn with(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzers.insert(analyzer.kind(), analyzer);
        self
    }

    pub fn get(&self, kind: TaskKind) -> Option<Arc<dyn Analyzer>> {
        self.analyzers.get(&kind).cloned()
    }
}

/// Run CPU-bound analysis work off the async worker threads.
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T, AnalysisError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|e| {
        if e.is_panic() {
            AnalysisError::Panicked(e.to_string())
        } else {
            AnalysisError::Failed(format!("analysis worker cancelled: {}", e))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CoverageReport, FailureReason};

    #[test]
    fn test_builtin_set_covers_every_kind() {
        let set = AnalyzerSet::builtin(Arc::new(OfflineReviewer::new()));
        for kind in TaskKind::ALL {
            let analyzer = set.get(kind).expect("analyzer registered");
            assert_eq!(analyzer.kind(), kind);
        }
    }

    #[test]
    fn test_with_replaces_same_kind() {
        let scripted = Arc::new(ScriptedAnalyzer::new(
            TaskKind::Security,
            Script::Fail("boom".to_string()),
        ));
        let set = AnalyzerSet::builtin(Arc::new(OfflineReviewer::new())).with(scripted);
        let analyzer = set.get(TaskKind::Security).unwrap();
        assert_eq!(analyzer.kind(), TaskKind::Security);
        assert!(set.get(TaskKind::AiReview).is_some());
    }

    #[test]
    fn test_prior_findings_lookup() {
        let mut outcomes = BTreeMap::new();
        outcomes.insert(
            OutcomeKey::new(TaskKind::Coverage, "a.py"),
            TaskOutcome::Success(Payload::Coverage(CoverageReport {
                coverage_percent: 55.0,
                is_test_file: false,
                untested_items: vec![],
                missing_test_types: vec![],
            })),
        );
        outcomes.insert(
            OutcomeKey::new(TaskKind::Security, "a.py"),
            TaskOutcome::failure(FailureReason::Error, "scanner crashed"),
        );
        let prior = PriorFindings::new(outcomes);

        assert!(prior.payload(TaskKind::Coverage, "a.py").is_some());
        assert!(prior.payload(TaskKind::Security, "a.py").is_none());
        assert!(prior.get(TaskKind::Security, "a.py").unwrap().is_failure());
        assert!(prior.get(TaskKind::Quality, "a.py").is_none());
        assert_eq!(prior.len(), 2);
    }

    #[tokio::test]
    async fn test_run_blocking_maps_panic() {
        let result: Result<(), _> = run_blocking(|| panic!("worker died")).await;
        assert!(matches!(result, Err(AnalysisError::Panicked(_))));
    }
}
