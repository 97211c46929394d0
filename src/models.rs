//! Data models for the review pipeline.
//!
//! This module contains the job input, the per-kind analysis payloads and
//! the outcome types that flow from the dispatcher to the aggregator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Severity level of a security finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Low severity - worth a look, rarely exploitable on its own
    Low,
    /// Medium severity - risky API usage that needs review
    Medium,
    /// High severity - injection, hardcoded secrets, code execution
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
        }
    }
}

impl Severity {
    /// Returns an emoji representation of the severity.
    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Low => "🟢",
            Severity::Medium => "🟡",
            Severity::High => "🔴",
        }
    }
}

/// The five fixed analysis dimensions.
///
/// Declaration order is the decision engine's priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Security,
    Quality,
    Coverage,
    AiReview,
    Documentation,
}

impl TaskKind {
    /// Every kind, in priority order.
    pub const ALL: [TaskKind; 5] = [
        TaskKind::Security,
        TaskKind::Quality,
        TaskKind::Coverage,
        TaskKind::AiReview,
        TaskKind::Documentation,
    ];

    /// Kinds that only need the job's files and run in the first wave.
    pub const FIRST_WAVE: [TaskKind; 4] = [
        TaskKind::Security,
        TaskKind::Quality,
        TaskKind::Coverage,
        TaskKind::Documentation,
    ];

    /// Whether this kind consumes the outcomes of its siblings.
    pub fn needs_prior_results(self) -> bool {
        matches!(self, TaskKind::AiReview)
    }

    /// Stable identifier used in breach lists, logs and JSON.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Security => "security",
            TaskKind::Quality => "quality",
            TaskKind::Coverage => "coverage",
            TaskKind::AiReview => "ai_review",
            TaskKind::Documentation => "documentation",
        }
    }

    /// Human-readable label for reports.
    pub fn label(self) -> &'static str {
        match self {
            TaskKind::Security => "Security",
            TaskKind::Quality => "Code Quality",
            TaskKind::Coverage => "Test Coverage",
            TaskKind::AiReview => "AI Review",
            TaskKind::Documentation => "Documentation",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file under review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Path relative to the repository root (or as given on the command line).
    pub path: String,
    /// Full text content.
    pub content: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// The five numeric gates evaluated by the decision engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Minimum derived security score (0-10).
    #[serde(default = "default_security_threshold")]
    pub security: f64,

    /// Minimum mean quality score (0-10).
    #[serde(default = "default_quality_threshold")]
    pub quality: f64,

    /// Minimum mean test coverage percentage.
    #[serde(default = "default_coverage_threshold")]
    pub coverage: f64,

    /// Minimum mean AI review confidence (0-1).
    #[serde(default = "default_ai_threshold")]
    pub ai_confidence: f64,

    /// Minimum mean documentation coverage percentage.
    #[serde(default = "default_documentation_threshold")]
    pub documentation: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            security: default_security_threshold(),
            quality: default_quality_threshold(),
            coverage: default_coverage_threshold(),
            ai_confidence: default_ai_threshold(),
            documentation: default_documentation_threshold(),
        }
    }
}

impl ThresholdConfig {
    /// The cutoff that applies to a given dimension.
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

fn default_security_threshold() -> f64 {
    8.0
}

fn default_quality_threshold() -> f64 {
    7.0
}

fn default_coverage_threshold() -> f64 {
    80.0
}

fn default_ai_threshold() -> f64 {
    0.8
}

fn default_documentation_threshold() -> f64 {
    70.0
}

/// Minimal work-item metadata carried through to the reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMetadata {
    /// Where the files came from (PR URL, branch range, "local files").
    pub reference: String,
    pub title: String,
    pub author: String,
    pub head_branch: String,
    pub base_branch: String,
}

/// Immutable input to one orchestration run.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewJob {
    id: String,
    created_at: DateTime<Utc>,
    metadata: JobMetadata,
    files: Vec<SourceFile>,
    thresholds: ThresholdConfig,
}

impl ReviewJob {
    /// Create a job with a fresh `REV-YYYYMMDD-XXXXXXXX` identifier.
    pub fn new(metadata: JobMetadata, files: Vec<SourceFile>, thresholds: ThresholdConfig) -> Self {
        let created_at = Utc::now();
        let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
        Self {
            id: format!("REV-{}-{}", created_at.format("%Y%m%d"), suffix),
            created_at,
            metadata,
            files,
            thresholds,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn metadata(&self) -> &JobMetadata {
        &self.metadata
    }

    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    pub fn thresholds(&self) -> &ThresholdConfig {
        &self.thresholds
    }
}

/// A single pattern hit from the security scanner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityFinding {
    /// 1-indexed line of the match.
    pub line: usize,
    pub severity: Severity,
    pub description: String,
    pub snippet: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityReport {
    /// 0-10, higher is safer.
    pub score: f64,
    pub findings: Vec<SecurityFinding>,
    pub recommendations: Vec<String>,
}

impl SecurityReport {
    /// Number of HIGH-severity findings.
    pub fn high_severity_count(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity >= Severity::High)
            .count()
    }

    /// Number of findings at exactly the given severity.
    pub fn count_at(&self, severity: Severity) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == severity)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// 0-10, higher is better.
    pub score: f64,
    /// 0-100.
    pub maintainability_index: f64,
    pub code_smells: Vec<String>,
    pub technical_debt_days: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub coverage_percent: f64,
    pub is_test_file: bool,
    pub untested_items: Vec<String>,
    pub missing_test_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiReviewReport {
    /// 0-1.
    pub overall_score: f64,
    /// 0-1.
    pub confidence: f64,
    pub strengths: Vec<String>,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub security_concerns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentationReport {
    pub coverage_percent: f64,
    pub total_items: usize,
    pub documented_items: usize,
    pub missing: Vec<String>,
}

/// Kind-specific success result of one analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    Security(SecurityReport),
    Quality(QualityReport),
    Coverage(CoverageReport),
    AiReview(AiReviewReport),
    Documentation(DocumentationReport),
}

impl Payload {
    /// The task kind this payload belongs to.
    pub fn kind(&self) -> TaskKind {
        match self {
            Payload::Security(_) => TaskKind::Security,
            Payload::Quality(_) => TaskKind::Quality,
            Payload::Coverage(_) => TaskKind::Coverage,
            Payload::AiReview(_) => TaskKind::AiReview,
            Payload::Documentation(_) => TaskKind::Documentation,
        }
    }

    /// Check that every score is finite and inside its documented range.
    pub fn validate(&self) -> Result<(), String> {
        let checks: Vec<(&str, f64, f64)> = match self {
            Payload::Security(r) => vec![("security score", r.score, 10.0)],
            Payload::Quality(r) => vec![
                ("quality score", r.score, 10.0),
                ("maintainability index", r.maintainability_index, 100.0),
            ],
            Payload::Coverage(r) => vec![("coverage percent", r.coverage_percent, 100.0)],
            Payload::AiReview(r) => vec![
                ("overall score", r.overall_score, 1.0),
                ("confidence", r.confidence, 1.0),
            ],
            Payload::Documentation(r) => {
                vec![("documentation coverage", r.coverage_percent, 100.0)]
            }
        };

        for (name, value, max) in checks {
            if !value.is_finite() || !(0.0..=max).contains(&value) {
                return Err(format!("{} {} outside 0..={}", name, value, max));
            }
        }
        Ok(())
    }
}

/// Why a task produced no usable payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Timeout,
    Error,
    Panic,
    Malformed,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureReason::Timeout => "timeout",
            FailureReason::Error => "error",
            FailureReason::Panic => "panic",
            FailureReason::Malformed => "malformed",
        };
        f.write_str(s)
    }
}

/// Result of one task for one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
pub enum TaskOutcome {
    Success(Payload),
    Failure { reason: FailureReason, detail: String },
}

impl TaskOutcome {
    pub fn failure(reason: FailureReason, detail: impl Into<String>) -> Self {
        TaskOutcome::Failure {
            reason,
            detail: detail.into(),
        }
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::failure(FailureReason::Timeout, detail)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TaskOutcome::Failure { .. })
    }

    pub fn payload(&self) -> Option<&Payload> {
        match self {
            TaskOutcome::Success(payload) => Some(payload),
            TaskOutcome::Failure { .. } => None,
        }
    }
}

/// Identity of one outcome slot: which task, which file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct OutcomeKey {
    pub kind: TaskKind,
    pub file: String,
}

impl OutcomeKey {
    pub fn new(kind: TaskKind, file: impl Into<String>) -> Self {
        Self {
            kind,
            file: file.into(),
        }
    }
}

impl fmt::Display for OutcomeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.file)
    }
}
