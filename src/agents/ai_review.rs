//! AI review agents.
//!
//! [`OllamaReviewer`] asks a local Ollama model for a structured review of
//! one file, seeded with the findings of the first-wave analyzers.
//! [`OfflineReviewer`] produces a deterministic review from those findings
//! alone and is used when no model is available.

use super::{AnalysisError, AnalysisInput, Analyzer, PriorFindings};
use crate::models::{AiReviewReport, Payload, SourceFile, TaskKind, TaskOutcome};
use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info};

/// Connection settings for the Ollama reviewer.
#[derive(Debug, Clone)]
pub struct AiSettings {
    pub ollama_url: String,
    pub model: String,
    pub temperature: f32,
    /// HTTP request timeout; the dispatcher's task timeout still applies.
    pub timeout_seconds: u64,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            model: "llama3.2:latest".to_string(),
            temperature: 0.1,
            timeout_seconds: 180,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

/// Reviewer backed by an Ollama chat model.
pub struct OllamaReviewer {
    settings: AiSettings,
    http_client: reqwest::Client,
}

impl OllamaReviewer {
    pub fn new(settings: AiSettings) -> Result<Self> {
        info!(
            "Initializing AI reviewer with model {} at {}",
            settings.model, settings.ollama_url
        );

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            settings,
            http_client,
        })
    }

    async fn send_prompt(&self, prompt: String) -> Result<String, AnalysisError> {
        let url = format!("{}/api/chat", self.settings.ollama_url.trim_end_matches('/'));

        let request = OllamaChatRequest {
            model: self.settings.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt,
                },
            ],
            stream: false,
            options: OllamaOptions {
                temperature: self.settings.temperature,
            },
        };

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AnalysisError::Failed(format!(
                        "request timed out after {}s",
                        self.settings.timeout_seconds
                    ))
                } else if e.is_connect() {
                    AnalysisError::Unavailable(format!(
                        "cannot connect to Ollama at {}",
                        self.settings.ollama_url
                    ))
                } else {
                    AnalysisError::Failed(format!("failed to send request: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Failed(format!(
                "Ollama API error {}: {}",
                status, body
            )));
        }

        let chat: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::Malformed(format!("unreadable Ollama response: {}", e)))?;

        Ok(chat.message.content)
    }
}

#[async_trait]
impl Analyzer for OllamaReviewer {
    fn kind(&self) -> TaskKind {
        TaskKind::AiReview
    }

    async fn analyze(&self, input: &AnalysisInput<'_>) -> Result<Payload, AnalysisError> {
        let prompt = build_prompt(input.file, input.prior);
        debug!(
            "Requesting AI review of {} ({} prompt chars)",
            input.file.path,
            prompt.len()
        );
        let response = self.send_prompt(prompt).await?;
        let report = parse_review(&response).map_err(AnalysisError::Malformed)?;
        Ok(Payload::AiReview(report))
    }
}

const SYSTEM_PROMPT: &str = r#"You are an expert code reviewer and security auditor.
Answer only in the exact section format requested."#;

/// Summarise the first-wave findings for one file as prompt context.
fn describe_prior(file: &SourceFile, prior: Option<&PriorFindings>) -> String {
    let Some(prior) = prior else {
        return "No automated analysis results available.".to_string();
    };

    let mut lines = Vec::new();
    for kind in TaskKind::FIRST_WAVE {
        let line = match prior.get(kind, &file.path) {
            None => continue,
            Some(TaskOutcome::Failure { reason, .. }) => {
                format!("{}: not available ({})", kind.label(), reason)
            }
            Some(TaskOutcome::Success(payload)) => match payload {
                Payload::Security(r) => format!(
                    "Security score: {:.1}/10 with {} finding(s), {} high severity",
                    r.score,
                    r.findings.len(),
                    r.high_severity_count()
                ),
                Payload::Quality(r) => format!(
                    "Quality score: {:.1}/10, {} code smell(s)",
                    r.score,
                    r.code_smells.len()
                ),
                Payload::Coverage(r) => format!("Estimated test coverage: {:.1}%", r.coverage_percent),
                Payload::Documentation(r) => {
                    format!("Documentation coverage: {:.1}%", r.coverage_percent)
                }
                Payload::AiReview(_) => continue,
            },
        };
        lines.push(format!("- {}", line));
    }
    lines.join("\n")
}

fn build_prompt(file: &SourceFile, prior: Option<&PriorFindings>) -> String {
    let mut prompt = String::new();
    prompt.push_str("Analyze this code and provide a comprehensive review.\n\n");
    prompt.push_str(&format!("FILE: {}\n\n", file.path));
    prompt.push_str("CONTEXT:\n");
    prompt.push_str(&describe_prior(file, prior));
    prompt.push_str("\n\nCODE TO REVIEW:\n```\n");
    prompt.push_str(&file.content);
    prompt.push_str("\n```\n\n");
    prompt.push_str(RESPONSE_FORMAT);
    prompt
}

const RESPONSE_FORMAT: &str = r#"Please provide your review in this exact format:

OVERALL_SCORE: [0.0 to 1.0]
CONFIDENCE: [0.0 to 1.0]

STRENGTHS:
• [2-3 positive aspects]

ISSUES:
• [2-4 specific issues]

RECOMMENDATIONS:
• [2-4 actionable recommendations]

REFACTORING_SUGGESTIONS:
• [1-3 refactoring ideas if applicable]

SECURITY_CONCERNS:
• [security issues or "None identified"]
"#;

fn score_pattern(label: &str) -> Regex {
    Regex::new(&format!(r"(?i){}\s*\**\s*:\s*\**\s*([0-9]*\.?[0-9]+)", label))
        .expect("score pattern is valid")
}

fn section_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?im)^[\s#*]*(STRENGTHS|ISSUES|RECOMMENDATIONS|REFACTORING_SUGGESTIONS|SECURITY_CONCERNS)\**\s*:",
        )
        .expect("section pattern is valid")
    })
}

fn bullets(section: &str) -> Vec<String> {
    section
        .lines()
        .map(str::trim)
        .filter_map(|line| {
            line.strip_prefix('•')
                .or_else(|| line.strip_prefix('-'))
                .or_else(|| line.strip_prefix('*'))
        })
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .filter(|item| {
            let lower = item.to_lowercase();
            lower != "none" && !lower.starts_with("none identified")
        })
        .collect()
}

/// Parse the sectioned review format.
///
/// Both scores are required; a response without them is malformed.
pub fn parse_review(text: &str) -> Result<AiReviewReport, String> {
    let score = |label: &str| -> Result<f64, String> {
        score_pattern(label)
            .captures(text)
            .and_then(|caps| caps[1].parse::<f64>().ok())
            .ok_or_else(|| format!("response has no {} value", label))
    };
    let overall_score = score("OVERALL_SCORE")?;
    let confidence = score("CONFIDENCE")?;

    let headers: Vec<(String, usize, usize)> = section_pattern()
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some((caps[1].to_uppercase(), whole.start(), whole.end()))
        })
        .collect();

    let mut report = AiReviewReport {
        overall_score,
        confidence,
        strengths: Vec::new(),
        issues: Vec::new(),
        recommendations: Vec::new(),
        security_concerns: Vec::new(),
    };

    for (i, (name, _, body_start)) in headers.iter().enumerate() {
        let body_end = headers.get(i + 1).map_or(text.len(), |next| next.1);
        let items = bullets(&text[*body_start..body_end]);
        match name.as_str() {
            "STRENGTHS" => report.strengths.extend(items),
            "ISSUES" => report.issues.extend(items),
            "RECOMMENDATIONS" | "REFACTORING_SUGGESTIONS" => report.recommendations.extend(items),
            "SECURITY_CONCERNS" => report.security_concerns.extend(items),
            _ => {}
        }
    }

    Ok(report)
}

/// Deterministic review derived from the first-wave findings.
pub fn review_from_prior(file: &SourceFile, prior: Option<&PriorFindings>) -> AiReviewReport {
    let mut overall: f64 = 0.9;
    let mut confidence: f64 = 0.9;
    let mut strengths = Vec::new();
    let mut issues = Vec::new();
    let mut recommendations = Vec::new();
    let mut security_concerns = Vec::new();

    match prior {
        None => {
            confidence -= 0.3;
            issues.push("No automated analysis context was available".to_string());
        }
        Some(prior) => {
            for kind in TaskKind::FIRST_WAVE {
                match prior.get(kind, &file.path) {
                    None => {}
                    Some(TaskOutcome::Failure { reason, .. }) => {
                        confidence -= 0.1;
                        issues.push(format!("{} analysis unavailable ({})", kind.label(), reason));
                    }
                    Some(TaskOutcome::Success(Payload::Security(r))) => {
                        if r.high_severity_count() > 0 {
                            overall -= 0.3;
                            confidence -= 0.15;
                        } else if !r.findings.is_empty() {
                            overall -= 0.1;
                        } else {
                            strengths.push("No risky code patterns detected".to_string());
                        }
                        security_concerns.extend(
                            r.findings
                                .iter()
                                .map(|f| format!("Line {}: {} [{}]", f.line, f.description, f.severity)),
                        );
                    }
                    Some(TaskOutcome::Success(Payload::Quality(r))) => {
                        if r.score >= 8.0 {
                            strengths.push("Low structural complexity".to_string());
                        } else {
                            overall -= 0.1;
                            confidence -= 0.05;
                            issues.extend(r.code_smells.iter().take(3).cloned());
                        }
                    }
                    Some(TaskOutcome::Success(Payload::Coverage(r))) => {
                        if r.coverage_percent < 80.0 {
                            overall -= 0.05;
                            recommendations.push(format!(
                                "Add tests; estimated coverage is {:.0}%",
                                r.coverage_percent
                            ));
                        }
                    }
                    Some(TaskOutcome::Success(Payload::Documentation(r))) => {
                        if r.coverage_percent >= 70.0 {
                            strengths.push("Public items are documented".to_string());
                        } else {
                            overall -= 0.05;
                            recommendations.push("Document public functions and types".to_string());
                        }
                    }
                    Some(TaskOutcome::Success(Payload::AiReview(_))) => {}
                }
            }
        }
    }

    AiReviewReport {
        overall_score: overall.clamp(0.0, 1.0),
        confidence: confidence.clamp(0.0, 1.0),
        strengths,
        issues,
        recommendations,
        security_concerns,
    }
}

/// Reviewer that needs no model.
#[derive(Debug, Default)]
pub struct OfflineReviewer;

impl OfflineReviewer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Analyzer for OfflineReviewer {
    fn kind(&self) -> TaskKind {
        TaskKind::AiReview
    }

    async fn analyze(&self, input: &AnalysisInput<'_>) -> Result<Payload, AnalysisError> {
        Ok(Payload::AiReview(review_from_prior(input.file, input.prior)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::security;
    use crate::models::{FailureReason, OutcomeKey};
    use std::collections::BTreeMap;

    const SAMPLE_RESPONSE: &str = "\
OVERALL_SCORE: 0.65
CONFIDENCE: 0.85

STRENGTHS:
• Clear function names
• Small functions

ISSUES:
- Uses eval on user input

RECOMMENDATIONS:
* Validate input before use

REFACTORING_SUGGESTIONS:
• Extract the parser into its own module

SECURITY_CONCERNS:
• None identified
";

    #[test]
    fn test_parse_review() {
        let report = parse_review(SAMPLE_RESPONSE).unwrap();
        assert_eq!(report.overall_score, 0.65);
        assert_eq!(report.confidence, 0.85);
        assert_eq!(report.strengths.len(), 2);
        assert_eq!(report.issues, vec!["Uses eval on user input".to_string()]);
        assert_eq!(report.recommendations.len(), 2);
        assert!(report.security_concerns.is_empty());
    }

    #[test]
    fn test_parse_review_markdown_bold() {
        let report = parse_review("**OVERALL_SCORE:** 0.9\n**CONFIDENCE**: .7\n").unwrap();
        assert_eq!(report.overall_score, 0.9);
        assert_eq!(report.confidence, 0.7);
    }

    #[test]
    fn test_parse_review_missing_confidence_is_malformed() {
        let err = parse_review("OVERALL_SCORE: 0.9\nLooks fine.").unwrap_err();
        assert!(err.contains("CONFIDENCE"));
    }

    #[test]
    fn test_prompt_carries_prior_findings() {
        let file = SourceFile::new("app.py", "eval(x)\n");
        let mut outcomes = BTreeMap::new();
        outcomes.insert(
            OutcomeKey::new(TaskKind::Security, "app.py"),
            TaskOutcome::Success(Payload::Security(security::scan(&file.content))),
        );
        outcomes.insert(
            OutcomeKey::new(TaskKind::Coverage, "app.py"),
            TaskOutcome::failure(FailureReason::Timeout, "slow"),
        );
        let prior = PriorFindings::new(outcomes);

        let prompt = build_prompt(&file, Some(&prior));
        assert!(prompt.contains("Security score: 8.0/10 with 1 finding(s), 1 high severity"));
        assert!(prompt.contains("Test Coverage: not available (timeout)"));
        assert!(prompt.contains("OVERALL_SCORE:"));
    }

    #[test]
    fn test_offline_review_clean_context() {
        let file = SourceFile::new("clean.py", "def add(a, b):\n    return a + b\n");
        let mut outcomes = BTreeMap::new();
        outcomes.insert(
            OutcomeKey::new(TaskKind::Security, "clean.py"),
            TaskOutcome::Success(Payload::Security(security::scan(&file.content))),
        );
        let report = review_from_prior(&file, Some(&PriorFindings::new(outcomes)));

        assert_eq!(report.confidence, 0.9);
        assert!(report.security_concerns.is_empty());
        assert_eq!(report.strengths, vec!["No risky code patterns detected".to_string()]);
    }

    #[test]
    fn test_offline_review_lowers_confidence_on_failures_and_risk() {
        let file = SourceFile::new("app.py", "eval(x)\n");
        let mut outcomes = BTreeMap::new();
        outcomes.insert(
            OutcomeKey::new(TaskKind::Security, "app.py"),
            TaskOutcome::Success(Payload::Security(security::scan(&file.content))),
        );
        outcomes.insert(
            OutcomeKey::new(TaskKind::Quality, "app.py"),
            TaskOutcome::failure(FailureReason::Panic, "boom"),
        );
        let report = review_from_prior(&file, Some(&PriorFindings::new(outcomes)));

        assert!((report.confidence - 0.65).abs() < 1e-9);
        assert!((report.overall_score - 0.6).abs() < 1e-9);
        assert_eq!(report.security_concerns.len(), 1);
        assert_eq!(report.issues.len(), 1);
    }

    #[test]
    fn test_offline_review_without_context() {
        let file = SourceFile::new("a.py", "");
        let report = review_from_prior(&file, None);
        assert!((report.confidence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_ollama_reviewer_builds() {
        let reviewer = OllamaReviewer::new(AiSettings::default()).unwrap();
        assert_eq!(reviewer.kind(), TaskKind::AiReview);
    }
}
