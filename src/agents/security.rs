//! Pattern-based security scanner.

use super::{run_blocking, AnalysisError, AnalysisInput, Analyzer};
use crate::models::{Payload, SecurityFinding, SecurityReport, Severity, TaskKind};
use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use std::sync::OnceLock;
use tracing::debug;

struct Rule {
    pattern: &'static str,
    severity: Severity,
    description: &'static str,
    advice: Option<&'static str>,
}

const RULES: &[Rule] = &[
    Rule {
        pattern: r"\beval\s*\(",
        severity: Severity::High,
        description: "Use of eval() - code injection risk",
        advice: Some("Replace eval() with a parser for the expected input format"),
    },
    Rule {
        pattern: r"\bexec\s*\(",
        severity: Severity::High,
        description: "Use of exec() - arbitrary code execution",
        advice: Some("Avoid exec(); restructure the code so it is not needed"),
    },
    Rule {
        pattern: r"subprocess.*shell\s*=\s*True",
        severity: Severity::High,
        description: "Shell injection via shell=True",
        advice: Some("Pass argument lists to subprocess and keep shell=False"),
    },
    Rule {
        pattern: r"os\.system\s*\(",
        severity: Severity::High,
        description: "Command injection risk with os.system",
        advice: Some("Use subprocess with an argument list instead of os.system"),
    },
    Rule {
        pattern: r#"\.execute\s*\(\s*["'][^"']*%[sd]?["']?\s*%"#,
        severity: Severity::High,
        description: "SQL built with string formatting",
        advice: Some("Use parameterized queries"),
    },
    Rule {
        pattern: r#"\b(?:password|passwd|api_key|apikey|secret|token)\s*[:=]\s*["'][^"']+["']"#,
        severity: Severity::High,
        description: "Hardcoded credential",
        advice: Some("Load credentials from the environment or a secret manager"),
    },
    Rule {
        pattern: r"pickle\.loads?\s*\(",
        severity: Severity::Medium,
        description: "Unsafe deserialization with pickle",
        advice: Some("Use a data-only format such as JSON for untrusted input"),
    },
    Rule {
        pattern: r"yaml\.load\s*\(",
        severity: Severity::Medium,
        description: "YAML loaded without safe_load",
        advice: Some("Use yaml.safe_load"),
    },
    Rule {
        pattern: r"verify\s*=\s*False",
        severity: Severity::Medium,
        description: "TLS certificate verification disabled",
        advice: None,
    },
    Rule {
        pattern: r"danger_accept_invalid_certs\s*\(\s*true",
        severity: Severity::Medium,
        description: "TLS certificate verification disabled",
        advice: None,
    },
    Rule {
        pattern: r"\bunsafe\s*\{",
        severity: Severity::Medium,
        description: "unsafe block",
        advice: Some("Document the safety invariant of every unsafe block"),
    },
    Rule {
        pattern: r"\binput\s*\(.*\)",
        severity: Severity::Low,
        description: "Unvalidated user input",
        advice: None,
    },
    Rule {
        pattern: r"\brandom\.",
        severity: Severity::Low,
        description: "Non-cryptographic random number generator",
        advice: None,
    },
];

fn compiled_rules() -> &'static [(Regex, &'static Rule)] {
    static COMPILED: OnceLock<Vec<(Regex, &'static Rule)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        RULES
            .iter()
            .map(|rule| {
                let regex = RegexBuilder::new(rule.pattern)
                    .case_insensitive(true)
                    .build()
                    .expect("security rule pattern is valid");
                (regex, rule)
            })
            .collect()
    })
}

fn penalty(severity: Severity) -> f64 {
    match severity {
        Severity::High => 2.0,
        Severity::Medium => 1.0,
        Severity::Low => 0.5,
    }
}

/// Scan source text for risky patterns.
///
/// The score starts at 10 and loses 2/1/0.5 points per HIGH/MEDIUM/LOW
/// finding, floored at 0.
pub fn scan(content: &str) -> SecurityReport {
    let mut findings = Vec::new();
    let mut advice: Vec<String> = Vec::new();

    for (regex, rule) in compiled_rules() {
        for m in regex.find_iter(content) {
            let line = content[..m.start()].matches('\n').count() + 1;
            findings.push(SecurityFinding {
                line,
                severity: rule.severity,
                description: rule.description.to_string(),
                snippet: m.as_str().chars().take(80).collect(),
            });
            if let Some(text) = rule.advice {
                if !advice.iter().any(|a| a == text) {
                    advice.push(text.to_string());
                }
            }
        }
    }

    findings.sort_by_key(|f| (f.line, std::cmp::Reverse(f.severity)));
    let score = findings
        .iter()
        .fold(10.0, |score, f| score - penalty(f.severity))
        .max(0.0);

    let count = |severity: Severity| findings.iter().filter(|f| f.severity == severity).count();
    let mut recommendations = Vec::new();
    if count(Severity::High) > 0 {
        recommendations.push("Address high-severity security vulnerabilities immediately".to_string());
    }
    if count(Severity::Medium) > 0 {
        recommendations.push("Review and fix medium-severity security issues".to_string());
    }
    if findings.is_empty() {
        recommendations.push("No obvious security vulnerabilities detected".to_string());
    }
    recommendations.extend(advice);

    SecurityReport {
        score,
        findings,
        recommendations,
    }
}

/// Regex-driven security analyzer.
#[derive(Debug, Default)]
pub struct SecurityScanner;

impl SecurityScanner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Analyzer for SecurityScanner {
    fn kind(&self) -> TaskKind {
        TaskKind::Security
    }

    async fn analyze(&self, input: &AnalysisInput<'_>) -> Result<Payload, AnalysisError> {
        let content = input.file.content.clone();
        let report = run_blocking(move || scan(&content)).await?;
        debug!(
            "Security scan of {}: score {:.1}, {} finding(s)",
            input.file.path,
            report.score,
            report.findings.len()
        );
        Ok(Payload::Security(report))
    }
}
