//! Structural test-coverage estimate.
//!
//! No tests are executed. The estimate is derived from the size and shape of
//! the file: test files are assumed well covered, other files lose coverage
//! as their structural complexity grows.

use super::shape;
use super::{AnalysisError, AnalysisInput, Analyzer};
use crate::models::{CoverageReport, Payload, TaskKind};
use async_trait::async_trait;

const TEST_FILE_COVERAGE: f64 = 90.0;
const MAX_LISTED_ITEMS: usize = 10;

/// Estimate coverage for one file.
pub fn estimate(path: &str, content: &str) -> CoverageReport {
    let lines: Vec<&str> = content.lines().collect();
    let functions = shape::functions(&lines);
    let types = shape::type_definitions(&lines);
    let is_test_file = shape::is_test_source(path, content);

    if is_test_file {
        let lower = content.to_lowercase();
        let mut missing = Vec::new();
        if !lower.contains("assert") {
            missing.push("Assertions".to_string());
        }
        if !lower.contains("mock") {
            missing.push("Mock tests".to_string());
        }
        if !functions.iter().any(|f| f.is_test()) && !content.contains("#[test]") {
            missing.push("Proper test functions".to_string());
        }
        return CoverageReport {
            coverage_percent: TEST_FILE_COVERAGE,
            is_test_file,
            untested_items: Vec::new(),
            missing_test_types: missing,
        };
    }

    if functions.is_empty() && types.is_empty() {
        return CoverageReport {
            coverage_percent: 100.0,
            is_test_file,
            untested_items: Vec::new(),
            missing_test_types: Vec::new(),
        };
    }

    let complexity: f64 = functions
        .iter()
        .map(|f| f.params as f64 * 0.2 + f.length() as f64 * 0.05)
        .sum::<f64>()
        + types.len() as f64 * 0.5;
    let coverage_percent = (100.0 - complexity * 5.0).clamp(10.0, 95.0);

    let untested_items = functions
        .iter()
        .filter(|f| !f.name.starts_with('_'))
        .take(MAX_LISTED_ITEMS)
        .map(|f| format!("{} (line {})", f.name, f.start + 1))
        .collect();

    CoverageReport {
        coverage_percent,
        is_test_file,
        untested_items,
        missing_test_types: vec!["Unit tests".to_string(), "Integration tests".to_string()],
    }
}

/// Coverage analyzer.
#[derive(Debug, Default)]
pub struct CoverageEstimator;

impl CoverageEstimator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Analyzer for CoverageEstimator {
    fn kind(&self) -> TaskKind {
        TaskKind::Coverage
    }

    async fn analyze(&self, input: &AnalysisInput<'_>) -> Result<Payload, AnalysisError> {
        Ok(Payload::Coverage(estimate(
            &input.file.path,
            &input.file.content,
        )))
    }
}
