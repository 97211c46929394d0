//! Line-based complexity and maintainability heuristics.

use super::shape::{self, FunctionSpan};
use super::{run_blocking, AnalysisError, AnalysisInput, Analyzer};
use crate::models::{Payload, QualityReport, TaskKind};
use async_trait::async_trait;

/// Deepest control-flow nesting inside a function body.
fn body_nesting(lines: &[&str], span: &FunctionSpan, unit: usize) -> usize {
    let base = shape::indent_width(lines[span.start]);
    lines[span.start + 1..span.end]
        .iter()
        .filter(|l| !l.trim().is_empty() && !l.trim_start().starts_with('}'))
        .map(|l| shape::indent_width(l).saturating_sub(base) / unit)
        .max()
        .unwrap_or(0)
        .saturating_sub(1)
}

fn is_import(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with("import ") || t.starts_with("from ") || t.starts_with("use ") || t.starts_with("#include")
}

/// Score a file from 10 down, one deduction per smell.
pub fn assess(content: &str) -> QualityReport {
    let lines: Vec<&str> = content.lines().collect();
    let functions = shape::functions(&lines);
    let unit = shape::indent_unit(&lines);

    let mut score: f64 = 10.0;
    let mut smells = Vec::new();

    for f in &functions {
        let length = f.length();
        if length > 50 {
            score -= 1.0;
            smells.push(format!("Function '{}' is too long ({} lines)", f.name, length));
        } else if length > 30 {
            score -= 0.5;
            smells.push(format!("Function '{}' is getting long ({} lines)", f.name, length));
        }

        if f.params > 7 {
            score -= 0.5;
            smells.push(format!("Function '{}' has too many parameters ({})", f.name, f.params));
        } else if f.params > 5 {
            score -= 0.2;
            smells.push(format!("Function '{}' has many parameters ({})", f.name, f.params));
        }
    }

    let nesting = functions
        .iter()
        .map(|f| body_nesting(&lines, f, unit))
        .max()
        .unwrap_or(0);
    if nesting > 5 {
        score -= 1.0;
        smells.push(format!("Code contains deep nesting (depth {})", nesting));
    } else if nesting > 3 {
        score -= 0.5;
        smells.push(format!("Code contains moderate nesting (depth {})", nesting));
    }

    let imports = lines.iter().filter(|l| is_import(l)).count();
    if imports > 20 {
        score -= 0.5;
        smells.push(format!("File has too many imports ({})", imports));
    }

    let line_count = lines.len();
    if line_count > 500 {
        score -= 1.0;
        smells.push(format!("Module is too large ({} lines)", line_count));
    } else if line_count > 300 {
        score -= 0.5;
        smells.push(format!("Module is getting large ({} lines)", line_count));
    }

    let markers = lines
        .iter()
        .filter(|l| l.contains("TODO") || l.contains("FIXME") || l.contains("XXX"))
        .count();
    if markers > 0 {
        score -= 0.1 * markers.min(5) as f64;
        smells.push(format!("{} unresolved TODO/FIXME marker(s)", markers));
    }

    let score = score.max(0.0);
    let maintainability_index = (100.0
        - (line_count as f64 / 10.0
            + functions.len() as f64 * 2.0
            + nesting as f64 * 5.0
            + (10.0 - score) * 10.0))
        .clamp(0.0, 100.0);

    QualityReport {
        score,
        maintainability_index,
        technical_debt_days: smells.len() as f64 * 0.5,
        code_smells: smells,
    }
}

/// Complexity analyzer producing the quality dimension.
#[derive(Debug, Default)]
pub struct QualityAnalyzer;

impl QualityAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Analyzer for QualityAnalyzer {
    fn kind(&self) -> TaskKind {
        TaskKind::Quality
    }

    async fn analyze(&self, input: &AnalysisInput<'_>) -> Result<Payload, AnalysisError> {
        let content = input.file.content.clone();
        let report = run_blocking(move || assess(&content)).await?;
        Ok(Payload::Quality(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_file_is_clean() {
        let report = assess("def add(a, b):\n    return a + b\n");
        assert_eq!(report.score, 10.0);
        assert!(report.code_smells.is_empty());
        assert_eq!(report.technical_debt_days, 0.0);
        assert!(report.maintainability_index > 90.0);
    }

    #[test]
    fn test_long_function_and_parameters() {
        let mut code = String::from("def process(a, b, c, d, e, f, g, h):\n");
        for i in 0..55 {
            code.push_str(&format!("    x{} = {}\n", i, i));
        }
        let report = assess(&code);

        assert_eq!(report.code_smells.len(), 2);
        assert!(report.code_smells[0].contains("too long"));
        assert!(report.code_smells[1].contains("too many parameters (8)"));
        assert_eq!(report.score, 8.5);
        assert_eq!(report.technical_debt_days, 1.0);
    }

    #[test]
    fn test_nesting_detection() {
        let code = "\
def walk(tree):
    for a in tree:
        for b in a:
            for c in b:
                if c:
                    print(c)
";
        let report = assess(code);
        assert!(report
            .code_smells
            .iter()
            .any(|s| s == "Code contains moderate nesting (depth 4)"));
        assert_eq!(report.score, 9.5);
    }

    #[test]
    fn test_todo_markers() {
        let report = assess("# TODO: remove\nx = 1\n");
        assert_eq!(report.code_smells.len(), 1);
        assert!((report.score - 9.9).abs() < 1e-9);
    }
}
