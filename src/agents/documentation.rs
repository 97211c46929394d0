//! Doc-comment coverage.

use super::shape;
use super::{AnalysisError, AnalysisInput, Analyzer};
use crate::models::{DocumentationReport, Payload, TaskKind};
use async_trait::async_trait;

/// Doc comment markers only; plain `//` and `/* */` comments don't count.
fn is_doc_line(trimmed: &str) -> bool {
    trimmed.starts_with("///")
        || trimmed.starts_with("//!")
        || trimmed.starts_with("/**")
        || trimmed.starts_with("/*!")
        || trimmed.starts_with('*')
}

fn is_docstring_start(trimmed: &str) -> bool {
    ["\"\"\"", "'''", "r\"\"\"", "r'''"]
        .iter()
        .any(|quote| trimmed.starts_with(quote))
}

/// A comment block directly above the definition, ignoring attributes.
fn documented_above(lines: &[&str], line: usize) -> bool {
    for prev in lines[..line].iter().rev() {
        let trimmed = prev.trim();
        if trimmed.starts_with("#[") || trimmed.starts_with('@') {
            continue;
        }
        return is_doc_line(trimmed);
    }
    false
}

/// A docstring as the first statement of the body.
fn documented_below(lines: &[&str], line: usize) -> bool {
    lines[line + 1..]
        .iter()
        .map(|l| l.trim())
        .find(|l| !l.is_empty())
        .is_some_and(is_docstring_start)
}

fn has_module_doc(lines: &[&str]) -> bool {
    lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .find(|l| !l.starts_with("#!") && !l.starts_with("# -*-"))
        .is_some_and(|first| {
            is_docstring_start(first)
                || first.starts_with("//!")
                || first.starts_with("/*!")
                || first.starts_with("/**")
        })
}

/// Measure how many functions and types carry documentation.
///
/// A module-level doc block counts as one documented item when present.
/// Files with nothing to document report 100%.
pub fn measure(content: &str) -> DocumentationReport {
    let lines: Vec<&str> = content.lines().collect();
    let mut total = 0;
    let mut documented = 0;
    let mut missing = Vec::new();

    if has_module_doc(&lines) {
        total += 1;
        documented += 1;
    }

    for t in shape::type_definitions(&lines) {
        total += 1;
        if documented_above(&lines, t.line) || documented_below(&lines, t.line) {
            documented += 1;
        } else {
            missing.push(format!("Type '{}' missing documentation", t.name));
        }
    }

    for f in shape::functions(&lines) {
        if f.name.starts_with("__") && f.name.ends_with("__") {
            continue;
        }
        total += 1;
        if documented_above(&lines, f.start) || documented_below(&lines, f.start) {
            documented += 1;
        } else {
            missing.push(format!("Function '{}' missing documentation", f.name));
        }
    }

    let coverage_percent = if total == 0 {
        100.0
    } else {
        documented as f64 / total as f64 * 100.0
    };

    DocumentationReport {
        coverage_percent,
        total_items: total,
        documented_items: documented,
        missing,
    }
}

/// Documentation analyzer.
#[derive(Debug, Default)]
pub struct DocumentationChecker;

impl DocumentationChecker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Analyzer for DocumentationChecker {
    fn kind(&self) -> TaskKind {
        TaskKind::Documentation
    }

    async fn analyze(&self, input: &AnalysisInput<'_>) -> Result<Payload, AnalysisError> {
        Ok(Payload::Documentation(measure(&input.file.content)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nothing_to_document() {
        let report = measure("X = 1\n");
        assert_eq!(report.coverage_percent, 100.0);
        assert_eq!(report.total_items, 0);
    }

    #[test]
    fn test_python_docstrings() {
        let code = r#""""Cart helpers."""

class Cart:
    """A shopping cart."""

    def __init__(self):
        self.items = []

    def total(self):
        return sum(self.items)
"#;
        let report = measure(code);
        assert_eq!(report.total_items, 3);
        assert_eq!(report.documented_items, 2);
        assert_eq!(report.missing, vec!["Function 'total' missing documentation".to_string()]);
    }

    #[test]
    fn test_rust_doc_comments_with_attributes() {
        let code = "\
//! Cart module.

/// A cart.
#[derive(Debug)]
pub struct Cart;

pub fn total() -> u32 {
    0
}
";
        let report = measure(code);
        assert_eq!(report.total_items, 3);
        assert_eq!(report.documented_items, 2);
        assert!((report.coverage_percent - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_plain_comments_are_not_documentation() {
        let code = "\
// TODO: split this up
fn load() {}

/* scratch */
fn save() {}

/**
 * Stores the cart.
 */
function store() {}
";
        let report = measure(code);
        assert_eq!(report.total_items, 3);
        assert_eq!(report.documented_items, 1);
        assert_eq!(
            report.missing,
            vec![
                "Function 'load' missing documentation".to_string(),
                "Function 'save' missing documentation".to_string(),
            ]
        );
    }
}
