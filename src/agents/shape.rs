//! Line-based structural scan shared by the heuristic analyzers.
//!
//! Recognises function and type definitions in Python, Rust, JavaScript/
//! TypeScript and Go style sources without parsing them.

use regex::Regex;
use std::sync::OnceLock;

/// A function definition and the lines it spans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FunctionSpan {
    pub name: String,
    /// 0-indexed line of the definition.
    pub start: usize,
    /// 0-indexed line one past the body.
    pub end: usize,
    pub params: usize,
}

impl FunctionSpan {
    pub fn length(&self) -> usize {
        self.end - self.start
    }

    pub fn is_test(&self) -> bool {
        self.name.starts_with("test")
    }
}

/// A class/struct/enum/trait definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TypeDef {
    pub name: String,
    pub line: usize,
}

fn function_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:export\s+)?(?:async\s+)?(?:unsafe\s+)?(?:def|fn|function|func)\s+([A-Za-z_][A-Za-z0-9_]*)\s*(?:<[^>]*>)?\s*\(([^)]*)",
        )
        .expect("function pattern is valid")
    })
}

fn type_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:export\s+)?(?:class|struct|enum|trait|interface)\s+([A-Za-z_][A-Za-z0-9_]*)",
        )
        .expect("type pattern is valid")
    })
}

/// Width of leading whitespace, tabs counted as four columns.
pub(crate) fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

/// Smallest indentation step used in the file (2..=8, default 4).
pub(crate) fn indent_unit(lines: &[&str]) -> usize {
    lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| indent_width(l))
        .filter(|w| *w > 0)
        .min()
        .unwrap_or(4)
        .clamp(2, 8)
}

fn count_params(raw: &str) -> usize {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .filter(|p| {
            !matches!(
                p.trim_start_matches('&').trim_start_matches("mut "),
                "self" | "mut self" | "cls"
            ) && !p.starts_with("&'")
        })
        .count()
}

/// Every function definition in the file.
pub(crate) fn functions(lines: &[&str]) -> Vec<FunctionSpan> {
    let pattern = function_pattern();
    let mut spans = Vec::new();

    for (start, line) in lines.iter().enumerate() {
        let Some(caps) = pattern.captures(line) else {
            continue;
        };
        let indent = indent_width(line);
        let mut last_body = start;
        let mut end = None;
        for (offset, next) in lines[start + 1..].iter().enumerate() {
            let idx = start + 1 + offset;
            let trimmed = next.trim();
            if trimmed.is_empty() {
                continue;
            }
            if indent_width(next) > indent {
                last_body = idx;
                continue;
            }
            if trimmed.starts_with('}') || trimmed.starts_with(')') {
                end = Some(idx + 1);
            }
            break;
        }
        let end = end.unwrap_or(last_body + 1);

        spans.push(FunctionSpan {
            name: caps[1].to_string(),
            start,
            end,
            params: count_params(caps.get(2).map_or("", |m| m.as_str())),
        });
    }

    spans
}

/// Every type definition in the file.
pub(crate) fn type_definitions(lines: &[&str]) -> Vec<TypeDef> {
    let pattern = type_pattern();
    lines
        .iter()
        .enumerate()
        .filter_map(|(line, text)| {
            pattern.captures(text).map(|caps| TypeDef {
                name: caps[1].to_string(),
                line,
            })
        })
        .collect()
}

/// Whether the path or content marks this as test code.
pub(crate) fn is_test_source(path: &str, content: &str) -> bool {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path).to_lowercase();
    name.starts_with("test_")
        || name.contains("_test.")
        || name.contains(".test.")
        || name.contains(".spec.")
        || path.split(['/', '\\']).any(|part| part == "tests")
        || content.contains("#[cfg(test)]")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PYTHON: &str = "\
import os

def add(a, b):
    return a + b

class Cart:
    def total(self, items, tax, discount):
        if items:
            for item in items:
                if item:
                    pass
        return 0
";

    const RUST: &str = "\
pub struct Cart {
    items: Vec<u32>,
}

impl Cart {
    pub fn total(&self, tax: f64) -> f64 {
        let mut sum = 0.0;
        sum
    }
}
";

    fn lines(src: &str) -> Vec<&str> {
        src.lines().collect()
    }

    #[test]
    fn test_python_functions() {
        let spans = functions(&lines(PYTHON));
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].name, "add");
        assert_eq!(spans[0].params, 2);
        assert_eq!(spans[0].length(), 2);
        assert_eq!(spans[1].name, "total");
        assert_eq!(spans[1].params, 3);
    }

    #[test]
    fn test_rust_functions_include_closing_brace() {
        let spans = functions(&lines(RUST));
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "total");
        assert_eq!(spans[0].params, 1);
        assert_eq!(spans[0].length(), 4);
    }

    #[test]
    fn test_type_definitions() {
        let py = type_definitions(&lines(PYTHON));
        assert_eq!(py.len(), 1);
        assert_eq!(py[0].name, "Cart");

        let rs = type_definitions(&lines(RUST));
        assert_eq!(rs[0].name, "Cart");
        assert_eq!(rs[0].line, 0);
    }

    #[test]
    fn test_is_test_source() {
        assert!(is_test_source("tests/test_cart.py", ""));
        assert!(is_test_source("src/cart_test.go", ""));
        assert!(is_test_source("src/lib.rs", "#[cfg(test)]\nmod tests {}"));
        assert!(!is_test_source("src/cart.py", "def add(): pass"));
    }
}
