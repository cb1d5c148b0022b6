//! Structural syntax checks for generated code.

use thiserror::Error;
use tree_sitter::{Node, Parser};

/// Why a source file was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxError {
    /// The parser rejected the source at a known position.
    #[error("syntax error in {label} at line {line}, column {column} ({reason}): {snippet}")]
    Invalid {
        label: String,
        line: usize,
        column: usize,
        reason: String,
        snippet: String,
    },
    /// The parser itself could not be set up or gave up.
    #[error("parser unavailable: {0}")]
    Parser(String),
}

/// Abstraction over syntax checkers so tests can swap the grammar out.
pub trait SyntaxValidator {
    /// Check `source`; `label` names it in error messages (e.g. "code", "tests").
    fn validate(&self, label: &str, source: &str) -> Result<(), SyntaxError>;
}

/// Structural pass backed by the tree-sitter Python grammar.
///
/// tree-sitter recovers from a lot that CPython rejects (stray indentation,
/// Python 2 statements), so this only catches gross breakage. Pair it with
/// `io::python_syntax::PythonSyntaxValidator` for a full check.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeSitterValidator;

impl SyntaxValidator for TreeSitterValidator {
    fn validate(&self, label: &str, source: &str) -> Result<(), SyntaxError> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| SyntaxError::Parser(e.to_string()))?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| SyntaxError::Parser("parse returned no tree".to_string()))?;

        let root = tree.root_node();
        if !root.has_error() {
            return Ok(());
        }
        let offending = first_error_node(root).unwrap_or(root);
        let position = offending.start_position();
        let reason = if offending.is_missing() {
            format!("missing {}", offending.kind())
        } else {
            "unexpected token".to_string()
        };
        Err(SyntaxError::Invalid {
            label: label.to_string(),
            line: position.row + 1,
            column: position.column + 1,
            reason,
            snippet: snippet_at(source, position.row),
        })
    }
}

fn first_error_node(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error()
            && let Some(found) = first_error_node(child)
        {
            return Some(found);
        }
    }
    None
}

/// Trimmed source line `row` (0-based), cut at 80 characters.
pub(crate) fn snippet_at(source: &str, row: usize) -> String {
    let line = source.lines().nth(row).unwrap_or_default().trim();
    let mut snippet: String = line.chars().take(80).collect();
    if line.chars().count() > 80 {
        snippet.push_str("...");
    }
    snippet
}
