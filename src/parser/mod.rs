//! Syntax tree provider for contract source text.
//!
//! This module provides:
//! - `SyntaxProvider` trait: immutable grammar configuration that opens sessions
//! - `ParseSession` trait: one live parser, never shared between concurrent callers
//! - `ParseOutcome`: the tree (possibly partial) plus parse status
//!
//! The tree-sitter implementation lives in `treesitter`.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub mod treesitter;

pub use treesitter::{RustSyntaxProvider, TreeSitterSession};

/// Location and description of the first fatal syntax error in a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseDiagnostic {
    /// Human-readable description.
    pub message: String,
    /// Line of the first error (1-indexed), if the parser produced a tree.
    pub line: Option<usize>,
    /// Column of the first error (1-indexed, bytes).
    pub column: Option<usize>,
    /// The parse was abandoned when its time limit ran out.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub timed_out: bool,
}

impl ParseDiagnostic {
    /// Diagnostic for a parse that produced no tree at all.
    pub fn no_tree(reason: &str) -> Self {
        Self {
            message: format!("parser produced no tree: {}", reason),
            line: None,
            column: None,
            timed_out: false,
        }
    }

    /// Diagnostic for a parse abandoned after `limit`.
    pub fn timed_out(limit: Duration) -> Self {
        Self {
            message: format!("parse exceeded {}ms", limit.as_millis()),
            line: None,
            column: None,
            timed_out: true,
        }
    }
}

impl fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(col)) => {
                write!(f, "{} (line {}, column {})", self.message, line, col)
            }
            _ => write!(f, "{}", self.message),
        }
    }
}

/// Result of parsing one unit.
///
/// `success` is true only when the tree is present and error-free. A partial
/// tree from an error-tolerant parse is returned with `success == false`.
pub struct ParseOutcome {
    pub tree: Option<tree_sitter::Tree>,
    pub success: bool,
    pub error: Option<ParseDiagnostic>,
}

impl ParseOutcome {
    /// A clean parse.
    pub fn parsed(tree: tree_sitter::Tree) -> Self {
        Self {
            tree: Some(tree),
            success: true,
            error: None,
        }
    }

    /// A best-effort tree that contains syntax errors.
    pub fn partial(tree: tree_sitter::Tree, error: ParseDiagnostic) -> Self {
        Self {
            tree: Some(tree),
            success: false,
            error: Some(error),
        }
    }

    /// Parsing could not proceed.
    pub fn failed(error: ParseDiagnostic) -> Self {
        Self {
            tree: None,
            success: false,
            error: Some(error),
        }
    }
}

impl fmt::Debug for ParseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseOutcome")
            .field("has_tree", &self.tree.is_some())
            .field("success", &self.success)
            .field("error", &self.error)
            .finish()
    }
}

/// A live parsing session.
///
/// Holds mutable parser state, so one session serves one caller at a time.
/// Parallel analysis opens one session per worker.
pub trait ParseSession: Send {
    /// Parse contract source text. Must not panic on malformed input.
    fn parse(&mut self, text: &str) -> ParseOutcome;

    /// Limit how long each later parse may run. `None` removes the limit.
    /// Sessions that cannot interrupt a parse ignore it.
    fn set_timeout(&mut self, _timeout: Option<Duration>) {}
}

/// Immutable parser configuration shared across a process.
pub trait SyntaxProvider: Send + Sync {
    /// Grammar name (e.g., "rust").
    fn language(&self) -> &str;

    /// Open an independent session.
    fn new_session(&self) -> anyhow::Result<Box<dyn ParseSession>>;
}
