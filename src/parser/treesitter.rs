//! Tree-sitter based syntax provider for Stylus contracts.
//!
//! Stylus contracts are ordinary Rust source, so the tree-sitter Rust grammar
//! is used unchanged. The grammar is loaded once and shared; each session owns
//! its own `tree_sitter::Parser`.

use std::time::Duration;

use once_cell::sync::OnceCell;
use tree_sitter::{Language, Node, Parser as TsParser};

use super::{ParseDiagnostic, ParseOutcome, ParseSession, SyntaxProvider};

/// Process-wide provider.
static SHARED_PROVIDER: OnceCell<RustSyntaxProvider> = OnceCell::new();

/// Tree-sitter Rust grammar configuration.
#[derive(Clone)]
pub struct RustSyntaxProvider {
    language: Language,
}

impl RustSyntaxProvider {
    /// Create a new provider.
    pub fn new() -> Self {
        Self {
            language: tree_sitter_rust::LANGUAGE.into(),
        }
    }

    /// Shared provider, initialized on first use.
    pub fn shared() -> &'static RustSyntaxProvider {
        SHARED_PROVIDER.get_or_init(RustSyntaxProvider::new)
    }

    /// Open a concrete session (used directly by tests and benchmarks).
    pub fn open(&self) -> anyhow::Result<TreeSitterSession> {
        let mut parser = TsParser::new();
        parser.set_language(&self.language)?;
        Ok(TreeSitterSession {
            parser,
            timeout: None,
        })
    }
}

impl Default for RustSyntaxProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntaxProvider for RustSyntaxProvider {
    fn language(&self) -> &str {
        "rust"
    }

    fn new_session(&self) -> anyhow::Result<Box<dyn ParseSession>> {
        Ok(Box::new(self.open()?))
    }
}

/// A single tree-sitter parser.
pub struct TreeSitterSession {
    parser: TsParser,
    timeout: Option<Duration>,
}

impl ParseSession for TreeSitterSession {
    fn parse(&mut self, text: &str) -> ParseOutcome {
        let tree = match self.parser.parse(text, None) {
            Some(tree) => tree,
            None => {
                // The next parse must start fresh.
                self.parser.reset();
                let diagnostic = match self.timeout {
                    Some(limit) => ParseDiagnostic::timed_out(limit),
                    None => ParseDiagnostic::no_tree("parse cancelled"),
                };
                return ParseOutcome::failed(diagnostic);
            }
        };

        let root = tree.root_node();
        if !root.has_error() {
            return ParseOutcome::parsed(tree);
        }

        let diagnostic = match first_error_node(root) {
            Some(node) => describe_error(node),
            None => ParseDiagnostic {
                message: "syntax error".to_string(),
                line: Some(1),
                column: Some(1),
                timed_out: false,
            },
        };
        ParseOutcome::partial(tree, diagnostic)
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) {
        // tree-sitter reads 0 as "no limit"
        let micros = timeout.map_or(0, |limit| {
            u64::try_from(limit.as_micros()).unwrap_or(u64::MAX).max(1)
        });
        self.parser.set_timeout_micros(micros);
        self.timeout = timeout;
    }
}

/// Find the first ERROR or MISSING node in document order.
fn first_error_node(root: Node) -> Option<Node> {
    if root.is_error() || root.is_missing() {
        return Some(root);
    }

    let mut node = root;
    'descend: loop {
        let children: Vec<Node> = node.children(&mut node.walk()).collect();
        for child in children {
            if child.is_error() || child.is_missing() {
                return Some(child);
            }
            if child.has_error() {
                node = child;
                continue 'descend;
            }
        }
        return None;
    }
}

fn describe_error(node: Node) -> ParseDiagnostic {
    let pos = node.start_position();
    let message = if node.is_missing() {
        format!("missing `{}`", node.kind())
    } else {
        "syntax error".to_string()
    };
    ParseDiagnostic {
        message,
        line: Some(pos.row + 1),
        column: Some(pos.column + 1),
        timed_out: false,
    }
}
