//! Panicking constructs reachable from contract code.
//!
//! A panic in a Stylus contract aborts the call and reverts with no
//! decodable error, so every reachable site is reported. Guards around the
//! site do not downgrade it.

use std::collections::HashSet;

use once_cell::sync::OnceCell;
use streaming_iterator::StreamingIterator;
use tree_sitter::{Language, Query, QueryCursor};

use crate::analysis::SourceView;

use super::syntax::{enclosing_function, function_display_name, is_test_code};
use super::{Detector, Finding, Severity};

/// Macro invocations and method calls that may terminate.
const TERMINATION_QUERY: &str = r#"
(macro_invocation
  macro: (identifier) @macro_name
) @macro

(macro_invocation
  macro: (scoped_identifier
    name: (identifier) @macro_name
  )
) @macro

(call_expression
  function: (field_expression
    field: (field_identifier) @method_name
  )
) @call
"#;

const PANIC_MACROS: &[&str] = &["panic", "unreachable", "todo", "unimplemented"];

const PANIC_METHODS: &[&str] = &["unwrap", "expect", "unwrap_err", "expect_err"];

static QUERY: OnceCell<Query> = OnceCell::new();

fn termination_query() -> anyhow::Result<&'static Query> {
    QUERY.get_or_try_init(|| {
        let language: Language = tree_sitter_rust::LANGUAGE.into();
        Ok(Query::new(&language, TERMINATION_QUERY)?)
    })
}

/// Flags `panic!`-family macros and `unwrap`/`expect`-family calls.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsafeTerminationDetector;

impl UnsafeTerminationDetector {
    pub const NAME: &'static str = "unsafe_termination";
    pub const DESCRIPTION: &'static str =
        "panic!, unreachable!, todo!, unimplemented!, unwrap and expect in contract code";
}

impl Detector for UnsafeTerminationDetector {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        Self::DESCRIPTION
    }

    fn detect(&self, source: &SourceView<'_>) -> anyhow::Result<Vec<Finding>> {
        let query = termination_query()?;
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(query, source.root(), source.text().as_bytes());

        let mut findings = Vec::new();
        let mut seen = HashSet::new();

        while let Some(m) = matches.next() {
            let mut site = None;
            let mut construct = None;

            for capture in m.captures {
                let capture_name = query.capture_names()[capture.index as usize];
                match capture_name {
                    "macro_name" => {
                        let name = source.node_text(capture.node);
                        if PANIC_MACROS.contains(&name) {
                            construct = Some(format!("{}!", name));
                        }
                    }
                    "method_name" => {
                        let name = source.node_text(capture.node);
                        if PANIC_METHODS.contains(&name) {
                            construct = Some(format!(".{}()", name));
                        }
                    }
                    "macro" | "call" => site = Some(capture.node),
                    _ => {}
                }
            }

            let (Some(node), Some(construct)) = (site, construct) else {
                continue;
            };
            if !seen.insert(node.id()) || is_test_code(source, node) {
                continue;
            }

            let location = match enclosing_function(node) {
                Some(func) => format!("in `{}`", function_display_name(source, func)),
                None => "at module scope".to_string(),
            };

            findings.push(
                Finding::at_node(
                    Self::NAME,
                    Severity::Medium,
                    format!(
                        "`{}` {} can abort execution and revert without a meaningful error",
                        construct, location
                    ),
                    source,
                    node,
                )
                .with_recommendation(
                    "Return a Result with a descriptive error instead of panicking",
                ),
            );
        }

        Ok(findings)
    }
}
