//! Transfers to caller-supplied recipients that are never checked.

use regex::Regex;
use tree_sitter::Node;

use crate::analysis::SourceView;

use super::syntax::{
    call_arguments, call_target, enclosing_function, for_each_node, function_parameters,
    CallTarget,
};
use super::{Detector, Finding, Severity};

const TRANSFER_NAMES: &[&str] = &[
    "transfer",
    "transfer_from",
    "transferFrom",
    "transfer_eth",
    "send",
];

const VALIDATION_NAMES: &[&str] = &[
    "assert",
    "assert_eq",
    "assert_ne",
    "debug_assert",
    "require",
    "ensure",
];

/// Flags transfers whose recipient is an unvalidated function parameter.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsafeTransferDetector;

impl UnsafeTransferDetector {
    pub const NAME: &'static str = "unsafe_transfer";
    pub const DESCRIPTION: &'static str =
        "Transfers to a parameter-supplied recipient that is never validated";
}

/// `self`, `&mut *self`, `Call::new_in(self)` and similar call contexts.
fn is_context_argument(source: &SourceView<'_>, arg: Node) -> bool {
    let text = source.node_text(arg);
    let bare = text
        .trim_start_matches('&')
        .trim_start_matches("mut ")
        .trim_start_matches('*');
    bare == "self" || text.starts_with("Call::") || text.contains("::Call::")
}

/// The identifier naming the recipient, if the call has a simple one.
fn recipient<'a>(source: &SourceView<'a>, call: Node<'a>, name: &str) -> Option<Node<'a>> {
    let args: Vec<_> = call_arguments(call)
        .into_iter()
        .skip_while(|a| is_context_argument(source, *a))
        .collect();
    let index = if name == "transfer_from" || name == "transferFrom" {
        1
    } else {
        0
    };
    let mut arg = *args.get(index)?;
    if arg.kind() == "reference_expression" {
        arg = arg.child_by_field_name("value")?;
    }
    (arg.kind() == "identifier").then_some(arg)
}

/// Whether `func` mentions `name` in an assertion or a branch condition.
fn is_validated(source: &SourceView<'_>, func: Node, name: &str) -> anyhow::Result<bool> {
    let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(name)))?;
    let Some(body) = func.child_by_field_name("body") else {
        return Ok(false);
    };

    let mut validated = false;
    for_each_node(body, |node| {
        if validated {
            return;
        }
        let checked = match node.kind() {
            "macro_invocation" => node
                .child_by_field_name("macro")
                .map(|m| source.node_text(m))
                .filter(|m| VALIDATION_NAMES.contains(m))
                .map(|_| source.node_text(node)),
            "call_expression" => match call_target(source, node) {
                Some(CallTarget::Function { name }) | Some(CallTarget::Scoped { name, .. })
                    if VALIDATION_NAMES.contains(&name) =>
                {
                    node.child_by_field_name("arguments")
                        .map(|a| source.node_text(a))
                }
                _ => None,
            },
            "if_expression" | "while_expression" => node
                .child_by_field_name("condition")
                .map(|c| source.node_text(c)),
            _ => None,
        };
        if checked.is_some_and(|text| pattern.is_match(text)) {
            validated = true;
        }
    });
    Ok(validated)
}

impl Detector for UnsafeTransferDetector {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        Self::DESCRIPTION
    }

    fn detect(&self, source: &SourceView<'_>) -> anyhow::Result<Vec<Finding>> {
        let mut sites = Vec::new();
        for_each_node(source.root(), |node| {
            if node.kind() != "call_expression" {
                return;
            }
            if let Some(target) = call_target(source, node) {
                if TRANSFER_NAMES.contains(&target.name()) {
                    sites.push((node, target.name()));
                }
            }
        });

        let mut findings = Vec::new();
        for (call, name) in sites {
            let Some(func) = enclosing_function(call) else {
                continue;
            };
            let Some(to) = recipient(source, call, name) else {
                continue;
            };
            let to = source.node_text(to);
            let is_parameter = function_parameters(source, func)
                .iter()
                .any(|(param, _)| *param == to);
            if !is_parameter || is_validated(source, func, to)? {
                continue;
            }

            findings.push(
                Finding::at_node(
                    Self::NAME,
                    Severity::Medium,
                    format!(
                        "Recipient `{}` of `{}` is a caller-supplied parameter that is never validated",
                        to, name
                    ),
                    source,
                    call,
                )
                .with_recommendation(
                    "Check the recipient before transferring (e.g. reject the zero address or unauthorized accounts)",
                ),
            );
        }

        Ok(findings)
    }
}
