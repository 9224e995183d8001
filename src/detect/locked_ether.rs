//! Contracts that can take value in but never send it out.

use tree_sitter::Node;

use crate::analysis::SourceView;

use super::syntax::{call_target, for_each_node, function_display_name, is_test_code, CallTarget};
use super::{Detector, Finding, Severity};

/// Flags a unit that receives value but has no value-out path.
///
/// Looks at one file at a time; a withdrawal path living in another file
/// is not seen.
#[derive(Debug, Default, Clone, Copy)]
pub struct LockedEtherDetector;

impl LockedEtherDetector {
    pub const NAME: &'static str = "locked_ether";
    pub const DESCRIPTION: &'static str =
        "Payable contracts with no way to transfer value back out";
}

fn is_payable_function(source: &SourceView<'_>, func: Node) -> bool {
    let mut sibling = func.prev_sibling();
    while let Some(s) = sibling {
        match s.kind() {
            "attribute_item" => {
                let attr: String = source
                    .node_text(s)
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect();
                if attr == "#[payable]" {
                    return true;
                }
            }
            "line_comment" | "block_comment" => {}
            _ => return false,
        }
        sibling = s.prev_sibling();
    }
    false
}

/// `msg::value()`, `evm::msg_value()`, `self.vm().msg_value()`.
fn reads_value(target: &CallTarget<'_>) -> bool {
    match target {
        CallTarget::Scoped {
            name: "value",
            qualifier: "msg",
        } => true,
        other => other.name() == "msg_value",
    }
}

/// `transfer_eth(..)`, `Call::new_in(self).value(..)`, `RawCall::new_with_value(..)`.
fn sends_value(target: &CallTarget<'_>) -> bool {
    match target {
        CallTarget::Method { name: "value", .. } => true,
        CallTarget::Scoped {
            name: "new_with_value",
            qualifier: "RawCall",
        } => true,
        other => other.name() == "transfer_eth",
    }
}

impl Detector for LockedEtherDetector {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        Self::DESCRIPTION
    }

    fn detect(&self, source: &SourceView<'_>) -> anyhow::Result<Vec<Finding>> {
        let mut receiving: Option<(Node, String)> = None;
        let mut has_exit = false;

        for_each_node(source.root(), |node| match node.kind() {
            "function_item" if receiving.is_none() => {
                if is_payable_function(source, node) && !is_test_code(source, node) {
                    let site = node.child_by_field_name("name").unwrap_or(node);
                    let what = format!(
                        "payable function `{}`",
                        function_display_name(source, node)
                    );
                    receiving = Some((site, what));
                }
            }
            "call_expression" => {
                let Some(target) = call_target(source, node) else {
                    return;
                };
                if sends_value(&target) {
                    has_exit = true;
                } else if receiving.is_none()
                    && reads_value(&target)
                    && !is_test_code(source, node)
                {
                    receiving = Some((node, format!("`{}`", source.node_text(node))));
                }
            }
            _ => {}
        });

        let Some((site, what)) = receiving else {
            return Ok(Vec::new());
        };
        if has_exit {
            return Ok(Vec::new());
        }

        Ok(vec![Finding::at_node(
            Self::NAME,
            Severity::Medium,
            format!(
                "Contract receives value through {} but has no path that sends value out; funds can be locked",
                what
            ),
            source,
            site,
        )
        .with_recommendation(
            "Add a guarded withdrawal (e.g. transfer_eth to an owner) or stop accepting value",
        )])
    }
}
