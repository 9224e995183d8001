//! Fallible value transfers whose result is thrown away.

use tree_sitter::Node;

use crate::analysis::SourceView;

use super::syntax::{call_target, for_each_node, CallTarget};
use super::{Detector, Finding, Severity};

/// A call that moves value and reports failure through its return value.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TransferSignature {
    name: String,
    /// Required last path segment (`call::call`) or receiver prefix
    /// (`RawCall::new().call(..)`).
    qualifier: Option<&'static str>,
    severity: Severity,
}

impl TransferSignature {
    fn plain(name: &str, severity: Severity) -> Self {
        Self {
            name: name.to_string(),
            qualifier: None,
            severity,
        }
    }

    fn qualified(name: &str, qualifier: &'static str, severity: Severity) -> Self {
        Self {
            name: name.to_string(),
            qualifier: Some(qualifier),
            severity,
        }
    }

    fn matches(&self, source: &SourceView<'_>, target: &CallTarget<'_>) -> bool {
        if target.name() != self.name {
            return false;
        }
        match (self.qualifier, target) {
            (None, _) => true,
            (Some(q), CallTarget::Scoped { qualifier, .. }) => *qualifier == q,
            (Some(q), CallTarget::Method { receiver, .. }) => {
                let text = source.node_text(*receiver);
                text.strip_prefix(q).is_some_and(|rest| rest.starts_with("::"))
            }
            (Some(_), CallTarget::Function { .. }) => false,
        }
    }
}

fn default_signatures() -> Vec<TransferSignature> {
    vec![
        TransferSignature::plain("transfer", Severity::High),
        TransferSignature::plain("transfer_from", Severity::High),
        TransferSignature::plain("transferFrom", Severity::High),
        TransferSignature::plain("send", Severity::High),
        TransferSignature::plain("transfer_eth", Severity::High),
        TransferSignature::qualified("call", "call", Severity::Medium),
        TransferSignature::qualified("delegate_call", "call", Severity::Medium),
        TransferSignature::qualified("static_call", "call", Severity::Medium),
        TransferSignature::qualified("call", "RawCall", Severity::Medium),
    ]
}

/// Flags transfer calls used as bare statements or bound to `_`.
///
/// Only a provably discarded result is reported: binding the result to a
/// name, testing it, propagating it with `?`, passing it on, chaining a
/// method, or returning it all count as handling.
#[derive(Debug, Clone)]
pub struct UncheckedTransferDetector {
    signatures: Vec<TransferSignature>,
}

impl Default for UncheckedTransferDetector {
    fn default() -> Self {
        Self {
            signatures: default_signatures(),
        }
    }
}

impl UncheckedTransferDetector {
    pub const NAME: &'static str = "unchecked_transfer";
    pub const DESCRIPTION: &'static str =
        "Value transfers and external calls whose Result is discarded";

    /// Add project-specific transfer call names (reported as High).
    pub fn with_extra_calls(names: &[String]) -> Self {
        let mut detector = Self::default();
        for name in names {
            let signature = TransferSignature::plain(name, Severity::High);
            if !detector.signatures.contains(&signature) {
                detector.signatures.push(signature);
            }
        }
        detector
    }

    fn signature_for(
        &self,
        source: &SourceView<'_>,
        target: &CallTarget<'_>,
    ) -> Option<&TransferSignature> {
        self.signatures.iter().find(|s| s.matches(source, target))
    }
}

/// Whether the value of `call` is dropped on the floor.
fn result_discarded(source: &SourceView<'_>, call: Node) -> bool {
    let Some(parent) = call.parent() else {
        return false;
    };
    match parent.kind() {
        "expression_statement" => true,
        "let_declaration" => {
            let is_value = parent
                .child_by_field_name("value")
                .is_some_and(|v| v.id() == call.id());
            let wildcard = parent
                .child_by_field_name("pattern")
                .is_some_and(|p| source.node_text(p) == "_");
            is_value && wildcard
        }
        _ => false,
    }
}

impl Detector for UncheckedTransferDetector {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        Self::DESCRIPTION
    }

    fn detect(&self, source: &SourceView<'_>) -> anyhow::Result<Vec<Finding>> {
        let mut findings = Vec::new();

        for_each_node(source.root(), |node| {
            if node.kind() != "call_expression" {
                return;
            }
            let Some(target) = call_target(source, node) else {
                return;
            };
            let Some(signature) = self.signature_for(source, &target) else {
                return;
            };
            if !result_discarded(source, node) {
                return;
            }

            findings.push(
                Finding::at_node(
                    Self::NAME,
                    signature.severity,
                    format!(
                        "Result of `{}` is discarded; a failed transfer goes unnoticed",
                        target.name()
                    ),
                    source,
                    node,
                )
                .with_recommendation(
                    "Handle the returned Result: propagate it with `?` or check it explicitly",
                ),
            );
        });

        Ok(findings)
    }
}
