//! Packed encodings that can collide.
//!
//! Packed encoding writes dynamic values back to back with no length prefix,
//! so `("ab", "c")` and `("a", "bc")` produce the same bytes. Two variable
//! length operands are enough for a collision unless a constant, non-empty
//! delimiter sits between them. A caller-supplied fixed-size value is not a
//! delimiter: its bytes can absorb a shift between the values around it.

use std::sync::Arc;

use tree_sitter::Node;

use crate::analysis::SourceView;

use super::classify::{ArgClass, ArgumentClassifier, Scope};
use super::syntax::{call_arguments, call_target, for_each_node, named_elements, CallTarget};
use super::{Detector, Finding, Severity};

const ENCODE_NAMES: &[&str] = &["abi_encode_packed", "encode_packed", "encodePacked"];

/// What an encode site packs together.
enum Operands<'a> {
    /// Value expressions, e.g. `[a, b].concat()`.
    Exprs(Vec<Node<'a>>),
    /// Written types, e.g. `<(String, String)>::abi_encode_packed`.
    Types(Vec<Node<'a>>),
}

/// One packed operand as seen by the collision check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// Constant bytes that separate the values around it.
    Separator,
    Value(ArgClass),
}

/// Flags packed encodes and concatenations of adjacent dynamic values.
#[derive(Clone)]
pub struct UnsafeEncodePackedDetector {
    classifier: Arc<dyn ArgumentClassifier>,
}

impl UnsafeEncodePackedDetector {
    pub const NAME: &'static str = "unsafe_encode_packed";
    pub const DESCRIPTION: &'static str =
        "Packed encodings or concatenations of adjacent variable-length values";

    pub fn new(classifier: Arc<dyn ArgumentClassifier>) -> Self {
        Self { classifier }
    }

    /// Work out the operands of an encode or concat site, if `call` is one.
    fn operands<'a>(
        &self,
        source: &SourceView<'a>,
        call: Node<'a>,
        scope: &Scope<'a>,
    ) -> Option<(&'a str, Operands<'a>)> {
        let target = call_target(source, call)?;
        let name = target.name();

        if name == "concat" {
            let CallTarget::Method { receiver, .. } = target else {
                return None;
            };
            let receiver = strip_wrappers(receiver);
            if receiver.kind() == "array_expression"
                && receiver.child_by_field_name("length").is_none()
            {
                return Some((name, Operands::Exprs(named_elements(receiver))));
            }
            return None;
        }

        if !ENCODE_NAMES.contains(&name) {
            return None;
        }

        match target {
            CallTarget::Method { receiver, .. } => {
                expand(source, receiver, scope).map(|ops| (name, ops))
            }
            CallTarget::Scoped { qualifier, .. } => {
                if let Some(types) = qualifier_tuple(call, qualifier, scope) {
                    return Some((name, Operands::Types(types)));
                }
                self.argument_operands(source, call, scope).map(|ops| (name, ops))
            }
            CallTarget::Function { .. } => {
                self.argument_operands(source, call, scope).map(|ops| (name, ops))
            }
        }
    }

    fn argument_operands<'a>(
        &self,
        source: &SourceView<'a>,
        call: Node<'a>,
        scope: &Scope<'a>,
    ) -> Option<Operands<'a>> {
        let args = call_arguments(call);
        match args.as_slice() {
            [] => None,
            [single] => expand(source, *single, scope),
            _ => Some(Operands::Exprs(args)),
        }
    }

    fn classify<'a>(
        &self,
        source: &SourceView<'a>,
        operands: &Operands<'a>,
        scope: &Scope<'a>,
    ) -> Vec<Slot> {
        match operands {
            Operands::Exprs(exprs) => exprs
                .iter()
                .map(|e| {
                    if is_separator(source, *e, scope, 0) {
                        Slot::Separator
                    } else {
                        Slot::Value(self.classifier.classify_expr(source, *e, scope))
                    }
                })
                .collect(),
            Operands::Types(types) => types
                .iter()
                .map(|t| {
                    let text = source.node_text(*t);
                    let text = scope
                        .alias(text.trim())
                        .map(|aliased| source.node_text(aliased))
                        .unwrap_or(text);
                    Slot::Value(self.classifier.classify_type(text))
                })
                .collect(),
        }
    }
}

/// Peel `&x`, `&mut x` and `(x)`.
fn strip_wrappers(mut node: Node) -> Node {
    while matches!(node.kind(), "reference_expression" | "parenthesized_expression") {
        match node
            .child_by_field_name("value")
            .or_else(|| named_elements(node).pop())
        {
            Some(inner) => node = inner,
            None => break,
        }
    }
    node
}

/// Methods that keep a constant receiver constant (`"|".as_bytes()`).
const CONSTANT_PRESERVING_METHODS: &[&str] = &[
    "as_bytes",
    "as_ref",
    "as_slice",
    "to_vec",
    "to_owned",
    "to_string",
    "into",
    "clone",
    "to_be_bytes",
    "to_le_bytes",
];

const MAX_SEPARATOR_DEPTH: usize = 8;

/// Whether `expr` always contributes the same, non-empty bytes: a non-empty
/// literal, a literal array, a `[x; N]` repeat, a constant, or a `let`
/// initialised with one of those. Parameters never qualify.
fn is_separator<'a>(
    source: &SourceView<'a>,
    expr: Node<'a>,
    scope: &Scope<'a>,
    depth: usize,
) -> bool {
    if depth > MAX_SEPARATOR_DEPTH {
        return false;
    }
    let expr = strip_wrappers(expr);
    match expr.kind() {
        // `""` has no content child
        "string_literal" | "raw_string_literal" => expr.named_child_count() > 0,
        "integer_literal" | "float_literal" | "char_literal" | "boolean_literal" => true,
        "array_expression" => match expr.child_by_field_name("length") {
            Some(length) => source.node_text(length).trim() != "0",
            None => {
                let elements = named_elements(expr);
                !elements.is_empty()
                    && elements
                        .into_iter()
                        .all(|e| is_separator(source, e, scope, depth + 1))
            }
        },
        // `Self::SEPARATOR`, `consts::DELIMITER`
        "scoped_identifier" => expr
            .child_by_field_name("name")
            .map(|name| source.node_text(name))
            .is_some_and(is_constant_name),
        "identifier" => {
            let name = source.node_text(expr);
            match scope.binding(name).and_then(|b| b.init) {
                Some(init) => is_separator(source, init, scope, depth + 1),
                None => false,
            }
        }
        "call_expression" => match call_target(source, expr) {
            Some(CallTarget::Method { name, receiver })
                if CONSTANT_PRESERVING_METHODS.contains(&name) =>
            {
                is_separator(source, receiver, scope, depth + 1)
            }
            _ => false,
        },
        _ => false,
    }
}

fn is_constant_name(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_uppercase())
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Elements of a tuple or array operand, looking through one `let`.
fn expand<'a>(source: &SourceView<'a>, expr: Node<'a>, scope: &Scope<'a>) -> Option<Operands<'a>> {
    let expr = strip_wrappers(expr);
    match expr.kind() {
        "tuple_expression" => Some(Operands::Exprs(named_elements(expr))),
        "array_expression" if expr.child_by_field_name("length").is_none() => {
            Some(Operands::Exprs(named_elements(expr)))
        }
        "identifier" => {
            let binding = scope.binding(source.node_text(expr))?;
            if let Some(ty) = binding.ty.filter(|t| t.kind() == "tuple_type") {
                return Some(Operands::Types(named_elements(ty)));
            }
            let init = strip_wrappers(binding.init?);
            match init.kind() {
                "tuple_expression" | "array_expression" => expand(source, init, scope),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Element types of the tuple an encode path is qualified with:
/// `Alias::abi_encode_packed` or `<(A, B) as SolType>::abi_encode_packed`.
fn qualifier_tuple<'a>(
    call: Node<'a>,
    qualifier: &str,
    scope: &Scope<'a>,
) -> Option<Vec<Node<'a>>> {
    let path = call
        .child_by_field_name("function")
        .and_then(|f| f.child_by_field_name("path"))?;

    let mut inline = None;
    for_each_node(path, |n| {
        if inline.is_none() && n.kind() == "tuple_type" {
            inline = Some(n);
        }
    });

    let tuple = inline.or_else(|| {
        scope
            .alias(qualifier)
            .filter(|aliased| aliased.kind() == "tuple_type")
    })?;
    Some(named_elements(tuple))
}

/// Two variable-length operands with no separator between them. Fixed-size
/// values in between do not count.
fn has_unseparated_variables(slots: &[Slot]) -> bool {
    let mut pending_variable = false;
    for slot in slots {
        match slot {
            Slot::Separator => pending_variable = false,
            Slot::Value(ArgClass::Variable) => {
                if pending_variable {
                    return true;
                }
                pending_variable = true;
            }
            Slot::Value(_) => {}
        }
    }
    false
}

impl Detector for UnsafeEncodePackedDetector {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        Self::DESCRIPTION
    }

    fn detect(&self, source: &SourceView<'_>) -> anyhow::Result<Vec<Finding>> {
        let file_scope = Scope::file(source);
        let mut findings = Vec::new();

        for_each_node(source.root(), |node| {
            if node.kind() != "call_expression" {
                return;
            }
            let name = match call_target(source, node) {
                Some(target) => target.name(),
                None => return,
            };
            if name != "concat" && !ENCODE_NAMES.contains(&name) {
                return;
            }

            let scope = file_scope.at(source, node);
            let Some((name, operands)) = self.operands(source, node, &scope) else {
                return;
            };
            let slots = self.classify(source, &operands, &scope);

            // Precision: one unresolved operand is enough to stay quiet.
            if slots.contains(&Slot::Value(ArgClass::Unknown))
                || !has_unseparated_variables(&slots)
            {
                return;
            }

            let variable = slots
                .iter()
                .filter(|s| **s == Slot::Value(ArgClass::Variable))
                .count();
            findings.push(
                Finding::at_node(
                    Self::NAME,
                    Severity::Medium,
                    format!(
                        "`{}` packs {} variable-length values with no delimiter between them; different inputs can encode to the same bytes",
                        name, variable
                    ),
                    source,
                    node,
                )
                .with_recommendation(
                    "Use the standard (length-prefixed) encoding, or put a fixed-size separator between dynamic values",
                ),
            );
        });

        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::classify::DefaultClassifier;
    use crate::parser::{ParseSession, RustSyntaxProvider};

    fn run_with(classifier: DefaultClassifier, text: &str) -> Vec<Finding> {
        let mut session = RustSyntaxProvider::new().open().unwrap();
        let tree = session.parse(text).tree.unwrap();
        let view = SourceView::new("contract.rs", text, &tree);
        UnsafeEncodePackedDetector::new(Arc::new(classifier))
            .detect(&view)
            .unwrap()
    }

    fn run(text: &str) -> Vec<Finding> {
        run_with(DefaultClassifier::new(), text)
    }

    #[test]
    fn test_concat_of_strings_flagged() {
        let text = r#"
fn key(a: String, b: String) -> Vec<u8> {
    [a.as_bytes(), b.as_bytes()].concat()
}
"#;
        let findings = run(text);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].start_line(), 3);
        assert!(findings[0].message().contains("packs 2 variable-length values"));
    }

    #[test]
    fn test_delimiter_suppresses() {
        let text = r#"
fn key(a: String, b: String) -> Vec<u8> {
    let delimiter = [0u8];
    [a.as_bytes(), &delimiter, b.as_bytes()].concat()
}
"#;
        assert!(run(text).is_empty());
    }

    #[test]
    fn test_alias_tuple() {
        let text = r#"
type PackedType = (SOLString, SOLString);
type SafeType = (SOLAddress, Uint<256>);

fn unsafe_pack(values: (String, String)) -> Vec<u8> {
    PackedType::abi_encode_packed(&values)
}

fn safe_pack(values: (Address, U256)) -> Vec<u8> {
    SafeType::abi_encode_packed(&values)
}
"#;
        let findings = run(text);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].start_line(), 6);
    }

    #[test]
    fn test_function_local_alias_tuple() {
        let text = r#"
fn unsafe_pack(values: (String, String)) -> Vec<u8> {
    type Pair = (SOLString, SOLString);
    Pair::abi_encode_packed(&values)
}

fn safe_pack(values: (Address, U256)) -> Vec<u8> {
    type Pair = (SOLAddress, Uint<256>);
    Pair::abi_encode_packed(&values)
}
"#;
        let findings = run(text);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].start_line(), 4);
    }

    #[test]
    fn test_inline_tuple_qualifier() {
        let text = r#"
fn pack(v: (String, String)) -> Vec<u8> {
    <(SOLString, SOLString) as SolType>::abi_encode_packed(&v)
}
"#;
        assert_eq!(run(text).len(), 1);
    }

    #[test]
    fn test_fixed_and_variable_not_flagged() {
        let text = r#"
fn pack(owner: Address, name: String) -> Vec<u8> {
    (owner, name).abi_encode_packed()
}
"#;
        assert!(run(text).is_empty());
    }

    #[test]
    fn test_unknown_operand_suppresses() {
        let text = r#"
fn pack(a: String, b: String) -> Vec<u8> {
    encode_packed(a, b, self.mystery())
}

fn pack_more(a: String, b: String) -> Vec<u8> {
    [a.as_bytes(), b.as_bytes(), lookup()].concat()
}
"#;
        assert!(run(text).is_empty());
    }

    #[test]
    fn test_separated_variables_not_flagged() {
        let text = r#"
fn pack(a: String, b: String) -> Vec<u8> {
    encode_packed(a, 7u8, b)
}
"#;
        assert!(run(text).is_empty());
    }

    #[test]
    fn test_fixed_parameter_is_not_a_delimiter() {
        // ("A", 0x42.., "C") and ("AB", 0x43.., "") can pack to the same bytes
        let text = r#"
fn pack(a: String, owner: Address, b: String) -> Vec<u8> {
    encode_packed(a, owner, b)
}
"#;
        let findings = run(text);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message().contains("packs 2 variable-length values"));
    }

    #[test]
    fn test_empty_literal_is_not_a_delimiter() {
        let text = r#"
fn pack(a: String, b: String) -> Vec<u8> {
    encode_packed(a, "", b)
}

fn concat(a: String, b: String) -> Vec<u8> {
    [a.as_bytes(), &[], b.as_bytes()].concat()
}
"#;
        assert_eq!(run(text).len(), 2);
    }

    #[test]
    fn test_constant_delimiters() {
        let text = r#"
const SEPARATOR: &[u8] = b"|";

fn with_const(a: String, b: String) -> Vec<u8> {
    [a.as_bytes(), SEPARATOR, b.as_bytes()].concat()
}

fn with_literal_bytes(a: String, b: String) -> Vec<u8> {
    [a.as_bytes(), "-".as_bytes(), b.as_bytes()].concat()
}

fn with_repeat(a: String, b: String) -> Vec<u8> {
    [a.as_bytes(), &[0u8; 4], b.as_bytes()].concat()
}

fn with_associated(a: String, b: String) -> Vec<u8> {
    encode_packed(a, Self::DELIMITER, b)
}
"#;
        assert!(run(text).is_empty());
    }

    #[test]
    fn test_separator_must_sit_between_variables() {
        let text = r#"
fn pack(a: String, b: String) -> Vec<u8> {
    encode_packed("prefix", a, b)
}
"#;
        assert_eq!(run(text).len(), 1);
    }

    #[test]
    fn test_bound_tuple_operand() {
        let text = r#"
fn pack(a: String, b: Vec<u8>) -> Vec<u8> {
    let parts = (a, b);
    parts.abi_encode_packed()
}
"#;
        assert_eq!(run(text).len(), 1);
    }

    #[test]
    fn test_configured_types() {
        let text = "fn pack(a: Blob, b: Blob) -> Vec<u8> { encode_packed(a, b) }";
        assert!(run(text).is_empty());
        let classifier = DefaultClassifier::with_types(vec!["Blob".into()], Vec::new());
        assert_eq!(run_with(classifier, text).len(), 1);
    }

    #[test]
    fn test_unrelated_concat_ignored() {
        let text = "fn f(parts: Vec<String>) -> String { parts.concat() }";
        assert!(run(text).is_empty());
    }
}
