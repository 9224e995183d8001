//! Syntactic size classification for packed-encoding arguments.
//!
//! No type inference happens here: an argument is classified from its
//! literal shape, a known conversion, or a type written next to its
//! declaration. Anything else is `Unknown`.

use std::collections::HashMap;

use tree_sitter::Node;

use crate::analysis::SourceView;

use super::syntax::{
    call_target, enclosing_function, for_each_node, function_parameters, let_binding_name,
    named_elements, CallTarget,
};

/// Resolution depth for `let a = b; let b = c; ...` chains.
const MAX_RESOLVE_DEPTH: usize = 8;

const VARIABLE_TYPES: &[&str] = &["String", "str", "Vec", "Bytes", "SOLString", "SOLBytes"];

const FIXED_TYPES: &[&str] = &[
    "bool", "u8", "u16", "u32", "u64", "u128", "usize", "i8", "i16", "i32", "i64", "i128",
    "isize", "Address", "SOLAddress", "SOLBool", "U8", "U16", "U32", "U64", "U128", "U160",
    "U256", "I8", "I16", "I32", "I64", "I128", "I256", "Uint", "Int", "Signed", "FixedBytes",
    "B64", "B128", "B160", "B256", "B512", "Selector",
];

/// Conversions that always yield a dynamically sized value.
const VARIABLE_METHODS: &[&str] = &["as_bytes", "to_vec", "to_string", "into_bytes"];

/// Conversions that always yield a fixed-size value.
const FIXED_METHODS: &[&str] = &["to_be_bytes", "to_le_bytes", "to_ne_bytes", "len"];

/// Conversions that keep the receiver's size class.
const TRANSPARENT_METHODS: &[&str] = &["as_slice", "as_ref", "clone", "to_owned", "into"];

const VARIABLE_MACROS: &[&str] = &["format", "vec"];

/// Size class of one encoded argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgClass {
    Fixed,
    Variable,
    Unknown,
}

/// Classifies encode arguments. Swap implementations to change which types
/// count as dynamically sized.
pub trait ArgumentClassifier: Send + Sync {
    /// Classify a type as written in source, e.g. `String` or `[u8; 32]`.
    fn classify_type(&self, ty: &str) -> ArgClass;

    /// Classify an argument expression, resolving names through `scope`.
    fn classify_expr<'a>(
        &self,
        source: &SourceView<'a>,
        expr: Node<'a>,
        scope: &Scope<'a>,
    ) -> ArgClass;
}

/// A name's declaration: annotated type and/or initialiser.
#[derive(Debug, Clone, Copy, Default)]
pub struct Binding<'a> {
    pub ty: Option<Node<'a>>,
    pub init: Option<Node<'a>>,
}

/// Names visible at a call site, as far as syntax can tell.
#[derive(Debug, Clone, Default)]
pub struct Scope<'a> {
    bindings: HashMap<&'a str, Binding<'a>>,
    aliases: HashMap<&'a str, Node<'a>>,
}

impl<'a> Scope<'a> {
    /// Constants, statics and type aliases declared outside any function.
    pub fn file(source: &SourceView<'a>) -> Self {
        let mut scope = Scope::default();
        for_each_node(source.root(), |node| {
            if enclosing_function(node).is_none() {
                scope.add_item(source, node);
            }
        });
        scope
    }

    /// Extend with the parameters of the function around `site`, the items
    /// declared in its body, and the `let` bindings that precede the site.
    /// Later bindings shadow earlier ones.
    pub fn at(&self, source: &SourceView<'a>, site: Node<'a>) -> Self {
        let mut scope = self.clone();
        let Some(func) = enclosing_function(site) else {
            return scope;
        };
        for (name, ty) in function_parameters(source, func) {
            scope.bindings.insert(name, Binding { ty, init: None });
        }
        let Some(body) = func.child_by_field_name("body") else {
            return scope;
        };
        for_each_node(body, |node| {
            // items of nested functions stay with them
            if enclosing_function(node).map(|f| f.id()) != Some(func.id()) {
                return;
            }
            scope.add_item(source, node);
            if node.kind() != "let_declaration" || node.start_byte() >= site.start_byte() {
                return;
            }
            if let Some(name) = let_binding_name(source, node) {
                scope.bindings.insert(
                    name,
                    Binding {
                        ty: node.child_by_field_name("type"),
                        init: node.child_by_field_name("value"),
                    },
                );
            }
        });
        scope
    }

    fn add_item(&mut self, source: &SourceView<'a>, node: Node<'a>) {
        match node.kind() {
            "const_item" | "static_item" => {
                if let Some(name) = node.child_by_field_name("name") {
                    self.bindings.insert(
                        source.node_text(name),
                        Binding {
                            ty: node.child_by_field_name("type"),
                            init: node.child_by_field_name("value"),
                        },
                    );
                }
            }
            "type_item" => {
                if let (Some(name), Some(ty)) = (
                    node.child_by_field_name("name"),
                    node.child_by_field_name("type"),
                ) {
                    self.aliases.insert(source.node_text(name), ty);
                }
            }
            _ => {}
        }
    }

    pub fn binding(&self, name: &str) -> Option<Binding<'a>> {
        self.bindings.get(name).copied()
    }

    /// The aliased type node for `type Name = ..;`.
    pub fn alias(&self, name: &str) -> Option<Node<'a>> {
        self.aliases.get(name).copied()
    }
}

/// Built-in classifier with configurable extra type names.
///
/// Configured names take precedence over the built-in lists.
#[derive(Debug, Clone, Default)]
pub struct DefaultClassifier {
    variable_types: Vec<String>,
    fixed_types: Vec<String>,
}

impl DefaultClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_types(variable_types: Vec<String>, fixed_types: Vec<String>) -> Self {
        Self {
            variable_types,
            fixed_types,
        }
    }

    fn classify_at_depth<'a>(
        &self,
        source: &SourceView<'a>,
        expr: Node<'a>,
        scope: &Scope<'a>,
        depth: usize,
    ) -> ArgClass {
        if depth > MAX_RESOLVE_DEPTH {
            return ArgClass::Unknown;
        }
        let next = |node: Node<'a>| self.classify_at_depth(source, node, scope, depth + 1);

        match expr.kind() {
            "string_literal" | "raw_string_literal" | "integer_literal" | "float_literal"
            | "boolean_literal" | "char_literal" => ArgClass::Fixed,
            "reference_expression" | "parenthesized_expression" => {
                match expr.child_by_field_name("value").or_else(|| named_elements(expr).pop()) {
                    Some(inner) => next(inner),
                    None => ArgClass::Unknown,
                }
            }
            "array_expression" => {
                if expr.child_by_field_name("length").is_some() {
                    return ArgClass::Fixed;
                }
                combine(named_elements(expr).into_iter().map(next))
            }
            "type_cast_expression" => match expr.child_by_field_name("type") {
                Some(ty) => self.classify_type_node(source, ty, scope),
                None => ArgClass::Unknown,
            },
            "scoped_identifier" => match expr.child_by_field_name("path") {
                // `U256::ZERO`, `Address::ZERO`
                Some(path) => self.classify_type(source.node_text(path)),
                None => ArgClass::Unknown,
            },
            "identifier" => match scope.binding(source.node_text(expr)) {
                Some(Binding { ty: Some(ty), .. }) => self.classify_type_node(source, ty, scope),
                Some(Binding {
                    ty: None,
                    init: Some(init),
                }) => next(init),
                _ => ArgClass::Unknown,
            },
            "macro_invocation" => {
                let name = expr
                    .child_by_field_name("macro")
                    .map(|m| source.node_text(m))
                    .unwrap_or("");
                if VARIABLE_MACROS.contains(&name) {
                    ArgClass::Variable
                } else {
                    ArgClass::Unknown
                }
            }
            "call_expression" => match call_target(source, expr) {
                Some(CallTarget::Method { name, receiver }) => {
                    if VARIABLE_METHODS.contains(&name) {
                        ArgClass::Variable
                    } else if FIXED_METHODS.contains(&name) {
                        ArgClass::Fixed
                    } else if TRANSPARENT_METHODS.contains(&name) {
                        next(receiver)
                    } else {
                        ArgClass::Unknown
                    }
                }
                // `String::from(..)`, `U256::from(..)`
                Some(CallTarget::Scoped { qualifier, .. }) => self.classify_type(qualifier),
                _ => ArgClass::Unknown,
            },
            _ => ArgClass::Unknown,
        }
    }

    /// Classify a type node, looking through local aliases.
    fn classify_type_node<'a>(
        &self,
        source: &SourceView<'a>,
        ty: Node<'a>,
        scope: &Scope<'a>,
    ) -> ArgClass {
        let text = source.node_text(ty);
        if let Some(aliased) = scope.alias(text.trim()) {
            return self.classify_type(source.node_text(aliased));
        }
        self.classify_type(text)
    }

    fn named(&self, base: &str) -> ArgClass {
        if self.variable_types.iter().any(|t| t == base) {
            ArgClass::Variable
        } else if self.fixed_types.iter().any(|t| t == base) {
            ArgClass::Fixed
        } else if VARIABLE_TYPES.contains(&base) {
            ArgClass::Variable
        } else if FIXED_TYPES.contains(&base) {
            ArgClass::Fixed
        } else {
            ArgClass::Unknown
        }
    }
}

impl ArgumentClassifier for DefaultClassifier {
    fn classify_type(&self, ty: &str) -> ArgClass {
        let ty = strip_reference(ty);
        if ty.starts_with('[') {
            // `[T; N]` is fixed, `[T]` is a slice.
            return if ty.contains(';') {
                ArgClass::Fixed
            } else {
                ArgClass::Variable
            };
        }
        if ty.starts_with('(') {
            return ArgClass::Unknown;
        }
        let base = ty.split('<').next().unwrap_or(ty);
        let base = base.rsplit("::").next().unwrap_or(base).trim();
        self.named(base)
    }

    fn classify_expr<'a>(
        &self,
        source: &SourceView<'a>,
        expr: Node<'a>,
        scope: &Scope<'a>,
    ) -> ArgClass {
        self.classify_at_depth(source, expr, scope, 0)
    }
}

/// Drop `&`, `&mut` and lifetimes from a written type.
fn strip_reference(ty: &str) -> &str {
    let mut ty = ty.trim();
    while let Some(rest) = ty.strip_prefix('&') {
        ty = rest.trim_start();
        if let Some(rest) = ty.strip_prefix('\'') {
            ty = rest
                .split_once(char::is_whitespace)
                .map(|(_, t)| t)
                .unwrap_or("")
                .trim_start();
        }
        if let Some(rest) = ty.strip_prefix("mut ") {
            ty = rest.trim_start();
        }
    }
    ty
}

/// Variable if any element is, Unknown if any element is, else Fixed.
fn combine(classes: impl Iterator<Item = ArgClass>) -> ArgClass {
    let mut out = ArgClass::Fixed;
    for class in classes {
        match class {
            ArgClass::Unknown => return ArgClass::Unknown,
            ArgClass::Variable => out = ArgClass::Variable,
            ArgClass::Fixed => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::syntax::call_arguments;
    use crate::parser::{ParseSession, RustSyntaxProvider};

    #[test]
    fn test_classify_type() {
        let c = DefaultClassifier::new();
        assert_eq!(c.classify_type("String"), ArgClass::Variable);
        assert_eq!(c.classify_type("&str"), ArgClass::Variable);
        assert_eq!(c.classify_type("&'a [u8]"), ArgClass::Variable);
        assert_eq!(c.classify_type("&mut Vec<u8>"), ArgClass::Variable);
        assert_eq!(c.classify_type("[u8; 32]"), ArgClass::Fixed);
        assert_eq!(c.classify_type("Uint<256, 4>"), ArgClass::Fixed);
        assert_eq!(c.classify_type("alloy_primitives::Address"), ArgClass::Fixed);
        assert_eq!(c.classify_type("Thing"), ArgClass::Unknown);
    }

    #[test]
    fn test_configured_types_take_precedence() {
        let c = DefaultClassifier::with_types(vec!["Thing".into()], vec!["String".into()]);
        assert_eq!(c.classify_type("Thing"), ArgClass::Variable);
        assert_eq!(c.classify_type("String"), ArgClass::Fixed);
    }

    /// Classify every argument of the last call to `sink(..)` in `text`.
    fn classify_args(text: &str) -> Vec<ArgClass> {
        let mut session = RustSyntaxProvider::new().open().unwrap();
        let tree = session.parse(text).tree.unwrap();
        let view = SourceView::new("sample.rs", text, &tree);
        let mut site = None;
        for_each_node(view.root(), |n| {
            if n.kind() == "call_expression"
                && call_target(&view, n).map(|t| t.name()) == Some("sink")
            {
                site = Some(n);
            }
        });
        let site = site.unwrap();
        let scope = Scope::file(&view).at(&view, site);
        let classifier = DefaultClassifier::new();
        call_arguments(site)
            .into_iter()
            .map(|arg| classifier.classify_expr(&view, arg, &scope))
            .collect()
    }

    #[test]
    fn test_classify_literals_and_conversions() {
        let classes = classify_args(
            r#"fn f(a: String) { sink(1u8, "sep", a.as_bytes(), format!("{}", 1), &[0u8; 4]); }"#,
        );
        assert_eq!(
            classes,
            vec![
                ArgClass::Fixed,
                ArgClass::Fixed,
                ArgClass::Variable,
                ArgClass::Variable,
                ArgClass::Fixed
            ]
        );
    }

    #[test]
    fn test_classify_through_bindings() {
        let text = r#"
const TAG: [u8; 2] = [1, 2];
fn f(name: String, owner: Address, other: Mystery) {
    let delimiter = [0u8];
    let label = name.clone();
    sink(&delimiter, label, owner, TAG, other, undeclared);
}
"#;
        assert_eq!(
            classify_args(text),
            vec![
                ArgClass::Fixed,
                ArgClass::Variable,
                ArgClass::Fixed,
                ArgClass::Fixed,
                ArgClass::Unknown,
                ArgClass::Unknown
            ]
        );
    }

    #[test]
    fn test_later_bindings_are_not_visible() {
        let text = "fn f() { sink(x); let x = String::new(); }";
        assert_eq!(classify_args(text), vec![ArgClass::Unknown]);
    }

    #[test]
    fn test_alias_lookup() {
        let text = "type Name = String;\nfn f(n: Name) { sink(n); }";
        assert_eq!(classify_args(text), vec![ArgClass::Variable]);
    }

    #[test]
    fn test_function_local_aliases_stay_local() {
        let text = r#"
type Name = String;
fn other() {
    type Name = U256;
    type Tag = U256;
}
fn f(n: Name, t: Tag) { sink(n, t); }
"#;
        assert_eq!(classify_args(text), vec![ArgClass::Variable, ArgClass::Unknown]);

        let text = "fn f(v: Name) {\n    type Name = U256;\n    sink(v);\n}";
        assert_eq!(classify_args(text), vec![ArgClass::Fixed]);
    }
}
