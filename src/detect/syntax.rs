//! Shared tree-sitter helpers for detectors.
//!
//! All helpers are read-only walks over the Rust grammar's node kinds.

use tree_sitter::Node;

use crate::analysis::SourceView;

/// How a call expression names its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallTarget<'a> {
    /// `name(..)`
    Function { name: &'a str },
    /// `path::name(..)`; `qualifier` is the last path segment.
    Scoped { name: &'a str, qualifier: &'a str },
    /// `receiver.name(..)`
    Method { name: &'a str, receiver: Node<'a> },
}

impl<'a> CallTarget<'a> {
    pub fn name(&self) -> &'a str {
        match self {
            CallTarget::Function { name }
            | CallTarget::Scoped { name, .. }
            | CallTarget::Method { name, .. } => name,
        }
    }
}

/// Resolve the callee of a `call_expression`.
pub fn call_target<'a>(source: &SourceView<'a>, call: Node<'a>) -> Option<CallTarget<'a>> {
    if call.kind() != "call_expression" {
        return None;
    }
    let mut function = call.child_by_field_name("function")?;
    // `foo::<T>(..)` wraps the callee in a generic_function.
    if function.kind() == "generic_function" {
        function = function.child_by_field_name("function")?;
    }

    match function.kind() {
        "identifier" => Some(CallTarget::Function {
            name: source.node_text(function),
        }),
        "scoped_identifier" => {
            let name = source.node_text(function.child_by_field_name("name")?);
            let qualifier = function
                .child_by_field_name("path")
                .map(|p| last_path_segment(source.node_text(p)))
                .unwrap_or("");
            Some(CallTarget::Scoped { name, qualifier })
        }
        "field_expression" => {
            let field = function.child_by_field_name("field")?;
            let receiver = function.child_by_field_name("value")?;
            Some(CallTarget::Method {
                name: source.node_text(field),
                receiver,
            })
        }
        _ => None,
    }
}

/// Strip generics and leading segments: `a::b::<T>` -> `b`.
fn last_path_segment(path: &str) -> &str {
    let path = path.split("::<").next().unwrap_or(path);
    path.rsplit("::").next().unwrap_or(path).trim()
}

/// Argument expressions of a call, without punctuation or comments.
pub fn call_arguments(call: Node) -> Vec<Node> {
    let Some(args) = call.child_by_field_name("arguments") else {
        return Vec::new();
    };
    let mut cursor = args.walk();
    args.named_children(&mut cursor)
        .filter(|n| !is_comment(*n))
        .collect()
}

/// Named children excluding comments and attributes.
pub fn named_elements(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|n| !is_comment(*n) && n.kind() != "attribute_item")
        .collect()
}

pub fn is_comment(node: Node) -> bool {
    matches!(node.kind(), "line_comment" | "block_comment")
}

/// Visit every node under `root` (inclusive) in document order.
pub fn for_each_node<'a>(root: Node<'a>, mut visit: impl FnMut(Node<'a>)) {
    let mut cursor = root.walk();
    'walk: loop {
        visit(cursor.node());
        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                continue 'walk;
            }
            if !cursor.goto_parent() {
                break 'walk;
            }
        }
    }
}

/// Nearest enclosing `function_item`.
pub fn enclosing_function(node: Node) -> Option<Node> {
    let mut current = node.parent();
    while let Some(n) = current {
        if n.kind() == "function_item" {
            return Some(n);
        }
        current = n.parent();
    }
    None
}

/// `Type::method` for impl methods, `name` for free functions.
pub fn function_display_name(source: &SourceView<'_>, func: Node) -> String {
    let name = func
        .child_by_field_name("name")
        .map(|n| source.node_text(n))
        .unwrap_or("<anonymous>");

    let impl_type = func
        .parent()
        .filter(|p| p.kind() == "declaration_list")
        .and_then(|p| p.parent())
        .filter(|p| p.kind() == "impl_item")
        .and_then(|p| p.child_by_field_name("type"))
        .map(|t| source.node_text(t));

    match impl_type {
        Some(ty) => format!("{}::{}", ty, name),
        None => name.to_string(),
    }
}

/// Whether `node` sits in a `#[test]` function or a `#[cfg(test)]` module.
pub fn is_test_code(source: &SourceView<'_>, node: Node) -> bool {
    let mut current = Some(node);
    while let Some(n) = current {
        if matches!(n.kind(), "function_item" | "mod_item") && has_test_attribute(source, n) {
            return true;
        }
        current = n.parent();
    }
    false
}

fn has_test_attribute(source: &SourceView<'_>, item: Node) -> bool {
    let mut sibling = item.prev_sibling();
    while let Some(s) = sibling {
        match s.kind() {
            "attribute_item" => {
                let attr: String = source
                    .node_text(s)
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect();
                if attr == "#[test]" || attr == "#[cfg(test)]" || attr.ends_with("::test]") {
                    return true;
                }
            }
            "line_comment" | "block_comment" => {}
            _ => break,
        }
        sibling = s.prev_sibling();
    }
    false
}

/// Parameter names and their type nodes for a function item.
pub fn function_parameters<'a>(
    source: &SourceView<'a>,
    func: Node<'a>,
) -> Vec<(&'a str, Option<Node<'a>>)> {
    let Some(params) = func.child_by_field_name("parameters") else {
        return Vec::new();
    };
    let mut out = Vec::new();
    let mut cursor = params.walk();
    for param in params.named_children(&mut cursor) {
        if param.kind() != "parameter" {
            continue;
        }
        let Some(pattern) = param.child_by_field_name("pattern") else {
            continue;
        };
        // `mut x: T` keeps the identifier under a mut_pattern.
        let ident = if pattern.kind() == "identifier" {
            Some(pattern)
        } else {
            named_elements(pattern)
                .into_iter()
                .find(|n| n.kind() == "identifier")
        };
        if let Some(ident) = ident {
            out.push((source.node_text(ident), param.child_by_field_name("type")));
        }
    }
    out
}

/// The identifier bound by a simple `let` pattern (`x`, `mut x`).
pub fn let_binding_name<'a>(source: &SourceView<'a>, let_decl: Node<'a>) -> Option<&'a str> {
    let pattern = let_decl.child_by_field_name("pattern")?;
    match pattern.kind() {
        "identifier" => Some(source.node_text(pattern)),
        "mut_pattern" => named_elements(pattern)
            .into_iter()
            .find(|n| n.kind() == "identifier")
            .map(|n| source.node_text(n)),
        _ => None,
    }
}
