use tree_sitter::Node;

pub const FUNCTION_KINDS: &[&str] = &[
    "function_declaration",
    "generator_function_declaration",
    "function_expression",
    "function",
    "generator_function",
    "arrow_function",
    "method_definition",
];

const IDENTIFIER_KINDS: &[&str] = &[
    "identifier",
    "property_identifier",
    "shorthand_property_identifier",
    "shorthand_property_identifier_pattern",
    "type_identifier",
];

pub fn is_function_kind(kind: &str) -> bool {
    FUNCTION_KINDS.contains(&kind)
}

pub fn is_identifier_kind(kind: &str) -> bool {
    IDENTIFIER_KINDS.contains(&kind)
}

pub fn node_text<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    source.get(node.start_byte()..node.end_byte()).unwrap_or("")
}

pub fn call_arguments(node: Node<'_>) -> Vec<Node<'_>> {
    let mut out = Vec::new();
    let Some(args) = node.child_by_field_name("arguments") else {
        return out;
    };
    let mut cursor = args.walk();
    for child in args.named_children(&mut cursor) {
        if child.kind() != "comment" {
            out.push(child);
        }
    }
    out
}

/// `(object, property)` of `a.b` or `a?.b`.
pub fn member_object_and_property<'a>(node: Node<'a>, source: &str) -> Option<(Node<'a>, String)> {
    if node.kind() != "member_expression" && node.kind() != "optional_member_expression" {
        return None;
    }
    let object = node.child_by_field_name("object")?;
    let property = node
        .child_by_field_name("property")
        .map(|prop| node_text(prop, source).to_string())?;
    Some((object, property))
}

/// Strip wrappers that do not change which value an expression denotes.
pub fn unwrap_expression(mut node: Node<'_>) -> Node<'_> {
    loop {
        let inner = match node.kind() {
            "parenthesized_expression" | "await_expression" => node.named_child(0),
            "as_expression" | "satisfies_expression" | "non_null_expression" => {
                node.named_child(0)
            }
            _ => None,
        };
        match inner {
            Some(inner) => node = inner,
            None => return node,
        }
    }
}

/// Contents of a plain string literal. Template strings are handled by callers.
pub fn string_literal_value(node: Node<'_>, source: &str) -> Option<String> {
    if node.kind() != "string" {
        return None;
    }
    let raw = node_text(node, source);
    unquote_string_literal(raw)
}

pub fn unquote_string_literal(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.len() < 2 {
        return None;
    }
    let first = trimmed.chars().next()?;
    if first == '"' || first == '\'' || first == '`' {
        let last = trimmed.chars().last()?;
        if last == first {
            return Some(trimmed[1..trimmed.len() - 1].to_string());
        }
    }
    None
}

/// Name node of a declaration-like node, if it has one.
pub fn declaration_name(node: Node<'_>) -> Option<Node<'_>> {
    node.child_by_field_name("name")
}

/// Value of `const x = <value>` for a declarator.
pub fn declarator_value(node: Node<'_>) -> Option<Node<'_>> {
    if node.kind() != "variable_declarator" {
        return None;
    }
    node.child_by_field_name("value").map(unwrap_expression)
}

/// The function a declaration names, if it names one: `function f`, `const f = () => ..`,
/// a method, or an object property holding a function.
pub fn declared_function(node: Node<'_>) -> Option<Node<'_>> {
    match node.kind() {
        kind if is_function_kind(kind) => Some(node),
        "variable_declarator" => declarator_value(node).filter(|value| is_function_kind(value.kind())),
        "pair" | "public_field_definition" | "field_definition" => node
            .child_by_field_name("value")
            .map(unwrap_expression)
            .filter(|value| is_function_kind(value.kind())),
        "export_statement" => node.child_by_field_name("declaration").and_then(declared_function),
        _ => None,
    }
}

/// Depth-first pre-order walk over named nodes.
pub fn walk_named<'a, F>(root: Node<'a>, mut visit: F)
where
    F: FnMut(Node<'a>) -> bool,
{
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if !visit(node) {
            continue;
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'a>> = node.named_children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::ParsedFile;
    use std::path::Path;
    use std::sync::Arc;

    #[test]
    fn declared_function_sees_arrow_initializers() {
        let parsed = ParsedFile::parse(
            Path::new("a.ts"),
            Arc::from("const f = async (x: number) => x;\nconst n = (1 as number);\n"),
        )
        .unwrap();
        let mut found = Vec::new();
        walk_named(parsed.root(), |node| {
            if node.kind() == "variable_declarator" {
                let name = declaration_name(node).map(|n| parsed.text(n).to_string());
                found.push((name, declared_function(node).is_some()));
            }
            true
        });
        assert_eq!(
            found,
            vec![(Some("f".to_string()), true), (Some("n".to_string()), false)]
        );
    }

    #[test]
    fn unquote_handles_all_quote_styles() {
        assert_eq!(unquote_string_literal("'/users'"), Some("/users".to_string()));
        assert_eq!(unquote_string_literal("\"/a\""), Some("/a".to_string()));
        assert_eq!(unquote_string_literal("`/b`"), Some("/b".to_string()));
        assert_eq!(unquote_string_literal("x"), None);
    }
}
