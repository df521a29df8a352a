//! Lexical bindings: which names a scope introduces and where a name is bound.

use super::nodes::{self, is_function_kind, node_text};
use tree_sitter::Node;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportKind {
    Named { imported: String },
    Default,
    Namespace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingKind {
    Variable,
    Function,
    Class,
    Parameter,
    Type,
    Import { kind: ImportKind, source: String },
}

/// A name introduced into a scope.
#[derive(Debug, Clone)]
pub struct Binding<'a> {
    pub name: String,
    pub name_node: Node<'a>,
    /// The declaring node: declarator, function, class, parameter or import specifier.
    pub declaration: Node<'a>,
    pub kind: BindingKind,
}

pub fn is_scope_kind(kind: &str) -> bool {
    is_function_kind(kind)
        || matches!(
            kind,
            "program"
                | "statement_block"
                | "for_statement"
                | "for_in_statement"
                | "catch_clause"
                | "switch_case"
                | "switch_default"
                | "class"
        )
}

/// Identifier nodes bound by a destructuring pattern or parameter.
pub fn pattern_names<'a>(pattern: Node<'a>, out: &mut Vec<Node<'a>>) {
    match pattern.kind() {
        "identifier" | "shorthand_property_identifier_pattern" => out.push(pattern),
        "required_parameter" | "optional_parameter" => {
            if let Some(inner) = pattern.child_by_field_name("pattern") {
                pattern_names(inner, out);
            }
        }
        "assignment_pattern" | "object_assignment_pattern" => {
            if let Some(left) = pattern.child_by_field_name("left") {
                pattern_names(left, out);
            }
        }
        "pair_pattern" => {
            if let Some(value) = pattern.child_by_field_name("value") {
                pattern_names(value, out);
            }
        }
        "rest_pattern" | "object_pattern" | "array_pattern" | "formal_parameters" => {
            let mut cursor = pattern.walk();
            for child in pattern.named_children(&mut cursor) {
                pattern_names(child, out);
            }
        }
        _ => {}
    }
}

/// Bindings a scope node introduces directly, in source order.
pub fn scope_bindings<'a>(scope: Node<'a>, source: &str) -> Vec<Binding<'a>> {
    let mut out = Vec::new();
    let kind = scope.kind();
    if is_function_kind(kind) {
        // a named function expression can refer to itself
        if matches!(kind, "function_expression" | "function" | "generator_function") {
            if let Some(name) = scope.child_by_field_name("name") {
                push_binding(&mut out, name, scope, BindingKind::Function, source);
            }
        }
        let params = scope
            .child_by_field_name("parameters")
            .or_else(|| scope.child_by_field_name("parameter"));
        if let Some(params) = params {
            let mut names = Vec::new();
            pattern_names(params, &mut names);
            for name in names {
                let declaration = name.parent().unwrap_or(name);
                push_binding(&mut out, name, declaration, BindingKind::Parameter, source);
            }
        }
        if let Some(body) = scope.child_by_field_name("body") {
            hoisted_var_bindings(body, source, &mut out);
        }
        return out;
    }
    match kind {
        "for_statement" => {
            if let Some(init) = scope.child_by_field_name("initializer") {
                statement_bindings(init, source, &mut out);
            }
        }
        "for_in_statement" => {
            if scope.child_by_field_name("kind").is_some() {
                if let Some(left) = scope.child_by_field_name("left") {
                    let mut names = Vec::new();
                    pattern_names(left, &mut names);
                    for name in names {
                        push_binding(&mut out, name, scope, BindingKind::Variable, source);
                    }
                }
            }
        }
        "catch_clause" => {
            if let Some(param) = scope.child_by_field_name("parameter") {
                let mut names = Vec::new();
                pattern_names(param, &mut names);
                for name in names {
                    push_binding(&mut out, name, scope, BindingKind::Parameter, source);
                }
            }
        }
        "class" => {
            if let Some(name) = scope.child_by_field_name("name") {
                push_binding(&mut out, name, scope, BindingKind::Class, source);
            }
        }
        _ => {
            let mut cursor = scope.walk();
            let children: Vec<Node<'a>> = scope.named_children(&mut cursor).collect();
            for child in &children {
                statement_bindings(*child, source, &mut out);
            }
            if kind == "program" {
                for child in children {
                    if !matches!(child.kind(), "variable_declaration" | "export_statement") {
                        hoisted_var_bindings(child, source, &mut out);
                    }
                }
            }
        }
    }
    out
}

/// `var` bindings anywhere under `root` that belong to the enclosing function or module.
/// Nested functions keep their own.
fn hoisted_var_bindings<'a>(root: Node<'a>, source: &str, out: &mut Vec<Binding<'a>>) {
    nodes::walk_named(root, |node| match node.kind() {
        kind if is_function_kind(kind) => false,
        "variable_declaration" => {
            statement_bindings(node, source, out);
            false
        }
        "for_in_statement" => {
            let is_var = node
                .child_by_field_name("kind")
                .is_some_and(|token| node_text(token, source) == "var");
            if is_var {
                if let Some(left) = node.child_by_field_name("left") {
                    let mut names = Vec::new();
                    pattern_names(left, &mut names);
                    for name in names {
                        push_binding(out, name, node, BindingKind::Variable, source);
                    }
                }
            }
            true
        }
        _ => true,
    });
}

fn statement_bindings<'a>(statement: Node<'a>, source: &str, out: &mut Vec<Binding<'a>>) {
    match statement.kind() {
        "lexical_declaration" | "variable_declaration" => {
            let mut cursor = statement.walk();
            for declarator in statement.named_children(&mut cursor) {
                if declarator.kind() != "variable_declarator" {
                    continue;
                }
                let Some(name) = declarator.child_by_field_name("name") else {
                    continue;
                };
                let mut names = Vec::new();
                pattern_names(name, &mut names);
                let kind = if nodes::declared_function(declarator).is_some() {
                    BindingKind::Function
                } else {
                    BindingKind::Variable
                };
                for item in names {
                    push_binding(out, item, declarator, kind.clone(), source);
                }
            }
        }
        "function_declaration" | "generator_function_declaration" | "function_signature" => {
            if let Some(name) = statement.child_by_field_name("name") {
                push_binding(out, name, statement, BindingKind::Function, source);
            }
        }
        "class_declaration" | "abstract_class_declaration" => {
            if let Some(name) = statement.child_by_field_name("name") {
                push_binding(out, name, statement, BindingKind::Class, source);
            }
        }
        "enum_declaration" | "internal_module" => {
            if let Some(name) = statement.child_by_field_name("name") {
                if name.kind() == "identifier" {
                    push_binding(out, name, statement, BindingKind::Variable, source);
                }
            }
        }
        "interface_declaration" | "type_alias_declaration" => {
            if let Some(name) = statement.child_by_field_name("name") {
                push_binding(out, name, statement, BindingKind::Type, source);
            }
        }
        "import_statement" => out.extend(import_bindings(statement, source)),
        "export_statement" => {
            if let Some(declaration) = statement.child_by_field_name("declaration") {
                statement_bindings(declaration, source, out);
            }
        }
        "ambient_declaration" | "expression_statement" => {
            let mut cursor = statement.walk();
            for child in statement.named_children(&mut cursor) {
                statement_bindings(child, source, out);
            }
        }
        _ => {}
    }
}

/// Local names an import statement introduces.
pub fn import_bindings<'a>(statement: Node<'a>, source: &str) -> Vec<Binding<'a>> {
    let mut out = Vec::new();
    let Some(module) = statement
        .child_by_field_name("source")
        .and_then(|node| nodes::string_literal_value(node, source))
    else {
        return out;
    };
    let mut cursor = statement.walk();
    let clauses: Vec<Node<'a>> = statement
        .named_children(&mut cursor)
        .filter(|child| child.kind() == "import_clause")
        .collect();
    for clause in clauses {
        let mut clause_cursor = clause.walk();
        for item in clause.named_children(&mut clause_cursor) {
            match item.kind() {
                "identifier" => push_binding(
                    &mut out,
                    item,
                    item,
                    BindingKind::Import {
                        kind: ImportKind::Default,
                        source: module.clone(),
                    },
                    source,
                ),
                "namespace_import" => {
                    let mut ns_cursor = item.walk();
                    let name = item
                        .named_children(&mut ns_cursor)
                        .find(|child| child.kind() == "identifier");
                    if let Some(name) = name {
                        push_binding(
                            &mut out,
                            name,
                            item,
                            BindingKind::Import {
                                kind: ImportKind::Namespace,
                                source: module.clone(),
                            },
                            source,
                        );
                    }
                }
                "named_imports" => {
                    let mut spec_cursor = item.walk();
                    for spec in item.named_children(&mut spec_cursor) {
                        if spec.kind() != "import_specifier" {
                            continue;
                        }
                        let Some(imported) = spec.child_by_field_name("name") else {
                            continue;
                        };
                        let local = spec.child_by_field_name("alias").unwrap_or(imported);
                        let imported_name = nodes::string_literal_value(imported, source)
                            .unwrap_or_else(|| node_text(imported, source).to_string());
                        push_binding(
                            &mut out,
                            local,
                            spec,
                            BindingKind::Import {
                                kind: ImportKind::Named {
                                    imported: imported_name,
                                },
                                source: module.clone(),
                            },
                            source,
                        );
                    }
                }
                _ => {}
            }
        }
    }
    out
}

fn push_binding<'a>(
    out: &mut Vec<Binding<'a>>,
    name_node: Node<'a>,
    declaration: Node<'a>,
    kind: BindingKind,
    source: &str,
) {
    out.push(Binding {
        name: node_text(name_node, source).to_string(),
        name_node,
        declaration,
        kind,
    });
}

/// Name nodes a top-level declaration statement introduces, looking through `export`
/// and `declare`.
pub fn declared_names<'a>(statement: Node<'a>, out: &mut Vec<Node<'a>>) {
    match statement.kind() {
        "ambient_declaration" | "export_statement" => {
            let mut cursor = statement.walk();
            for child in statement.named_children(&mut cursor) {
                declared_names(child, out);
            }
        }
        "variable_declaration" | "lexical_declaration" => {
            let mut cursor = statement.walk();
            for declarator in statement.named_children(&mut cursor) {
                if let Some(name) = declarator.child_by_field_name("name") {
                    pattern_names(name, out);
                }
            }
        }
        "function_signature"
        | "function_declaration"
        | "generator_function_declaration"
        | "class_declaration"
        | "abstract_class_declaration"
        | "interface_declaration"
        | "type_alias_declaration"
        | "enum_declaration"
        | "module"
        | "internal_module" => {
            if let Some(name) = statement.child_by_field_name("name") {
                if matches!(name.kind(), "identifier" | "type_identifier") {
                    out.push(name);
                }
            }
        }
        _ => {}
    }
}

/// Resolve `name` as seen from `from` by walking enclosing scopes outward.
///
/// Value bindings win over type-only bindings unless `types` is set.
pub fn lookup<'a>(from: Node<'a>, name: &str, source: &str, types: bool) -> Option<Binding<'a>> {
    let mut current = Some(from);
    while let Some(node) = current {
        if is_scope_kind(node.kind()) {
            let found = scope_bindings(node, source)
                .into_iter()
                .filter(|binding| binding.name == name)
                .find(|binding| types || binding.kind != BindingKind::Type);
            if found.is_some() {
                return found;
            }
        }
        current = node.parent();
    }
    None
}
