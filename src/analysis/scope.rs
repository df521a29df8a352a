use crate::model::OutOfScopeIdentifier;
use crate::syntax::ParsedFile;
use crate::syntax::nodes::{self, unwrap_expression};
use crate::syntax::scope;
use std::collections::HashSet;
use tree_sitter::Node;

const JSX_TAG_PARENTS: &[&str] = &[
    "jsx_opening_element",
    "jsx_closing_element",
    "jsx_self_closing_element",
];

/// Free variables of a function: names referenced inside it but bound outside it.
pub struct OutOfScopeAnalyzer<'p> {
    parsed: &'p ParsedFile,
}

impl<'p> OutOfScopeAnalyzer<'p> {
    pub fn new(parsed: &'p ParsedFile) -> Self {
        Self { parsed }
    }

    /// One entry per distinct name, at its first occurrence in source order.
    ///
    /// A name bound in an enclosing function of the same file still counts as out of
    /// scope. The function's own name does not, so self-recursion is not reported. The
    /// property of `obj.prop` is reported as well when `obj` itself is out of scope, so
    /// namespace members resolve to their exports.
    pub fn analyze(&self, function: Node<'p>) -> Vec<OutOfScopeIdentifier> {
        let source = &*self.parsed.source;
        let own_names = own_names(self.parsed, function);
        let is_free = |node: Node<'p>, name: &str| {
            name != "arguments"
                && !own_names.contains(name)
                && !scope::lookup(node, name, source, false).is_some_and(|binding| {
                    binding.name_node.start_byte() >= function.start_byte()
                        && binding.name_node.end_byte() <= function.end_byte()
                })
        };
        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::new();
        nodes::walk_named(function, |node| {
            let free = match node.kind() {
                "identifier" | "shorthand_property_identifier" => {
                    let name = self.parsed.text(node);
                    !is_intrinsic_jsx_tag(node, name) && is_free(node, name)
                }
                "property_identifier" => free_member_object(node)
                    .is_some_and(|object| is_free(object, self.parsed.text(object))),
                _ => return true,
            };
            let name = self.parsed.text(node);
            if free && seen.insert(name.to_string()) {
                out.push(OutOfScopeIdentifier {
                    name: name.to_string(),
                    position: self.parsed.position(node.start_byte()),
                });
            }
            true
        });
        out
    }
}

/// The plain identifier `obj` when `property` is the accessed name of `obj.property`.
fn free_member_object(property: Node<'_>) -> Option<Node<'_>> {
    let parent = property.parent()?;
    if parent.kind() != "member_expression" || parent.child_by_field_name("property") != Some(property) {
        return None;
    }
    parent
        .child_by_field_name("object")
        .filter(|object| object.kind() == "identifier")
}

/// Names the function is known by: its own name, or the variable / key it is assigned to.
fn own_names(parsed: &ParsedFile, function: Node<'_>) -> HashSet<String> {
    let mut names = HashSet::new();
    if let Some(name) = function.child_by_field_name("name") {
        if name.kind() == "identifier" {
            names.insert(parsed.text(name).to_string());
        }
    }
    let mut holder = function.parent();
    while let Some(node) = holder {
        if unwrap_expression(node) != function && node.kind() != "parenthesized_expression" {
            break;
        }
        holder = node.parent();
    }
    if let Some(holder) = holder {
        if holder.kind() == "variable_declarator" {
            if let Some(name) = holder.child_by_field_name("name") {
                if name.kind() == "identifier" {
                    names.insert(parsed.text(name).to_string());
                }
            }
        }
    }
    names
}

fn is_intrinsic_jsx_tag(node: Node<'_>, name: &str) -> bool {
    let in_tag = node
        .parent()
        .is_some_and(|parent| JSX_TAG_PARENTS.contains(&parent.kind()));
    in_tag && name.chars().next().is_some_and(|c| c.is_ascii_lowercase())
}
