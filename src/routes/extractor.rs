//! Finds router declarations and the registrations made on them.
//!
//! Extraction runs in two passes over every tracked script. The first creates one
//! [`ResourceNode`] per variable initialised with a router (directly or through a factory
//! function). The second walks every method call, follows its receiver back to one of
//! those declarations and records the registration as an [`Entry`]. Receivers imported
//! from another file are resolved through the compiler-service bridge.

use super::graph::ResourceGraph;
use super::listing::join_paths;
use crate::bridge::CompilerServiceBridge;
use crate::model::{Definition, Entry, HttpMethod, ResourceNode};
use crate::syntax::ParsedFile;
use crate::syntax::nodes::{self, call_arguments, member_object_and_property, unwrap_expression};
use crate::syntax::scope::{self, BindingKind};
use crate::util;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use tree_sitter::Node;

const ROUTER_CLASSES: &[&str] = &["Hono", "OpenAPIHono", "Router"];
const ROUTER_FACTORIES: &[&str] = &["express", "Router"];
const VERB_METHODS: &[&str] = &["get", "post", "put", "delete", "patch", "options", "all"];
const REGISTRATION_METHODS: &[&str] = &["on", "use", "route", "openapi"];
const MAX_CONST_HOPS: usize = 4;

#[derive(Debug, Clone, Default, Serialize)]
pub struct RouteExtraction {
    pub graph: ResourceGraph,
    /// One message per file that could not be analysed.
    pub warnings: Vec<String>,
}

struct PendingEntry {
    node_id: String,
    file: String,
    offset: usize,
    entry: Entry,
}

/// One `.method(args)` link of a call chain.
struct ChainCall<'a> {
    method: String,
    args: Vec<Node<'a>>,
}

pub struct RouteTreeExtractor<'a> {
    bridge: &'a dyn CompilerServiceBridge,
}

impl<'a> RouteTreeExtractor<'a> {
    pub fn new(bridge: &'a dyn CompilerServiceBridge) -> Self {
        Self { bridge }
    }

    pub fn extract(&self) -> RouteExtraction {
        let host = self.bridge.host();
        let mut warnings = Vec::new();
        let mut files: Vec<(String, Arc<ParsedFile>)> = Vec::new();
        let mut paths = host.script_files();
        paths.sort();
        for path in paths {
            if util::is_declaration_file(&path.to_string_lossy()) {
                continue;
            }
            let rel = host.relative_path(&path);
            let Some(parsed) = host.parsed(&path) else {
                warn!(file = %rel, "skipping unreadable file");
                warnings.push(format!("{rel}: could not be read or parsed"));
                continue;
            };
            if parsed.has_errors() {
                warn!(file = %rel, "skipping file with syntax errors");
                warnings.push(format!("{rel}: syntax errors, file skipped"));
                continue;
            }
            files.push((rel, parsed));
        }

        let mut graph = ResourceGraph::new();
        let mut pending = Vec::new();
        for (rel, parsed) in &files {
            self.collect_declarations(rel, parsed, &mut graph, &mut pending);
        }
        for (rel, parsed) in &files {
            self.collect_registrations(rel, parsed, &graph, &mut pending);
        }
        attach(&mut graph, pending);
        debug!(
            nodes = graph.len(),
            files = files.len(),
            warnings = warnings.len(),
            "extracted route trees"
        );
        RouteExtraction { graph, warnings }
    }

    fn collect_declarations(
        &self,
        rel: &str,
        parsed: &ParsedFile,
        graph: &mut ResourceGraph,
        pending: &mut Vec<PendingEntry>,
    ) {
        let source = &*parsed.source;
        nodes::walk_named(parsed.root(), |node| {
            if node.kind() != "variable_declarator" {
                return true;
            }
            let Some(name) = node.child_by_field_name("name") else {
                return true;
            };
            let Some(value) = nodes::declarator_value(node) else {
                return true;
            };
            if name.kind() != "identifier" {
                return true;
            }
            let (root, calls) = call_chain(value, source);
            let factory_target = if is_router_constructor(root, source) {
                None
            } else {
                match self.factory_router(parsed, root) {
                    Some(target) => Some((target, root)),
                    None => return true,
                }
            };

            let mut base_path = String::new();
            for call in calls.iter().filter(|call| call.method == "basePath") {
                if let Some(path) = call.args.first().and_then(|arg| path_value(parsed, *arg, 0)) {
                    base_path = join_paths(&base_path, &path);
                }
            }
            let id = node_id(rel, parsed, name);
            if let Some(((target_id, target_name), callee)) = factory_target {
                pending.push(PendingEntry {
                    node_id: id.clone(),
                    file: rel.to_string(),
                    offset: callee.start_byte(),
                    entry: Entry::Reference {
                        id: node_id(rel, parsed, callee),
                        target_id,
                        path: "/".to_string(),
                        name: target_name,
                    },
                });
            }
            debug!(%id, "router declaration");
            graph.insert(ResourceNode {
                id,
                name: parsed.text(name).to_string(),
                file: rel.to_string(),
                position: parsed.utf16_offset(name.start_byte()),
                base_path,
                entries: Vec::new(),
            });
            true
        });
    }

    /// For `const app = createApp()`, the router declared and returned inside `createApp`.
    fn factory_router(&self, parsed: &ParsedFile, call: Node<'_>) -> Option<(String, String)> {
        if call.kind() != "call_expression" {
            return None;
        }
        let callee = call.child_by_field_name("function")?;
        if callee.kind() != "identifier" {
            return None;
        }
        let definition = self
            .bridge
            .resolve_definition(&parsed.uri(), parsed.position(callee.start_byte()))?;
        let host = self.bridge.host();
        let target = host.parsed(&definition.path()?)?;
        let offset = target.offset(definition.range.start)?;
        let name_node = target.root().named_descendant_for_byte_range(offset, offset)?;
        let function = nodes::declared_function(name_node.parent()?)?;
        let body = function.child_by_field_name("body")?;
        let source = &*target.source;
        let rel = host.relative_path(&target.path);

        let mut found = None;
        nodes::walk_named(body, |node| {
            if found.is_some() || (node != body && nodes::is_function_kind(node.kind())) {
                return false;
            }
            if node.kind() != "return_statement" {
                return true;
            }
            let returned = node
                .named_child(0)
                .map(unwrap_expression)
                .filter(|expr| expr.kind() == "identifier");
            let declared = returned.and_then(|expr| scope::lookup(expr, target.text(expr), source, false));
            if let Some(binding) = declared {
                let is_router = nodes::declarator_value(binding.declaration)
                    .is_some_and(|value| is_router_constructor(call_chain(value, source).0, source));
                if is_router {
                    found = Some((node_id(&rel, &target, binding.name_node), binding.name));
                }
            }
            false
        });
        found
    }

    fn collect_registrations(
        &self,
        rel: &str,
        parsed: &ParsedFile,
        graph: &ResourceGraph,
        pending: &mut Vec<PendingEntry>,
    ) {
        nodes::walk_named(parsed.root(), |node| {
            if node.kind() == "call_expression" {
                self.registration(rel, parsed, node, graph, pending);
            }
            true
        });
    }

    fn registration(
        &self,
        rel: &str,
        parsed: &ParsedFile,
        call: Node<'_>,
        graph: &ResourceGraph,
        pending: &mut Vec<PendingEntry>,
    ) {
        let source = &*parsed.source;
        let Some(function) = call.child_by_field_name("function") else {
            return;
        };
        let Some((object, method)) = member_object_and_property(function, source) else {
            return;
        };
        let method = method.as_str();
        if !VERB_METHODS.contains(&method) && !REGISTRATION_METHODS.contains(&method) {
            return;
        }
        let Some(property) = function.child_by_field_name("property") else {
            return;
        };
        let Some(router_id) = self.receiver_router(rel, parsed, object, graph) else {
            return;
        };

        let args = call_arguments(call);
        let entry_id = node_id(rel, parsed, property);
        let mut entries = Vec::new();
        match method {
            "on" => {
                let path = args.get(1).and_then(|arg| path_value(parsed, *arg, 0));
                let (Some(methods), Some(path)) = (args.first(), path) else {
                    return;
                };
                let methods = unwrap_expression(*methods);
                if methods.kind() == "array" {
                    let mut cursor = methods.walk();
                    for item in methods.named_children(&mut cursor) {
                        if let Some(name) = nodes::string_literal_value(item, source) {
                            entries.push(Entry::Route {
                                id: node_id(rel, parsed, item),
                                method: HttpMethod::from_name(&name).unwrap_or(HttpMethod::All),
                                path: path.clone(),
                            });
                        }
                    }
                } else if let Some(name) = nodes::string_literal_value(methods, source) {
                    entries.push(Entry::Route {
                        id: entry_id,
                        method: HttpMethod::from_name(&name).unwrap_or(HttpMethod::All),
                        path,
                    });
                }
            }
            "openapi" => {
                if let Some((method, path)) = args.first().and_then(|arg| openapi_route(parsed, *arg)) {
                    entries.push(Entry::Route {
                        id: entry_id,
                        method,
                        path,
                    });
                }
            }
            "use" => {
                let path = args.first().and_then(|arg| path_value(parsed, *arg, 0));
                for arg in &args {
                    let arg = unwrap_expression(*arg);
                    if arg.kind() != "identifier" {
                        continue;
                    }
                    if let Some(target_id) = self.router_for_identifier(rel, parsed, arg, graph) {
                        entries.push(Entry::Reference {
                            id: node_id(rel, parsed, arg),
                            target_id,
                            path: path.clone().unwrap_or_else(|| "/".to_string()),
                            name: parsed.text(arg).to_string(),
                        });
                    }
                }
                if entries.is_empty() {
                    entries.push(Entry::Middleware { id: entry_id, path });
                }
            }
            "route" => {
                let path = args.first().and_then(|arg| path_value(parsed, *arg, 0));
                let sub = args.get(1).map(|arg| unwrap_expression(*arg));
                let (Some(path), Some(sub)) = (path, sub) else {
                    return;
                };
                if sub.kind() != "identifier" {
                    return;
                }
                match self.router_for_identifier(rel, parsed, sub, graph) {
                    Some(target_id) => entries.push(Entry::Reference {
                        id: entry_id,
                        target_id,
                        path,
                        name: parsed.text(sub).to_string(),
                    }),
                    None => debug!(id = %entry_id, "mounted value is not a known router"),
                }
            }
            verb => {
                let Some(method) = HttpMethod::from_name(verb) else {
                    return;
                };
                let path = match args.first().and_then(|arg| path_value(parsed, *arg, 0)) {
                    Some(path) if args.len() >= 2 => Some(path),
                    Some(_) => None,
                    None if !args.is_empty() => express_route_path(parsed, object),
                    None => None,
                };
                if let Some(path) = path {
                    entries.push(Entry::Route {
                        id: entry_id,
                        method,
                        path,
                    });
                }
            }
        }

        for entry in entries {
            pending.push(PendingEntry {
                node_id: router_id.clone(),
                file: rel.to_string(),
                offset: property.start_byte(),
                entry,
            });
        }
    }

    /// Id of the router a receiver expression ultimately denotes.
    fn receiver_router(
        &self,
        rel: &str,
        parsed: &ParsedFile,
        object: Node<'_>,
        graph: &ResourceGraph,
    ) -> Option<String> {
        let (root, _) = call_chain(object, &parsed.source);
        if root.kind() == "identifier" {
            return self.router_for_identifier(rel, parsed, root, graph);
        }
        // `new Hono().get(..)` chains registered directly in an initializer
        let declarator = chain_declarator(root)?;
        let name = declarator.child_by_field_name("name")?;
        let id = node_id(rel, parsed, name);
        graph.contains(&id).then_some(id)
    }

    fn router_for_identifier(
        &self,
        rel: &str,
        parsed: &ParsedFile,
        ident: Node<'_>,
        graph: &ResourceGraph,
    ) -> Option<String> {
        let binding = scope::lookup(ident, parsed.text(ident), &parsed.source, false)?;
        let id = match binding.kind {
            BindingKind::Import { .. } => {
                let definition = self
                    .bridge
                    .resolve_definition(&parsed.uri(), parsed.position(ident.start_byte()))?;
                self.definition_node_id(&definition)?
            }
            _ => node_id(rel, parsed, binding.name_node),
        };
        graph.contains(&id).then_some(id)
    }

    fn definition_node_id(&self, definition: &Definition) -> Option<String> {
        let host = self.bridge.host();
        let parsed = host.parsed(&definition.path()?)?;
        let offset = parsed.offset(definition.range.start)?;
        let rel = host.relative_path(&parsed.path);
        Some(format!("{rel}@{}", parsed.utf16_offset(offset)))
    }
}

fn attach(graph: &mut ResourceGraph, pending: Vec<PendingEntry>) {
    let mut by_node: HashMap<String, Vec<PendingEntry>> = HashMap::new();
    for item in pending {
        by_node.entry(item.node_id.clone()).or_default().push(item);
    }
    for (node_id, mut items) in by_node {
        let Some(node) = graph.get_mut(&node_id) else {
            continue;
        };
        // registrations in the declaring file come first, then other files by path
        items.sort_by(|a, b| {
            (a.file != node.file, &a.file, a.offset).cmp(&(b.file != node.file, &b.file, b.offset))
        });
        node.entries.extend(items.into_iter().map(|item| item.entry));
    }
}

fn node_id(rel: &str, parsed: &ParsedFile, node: Node<'_>) -> String {
    format!("{rel}@{}", parsed.utf16_offset(node.start_byte()))
}

/// Split `root.a(..).b(..)` into `root` and its calls, innermost first.
/// Router constructors such as `express.Router()` are never split.
fn call_chain<'a>(expr: Node<'a>, source: &str) -> (Node<'a>, Vec<ChainCall<'a>>) {
    let mut calls = Vec::new();
    let mut current = unwrap_expression(expr);
    while current.kind() == "call_expression" && !is_router_constructor(current, source) {
        let Some((object, method)) = current
            .child_by_field_name("function")
            .and_then(|function| member_object_and_property(function, source))
        else {
            break;
        };
        calls.push(ChainCall {
            method,
            args: call_arguments(current),
        });
        current = unwrap_expression(object);
    }
    calls.reverse();
    (current, calls)
}

/// The declarator whose initializer is the chain rooted at `root`.
fn chain_declarator(root: Node<'_>) -> Option<Node<'_>> {
    let mut current = root;
    loop {
        let parent = current.parent()?;
        let on_spine = match parent.kind() {
            "member_expression" => parent.child_by_field_name("object") == Some(current),
            "call_expression" => parent.child_by_field_name("function") == Some(current),
            "parenthesized_expression" | "await_expression" | "as_expression"
            | "satisfies_expression" | "non_null_expression" => true,
            "variable_declarator" => {
                return (parent.child_by_field_name("value") == Some(current)).then_some(parent);
            }
            _ => false,
        };
        if !on_spine {
            return None;
        }
        current = parent;
    }
}

fn is_router_constructor(node: Node<'_>, source: &str) -> bool {
    let node = unwrap_expression(node);
    match node.kind() {
        "new_expression" => node
            .child_by_field_name("constructor")
            .is_some_and(|ctor| match ctor.kind() {
                "identifier" => ROUTER_CLASSES.contains(&nodes::node_text(ctor, source)),
                "member_expression" => is_express_router(ctor, source),
                _ => false,
            }),
        "call_expression" => node
            .child_by_field_name("function")
            .is_some_and(|function| match function.kind() {
                "identifier" => ROUTER_FACTORIES.contains(&nodes::node_text(function, source)),
                "member_expression" => is_express_router(function, source),
                _ => false,
            }),
        _ => false,
    }
}

fn is_express_router(member: Node<'_>, source: &str) -> bool {
    member_object_and_property(member, source).is_some_and(|(object, property)| {
        property == "Router" && nodes::node_text(object, source) == "express"
    })
}

/// Path of `router.route("/p")` when verbs are chained onto it, express style.
fn express_route_path(parsed: &ParsedFile, object: Node<'_>) -> Option<String> {
    let mut current = unwrap_expression(object);
    while current.kind() == "call_expression" {
        let (inner, method) = current
            .child_by_field_name("function")
            .and_then(|function| member_object_and_property(function, &parsed.source))?;
        if method == "route" {
            let args = call_arguments(current);
            return match args.as_slice() {
                [path] => path_value(parsed, *path, 0),
                _ => None,
            };
        }
        if !VERB_METHODS.contains(&method.as_str()) {
            return None;
        }
        current = unwrap_expression(inner);
    }
    None
}

/// Static value of a path argument: a string literal, a template literal, or a `const`
/// bound to one of those.
fn path_value(parsed: &ParsedFile, node: Node<'_>, hops: usize) -> Option<String> {
    let node = unwrap_expression(node);
    match node.kind() {
        "string" => nodes::string_literal_value(node, &parsed.source),
        "template_string" => Some(template_value(parsed, node, hops)),
        "identifier" if hops < MAX_CONST_HOPS => {
            let binding = scope::lookup(node, parsed.text(node), &parsed.source, false)?;
            let value = const_initializer(parsed, binding.declaration)?;
            path_value(parsed, value, hops + 1)
        }
        _ => None,
    }
}

fn const_initializer<'a>(parsed: &ParsedFile, declarator: Node<'a>) -> Option<Node<'a>> {
    let declaration = declarator.parent()?;
    let is_const = declaration.kind() == "lexical_declaration"
        && declaration
            .child_by_field_name("kind")
            .is_some_and(|kind| parsed.text(kind) == "const");
    if !is_const {
        return None;
    }
    nodes::declarator_value(declarator)
}

/// Template text with resolvable substitutions inlined; the rest keep their raw `${..}`.
fn template_value(parsed: &ParsedFile, template: Node<'_>, hops: usize) -> String {
    let source = &*parsed.source;
    let end = template.end_byte().saturating_sub(1);
    let mut position = template.start_byte() + 1;
    let mut out = String::new();
    let mut cursor = template.walk();
    for part in template.named_children(&mut cursor) {
        if part.kind() != "template_substitution" {
            continue;
        }
        out.push_str(source.get(position..part.start_byte()).unwrap_or(""));
        let resolved = part
            .named_child(0)
            .and_then(|expr| path_value(parsed, expr, hops + 1));
        match resolved {
            Some(value) => out.push_str(&value),
            None => out.push_str(parsed.text(part)),
        }
        position = part.end_byte();
    }
    out.push_str(source.get(position..end).unwrap_or(""));
    out
}

/// `(method, path)` of a `createRoute({ method, path })` argument, inline or via a const.
fn openapi_route(parsed: &ParsedFile, arg: Node<'_>) -> Option<(HttpMethod, String)> {
    let mut call = unwrap_expression(arg);
    if call.kind() == "identifier" {
        let binding = scope::lookup(call, parsed.text(call), &parsed.source, false)?;
        call = const_initializer(parsed, binding.declaration)?;
    }
    if call.kind() != "call_expression" {
        return None;
    }
    let object = call_arguments(call)
        .into_iter()
        .map(unwrap_expression)
        .find(|arg| arg.kind() == "object")?;
    let mut method = None;
    let mut path = None;
    let mut cursor = object.walk();
    for pair in object.named_children(&mut cursor) {
        if pair.kind() != "pair" {
            continue;
        }
        let (Some(key), Some(value)) = (
            pair.child_by_field_name("key"),
            pair.child_by_field_name("value"),
        ) else {
            continue;
        };
        let key = nodes::string_literal_value(key, &parsed.source)
            .unwrap_or_else(|| parsed.text(key).to_string());
        match key.as_str() {
            "method" => method = path_value(parsed, value, 0),
            "path" => path = path_value(parsed, value, 0),
            _ => {}
        }
    }
    let method = method
        .and_then(|name| HttpMethod::from_name(&name))
        .unwrap_or(HttpMethod::All);
    Some((method, openapi_path(&path?)))
}

/// `/users/{id}` becomes `/users/:id`.
fn openapi_path(path: &str) -> String {
    path.split('/')
        .map(|segment| match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(name) => format!(":{name}"),
            None => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}
