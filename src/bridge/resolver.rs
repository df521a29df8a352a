//! In-process definition lookup over tree-sitter parses.
//!
//! A name resolves through its lexical binding first. Import bindings are followed into the
//! exporting module (through re-exports and `export *`), and names with no binding at all
//! are looked up in the ambient index of global declarations.

use super::CompilerServiceBridge;
use super::ambient::{AmbientDeclaration, AmbientIndex};
use super::host::ScriptHost;
use super::modules::ResolveMode;
use crate::model::{Definition, Position, Range};
use crate::syntax::ParsedFile;
use crate::syntax::nodes::{self, node_text};
use crate::syntax::scope::{self, Binding, BindingKind, ImportKind};
use crate::util;
use std::path::Path;
use std::sync::OnceLock;
use tracing::trace;
use tree_sitter::Node;

const MAX_EXPORT_HOPS: usize = 16;

pub struct InProcessBridge {
    host: ScriptHost,
    ambient: OnceLock<AmbientIndex>,
}

enum ExportTarget<'a> {
    Node(Node<'a>),
    Local(Binding<'a>),
    Reexport { source: String, name: String },
    Module { source: String },
}

impl InProcessBridge {
    pub fn new(host: ScriptHost) -> Self {
        Self {
            host,
            ambient: OnceLock::new(),
        }
    }

    /// Global declarations, indexed on first use.
    pub fn ambient(&self) -> &AmbientIndex {
        self.ambient.get_or_init(|| AmbientIndex::build(&self.host))
    }

    fn definition_at(&self, uri: &str, position: Position, mode: ResolveMode) -> Option<Definition> {
        let path = util::uri_to_path(uri)?;
        let parsed = self.host.parsed(&path)?;
        let ident = parsed.identifier_at(position)?;
        let name = parsed.text(ident).to_string();
        trace!(%name, ?mode, "resolving definition");
        if ident.kind() == "property_identifier" {
            return self.member_definition(&parsed, ident, mode);
        }
        let types = ident.kind() == "type_identifier";
        match scope::lookup(ident, &name, &parsed.source, types) {
            Some(binding) => self.binding_definition(&parsed, &binding, mode, 0),
            None => self.global_definition(&name, mode),
        }
    }

    fn binding_definition(
        &self,
        parsed: &ParsedFile,
        binding: &Binding<'_>,
        mode: ResolveMode,
        hops: usize,
    ) -> Option<Definition> {
        let BindingKind::Import { kind, source } = &binding.kind else {
            return Some(node_definition(parsed, binding.name_node));
        };
        let target = self.host.resolve_module(&parsed.path, source, mode)?;
        match kind {
            ImportKind::Namespace => Some(module_definition(&target)),
            ImportKind::Default => self.export_definition(&target, "default", mode, hops + 1),
            ImportKind::Named { imported } => {
                self.export_definition(&target, imported, mode, hops + 1)
            }
        }
    }

    /// `ns.member` where `ns` is a namespace import resolves to the module's export.
    fn member_definition(
        &self,
        parsed: &ParsedFile,
        property: Node<'_>,
        mode: ResolveMode,
    ) -> Option<Definition> {
        let parent = property.parent()?;
        let is_member_property = parent.kind() == "member_expression"
            && parent.child_by_field_name("property") == Some(property);
        if !is_member_property {
            // object keys and method names declare themselves
            return Some(node_definition(parsed, property));
        }
        let object = parent.child_by_field_name("object")?;
        if object.kind() != "identifier" {
            return None;
        }
        let Some(binding) = scope::lookup(object, parsed.text(object), &parsed.source, false) else {
            // members of an ambient global are declared with it
            return self.global_definition(parsed.text(object), mode);
        };
        let BindingKind::Import {
            kind: ImportKind::Namespace,
            source,
        } = &binding.kind
        else {
            return None;
        };
        let target = self.host.resolve_module(&parsed.path, source, mode)?;
        self.export_definition(&target, parsed.text(property), mode, 1)
    }

    fn export_definition(
        &self,
        path: &Path,
        name: &str,
        mode: ResolveMode,
        hops: usize,
    ) -> Option<Definition> {
        if hops > MAX_EXPORT_HOPS {
            return None;
        }
        let parsed = self.host.parsed(path)?;
        let mut star_sources = Vec::new();
        if let Some(target) = find_export(&parsed, name, &mut star_sources) {
            return match target {
                ExportTarget::Node(node) => Some(node_definition(&parsed, node)),
                ExportTarget::Local(binding) => {
                    self.binding_definition(&parsed, &binding, mode, hops)
                }
                ExportTarget::Reexport { source, name } => {
                    let target = self.host.resolve_module(path, &source, mode)?;
                    self.export_definition(&target, &name, mode, hops + 1)
                }
                ExportTarget::Module { source } => self
                    .host
                    .resolve_module(path, &source, mode)
                    .map(|target| module_definition(&target)),
            };
        }
        if name != "default" {
            for source in star_sources {
                let Some(target) = self.host.resolve_module(path, &source, mode) else {
                    continue;
                };
                if let Some(found) = self.export_definition(&target, name, mode, hops + 1) {
                    return Some(found);
                }
            }
        }
        // CommonJS and bundled packages rarely expose statically visible exports; the
        // module itself is the best available answer.
        if path.components().any(|comp| comp.as_os_str() == "node_modules") {
            return Some(module_definition(path));
        }
        None
    }

    /// Ambient globals have no runtime source, only a declaration.
    fn global_definition(&self, name: &str, mode: ResolveMode) -> Option<Definition> {
        if mode == ResolveMode::Source {
            return None;
        }
        let candidates = self.ambient().lookup(name);
        candidates
            .iter()
            .find(|decl| decl.is_declaration_file())
            .or_else(|| candidates.first())
            .map(AmbientDeclaration::definition)
    }
}

impl CompilerServiceBridge for InProcessBridge {
    fn resolve_definition(&self, uri: &str, position: Position) -> Option<Definition> {
        self.definition_at(uri, position, ResolveMode::Source)
    }

    fn resolve_type_definition(&self, uri: &str, position: Position) -> Option<Definition> {
        self.definition_at(uri, position, ResolveMode::Types)
    }

    fn host(&self) -> &ScriptHost {
        &self.host
    }
}

fn node_definition(parsed: &ParsedFile, node: Node<'_>) -> Definition {
    Definition::new(parsed.uri(), parsed.range(node))
}

/// A whole module, addressed by an empty range at its start.
fn module_definition(path: &Path) -> Definition {
    Definition::new(util::path_to_uri(path), Range::default())
}

fn has_token(node: Node<'_>, token: &str) -> bool {
    let mut cursor = node.walk();
    node.children(&mut cursor).any(|child| child.kind() == token)
}

fn find_export<'a>(
    parsed: &'a ParsedFile,
    name: &str,
    star_sources: &mut Vec<String>,
) -> Option<ExportTarget<'a>> {
    let root = parsed.root();
    let source = &parsed.source;
    let mut cursor = root.walk();
    let statements: Vec<Node<'a>> = root
        .named_children(&mut cursor)
        .filter(|node| node.kind() == "export_statement")
        .collect();
    for statement in statements {
        let is_default = has_token(statement, "default");
        let from = statement
            .child_by_field_name("source")
            .and_then(|node| nodes::string_literal_value(node, source));
        if let Some(declaration) = statement.child_by_field_name("declaration") {
            if is_default {
                if name == "default" {
                    let target = nodes::declaration_name(declaration).unwrap_or(declaration);
                    return Some(ExportTarget::Node(target));
                }
                continue;
            }
            let mut names = Vec::new();
            scope::declared_names(declaration, &mut names);
            if let Some(found) = names.into_iter().find(|node| node_text(*node, source) == name) {
                return Some(ExportTarget::Node(found));
            }
            continue;
        }
        if let Some(value) = statement.child_by_field_name("value") {
            if is_default && name == "default" {
                let value = nodes::unwrap_expression(value);
                if value.kind() == "identifier" {
                    if let Some(binding) = scope::lookup(root, node_text(value, source), source, true) {
                        return Some(ExportTarget::Local(binding));
                    }
                }
                return Some(ExportTarget::Node(value));
            }
            continue;
        }
        let mut inner = statement.walk();
        let children: Vec<Node<'a>> = statement.named_children(&mut inner).collect();
        let mut has_clause = false;
        for child in children {
            match child.kind() {
                "export_clause" => {
                    has_clause = true;
                    let mut spec_cursor = child.walk();
                    for spec in child.named_children(&mut spec_cursor) {
                        if spec.kind() != "export_specifier" {
                            continue;
                        }
                        let Some(local) = spec.child_by_field_name("name") else {
                            continue;
                        };
                        let local_name = nodes::string_literal_value(local, source)
                            .unwrap_or_else(|| node_text(local, source).to_string());
                        let exported = spec
                            .child_by_field_name("alias")
                            .map(|alias| {
                                nodes::string_literal_value(alias, source)
                                    .unwrap_or_else(|| node_text(alias, source).to_string())
                            })
                            .unwrap_or_else(|| local_name.clone());
                        if exported != name {
                            continue;
                        }
                        return match &from {
                            Some(module) => Some(ExportTarget::Reexport {
                                source: module.clone(),
                                name: local_name,
                            }),
                            None => scope::lookup(root, &local_name, source, true)
                                .map(ExportTarget::Local),
                        };
                    }
                }
                "namespace_export" => {
                    has_clause = true;
                    let exported = child
                        .named_child(0)
                        .map(|node| {
                            nodes::string_literal_value(node, source)
                                .unwrap_or_else(|| node_text(node, source).to_string())
                        })
                        .unwrap_or_default();
                    if exported == name {
                        if let Some(module) = &from {
                            return Some(ExportTarget::Module {
                                source: module.clone(),
                            });
                        }
                    }
                }
                _ => {}
            }
        }
        if !has_clause {
            if let Some(module) = from {
                star_sources.push(module);
            }
        }
    }
    None
}
