//! Classifies where an out-of-scope identifier is defined and locates its declaration.

use crate::bridge::CompilerServiceBridge;
use crate::model::{Definition, Position};
use crate::syntax::ParsedFile;
use crate::syntax::nodes;
use crate::util;
use std::sync::Arc;
use std::thread;
use tracing::{debug, trace};
use tree_sitter::Node;

const MAX_IMPORT_HOPS: usize = 8;
const NODE_MODULES: &str = "node_modules/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Only an ambient declaration exists: a runtime or lib global.
    StandardGlobal,
    Dependency {
        definition: Definition,
        package: String,
    },
    Local(Definition),
    NotFound,
}

/// What a definition points at once its declaration is found.
#[derive(Debug, Clone)]
pub enum DeclarationKind {
    /// A function whose body can be expanded further. The range is the function node.
    Function {
        parsed: Arc<ParsedFile>,
        start: usize,
        end: usize,
    },
    /// Any other declaration, captured as text.
    Value,
    /// A whole module, as reached through a namespace import.
    Module,
}

#[derive(Debug, Clone)]
pub struct LocatedDefinition {
    /// The definition with `text` filled in.
    pub definition: Definition,
    pub kind: DeclarationKind,
}

impl LocatedDefinition {
    /// The function node, for [`DeclarationKind::Function`].
    pub fn function_node(&self) -> Option<(Arc<ParsedFile>, Node<'_>)> {
        let DeclarationKind::Function { parsed, start, end } = &self.kind else {
            return None;
        };
        let node = parsed.node_within(*start, *end, |node| {
            nodes::is_function_kind(node.kind())
                && node.start_byte() == *start
                && node.end_byte() == *end
        })?;
        Some((Arc::clone(parsed), node))
    }
}

pub struct DefinitionResolver<'b> {
    bridge: &'b dyn CompilerServiceBridge,
}

impl<'b> DefinitionResolver<'b> {
    pub fn new(bridge: &'b dyn CompilerServiceBridge) -> Self {
        Self { bridge }
    }

    /// Source and type definitions of the symbol at `position`, queried concurrently.
    pub fn query(&self, uri: &str, position: Position) -> (Option<Definition>, Option<Definition>) {
        let bridge = self.bridge;
        thread::scope(|scope| {
            let types = scope.spawn(move || bridge.resolve_type_definition(uri, position));
            let source = bridge.resolve_definition(uri, position);
            let types = types.join().unwrap_or_default();
            (source, types)
        })
    }

    pub fn resolve(&self, uri: &str, position: Position) -> Classification {
        let (source, types) = self.query(uri, position);
        trace!(?position, source = ?source.as_ref().map(|d| &d.uri), "definition query");
        classify(source, types)
    }

    /// Find the declaration a definition points at, following imports the bridge stopped at.
    pub fn locate(&self, definition: &Definition) -> Option<LocatedDefinition> {
        self.locate_from(definition, 0)
    }

    fn locate_from(&self, definition: &Definition, hops: usize) -> Option<LocatedDefinition> {
        let path = definition.path()?;
        let parsed = self.bridge.host().parsed(&path)?;
        let range = definition.range;
        if range.start == range.end && range.start == Position::default() {
            return Some(LocatedDefinition {
                definition: with_text(definition, &parsed.source),
                kind: DeclarationKind::Module,
            });
        }
        let start = parsed.offset(range.start)?;
        let end = parsed.offset(range.end)?.max(start);
        let name = parsed.root().named_descendant_for_byte_range(start, end)?;
        let declaration = name.parent().unwrap_or(name);

        if is_import_site(declaration) {
            if hops >= MAX_IMPORT_HOPS {
                debug!(uri = %definition.uri, "import chain too long");
                return None;
            }
            let next = self
                .bridge
                .resolve_definition(&definition.uri, parsed.position(name.start_byte()))?;
            if next.key() == definition.key() {
                return None;
            }
            return self.locate_from(&next, hops + 1);
        }

        if let Some(function) = nodes::declared_function(declaration) {
            let text = declaration_statement(declaration);
            return Some(LocatedDefinition {
                definition: with_text(definition, parsed.text(text)),
                kind: DeclarationKind::Function {
                    start: function.start_byte(),
                    end: function.end_byte(),
                    parsed: Arc::clone(&parsed),
                },
            });
        }
        let text = parsed.text(declaration_statement(declaration)).to_string();
        Some(LocatedDefinition {
            definition: with_text(definition, &text),
            kind: DeclarationKind::Value,
        })
    }
}

/// Decide what kind of definition a pair of bridge answers describes.
pub fn classify(source: Option<Definition>, types: Option<Definition>) -> Classification {
    match source {
        None if types.as_ref().is_some_and(Definition::is_declaration_file) => {
            Classification::StandardGlobal
        }
        None => Classification::NotFound,
        Some(definition) if definition.is_in_node_modules() => {
            match extract_package_name(&definition.uri) {
                Some(package) => Classification::Dependency {
                    definition,
                    package,
                },
                None => Classification::Local(definition),
            }
        }
        Some(definition) => Classification::Local(definition),
    }
}

/// Package that owns a path or URI under `node_modules`.
///
/// Handles `node_modules/<pkg>`, `node_modules/@scope/<pkg>` and pnpm's
/// `node_modules/.pnpm/<pkg>@<version>/node_modules/<pkg>`.
pub fn extract_package_name(location: &str) -> Option<String> {
    let normalized = util::uri_to_path(location)
        .map(|path| path.to_string_lossy().replace('\\', "/"))
        .unwrap_or_else(|| location.replace('\\', "/"));
    let index = normalized.rfind(NODE_MODULES)?;
    let mut segments = normalized[index + NODE_MODULES.len()..]
        .split('/')
        .filter(|segment| !segment.is_empty());
    let first = segments.next()?;
    if first == ".pnpm" {
        return segments.next().and_then(pnpm_store_package);
    }
    if first.starts_with('@') {
        let name = segments.next()?;
        return Some(format!("{first}/{name}"));
    }
    Some(first.to_string())
}

/// `@scope+pkg@1.2.3_peer@4` names `@scope/pkg`.
fn pnpm_store_package(entry: &str) -> Option<String> {
    let (scoped, rest) = match entry.strip_prefix('@') {
        Some(rest) => (true, rest),
        None => (false, entry),
    };
    let name = rest.split('@').next().filter(|name| !name.is_empty())?;
    if scoped {
        Some(format!("@{}", name.replacen('+', "/", 1)))
    } else {
        Some(name.to_string())
    }
}

fn with_text(definition: &Definition, text: &str) -> Definition {
    Definition {
        text: Some(text.to_string()),
        ..definition.clone()
    }
}

fn is_import_site(node: Node<'_>) -> bool {
    matches!(
        node.kind(),
        "import_specifier" | "import_clause" | "namespace_import" | "export_specifier"
    )
}

/// The statement that declares `declaration`, so the captured text reads as source.
fn declaration_statement(declaration: Node<'_>) -> Node<'_> {
    let statement = match declaration.kind() {
        "variable_declarator" => declaration
            .parent()
            .filter(|parent| matches!(parent.kind(), "lexical_declaration" | "variable_declaration")),
        _ => None,
    };
    let statement = statement.unwrap_or(declaration);
    match statement.parent() {
        Some(parent) if parent.kind() == "export_statement" => parent,
        _ => statement,
    }
}
