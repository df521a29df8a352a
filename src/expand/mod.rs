//! Recursive expansion of a function's free variables into their definitions.
//!
//! Expansion is sequential: identifiers are resolved one after another in source order,
//! and a resolved local function is expanded fully before the next identifier is looked
//! at. Only the two definition queries for a single identifier run in parallel.

pub mod cancel;

pub use cancel::CancellationToken;

use crate::analysis::{Classification, DefinitionResolver, OutOfScopeAnalyzer};
use crate::bridge::CompilerServiceBridge;
use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::model::{
    ContextEntryType, Definition, ExpandedFunctionContext, ExpandedFunctionContextEntry,
    ExpandedFunctionResult, OutOfScopeIdentifier, Truncation,
};
use crate::syntax::ParsedFile;
use crate::syntax::nodes;
use std::io;
use std::path::Path;
use tracing::{debug, warn};
use tree_sitter::Node;

#[derive(Debug, Clone)]
pub struct ExpandOptions {
    /// Nesting levels below the target function that are expanded.
    pub max_depth: usize,
    pub cancel: CancellationToken,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self {
            max_depth: Config::get().max_depth,
            cancel: CancellationToken::new(),
        }
    }
}

pub struct ContextExpander<'b> {
    bridge: &'b dyn CompilerServiceBridge,
    resolver: DefinitionResolver<'b>,
    options: ExpandOptions,
}

impl<'b> ContextExpander<'b> {
    pub fn new(bridge: &'b dyn CompilerServiceBridge, options: ExpandOptions) -> Self {
        Self {
            bridge,
            resolver: DefinitionResolver::new(bridge),
            options,
        }
    }

    /// Expand the function declared in `src_path` as `function`, or whose source text is
    /// `function`. `Ok(None)` when no such function exists in the file.
    pub fn expand_function(
        &self,
        src_path: &Path,
        function: &str,
    ) -> EngineResult<Option<ExpandedFunctionResult>> {
        let host = self.bridge.host();
        let path = if src_path.is_absolute() {
            src_path.to_path_buf()
        } else {
            host.root().join(src_path)
        };
        let Some(parsed) = host.parsed(&path) else {
            return Err(EngineError::io(
                path,
                io::Error::new(io::ErrorKind::NotFound, "source file is not readable"),
            ));
        };
        let Some(target) = find_function(&parsed, function) else {
            debug!(file = %path.display(), function, "function not found");
            return Ok(None);
        };
        let context = self.expand(&parsed, target)?;
        let range = parsed.range(target);
        Ok(Some(ExpandedFunctionResult {
            file: host.relative_path(&parsed.path),
            start_line: range.start.line + 1,
            start_column: range.start.character + 1,
            end_line: range.end.line + 1,
            end_column: range.end.character + 1,
            context,
        }))
    }

    /// Expansion tree for `function`, a function node of `parsed`.
    pub fn expand(&self, parsed: &ParsedFile, function: Node<'_>) -> EngineResult<ExpandedFunctionContext> {
        let mut ancestors = vec![function_key(parsed, function)];
        self.expand_node(parsed, function, &mut ancestors, 0)
    }

    fn expand_node(
        &self,
        parsed: &ParsedFile,
        function: Node<'_>,
        ancestors: &mut Vec<String>,
        depth: usize,
    ) -> EngineResult<ExpandedFunctionContext> {
        let identifiers = OutOfScopeAnalyzer::new(parsed).analyze(function);
        let uri = parsed.uri();
        let mut context = Vec::new();
        for ident in identifiers {
            if self.options.cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            if let Some(entry) = self.expand_identifier(&uri, ident, ancestors, depth)? {
                context.push(entry);
            }
        }
        Ok(context)
    }

    fn expand_identifier(
        &self,
        uri: &str,
        ident: OutOfScopeIdentifier,
        ancestors: &mut Vec<String>,
        depth: usize,
    ) -> EngineResult<Option<ExpandedFunctionContextEntry>> {
        let definition = match self.resolver.resolve(uri, ident.position) {
            Classification::StandardGlobal => {
                debug!(name = %ident.name, "skipping standard global");
                return Ok(None);
            }
            Classification::NotFound => {
                warn!(name = %ident.name, uri, "definition not found");
                return Ok(None);
            }
            Classification::Dependency {
                definition,
                package,
            } => {
                let definition = self
                    .resolver
                    .locate(&definition)
                    .map(|located| located.definition)
                    .unwrap_or(definition);
                let mut entry = entry(ident, ContextEntryType::Unknown, definition);
                entry.package = Some(package);
                return Ok(Some(entry));
            }
            Classification::Local(definition) => definition,
        };

        let Some(located) = self.resolver.locate(&definition) else {
            debug!(name = %ident.name, "declaration not located");
            return Ok(Some(entry(ident, ContextEntryType::Unknown, definition)));
        };
        let Some((function_file, function)) = located.function_node() else {
            return Ok(Some(entry(
                ident,
                ContextEntryType::Unknown,
                located.definition.clone(),
            )));
        };

        let key = located.definition.key();
        let mut result = entry(ident, ContextEntryType::Function, located.definition.clone());
        if ancestors.contains(&key) {
            result.truncated = Some(Truncation::Cycle);
        } else if depth >= self.options.max_depth {
            result.truncated = Some(Truncation::Depth);
        } else {
            ancestors.push(key);
            let nested = self.expand_node(&function_file, function, ancestors, depth + 1);
            ancestors.pop();
            result.context = Some(nested?);
        }
        Ok(Some(result))
    }
}

fn entry(
    ident: OutOfScopeIdentifier,
    kind: ContextEntryType,
    definition: Definition,
) -> ExpandedFunctionContextEntry {
    ExpandedFunctionContextEntry {
        name: ident.name,
        kind,
        position: ident.position,
        definition: Some(definition),
        package: None,
        context: None,
        truncated: None,
    }
}

/// Identity of a function the way a definition query pointing at it would report it.
fn function_key(parsed: &ParsedFile, function: Node<'_>) -> String {
    let name = function_name(function).unwrap_or(function);
    Definition::new(parsed.uri(), parsed.range(name)).key()
}

fn function_name(function: Node<'_>) -> Option<Node<'_>> {
    if let Some(name) = function.child_by_field_name("name") {
        return Some(name);
    }
    let holder = function.parent()?;
    match holder.kind() {
        "variable_declarator" | "public_field_definition" | "field_definition" => {
            holder.child_by_field_name("name")
        }
        "pair" => holder.child_by_field_name("key"),
        _ => None,
    }
}

/// A function declared under `query`, or failing that one whose text is `query`.
pub fn find_function<'t>(parsed: &'t ParsedFile, query: &str) -> Option<Node<'t>> {
    let query = query.trim();
    let mut by_name = None;
    let mut by_text = None;
    nodes::walk_named(parsed.root(), |node| {
        if by_name.is_some() {
            return false;
        }
        let Some(function) = nodes::declared_function(node) else {
            return true;
        };
        if node.kind() == "export_statement" {
            return true;
        }
        let named = function_name(function).is_some_and(|name| parsed.text(name) == query);
        if named {
            by_name = Some(function);
            return false;
        }
        if by_text.is_none() {
            let statement = match node.parent() {
                Some(parent) if matches!(parent.kind(), "lexical_declaration" | "variable_declaration") => parent,
                _ => node,
            };
            let matches_text = [function, node, statement]
                .iter()
                .any(|candidate| parsed.text(*candidate).trim() == query);
            if matches_text {
                by_text = Some(function);
            }
        }
        true
    });
    by_name.or(by_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn parse(source: &str) -> ParsedFile {
        ParsedFile::parse(Path::new("a.ts"), Arc::from(source)).unwrap()
    }

    #[test]
    fn finds_functions_by_name_in_every_shape() {
        let parsed = parse(
            "function a() {}\nconst b = () => 1;\nclass C { c() { return 2; } }\nconst o = { d: function () {} };\nexport const e = async () => {};\n",
        );
        for name in ["a", "b", "c", "d", "e"] {
            let found = find_function(&parsed, name);
            assert!(found.is_some(), "{name} not found");
            assert!(nodes::is_function_kind(found.unwrap().kind()));
        }
        assert!(find_function(&parsed, "missing").is_none());
    }

    #[test]
    fn finds_functions_by_source_text() {
        let parsed = parse("const b = () => 1;\nconst other = (x: number) => x * 2;\n");
        let found = find_function(&parsed, "  const other = (x: number) => x * 2;\n").unwrap();
        assert_eq!(parsed.text(found), "(x: number) => x * 2");
    }
}
