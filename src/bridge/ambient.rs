//! Index of globally visible declarations: the TypeScript standard library, `@types`
//! packages, and `declare global` / script-style declaration files in the project.

use super::host::ScriptHost;
use crate::model::{Definition, Range};
use crate::syntax::ParsedFile;
use crate::syntax::nodes::node_text;
use crate::syntax::scope::declared_names;
use crate::util;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use tree_sitter::Node;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbientDeclaration {
    pub path: PathBuf,
    pub range: Range,
}

impl AmbientDeclaration {
    pub fn definition(&self) -> Definition {
        Definition::new(util::path_to_uri(&self.path), self.range)
    }

    pub fn is_declaration_file(&self) -> bool {
        util::is_declaration_file(&self.path.to_string_lossy())
    }
}

#[derive(Debug, Default)]
pub struct AmbientIndex {
    globals: HashMap<String, Vec<AmbientDeclaration>>,
}

impl AmbientIndex {
    pub fn build(host: &ScriptHost) -> Self {
        let mut index = AmbientIndex::default();
        let mut files = standard_library_files(host.root());
        files.extend(types_package_files(
            host.root(),
            host.config().compiler_options.types.as_deref(),
        ));
        for path in files {
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            match ParsedFile::parse(&path, Arc::from(content)) {
                Ok(parsed) => index.index_file(&parsed),
                Err(err) => warn!(path = %path.display(), "skipping ambient file: {err}"),
            }
        }
        for path in host.script_files() {
            if let Some(parsed) = host.parsed(&path) {
                index.index_file(&parsed);
            }
        }
        debug!(names = index.globals.len(), "built ambient index");
        index
    }

    /// Record the global declarations of one file. Files with top-level imports or
    /// exports are modules and only contribute their `declare global` blocks.
    pub fn index_file(&mut self, parsed: &ParsedFile) {
        let root = parsed.root();
        let is_declaration_file = util::is_declaration_file(&parsed.path.to_string_lossy());
        let mut cursor = root.walk();
        let statements: Vec<Node<'_>> = root.named_children(&mut cursor).collect();
        let is_module = statements
            .iter()
            .any(|node| matches!(node.kind(), "import_statement" | "export_statement"));
        for statement in statements {
            if let Some(block) = global_block(statement) {
                let mut inner = block.walk();
                for child in block.named_children(&mut inner) {
                    self.index_statement(parsed, child);
                }
            } else if is_declaration_file && !is_module {
                self.index_statement(parsed, statement);
            }
        }
    }

    fn index_statement(&mut self, parsed: &ParsedFile, statement: Node<'_>) {
        let mut names = Vec::new();
        declared_names(statement, &mut names);
        for name in names {
            let key = node_text(name, &parsed.source).to_string();
            self.globals.entry(key).or_default().push(AmbientDeclaration {
                path: parsed.path.clone(),
                range: parsed.range(name),
            });
        }
    }

    pub fn lookup(&self, name: &str) -> &[AmbientDeclaration] {
        self.globals.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.globals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.globals.is_empty()
    }
}

/// The body of `declare global { ... }`.
fn global_block(statement: Node<'_>) -> Option<Node<'_>> {
    if statement.kind() != "ambient_declaration" {
        return None;
    }
    let mut cursor = statement.walk();
    let has_global = statement
        .children(&mut cursor)
        .any(|child| child.kind() == "global");
    if !has_global {
        return None;
    }
    let mut cursor = statement.walk();
    statement
        .named_children(&mut cursor)
        .find(|child| child.kind() == "statement_block")
}

fn find_node_modules_dir(root: &Path, relative: &str) -> Option<PathBuf> {
    root.ancestors()
        .map(|dir| dir.join("node_modules").join(relative))
        .find(|candidate| candidate.is_dir())
}

fn standard_library_files(root: &Path) -> Vec<PathBuf> {
    let Some(lib_dir) = find_node_modules_dir(root, "typescript/lib") else {
        return Vec::new();
    };
    let Ok(entries) = fs::read_dir(&lib_dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("lib.") && name.ends_with(".d.ts"))
        })
        .collect();
    files.sort();
    files
}

/// `@types/*/index.d.ts`, restricted to `compilerOptions.types` when that is set.
fn types_package_files(root: &Path, only: Option<&[String]>) -> Vec<PathBuf> {
    let Some(types_dir) = find_node_modules_dir(root, "@types") else {
        return Vec::new();
    };
    let Ok(entries) = fs::read_dir(&types_dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            only.is_none_or(|allowed| allowed.iter().any(|item| *item == name))
        })
        .map(|entry| entry.path().join("index.d.ts"))
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_of(path: &str, source: &str) -> AmbientIndex {
        let parsed = ParsedFile::parse(Path::new(path), Arc::from(source)).unwrap();
        let mut index = AmbientIndex::default();
        index.index_file(&parsed);
        index
    }

    #[test]
    fn script_declaration_files_are_global() {
        let index = index_of(
            "/lib/lib.dom.d.ts",
            "interface Console { log(...data: any[]): void; }\ndeclare var console: Console;\ndeclare function fetch(input: string): Promise<Response>;\n",
        );
        assert_eq!(index.lookup("console").len(), 1);
        assert_eq!(index.lookup("fetch").len(), 1);
        assert_eq!(index.lookup("Console").len(), 1);
        assert!(index.lookup("log").is_empty());
    }

    #[test]
    fn modules_only_contribute_declare_global() {
        let index = index_of(
            "/src/env.ts",
            "export const local = 1;\ndeclare global {\n  var appVersion: string;\n}\n",
        );
        assert!(index.lookup("local").is_empty());
        let found = index.lookup("appVersion");
        assert_eq!(found.len(), 1);
        assert!(!found[0].is_declaration_file());
    }
}
