//! Tree-sitter parsing of TypeScript, TSX and JavaScript sources.

pub mod nodes;
pub mod scope;

use crate::model::{Position, Range};
use crate::util::{self, LineIndex};
use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tree_sitter::{Node, Parser, Tree};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLanguage {
    TypeScript,
    Tsx,
    JavaScript,
}

impl SourceLanguage {
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let ext = name.rsplit('.').next()?;
        match ext {
            "ts" | "mts" | "cts" => Some(SourceLanguage::TypeScript),
            "tsx" => Some(SourceLanguage::Tsx),
            "js" | "jsx" | "mjs" | "cjs" => Some(SourceLanguage::JavaScript),
            _ => None,
        }
    }

    fn grammar(self) -> tree_sitter::Language {
        match self {
            SourceLanguage::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            SourceLanguage::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            SourceLanguage::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
        }
    }
}

/// A parsed source file together with the text and line table it was parsed from.
pub struct ParsedFile {
    pub path: PathBuf,
    pub language: SourceLanguage,
    pub source: Arc<str>,
    pub lines: LineIndex,
    tree: Tree,
}

impl std::fmt::Debug for ParsedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedFile")
            .field("path", &self.path)
            .field("language", &self.language)
            .finish()
    }
}

impl ParsedFile {
    pub fn parse(path: &Path, source: Arc<str>) -> Result<Self> {
        // JSX is legal in .js files, and TS files without a known extension parse as TS.
        let language = SourceLanguage::from_path(path).unwrap_or(SourceLanguage::TypeScript);
        Self::parse_as(path, source, language)
    }

    pub fn parse_as(path: &Path, source: Arc<str>, language: SourceLanguage) -> Result<Self> {
        let mut parser = Parser::new();
        parser.set_language(&language.grammar())?;
        let tree = parser
            .parse(source.as_bytes(), None)
            .ok_or_else(|| anyhow!("parse {} produced no tree", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            language,
            lines: LineIndex::new(&source),
            source,
            tree,
        })
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn has_errors(&self) -> bool {
        self.tree.root_node().has_error()
    }

    pub fn uri(&self) -> String {
        util::path_to_uri(&self.path)
    }

    pub fn text(&self, node: Node<'_>) -> &str {
        self.source
            .get(node.start_byte()..node.end_byte())
            .unwrap_or("")
    }

    pub fn position(&self, offset: usize) -> Position {
        self.lines.position(&self.source, offset)
    }

    pub fn range(&self, node: Node<'_>) -> Range {
        Range {
            start: self.position(node.start_byte()),
            end: self.position(node.end_byte()),
        }
    }

    pub fn offset(&self, position: Position) -> Option<usize> {
        self.lines.offset(&self.source, position)
    }

    /// UTF-16 offset of a byte offset, the unit route ids are expressed in.
    pub fn utf16_offset(&self, offset: usize) -> usize {
        util::utf16_offset(&self.source, offset)
    }

    /// Identifier-like node at `position`, also accepting a cursor just past its end.
    pub fn identifier_at(&self, position: Position) -> Option<Node<'_>> {
        let offset = self.offset(position)?;
        let root = self.root();
        let candidates = [
            root.named_descendant_for_byte_range(offset, offset),
            offset
                .checked_sub(1)
                .and_then(|prev| root.named_descendant_for_byte_range(prev, prev)),
        ];
        candidates
            .into_iter()
            .flatten()
            .find(|node| nodes::is_identifier_kind(node.kind()))
    }

    /// Innermost node within `start..end` accepted by `accept`, searching outward from the
    /// smallest node covering the range.
    pub fn node_within<F>(&self, start: usize, end: usize, accept: F) -> Option<Node<'_>>
    where
        F: Fn(&Node<'_>) -> bool,
    {
        let mut current = self.root().descendant_for_byte_range(start, end);
        while let Some(node) = current {
            if node.start_byte() < start || node.end_byte() > end {
                return None;
            }
            if accept(&node) {
                return Some(node);
            }
            current = node.parent();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_from_extension() {
        assert_eq!(
            SourceLanguage::from_path(Path::new("a/b.tsx")),
            Some(SourceLanguage::Tsx)
        );
        assert_eq!(
            SourceLanguage::from_path(Path::new("lib.dom.d.ts")),
            Some(SourceLanguage::TypeScript)
        );
        assert_eq!(
            SourceLanguage::from_path(Path::new("index.mjs")),
            Some(SourceLanguage::JavaScript)
        );
        assert_eq!(SourceLanguage::from_path(Path::new("README.md")), None);
    }

    #[test]
    fn identifier_at_accepts_end_of_word() {
        let source: Arc<str> = Arc::from("const value = other;\n");
        let parsed = ParsedFile::parse(Path::new("a.ts"), source).unwrap();
        let start = parsed.identifier_at(Position::new(0, 14)).unwrap();
        assert_eq!(parsed.text(start), "other");
        let end = parsed.identifier_at(Position::new(0, 19)).unwrap();
        assert_eq!(parsed.text(end), "other");
        assert!(!parsed.has_errors());
    }
}
