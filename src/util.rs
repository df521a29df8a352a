use crate::model::Position;
use anyhow::{Context, Result};
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Characters escaped in `file://` URIs, matching what language servers emit.
const URI_PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

const DECLARATION_SUFFIXES: &[&str] = &[".d.ts", ".d.mts", ".d.cts"];

pub fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

pub fn normalize_rel_path(repo_root: &Path, path: &Path) -> Result<String> {
    let rel = path.strip_prefix(repo_root).with_context(|| {
        format!(
            "strip prefix {} from {}",
            repo_root.display(),
            path.display()
        )
    })?;
    Ok(normalize_path(rel))
}

pub fn normalize_path(path: &Path) -> String {
    let mut parts = Vec::new();
    for comp in path.components() {
        match comp {
            Component::Normal(os) => parts.push(os.to_string_lossy().to_string()),
            Component::ParentDir => parts.push("..".to_string()),
            Component::CurDir => {}
            _ => {}
        }
    }
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

/// Relative path when `path` lives under `root`, otherwise the path as given.
pub fn display_rel_path(root: &Path, path: &Path) -> String {
    normalize_rel_path(root, path).unwrap_or_else(|_| path.to_string_lossy().replace('\\', "/"))
}

/// Lexically resolve `.` and `..` without touching the filesystem.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonical form used as the key for tracked files.
///
/// Deleted files cannot be canonicalized, so the parent directory is resolved instead.
pub fn canonical_path(path: &Path) -> PathBuf {
    if let Ok(value) = fs::canonicalize(path) {
        return value;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => match fs::canonicalize(parent) {
            Ok(parent) => parent.join(name),
            Err(_) => clean_path(path),
        },
        _ => clean_path(path),
    }
}

pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    extensions
        .iter()
        .any(|ext| name.len() > ext.len() + 1 && name.ends_with(&format!(".{ext}")))
}

pub fn is_declaration_file(path: &str) -> bool {
    DECLARATION_SUFFIXES
        .iter()
        .any(|suffix| path.ends_with(suffix))
}

pub fn path_to_uri(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    let encoded = utf8_percent_encode(&raw, URI_PATH).to_string();
    if encoded.starts_with('/') {
        format!("file://{encoded}")
    } else {
        format!("file:///{encoded}")
    }
}

pub fn uri_to_path(uri: &str) -> Option<PathBuf> {
    let rest = uri.strip_prefix("file://")?;
    let decoded = percent_decode_str(rest).decode_utf8().ok()?;
    let decoded = decoded.as_ref();
    // file:///C:/x on Windows
    let trimmed = match decoded.as_bytes() {
        [b'/', drive, b':', ..] if drive.is_ascii_alphabetic() => &decoded[1..],
        _ => decoded,
    };
    Some(PathBuf::from(trimmed))
}

/// Line starts of a text, for converting between byte offsets and LSP positions.
///
/// Positions are zero-based and measure `character` in UTF-16 code units.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        for (idx, byte) in text.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(idx + 1);
            }
        }
        Self {
            line_starts,
            len: text.len(),
        }
    }

    pub fn position(&self, text: &str, offset: usize) -> Position {
        let offset = floor_char_boundary(text, offset.min(self.len));
        let line = self
            .line_starts
            .partition_point(|start| *start <= offset)
            .saturating_sub(1);
        let start = self.line_starts[line];
        let character = text
            .get(start..offset)
            .map(|slice| slice.encode_utf16().count())
            .unwrap_or(0);
        Position {
            line: line as u32,
            character: character as u32,
        }
    }

    /// Byte offset of `position`, clamped to the end of its line.
    pub fn offset(&self, text: &str, position: Position) -> Option<usize> {
        let start = *self.line_starts.get(position.line as usize)?;
        let end = self
            .line_starts
            .get(position.line as usize + 1)
            .copied()
            .unwrap_or(self.len);
        let line = text.get(start..end)?;
        let mut units = 0usize;
        for (idx, ch) in line.char_indices() {
            if units >= position.character as usize || ch == '\n' || ch == '\r' {
                return Some(start + idx);
            }
            units += ch.len_utf16();
        }
        Some(end)
    }
}

/// Number of UTF-16 code units before `offset`.
pub fn utf16_offset(text: &str, offset: usize) -> usize {
    let offset = floor_char_boundary(text, offset.min(text.len()));
    text[..offset].encode_utf16().count()
}

fn floor_char_boundary(text: &str, mut offset: usize) -> usize {
    while offset > 0 && !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_index_counts_utf16_units() {
        let text = "const a = 1;\nconst é😀 = b;\n";
        let index = LineIndex::new(text);
        let b_offset = text.find('b').unwrap();
        let pos = index.position(text, b_offset);
        assert_eq!(pos.line, 1);
        // "const " (6) + é (1) + 😀 (2) + " = " (3)
        assert_eq!(pos.character, 12);
        assert_eq!(index.offset(text, pos), Some(b_offset));
    }

    #[test]
    fn line_index_clamps_past_line_end() {
        let text = "ab\ncd";
        let index = LineIndex::new(text);
        assert_eq!(
            index.offset(
                text,
                Position {
                    line: 0,
                    character: 40
                }
            ),
            Some(2)
        );
        assert_eq!(
            index.offset(
                text,
                Position {
                    line: 5,
                    character: 0
                }
            ),
            None
        );
    }

    #[test]
    fn uri_round_trip_escapes_spaces() {
        let path = PathBuf::from("/tmp/my project/src/app.ts");
        let uri = path_to_uri(&path);
        assert_eq!(uri, "file:///tmp/my%20project/src/app.ts");
        assert_eq!(uri_to_path(&uri), Some(path));
        assert_eq!(uri_to_path("untitled:1"), None);
    }

    #[test]
    fn declaration_files_and_extensions() {
        assert!(is_declaration_file("/x/node_modules/typescript/lib/lib.dom.d.ts"));
        assert!(!is_declaration_file("/x/src/app.ts"));
        let exts = vec!["ts".to_string(), "tsx".to_string()];
        assert!(has_extension(Path::new("src/app.tsx"), &exts));
        assert!(has_extension(Path::new("src/types.d.ts"), &exts));
        assert!(!has_extension(Path::new("src/app.js"), &exts));
        assert!(!has_extension(Path::new(".ts"), &exts));
    }

    #[test]
    fn clean_path_resolves_parent_components() {
        assert_eq!(
            clean_path(Path::new("/a/b/../c/./d.ts")),
            PathBuf::from("/a/c/d.ts")
        );
    }
}
