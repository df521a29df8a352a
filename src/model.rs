use crate::util;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Zero-based line and UTF-16 character, as used by the LSP.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

/// A resolved declaration location, optionally carrying its source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    pub uri: String,
    pub range: Range,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Definition {
    pub fn new(uri: String, range: Range) -> Self {
        Self {
            uri,
            range,
            text: None,
        }
    }

    pub fn path(&self) -> Option<PathBuf> {
        util::uri_to_path(&self.uri)
    }

    pub fn is_declaration_file(&self) -> bool {
        util::is_declaration_file(&self.uri)
    }

    pub fn is_in_node_modules(&self) -> bool {
        self.uri.contains("/node_modules/")
    }

    /// Identity used for cycle detection during expansion.
    pub fn key(&self) -> String {
        format!(
            "{}@{}:{}",
            self.uri, self.range.start.line, self.range.start.character
        )
    }
}

/// A file held by the version store. `content` and `version` always belong together.
#[derive(Debug, Clone)]
pub struct TrackedFile {
    pub path: PathBuf,
    pub content: Arc<str>,
    pub version: u64,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    Added { path: PathBuf, content: Arc<str> },
    Updated {
        path: PathBuf,
        content: Arc<str>,
        version: u64,
    },
    Removed { path: PathBuf },
}

impl FileEvent {
    pub fn path(&self) -> &Path {
        match self {
            FileEvent::Added { path, .. }
            | FileEvent::Updated { path, .. }
            | FileEvent::Removed { path } => path,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    All,
}

impl HttpMethod {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "get" => Some(HttpMethod::Get),
            "post" => Some(HttpMethod::Post),
            "put" => Some(HttpMethod::Put),
            "delete" => Some(HttpMethod::Delete),
            "patch" => Some(HttpMethod::Patch),
            "options" => Some(HttpMethod::Options),
            "all" => Some(HttpMethod::All),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "get",
            HttpMethod::Post => "post",
            HttpMethod::Put => "put",
            HttpMethod::Delete => "delete",
            HttpMethod::Patch => "patch",
            HttpMethod::Options => "options",
            HttpMethod::All => "all",
        }
    }

    pub fn accepts(self, method: &str) -> bool {
        self == HttpMethod::All || self.as_str().eq_ignore_ascii_case(method)
    }
}

/// One registration inside a router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Entry {
    Route {
        id: String,
        method: HttpMethod,
        path: String,
    },
    Middleware {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Reference {
        id: String,
        target_id: String,
        path: String,
        name: String,
    },
}

impl Entry {
    pub fn id(&self) -> &str {
        match self {
            Entry::Route { id, .. } | Entry::Middleware { id, .. } | Entry::Reference { id, .. } => {
                id
            }
        }
    }

    pub fn target_id(&self) -> Option<&str> {
        match self {
            Entry::Reference { target_id, .. } => Some(target_id),
            _ => None,
        }
    }
}

/// A router declaration and everything registered on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceNode {
    /// `<relativeFilePath>@<utf16Offset>` of the declared name.
    pub id: String,
    pub name: String,
    pub file: String,
    pub position: usize,
    #[serde(default)]
    pub base_path: String,
    pub entries: Vec<Entry>,
}

impl ResourceNode {
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(Entry::target_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexityStat {
    pub base_count: usize,
    pub total_count: usize,
    pub references: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutOfScopeIdentifier {
    pub name: String,
    pub position: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextEntryType {
    Function,
    Unknown,
}

/// Why an expansion stopped before reaching a function's body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Truncation {
    Cycle,
    Depth,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandedFunctionContextEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ContextEntryType,
    pub position: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<Definition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ExpandedFunctionContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncated: Option<Truncation>,
}

pub type ExpandedFunctionContext = Vec<ExpandedFunctionContextEntry>;

/// Expansion of one target function. Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpandedFunctionResult {
    pub file: String,
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
    pub context: ExpandedFunctionContext,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entries_serialize_as_tagged_union() {
        let entry = Entry::Reference {
            id: "src/app.ts@120".to_string(),
            target_id: "src/users.ts@13".to_string(),
            path: "/users".to_string(),
            name: "users".to_string(),
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["type"], "reference");
        assert_eq!(value["targetId"], "src/users.ts@13");

        let route: Entry = serde_json::from_value(json!({
            "type": "route",
            "id": "src/app.ts@40",
            "method": "get",
            "path": "/"
        }))
        .unwrap();
        assert_eq!(route.target_id(), None);
    }

    #[test]
    fn expanded_result_uses_camel_case_lines() {
        let result = ExpandedFunctionResult {
            file: "src/app.ts".to_string(),
            start_line: 1,
            start_column: 1,
            end_line: 3,
            end_column: 2,
            context: vec![ExpandedFunctionContextEntry {
                name: "helper".to_string(),
                kind: ContextEntryType::Function,
                position: Position::new(1, 9),
                definition: None,
                package: None,
                context: None,
                truncated: Some(Truncation::Cycle),
            }],
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["startLine"], 1);
        assert_eq!(value["endColumn"], 2);
        assert_eq!(value["context"][0]["type"], "function");
        assert_eq!(value["context"][0]["truncated"], "cycle");
        assert!(value["context"][0].get("package").is_none());
    }

    #[test]
    fn http_method_all_accepts_everything() {
        assert!(HttpMethod::All.accepts("PATCH"));
        assert!(HttpMethod::Get.accepts("GET"));
        assert!(!HttpMethod::Get.accepts("post"));
        assert_eq!(HttpMethod::from_name("DELETE"), Some(HttpMethod::Delete));
        assert_eq!(HttpMethod::from_name("head"), None);
    }
}
