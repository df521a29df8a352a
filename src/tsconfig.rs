use crate::error::{EngineError, EngineResult};
use crate::util;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const CONFIG_FILE_NAME: &str = "tsconfig.json";

/// Compiler options relevant to module resolution. Paths are absolute.
#[derive(Debug, Clone, Default)]
pub struct CompilerOptions {
    pub base_url: Option<PathBuf>,
    pub paths: Vec<PathAlias>,
    pub module_resolution: Option<String>,
    pub jsx: Option<String>,
    pub types: Option<Vec<String>>,
}

/// One `compilerOptions.paths` entry with targets already joined to their base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathAlias {
    pub pattern: String,
    pub targets: Vec<String>,
}

impl PathAlias {
    /// The text matched by `*`, or an empty string for an exact match.
    pub fn matches(&self, specifier: &str) -> Option<String> {
        if let Some((prefix, suffix)) = self.pattern.split_once('*') {
            if specifier.len() < prefix.len() + suffix.len()
                || !specifier.starts_with(prefix)
                || !specifier.ends_with(suffix)
            {
                return None;
            }
            return Some(specifier[prefix.len()..specifier.len() - suffix.len()].to_string());
        }
        (self.pattern == specifier).then(String::new)
    }

    fn prefix_len(&self) -> usize {
        self.pattern
            .split_once('*')
            .map(|(prefix, _)| prefix.len())
            .unwrap_or(usize::MAX)
    }
}

#[derive(Debug, Clone)]
pub struct TsConfig {
    pub path: PathBuf,
    pub dir: PathBuf,
    pub compiler_options: CompilerOptions,
    /// `include` patterns joined to the directory of the config that declared them.
    pub include: Vec<PathBuf>,
}

impl TsConfig {
    /// `baseUrl` when set, otherwise the config's own directory.
    pub fn base_url(&self) -> &Path {
        self.compiler_options
            .base_url
            .as_deref()
            .unwrap_or(&self.dir)
    }

    /// Aliases ordered so the most specific pattern is tried first.
    pub fn path_aliases(&self) -> Vec<&PathAlias> {
        let mut aliases: Vec<&PathAlias> = self.compiler_options.paths.iter().collect();
        aliases.sort_by(|a, b| b.prefix_len().cmp(&a.prefix_len()));
        aliases
    }

    /// Directories worth watching: the static part of each `include` pattern,
    /// falling back to `<root>/src` or the root itself.
    pub fn watch_roots(&self, project_root: &Path) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = Vec::new();
        for pattern in &self.include {
            let mut base = PathBuf::new();
            for comp in pattern.components() {
                let text = comp.as_os_str().to_string_lossy();
                if text.contains('*') || text.contains('?') {
                    break;
                }
                base.push(comp.as_os_str());
            }
            if base.is_file() {
                base.pop();
            }
            if base.is_dir() && !roots.contains(&base) {
                roots.push(base);
            }
        }
        let nested: Vec<PathBuf> = roots
            .iter()
            .filter(|root| {
                roots
                    .iter()
                    .any(|other| other != *root && root.starts_with(other))
            })
            .cloned()
            .collect();
        roots.retain(|root| !nested.contains(root));
        if roots.is_empty() {
            let src = project_root.join("src");
            roots.push(if src.is_dir() {
                src
            } else {
                project_root.to_path_buf()
            });
        }
        roots
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Extends {
    One(String),
    Many(Vec<String>),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTsConfig {
    extends: Option<Extends>,
    compiler_options: Option<RawCompilerOptions>,
    include: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCompilerOptions {
    base_url: Option<String>,
    paths: Option<serde_json::Map<String, Value>>,
    module_resolution: Option<String>,
    jsx: Option<String>,
    types: Option<Vec<String>>,
}

/// Where the upward search for `tsconfig.json` starts: `<root>/src` if present, else the root.
pub fn config_search_start(project_root: &Path) -> PathBuf {
    let src = project_root.join("src");
    if src.is_dir() {
        src
    } else {
        project_root.to_path_buf()
    }
}

pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find(|candidate| candidate.is_file())
}

/// Locate and load the project's `tsconfig.json`. A missing config is fatal.
pub fn load_project_config(project_root: &Path) -> EngineResult<TsConfig> {
    let start = config_search_start(project_root);
    let path = find_config_file(&start).ok_or_else(|| EngineError::ConfigNotFound {
        searched_from: start.clone(),
    })?;
    debug!(config = %path.display(), "using tsconfig");
    load_config(&path)
}

pub fn load_config(path: &Path) -> EngineResult<TsConfig> {
    let mut visiting = HashSet::new();
    load_chain(path, &mut visiting)
}

fn load_chain(path: &Path, visiting: &mut HashSet<PathBuf>) -> EngineResult<TsConfig> {
    let path = util::canonical_path(path);
    if !visiting.insert(path.clone()) {
        return Err(EngineError::ConfigParse {
            path,
            message: "circular extends".to_string(),
        });
    }
    let raw_text = fs::read_to_string(&path).map_err(|err| EngineError::io(&path, err))?;
    let raw: RawTsConfig =
        serde_json::from_str(&strip_jsonc(&raw_text)).map_err(|err| EngineError::ConfigParse {
            path: path.clone(),
            message: err.to_string(),
        })?;
    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let parents = match raw.extends {
        Some(Extends::One(spec)) => vec![spec],
        Some(Extends::Many(specs)) => specs,
        None => Vec::new(),
    };
    let mut config = TsConfig {
        path: path.clone(),
        dir: dir.clone(),
        compiler_options: CompilerOptions::default(),
        include: Vec::new(),
    };
    for spec in parents {
        let parent_path =
            resolve_extends(&dir, &spec).ok_or_else(|| EngineError::ConfigParse {
                path: path.clone(),
                message: format!("cannot resolve extends {spec:?}"),
            })?;
        let parent = load_chain(&parent_path, visiting)?;
        overlay(&mut config, parent);
    }
    config.path = path;
    config.dir = dir.clone();

    if let Some(options) = raw.compiler_options {
        let compiler = &mut config.compiler_options;
        if let Some(base_url) = options.base_url {
            compiler.base_url = Some(util::clean_path(&dir.join(base_url)));
        }
        if let Some(paths) = options.paths {
            let base = compiler.base_url.clone().unwrap_or_else(|| dir.clone());
            compiler.paths = paths
                .into_iter()
                .map(|(pattern, targets)| PathAlias {
                    pattern,
                    targets: targets
                        .as_array()
                        .map(|items| {
                            items
                                .iter()
                                .filter_map(Value::as_str)
                                .map(|target| {
                                    util::clean_path(&base.join(target))
                                        .to_string_lossy()
                                        .to_string()
                                })
                                .collect()
                        })
                        .unwrap_or_default(),
                })
                .collect();
        }
        if options.module_resolution.is_some() {
            compiler.module_resolution = options.module_resolution;
        }
        if options.jsx.is_some() {
            compiler.jsx = options.jsx;
        }
        if options.types.is_some() {
            compiler.types = options.types;
        }
    }
    if let Some(include) = raw.include {
        config.include = include
            .iter()
            .map(|pattern| util::clean_path(&dir.join(pattern)))
            .collect();
    }
    Ok(config)
}

fn overlay(config: &mut TsConfig, parent: TsConfig) {
    let compiler = &mut config.compiler_options;
    let inherited = parent.compiler_options;
    if inherited.base_url.is_some() {
        compiler.base_url = inherited.base_url;
    }
    if !inherited.paths.is_empty() {
        compiler.paths = inherited.paths;
    }
    if inherited.module_resolution.is_some() {
        compiler.module_resolution = inherited.module_resolution;
    }
    if inherited.jsx.is_some() {
        compiler.jsx = inherited.jsx;
    }
    if inherited.types.is_some() {
        compiler.types = inherited.types;
    }
    if !parent.include.is_empty() {
        config.include = parent.include;
    }
}

fn resolve_extends(dir: &Path, spec: &str) -> Option<PathBuf> {
    let spec = spec.trim();
    if spec.is_empty() {
        return None;
    }
    if spec.starts_with('.') || Path::new(spec).is_absolute() {
        return config_candidate(&dir.join(spec));
    }
    for ancestor in dir.ancestors() {
        let base = ancestor.join("node_modules").join(spec);
        if let Some(found) = config_candidate(&base) {
            return Some(found);
        }
    }
    None
}

fn config_candidate(candidate: &Path) -> Option<PathBuf> {
    if candidate.is_file() {
        return Some(candidate.to_path_buf());
    }
    if candidate.is_dir() {
        let nested = candidate.join(CONFIG_FILE_NAME);
        return nested.is_file().then_some(nested);
    }
    let with_json = PathBuf::from(format!("{}.json", candidate.display()));
    with_json.is_file().then_some(with_json)
}

/// Turn JSON-with-comments into plain JSON: drops `//` and `/* */` comments and
/// trailing commas, leaving string contents untouched.
pub fn strip_jsonc(input: &str) -> String {
    let without_comments = strip_comments(input);
    strip_trailing_commas(&without_comments)
}

fn strip_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    while let Some(ch) = chars.next() {
        if in_string {
            out.push(ch);
            if ch == '\\' {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            '/' if chars.peek() == Some(&'/') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                    }
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            _ => out.push(ch),
        }
    }
    out
}

fn strip_trailing_commas(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut idx = 0;
    while idx < chars.len() {
        let ch = chars[idx];
        if in_string {
            out.push(ch);
            if ch == '\\' {
                if let Some(escaped) = chars.get(idx + 1) {
                    out.push(*escaped);
                    idx += 1;
                }
            } else if ch == '"' {
                in_string = false;
            }
            idx += 1;
            continue;
        }
        if ch == '"' {
            in_string = true;
        } else if ch == ',' {
            let next = chars[idx + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                idx += 1;
                continue;
            }
        }
        out.push(ch);
        idx += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_jsonc_removes_comments_and_trailing_commas() {
        let input = r#"{
  // compiler settings
  "compilerOptions": {
    "baseUrl": ".", /* inline */
    "paths": { "@/*": ["src/*",], },
  },
  "include": ["src/**/*", "http://not-a-comment"],
}"#;
        let value: Value = serde_json::from_str(&strip_jsonc(input)).unwrap();
        assert_eq!(value["compilerOptions"]["baseUrl"], ".");
        assert_eq!(value["compilerOptions"]["paths"]["@/*"][0], "src/*");
        assert_eq!(value["include"][1], "http://not-a-comment");
    }

    #[test]
    fn strip_jsonc_keeps_commas_inside_strings() {
        let input = r#"{"a": "x,}", "b": [1, 2,]}"#;
        let value: Value = serde_json::from_str(&strip_jsonc(input)).unwrap();
        assert_eq!(value["a"], "x,}");
        assert_eq!(value["b"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn path_alias_matching() {
        let alias = PathAlias {
            pattern: "@lib/*".to_string(),
            targets: vec!["/p/src/lib/*".to_string()],
        };
        assert_eq!(alias.matches("@lib/db/client"), Some("db/client".to_string()));
        assert_eq!(alias.matches("@other/x"), None);
        let exact = PathAlias {
            pattern: "config".to_string(),
            targets: vec!["/p/src/config.ts".to_string()],
        };
        assert_eq!(exact.matches("config"), Some(String::new()));
        assert_eq!(exact.matches("configs"), None);
    }
}
