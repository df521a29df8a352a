//! Module specifier resolution: relative paths, tsconfig `paths` and `baseUrl`, then
//! `node_modules` packages (including `@types`).

use crate::tsconfig::TsConfig;
use crate::util;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Whether a lookup wants the runtime source or the type declarations of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    Source,
    Types,
}

const SOURCE_EXTENSIONS: &[&str] = &[
    "ts", "tsx", "mts", "cts", "js", "jsx", "mjs", "cjs", "d.ts",
];
const TYPES_EXTENSIONS: &[&str] = &[
    "ts", "tsx", "d.ts", "mts", "cts", "d.mts", "d.cts", "js", "jsx", "mjs", "cjs",
];
const PACKAGE_SOURCE_FIELDS: &[&str] = &["module", "main"];
const PACKAGE_TYPES_FIELDS: &[&str] = &["types", "typings"];
const EXPORT_SOURCE_CONDITIONS: &[&str] = &["import", "module", "require", "node", "default"];
const EXPORT_TYPES_CONDITIONS: &[&str] = &["types", "import", "require", "default"];

pub fn resolve_module(
    config: &TsConfig,
    from_file: &Path,
    specifier: &str,
    mode: ResolveMode,
) -> Option<PathBuf> {
    let specifier = specifier
        .split(['?', '#'])
        .next()
        .unwrap_or(specifier)
        .trim();
    if specifier.is_empty() {
        return None;
    }
    let base_dir = from_file.parent().unwrap_or_else(|| Path::new("."));
    let found = if is_relative(specifier) {
        resolve_path(&base_dir.join(specifier), mode)
    } else {
        resolve_alias(config, specifier, mode)
            .or_else(|| {
                config
                    .compiler_options
                    .base_url
                    .as_ref()
                    .and_then(|base| resolve_path(&base.join(specifier), mode))
            })
            .or_else(|| resolve_package(base_dir, specifier, mode))
    };
    found.map(|path| util::canonical_path(&path))
}

fn is_relative(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier.starts_with('/')
}

fn resolve_alias(config: &TsConfig, specifier: &str, mode: ResolveMode) -> Option<PathBuf> {
    for alias in config.path_aliases() {
        let Some(wildcard) = alias.matches(specifier) else {
            continue;
        };
        for target in &alias.targets {
            let candidate = target.replace('*', &wildcard);
            if let Some(found) = resolve_path(Path::new(&candidate), mode) {
                return Some(found);
            }
        }
    }
    None
}

/// Resolve a path that names a file (with or without extension) or a directory.
fn resolve_path(candidate: &Path, mode: ResolveMode) -> Option<PathBuf> {
    let candidate = util::clean_path(candidate);
    resolve_file(&candidate, mode).or_else(|| resolve_directory(&candidate, mode))
}

fn resolve_file(candidate: &Path, mode: ResolveMode) -> Option<PathBuf> {
    if candidate.is_file() {
        if mode == ResolveMode::Source || !is_script(candidate) {
            return Some(candidate.to_path_buf());
        }
    }
    let raw = candidate.to_string_lossy();
    // `./util.js` written for ESM output usually means `./util.ts`
    for (js, ts_candidates) in [
        (".js", &[".ts", ".tsx", ".d.ts"][..]),
        (".jsx", &[".tsx"][..]),
        (".mjs", &[".mts", ".d.mts"][..]),
        (".cjs", &[".cts", ".d.cts"][..]),
    ] {
        if let Some(stem) = raw.strip_suffix(js) {
            for ext in ts_candidates {
                let swapped = PathBuf::from(format!("{stem}{ext}"));
                if swapped.is_file() {
                    return Some(swapped);
                }
            }
        }
    }
    if candidate.is_file() {
        return Some(candidate.to_path_buf());
    }
    let extensions = match mode {
        ResolveMode::Source => SOURCE_EXTENSIONS,
        ResolveMode::Types => TYPES_EXTENSIONS,
    };
    extensions
        .iter()
        .map(|ext| PathBuf::from(format!("{raw}.{ext}")))
        .find(|path| path.is_file())
}

fn is_script(path: &Path) -> bool {
    let name = path.to_string_lossy();
    [".js", ".jsx", ".mjs", ".cjs"]
        .iter()
        .any(|ext| name.ends_with(ext))
}

fn resolve_directory(dir: &Path, mode: ResolveMode) -> Option<PathBuf> {
    if !dir.is_dir() {
        return None;
    }
    if let Some(found) = resolve_manifest_entry(dir, mode) {
        return Some(found);
    }
    resolve_file(&dir.join("index"), mode)
}

fn resolve_package(from_dir: &Path, specifier: &str, mode: ResolveMode) -> Option<PathBuf> {
    let (name, subpath) = split_package_specifier(specifier)?;
    for ancestor in from_dir.ancestors() {
        let modules = ancestor.join("node_modules");
        if !modules.is_dir() {
            continue;
        }
        let package_dir = modules.join(&name);
        if package_dir.is_dir() {
            let found = match &subpath {
                Some(sub) => resolve_path(&package_dir.join(sub), mode),
                None => resolve_manifest_entry(&package_dir, mode)
                    .or_else(|| resolve_file(&package_dir.join("index"), mode)),
            };
            if let Some(found) = found {
                return Some(found);
            }
        }
        if mode == ResolveMode::Types {
            let types_dir = modules.join("@types").join(types_package_name(&name));
            if types_dir.is_dir() {
                let found = match &subpath {
                    Some(sub) => resolve_path(&types_dir.join(sub), mode),
                    None => resolve_directory(&types_dir, mode),
                };
                if found.is_some() {
                    return found;
                }
            }
        }
    }
    None
}

/// `@scope/pkg/sub/path` splits into (`@scope/pkg`, `sub/path`).
pub fn split_package_specifier(specifier: &str) -> Option<(String, Option<String>)> {
    let mut parts = specifier.split('/');
    let first = parts.next()?;
    if first.is_empty() {
        return None;
    }
    let name = if first.starts_with('@') {
        let second = parts.next()?;
        format!("{first}/{second}")
    } else {
        first.to_string()
    };
    let rest: Vec<&str> = parts.collect();
    let subpath = if rest.is_empty() {
        None
    } else {
        Some(rest.join("/"))
    };
    Some((name, subpath))
}

/// `@scope/pkg` is published to DefinitelyTyped as `@types/scope__pkg`.
fn types_package_name(name: &str) -> String {
    match name.strip_prefix('@') {
        Some(scoped) => scoped.replacen('/', "__", 1),
        None => name.to_string(),
    }
}

fn resolve_manifest_entry(package_dir: &Path, mode: ResolveMode) -> Option<PathBuf> {
    let raw = fs::read_to_string(package_dir.join("package.json")).ok()?;
    let manifest: Value = serde_json::from_str(&raw).ok()?;
    let mut entries: Vec<String> = Vec::new();
    if let Some(exports) = manifest.get("exports") {
        if let Some(entry) = export_entry(exports, mode) {
            entries.push(entry);
        }
    }
    let (primary, secondary) = match mode {
        ResolveMode::Source => (PACKAGE_SOURCE_FIELDS, PACKAGE_TYPES_FIELDS),
        ResolveMode::Types => (PACKAGE_TYPES_FIELDS, PACKAGE_SOURCE_FIELDS),
    };
    for field in primary.iter().chain(secondary.iter()) {
        if let Some(value) = manifest.get(*field).and_then(Value::as_str) {
            entries.push(value.to_string());
        }
    }
    entries
        .iter()
        .find_map(|entry| resolve_path(&package_dir.join(entry), mode))
}

fn export_entry(exports: &Value, mode: ResolveMode) -> Option<String> {
    match exports {
        Value::String(entry) => Some(entry.clone()),
        Value::Object(map) => {
            if let Some(root) = map.get(".") {
                return export_entry(root, mode);
            }
            let conditions = match mode {
                ResolveMode::Source => EXPORT_SOURCE_CONDITIONS,
                ResolveMode::Types => EXPORT_TYPES_CONDITIONS,
            };
            conditions
                .iter()
                .find_map(|condition| map.get(*condition).and_then(|v| export_entry(v, mode)))
        }
        Value::Array(items) => items.iter().find_map(|item| export_entry(item, mode)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_scoped_and_plain_specifiers() {
        assert_eq!(
            split_package_specifier("@hono/zod-openapi"),
            Some(("@hono/zod-openapi".to_string(), None))
        );
        assert_eq!(
            split_package_specifier("hono/cors"),
            Some(("hono".to_string(), Some("cors".to_string())))
        );
        assert_eq!(split_package_specifier(""), None);
    }

    #[test]
    fn types_names_are_mangled_for_scopes() {
        assert_eq!(types_package_name("@scope/pkg"), "scope__pkg");
        assert_eq!(types_package_name("left-pad"), "left-pad");
    }

    #[test]
    fn export_conditions_follow_mode() {
        let exports = serde_json::json!({
            ".": { "types": "./dist/index.d.ts", "import": "./dist/index.mjs" }
        });
        assert_eq!(
            export_entry(&exports, ResolveMode::Types).as_deref(),
            Some("./dist/index.d.ts")
        );
        assert_eq!(
            export_entry(&exports, ResolveMode::Source).as_deref(),
            Some("./dist/index.mjs")
        );
    }
}
