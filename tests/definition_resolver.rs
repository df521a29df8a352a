use livescope::analysis::{Classification, DefinitionResolver, LocatedDefinition};
use livescope::model::Position;
use livescope::util;
use livescope::{BridgeMode, Project};
use std::fs;
use std::path::{Path, PathBuf};

fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

/// Position of the first `needle` on `line` of `source`.
fn at(source: &str, line: u32, needle: &str) -> Position {
    let text = source.lines().nth(line as usize).unwrap();
    Position::new(line, text.find(needle).unwrap() as u32)
}

const MAIN: &str = r#"import leftPad from "left-pad";
import { log } from "@acme/logger";
import { helper } from "./util";

export function run(input: string) {
  const parsed = JSON.parse(input);
  log(leftPad(parsed.name, 8), APP_VERSION);
  return helper(mystery);
}
"#;

fn fixture() -> (tempfile::TempDir, Project, String) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "tsconfig.json", "{}");
    write(
        root,
        "node_modules/left-pad/package.json",
        r#"{ "name": "left-pad", "main": "index.js" }"#,
    );
    write(
        root,
        "node_modules/left-pad/index.js",
        "module.exports = function leftPad(str, len) { return str; };\n",
    );
    write(
        root,
        "node_modules/@acme/logger/package.json",
        r#"{ "name": "@acme/logger", "main": "dist/index.js" }"#,
    );
    write(
        root,
        "node_modules/@acme/logger/dist/index.js",
        "export function log(...args) {\n  console.log(...args);\n}\n",
    );
    write(
        root,
        "node_modules/typescript/lib/lib.es5.d.ts",
        "interface JSON {\n  parse(text: string): any;\n}\ndeclare var JSON: JSON;\n",
    );
    write(root, "src/globals.d.ts", "declare const APP_VERSION: string;\n");
    write(
        root,
        "src/util.ts",
        "export function helper(value: unknown) {\n  return String(value);\n}\n",
    );
    let main = write(root, "src/main.ts", MAIN);
    let project = Project::open(root, BridgeMode::InProcess).unwrap();
    let uri = util::path_to_uri(&util::canonical_path(&main));
    (dir, project, uri)
}

#[test]
fn flat_package_is_a_dependency() {
    let (_dir, project, uri) = fixture();
    let resolver = DefinitionResolver::new(project.bridge().as_ref());
    match resolver.resolve(&uri, at(MAIN, 6, "leftPad")) {
        Classification::Dependency {
            definition,
            package,
        } => {
            assert_eq!(package, "left-pad");
            assert!(definition.is_in_node_modules());
        }
        other => panic!("expected dependency, got {other:?}"),
    }
}

#[test]
fn scoped_package_keeps_its_scope() {
    let (_dir, project, uri) = fixture();
    let resolver = DefinitionResolver::new(project.bridge().as_ref());
    match resolver.resolve(&uri, at(MAIN, 6, "log(")) {
        Classification::Dependency {
            definition,
            package,
        } => {
            assert_eq!(package, "@acme/logger");
            let located: LocatedDefinition = resolver.locate(&definition).unwrap();
            let text = located.definition.text.unwrap();
            assert!(text.starts_with("export function log"), "{text}");
        }
        other => panic!("expected dependency, got {other:?}"),
    }
}

#[test]
fn lib_and_project_declarations_are_standard_globals() {
    let (_dir, project, uri) = fixture();
    let resolver = DefinitionResolver::new(project.bridge().as_ref());
    assert_eq!(
        resolver.resolve(&uri, at(MAIN, 5, "JSON")),
        Classification::StandardGlobal
    );
    assert_eq!(
        resolver.resolve(&uri, at(MAIN, 6, "APP_VERSION")),
        Classification::StandardGlobal
    );
}

#[test]
fn project_imports_are_local_and_located() {
    let (_dir, project, uri) = fixture();
    let resolver = DefinitionResolver::new(project.bridge().as_ref());
    let Classification::Local(definition) = resolver.resolve(&uri, at(MAIN, 7, "helper")) else {
        panic!("expected a local definition");
    };
    assert!(definition.uri.ends_with("/src/util.ts"));
    assert_eq!(definition.range.start, Position::new(0, 16));
    let located = resolver.locate(&definition).unwrap();
    assert!(located.function_node().is_some());
    assert_eq!(
        located.definition.text.as_deref(),
        Some("export function helper(value: unknown) {\n  return String(value);\n}")
    );
}

#[test]
fn unknown_names_are_not_found() {
    let (_dir, project, uri) = fixture();
    let resolver = DefinitionResolver::new(project.bridge().as_ref());
    assert_eq!(
        resolver.resolve(&uri, at(MAIN, 7, "mystery")),
        Classification::NotFound
    );
}

#[cfg(unix)]
#[test]
fn pnpm_store_paths_name_the_package() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "tsconfig.json", "{}");
    let store_dir = root.join("node_modules/.pnpm/dayjs@1.11.10/node_modules/dayjs");
    write(&store_dir, "package.json", r#"{ "name": "dayjs", "main": "index.js" }"#);
    write(&store_dir, "index.js", "export default function dayjs() {}\n");
    std::os::unix::fs::symlink(&store_dir, root.join("node_modules/dayjs")).unwrap();
    let source = "import dayjs from \"dayjs\";\nexport const now = () => dayjs();\n";
    let main = write(root, "src/time.ts", source);
    let project = Project::open(root, BridgeMode::InProcess).unwrap();
    let uri = util::path_to_uri(&util::canonical_path(&main));

    let resolver = DefinitionResolver::new(project.bridge().as_ref());
    match resolver.resolve(&uri, at(source, 1, "dayjs")) {
        Classification::Dependency {
            definition,
            package,
        } => {
            assert_eq!(package, "dayjs");
            assert!(definition.uri.contains("/.pnpm/dayjs@1.11.10/"));
        }
        other => panic!("expected dependency, got {other:?}"),
    }
}
