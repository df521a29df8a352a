use livescope::bridge::{CompilerServiceBridge, ScriptHost};
use livescope::model::{ContextEntryType, Definition, Position, Truncation};
use livescope::{BridgeMode, CancellationToken, ContextExpander, EngineError, ExpandOptions, Project};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

/// Forwards to the real bridge and counts every definition query.
struct CountingBridge {
    inner: Arc<dyn CompilerServiceBridge>,
    queries: AtomicUsize,
}

impl CountingBridge {
    fn new(inner: Arc<dyn CompilerServiceBridge>) -> Self {
        Self {
            inner,
            queries: AtomicUsize::new(0),
        }
    }

    fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl CompilerServiceBridge for CountingBridge {
    fn resolve_definition(&self, uri: &str, position: Position) -> Option<Definition> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.resolve_definition(uri, position)
    }

    fn resolve_type_definition(&self, uri: &str, position: Position) -> Option<Definition> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.resolve_type_definition(uri, position)
    }

    fn host(&self) -> &ScriptHost {
        self.inner.host()
    }
}

const HANDLERS: &str = r#"import { validate } from "./validate";
import * as fmt from "./format";
import { nanoid } from "nanoid";

const LIMIT = 10;

export function createUser(input: string) {
  const ok = validate(input, LIMIT);
  console.log(fmt.label(ok));
  return { id: nanoid(12), ok };
}

export function add(a: number, b: number) {
  return a + b;
}
"#;

const FORMAT: &str = "export function label(value: boolean) {\n  return value ? \"yes\" : \"no\";\n}\n";

const CYCLE: &str = r#"export function ping(n: number): number {
  return n <= 0 ? 0 : pong(n - 1);
}

export function pong(n: number): number {
  return n <= 0 ? 1 : ping(n - 1);
}
"#;

fn fixture() -> (tempfile::TempDir, Project) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "tsconfig.json", r#"{ "include": ["src/**/*.ts"] }"#);
    write(
        root,
        "node_modules/typescript/lib/lib.es5.d.ts",
        "interface Console {\n  log(...data: any[]): void;\n}\ndeclare var console: Console;\ninterface StringConstructor {\n  (value?: any): string;\n}\ndeclare var String: StringConstructor;\n",
    );
    write(
        root,
        "node_modules/nanoid/package.json",
        r#"{ "name": "nanoid", "main": "index.js" }"#,
    );
    write(
        root,
        "node_modules/nanoid/index.js",
        "export function nanoid(size = 21) {\n  return \"x\".repeat(size);\n}\n",
    );
    write(root, "src/handlers.ts", HANDLERS);
    write(root, "src/format.ts", FORMAT);
    write(
        root,
        "src/validate.ts",
        "import { normalize } from \"./normalize\";\n\nexport function validate(value: string, max: number) {\n  return normalize(value).length <= max;\n}\n",
    );
    write(
        root,
        "src/normalize.ts",
        "export const normalize = (value: string) => String(value).trim();\n",
    );
    write(root, "src/cycle.ts", CYCLE);
    let project = Project::open(root, BridgeMode::InProcess).unwrap();
    (dir, project)
}

fn options(max_depth: usize) -> ExpandOptions {
    ExpandOptions {
        max_depth,
        cancel: CancellationToken::new(),
    }
}

#[test]
fn expands_nested_local_functions() {
    let (_dir, project) = fixture();
    let result = project
        .expand_function(Path::new("src/handlers.ts"), "createUser", options(8))
        .unwrap()
        .unwrap();
    assert_eq!(result.file, "src/handlers.ts");
    assert_eq!((result.start_line, result.start_column), (7, 8));
    assert_eq!((result.end_line, result.end_column), (11, 2));

    let names: Vec<&str> = result.context.iter().map(|e| e.name.as_str()).collect();
    // `console` and `console.log` are standard globals
    assert_eq!(names, vec!["validate", "LIMIT", "fmt", "label", "nanoid"]);

    let validate = &result.context[0];
    assert_eq!(validate.kind, ContextEntryType::Function);
    assert_eq!(validate.position, Position::new(7, 13));
    assert!(validate.truncated.is_none());
    let nested = validate.context.as_ref().unwrap();
    assert_eq!(nested.len(), 1);
    assert_eq!(nested[0].name, "normalize");
    assert_eq!(nested[0].kind, ContextEntryType::Function);
    assert_eq!(
        nested[0].definition.as_ref().unwrap().text.as_deref(),
        Some("export const normalize = (value: string) => String(value).trim();")
    );
    // String is a standard global and is left out
    assert_eq!(nested[0].context.as_deref(), Some(&[][..]));

    let limit = &result.context[1];
    assert_eq!(limit.kind, ContextEntryType::Unknown);
    assert_eq!(
        limit.definition.as_ref().unwrap().text.as_deref(),
        Some("const LIMIT = 10;")
    );
    assert!(limit.context.is_none());

    let fmt = &result.context[2];
    assert_eq!(fmt.kind, ContextEntryType::Unknown);
    assert_eq!(fmt.definition.as_ref().unwrap().text.as_deref(), Some(FORMAT));

    let label = &result.context[3];
    assert_eq!(label.kind, ContextEntryType::Function);
    assert_eq!(label.position, Position::new(8, 18));
    assert!(label.definition.as_ref().unwrap().uri.ends_with("/src/format.ts"));
    assert_eq!(
        label.definition.as_ref().unwrap().text.as_deref(),
        Some(FORMAT.trim_end())
    );
    assert_eq!(label.context.as_deref(), Some(&[][..]));

    let nanoid = &result.context[4];
    assert_eq!(nanoid.kind, ContextEntryType::Unknown);
    assert_eq!(nanoid.package.as_deref(), Some("nanoid"));
    assert!(nanoid.context.is_none());
}

#[test]
fn serialized_entries_use_wire_names() {
    let (_dir, project) = fixture();
    let result = project
        .expand_function(Path::new("src/handlers.ts"), "createUser", options(8))
        .unwrap()
        .unwrap();
    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["startLine"], 7);
    assert_eq!(value["context"][0]["type"], "function");
    assert_eq!(value["context"][0]["context"][0]["name"], "normalize");
    assert_eq!(value["context"][3]["name"], "label");
    assert_eq!(value["context"][4]["package"], "nanoid");
    assert!(value["context"][1].get("context").is_none());
}

#[test]
fn functions_without_free_names_issue_no_queries() {
    let (_dir, project) = fixture();
    let bridge = CountingBridge::new(Arc::clone(project.bridge()));
    let expander = ContextExpander::new(&bridge, options(8));
    let result = expander
        .expand_function(Path::new("src/handlers.ts"), "add")
        .unwrap()
        .unwrap();
    assert!(result.context.is_empty());
    assert_eq!(bridge.queries(), 0);
}

#[test]
fn each_identifier_issues_both_queries() {
    let (_dir, project) = fixture();
    let bridge = CountingBridge::new(Arc::clone(project.bridge()));
    let expander = ContextExpander::new(&bridge, options(0));
    let result = expander
        .expand_function(Path::new("src/cycle.ts"), "ping")
        .unwrap()
        .unwrap();
    assert_eq!(result.context.len(), 1);
    assert_eq!(bridge.queries(), 2);
}

#[test]
fn cycles_are_marked_and_cut() {
    let (_dir, project) = fixture();
    let result = project
        .expand_function(Path::new("src/cycle.ts"), "ping", options(8))
        .unwrap()
        .unwrap();
    assert_eq!(result.context.len(), 1);
    let pong = &result.context[0];
    assert_eq!(pong.name, "pong");
    assert!(pong.truncated.is_none());
    let inner = pong.context.as_ref().unwrap();
    assert_eq!(inner.len(), 1);
    assert_eq!(inner[0].name, "ping");
    assert_eq!(inner[0].kind, ContextEntryType::Function);
    assert_eq!(inner[0].truncated, Some(Truncation::Cycle));
    assert!(inner[0].context.is_none());
}

#[test]
fn depth_limit_is_marked() {
    let (_dir, project) = fixture();
    let result = project
        .expand_function(Path::new("src/cycle.ts"), "ping", options(0))
        .unwrap()
        .unwrap();
    let pong = &result.context[0];
    assert_eq!(pong.truncated, Some(Truncation::Depth));
    assert!(pong.context.is_none());
    assert!(pong.definition.as_ref().unwrap().text.is_some());
}

#[test]
fn functions_can_be_named_by_source_text() {
    let (_dir, project) = fixture();
    let text = "  function pong(n: number): number {\n  return n <= 0 ? 1 : ping(n - 1);\n}  ";
    let result = project
        .expand_function(Path::new("src/cycle.ts"), text, options(8))
        .unwrap()
        .unwrap();
    assert_eq!(result.start_line, 5);
    assert_eq!(result.context[0].name, "ping");
}

#[test]
fn cancellation_aborts_expansion() {
    let (_dir, project) = fixture();
    let token = CancellationToken::new();
    token.cancel();
    let options = ExpandOptions {
        max_depth: 8,
        cancel: token,
    };
    let err = project
        .expand_function(Path::new("src/handlers.ts"), "createUser", options)
        .unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));
}

#[test]
fn missing_functions_and_files() {
    let (dir, project) = fixture();
    let missing = project
        .expand_function(Path::new("src/handlers.ts"), "nope", options(8))
        .unwrap();
    assert!(missing.is_none());

    let err = project
        .expand_function(&dir.path().join("src/absent.ts"), "x", options(8))
        .unwrap_err();
    assert!(matches!(err, EngineError::Io { .. }));
}

#[test]
fn free_function_opens_the_project() {
    let (dir, _project) = fixture();
    let result = livescope::expand_function(dir.path(), Path::new("src/cycle.ts"), "pong")
        .unwrap()
        .unwrap();
    assert_eq!(result.context[0].name, "ping");
}
