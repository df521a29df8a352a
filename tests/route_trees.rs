use livescope::model::{Entry, HttpMethod};
use livescope::routes::{RouteListing, VisitStep};
use livescope::{BridgeMode, Project};
use std::fs;
use std::path::Path;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// `<file>@<offset>` of the first occurrence of `needle` in `source` (ASCII fixtures).
fn id_of(file: &str, source: &str, needle: &str) -> String {
    format!("{file}@{}", source.find(needle).unwrap())
}

const HONO_APP: &str = r#"import { Hono } from "hono";
import { users } from "./users";

const api = new Hono().basePath("/api");
api.use("*", logger());
api.get("/health", (c) => c.text("ok"));
api.route("/users", users);

export default api;
"#;

const HONO_USERS: &str = r#"import { Hono } from "hono";

export const users = new Hono();
users.get("/", (c) => c.json([]));
users.get("/:id", (c) => c.json({ id: c.req.param("id") }));
users.post("/", (c) => c.json({}, 201));
"#;

fn hono_project() -> (tempfile::TempDir, Project) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "tsconfig.json", r#"{ "include": ["src"] }"#);
    write(root, "src/app.ts", HONO_APP);
    write(root, "src/users.ts", HONO_USERS);
    let project = Project::open(root, BridgeMode::InProcess).unwrap();
    (dir, project)
}

#[test]
fn hono_mounts_across_files() {
    let (_dir, project) = hono_project();
    let extraction = project.extract_routes();
    assert!(extraction.warnings.is_empty(), "{:?}", extraction.warnings);
    assert_eq!(extraction.graph.len(), 2);

    let api_id = id_of("src/app.ts", HONO_APP, "api = new");
    let users_id = id_of("src/users.ts", HONO_USERS, "users = new");
    let api = extraction.graph.get(&api_id).unwrap();
    assert_eq!(api.name, "api");
    assert_eq!(api.base_path, "/api");
    assert_eq!(api.entries.len(), 3);
    assert!(matches!(
        &api.entries[0],
        Entry::Middleware { path: Some(path), .. } if path == "*"
    ));
    assert!(matches!(
        &api.entries[1],
        Entry::Route { method: HttpMethod::Get, path, .. } if path == "/health"
    ));
    match &api.entries[2] {
        Entry::Reference {
            target_id,
            path,
            name,
            id,
        } => {
            assert_eq!(target_id, &users_id);
            assert_eq!(path, "/users");
            assert_eq!(name, "users");
            assert_eq!(id, &id_of("src/app.ts", HONO_APP, "route(\"/users\""));
        }
        other => panic!("expected reference, got {other:?}"),
    }

    let users = extraction.graph.get(&users_id).unwrap();
    let methods: Vec<HttpMethod> = users
        .entries
        .iter()
        .filter_map(|entry| match entry {
            Entry::Route { method, .. } => Some(*method),
            _ => None,
        })
        .collect();
    assert_eq!(methods, vec![HttpMethod::Get, HttpMethod::Get, HttpMethod::Post]);

    let dominant = project.dominant_router().unwrap();
    assert_eq!(dominant.id, api_id);
}

#[test]
fn hono_listing_and_matching() {
    let (_dir, project) = hono_project();
    let extraction = project.extract_routes();
    let api_id = id_of("src/app.ts", HONO_APP, "api = new");
    let users_id = id_of("src/users.ts", HONO_USERS, "users = new");
    let listing = RouteListing::flatten(&extraction.graph, &api_id);

    let paths: Vec<(HttpMethod, &str)> = listing
        .routes
        .iter()
        .map(|route| (route.method, route.path.as_str()))
        .collect();
    assert_eq!(
        paths,
        vec![
            (HttpMethod::Get, "/api/health"),
            (HttpMethod::Get, "/api/users"),
            (HttpMethod::Get, "/api/users/:id"),
            (HttpMethod::Post, "/api/users"),
        ]
    );
    assert!(listing.routes.iter().all(|route| route.middleware.len() == 1));
    assert_eq!(listing.routes[0].middleware[0].path, "/api/*");

    let matched = listing.match_request("GET", "/api/users/42").unwrap();
    assert_eq!(matched.route.path, "/api/users/:id");
    assert_eq!(matched.params.get("id").map(String::as_str), Some("42"));
    assert_eq!(matched.history.len(), 4);
    assert_eq!(matched.history[0], VisitStep::Router { id: api_id });
    assert_eq!(matched.history[1], VisitStep::Router { id: users_id });
    assert!(matches!(matched.history[2], VisitStep::Middleware { .. }));
    assert!(matches!(matched.history[3], VisitStep::Route { .. }));

    assert!(listing.match_request("DELETE", "/api/users/42").is_none());
    assert!(listing.match_request("GET", "/elsewhere").is_none());
}

#[test]
fn express_routers_and_route_chains() {
    let app_source = r#"import express from "express";

const app = express();
const router = express.Router();

router.get("/items", list);
router.route("/items/:id").get(show).delete(remove);

app.use(express.json());
app.use("/v1", router);
"#;
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "tsconfig.json", "{}");
    write(root, "src/server.ts", app_source);
    let project = Project::open(root, BridgeMode::InProcess).unwrap();
    let extraction = project.extract_routes();

    let app_id = id_of("src/server.ts", app_source, "app = express");
    let router_id = id_of("src/server.ts", app_source, "router = express");
    let router = extraction.graph.get(&router_id).unwrap();
    let routes: Vec<(HttpMethod, &str)> = router
        .entries
        .iter()
        .filter_map(|entry| match entry {
            Entry::Route { method, path, .. } => Some((*method, path.as_str())),
            _ => None,
        })
        .collect();
    assert_eq!(
        routes,
        vec![
            (HttpMethod::Get, "/items"),
            (HttpMethod::Get, "/items/:id"),
            (HttpMethod::Delete, "/items/:id"),
        ]
    );

    let app = extraction.graph.get(&app_id).unwrap();
    assert!(matches!(&app.entries[0], Entry::Middleware { path: None, .. }));
    assert!(matches!(
        &app.entries[1],
        Entry::Reference { target_id, path, .. } if *target_id == router_id && path == "/v1"
    ));
    assert_eq!(project.dominant_router().unwrap().id, app_id);

    let listing = RouteListing::flatten(&extraction.graph, &app_id);
    let matched = listing.match_request("delete", "/v1/items/7").unwrap();
    assert_eq!(matched.route.method, HttpMethod::Delete);
    assert_eq!(matched.params.get("id").map(String::as_str), Some("7"));
    assert_eq!(
        matched.history.first(),
        Some(&VisitStep::Router { id: app_id })
    );
}

#[test]
fn chained_initializers_openapi_and_on() {
    let source = r#"import { OpenAPIHono, createRoute } from "@hono/zod-openapi";

const PREFIX = "/v2";
const getUser = createRoute({ method: "get", path: "/users/{id}" });

const app = new OpenAPIHono()
  .get(`${PREFIX}/status`, (c) => c.text("up"))
  .post("/login", login);

app.openapi(getUser, handler);
app.on(["PUT", "PATCH"], "/profile", update);
"#;
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "tsconfig.json", "{}");
    write(root, "src/index.ts", source);
    let project = Project::open(root, BridgeMode::InProcess).unwrap();
    let extraction = project.extract_routes();
    let app = extraction
        .graph
        .get(&id_of("src/index.ts", source, "app = new"))
        .unwrap();
    let routes: Vec<(HttpMethod, &str)> = app
        .entries
        .iter()
        .filter_map(|entry| match entry {
            Entry::Route { method, path, .. } => Some((*method, path.as_str())),
            _ => None,
        })
        .collect();
    assert_eq!(
        routes,
        vec![
            (HttpMethod::Get, "/v2/status"),
            (HttpMethod::Post, "/login"),
            (HttpMethod::Get, "/users/:id"),
            (HttpMethod::Put, "/profile"),
            (HttpMethod::Patch, "/profile"),
        ]
    );
    let ids: std::collections::HashSet<&str> = app.entries.iter().map(Entry::id).collect();
    assert_eq!(ids.len(), app.entries.len());
}

#[test]
fn factory_functions_reference_their_router() {
    let factory = r#"import { Hono } from "hono";

export function createApp() {
  const inner = new Hono();
  inner.get("/inside", (c) => c.text("in"));
  return inner;
}
"#;
    let server = r#"import { createApp } from "./factory";

const server = createApp();
server.get("/ping", (c) => c.text("pong"));
"#;
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "tsconfig.json", "{}");
    write(root, "src/factory.ts", factory);
    write(root, "src/server.ts", server);
    let project = Project::open(root, BridgeMode::InProcess).unwrap();
    let extraction = project.extract_routes();

    let inner_id = id_of("src/factory.ts", factory, "inner = new");
    let server_id = id_of("src/server.ts", server, "server = create");
    let node = extraction.graph.get(&server_id).unwrap();
    assert!(matches!(
        &node.entries[0],
        Entry::Reference { target_id, path, .. } if *target_id == inner_id && path == "/"
    ));
    assert!(extraction.graph.get(&inner_id).is_some());
    assert_eq!(project.dominant_router().unwrap().id, server_id);

    let listing = RouteListing::flatten(&extraction.graph, &server_id);
    let paths: Vec<&str> = listing.routes.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(paths, vec!["/inside", "/ping"]);
}

#[test]
fn broken_files_become_warnings() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "tsconfig.json", "{}");
    write(root, "src/ok.ts", "import { Hono } from 'hono';\nconst app = new Hono();\napp.get('/', h);\n");
    write(root, "src/broken.ts", "const app = new Hono(;\napp.get('/x', h\n");
    let project = Project::open(root, BridgeMode::InProcess).unwrap();
    let extraction = project.extract_routes();
    assert_eq!(extraction.graph.len(), 1);
    assert_eq!(extraction.warnings.len(), 1);
    assert!(extraction.warnings[0].starts_with("src/broken.ts"));
}

#[test]
fn missing_tsconfig_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "src/app.ts", "export const a = 1;\n");
    let err = Project::open(dir.path(), BridgeMode::InProcess).err().unwrap();
    assert!(err.is_fatal());
    assert!(err.to_string().contains("tsconfig.json"));
}
