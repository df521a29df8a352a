//! Flattened view of a router tree: every reachable route with its full mounted path.

use super::graph::ResourceGraph;
use crate::model::{Entry, HttpMethod, ResourceNode};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListedMiddleware {
    pub id: String,
    /// Full pattern the middleware is mounted on.
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListedRoute {
    pub id: String,
    pub method: HttpMethod,
    pub path: String,
    /// Routers from the listing root down to the router that owns the route.
    pub routers: Vec<String>,
    /// Middleware registered before the route along the mount chain.
    pub middleware: Vec<ListedMiddleware>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum VisitStep {
    Router { id: String },
    Middleware { id: String },
    Route { id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteMatch {
    pub route: ListedRoute,
    pub params: BTreeMap<String, String>,
    pub history: Vec<VisitStep>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouteListing {
    pub root: String,
    pub routes: Vec<ListedRoute>,
}

impl RouteListing {
    /// List every route reachable from `root_id`. A router already on the current mount
    /// chain is not entered again, so reference cycles terminate.
    pub fn flatten(graph: &ResourceGraph, root_id: &str) -> Self {
        let mut listing = RouteListing {
            root: root_id.to_string(),
            routes: Vec::new(),
        };
        if let Some(root) = graph.get(root_id) {
            let mut chain = Vec::new();
            collect(graph, root, "", Vec::new(), &mut chain, &mut listing.routes);
        }
        listing
    }

    /// The first route that would answer `method path`, with the routers and middleware a
    /// request passes through on the way there.
    pub fn match_request(&self, method: &str, path: &str) -> Option<RouteMatch> {
        self.routes.iter().find_map(|route| {
            if !route.method.accepts(method) {
                return None;
            }
            let params = match_path(&route.path, path)?;
            let mut history: Vec<VisitStep> = route
                .routers
                .iter()
                .map(|id| VisitStep::Router { id: id.clone() })
                .collect();
            history.extend(
                route
                    .middleware
                    .iter()
                    .filter(|mw| match_path(&mw.path, path).is_some())
                    .map(|mw| VisitStep::Middleware { id: mw.id.clone() }),
            );
            history.push(VisitStep::Route {
                id: route.id.clone(),
            });
            Some(RouteMatch {
                route: route.clone(),
                params,
                history,
            })
        })
    }
}

fn collect(
    graph: &ResourceGraph,
    node: &ResourceNode,
    prefix: &str,
    inherited: Vec<ListedMiddleware>,
    chain: &mut Vec<String>,
    out: &mut Vec<ListedRoute>,
) {
    chain.push(node.id.clone());
    let base = join_paths(prefix, &node.base_path);
    let mut middleware = inherited;
    for entry in &node.entries {
        match entry {
            Entry::Middleware { id, path } => middleware.push(ListedMiddleware {
                id: id.clone(),
                path: join_paths(&base, path.as_deref().unwrap_or("*")),
            }),
            Entry::Route { id, method, path } => out.push(ListedRoute {
                id: id.clone(),
                method: *method,
                path: join_paths(&base, path),
                routers: chain.clone(),
                middleware: middleware.clone(),
            }),
            Entry::Reference {
                target_id, path, ..
            } => {
                if chain.contains(target_id) {
                    continue;
                }
                if let Some(target) = graph.get(target_id) {
                    collect(
                        graph,
                        target,
                        &join_paths(&base, path),
                        middleware.clone(),
                        chain,
                        out,
                    );
                }
            }
        }
    }
    chain.pop();
}

/// Join a mount prefix and a path into one `/`-rooted path without doubled slashes.
pub fn join_paths(prefix: &str, suffix: &str) -> String {
    let left = prefix.trim().trim_end_matches('/');
    let right = suffix.trim().trim_start_matches('/');
    let joined = match (left.is_empty(), right.is_empty()) {
        (true, true) => return "/".to_string(),
        (true, false) => right.to_string(),
        (false, true) => left.to_string(),
        (false, false) => format!("{left}/{right}"),
    };
    if joined.starts_with('/') {
        joined
    } else {
        format!("/{joined}")
    }
}

/// Match a request path against a Hono-style pattern. `:name` captures one segment,
/// `:name?` may be absent, and `*` matches the remainder.
pub fn match_path(pattern: &str, path: &str) -> Option<BTreeMap<String, String>> {
    let expected: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let actual: Vec<&str> = path
        .split(['?', '#'])
        .next()
        .unwrap_or(path)
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    let mut params = BTreeMap::new();
    let mut index = 0;
    for segment in &expected {
        if *segment == "*" {
            return Some(params);
        }
        if let Some(param) = segment.strip_prefix(':') {
            let optional = param.ends_with('?');
            let name = param
                .trim_end_matches('?')
                .split('{')
                .next()
                .unwrap_or(param);
            match actual.get(index) {
                Some(value) => {
                    params.insert(name.to_string(), value.to_string());
                    index += 1;
                }
                None if optional => {}
                None => return None,
            }
            continue;
        }
        if actual.get(index) != Some(segment) {
            return None;
        }
        index += 1;
    }
    (index == actual.len()).then_some(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_paths_normalizes_slashes() {
        assert_eq!(join_paths("", ""), "/");
        assert_eq!(join_paths("/api/", "/users"), "/api/users");
        assert_eq!(join_paths("api", ""), "/api");
        assert_eq!(join_paths("/", "*"), "/*");
    }

    #[test]
    fn match_path_handles_params_and_wildcards() {
        let params = match_path("/users/:id", "/users/42").unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("42"));
        assert!(match_path("/users/:id", "/users").is_none());
        assert!(match_path("/users/:id?", "/users").is_some());
        assert!(match_path("/admin/*", "/admin/a/b").is_some());
        assert!(match_path("/*", "/").is_some());
        assert!(match_path("/a", "/a/b").is_none());
        assert!(match_path("/search", "/search?q=1").is_some());
    }
}
