//! JSONL request/response server over stdin/stdout.
//!
//! Each input line is `{"id": .., "method": .., "params": {..}}`; each output line is
//! `{"id": .., "result": ..}` or `{"id": .., "error": {"message": ..}}`.

use crate::analysis::ComplexityAnalyzer;
use crate::expand::ExpandOptions;
use crate::monitor::RoutesMonitor;
use crate::project::Project;
use crate::routes::{RouteExtraction, RouteListing};
use crate::util;
use crate::watch::{WatchConfig, WatchHandle};
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, warn};

#[derive(Deserialize)]
struct RpcRequest {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Serialize)]
struct RpcResponse {
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Serialize)]
struct RpcError {
    message: String,
}

#[derive(Deserialize)]
struct RouterParams {
    /// Router id; defaults to the dominant router.
    #[serde(default)]
    root: Option<String>,
}

#[derive(Deserialize)]
struct MatchRouteParams {
    #[serde(default)]
    root: Option<String>,
    #[serde(default = "default_method")]
    method: String,
    path: String,
}

#[derive(Deserialize)]
struct ExpandParams {
    file: PathBuf,
    #[serde(alias = "function_name", alias = "name")]
    function: String,
    max_depth: Option<usize>,
}

#[derive(Deserialize)]
struct FileVersionParams {
    path: PathBuf,
}

fn default_method() -> String {
    "GET".to_string()
}

pub fn serve(project: Project, watch_config: WatchConfig) -> Result<()> {
    let app = App::new(project, watch_config)?;
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(value) => value,
            Err(err) => {
                warn!("stdin error: {err}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) => app.handle_request(request),
            Err(err) => error_response(Value::Null, &format!("invalid request: {err}")),
        };

        writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
        stdout.flush()?;
    }
    app.shutdown();
    Ok(())
}

/// Handle a single request without starting the watcher. Returns the response line.
pub fn call(project: Project, method: &str, params: &str, id: &str) -> Result<String> {
    let params: Value = if params.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(params).context("params must be JSON")?
    };
    let id = serde_json::from_str(id).unwrap_or_else(|_| Value::String(id.to_string()));
    let app = App {
        project,
        watcher: None,
        monitor: None,
    };
    let response = app.handle_request(RpcRequest {
        id,
        method: method.to_string(),
        params,
    });
    Ok(serde_json::to_string(&response)?)
}

struct App {
    project: Project,
    watcher: Option<WatchHandle>,
    monitor: Option<RoutesMonitor>,
}

impl App {
    fn new(project: Project, watch_config: WatchConfig) -> Result<Self> {
        let monitor = project.monitor(watch_config.debounce);
        let watcher = project.watch(watch_config)?;
        Ok(Self {
            project,
            watcher,
            monitor: Some(monitor),
        })
    }

    fn handle_request(&self, request: RpcRequest) -> RpcResponse {
        let start = Instant::now();
        let result = self.handle_method(&request.method, request.params);
        debug!(method = %request.method, elapsed = ?start.elapsed(), "rpc handled");
        match result {
            Ok(result) => RpcResponse {
                id: request.id,
                result: Some(result),
                error: None,
            },
            Err(err) => error_response(request.id, &format!("{err:#}")),
        }
    }

    fn handle_method(&self, method: &str, params: Value) -> Result<Value> {
        match method {
            "dominant_router" => {
                let extraction = self.extraction();
                let root = ComplexityAnalyzer::new(&extraction.graph).dominant();
                Ok(json!({ "root": root, "warnings": extraction.warnings }))
            }
            "route_graph" => {
                let extraction = self.extraction();
                let stats: Vec<Value> = ComplexityAnalyzer::new(&extraction.graph)
                    .stats()
                    .into_iter()
                    .map(|(node, stat)| json!({ "id": node.id, "stat": stat }))
                    .collect();
                Ok(json!({
                    "nodes": extraction.graph,
                    "stats": stats,
                    "warnings": extraction.warnings,
                }))
            }
            "list_routes" => {
                let params: RouterParams = parse_params(params)?;
                let extraction = self.extraction();
                let root = router_id(&extraction, params.root)?;
                Ok(json!(RouteListing::flatten(&extraction.graph, &root)))
            }
            "match_route" => {
                let params: MatchRouteParams = parse_params(params)?;
                let extraction = self.extraction();
                let root = router_id(&extraction, params.root)?;
                let listing = RouteListing::flatten(&extraction.graph, &root);
                Ok(json!(listing.match_request(&params.method, &params.path)))
            }
            "expand_function" => {
                let params: ExpandParams = parse_params(params)?;
                let mut options = ExpandOptions::default();
                if let Some(max_depth) = params.max_depth {
                    options.max_depth = max_depth;
                }
                let result = self
                    .project
                    .expand_function(&params.file, &params.function, options)?;
                Ok(json!(result))
            }
            "file_version" => {
                let params: FileVersionParams = parse_params(params)?;
                let path = if params.path.is_absolute() {
                    params.path
                } else {
                    self.project.root().join(params.path)
                };
                let version = self.project.store().version(&path);
                Ok(json!({
                    "path": util::display_rel_path(self.project.root(), &util::canonical_path(&path)),
                    "version": version,
                }))
            }
            other => Err(anyhow!("unknown method: {other}")),
        }
    }

    /// The monitor's latest pass, or a fresh one when none has completed yet.
    fn extraction(&self) -> RouteExtraction {
        self.monitor
            .as_ref()
            .and_then(RoutesMonitor::latest)
            .unwrap_or_else(|| self.project.extract_routes())
    }

    fn shutdown(self) {
        if let Some(watcher) = self.watcher {
            watcher.stop();
        }
        if let Some(monitor) = self.monitor {
            monitor.stop();
        }
    }
}

fn parse_params<T: for<'de> Deserialize<'de>>(params: Value) -> Result<T> {
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params).context("invalid params")
}

fn router_id(extraction: &RouteExtraction, requested: Option<String>) -> Result<String> {
    match requested {
        Some(id) if extraction.graph.contains(&id) => Ok(id),
        Some(id) => Err(anyhow!("unknown router: {id}")),
        None => ComplexityAnalyzer::new(&extraction.graph)
            .dominant()
            .map(|node| node.id.clone())
            .ok_or_else(|| anyhow!("no routers found")),
    }
}

fn error_response(id: Value, message: &str) -> RpcResponse {
    RpcResponse {
        id,
        result: None,
        error: Some(RpcError {
            message: message.to_string(),
        }),
    }
}
