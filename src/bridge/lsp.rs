//! Out-of-process bridge backed by a TypeScript language server on stdio.

use super::CompilerServiceBridge;
use super::host::ScriptHost;
use super::jsonrpc::Connection;
use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::model::{Definition, Position, Range};
use crate::util;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const SOURCE_DEFINITION_COMMAND: &str = "_typescript.goToSourceDefinition";
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct LspOptions {
    pub command: Vec<String>,
    pub timeout: Duration,
}

impl Default for LspOptions {
    fn default() -> Self {
        let config = Config::get();
        Self {
            command: config.lsp_command.clone(),
            timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }
}

pub struct LspBridge {
    host: ScriptHost,
    connection: Connection,
    child: Mutex<Option<Child>>,
    /// Version and content last sent to the server for each open document.
    documents: Mutex<HashMap<PathBuf, SentDocument>>,
}

/// What the server was last told about a document.
struct SentDocument {
    version: i64,
    hash: String,
}

impl LspBridge {
    pub fn spawn(host: ScriptHost, options: LspOptions) -> EngineResult<Self> {
        let (program, args) = options
            .command
            .split_first()
            .ok_or_else(|| EngineError::Transport("empty language server command".to_string()))?;
        info!(%program, "starting language server");
        let mut child = Command::new(program)
            .args(args)
            .current_dir(host.root())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| EngineError::Transport(format!("spawn {program}: {err}")))?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            return Err(EngineError::Transport(
                "language server pipes unavailable".to_string(),
            ));
        };
        let connection = Connection::new(Box::new(stdout), Box::new(stdin), options.timeout);
        let bridge = Self {
            host,
            connection,
            child: Mutex::new(Some(child)),
            documents: Mutex::new(HashMap::new()),
        };
        bridge.initialize()?;
        Ok(bridge)
    }

    /// Run over an already established connection.
    pub fn with_connection(host: ScriptHost, connection: Connection) -> EngineResult<Self> {
        let bridge = Self {
            host,
            connection,
            child: Mutex::new(None),
            documents: Mutex::new(HashMap::new()),
        };
        bridge.initialize()?;
        Ok(bridge)
    }

    fn initialize(&self) -> EngineResult<()> {
        let root_uri = util::path_to_uri(self.host.root());
        let params = json!({
            "processId": std::process::id(),
            "rootUri": root_uri,
            "capabilities": {},
            "workspaceFolders": [{ "uri": root_uri, "name": "app" }],
        });
        self.connection
            .request("initialize", params)
            .map_err(|err| EngineError::Transport(format!("initialize: {err}")))?;
        self.connection
            .notify("initialized", json!({}))
            .map_err(|err| EngineError::Transport(format!("initialized: {err}")))?;
        debug!("language server initialized");
        Ok(())
    }

    /// Make sure the server holds the same text for `path` as the host.
    ///
    /// Content is compared by hash, so files read from disk are re-sent when they change
    /// even though they carry no store version. Sent versions only ever increase.
    fn sync_document(&self, path: &Path) {
        let Some(snapshot) = self.host.snapshot(path) else {
            return;
        };
        let store_version = snapshot.version.map(|v| v as i64).unwrap_or(0);
        let uri = util::path_to_uri(&snapshot.path);
        let mut documents = self
            .documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let previous = documents.get(&snapshot.path);
        if previous.is_some_and(|sent| sent.hash == snapshot.hash) {
            return;
        }
        let version = previous.map_or(store_version, |sent| store_version.max(sent.version + 1));
        let result = if previous.is_none() {
            self.connection.notify(
                "textDocument/didOpen",
                json!({
                    "textDocument": {
                        "uri": uri,
                        "languageId": language_id(&snapshot.path),
                        "version": version,
                        "text": &*snapshot.content,
                    }
                }),
            )
        } else {
            self.connection.notify(
                "textDocument/didChange",
                json!({
                    "textDocument": { "uri": uri, "version": version },
                    "contentChanges": [{ "text": &*snapshot.content }],
                }),
            )
        };
        match result {
            Ok(()) => {
                let sent = SentDocument {
                    version,
                    hash: snapshot.hash,
                };
                documents.insert(snapshot.path, sent);
            }
            Err(err) => warn!(path = %snapshot.path.display(), "document sync failed: {err}"),
        }
    }

    fn first_location(&self, method: &str, params: Value) -> Option<Definition> {
        match self.connection.request(method, params) {
            Ok(value) => parse_locations(&value).into_iter().next(),
            Err(err) => {
                warn!(method, "language server request failed: {err}");
                None
            }
        }
    }
}

impl CompilerServiceBridge for LspBridge {
    fn resolve_definition(&self, uri: &str, position: Position) -> Option<Definition> {
        let path = util::uri_to_path(uri)?;
        self.sync_document(&path);
        self.first_location(
            "workspace/executeCommand",
            json!({
                "command": SOURCE_DEFINITION_COMMAND,
                "arguments": [uri, position],
            }),
        )
    }

    fn resolve_type_definition(&self, uri: &str, position: Position) -> Option<Definition> {
        let path = util::uri_to_path(uri)?;
        self.sync_document(&path);
        self.first_location(
            "textDocument/definition",
            json!({
                "textDocument": { "uri": uri },
                "position": position,
            }),
        )
    }

    fn host(&self) -> &ScriptHost {
        &self.host
    }
}

impl Drop for LspBridge {
    fn drop(&mut self) {
        let timeout = self.connection.timeout().min(SHUTDOWN_TIMEOUT);
        if let Err(err) = self
            .connection
            .request_within("shutdown", Value::Null, timeout)
        {
            debug!("language server shutdown: {err}");
        }
        let _ = self.connection.notify("exit", Value::Null);
        let child = self
            .child
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut child) = child else {
            return;
        };
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            match child.try_wait() {
                Ok(Some(_)) => return,
                Ok(None) => thread::sleep(Duration::from_millis(20)),
                Err(_) => break,
            }
        }
        let _ = child.kill();
        let _ = child.wait();
    }
}

fn language_id(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("tsx") => "typescriptreact",
        Some("jsx") => "javascriptreact",
        Some("js" | "mjs" | "cjs") => "javascript",
        _ => "typescript",
    }
}

/// Accepts `null`, a `Location`, `Location[]` or `LocationLink[]`.
pub fn parse_locations(value: &Value) -> Vec<Definition> {
    match value {
        Value::Array(items) => items.iter().filter_map(parse_location).collect(),
        Value::Object(_) => parse_location(value).into_iter().collect(),
        _ => Vec::new(),
    }
}

fn parse_location(value: &Value) -> Option<Definition> {
    let (uri, range) = match value.get("targetUri") {
        Some(uri) => (
            uri,
            value
                .get("targetSelectionRange")
                .or_else(|| value.get("targetRange"))?,
        ),
        None => (value.get("uri")?, value.get("range")?),
    };
    let uri = uri.as_str()?.to_string();
    let range: Range = serde_json::from_value(range.clone()).ok()?;
    Some(Definition::new(uri, range))
}
