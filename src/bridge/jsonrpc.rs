//! JSON-RPC 2.0 over `Content-Length` framed streams, as spoken by language servers.

use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
}

/// Anything the server can send us.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Response {
        id: u64,
        result: Value,
        error: Option<ResponseError>,
    },
    Notification {
        method: String,
        params: Value,
    },
    Request {
        id: Value,
        method: String,
        params: Value,
    },
}

impl ServerMessage {
    pub fn from_value(value: Value) -> Option<Self> {
        let method = value
            .get("method")
            .and_then(Value::as_str)
            .map(str::to_string);
        let id = value.get("id").filter(|id| !id.is_null()).cloned();
        let params = value.get("params").cloned().unwrap_or(Value::Null);
        match (method, id) {
            (Some(method), Some(id)) => Some(ServerMessage::Request { id, method, params }),
            (Some(method), None) => Some(ServerMessage::Notification { method, params }),
            (None, Some(id)) => Some(ServerMessage::Response {
                id: id.as_u64()?,
                result: value.get("result").cloned().unwrap_or(Value::Null),
                error: value
                    .get("error")
                    .and_then(|error| serde_json::from_value(error.clone()).ok()),
            }),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("{method} timed out after {timeout:?}")]
    Timeout { method: String, timeout: Duration },
    #[error("connection closed")]
    Closed,
    #[error("server error {code}: {message}")]
    Server { code: i64, message: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub fn write_message(writer: &mut dyn Write, value: &Value) -> io::Result<()> {
    let body = serde_json::to_vec(value).map_err(io::Error::other)?;
    write!(writer, "Content-Length: {}\r\n\r\n", body.len())?;
    writer.write_all(&body)?;
    writer.flush()
}

/// Read one framed message. `Ok(None)` means the stream ended cleanly.
pub fn read_message(reader: &mut dyn BufRead) -> io::Result<Option<Value>> {
    let mut content_length: Option<usize> = None;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let line = line.trim_end();
        if line.is_empty() {
            if content_length.is_some() {
                break;
            }
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().ok();
            }
        }
    }
    let len = content_length
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing Content-Length"))?;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    serde_json::from_slice(&body)
        .map(Some)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

type Writer = Arc<Mutex<Box<dyn Write + Send>>>;
type Pending = Arc<Mutex<HashMap<u64, Sender<Result<Value, ResponseError>>>>>;

/// A client connection. Responses are matched to requests by id on a reader thread.
pub struct Connection {
    writer: Writer,
    pending: Pending,
    next_id: AtomicU64,
    timeout: Duration,
}

impl Connection {
    pub fn new(
        reader: Box<dyn Read + Send>,
        writer: Box<dyn Write + Send>,
        timeout: Duration,
    ) -> Self {
        let writer: Writer = Arc::new(Mutex::new(writer));
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let reader_writer = Arc::clone(&writer);
        let reader_pending = Arc::clone(&pending);
        thread::spawn(move || reader_loop(reader, reader_writer, reader_pending));
        Self {
            writer,
            pending,
            next_id: AtomicU64::new(1),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn request(&self, method: &str, params: Value) -> Result<Value, RequestError> {
        self.request_within(method, params, self.timeout)
    }

    /// [`request`](Self::request) with its own deadline.
    pub fn request_within(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, RequestError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel();
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);
        let message = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        if let Err(err) = self.send(&message) {
            self.forget(id);
            return Err(err.into());
        }
        trace!(id, method, "request sent");
        match rx.recv_timeout(timeout) {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(error)) => Err(RequestError::Server {
                code: error.code,
                message: error.message,
            }),
            Err(RecvTimeoutError::Timeout) => {
                self.forget(id);
                Err(RequestError::Timeout {
                    method: method.to_string(),
                    timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(RequestError::Closed),
        }
    }

    pub fn notify(&self, method: &str, params: Value) -> Result<(), RequestError> {
        let message = json!({ "jsonrpc": "2.0", "method": method, "params": params });
        self.send(&message).map_err(RequestError::from)
    }

    fn send(&self, message: &Value) -> io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        write_message(&mut **writer, message)
    }

    fn forget(&self, id: u64) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}

fn reader_loop(reader: Box<dyn Read + Send>, writer: Writer, pending: Pending) {
    let mut reader = BufReader::new(reader);
    loop {
        let value = match read_message(&mut reader) {
            Ok(Some(value)) => value,
            Ok(None) => break,
            Err(err) => {
                warn!("language server stream failed: {err}");
                break;
            }
        };
        match ServerMessage::from_value(value) {
            Some(ServerMessage::Response { id, result, error }) => {
                let waiter = pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(match error {
                            Some(error) => Err(error),
                            None => Ok(result),
                        });
                    }
                    None => debug!(id, "response for unknown or expired request"),
                }
            }
            Some(ServerMessage::Request { id, method, .. }) => {
                trace!(%method, "answering server request with null");
                let reply = json!({ "jsonrpc": "2.0", "id": id, "result": Value::Null });
                let mut writer = writer.lock().unwrap_or_else(PoisonError::into_inner);
                if let Err(err) = write_message(&mut **writer, &reply) {
                    warn!("failed to answer {method}: {err}");
                }
            }
            Some(ServerMessage::Notification { method, .. }) => {
                trace!(%method, "server notification");
            }
            None => debug!("ignoring malformed message"),
        }
    }
    // dropping the senders wakes every waiter with Disconnected
    pending
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn framing_round_trips_through_buffers() {
        let mut buffer = Vec::new();
        write_message(&mut buffer, &json!({ "id": 1, "result": null })).unwrap();
        write_message(&mut buffer, &json!({ "method": "window/logMessage" })).unwrap();
        let mut reader = Cursor::new(buffer);

        let first = read_message(&mut reader).unwrap().unwrap();
        assert_eq!(first["id"], 1);
        let second = read_message(&mut reader).unwrap().unwrap();
        assert_eq!(second["method"], "window/logMessage");
        assert!(read_message(&mut reader).unwrap().is_none());
    }

    #[test]
    fn classify_server_messages() {
        assert!(matches!(
            ServerMessage::from_value(json!({ "id": 3, "result": [1] })),
            Some(ServerMessage::Response { id: 3, error: None, .. })
        ));
        assert!(matches!(
            ServerMessage::from_value(json!({ "id": "a", "method": "workspace/configuration" })),
            Some(ServerMessage::Request { .. })
        ));
        assert!(matches!(
            ServerMessage::from_value(json!({ "method": "textDocument/publishDiagnostics", "params": {} })),
            Some(ServerMessage::Notification { .. })
        ));
        let failed = ServerMessage::from_value(
            json!({ "id": 4, "error": { "code": -32601, "message": "no" } }),
        );
        assert!(matches!(
            failed,
            Some(ServerMessage::Response { error: Some(ResponseError { code: -32601, .. }), .. })
        ));
        assert_eq!(ServerMessage::from_value(json!({})), None);
    }
}
