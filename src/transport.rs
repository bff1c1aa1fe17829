//! Transport selection and JSON-RPC framing.
//!
//! Two transport kinds reach an upstream server:
//! - **stdio** — a child process speaking line-delimited JSON-RPC over its
//!   stdin/stdout pipes
//! - **http** — a network endpoint answering JSON-RPC over HTTP POST
//!
//! [`select`] resolves a server's declared parameters into a validated
//! [`TransportSpec`] without performing any I/O; [`TransportSpec::open`]
//! then spawns the child or builds the HTTP client.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Url;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use crate::config::ServerParams;
use crate::errors::RouterError;
use crate::types::{JsonRpcRequest, JsonRpcResponse};

// ─── Transport Kind ──────────────────────────────────────────────────────────

/// The connection medium used to reach an upstream server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Stdio,
    Http,
}

/// Resolve the transport kind from a server's declared parameters.
///
/// An explicit `transport` field wins; otherwise the kind is inferred from
/// the shape of the entry: a `command` means stdio, its absence means http.
pub fn resolve_kind(params: &ServerParams) -> Result<TransportKind, RouterError> {
    match params.transport.as_deref() {
        Some("stdio") => Ok(TransportKind::Stdio),
        Some("http") => Ok(TransportKind::Http),
        Some(other) => Err(RouterError::Config {
            reason: format!("unknown transport kind '{other}' (expected \"stdio\" or \"http\")"),
        }),
        None => {
            if params.command.is_some() {
                Ok(TransportKind::Stdio)
            } else {
                Ok(TransportKind::Http)
            }
        }
    }
}

// ─── Transport Selector ──────────────────────────────────────────────────────

/// A validated transport description. Produced by [`select`] before any I/O
/// happens; consumed by [`TransportSpec::open`] during connect.
#[derive(Debug, Clone)]
pub enum TransportSpec {
    /// Child process over stdio. `env` is the complete, already-merged
    /// environment the process will run with.
    Stdio {
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
    /// JSON-RPC over HTTP POST. `headers` are attached to every request.
    Http {
        url: Url,
        headers: HeaderMap,
    },
}

/// Validate connection parameters and build a [`TransportSpec`].
///
/// `base_env` is the environment the caller wants child processes to
/// inherit (normally the current process environment, passed in explicitly
/// so the selector stays testable). Entries in `params.env` override
/// `base_env` on key collision.
///
/// Performs no I/O: stdio children are spawned and HTTP clients are built
/// later, in [`TransportSpec::open`].
pub fn select(
    params: &ServerParams,
    base_env: &HashMap<String, String>,
) -> Result<TransportSpec, RouterError> {
    match resolve_kind(params)? {
        TransportKind::Stdio => {
            let command = params.command.as_deref().unwrap_or_default();
            if command.is_empty() {
                return Err(RouterError::Config {
                    reason: "stdio transport requires a command".into(),
                });
            }

            let mut env = base_env.clone();
            for (key, value) in &params.env {
                env.insert(key.clone(), value.clone());
            }

            Ok(TransportSpec::Stdio {
                command: command.to_string(),
                args: params.args.clone(),
                env,
            })
        }
        TransportKind::Http => {
            let raw = params.url.as_deref().unwrap_or_default();
            if raw.is_empty() {
                return Err(RouterError::Config {
                    reason: "http transport requires a URL".into(),
                });
            }
            let url = Url::parse(raw).map_err(|e| RouterError::Config {
                reason: format!("http transport requires a valid URL, got '{raw}': {e}"),
            })?;
            let headers = build_header_map(&params.headers)?;

            Ok(TransportSpec::Http { url, headers })
        }
    }
}

/// Convert configured string headers into a typed header map.
fn build_header_map(headers: &HashMap<String, String>) -> Result<HeaderMap, RouterError> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| RouterError::Config {
            reason: format!("invalid header name '{key}': {e}"),
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| RouterError::Config {
            reason: format!("invalid value for header '{key}': {e}"),
        })?;
        map.insert(name, value);
    }
    Ok(map)
}

impl TransportSpec {
    /// Open the transport: spawn the child process and wire its pipes, or
    /// build the HTTP client. No protocol traffic is exchanged yet.
    pub async fn open(self, server_name: &str) -> Result<Transport, RouterError> {
        match self {
            TransportSpec::Stdio { command, args, env } => {
                let mut cmd = Command::new(&command);
                cmd.args(&args)
                    .env_clear()
                    .envs(&env)
                    .stdin(std::process::Stdio::piped())
                    .stdout(std::process::Stdio::piped())
                    .stderr(std::process::Stdio::null());

                let mut child = cmd.spawn().map_err(|e| RouterError::Connection {
                    server: server_name.to_string(),
                    reason: format!("failed to spawn '{command}': {e}"),
                })?;

                let stdin = child.stdin.take().ok_or_else(|| RouterError::Connection {
                    server: server_name.to_string(),
                    reason: "failed to capture child stdin".into(),
                })?;
                let stdout = child.stdout.take().ok_or_else(|| RouterError::Connection {
                    server: server_name.to_string(),
                    reason: "failed to capture child stdout".into(),
                })?;

                Ok(Transport::Stdio(StdioTransport::new(
                    server_name,
                    child,
                    stdin,
                    stdout,
                )))
            }
            TransportSpec::Http { url, headers } => {
                let client = reqwest::Client::builder()
                    .default_headers(headers)
                    .build()
                    .map_err(|e| RouterError::Connection {
                        server: server_name.to_string(),
                        reason: format!("failed to build http client: {e}"),
                    })?;

                Ok(Transport::Http(HttpTransport::new(server_name, client, url)))
            }
        }
    }
}

// ─── Transport ───────────────────────────────────────────────────────────────

/// A live connection to one upstream server.
pub enum Transport {
    Stdio(StdioTransport),
    Http(HttpTransport),
}

impl Transport {
    /// Send a JSON-RPC request and wait for the matching response.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, RouterError> {
        match self {
            Transport::Stdio(t) => t.request(method, params).await,
            Transport::Http(t) => t.request(method, params).await,
        }
    }

    /// Send a JSON-RPC notification (no response expected).
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), RouterError> {
        match self {
            Transport::Stdio(t) => t.notify(method, params).await,
            Transport::Http(t) => t.notify(method, params).await,
        }
    }

    /// Terminate the connection.
    pub async fn close(&mut self) -> Result<(), RouterError> {
        match self {
            Transport::Stdio(t) => t.close().await,
            Transport::Http(t) => t.close().await,
        }
    }
}

// ─── Stdio Transport ─────────────────────────────────────────────────────────

/// Bi-directional JSON-RPC transport over a child process's stdio.
///
/// The writer and reader are independently locked so a request's
/// write-then-read sequence cannot interleave its response with another
/// caller's. Request ids are a per-transport monotonic counter.
pub struct StdioTransport {
    server_name: String,
    child: Child,
    writer: Mutex<ChildStdin>,
    reader: Mutex<BufReader<ChildStdout>>,
    next_id: AtomicU64,
}

impl StdioTransport {
    /// Create a new transport around a spawned child's pipes.
    pub fn new(server_name: &str, child: Child, stdin: ChildStdin, stdout: ChildStdout) -> Self {
        Self {
            server_name: server_name.to_string(),
            child,
            writer: Mutex::new(stdin),
            reader: Mutex::new(BufReader::new(stdout)),
            next_id: AtomicU64::new(1),
        }
    }

    fn upstream_err(&self, reason: String) -> RouterError {
        RouterError::Upstream {
            server: self.server_name.clone(),
            reason,
        }
    }

    /// Send a JSON-RPC request and wait for the matching response.
    ///
    /// Writes one line of JSON, then reads lines until a response with a
    /// matching `id` arrives. Non-JSON lines (server log output) and
    /// responses to other ids are skipped.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, RouterError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = JsonRpcRequest::new(id, method, params);

        let mut json = serde_json::to_string(&req)
            .map_err(|e| self.upstream_err(format!("failed to serialize request: {e}")))?;
        json.push('\n');

        {
            let mut writer = self.writer.lock().await;
            writer
                .write_all(json.as_bytes())
                .await
                .map_err(|e| self.upstream_err(format!("failed to write to stdin: {e}")))?;
            writer
                .flush()
                .await
                .map_err(|e| self.upstream_err(format!("failed to flush stdin: {e}")))?;
        }

        let mut line_buf = String::new();
        let mut reader = self.reader.lock().await;

        loop {
            line_buf.clear();
            let bytes_read = reader
                .read_line(&mut line_buf)
                .await
                .map_err(|e| self.upstream_err(format!("failed to read from stdout: {e}")))?;

            if bytes_read == 0 {
                return Err(self.upstream_err(
                    "server stdout closed (process may have exited)".into(),
                ));
            }

            let trimmed = line_buf.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(resp) if resp.id == id => return Ok(resp),
                Ok(_) => continue,
                Err(_) => continue,
            }
        }
    }

    /// Send a JSON-RPC notification (no response expected).
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), RouterError> {
        let notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });

        let mut json = serde_json::to_string(&notification)
            .map_err(|e| self.upstream_err(format!("failed to serialize notification: {e}")))?;
        json.push('\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(json.as_bytes())
            .await
            .map_err(|e| self.upstream_err(format!("failed to write notification: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| self.upstream_err(format!("failed to flush notification: {e}")))?;

        Ok(())
    }

    /// Terminate the child process.
    ///
    /// Sends a best-effort `shutdown` notification, then kills the child
    /// and reaps it. Killing an already-exited child succeeds.
    pub async fn close(&mut self) -> Result<(), RouterError> {
        let _ = self.notify("shutdown", None).await;
        self.child.kill().await.map_err(|e| RouterError::Disconnect {
            server: self.server_name.clone(),
            reason: format!("failed to kill child process: {e}"),
        })
    }
}

// ─── HTTP Transport ──────────────────────────────────────────────────────────

/// JSON-RPC over HTTP POST.
///
/// Every request is an independent POST to the configured URL; the
/// configured headers ride along as client default headers. Correlation is
/// checked against the echoed response id.
pub struct HttpTransport {
    server_name: String,
    client: reqwest::Client,
    url: Url,
    next_id: AtomicU64,
}

impl HttpTransport {
    /// Create a new transport around a configured HTTP client.
    pub fn new(server_name: &str, client: reqwest::Client, url: Url) -> Self {
        Self {
            server_name: server_name.to_string(),
            client,
            url,
            next_id: AtomicU64::new(1),
        }
    }

    fn upstream_err(&self, reason: String) -> RouterError {
        RouterError::Upstream {
            server: self.server_name.clone(),
            reason,
        }
    }

    /// POST a JSON-RPC request and parse the response body.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, RouterError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = JsonRpcRequest::new(id, method, params);

        let response = self
            .client
            .post(self.url.clone())
            .json(&req)
            .send()
            .await
            .map_err(|e| self.upstream_err(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.upstream_err(format!("server answered HTTP {status}")));
        }

        let parsed: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| self.upstream_err(format!("failed to parse response body: {e}")))?;

        if parsed.id != id {
            return Err(self.upstream_err(format!(
                "response id {} does not match request id {id}",
                parsed.id
            )));
        }

        Ok(parsed)
    }

    /// POST a JSON-RPC notification; the response body is ignored.
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), RouterError> {
        let notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });

        self.client
            .post(self.url.clone())
            .json(&notification)
            .send()
            .await
            .map_err(|e| self.upstream_err(format!("notification failed: {e}")))?;

        Ok(())
    }

    /// Nothing to tear down: the connection pool is dropped with the client.
    pub async fn close(&mut self) -> Result<(), RouterError> {
        Ok(())
    }
}

// ─── Response Helpers ────────────────────────────────────────────────────────

/// Extract the result from a JSON-RPC response, converting a JSON-RPC error
/// object into [`RouterError::Rpc`].
pub fn extract_result(
    response: JsonRpcResponse,
    server: &str,
) -> Result<serde_json::Value, RouterError> {
    if let Some(err) = response.error {
        return Err(RouterError::Rpc {
            server: server.to_string(),
            code: err.code,
            message: err.message,
            data: err.data,
        });
    }

    response.result.ok_or_else(|| RouterError::Upstream {
        server: server.to_string(),
        reason: "response missing both result and error".into(),
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
