//! One live session with one upstream server.
//!
//! A `Session` exists only in the connected state: it is created by a
//! successful handshake and destroyed by an explicit close. There is no
//! retry, reconnection, or idle eviction — a failed connect leaves nothing
//! behind, and a failed request leaves the session as it was.

use std::collections::HashMap;

use serde_json::Value;

use crate::config::ServerParams;
use crate::errors::RouterError;
use crate::transport::{self, Transport};
use crate::types::{InitializeResult, ToolDescriptor, ToolListResult};

/// Protocol revision announced during the handshake.
const PROTOCOL_VERSION: &str = "2024-11-05";
const CLIENT_NAME: &str = "switchboard";
const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A live connection to one upstream server.
///
/// Owns exactly one transport; never shared between registry entries.
pub struct Session {
    name: String,
    transport: Transport,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("name", &self.name).finish()
    }
}

impl Session {
    /// Establish a session: select and open the transport, then perform the
    /// `initialize` handshake and send `notifications/initialized`.
    ///
    /// `base_env` is the environment stdio children inherit before the
    /// entry's own `env` overrides are applied.
    ///
    /// Any failure abandons the attempt: a spawned child is killed and the
    /// error reports the server name with the underlying cause.
    pub async fn connect(
        name: &str,
        params: &ServerParams,
        base_env: &HashMap<String, String>,
    ) -> Result<Self, RouterError> {
        let spec = transport::select(params, base_env)?;
        let mut transport = spec.open(name).await?;

        match handshake(&transport, name).await {
            Ok(init) => {
                let info = init.server_info.unwrap_or_default();
                tracing::info!(
                    server = %name,
                    upstream_name = %info.name.unwrap_or_default(),
                    upstream_version = %info.version.unwrap_or_default(),
                    "session established"
                );
                Ok(Self {
                    name: name.to_string(),
                    transport,
                })
            }
            Err(e) => {
                let _ = transport.close().await;
                Err(connection_failure(name, e))
            }
        }
    }

    /// The server name this session is registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fetch the upstream's current tool collection.
    ///
    /// Always a live round trip — listings are never cached. A response
    /// without a `tools` array is malformed and reported as an upstream
    /// error; an empty array is a valid answer.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, RouterError> {
        let response = self.transport.request("tools/list", None).await?;
        let result = transport::extract_result(response, &self.name)?;

        let listing: ToolListResult =
            serde_json::from_value(result).map_err(|e| RouterError::Upstream {
                server: self.name.clone(),
                reason: format!("malformed tools/list response: {e}"),
            })?;

        Ok(listing.tools)
    }

    /// Invoke a tool and return the upstream's raw result value.
    ///
    /// Arguments pass through unmodified; interpreting the result shape is
    /// the caller's business.
    pub async fn call_tool(&self, tool: &str, arguments: Value) -> Result<Value, RouterError> {
        let params = serde_json::json!({
            "name": tool,
            "arguments": arguments,
        });

        let response = self.transport.request("tools/call", Some(params)).await?;
        transport::extract_result(response, &self.name)
    }

    /// Terminate the underlying transport.
    ///
    /// On failure the session is left as-is; the registry removes an entry
    /// only after close reports success.
    pub async fn close(&mut self) -> Result<(), RouterError> {
        self.transport.close().await
    }
}

/// Perform the initialize handshake over a freshly opened transport.
async fn handshake(transport: &Transport, server: &str) -> Result<InitializeResult, RouterError> {
    let params = serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": { "tools": {} },
        "clientInfo": { "name": CLIENT_NAME, "version": CLIENT_VERSION },
    });

    let response = transport.request("initialize", Some(params)).await?;
    let result = transport::extract_result(response, server)?;

    let init: InitializeResult =
        serde_json::from_value(result).map_err(|e| RouterError::Upstream {
            server: server.to_string(),
            reason: format!("failed to parse initialize response: {e}"),
        })?;

    transport.notify("notifications/initialized", None).await?;

    Ok(init)
}

/// Fold a handshake-phase failure into a connection error carrying the
/// server name, without double-wrapping config errors or losing the cause.
fn connection_failure(server: &str, err: RouterError) -> RouterError {
    match err {
        RouterError::Config { .. } | RouterError::Connection { .. } => err,
        RouterError::Upstream { reason, .. } => RouterError::Connection {
            server: server.to_string(),
            reason,
        },
        RouterError::Rpc { code, message, .. } => RouterError::Connection {
            server: server.to_string(),
            reason: format!("[{code}] {message}"),
        },
        other => RouterError::Connection {
            server: server.to_string(),
            reason: other.to_string(),
        },
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
