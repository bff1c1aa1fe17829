//! Router error types.

use thiserror::Error;

/// Errors that can occur across the session registry and tool router.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Malformed or incomplete connection parameters. Raised before any
    /// I/O is attempted.
    #[error("config error: {reason}")]
    Config {
        reason: String,
    },

    /// Spawn, dial, or handshake failure. The connection attempt is
    /// abandoned and nothing is registered.
    #[error("failed to connect to server '{server}': {reason}")]
    Connection {
        server: String,
        reason: String,
    },

    /// Name collision on registration.
    #[error("server '{server}' is already connected")]
    AlreadyConnected {
        server: String,
    },

    /// Lookup miss — no live session under this name.
    #[error("server '{server}' is not connected")]
    NotConnected {
        server: String,
    },

    /// A connected session's request failed or the upstream returned a
    /// malformed response.
    #[error("upstream error from server '{server}': {reason}")]
    Upstream {
        server: String,
        reason: String,
    },

    /// The upstream answered with a JSON-RPC error object.
    #[error("server '{server}' returned error [{code}]: {message}")]
    Rpc {
        server: String,
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// Exact-name lookup miss within a live tool listing.
    #[error("tool '{tool}' not found on server '{server}'")]
    ToolNotFound {
        server: String,
        tool: String,
    },

    /// A search pattern failed to compile as a regular expression.
    #[error("invalid search pattern '{pattern}': {reason}")]
    InvalidPattern {
        pattern: String,
        reason: String,
    },

    /// Close failed — the session remains in the registry.
    #[error("failed to disconnect server '{server}': {reason}")]
    Disconnect {
        server: String,
        reason: String,
    },
}
