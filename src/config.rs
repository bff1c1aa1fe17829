//! Server configuration — the declarative map of server name to connection
//! parameters, plus config-file location and loading.
//!
//! The config document follows the widely-used shape:
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "filesystem": { "command": "uvx", "args": ["mcp-server-fs"] },
//!     "search":     { "url": "https://tools.example.com/mcp" }
//!   }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::RouterError;
use crate::registry::Registry;

/// Environment variable that overrides every other config location.
pub const CONFIG_ENV: &str = "SWITCHBOARD_CONFIG";

// ─── Connection Parameters ──────────────────────────────────────────────────

/// Declared connection parameters for one upstream server, as written in
/// the config file.
///
/// The transport kind is either explicit (`transport`) or inferred from the
/// entry's shape; resolution and validation happen once, in
/// [`crate::transport::select`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerParams {
    /// Explicit transport kind: `"stdio"` or `"http"`. Inferred when absent.
    #[serde(default)]
    pub transport: Option<String>,
    /// Executable for stdio servers.
    #[serde(default)]
    pub command: Option<String>,
    /// Arguments passed to `command`.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment for the child process; overrides inherited values
    /// on key collision.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Endpoint for http servers.
    #[serde(default)]
    pub url: Option<String>,
    /// Headers attached to every request on an http transport.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Top-level config document.
///
/// A `BTreeMap` keeps entry iteration deterministic, so servers are
/// connected in name order.
#[derive(Debug, Clone, Deserialize)]
pub struct ServersConfig {
    #[serde(rename = "mcpServers")]
    pub mcp_servers: BTreeMap<String, ServerParams>,
}

// ─── Config Location ────────────────────────────────────────────────────────

/// Default config file candidates, in probe order.
fn default_config_candidates() -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from("switchboard.json")];
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("switchboard").join("servers.json"));
    }
    candidates
}

/// Resolve the config file path.
///
/// Precedence: the `SWITCHBOARD_CONFIG` environment variable, then the
/// `explicit` path (e.g. from a CLI flag), then the first existing default
/// candidate. Returns `None` when nothing resolves.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    default_config_candidates().into_iter().find(|p| p.exists())
}

/// Read and parse a config file.
///
/// A missing file or a document that does not match the expected shape is
/// fatal — unlike per-server connection failures, which are tolerated.
pub fn load_config(path: &Path) -> Result<ServersConfig, RouterError> {
    let raw = std::fs::read_to_string(path).map_err(|e| RouterError::Config {
        reason: format!("failed to read config file '{}': {e}", path.display()),
    })?;

    serde_json::from_str(&raw).map_err(|e| RouterError::Config {
        reason: format!("failed to parse config file '{}': {e}", path.display()),
    })
}

// ─── Loading ────────────────────────────────────────────────────────────────

/// Connect every server in the config, tolerating per-entry failure.
///
/// Entries whose name is already connected are skipped. Connection failures
/// are logged and collected; the loop always runs to completion. Returns
/// the failures so callers can report partial startup.
pub async fn load_from_config(
    registry: &Registry,
    config: &ServersConfig,
) -> Vec<(String, RouterError)> {
    let mut failures = Vec::new();

    for (name, params) in &config.mcp_servers {
        if registry.contains(name).await {
            tracing::warn!(server = %name, "already connected, skipping config entry");
            continue;
        }

        match registry.connect(name, params).await {
            Ok(()) => {}
            Err(e) => {
                tracing::warn!(server = %name, error = %e, "failed to connect configured server");
                failures.push((name.clone(), e));
            }
        }
    }

    failures
}

// ─── Tests ───────────────────────────────────────────────────────────────────
