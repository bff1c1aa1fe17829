//! Switchboard — multi-server MCP session registry and tool router.
//!
//! This crate handles:
//! - Connecting to many independently-addressed upstream tool servers over
//!   stdio (child process) or HTTP transports
//! - JSON-RPC 2.0 communication with each upstream
//! - A name-keyed registry of live sessions with at-most-one session per
//!   server name
//! - Live tool enumeration, exact lookup, and regex search across one or
//!   all connected servers
//! - Declarative configuration (`{ "mcpServers": { ... } }`) with tolerant
//!   per-entry loading
//!
//! Tool listings are never cached: every query operation is a live round
//! trip, so results always reflect what the upstream reports right now.

pub mod config;
pub mod errors;
pub mod query;
pub mod registry;
pub mod session;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use config::{load_config, load_from_config, resolve_config_path, ServerParams, ServersConfig};
pub use errors::RouterError;
pub use query::{SearchEntry, SearchField, SearchOptions};
pub use registry::Registry;
pub use session::Session;
pub use transport::{select, Transport, TransportKind, TransportSpec};
pub use types::{ToolDescriptor, ToolSummary};
