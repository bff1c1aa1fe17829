//! Name-keyed collection of live sessions.
//!
//! The registry is the sole owner of all sessions and the unit of
//! lifecycle: connect, disconnect, disconnect-all. At most one session
//! exists per server name — connecting twice under one name is an error,
//! never a silent replace.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::config::ServerParams;
use crate::errors::RouterError;
use crate::session::Session;

/// The registry of currently connected upstream servers.
///
/// The session map is the one shared mutable resource across concurrent
/// callers; it sits behind a `RwLock` so insert/remove are atomic with
/// respect to lookups.
#[derive(Default)]
pub struct Registry {
    sessions: RwLock<HashMap<String, Session>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Connect to an upstream server and register the session under `name`.
    ///
    /// Fails with `AlreadyConnected` if the name has a live session. The
    /// child environment for stdio servers is the current process
    /// environment overlaid with the entry's `env` map.
    pub async fn connect(&self, name: &str, params: &ServerParams) -> Result<(), RouterError> {
        if self.sessions.read().await.contains_key(name) {
            return Err(RouterError::AlreadyConnected {
                server: name.to_string(),
            });
        }

        let base_env: HashMap<String, String> = std::env::vars().collect();
        let session = Session::connect(name, params, &base_env).await?;

        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(name) {
            // A concurrent connect won the name while we were handshaking;
            // the fresh session is discarded, never the existing one.
            drop(sessions);
            let mut session = session;
            let _ = session.close().await;
            return Err(RouterError::AlreadyConnected {
                server: name.to_string(),
            });
        }
        sessions.insert(name.to_string(), session);

        tracing::info!(server = %name, "server registered");
        Ok(())
    }

    /// Disconnect one server.
    ///
    /// The entry is removed only after close reports success; a failed
    /// close leaves the session registered and surfaces `Disconnect`.
    pub async fn disconnect(&self, name: &str) -> Result<(), RouterError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(name)
            .ok_or_else(|| RouterError::NotConnected {
                server: name.to_string(),
            })?;

        session.close().await?;
        sessions.remove(name);

        tracing::info!(server = %name, "server disconnected");
        Ok(())
    }

    /// Disconnect every connected server, best-effort.
    ///
    /// Works from a snapshot of names taken at call time and keeps going
    /// when an individual close fails; all failures are collected and
    /// returned.
    pub async fn disconnect_all(&self) -> Vec<(String, RouterError)> {
        let mut failures = Vec::new();

        for name in self.list().await {
            if let Err(e) = self.disconnect(&name).await {
                tracing::warn!(server = %name, error = %e, "failed to disconnect server");
                failures.push((name, e));
            }
        }

        failures
    }

    /// Names of all currently connected servers, sorted. Snapshot
    /// semantics — not a live view.
    pub async fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether a server name has a live session.
    pub async fn contains(&self, name: &str) -> bool {
        self.sessions.read().await.contains_key(name)
    }

    /// Read access to the session map for the query operations.
    ///
    /// Sessions are borrowed for the duration of one call and never handed
    /// out of the registry.
    pub(crate) async fn sessions(
        &self,
    ) -> tokio::sync::RwLockReadGuard<'_, HashMap<String, Session>> {
        self.sessions.read().await
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
