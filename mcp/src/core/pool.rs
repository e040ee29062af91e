//! MCP connection pool for configured backends.
//!
//! Holds at most one live session per backend name. Sessions are dialed
//! lazily on first use and remember the signature they were opened under; a
//! request carrying a different signature closes the old session and dials
//! again.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::{
    config::BackendSpec,
    signature::signature,
    transport::{BackendConnector, BackendSession},
};
use crate::error::McpResult;

/// Per-backend session lifecycle.
pub enum SessionState {
    Unconnected,
    Connected {
        session: Arc<dyn BackendSession>,
        signature: String,
    },
    Closing,
}

type Slot = Arc<Mutex<SessionState>>;

pub struct McpConnectionPool {
    slots: DashMap<String, Slot>,
    /// Signatures of settled `Connected` slots, for lock-free introspection.
    connected: DashMap<String, String>,
    connector: Arc<dyn BackendConnector>,
}

impl McpConnectionPool {
    pub fn new(connector: Arc<dyn BackendConnector>) -> Self {
        Self {
            slots: DashMap::new(),
            connected: DashMap::new(),
            connector,
        }
    }

    fn slot(&self, name: &str) -> Slot {
        Arc::clone(
            self.slots
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(SessionState::Unconnected)))
                .value(),
        )
    }

    /// Get the session for `name`, dialing or redialing as needed.
    pub async fn acquire(
        &self,
        name: &str,
        spec: &BackendSpec,
    ) -> McpResult<Arc<dyn BackendSession>> {
        let wanted = signature(Some(spec));
        let slot = self.slot(name);
        let mut state = slot.lock().await;

        if let SessionState::Connected { session, signature } = &*state {
            if *signature == wanted {
                return Ok(Arc::clone(session));
            }
            info!("Launch config for '{}' changed, reconnecting", name);
        }

        if let SessionState::Connected { session, .. } =
            std::mem::replace(&mut *state, SessionState::Closing)
        {
            self.connected.remove(name);
            if let Err(e) = session.close().await {
                warn!("Failed to close stale session for '{}': {}", name, e);
            }
        }
        *state = SessionState::Unconnected;

        let session = self.connector.connect(name, spec).await?;
        *state = SessionState::Connected {
            session: Arc::clone(&session),
            signature: wanted.clone(),
        };
        self.connected.insert(name.to_string(), wanted);
        debug!("Pooled session for '{}'", name);
        Ok(session)
    }

    /// Close the session for `name`. Returns whether one was open.
    pub async fn release(&self, name: &str) -> McpResult<bool> {
        let Some(slot) = self.slots.get(name).map(|s| Arc::clone(s.value())) else {
            return Ok(false);
        };
        let mut state = slot.lock().await;
        let previous = std::mem::replace(&mut *state, SessionState::Closing);
        self.connected.remove(name);

        let result = match previous {
            SessionState::Connected { session, .. } => {
                info!("Disconnecting from '{}'", name);
                session.close().await.map(|_| true)
            }
            _ => Ok(false),
        };
        *state = SessionState::Unconnected;
        result
    }

    /// Close every session concurrently. Returns the number of failures.
    pub async fn release_all(&self) -> usize {
        let names: Vec<String> = self.slots.iter().map(|e| e.key().clone()).collect();
        let results = join_all(names.iter().map(|name| self.release(name))).await;

        let mut failures = 0;
        for (name, result) in names.iter().zip(results) {
            if let Err(e) = result {
                error!("Error disconnecting from '{}': {}", name, e);
                failures += 1;
            }
        }
        failures
    }

    pub fn is_connected(&self, name: &str) -> bool {
        self.connected.contains_key(name)
    }

    /// Signature the live session for `name` was opened under.
    pub fn session_signature(&self, name: &str) -> Option<String> {
        self.connected.get(name).map(|s| s.value().clone())
    }

    pub fn connected_backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connected.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.connected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connected.is_empty()
    }
}
