// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-local registry of live connections, one slot per recipient.
//!
//! The registry is deliberately not shared across instances: delivery to a
//! recipient only succeeds on whichever process holds their connection, and
//! a miss elsewhere is a normal, non-error outcome.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

/// Handle to one live connection: a direct-send channel into its socket
/// writer plus the token that tears the connection down.
pub struct ConnectionHandle {
    pub conn_id: String,
    outbound: mpsc::Sender<String>,
    pub cancel: CancellationToken,
}

impl ConnectionHandle {
    pub fn new(outbound: mpsc::Sender<String>, cancel: CancellationToken) -> Self {
        Self { conn_id: uuid::Uuid::new_v4().to_string(), outbound, cancel }
    }
}

/// Maps recipient identity to its single currently-open connection.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Arc<ConnectionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for the recipient, replacing any prior entry.
    /// The superseded connection is actively cancelled so its loop closes the
    /// socket instead of leaving it orphaned.
    pub async fn connect(&self, recipient_id: &str, handle: Arc<ConnectionHandle>) {
        let previous = {
            let mut connections = self.connections.write().await;
            connections.insert(recipient_id.to_owned(), handle)
        };
        if let Some(previous) = previous {
            tracing::debug!(recipient_id, "connection replaced, cancelling superseded handle");
            previous.cancel.cancel();
        }
    }

    /// Remove the recipient's entry if it still belongs to `conn_id`.
    ///
    /// Keying removal by connection identity means a superseded loop's
    /// cleanup cannot evict its successor. Calling for an absent recipient
    /// is a no-op.
    pub async fn remove(&self, recipient_id: &str, conn_id: &str) {
        let mut connections = self.connections.write().await;
        if connections.get(recipient_id).is_some_and(|h| h.conn_id == conn_id) {
            connections.remove(recipient_id);
        }
    }

    /// Write a message to the recipient's live connection, if any.
    ///
    /// Returns `false` when no connection is registered or the connection is
    /// shutting down. Never an error: an absent connection is a normal
    /// condition — the message stays in the durable queue for the next
    /// successful connection.
    pub async fn send(&self, recipient_id: &str, message: String) -> bool {
        let handle = {
            let connections = self.connections.read().await;
            connections.get(recipient_id).map(Arc::clone)
        };
        match handle {
            Some(handle) => handle.outbound.send(message).await.is_ok(),
            None => {
                tracing::debug!(recipient_id, "send: no live connection");
                false
            }
        }
    }

    /// Whether the recipient currently has a registered connection.
    pub async fn contains(&self, recipient_id: &str) -> bool {
        self.connections.read().await.contains_key(recipient_id)
    }

    /// Number of registered connections.
    pub async fn connections(&self) -> usize {
        self.connections.read().await.len()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
