// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notification records and the wire envelope sent to connected clients.
//!
//! Wire frames use an internally-tagged JSON enum (`{"type": "notification",
//! ...}`). A single variant exists today; the tag keeps the protocol open for
//! additional server-to-client message kinds.

use serde::{Deserialize, Serialize};

/// A persisted notification record, as handed over by the domain layer.
///
/// The relay consumes these read-only: it never creates, mutates, or deletes
/// notification records. Flipping `is_delivered` after a successful enqueue
/// is the caller's (best-effort) concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub recipient_id: String,
    /// Creation time in epoch milliseconds.
    pub created_at: u64,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub is_delivered: bool,
    /// Opaque rendered event payload.
    #[serde(default)]
    pub event: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Server -> Client
// ---------------------------------------------------------------------------

/// Envelope for messages pushed over a live connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    Notification { data: NotificationData },
}

/// The recipient-facing representation of a [`Notification`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationData {
    pub id: String,
    pub created_at: u64,
    pub is_read: bool,
    pub event: serde_json::Value,
}

/// Renders a notification into its recipient-facing payload.
///
/// Returning `None` suppresses delivery entirely (e.g. permission filtering
/// decided the recipient should not see this). Suppression is a silent
/// no-op for the producer, not an error.
pub trait Materializer: Send + Sync {
    fn materialize(&self, notification: &Notification, recipient_id: &str)
        -> Option<NotificationData>;
}

/// Default materializer: forwards the stored event payload as-is and
/// suppresses notifications whose event rendered to nothing.
pub struct EventMaterializer;

impl Materializer for EventMaterializer {
    fn materialize(
        &self,
        notification: &Notification,
        _recipient_id: &str,
    ) -> Option<NotificationData> {
        if notification.event.is_null() {
            return None;
        }
        Some(NotificationData {
            id: notification.id.clone(),
            created_at: notification.created_at,
            is_read: notification.is_read,
            event: notification.event.clone(),
        })
    }
}

#[cfg(test)]
#[path = "notification_tests.rs"]
mod tests;
