// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Producer path: notification record -> wire message -> durable enqueue.

use std::sync::Arc;

use crate::notification::{Materializer, Notification, WireMessage};
use crate::queue::RecipientQueue;

/// Turns freshly created notification records into queued wire messages.
///
/// This is the sole entry point the notification-creation path calls after
/// persisting a record. It waits for the durable enqueue, never for
/// delivery.
pub struct NotificationProducer {
    queue: Arc<dyn RecipientQueue>,
    materializer: Arc<dyn Materializer>,
}

impl NotificationProducer {
    pub fn new(queue: Arc<dyn RecipientQueue>, materializer: Arc<dyn Materializer>) -> Self {
        Self { queue, materializer }
    }

    /// Enqueue the notification for its recipient.
    ///
    /// Returns `Ok(false)` when materialization suppresses the notification
    /// (a silent no-op, not a failure). An enqueue failure propagates: the
    /// caller must not believe a dropped notification was queued.
    pub async fn push(&self, notification: &Notification) -> anyhow::Result<bool> {
        let recipient_id = notification.recipient_id.as_str();
        let Some(data) = self.materializer.materialize(notification, recipient_id) else {
            tracing::debug!(
                notification_id = %notification.id,
                recipient_id,
                "materialization suppressed notification"
            );
            return Ok(false);
        };

        let payload = serde_json::to_vec(&WireMessage::Notification { data })?;
        self.queue.enqueue(recipient_id, payload.into()).await?;

        tracing::debug!(notification_id = %notification.id, recipient_id, "notification enqueued");
        Ok(true)
    }
}

#[cfg(test)]
#[path = "producer_tests.rs"]
mod tests;
