// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable per-recipient message queues.
//!
//! Producers append serialized wire messages; exactly one delivery loop per
//! recipient drains them. Entries survive until acknowledged, and an
//! unacknowledged entry is redelivered (NAK or ack-wait expiry), giving
//! at-least-once delivery with per-recipient FIFO ordering.

pub mod jetstream;
pub mod memory;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::Bytes;

pub use jetstream::JetStreamQueue;
pub use memory::MemoryQueue;

/// Ordered, at-least-once message queue keyed by recipient identity.
#[async_trait]
pub trait RecipientQueue: Send + Sync {
    /// Durably append a payload to the recipient's queue. Returns only after
    /// the entry is accepted by the backing store; does not wait for (or
    /// require) a connected consumer.
    async fn enqueue(&self, recipient_id: &str, payload: Bytes) -> anyhow::Result<()>;

    /// Pull up to `max` currently-available messages without waiting.
    /// Returns an empty vec when the queue has nothing deliverable.
    async fn fetch(&self, recipient_id: &str, max: usize) -> anyhow::Result<Vec<QueuedMessage>>;
}

/// Map an opaque recipient id to a subject-safe, deterministic token.
///
/// Stable across processes and restarts, so every producer reaches the same
/// durable queue regardless of which process serves the live connection.
pub fn subject_token(recipient_id: &str) -> String {
    URL_SAFE_NO_PAD.encode(recipient_id.as_bytes())
}

/// A leased queue entry. Dropping it without [`ack`](Self::ack) leaves the
/// entry eligible for redelivery once its ack wait expires; [`nak`](Self::nak)
/// makes it redeliverable immediately.
pub struct QueuedMessage {
    payload: Bytes,
    acker: Acker,
}

enum Acker {
    Memory { inner: std::sync::Arc<memory::MemoryInner>, recipient_id: String, seq: u64 },
    JetStream(Box<async_nats::jetstream::Message>),
}

impl QueuedMessage {
    pub(crate) fn from_memory(
        payload: Bytes,
        inner: std::sync::Arc<memory::MemoryInner>,
        recipient_id: String,
        seq: u64,
    ) -> Self {
        Self { payload, acker: Acker::Memory { inner, recipient_id, seq } }
    }

    pub(crate) fn from_jetstream(message: async_nats::jetstream::Message) -> Self {
        Self { payload: message.payload.clone(), acker: Acker::JetStream(Box::new(message)) }
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Acknowledge the entry, removing it from the queue. Call only after the
    /// payload has been forwarded.
    pub async fn ack(self) -> anyhow::Result<()> {
        match self.acker {
            Acker::Memory { inner, recipient_id, seq } => {
                inner.ack(&recipient_id, seq).await;
                Ok(())
            }
            Acker::JetStream(message) => {
                message.ack().await.map_err(|e| anyhow::anyhow!("jetstream ack failed: {e}"))
            }
        }
    }

    /// Negatively acknowledge: release the lease so the entry is redelivered
    /// to whichever consumer attaches next. Best-effort.
    pub async fn nak(self) {
        match self.acker {
            Acker::Memory { inner, recipient_id, seq } => {
                inner.release(&recipient_id, seq).await;
            }
            Acker::JetStream(message) => {
                use async_nats::jetstream::AckKind;
                if let Err(e) = message.ack_with(AckKind::Nak(None)).await {
                    tracing::debug!(err = %e, "jetstream nak failed");
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
