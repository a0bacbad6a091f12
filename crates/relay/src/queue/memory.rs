// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process queue backend for single-process deployments and tests.
//!
//! Semantics mirror the JetStream backend: FIFO per recipient, leased
//! delivery, ack removes, NAK or lease expiry re-offers. Fetch never skips
//! past a still-leased entry, so redelivery cannot reorder a recipient's
//! messages.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{QueuedMessage, RecipientQueue};

const ACK_WAIT: Duration = Duration::from_secs(30);

struct Entry {
    seq: u64,
    payload: Bytes,
    leased_until: Option<Instant>,
}

#[derive(Default)]
struct Channel {
    next_seq: u64,
    entries: VecDeque<Entry>,
}

#[derive(Default)]
pub(crate) struct MemoryInner {
    channels: Mutex<HashMap<String, Channel>>,
}

impl MemoryInner {
    pub(crate) async fn ack(&self, recipient_id: &str, seq: u64) {
        let mut channels = self.channels.lock().await;
        if let Some(channel) = channels.get_mut(recipient_id) {
            channel.entries.retain(|e| e.seq != seq);
        }
    }

    pub(crate) async fn release(&self, recipient_id: &str, seq: u64) {
        let mut channels = self.channels.lock().await;
        if let Some(channel) = channels.get_mut(recipient_id) {
            if let Some(entry) = channel.entries.iter_mut().find(|e| e.seq == seq) {
                entry.leased_until = None;
            }
        }
    }
}

/// In-memory [`RecipientQueue`]. No durability across restarts.
#[derive(Default)]
pub struct MemoryQueue {
    inner: Arc<MemoryInner>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecipientQueue for MemoryQueue {
    async fn enqueue(&self, recipient_id: &str, payload: Bytes) -> anyhow::Result<()> {
        let mut channels = self.inner.channels.lock().await;
        let channel = channels.entry(recipient_id.to_owned()).or_default();
        let seq = channel.next_seq;
        channel.next_seq += 1;
        channel.entries.push_back(Entry { seq, payload, leased_until: None });
        Ok(())
    }

    async fn fetch(&self, recipient_id: &str, max: usize) -> anyhow::Result<Vec<QueuedMessage>> {
        let now = Instant::now();
        let lease = now + ACK_WAIT;
        let mut out = Vec::new();

        let mut channels = self.inner.channels.lock().await;
        let Some(channel) = channels.get_mut(recipient_id) else {
            return Ok(out);
        };
        for entry in channel.entries.iter_mut() {
            if out.len() >= max {
                break;
            }
            // A live lease at the head blocks everything behind it; skipping
            // ahead would let redelivery reorder the recipient's messages.
            if entry.leased_until.is_some_and(|t| t > now) {
                break;
            }
            entry.leased_until = Some(lease);
            out.push(QueuedMessage::from_memory(
                entry.payload.clone(),
                Arc::clone(&self.inner),
                recipient_id.to_owned(),
                entry.seq,
            ));
        }
        Ok(out)
    }
}
