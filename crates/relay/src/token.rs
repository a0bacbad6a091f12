// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-time handshake tokens for WebSocket upgrades.
//!
//! A token authorizes exactly one connection attempt and expires after a
//! short TTL, so the long-lived session credential never appears on the
//! connection URL. Validation is destructive: the mapping is removed on
//! lookup whether or not the connection attempt ultimately succeeds.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Issues and atomically consumes one-time handshake tokens.
///
/// `consume` must never report success twice for the same token, even under
/// concurrent callers. Absence (never issued, already used, expired) is a
/// normal outcome, distinct from a store transport failure.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn issue(&self, recipient_id: &str) -> anyhow::Result<String>;
    async fn consume(&self, token: &str) -> anyhow::Result<Option<String>>;
}

/// Generate a handshake token: 32 random bytes, URL-safe unpadded base64.
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// Process-local [`TokenStore`] for single-process deployments and tests.
pub struct MemoryTokenStore {
    ttl: Duration,
    entries: Arc<Mutex<HashMap<String, (String, Instant)>>>,
}

impl MemoryTokenStore {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: Arc::new(Mutex::new(HashMap::new())) }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn issue(&self, recipient_id: &str) -> anyhow::Result<String> {
        let token = generate_token();
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        // Sweep expired entries so abandoned tokens don't pile up.
        entries.retain(|_, (_, expires)| *expires > now);
        entries.insert(token.clone(), (recipient_id.to_owned(), now + self.ttl));
        Ok(token)
    }

    async fn consume(&self, token: &str) -> anyhow::Result<Option<String>> {
        // The lock spans lookup-and-remove, so two concurrent consumers of
        // the same token cannot both succeed.
        let mut entries = self.entries.lock().await;
        let Some((recipient_id, expires)) = entries.remove(token) else {
            return Ok(None);
        };
        if expires <= Instant::now() {
            return Ok(None);
        }
        Ok(Some(recipient_id))
    }
}

// ---------------------------------------------------------------------------
// JetStream KV backend
// ---------------------------------------------------------------------------

/// [`TokenStore`] backed by a JetStream key-value bucket.
///
/// The bucket's `max_age` enforces the TTL; consume is a compare-and-delete
/// on the entry revision, so the store itself arbitrates racing consumers.
pub struct KvTokenStore {
    kv: async_nats::jetstream::kv::Store,
}

impl KvTokenStore {
    /// Get or create the handshake-token bucket with the given TTL.
    pub async fn connect(
        client: async_nats::Client,
        bucket: &str,
        ttl: Duration,
    ) -> anyhow::Result<Self> {
        let js = async_nats::jetstream::new(client);
        let kv = match js.get_key_value(bucket).await {
            Ok(kv) => kv,
            Err(_) => {
                js.create_key_value(async_nats::jetstream::kv::Config {
                    bucket: bucket.to_owned(),
                    max_age: ttl,
                    history: 1,
                    ..Default::default()
                })
                .await?
            }
        };
        tracing::info!(bucket, ttl_secs = ttl.as_secs(), "handshake token bucket ready");
        Ok(Self { kv })
    }
}

#[async_trait]
impl TokenStore for KvTokenStore {
    async fn issue(&self, recipient_id: &str) -> anyhow::Result<String> {
        let token = generate_token();
        // Clear any pre-existing entry under this key before writing.
        let _ = self.kv.purge(token.as_str()).await;
        self.kv.put(token.as_str(), recipient_id.as_bytes().to_vec().into()).await?;
        Ok(token)
    }

    async fn consume(&self, token: &str) -> anyhow::Result<Option<String>> {
        let Some(entry) = self.kv.entry(token).await? else {
            return Ok(None);
        };
        if !matches!(entry.operation, async_nats::jetstream::kv::Operation::Put) {
            return Ok(None);
        }

        // Compare-and-delete on the observed revision. A rejection means
        // another consumer won the race (or the store hiccuped): report
        // absent either way — a token may be refused spuriously, but it can
        // never be accepted twice.
        match self.kv.purge_expect_revision(token, Some(entry.revision)).await {
            Ok(()) => {
                let recipient_id = String::from_utf8(entry.value.to_vec())
                    .map_err(|e| anyhow::anyhow!("token entry is not utf-8: {e}"))?;
                Ok(Some(recipient_id))
            }
            Err(e) => {
                tracing::debug!(err = %e, "token consume lost compare-and-delete");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;
