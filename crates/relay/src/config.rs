// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for the herald relay.
#[derive(Debug, Clone, clap::Parser)]
pub struct RelayConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "HERALD_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 9610, env = "HERALD_PORT")]
    pub port: u16,

    /// Bearer token for HTTP API auth. If unset, auth is disabled.
    #[arg(long, env = "HERALD_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// NATS server URL. If unset, the relay runs with in-process backends
    /// (no cross-restart durability).
    #[arg(long, env = "HERALD_NATS_URL")]
    pub nats_url: Option<String>,

    /// NATS auth token.
    #[arg(long, env = "HERALD_NATS_TOKEN")]
    pub nats_token: Option<String>,

    /// JetStream stream name for queued notifications.
    #[arg(long, default_value = "HERALD_NOTIFY", env = "HERALD_STREAM")]
    pub stream: String,

    /// Subject prefix for per-recipient queue subjects.
    #[arg(long, default_value = "notify", env = "HERALD_SUBJECT_PREFIX")]
    pub subject_prefix: String,

    /// Handshake token time-to-live in seconds.
    #[arg(long, default_value_t = 60, env = "HERALD_TOKEN_TTL_SECS")]
    pub token_ttl_secs: u64,

    /// Queue poll interval in milliseconds for idle connections.
    #[arg(long, default_value_t = 10_000, env = "HERALD_POLL_INTERVAL_MS")]
    pub poll_interval_ms: u64,

    /// Max messages pulled from the queue per fetch.
    #[arg(long, default_value_t = 16, env = "HERALD_FETCH_BATCH")]
    pub fetch_batch: usize,

    /// Buffered capacity of each connection's direct-send channel.
    #[arg(long, default_value_t = 32, env = "HERALD_OUTBOUND_BUFFER")]
    pub outbound_buffer: usize,
}

impl RelayConfig {
    pub fn token_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.token_ttl_secs)
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
