// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end relay smoke tests.
//!
//! Runs the herald server in-process with the in-memory backends (no broker
//! required) on an ephemeral port, and exercises it over real HTTP and
//! WebSocket clients.

use std::time::Duration;

use herald::config::RelayConfig;
use tokio_util::sync::CancellationToken;

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// A relay server running in-process, shut down on drop.
pub struct RelayServer {
    port: u16,
    shutdown: CancellationToken,
}

impl RelayServer {
    /// Start with no API auth and a short poll interval.
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_with_auth(None).await
    }

    /// Start with a bearer token required on the HTTP API.
    pub async fn start_with_auth(auth_token: Option<&str>) -> anyhow::Result<Self> {
        let port = free_port()?;
        let config = RelayConfig {
            host: "127.0.0.1".to_owned(),
            port,
            auth_token: auth_token.map(|t| t.to_owned()),
            nats_url: None,
            nats_token: None,
            stream: "HERALD_NOTIFY".to_owned(),
            subject_prefix: "notify".to_owned(),
            token_ttl_secs: 60,
            // Short poll so delivery-latency assertions stay fast.
            poll_interval_ms: 200,
            fetch_batch: 16,
            outbound_buffer: 32,
        };

        let shutdown = CancellationToken::new();
        tokio::spawn(herald::serve(config, shutdown.clone()));

        let server = Self { port, shutdown };
        server.wait_healthy(Duration::from_secs(10)).await?;
        Ok(server)
    }

    /// Base URL for HTTP requests.
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// WebSocket upgrade URL carrying a handshake token.
    pub fn ws_url(&self, token: &str) -> String {
        format!("ws://127.0.0.1:{}/ws/notifications?token={token}", self.port)
    }

    /// WebSocket upgrade URL with no token at all.
    pub fn ws_url_no_token(&self) -> String {
        format!("ws://127.0.0.1:{}/ws/notifications", self.port)
    }

    /// Issue a handshake token for the given recipient.
    pub async fn issue_token(&self, recipient_id: &str) -> anyhow::Result<String> {
        let resp: serde_json::Value = reqwest::Client::new()
            .post(format!("{}/api/v1/token", self.base_url()))
            .header("x-recipient-id", recipient_id)
            .send()
            .await?
            .json()
            .await?;
        resp["token"]
            .as_str()
            .map(|t| t.to_owned())
            .ok_or_else(|| anyhow::anyhow!("no token in response: {resp}"))
    }

    /// POST a notification record into the producer endpoint.
    pub async fn post_notification(
        &self,
        notification: &serde_json::Value,
    ) -> anyhow::Result<serde_json::Value> {
        let resp = reqwest::Client::new()
            .post(format!("{}/api/v1/notifications", self.base_url()))
            .json(notification)
            .send()
            .await?;
        anyhow::ensure!(resp.status().is_success(), "enqueue rejected: {}", resp.status());
        Ok(resp.json().await?)
    }

    /// Poll health until responsive.
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let client = reqwest::Client::new();
        let url = format!("{}/api/v1/health", self.base_url());
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("herald did not become healthy within {timeout:?}");
            }
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Current number of registered live connections.
    pub async fn connection_count(&self) -> anyhow::Result<usize> {
        let resp: serde_json::Value = reqwest::Client::new()
            .get(format!("{}/api/v1/health", self.base_url()))
            .send()
            .await?
            .json()
            .await?;
        resp["connections"]
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| anyhow::anyhow!("no connection count in: {resp}"))
    }
}

impl Drop for RelayServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
