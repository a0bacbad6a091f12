// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Herald: real-time notification relay.
//!
//! Issues one-time handshake tokens, accepts WebSocket connections, and
//! drains a durable per-recipient queue onto each live connection. Events
//! produced while a recipient is offline are delivered, in order, once they
//! reconnect.

pub mod config;
pub mod error;
pub mod notification;
pub mod producer;
pub mod queue;
pub mod registry;
pub mod state;
pub mod token;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;
use crate::notification::EventMaterializer;
use crate::producer::NotificationProducer;
use crate::queue::{JetStreamQueue, MemoryQueue, RecipientQueue};
use crate::state::RelayState;
use crate::token::{KvTokenStore, MemoryTokenStore, TokenStore};
use crate::transport::build_router;

/// KV bucket holding handshake tokens.
const TOKEN_BUCKET: &str = "herald-tokens";

/// Run the relay until ctrl-c.
pub async fn run(config: RelayConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            shutdown.cancel();
        });
    }
    serve(config, shutdown).await
}

/// Run the relay server until the shutdown token fires.
pub async fn serve(config: RelayConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);

    let (tokens, queue): (Arc<dyn TokenStore>, Arc<dyn RecipientQueue>) = match config.nats_url {
        Some(ref url) => {
            let mut opts = async_nats::ConnectOptions::new();
            if let Some(ref token) = config.nats_token {
                opts = opts.token(token.clone());
            }
            opts = opts.retry_on_initial_connect();

            tracing::info!(url = %url, "connecting to NATS");
            let client = opts.connect(url).await?;

            let tokens =
                KvTokenStore::connect(client.clone(), TOKEN_BUCKET, config.token_ttl()).await?;
            let queue =
                JetStreamQueue::connect(client, &config.stream, &config.subject_prefix).await?;
            (Arc::new(tokens), Arc::new(queue))
        }
        None => {
            tracing::info!("no --nats-url, using in-process backends (no durability)");
            let tokens = MemoryTokenStore::new(config.token_ttl());
            (Arc::new(tokens), Arc::new(MemoryQueue::new()))
        }
    };

    let producer = NotificationProducer::new(Arc::clone(&queue), Arc::new(EventMaterializer));
    let state = Arc::new(RelayState::new(config, tokens, queue, producer, shutdown.clone()));

    tracing::info!("herald listening on {addr}");
    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}
