// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket upgrade and the per-connection delivery loop.
//!
//! Lifecycle per connection: the transport handshake always completes, then
//! the one-time token is consumed. An absent token closes immediately with a
//! policy-violation frame and zero data frames. A resolved recipient is
//! registered and streamed to until the connection goes away, at which point
//! the registry entry is removed on every exit path.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::queue::RecipientQueue;
use crate::registry::ConnectionHandle;
use crate::state::RelayState;

/// Query parameters for the notification WS upgrade.
#[derive(Debug, Clone, Deserialize)]
pub struct NotifyWsQuery {
    pub token: Option<String>,
}

/// `GET /ws/notifications` — live-connection upgrade.
pub async fn ws_handler(
    State(state): State<Arc<RelayState>>,
    Query(query): Query<NotifyWsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    // Always complete the upgrade; a bad token is answered with a close
    // frame rather than a silently dropped socket.
    ws.on_upgrade(move |socket| handle_ws(state, query.token, socket))
}

/// Per-connection handler: authorize, register, stream, clean up.
async fn handle_ws(state: Arc<RelayState>, token: Option<String>, mut socket: WebSocket) {
    // The token is consumed exactly once; validation is destructive whether
    // or not the rest of the connection attempt succeeds.
    let recipient_id = match token {
        Some(ref token) => match state.tokens.consume(token).await {
            Ok(Some(recipient_id)) => recipient_id,
            Ok(None) => {
                close_with(&mut socket, close_code::POLICY, "invalid or expired token").await;
                return;
            }
            Err(e) => {
                tracing::warn!(err = %e, "token store lookup failed during handshake");
                close_with(&mut socket, close_code::ERROR, "token store unavailable").await;
                return;
            }
        },
        None => {
            close_with(&mut socket, close_code::POLICY, "missing token").await;
            return;
        }
    };

    let (outbound_tx, outbound_rx) = mpsc::channel(state.config.outbound_buffer);
    let cancel = CancellationToken::new();
    let handle = Arc::new(ConnectionHandle::new(outbound_tx, cancel.clone()));
    let conn_id = handle.conn_id.clone();
    state.registry.connect(&recipient_id, handle).await;
    tracing::info!(recipient_id = %recipient_id, conn_id = %conn_id, "notification stream open");

    stream_notifications(&state, &recipient_id, socket, outbound_rx, cancel).await;

    // Cleanup runs on every exit path; keyed by conn_id so a superseded
    // loop cannot evict its successor.
    state.registry.remove(&recipient_id, &conn_id).await;
    tracing::info!(recipient_id = %recipient_id, conn_id = %conn_id, "notification stream closed");
}

/// The streaming loop: drain the durable queue on a poll interval (first
/// drain immediate), forward direct sends, and exit on any connection-level
/// failure, client close, supersession, or shutdown.
async fn stream_notifications(
    state: &RelayState,
    recipient_id: &str,
    socket: WebSocket,
    mut outbound_rx: mpsc::Receiver<String>,
    cancel: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut poll = tokio::time::interval(state.config.poll_interval());
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                // Superseded by a newer connection for the same recipient.
                let frame = CloseFrame { code: close_code::NORMAL, reason: "superseded".into() };
                let _ = ws_tx.send(Message::Close(Some(frame))).await;
                break;
            }

            _ = state.shutdown.cancelled() => {
                let frame = CloseFrame { code: close_code::AWAY, reason: "shutting down".into() };
                let _ = ws_tx.send(Message::Close(Some(frame))).await;
                break;
            }

            _ = poll.tick() => {
                match drain(state.queue.as_ref(), recipient_id, state.config.fetch_batch, &mut ws_tx).await {
                    Ok(0) => {}
                    Ok(delivered) => {
                        tracing::debug!(recipient_id, delivered, "drained queued notifications");
                    }
                    Err(e) => {
                        tracing::debug!(recipient_id, err = %e, "forward failed, closing stream");
                        break;
                    }
                }
            }

            direct = outbound_rx.recv() => {
                match direct {
                    Some(text) => {
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    // Inbound data frames are ignored: this stream is
                    // server-push only.
                    _ => {}
                }
            }
        }
    }
}

/// Complete the handshake's close path: send an explicit close frame.
async fn close_with(socket: &mut WebSocket, code: u16, reason: &'static str) {
    let frame = CloseFrame { code, reason: reason.into() };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

/// Sink half of a live connection, as seen by the delivery loop.
#[async_trait]
trait Forward: Send {
    async fn forward(&mut self, text: String) -> anyhow::Result<()>;
}

#[async_trait]
impl Forward for SplitSink<WebSocket, Message> {
    async fn forward(&mut self, text: String) -> anyhow::Result<()> {
        self.send(Message::Text(text.into()))
            .await
            .map_err(|e| anyhow::anyhow!("ws send failed: {e}"))
    }
}

/// Drain the currently-available queue entries onto the connection.
///
/// Each payload is forwarded verbatim as a text frame and acknowledged only
/// after the forward succeeds; a failed forward NAKs the entry (leaving it
/// redeliverable) and aborts with an error. Queue fetch failures are
/// transient: the drain ends quietly and the next poll retries.
async fn drain<F: Forward>(
    queue: &dyn RecipientQueue,
    recipient_id: &str,
    batch: usize,
    sink: &mut F,
) -> anyhow::Result<usize> {
    let mut delivered = 0usize;
    loop {
        let messages = match queue.fetch(recipient_id, batch).await {
            Ok(messages) => messages,
            Err(e) => {
                tracing::debug!(recipient_id, err = %e, "queue fetch failed, retrying next poll");
                return Ok(delivered);
            }
        };
        if messages.is_empty() {
            return Ok(delivered);
        }

        let fetched = messages.len();
        let mut batch_iter = messages.into_iter();
        while let Some(message) = batch_iter.next() {
            let text = match String::from_utf8(message.payload().to_vec()) {
                Ok(text) => text,
                Err(e) => {
                    // A non-UTF-8 entry can never become a text frame; ack it
                    // to avoid an infinite redelivery loop.
                    tracing::warn!(recipient_id, err = %e, "dropping non-utf8 queue entry");
                    if let Err(e) = message.ack().await {
                        tracing::warn!(recipient_id, err = %e, "ack failed");
                    }
                    continue;
                }
            };

            if let Err(e) = sink.forward(text).await {
                // Release the in-flight entry and the rest of the batch so
                // the next consumer sees them without waiting out the ack
                // timeout.
                message.nak().await;
                for rest in batch_iter {
                    rest.nak().await;
                }
                return Err(e);
            }
            if let Err(e) = message.ack().await {
                tracing::warn!(recipient_id, err = %e, "ack failed");
            }
            delivered += 1;
        }

        // A short batch means the queue is drained for now.
        if fetched < batch {
            return Ok(delivered);
        }
    }
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
