// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests: real HTTP + WebSocket clients against an
//! in-process relay with in-memory backends.

use std::time::Duration;

use futures_util::StreamExt;
use serde_json::json;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;

use herald_specs::RelayServer;

const TIMEOUT: Duration = Duration::from_secs(10);

type Ws = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn connect(url: &str) -> anyhow::Result<Ws> {
    let (ws, _resp) = tokio::time::timeout(TIMEOUT, connect_async(url)).await??;
    Ok(ws)
}

/// Next text or close frame, skipping control frames.
async fn next_frame(ws: &mut Ws) -> anyhow::Result<Message> {
    loop {
        let msg = tokio::time::timeout(TIMEOUT, ws.next())
            .await?
            .ok_or_else(|| anyhow::anyhow!("connection ended without a close frame"))??;
        match msg {
            Message::Ping(_) | Message::Pong(_) => continue,
            other => return Ok(other),
        }
    }
}

async fn next_json(ws: &mut Ws) -> anyhow::Result<serde_json::Value> {
    match next_frame(ws).await? {
        Message::Text(text) => Ok(serde_json::from_str(text.as_str())?),
        other => anyhow::bail!("expected text frame, got {other:?}"),
    }
}

fn notification(id: &str, recipient: &str, event: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "recipient_id": recipient,
        "created_at": 1_700_000_000_000u64,
        "is_read": false,
        "is_delivered": false,
        "event": event,
    })
}

// -- HTTP ---------------------------------------------------------------------

#[tokio::test]
async fn http_health() -> anyhow::Result<()> {
    let relay = RelayServer::start().await?;

    let resp: serde_json::Value =
        reqwest::get(format!("{}/api/v1/health", relay.base_url())).await?.json().await?;

    assert_eq!(resp["status"], "running");
    assert_eq!(resp["connections"], 0);
    Ok(())
}

#[tokio::test]
async fn token_endpoint_requires_recipient_header() -> anyhow::Result<()> {
    let relay = RelayServer::start().await?;

    let resp = reqwest::Client::new()
        .post(format!("{}/api/v1/token", relay.base_url()))
        .send()
        .await?;
    assert_eq!(resp.status(), 400);

    let body: serde_json::Value = resp.json().await?;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    Ok(())
}

#[tokio::test]
async fn bearer_auth_enforced_when_configured() -> anyhow::Result<()> {
    let relay = RelayServer::start_with_auth(Some("sekrit")).await?;
    let client = reqwest::Client::new();
    let url = format!("{}/api/v1/notifications", relay.base_url());
    let body = notification("n-1", "u-auth", json!({"kind": "comment"}));

    // Health stays open.
    let health = client.get(format!("{}/api/v1/health", relay.base_url())).send().await?;
    assert_eq!(health.status(), 200);

    let denied = client.post(&url).json(&body).send().await?;
    assert_eq!(denied.status(), 401);

    let allowed =
        client.post(&url).bearer_auth("sekrit").json(&body).send().await?;
    assert_eq!(allowed.status(), 200);
    Ok(())
}

#[tokio::test]
async fn suppressed_notification_reports_not_enqueued() -> anyhow::Result<()> {
    let relay = RelayServer::start().await?;
    let resp =
        relay.post_notification(&notification("n-1", "u-null", serde_json::Value::Null)).await?;
    assert_eq!(resp["enqueued"], false);
    Ok(())
}

// -- WebSocket delivery -------------------------------------------------------

#[tokio::test]
async fn end_to_end_delivery() -> anyhow::Result<()> {
    let relay = RelayServer::start().await?;

    let token = relay.issue_token("u-1").await?;
    let mut ws = connect(&relay.ws_url(&token)).await?;

    let resp = relay
        .post_notification(&notification("n-1", "u-1", json!({"kind": "answer", "question": 7})))
        .await?;
    assert_eq!(resp["enqueued"], true);

    // The frame arrives within one (shortened) polling interval.
    let frame = next_json(&mut ws).await?;
    assert_eq!(frame["type"], "notification");
    assert_eq!(frame["data"]["id"], "n-1");
    assert_eq!(frame["data"]["is_read"], false);
    assert_eq!(frame["data"]["event"]["kind"], "answer");

    // Disconnect: the registry entry goes away.
    ws.close(None).await?;
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        if relay.connection_count().await? == 0 {
            break;
        }
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("registry entry never removed after disconnect");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    Ok(())
}

#[tokio::test]
async fn offline_backlog_delivered_in_order() -> anyhow::Result<()> {
    let relay = RelayServer::start().await?;

    // Produced while no connection is open.
    for i in 1..=3 {
        let resp = relay
            .post_notification(&notification(
                &format!("n-{i}"),
                "u-2",
                json!({"kind": "upvote", "seq": i}),
            ))
            .await?;
        assert_eq!(resp["enqueued"], true);
    }

    let token = relay.issue_token("u-2").await?;
    let mut ws = connect(&relay.ws_url(&token)).await?;

    for i in 1..=3 {
        let frame = next_json(&mut ws).await?;
        assert_eq!(frame["data"]["id"], format!("n-{i}"), "out-of-order delivery");
    }
    Ok(())
}

#[tokio::test]
async fn unissued_token_closed_with_policy_violation() -> anyhow::Result<()> {
    let relay = RelayServer::start().await?;

    // The upgrade itself completes; the very first frame is the close.
    let mut ws = connect(&relay.ws_url("never-issued")).await?;
    match next_frame(&mut ws).await? {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Policy),
        other => anyhow::bail!("expected policy close, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn missing_token_closed_with_policy_violation() -> anyhow::Result<()> {
    let relay = RelayServer::start().await?;

    let mut ws = connect(&relay.ws_url_no_token()).await?;
    match next_frame(&mut ws).await? {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Policy),
        other => anyhow::bail!("expected policy close, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn token_is_single_use() -> anyhow::Result<()> {
    let relay = RelayServer::start().await?;

    let token = relay.issue_token("u-3").await?;
    let mut first = connect(&relay.ws_url(&token)).await?;
    first.close(None).await?;

    // Reusing the consumed token is a policy violation.
    let mut second = connect(&relay.ws_url(&token)).await?;
    match next_frame(&mut second).await? {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Policy),
        other => anyhow::bail!("expected policy close, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn reconnect_supersedes_previous_connection() -> anyhow::Result<()> {
    let relay = RelayServer::start().await?;

    let t1 = relay.issue_token("u-4").await?;
    let mut old = connect(&relay.ws_url(&t1)).await?;

    let t2 = relay.issue_token("u-4").await?;
    let mut new = connect(&relay.ws_url(&t2)).await?;

    // The superseded connection is actively closed.
    match next_frame(&mut old).await? {
        Message::Close(_) => {}
        other => anyhow::bail!("expected close on superseded connection, got {other:?}"),
    }
    assert_eq!(relay.connection_count().await?, 1);

    // Delivery continues on the new connection only.
    relay
        .post_notification(&notification("n-new", "u-4", json!({"kind": "comment"})))
        .await?;
    let frame = next_json(&mut new).await?;
    assert_eq!(frame["data"]["id"], "n-new");
    Ok(())
}
