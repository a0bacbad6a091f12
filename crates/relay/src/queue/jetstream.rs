// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JetStream-backed durable queue.
//!
//! One work-queue stream holds every recipient's entries under
//! `{prefix}.user.{token}`; each recipient gets a durable pull consumer with
//! explicit acks, so entries persist until the delivery loop acknowledges
//! them and unacked entries are redelivered after the ack wait.

use std::collections::HashMap;
use std::time::Duration;

use async_nats::jetstream;
use async_nats::jetstream::consumer::pull;
use async_nats::jetstream::consumer::{AckPolicy, Consumer, DeliverPolicy};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::RwLock;

use super::{subject_token, QueuedMessage, RecipientQueue};

const ACK_WAIT: Duration = Duration::from_secs(30);

pub struct JetStreamQueue {
    js: jetstream::Context,
    stream: jetstream::stream::Stream,
    prefix: String,
    consumers: RwLock<HashMap<String, Consumer<pull::Config>>>,
}

impl JetStreamQueue {
    /// Connect to JetStream and get or create the notification stream.
    pub async fn connect(
        client: async_nats::Client,
        stream_name: &str,
        prefix: &str,
    ) -> anyhow::Result<Self> {
        let js = jetstream::new(client);
        let stream = js
            .get_or_create_stream(jetstream::stream::Config {
                name: stream_name.to_owned(),
                subjects: vec![format!("{prefix}.user.>")],
                retention: jetstream::stream::RetentionPolicy::WorkQueue,
                ..Default::default()
            })
            .await?;
        tracing::info!(stream = stream_name, prefix, "jetstream queue ready");
        Ok(Self {
            js,
            stream,
            prefix: prefix.to_owned(),
            consumers: RwLock::new(HashMap::new()),
        })
    }

    fn subject(&self, recipient_id: &str) -> String {
        format!("{}.user.{}", self.prefix, subject_token(recipient_id))
    }

    /// Get or create the recipient's durable pull consumer.
    async fn consumer_for(&self, recipient_id: &str) -> anyhow::Result<Consumer<pull::Config>> {
        {
            let consumers = self.consumers.read().await;
            if let Some(consumer) = consumers.get(recipient_id) {
                return Ok(consumer.clone());
            }
        }

        let token = subject_token(recipient_id);
        let name = format!("user-{token}");
        let config = pull::Config {
            durable_name: Some(name.clone()),
            filter_subject: self.subject(recipient_id),
            deliver_policy: DeliverPolicy::All,
            ack_policy: AckPolicy::Explicit,
            ack_wait: ACK_WAIT,
            ..Default::default()
        };
        let consumer = self.stream.get_or_create_consumer(&name, config).await?;

        let mut consumers = self.consumers.write().await;
        consumers.insert(recipient_id.to_owned(), consumer.clone());
        Ok(consumer)
    }
}

#[async_trait]
impl RecipientQueue for JetStreamQueue {
    async fn enqueue(&self, recipient_id: &str, payload: Bytes) -> anyhow::Result<()> {
        // Double await: the second resolves the broker's publish ack, so the
        // entry is durably stored before this returns.
        self.js.publish(self.subject(recipient_id), payload).await?.await?;
        Ok(())
    }

    async fn fetch(&self, recipient_id: &str, max: usize) -> anyhow::Result<Vec<QueuedMessage>> {
        let consumer = self.consumer_for(recipient_id).await?;
        let mut batch = consumer.fetch().max_messages(max).messages().await?;

        let mut out = Vec::new();
        while let Some(next) = batch.next().await {
            match next {
                Ok(message) => out.push(QueuedMessage::from_jetstream(message)),
                Err(e) => {
                    tracing::debug!(err = %e, "jetstream fetch message error");
                    break;
                }
            }
        }
        Ok(out)
    }
}
