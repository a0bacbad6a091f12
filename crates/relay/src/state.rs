// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;
use crate::producer::NotificationProducer;
use crate::queue::RecipientQueue;
use crate::registry::ConnectionRegistry;
use crate::token::TokenStore;

/// Shared relay state, constructed once at startup and threaded through the
/// handlers that need it.
pub struct RelayState {
    pub config: RelayConfig,
    pub registry: ConnectionRegistry,
    pub tokens: Arc<dyn TokenStore>,
    pub queue: Arc<dyn RecipientQueue>,
    pub producer: NotificationProducer,
    pub shutdown: CancellationToken,
}

impl RelayState {
    pub fn new(
        config: RelayConfig,
        tokens: Arc<dyn TokenStore>,
        queue: Arc<dyn RecipientQueue>,
        producer: NotificationProducer,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            registry: ConnectionRegistry::new(),
            tokens,
            queue,
            producer,
            shutdown,
        }
    }
}
