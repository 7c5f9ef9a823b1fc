// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Crosstalk Contributors
//
// This file is part of Crosstalk.
//
// Crosstalk is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// Crosstalk is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with Crosstalk. If not, see <https://www.gnu.org/licenses/>.

//! One Redis shard: cached connection manager plus failover-aware retries

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::{Client, RedisResult};
use tokio::sync::Mutex;
use tracing::warn;

use crosstalk_layers::{LayerError, LayerResult};

use crate::hosts::RedisHost;
use crate::sentinel::NodeConnector;
use crate::utils::is_failover_error;

/// Attempts per operation before a transport error is surfaced.
const RETRY_ATTEMPTS: u32 = 3;
/// Initial backoff between attempts; doubles each retry.
const RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// One host in a layer's ring: lazily-created command connection plus the
/// Sentinel-aware resolver behind it.
pub(crate) struct Shard {
    connector: Arc<NodeConnector>,
    manager: Mutex<Option<ConnectionManager>>,
}

impl Shard {
    pub(crate) fn new(host: RedisHost) -> Self {
        Self {
            connector: Arc::new(NodeConnector::new(host)),
            manager: Mutex::new(None),
        }
    }

    /// Shared handle to this shard's connection resolver.
    pub(crate) fn connector(&self) -> Arc<NodeConnector> {
        self.connector.clone()
    }

    /// The resolved client for this shard, for callers that need a dedicated
    /// connection (blocking pops, pub/sub).
    pub(crate) async fn client(&self) -> LayerResult<Client> {
        self.connector.client().await
    }

    /// A fresh dedicated connection, outside the shared command manager.
    pub(crate) async fn dedicated_connection(&self) -> LayerResult<MultiplexedConnection> {
        let client = self.client().await?;
        client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| LayerError::Transport(format!("could not connect: {e}")))
    }

    /// The shared command connection, created on first use.
    async fn manager(&self) -> LayerResult<ConnectionManager> {
        let mut guard = self.manager.lock().await;
        if let Some(manager) = guard.as_ref() {
            return Ok(manager.clone());
        }
        let client = self.connector.client().await?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| LayerError::Transport(format!("could not connect: {e}")))?;
        *guard = Some(manager.clone());
        Ok(manager)
    }

    /// Drop the cached connection and master resolution; the next operation
    /// re-resolves and reconnects. Called when a failover is detected.
    pub(crate) async fn rebind(&self) {
        *self.manager.lock().await = None;
        self.connector.invalidate().await;
    }

    /// Release the cached command connection.
    pub(crate) async fn close(&self) {
        *self.manager.lock().await = None;
    }

    /// Run `operation` against this shard, retrying with exponential backoff
    /// and a rebind when the error looks like a failover in progress
    /// (READONLY replica answers, refused or dropped connections).
    pub(crate) async fn run<T, F, Fut>(&self, op: &'static str, operation: F) -> LayerResult<T>
    where
        F: Fn(ConnectionManager) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let mut delay = RETRY_BACKOFF;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let failure = match self.manager().await {
                Ok(manager) => match operation(manager).await {
                    Ok(value) => return Ok(value),
                    Err(err) if is_failover_error(&err) => {
                        LayerError::Transport(format!("{op}: {err}"))
                    }
                    Err(err) => return Err(LayerError::Transport(format!("{op}: {err}"))),
                },
                Err(err) => err,
            };
            if attempt >= RETRY_ATTEMPTS {
                return Err(failure);
            }
            warn!(op, attempt, error = %failure, "redis operation failed; rebinding and retrying");
            self.rebind().await;
            tokio::time::sleep(delay).await;
            delay *= 2;
        }
    }
}
