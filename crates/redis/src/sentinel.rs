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

//! Sentinel-aware connection resolution
//!
//! ## Purpose
//! A [`NodeConnector`] turns a host descriptor into a `redis::Client`. For a
//! direct URL that is a plain `Client::open`; for a Sentinel block the
//! current master is resolved by asking each sentinel in turn with
//! `SENTINEL GET-MASTER-ADDR-BY-NAME`. The resolved client is cached;
//! callers invalidate it when they see failover-class errors, so the next
//! call re-resolves. The layers treat both descriptor kinds as
//! interchangeable.

use redis::Client;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crosstalk_layers::{LayerError, LayerResult};

use crate::hosts::RedisHost;

/// Resolves and caches the client for one shard's host descriptor.
pub struct NodeConnector {
    host: RedisHost,
    cached: Mutex<Option<Client>>,
}

impl NodeConnector {
    /// Create a connector for `host`.
    pub fn new(host: RedisHost) -> Self {
        Self {
            host,
            cached: Mutex::new(None),
        }
    }

    /// The client for the current master, resolving through Sentinel when
    /// the descriptor asks for it.
    pub async fn client(&self) -> LayerResult<Client> {
        let mut cached = self.cached.lock().await;
        if let Some(client) = cached.as_ref() {
            return Ok(client.clone());
        }
        let client = match &self.host {
            RedisHost::Url(url) => Client::open(url.as_str())
                .map_err(|e| LayerError::Transport(format!("invalid redis url {url:?}: {e}")))?,
            RedisHost::Sentinel {
                master_name,
                sentinels,
                db,
                password,
            } => resolve_master(master_name, sentinels, *db, password.as_deref()).await?,
        };
        *cached = Some(client.clone());
        Ok(client)
    }

    /// Drop the cached client so the next [`client`](Self::client) call
    /// re-resolves the master. Called on failover-class errors.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

/// Ask each sentinel in order for the current master address.
async fn resolve_master(
    master_name: &str,
    sentinels: &[(String, u16)],
    db: i64,
    password: Option<&str>,
) -> LayerResult<Client> {
    for (host, port) in sentinels {
        let sentinel_url = format!("redis://{host}:{port}");
        let client = match Client::open(sentinel_url.as_str()) {
            Ok(client) => client,
            Err(err) => {
                warn!(sentinel = %sentinel_url, error = %err, "skipping unusable sentinel");
                continue;
            }
        };
        let mut conn = match client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(err) => {
                warn!(sentinel = %sentinel_url, error = %err, "sentinel unreachable");
                continue;
            }
        };
        let addr: Result<Option<(String, String)>, _> = redis::cmd("SENTINEL")
            .arg("GET-MASTER-ADDR-BY-NAME")
            .arg(master_name)
            .query_async(&mut conn)
            .await;
        match addr {
            Ok(Some((master_host, master_port))) => {
                debug!(
                    master = master_name,
                    address = %format!("{master_host}:{master_port}"),
                    "resolved master through sentinel"
                );
                let auth = password.map(|p| format!(":{p}@")).unwrap_or_default();
                let url = format!("redis://{auth}{master_host}:{master_port}/{db}");
                return Client::open(url.as_str())
                    .map_err(|e| LayerError::Transport(format!("invalid master address: {e}")));
            }
            Ok(None) => {
                warn!(sentinel = %sentinel_url, master = master_name, "sentinel does not know master");
            }
            Err(err) => {
                warn!(sentinel = %sentinel_url, error = %err, "sentinel query failed");
            }
        }
    }
    Err(LayerError::Transport(format!(
        "could not resolve master {master_name:?} through any configured sentinel"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_direct_url_client() {
        let connector = NodeConnector::new(RedisHost::url("redis://localhost:6379"));
        // Client::open does not connect; this succeeds without a server.
        assert!(connector.client().await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_url_is_transport_error() {
        let connector = NodeConnector::new(RedisHost::url("not-a-url"));
        assert!(matches!(
            connector.client().await,
            Err(LayerError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_invalidate_clears_cache() {
        let connector = NodeConnector::new(RedisHost::url("redis://localhost:6379"));
        connector.client().await.unwrap();
        connector.invalidate().await;
        assert!(connector.client().await.is_ok());
    }
}
