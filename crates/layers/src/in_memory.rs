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

//! In-memory channel layer
//!
//! ## Purpose
//! Single-process reference implementation of the layer contract, used by
//! the test suite and by applications that only ever run one process.
//!
//! ## Design Decisions
//! - **Bounded queues**: each channel holds a `VecDeque` of
//!   `(expires_at, message)` pairs capped at the configured capacity.
//! - **Notify wakeups**: one `tokio::sync::Notify` per channel; `send`
//!   stores a permit so a racing `receive` never misses its wakeup.
//! - **Expiry on access**: every `send`, `receive`, and `group_send` sweeps
//!   expired messages and stale group memberships first; a channel that
//!   drops an expired message is also discarded from all groups.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::config::LayerConfig;
use crate::error::{LayerError, LayerResult};
use crate::layer::ChannelLayer;
use crate::message::Message;
use crate::names;

struct ChannelQueue {
    messages: VecDeque<(Instant, Message)>,
    notify: Arc<Notify>,
}

impl Default for ChannelQueue {
    fn default() -> Self {
        Self {
            messages: VecDeque::new(),
            notify: Arc::new(Notify::new()),
        }
    }
}

#[derive(Default)]
struct InMemoryState {
    channels: HashMap<String, ChannelQueue>,
    groups: HashMap<String, HashMap<String, Instant>>,
}

/// In-memory channel layer implementation.
///
/// ## Examples
/// ```rust
/// use crosstalk_layers::{ChannelLayer, InMemoryChannelLayer};
/// use serde_json::json;
///
/// # async fn example() -> crosstalk_layers::LayerResult<()> {
/// let layer = InMemoryChannelLayer::default();
/// layer.send("test.channel", json!({"type": "test.message"})).await?;
/// let message = layer.receive("test.channel").await?;
/// assert_eq!(message["type"], "test.message");
/// # Ok(())
/// # }
/// ```
pub struct InMemoryChannelLayer {
    config: LayerConfig,
    state: Mutex<InMemoryState>,
}

impl InMemoryChannelLayer {
    /// Create a layer with the given configuration.
    pub fn new(config: LayerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(InMemoryState::default()),
        }
    }

    /// Current members of a group. Inspection helper for tests.
    pub async fn group_channels(&self, group: &str) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .groups
            .get(group)
            .map(|members| members.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Sweep expired messages and stale group memberships.
    ///
    /// Any channel that dropped an expired message is discarded from all
    /// groups; channels left empty by the sweep are removed entirely.
    fn clean_expired(&self, state: &mut InMemoryState) {
        let now = Instant::now();

        let mut dropped_from = Vec::new();
        let mut emptied = Vec::new();
        for (name, queue) in state.channels.iter_mut() {
            let mut dropped = false;
            while queue
                .messages
                .front()
                .is_some_and(|(expires_at, _)| *expires_at <= now)
            {
                queue.messages.pop_front();
                dropped = true;
            }
            if dropped {
                dropped_from.push(name.clone());
                if queue.messages.is_empty() {
                    emptied.push(name.clone());
                }
            }
        }
        for name in &dropped_from {
            for members in state.groups.values_mut() {
                members.remove(name);
            }
        }
        for name in emptied {
            state.channels.remove(&name);
        }

        let group_ttl = Duration::from_secs(self.config.group_expiry);
        for members in state.groups.values_mut() {
            members.retain(|_, joined_at| now.duration_since(*joined_at) < group_ttl);
        }
        state.groups.retain(|_, members| !members.is_empty());
    }
}

impl Default for InMemoryChannelLayer {
    fn default() -> Self {
        Self::new(LayerConfig::default())
    }
}

#[async_trait]
impl ChannelLayer for InMemoryChannelLayer {
    async fn new_channel(&self, prefix: &str) -> LayerResult<String> {
        Ok(format!(
            "{}.inmemory!{}",
            prefix,
            names::random_component(12)
        ))
    }

    async fn send(&self, channel: &str, message: Message) -> LayerResult<()> {
        names::require_valid_channel_name(channel, false)?;
        let mut state = self.state.lock().await;
        self.clean_expired(&mut state);

        let capacity = self.config.capacity_for(channel);
        let queue = state.channels.entry(channel.to_string()).or_default();
        if queue.messages.len() >= capacity {
            return Err(LayerError::ChannelFull(channel.to_string()));
        }
        let expires_at = Instant::now() + Duration::from_secs(self.config.expiry);
        queue.messages.push_back((expires_at, message));
        queue.notify.notify_one();
        Ok(())
    }

    async fn receive(&self, channel: &str) -> LayerResult<Message> {
        names::require_valid_channel_name(channel, false)?;
        loop {
            let notify = {
                let mut state = self.state.lock().await;
                self.clean_expired(&mut state);
                let queue = state.channels.entry(channel.to_string()).or_default();
                if let Some((_, message)) = queue.messages.pop_front() {
                    if queue.messages.is_empty() {
                        state.channels.remove(channel);
                    }
                    return Ok(message);
                }
                queue.notify.clone()
            };
            notify.notified().await;
        }
    }

    async fn group_add(&self, group: &str, channel: &str) -> LayerResult<()> {
        names::require_valid_group_name(group)?;
        names::require_valid_channel_name(channel, false)?;
        let mut state = self.state.lock().await;
        state
            .groups
            .entry(group.to_string())
            .or_default()
            .insert(channel.to_string(), Instant::now());
        Ok(())
    }

    async fn group_discard(&self, group: &str, channel: &str) -> LayerResult<()> {
        names::require_valid_group_name(group)?;
        names::require_valid_channel_name(channel, false)?;
        let mut state = self.state.lock().await;
        if let Some(members) = state.groups.get_mut(group) {
            members.remove(channel);
            if members.is_empty() {
                state.groups.remove(group);
            }
        }
        Ok(())
    }

    async fn group_send(&self, group: &str, message: Message) -> LayerResult<()> {
        names::require_valid_group_name(group)?;
        let members: Vec<String> = {
            let mut state = self.state.lock().await;
            self.clean_expired(&mut state);
            state
                .groups
                .get(group)
                .map(|members| members.keys().cloned().collect())
                .unwrap_or_default()
        };
        for channel in members {
            match self.send(&channel, message.clone()).await {
                Ok(()) => {}
                Err(LayerError::ChannelFull(_)) => {
                    debug!(group, channel = %channel, "dropping group message for full channel");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    async fn close_channel(&self, channel: &str) -> LayerResult<()> {
        names::require_valid_channel_name(channel, false)?;
        let mut state = self.state.lock().await;
        state.channels.remove(channel);
        for members in state.groups.values_mut() {
            members.remove(channel);
        }
        state.groups.retain(|_, members| !members.is_empty());
        Ok(())
    }

    async fn flush(&self) -> LayerResult<()> {
        let mut state = self.state.lock().await;
        state.channels.clear();
        state.groups.clear();
        Ok(())
    }

    async fn close(&self) -> LayerResult<()> {
        Ok(())
    }
}
