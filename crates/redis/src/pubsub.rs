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

//! Low-latency Redis pub/sub layer
//!
//! ## Purpose
//! Best-effort broadcast over Redis pub/sub: frames are delivered to every
//! attached subscriber or dropped, there is no queueing on the server and no
//! TTL. Latency is one network hop; anything published while a subscriber is
//! reconnecting is lost by design.
//!
//! ## Architecture Context
//! - **Sharding**: same name-hash rule as the queue layer; each logical
//!   channel or group maps to one pub/sub channel string on one host.
//! - **Subscriber worker**: one task per shard owns the pub/sub connection.
//!   Subscribe and unsubscribe requests reach it over an mpsc command queue;
//!   incoming frames are routed to bounded in-process inboxes. On
//!   disconnect the worker reconnects with backoff and replays every current
//!   subscription before resuming dispatch.
//! - **Groups**: membership is process-local. The first local member of a
//!   group triggers `SUBSCRIBE` on the group's pub/sub channel; the last
//!   `group_discard` unsubscribes. `group_send` publishes once and every
//!   process with local members re-delivers to the relevant inboxes.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crosstalk_layers::names;
use crosstalk_layers::{ChannelLayer, LayerConfig, LayerResult, Message};

use crate::core::RedisLayerOptions;
use crate::hosts::decode_hosts;
use crate::sentinel::NodeConnector;
use crate::serializers::{get_serializer, MessageSerializer, SerializerOptions};
use crate::shard::Shard;
use crate::utils::{channel_key, consistent_hash, group_key};

const RECONNECT_BACKOFF: Duration = Duration::from_millis(100);
const RECONNECT_BACKOFF_MAX: Duration = Duration::from_secs(5);

/// Bounded in-process inbox for one logical channel.
struct Inbox {
    capacity: usize,
    queue: StdMutex<VecDeque<Message>>,
    notify: Notify,
}

impl Inbox {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queue: StdMutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Append a message; returns false when the inbox is full.
    fn push(&self, message: Message) -> bool {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        if queue.len() >= self.capacity {
            return false;
        }
        queue.push_back(message);
        self.notify.notify_one();
        true
    }

    async fn pop(&self) -> Message {
        loop {
            {
                let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(message) = queue.pop_front() {
                    return message;
                }
            }
            self.notify.notified().await;
        }
    }
}

enum SubscriberCommand {
    Subscribe(String),
    Unsubscribe(String),
}

/// Local routing state shared by the layer and every shard worker.
#[derive(Default)]
struct SubscriberState {
    /// Logical channel name → local inbox.
    inboxes: HashMap<String, Arc<Inbox>>,
    /// Group name → local member channels.
    groups: HashMap<String, HashSet<String>>,
    /// Wire channel string → owning shard index, for replay on reconnect.
    subscriptions: HashMap<String, usize>,
}

struct PubSubShard {
    publisher: Shard,
    command_tx: StdMutex<Option<mpsc::UnboundedSender<SubscriberCommand>>>,
    worker: StdMutex<Option<JoinHandle<()>>>,
}

/// Low-latency pub/sub Redis channel layer.
///
/// Delivery requires the subscriber to be attached at publish time; the
/// `capacity` rules bound only the in-process inboxes.
pub struct RedisPubSubChannelLayer {
    config: LayerConfig,
    prefix: String,
    serializer: Arc<dyn MessageSerializer>,
    state: Arc<StdMutex<SubscriberState>>,
    shards: Vec<PubSubShard>,
}

impl RedisPubSubChannelLayer {
    /// Create a layer from options. Connections are opened lazily; the
    /// `expiry` and `group_expiry` knobs are ignored (pub/sub has no TTLs).
    pub fn new(options: RedisLayerOptions) -> LayerResult<Self> {
        let shards = decode_hosts(&options.hosts)
            .into_iter()
            .map(|host| PubSubShard {
                publisher: Shard::new(host),
                command_tx: StdMutex::new(None),
                worker: StdMutex::new(None),
            })
            .collect();
        let serializer = get_serializer(
            &options.serializer_format,
            &SerializerOptions {
                symmetric_encryption_keys: options.symmetric_encryption_keys.clone(),
                random_prefix_length: 0,
                expiry: None,
            },
        )?;
        Ok(Self {
            config: LayerConfig::new(
                options.expiry,
                options.group_expiry,
                options.capacity,
                &options.channel_capacity,
            ),
            prefix: options.prefix,
            serializer: Arc::from(serializer),
            state: Arc::new(StdMutex::new(SubscriberState::default())),
            shards,
        })
    }

    fn shard_index(&self, name: &str) -> usize {
        consistent_hash(names::non_local_name(name), self.shards.len())
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SubscriberState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The command queue of the shard's subscriber worker, spawning the
    /// worker on first use.
    fn subscriber(&self, index: usize) -> mpsc::UnboundedSender<SubscriberCommand> {
        let shard = &self.shards[index];
        let mut tx_guard = shard.command_tx.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(tx) = tx_guard.as_ref() {
            if !tx.is_closed() {
                return tx.clone();
            }
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = SubscriberWorker {
            index,
            connector: shard.publisher.connector(),
            state: self.state.clone(),
            serializer: self.serializer.clone(),
            prefix: self.prefix.clone(),
        };
        let handle = tokio::spawn(worker.run(rx));
        *tx_guard = Some(tx.clone());
        *shard.worker.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        tx
    }

    fn request_subscribe(&self, index: usize, wire: String) {
        // A closed queue means the worker is being torn down; the
        // subscription was recorded and will replay on the next spawn.
        let _ = self.subscriber(index).send(SubscriberCommand::Subscribe(wire));
    }

    fn request_unsubscribe(&self, index: usize, wire: String) {
        // Only a live worker holds server-side subscriptions; with none
        // there is nothing to undo, so don't spawn one just for this.
        let guard = self.shards[index]
            .command_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(tx) = guard.as_ref() {
            let _ = tx.send(SubscriberCommand::Unsubscribe(wire));
        }
    }

    /// Tear down every shard worker and clear local routing state.
    fn teardown(&self) {
        {
            let mut state = self.lock_state();
            state.inboxes.clear();
            state.groups.clear();
            state.subscriptions.clear();
        }
        for shard in &self.shards {
            shard
                .command_tx
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take();
            if let Some(handle) = shard.worker.lock().unwrap_or_else(|e| e.into_inner()).take() {
                handle.abort();
            }
        }
    }
}

#[async_trait]
impl ChannelLayer for RedisPubSubChannelLayer {
    async fn new_channel(&self, prefix: &str) -> LayerResult<String> {
        let name = names::new_channel_name(prefix);
        // Subscribe at creation time, so a send that lands right after the
        // name is handed out is not lost.
        let index = self.shard_index(&name);
        let wire = channel_key(&self.prefix, &name);
        {
            let mut state = self.lock_state();
            let capacity = self.config.capacity_for(&name);
            state
                .inboxes
                .insert(name.clone(), Arc::new(Inbox::new(capacity)));
            state.subscriptions.insert(wire.clone(), index);
        }
        self.request_subscribe(index, wire);
        Ok(name)
    }

    async fn send(&self, channel: &str, message: Message) -> LayerResult<()> {
        names::require_valid_channel_name(channel, false)?;
        let payload = self.serializer.serialize(&message)?;
        let wire = channel_key(&self.prefix, channel);
        let index = self.shard_index(channel);
        // No capacity check: pub/sub has no queue, and a publish with no
        // subscriber attached is lost by design.
        self.shards[index]
            .publisher
            .run("publish", |mut conn| {
                let wire = wire.clone();
                let payload = payload.clone();
                async move {
                    redis::cmd("PUBLISH")
                        .arg(&wire)
                        .arg(&payload)
                        .query_async::<i64>(&mut conn)
                        .await
                }
            })
            .await?;
        Ok(())
    }

    async fn receive(&self, channel: &str) -> LayerResult<Message> {
        names::require_valid_channel_name(channel, false)?;
        let index = self.shard_index(channel);
        let wire = channel_key(&self.prefix, channel);
        let (inbox, subscribe) = {
            let mut state = self.lock_state();
            let capacity = self.config.capacity_for(channel);
            let inbox = state
                .inboxes
                .entry(channel.to_string())
                .or_insert_with(|| Arc::new(Inbox::new(capacity)))
                .clone();
            let subscribe = if state.subscriptions.contains_key(&wire) {
                None
            } else {
                state.subscriptions.insert(wire.clone(), index);
                Some(wire)
            };
            (inbox, subscribe)
        };
        if let Some(wire) = subscribe {
            self.request_subscribe(index, wire);
        }
        Ok(inbox.pop().await)
    }

    async fn group_add(&self, group: &str, channel: &str) -> LayerResult<()> {
        names::require_valid_group_name(group)?;
        names::require_valid_channel_name(channel, false)?;
        let index = self.shard_index(group);
        let wire = group_key(&self.prefix, group);
        let subscribe = {
            let mut state = self.lock_state();
            state
                .groups
                .entry(group.to_string())
                .or_default()
                .insert(channel.to_string());
            let capacity = self.config.capacity_for(channel);
            state
                .inboxes
                .entry(channel.to_string())
                .or_insert_with(|| Arc::new(Inbox::new(capacity)));
            if state.subscriptions.contains_key(&wire) {
                None
            } else {
                state.subscriptions.insert(wire.clone(), index);
                Some(wire)
            }
        };
        if let Some(wire) = subscribe {
            self.request_subscribe(index, wire);
        }
        Ok(())
    }

    async fn group_discard(&self, group: &str, channel: &str) -> LayerResult<()> {
        names::require_valid_group_name(group)?;
        names::require_valid_channel_name(channel, false)?;
        let wire = group_key(&self.prefix, group);
        let unsubscribe = {
            let mut state = self.lock_state();
            let emptied = match state.groups.get_mut(group) {
                Some(members) => {
                    members.remove(channel);
                    members.is_empty()
                }
                None => false,
            };
            if emptied {
                state.groups.remove(group);
                state.subscriptions.remove(&wire).map(|index| (index, wire))
            } else {
                None
            }
        };
        if let Some((index, wire)) = unsubscribe {
            self.request_unsubscribe(index, wire);
        }
        Ok(())
    }

    async fn group_send(&self, group: &str, message: Message) -> LayerResult<()> {
        names::require_valid_group_name(group)?;
        let payload = self.serializer.serialize(&message)?;
        let wire = group_key(&self.prefix, group);
        let index = self.shard_index(group);
        self.shards[index]
            .publisher
            .run("group_send", |mut conn| {
                let wire = wire.clone();
                let payload = payload.clone();
                async move {
                    redis::cmd("PUBLISH")
                        .arg(&wire)
                        .arg(&payload)
                        .query_async::<i64>(&mut conn)
                        .await
                }
            })
            .await?;
        Ok(())
    }

    async fn close_channel(&self, channel: &str) -> LayerResult<()> {
        names::require_valid_channel_name(channel, false)?;
        let wire = channel_key(&self.prefix, channel);
        let mut unsubscribes = Vec::new();
        {
            let mut state = self.lock_state();
            state.inboxes.remove(channel);
            if let Some(index) = state.subscriptions.remove(&wire) {
                unsubscribes.push((index, wire));
            }
            // Drop the channel from local group membership and unsubscribe
            // any group it emptied.
            let mut emptied = Vec::new();
            for (group, members) in state.groups.iter_mut() {
                members.remove(channel);
                if members.is_empty() {
                    emptied.push(group.clone());
                }
            }
            for group in emptied {
                state.groups.remove(&group);
                let group_wire = group_key(&self.prefix, &group);
                if let Some(index) = state.subscriptions.remove(&group_wire) {
                    unsubscribes.push((index, group_wire));
                }
            }
        }
        for (index, wire) in unsubscribes {
            self.request_unsubscribe(index, wire);
        }
        Ok(())
    }

    async fn flush(&self) -> LayerResult<()> {
        self.teardown();
        Ok(())
    }

    async fn close(&self) -> LayerResult<()> {
        self.teardown();
        for shard in &self.shards {
            shard.publisher.close().await;
        }
        Ok(())
    }
}

/// The per-shard subscriber: owns the pub/sub connection, serves the command
/// queue, routes frames, and supervises reconnection.
struct SubscriberWorker {
    index: usize,
    connector: Arc<NodeConnector>,
    state: Arc<StdMutex<SubscriberState>>,
    serializer: Arc<dyn MessageSerializer>,
    prefix: String,
}

enum Step {
    Command(Option<SubscriberCommand>),
    Frame(Option<redis::Msg>),
}

impl SubscriberWorker {
    async fn run(self, mut commands: mpsc::UnboundedReceiver<SubscriberCommand>) {
        let mut backoff = RECONNECT_BACKOFF;
        'connect: loop {
            let client = match self.connector.client().await {
                Ok(client) => client,
                Err(err) => {
                    warn!(shard = self.index, error = %err, "pub/sub connect failed");
                    self.connector.invalidate().await;
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(RECONNECT_BACKOFF_MAX);
                    continue;
                }
            };
            let mut pubsub = match client.get_async_pubsub().await {
                Ok(pubsub) => pubsub,
                Err(err) => {
                    warn!(shard = self.index, error = %err, "pub/sub connect failed");
                    self.connector.invalidate().await;
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(RECONNECT_BACKOFF_MAX);
                    continue;
                }
            };

            // Replay every subscription this shard is responsible for before
            // resuming dispatch; frames published during the gap are lost.
            let wanted: Vec<String> = {
                let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                state
                    .subscriptions
                    .iter()
                    .filter(|(_, index)| **index == self.index)
                    .map(|(wire, _)| wire.clone())
                    .collect()
            };
            for wire in &wanted {
                if let Err(err) = pubsub.subscribe(wire).await {
                    warn!(shard = self.index, error = %err, "resubscribe failed");
                    self.connector.invalidate().await;
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(RECONNECT_BACKOFF_MAX);
                    continue 'connect;
                }
            }
            if !wanted.is_empty() {
                debug!(shard = self.index, count = wanted.len(), "replayed subscriptions");
            }
            backoff = RECONNECT_BACKOFF;

            loop {
                let step = {
                    let mut stream = pubsub.on_message();
                    tokio::select! {
                        command = commands.recv() => Step::Command(command),
                        frame = stream.next() => Step::Frame(frame),
                    }
                };
                match step {
                    Step::Command(Some(SubscriberCommand::Subscribe(wire))) => {
                        if let Err(err) = pubsub.subscribe(&wire).await {
                            warn!(shard = self.index, error = %err, "subscribe failed; reconnecting");
                            self.connector.invalidate().await;
                            continue 'connect;
                        }
                    }
                    Step::Command(Some(SubscriberCommand::Unsubscribe(wire))) => {
                        if let Err(err) = pubsub.unsubscribe(&wire).await {
                            warn!(shard = self.index, error = %err, "unsubscribe failed; reconnecting");
                            self.connector.invalidate().await;
                            continue 'connect;
                        }
                    }
                    Step::Command(None) => return,
                    Step::Frame(Some(frame)) => self.deliver(frame),
                    Step::Frame(None) => {
                        warn!(shard = self.index, "pub/sub connection lost; reconnecting");
                        self.connector.invalidate().await;
                        continue 'connect;
                    }
                }
            }
        }
    }

    /// Route one incoming frame to the local inboxes it addresses.
    fn deliver(&self, frame: redis::Msg) {
        let wire = frame.get_channel_name().to_string();
        let message = match self.serializer.deserialize(frame.get_payload_bytes()) {
            Ok(message) => message,
            Err(err) => {
                warn!(shard = self.index, wire = %wire, error = %err, "discarding undecodable frame");
                return;
            }
        };
        let channel_prefix = format!("{}:channel:", self.prefix);
        let group_prefix = format!("{}:group:", self.prefix);
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(channel) = wire.strip_prefix(&channel_prefix) {
            if let Some(inbox) = state.inboxes.get(channel) {
                if !inbox.push(message) {
                    warn!(channel, "dropping frame for full inbox");
                }
            }
        } else if let Some(group) = wire.strip_prefix(&group_prefix) {
            if let Some(members) = state.groups.get(group) {
                for member in members {
                    if let Some(inbox) = state.inboxes.get(member) {
                        if !inbox.push(message.clone()) {
                            warn!(group, channel = %member, "dropping frame for full inbox");
                        }
                    }
                }
            }
        }
    }
}
