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

//! Reliable Redis queue layer
//!
//! ## Purpose
//! Cross-process channel layer over Redis lists: at-most-once delivery to
//! one recipient per channel, FIFO per producer, bounded inboxes, group
//! fan-out through sorted sets.
//!
//! ## Architecture Context
//! - **Sharding**: each channel maps to one host by hashing the non-local
//!   part of its name (see [`consistent_hash`]); the shard identity lives in
//!   the name itself, so any process with the same hosts list routes sends
//!   identically.
//! - **Storage**: one Redis list per channel holding
//!   `<8-byte-random-id> || <payload>` values in FIFO order. The list key
//!   carries a TTL of the message expiry, so abandoned inboxes clean
//!   themselves up.
//! - **Bounded push**: a Lua script checks `LLEN` against the channel's
//!   capacity, pushes, and refreshes the TTL in one atomic step.
//! - **Receive**: a dedicated connection per channel issues `BLPOP` in
//!   bounded intervals, so cancellation is observed between pops. The random
//!   id prefix is tracked in a small per-channel LRU to suppress duplicate
//!   deliveries after reconnects.
//! - **Groups**: a sorted set per group scored by join time; `group_send`
//!   prunes expired members, buckets the rest by shard, and fans out with
//!   one script invocation per shard.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::OsRng;
use rand::RngCore;
use redis::aio::MultiplexedConnection;
use redis::Script;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crosstalk_layers::names;
use crosstalk_layers::{ChannelLayer, LayerConfig, LayerError, LayerResult, Message};

use crate::hosts::{decode_hosts, RedisHost};
use crate::lru_cache::RecentIdCache;
use crate::serializers::{get_serializer, MessageSerializer, SerializerOptions};
use crate::shard::Shard;
use crate::utils::{channel_key, consistent_hash, group_key, unix_now};

/// Length of the random id prepended to every queued value.
pub(crate) const MESSAGE_ID_LENGTH: usize = 8;

/// Ids remembered per channel for duplicate suppression.
const DEDUP_WINDOW: usize = 128;

/// Seconds one `BLPOP` waits before the receive loop re-issues it.
const BLPOP_INTERVAL_SECS: usize = 5;

/// Consecutive receive failures tolerated before surfacing a transport error.
const RECEIVE_FAILURE_BUDGET: u32 = 3;

const BOUNDED_PUSH_LUA: &str = r#"
if redis.call('LLEN', KEYS[1]) >= tonumber(ARGV[1]) then
    return 0
end
redis.call('RPUSH', KEYS[1], ARGV[2])
redis.call('EXPIRE', KEYS[1], ARGV[3])
return 1
"#;

const GROUP_FANOUT_LUA: &str = r#"
local over = 0
for i = 1, #KEYS do
    if redis.call('LLEN', KEYS[i]) < tonumber(ARGV[i + 2]) then
        redis.call('RPUSH', KEYS[i], ARGV[1])
        redis.call('EXPIRE', KEYS[i], ARGV[2])
    else
        over = over + 1
    end
end
return over
"#;

/// Constructor options for the Redis layers.
#[derive(Clone, Debug)]
pub struct RedisLayerOptions {
    /// Shard descriptors, in ring order. Empty means one local instance.
    pub hosts: Vec<RedisHost>,
    /// Key and pub/sub channel namespace.
    pub prefix: String,
    /// Message TTL in seconds.
    pub expiry: u64,
    /// Group membership TTL in seconds.
    pub group_expiry: u64,
    /// Default per-channel inbox bound.
    pub capacity: usize,
    /// Ordered glob-pattern capacity overrides; first match wins.
    pub channel_capacity: Vec<(String, usize)>,
    /// Payload encryption secrets; first encrypts, any may decrypt.
    pub symmetric_encryption_keys: Option<Vec<String>>,
    /// Wire format name registered with the serializer registry.
    pub serializer_format: String,
}

impl Default for RedisLayerOptions {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            prefix: "asgi".to_string(),
            expiry: 60,
            group_expiry: 86_400,
            capacity: 100,
            channel_capacity: Vec::new(),
            symmetric_encryption_keys: None,
            serializer_format: "msgpack".to_string(),
        }
    }
}

/// Reliable queue-style Redis channel layer.
///
/// ## Examples
/// ```rust,no_run
/// use crosstalk_redis::{RedisChannelLayer, RedisLayerOptions};
///
/// # fn example() -> crosstalk_layers::LayerResult<()> {
/// let layer = RedisChannelLayer::new(RedisLayerOptions {
///     hosts: vec!["redis://localhost:6379".into()],
///     prefix: "myapp".to_string(),
///     ..Default::default()
/// })?;
/// # Ok(())
/// # }
/// ```
pub struct RedisChannelLayer {
    config: LayerConfig,
    prefix: String,
    shards: Vec<Shard>,
    serializer: Box<dyn MessageSerializer>,
    bounded_push: Script,
    group_fanout: Script,
    receive_conns: Mutex<HashMap<String, MultiplexedConnection>>,
    recent_ids: StdMutex<HashMap<String, RecentIdCache>>,
}

impl RedisChannelLayer {
    /// Create a layer from options. Connections are opened lazily.
    pub fn new(options: RedisLayerOptions) -> LayerResult<Self> {
        let shards = decode_hosts(&options.hosts)
            .into_iter()
            .map(Shard::new)
            .collect();
        let serializer = get_serializer(
            &options.serializer_format,
            &SerializerOptions {
                symmetric_encryption_keys: options.symmetric_encryption_keys.clone(),
                random_prefix_length: 0,
                expiry: Some(options.expiry),
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
            shards,
            serializer,
            bounded_push: Script::new(BOUNDED_PUSH_LUA),
            group_fanout: Script::new(GROUP_FANOUT_LUA),
            receive_conns: Mutex::new(HashMap::new()),
            recent_ids: StdMutex::new(HashMap::new()),
        })
    }

    fn shard_for(&self, name: &str) -> &Shard {
        &self.shards[consistent_hash(names::non_local_name(name), self.shards.len())]
    }

    /// Encode a message into its queued value: random id then payload.
    fn encode(&self, message: &Message) -> LayerResult<Vec<u8>> {
        let mut id = [0u8; MESSAGE_ID_LENGTH];
        OsRng.fill_bytes(&mut id);
        let body = self.serializer.serialize(message)?;
        let mut value = Vec::with_capacity(MESSAGE_ID_LENGTH + body.len());
        value.extend_from_slice(&id);
        value.extend_from_slice(&body);
        Ok(value)
    }

    /// Decode a popped value, suppressing duplicates by their id prefix.
    ///
    /// Returns `Ok(None)` when the value should be skipped.
    fn decode(&self, channel: &str, value: &[u8]) -> LayerResult<Option<Message>> {
        if value.len() <= MESSAGE_ID_LENGTH {
            warn!(channel, "discarding truncated value from channel list");
            return Ok(None);
        }
        let mut id = [0u8; MESSAGE_ID_LENGTH];
        id.copy_from_slice(&value[..MESSAGE_ID_LENGTH]);
        {
            let mut recent = self.recent_ids.lock().unwrap_or_else(|e| e.into_inner());
            let cache = recent.entry(channel.to_string()).or_insert_with(|| {
                RecentIdCache::new(DEDUP_WINDOW, Duration::from_secs(self.config.expiry))
            });
            if cache.check_and_insert(id) {
                debug!(channel, "suppressing duplicate message");
                return Ok(None);
            }
        }
        self.serializer
            .deserialize(&value[MESSAGE_ID_LENGTH..])
            .map(Some)
    }

    /// The cached dedicated connection for a receiving channel.
    async fn receive_connection(&self, channel: &str) -> LayerResult<MultiplexedConnection> {
        let mut conns = self.receive_conns.lock().await;
        if let Some(conn) = conns.get(channel) {
            return Ok(conn.clone());
        }
        let conn = self.shard_for(channel).dedicated_connection().await?;
        conns.insert(channel.to_string(), conn.clone());
        Ok(conn)
    }

    async fn drop_receive_connection(&self, channel: &str) {
        self.receive_conns.lock().await.remove(channel);
    }
}

#[async_trait]
impl ChannelLayer for RedisChannelLayer {
    async fn new_channel(&self, prefix: &str) -> LayerResult<String> {
        Ok(names::new_channel_name(prefix))
    }

    async fn send(&self, channel: &str, message: Message) -> LayerResult<()> {
        names::require_valid_channel_name(channel, false)?;
        let value = self.encode(&message)?;
        let key = channel_key(&self.prefix, channel);
        let capacity = self.config.capacity_for(channel) as i64;
        let expiry = self.config.expiry as i64;
        let script = &self.bounded_push;
        let pushed: i64 = self
            .shard_for(channel)
            .run("send", |mut conn| {
                let key = key.clone();
                let value = value.clone();
                async move {
                    script
                        .key(&key)
                        .arg(capacity)
                        .arg(&value)
                        .arg(expiry)
                        .invoke_async(&mut conn)
                        .await
                }
            })
            .await?;
        if pushed == 0 {
            return Err(LayerError::ChannelFull(channel.to_string()));
        }
        Ok(())
    }

    async fn receive(&self, channel: &str) -> LayerResult<Message> {
        names::require_valid_channel_name(channel, false)?;
        let key = channel_key(&self.prefix, channel);
        let mut failures: u32 = 0;
        loop {
            let mut conn = match self.receive_connection(channel).await {
                Ok(conn) => conn,
                Err(err) => {
                    failures += 1;
                    if failures >= RECEIVE_FAILURE_BUDGET {
                        return Err(err);
                    }
                    warn!(channel, error = %err, "receive connection failed; retrying");
                    tokio::time::sleep(Duration::from_millis(50u64 << failures)).await;
                    continue;
                }
            };
            let popped: Result<Option<(Vec<u8>, Vec<u8>)>, _> = redis::cmd("BLPOP")
                .arg(&key)
                .arg(BLPOP_INTERVAL_SECS)
                .query_async(&mut conn)
                .await;
            match popped {
                Ok(Some((_, value))) => {
                    failures = 0;
                    if let Some(message) = self.decode(channel, &value)? {
                        return Ok(message);
                    }
                }
                // Idle interval elapsed with nothing queued; re-issue. This
                // is the point where cancellation is observed.
                Ok(None) => {
                    failures = 0;
                }
                Err(err) => {
                    self.drop_receive_connection(channel).await;
                    self.shard_for(channel).rebind().await;
                    failures += 1;
                    if failures >= RECEIVE_FAILURE_BUDGET {
                        return Err(LayerError::Transport(format!("receive: {err}")));
                    }
                    warn!(channel, error = %err, "blocking pop failed; rebinding");
                    tokio::time::sleep(Duration::from_millis(50u64 << failures)).await;
                }
            }
        }
    }

    async fn group_add(&self, group: &str, channel: &str) -> LayerResult<()> {
        names::require_valid_group_name(group)?;
        names::require_valid_channel_name(channel, false)?;
        let key = group_key(&self.prefix, group);
        let member = channel.to_string();
        let now = unix_now();
        let group_expiry = self.config.group_expiry as i64;
        self.shard_for(group)
            .run("group_add", |mut conn| {
                let key = key.clone();
                let member = member.clone();
                async move {
                    redis::pipe()
                        .atomic()
                        .zadd(&key, &member, now)
                        .ignore()
                        .expire(&key, group_expiry)
                        .ignore()
                        .query_async::<()>(&mut conn)
                        .await
                }
            })
            .await
    }

    async fn group_discard(&self, group: &str, channel: &str) -> LayerResult<()> {
        names::require_valid_group_name(group)?;
        names::require_valid_channel_name(channel, false)?;
        let key = group_key(&self.prefix, group);
        let member = channel.to_string();
        self.shard_for(group)
            .run("group_discard", |mut conn| {
                let key = key.clone();
                let member = member.clone();
                async move {
                    redis::cmd("ZREM")
                        .arg(&key)
                        .arg(&member)
                        .query_async::<()>(&mut conn)
                        .await
                }
            })
            .await
    }

    async fn group_send(&self, group: &str, message: Message) -> LayerResult<()> {
        names::require_valid_group_name(group)?;
        let key = group_key(&self.prefix, group);
        let horizon = unix_now() - self.config.group_expiry as f64;

        // Prune stale memberships, then read the survivors, atomically.
        let (members,): (Vec<String>,) = self
            .shard_for(group)
            .run("group_send.members", |mut conn| {
                let key = key.clone();
                async move {
                    redis::pipe()
                        .atomic()
                        .cmd("ZREMRANGEBYSCORE")
                        .arg(&key)
                        .arg("-inf")
                        .arg(horizon)
                        .ignore()
                        .cmd("ZRANGE")
                        .arg(&key)
                        .arg(0)
                        .arg(-1)
                        .query_async(&mut conn)
                        .await
                }
            })
            .await?;
        if members.is_empty() {
            return Ok(());
        }

        let value = self.encode(&message)?;
        let expiry = self.config.expiry as i64;
        let mut buckets: HashMap<usize, Vec<String>> = HashMap::new();
        for channel in members {
            let index = consistent_hash(names::non_local_name(&channel), self.shards.len());
            buckets.entry(index).or_default().push(channel);
        }

        let script = &self.group_fanout;
        for (index, channels) in buckets {
            let keys: Vec<String> = channels
                .iter()
                .map(|channel| channel_key(&self.prefix, channel))
                .collect();
            let capacities: Vec<i64> = channels
                .iter()
                .map(|channel| self.config.capacity_for(channel) as i64)
                .collect();
            let over: i64 = self.shards[index]
                .run("group_send", |mut conn| {
                    let keys = keys.clone();
                    let capacities = capacities.clone();
                    let value = value.clone();
                    async move {
                        let mut invocation = script.prepare_invoke();
                        for key in &keys {
                            invocation.key(key.as_str());
                        }
                        invocation.arg(&value).arg(expiry);
                        for capacity in &capacities {
                            invocation.arg(*capacity);
                        }
                        invocation.invoke_async(&mut conn).await
                    }
                })
                .await?;
            if over > 0 {
                debug!(group, dropped = over, "dropping group message for full channels");
            }
        }
        Ok(())
    }

    async fn close_channel(&self, channel: &str) -> LayerResult<()> {
        names::require_valid_channel_name(channel, false)?;
        // Release the process-local state for this channel; the list key
        // itself ages out via its TTL.
        self.receive_conns.lock().await.remove(channel);
        self.recent_ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(channel);
        Ok(())
    }

    async fn flush(&self) -> LayerResult<()> {
        let pattern = format!("{}:*", self.prefix);
        for shard in &self.shards {
            shard
                .run("flush", |mut conn| {
                    let pattern = pattern.clone();
                    async move {
                        let mut cursor: u64 = 0;
                        loop {
                            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                                .arg(cursor)
                                .arg("MATCH")
                                .arg(&pattern)
                                .arg("COUNT")
                                .arg(100)
                                .query_async(&mut conn)
                                .await?;
                            if !keys.is_empty() {
                                redis::cmd("DEL")
                                    .arg(&keys)
                                    .query_async::<()>(&mut conn)
                                    .await?;
                            }
                            if next == 0 {
                                return Ok(());
                            }
                            cursor = next;
                        }
                    }
                })
                .await?;
        }
        self.receive_conns.lock().await.clear();
        self.recent_ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        Ok(())
    }

    async fn close(&self) -> LayerResult<()> {
        self.receive_conns.lock().await.clear();
        self.recent_ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        for shard in &self.shards {
            shard.close().await;
        }
        Ok(())
    }
}
