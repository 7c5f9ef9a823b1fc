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

//! # Crosstalk Redis
//!
//! ## Purpose
//! The two production channel layers: a reliable queue layer over Redis
//! lists and a low-latency broadcast layer over Redis pub/sub, both sharded
//! across a configured host ring and Sentinel-aware.
//!
//! ## Key Components
//! - [`RedisChannelLayer`]: reliable at-most-once queue layer (lists,
//!   bounded Lua pushes, `BLPOP` receive, sorted-set groups)
//! - [`RedisPubSubChannelLayer`]: best-effort broadcast layer (one
//!   subscriber worker per shard, bounded local inboxes)
//! - [`RedisHost`]: shard descriptor — direct URL or Sentinel block
//! - [`MessageSerializer`]: msgpack/json wire formats with optional
//!   symmetric encryption
//! - [`consistent_hash`]: the documented shard hash, identical across
//!   processes and implementations
//!
//! ## Examples
//! ```rust,no_run
//! use crosstalk_redis::{RedisChannelLayer, RedisLayerOptions};
//! use crosstalk_layers::ChannelLayer;
//! use serde_json::json;
//!
//! # async fn example() -> crosstalk_layers::LayerResult<()> {
//! let layer = RedisChannelLayer::new(RedisLayerOptions {
//!     hosts: vec!["redis://localhost:6379".into()],
//!     ..Default::default()
//! })?;
//! layer.send("test.channel", json!({"type": "test.message"})).await?;
//! let message = layer.receive("test.channel").await?;
//! assert_eq!(message["type"], "test.message");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod core;
mod factory;
mod hosts;
mod lru_cache;
mod pubsub;
mod sentinel;
mod serializers;
mod shard;
mod utils;

pub use crate::core::{RedisChannelLayer, RedisLayerOptions};
pub use factory::create_redis_channel_layer;
pub use hosts::{decode_hosts, RedisHost};
pub use pubsub::RedisPubSubChannelLayer;
pub use sentinel::NodeConnector;
pub use serializers::{
    get_serializer, register_serializer, EnvelopeSerializer, MessageSerializer,
    SerializerOptions, WireFormat,
};
pub use utils::consistent_hash;
