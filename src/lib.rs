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

//! Crosstalk: a real-time messaging substrate
//!
//! Two tightly coupled capabilities:
//! 1. **Channel layers** — a process-external message bus that lets any
//!    producer deliver messages to a specific connection or to a named
//!    group of connections, across processes and hosts.
//! 2. **The consumer runtime** — turns a persistent client connection into
//!    an event-driven handler with a well-defined lifecycle and routed
//!    dispatch.
//!
//! The member crates are re-exported here so applications can depend on
//! `crosstalk` alone.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// Independent crates - re-export them here
pub use crosstalk_consumer as consumer;
pub use crosstalk_layers as layers;
pub use crosstalk_redis as redis;

// Re-export the common types for convenience
pub use crosstalk_consumer::{
    AsgiApplication, ClientEvent, ConsumerError, ConsumerResult, EventSink, EventStream,
    JsonWebsocketApp, JsonWebsocketConsumer, MessageRouter, Middleware, MiddlewareApp, Scope,
    ScopeKind, ServerEvent, WebsocketApp, WebsocketConsumer, WebsocketContext,
};
pub use crosstalk_layers::{
    get_channel_layer, register_channel_layer, require_channel_layer, unregister_channel_layer,
    ChannelLayer, ChannelLayerRegistry, InMemoryChannelLayer, LayerConfig, LayerError,
    LayerResult, Message,
};
pub use crosstalk_redis::{
    create_redis_channel_layer, RedisChannelLayer, RedisHost, RedisLayerOptions,
    RedisPubSubChannelLayer,
};

// Include tests module
#[cfg(test)]
mod tests;
