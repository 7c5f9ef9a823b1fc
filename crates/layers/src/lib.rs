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

//! # Crosstalk Layers
//!
//! ## Purpose
//! The channel layer contract and the machinery every layer shares: name
//! validation and generation, capacity configuration, the process-wide
//! layer registry, and the in-memory reference layer.
//!
//! ## Key Components
//! - [`ChannelLayer`]: core trait for layer operations (send, receive,
//!   groups, flush)
//! - [`InMemoryChannelLayer`]: single-process reference implementation
//! - [`ChannelLayerRegistry`]: alias → layer mapping, with a process-wide
//!   instance behind [`register_channel_layer`]/[`get_channel_layer`]
//! - [`LayerConfig`]: expiry, group expiry, and per-channel capacity rules
//!
//! ## Dependents
//! - `crosstalk-redis`: the Redis queue and pub/sub layers implement
//!   [`ChannelLayer`] on top of this crate's name and capacity rules
//! - `crosstalk-consumer`: consumers resolve their layer through the
//!   registry and speak to it only through the trait

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod error;
mod in_memory;
mod layer;
mod message;
pub mod names;
mod registry;

pub use config::{CapacityOverrides, LayerConfig};
pub use error::{LayerError, LayerResult};
pub use in_memory::InMemoryChannelLayer;
pub use layer::ChannelLayer;
pub use message::{message_type, require_message_type, Message};
pub use registry::{
    channel_layers, clear_channel_layers, contains_channel_layer, get_channel_layer,
    list_channel_layers, register_channel_layer, require_channel_layer, unregister_channel_layer,
    ChannelLayerRegistry,
};
