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

//! Convenience constructor for the common single-host setups

use std::sync::Arc;

use crosstalk_layers::{ChannelLayer, LayerResult};

use crate::core::{RedisChannelLayer, RedisLayerOptions};
use crate::hosts::RedisHost;
use crate::pubsub::RedisPubSubChannelLayer;

/// Build a Redis channel layer against a single URL.
///
/// With `use_pubsub` the low-latency pub/sub layer is returned, otherwise
/// the reliable queue layer. Everything beyond the URL and prefix comes from
/// `options`; its own `hosts` and `prefix` fields are overridden.
///
/// ## Examples
/// ```rust,no_run
/// use crosstalk_redis::{create_redis_channel_layer, RedisLayerOptions};
/// use crosstalk_layers::register_channel_layer;
///
/// # fn example() -> crosstalk_layers::LayerResult<()> {
/// let layer = create_redis_channel_layer(
///     "redis://localhost:6379",
///     "chat",
///     false,
///     RedisLayerOptions::default(),
/// )?;
/// register_channel_layer("chat", layer);
/// # Ok(())
/// # }
/// ```
pub fn create_redis_channel_layer(
    url: impl Into<String>,
    prefix: impl Into<String>,
    use_pubsub: bool,
    options: RedisLayerOptions,
) -> LayerResult<Arc<dyn ChannelLayer>> {
    let options = RedisLayerOptions {
        hosts: vec![RedisHost::Url(url.into())],
        prefix: prefix.into(),
        ..options
    };
    if use_pubsub {
        Ok(Arc::new(RedisPubSubChannelLayer::new(options)?))
    } else {
        Ok(Arc::new(RedisChannelLayer::new(options)?))
    }
}
