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

//! Dotted-type message routing
//!
//! ## Purpose
//! Maps the `type` field of channel-layer messages onto handlers. The table
//! is built once, when the application is constructed, from explicit
//! `(type, handler)` registrations — no reflection, no string evaluation at
//! dispatch time. Registering an invalid type name is a programmer error
//! and panics at startup; an *incoming* invalid type fails the consumer
//! with `BadType`, and an unregistered one with `NoHandler`.

use std::collections::HashMap;

use futures::future::BoxFuture;

use crosstalk_layers::{message_type, Message};

use crate::error::{ConsumerError, ConsumerResult};
use crate::websocket::WebsocketContext;

/// Whether `name` is a well-formed dispatch type: non-empty ASCII, dots only
/// as separators (no leading or trailing dot, no empty segment), no leading
/// underscore, and no whitespace.
pub fn valid_type_name(name: &str) -> bool {
    if name.is_empty() || !name.is_ascii() || name.starts_with('_') {
        return false;
    }
    name.split('.').all(|segment| {
        !segment.is_empty()
            && segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    })
}

/// Validate a dispatch type name, failing with [`ConsumerError::BadType`].
pub fn require_valid_type_name(name: &str) -> ConsumerResult<()> {
    if valid_type_name(name) {
        Ok(())
    } else {
        Err(ConsumerError::BadType(name.to_string()))
    }
}

/// Future returned by a routed handler.
pub type HandlerFuture<'a> = BoxFuture<'a, ConsumerResult<()>>;

type Handler<C> = Box<
    dyn for<'a> Fn(&'a mut C, &'a mut WebsocketContext, Message) -> HandlerFuture<'a>
        + Send
        + Sync,
>;

/// Lookup table from dotted message types to handlers on a consumer.
///
/// ## Examples
/// ```rust,ignore
/// fn router() -> MessageRouter<Self> {
///     MessageRouter::new()
///         .route("chat.message", |c, ctx, msg| Box::pin(c.chat_message(ctx, msg)))
/// }
/// ```
pub struct MessageRouter<C> {
    handlers: HashMap<String, Handler<C>>,
}

impl<C> MessageRouter<C> {
    /// An empty routing table.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register `handler` for `message_type`, replacing any previous entry.
    ///
    /// ## Panics
    /// When `message_type` is not a valid dispatch type. Registration runs
    /// once at application construction, so this fails fast at startup.
    pub fn route<F>(mut self, message_type: &str, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut C, &'a mut WebsocketContext, Message) -> HandlerFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        if !valid_type_name(message_type) {
            panic!("cannot route invalid message type {message_type:?}");
        }
        self.handlers
            .insert(message_type.to_string(), Box::new(handler));
        self
    }

    /// Whether a handler is registered for `message_type`.
    pub fn contains(&self, message_type: &str) -> bool {
        self.handlers.contains_key(message_type)
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Dispatch one channel-layer message to its handler.
    pub async fn dispatch(
        &self,
        consumer: &mut C,
        ctx: &mut WebsocketContext,
        message: Message,
    ) -> ConsumerResult<()> {
        let message_type = message_type(&message)
            .ok_or_else(|| ConsumerError::BadType("<missing type>".to_string()))?
            .to_string();
        require_valid_type_name(&message_type)?;
        match self.handlers.get(&message_type) {
            Some(handler) => handler(consumer, ctx, message).await,
            None => Err(ConsumerError::NoHandler(message_type)),
        }
    }
}

impl<C> Default for MessageRouter<C> {
    fn default() -> Self {
        Self::new()
    }
}
