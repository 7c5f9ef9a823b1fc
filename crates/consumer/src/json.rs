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

//! JSON consumer specialization
//!
//! Variant of the WebSocket consumer that decodes every text frame as JSON
//! before dispatch and encodes replies on the way out. Binary frames are an
//! encoding error that propagates as unhandled. The encode/decode hooks are
//! overridable for custom wire dialects.

use std::ops::{Deref, DerefMut};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ConsumerError, ConsumerResult};
use crate::router::MessageRouter;
use crate::websocket::{WebsocketApp, WebsocketConsumer, WebsocketContext};

/// A WebSocket consumer speaking JSON text frames.
#[async_trait]
pub trait JsonWebsocketConsumer: Default + Send + 'static {
    /// Registry alias of the channel layer to attach to, if any.
    fn channel_layer_alias(&self) -> Option<&str> {
        None
    }

    /// Groups to join on connect and leave on termination.
    fn groups(&self) -> Vec<String> {
        Vec::new()
    }

    /// The routing table for channel-layer messages.
    fn router() -> MessageRouter<JsonAdapter<Self>>
    where
        Self: Sized,
    {
        MessageRouter::new()
    }

    /// Called when the connection handshake opens. Accepts by default.
    async fn connect(&mut self, ctx: &mut WebsocketContext) -> ConsumerResult<()> {
        ctx.accept(None).await
    }

    /// Called with each decoded JSON frame.
    async fn receive_json(&mut self, ctx: &mut WebsocketContext, content: Value) -> ConsumerResult<()> {
        let _ = (ctx, content);
        Ok(())
    }

    /// Called when the connection is closed.
    async fn disconnect(&mut self, code: u16) -> ConsumerResult<()> {
        let _ = code;
        Ok(())
    }

    /// Decode one text frame. Override for custom dialects.
    fn decode_json(text: &str) -> ConsumerResult<Value> {
        serde_json::from_str(text).map_err(|e| ConsumerError::Encoding(format!("json decode: {e}")))
    }

    /// Encode one outbound payload. Override for custom dialects.
    fn encode_json(content: &Value) -> ConsumerResult<String> {
        serde_json::to_string(content)
            .map_err(|e| ConsumerError::Encoding(format!("json encode: {e}")))
    }

    /// Encode `content` and send it to the client; with `close` the
    /// connection is closed right after.
    async fn send_json(
        &self,
        ctx: &mut WebsocketContext,
        content: &Value,
        close: bool,
    ) -> ConsumerResult<()> {
        let text = Self::encode_json(content)?;
        ctx.send(Some(text), None, close.then_some(1000)).await
    }
}

/// Adapter implementing [`WebsocketConsumer`] for a JSON consumer.
///
/// Routed handlers receive `&mut JsonAdapter<C>`; it derefs to the inner
/// consumer.
#[derive(Default)]
pub struct JsonAdapter<C> {
    inner: C,
}

impl<C> Deref for JsonAdapter<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.inner
    }
}

impl<C> DerefMut for JsonAdapter<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.inner
    }
}

#[async_trait]
impl<C: JsonWebsocketConsumer> WebsocketConsumer for JsonAdapter<C> {
    fn channel_layer_alias(&self) -> Option<&str> {
        self.inner.channel_layer_alias()
    }

    fn groups(&self) -> Vec<String> {
        self.inner.groups()
    }

    fn router() -> MessageRouter<Self> {
        C::router()
    }

    async fn connect(&mut self, ctx: &mut WebsocketContext) -> ConsumerResult<()> {
        self.inner.connect(ctx).await
    }

    async fn receive(
        &mut self,
        ctx: &mut WebsocketContext,
        text: Option<String>,
        bytes: Option<Vec<u8>>,
    ) -> ConsumerResult<()> {
        let _ = bytes;
        match text {
            Some(text) => {
                let content = C::decode_json(&text)?;
                self.inner.receive_json(ctx, content).await
            }
            None => Err(ConsumerError::Encoding(
                "no text section for incoming frame".to_string(),
            )),
        }
    }

    async fn disconnect(&mut self, code: u16) -> ConsumerResult<()> {
        self.inner.disconnect(code).await
    }
}

/// Application wrapper for a [`JsonWebsocketConsumer`] type.
pub type JsonWebsocketApp<C> = WebsocketApp<JsonAdapter<C>>;
