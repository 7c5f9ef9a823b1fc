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

//! WebSocket consumer runtime
//!
//! ## Purpose
//! Turns a persistent connection into an event-driven handler. The runtime
//! owns the dispatch loop: it races framework events against channel-layer
//! messages addressed to the consumer's channel name, and routes whichever
//! arrives first — protocol events to the [`WebsocketConsumer`] lifecycle
//! hooks, everything else through the consumer's [`MessageRouter`].
//!
//! ## Lifecycle
//! On `websocket.connect` the runtime joins every declared group, then calls
//! the consumer's `connect` (which accepts by default). On
//! `websocket.disconnect` it leaves the groups, calls `disconnect`, and
//! stops. On termination — clean or not — every group membership actually
//! written is unwound and the channel identity is handed back to the layer
//! via `close_channel`, before any error propagates to the framework.
//!
//! ## Invariants
//! - `websocket.connect` is always the first upstream event; upstream and
//!   layer events are otherwise unordered relative to each other.
//! - The consumer owns exactly one channel name from start to termination.
//! - All declared groups are joined before the first user event and left
//!   before the consumer terminates, even on abnormal exit.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crosstalk_layers::{get_channel_layer, ChannelLayer, Message};

use crate::application::AsgiApplication;
use crate::error::{ConsumerError, ConsumerResult};
use crate::events::{ClientEvent, EventSink, EventStream, ServerEvent, DEFAULT_CLOSE_CODE};
use crate::router::MessageRouter;
use crate::scope::Scope;

/// Per-connection handle the runtime passes to every handler.
///
/// Carries the scope, the outbound event sink, and the channel-layer
/// identity of this consumer.
pub struct WebsocketContext {
    scope: Scope,
    sink: EventSink,
    layer: Option<Arc<dyn ChannelLayer>>,
    channel_name: Option<String>,
}

impl WebsocketContext {
    /// The connection's scope.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// The channel layer this consumer is attached to, if any.
    pub fn channel_layer(&self) -> Option<&Arc<dyn ChannelLayer>> {
        self.layer.as_ref()
    }

    /// The channel layer, failing when none is configured.
    pub fn require_channel_layer(&self) -> ConsumerResult<&Arc<dyn ChannelLayer>> {
        self.layer.as_ref().ok_or_else(|| {
            ConsumerError::LayerRequired("no channel layer configured for this consumer".to_string())
        })
    }

    /// This consumer's channel name, if a layer is attached.
    pub fn channel_name(&self) -> Option<&str> {
        self.channel_name.as_deref()
    }

    /// Emit a raw event towards the client.
    pub async fn send_event(&mut self, event: ServerEvent) -> ConsumerResult<()> {
        self.sink.send(event).await
    }

    /// Accept the pending handshake, optionally selecting a subprotocol.
    pub async fn accept(&mut self, subprotocol: Option<&str>) -> ConsumerResult<()> {
        self.send_event(ServerEvent::Accept {
            subprotocol: subprotocol.map(str::to_string),
        })
        .await
    }

    /// Send a data frame; exactly one of `text` and `bytes` must be given.
    /// With `close` set, the connection is closed right after the frame.
    pub async fn send(
        &mut self,
        text: Option<String>,
        bytes: Option<Vec<u8>>,
        close: Option<u16>,
    ) -> ConsumerResult<()> {
        if text.is_none() && bytes.is_none() {
            return Err(ConsumerError::Encoding(
                "one of text or bytes must be given".to_string(),
            ));
        }
        self.send_event(ServerEvent::Send { text, bytes }).await?;
        if let Some(code) = close {
            self.close(Some(code)).await?;
        }
        Ok(())
    }

    /// Send a text frame.
    pub async fn send_text(&mut self, text: impl Into<String>) -> ConsumerResult<()> {
        self.send(Some(text.into()), None, None).await
    }

    /// Send a binary frame.
    pub async fn send_bytes(&mut self, bytes: Vec<u8>) -> ConsumerResult<()> {
        self.send(None, Some(bytes), None).await
    }

    /// Close the connection from the server end.
    pub async fn close(&mut self, code: Option<u16>) -> ConsumerResult<()> {
        self.send_event(ServerEvent::Close {
            code: code.unwrap_or(DEFAULT_CLOSE_CODE),
            reason: None,
        })
        .await
    }
}

/// A WebSocket event handler bound to one connection.
///
/// Implementations are constructed with [`Default`] once per connection.
/// Channel-layer messages are routed through the table returned by
/// [`router`](Self::router); raise
/// [`StopConsumer`](ConsumerError::StopConsumer) from any handler to end
/// the connection cleanly, or
/// [`DenyConnection`](ConsumerError::DenyConnection) from `connect` to
/// refuse the handshake.
#[async_trait]
pub trait WebsocketConsumer: Default + Send + 'static {
    /// Registry alias of the channel layer to attach to, if any.
    fn channel_layer_alias(&self) -> Option<&str> {
        None
    }

    /// Groups to join on connect and leave on termination.
    fn groups(&self) -> Vec<String> {
        Vec::new()
    }

    /// The routing table for channel-layer messages, built once per
    /// application.
    fn router() -> MessageRouter<Self>
    where
        Self: Sized,
    {
        MessageRouter::new()
    }

    /// Called when the connection handshake opens. Accepts by default.
    async fn connect(&mut self, ctx: &mut WebsocketContext) -> ConsumerResult<()> {
        ctx.accept(None).await
    }

    /// Called with each decoded data frame; exactly one of `text` and
    /// `bytes` is set.
    async fn receive(
        &mut self,
        ctx: &mut WebsocketContext,
        text: Option<String>,
        bytes: Option<Vec<u8>>,
    ) -> ConsumerResult<()> {
        let _ = (ctx, text, bytes);
        Ok(())
    }

    /// Called when the connection is closed.
    async fn disconnect(&mut self, code: u16) -> ConsumerResult<()> {
        let _ = code;
        Ok(())
    }
}

/// The application wrapper turning a [`WebsocketConsumer`] type into an
/// [`AsgiApplication`]. One instance serves many connections; each `call`
/// constructs a fresh consumer.
pub struct WebsocketApp<C: WebsocketConsumer> {
    router: Arc<MessageRouter<C>>,
}

impl<C: WebsocketConsumer> WebsocketApp<C> {
    /// Build the application, constructing the routing table eagerly.
    pub fn new() -> Self {
        Self {
            router: Arc::new(C::router()),
        }
    }
}

impl<C: WebsocketConsumer> Default for WebsocketApp<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<C: WebsocketConsumer> AsgiApplication for WebsocketApp<C> {
    async fn call(
        &self,
        scope: Scope,
        receive: EventStream,
        send: EventSink,
    ) -> ConsumerResult<()> {
        Runtime::<C>::new(self.router.clone(), scope, send)?
            .run(receive)
            .await
    }
}

enum Incoming {
    Upstream(Option<ClientEvent>),
    Layer(Message),
}

struct Runtime<C: WebsocketConsumer> {
    consumer: C,
    router: Arc<MessageRouter<C>>,
    groups: Vec<String>,
    ctx: WebsocketContext,
    /// Groups actually joined so far; a partial join failure still unwinds
    /// every membership that was written.
    joined: Vec<String>,
}

impl<C: WebsocketConsumer> Runtime<C> {
    fn new(
        router: Arc<MessageRouter<C>>,
        scope: Scope,
        sink: EventSink,
    ) -> ConsumerResult<Self> {
        let consumer = C::default();
        let groups = consumer.groups();
        let layer = consumer.channel_layer_alias().and_then(get_channel_layer);
        if layer.is_none() && !groups.is_empty() {
            return Err(ConsumerError::LayerRequired(
                "consumer declares groups but no channel layer is configured".to_string(),
            ));
        }
        Ok(Self {
            consumer,
            router,
            groups,
            ctx: WebsocketContext {
                scope,
                sink,
                layer,
                channel_name: None,
            },
            joined: Vec::new(),
        })
    }

    async fn run(mut self, mut receive: EventStream) -> ConsumerResult<()> {
        if let Some(layer) = self.ctx.layer.clone() {
            self.ctx.channel_name = Some(layer.new_channel("specific").await?);
        }
        let result = self.dispatch_loop(&mut receive).await;
        self.leave_groups().await;
        self.release_channel().await;
        match result {
            Err(ConsumerError::StopConsumer) => Ok(()),
            other => other,
        }
    }

    async fn dispatch_loop(&mut self, receive: &mut EventStream) -> ConsumerResult<()> {
        loop {
            let incoming = match (&self.ctx.layer, &self.ctx.channel_name) {
                (Some(layer), Some(channel)) => {
                    tokio::select! {
                        event = receive.next() => Incoming::Upstream(event),
                        message = layer.receive(channel) => Incoming::Layer(message?),
                    }
                }
                _ => Incoming::Upstream(receive.next().await),
            };
            match incoming {
                // The framework cancelled us; unwind and clean up.
                Incoming::Upstream(None) => return Ok(()),
                Incoming::Upstream(Some(ClientEvent::Connect)) => self.on_connect().await?,
                Incoming::Upstream(Some(ClientEvent::Receive { text, bytes })) => {
                    self.consumer.receive(&mut self.ctx, text, bytes).await?;
                }
                Incoming::Upstream(Some(ClientEvent::Disconnect { code })) => {
                    self.leave_groups().await;
                    self.consumer.disconnect(code).await?;
                    return Err(ConsumerError::StopConsumer);
                }
                Incoming::Layer(message) => {
                    let router = self.router.clone();
                    router.dispatch(&mut self.consumer, &mut self.ctx, message).await?;
                }
            }
        }
    }

    async fn on_connect(&mut self) -> ConsumerResult<()> {
        if let (Some(layer), Some(channel)) = (&self.ctx.layer, &self.ctx.channel_name) {
            for group in &self.groups {
                layer.group_add(group, channel).await?;
                self.joined.push(group.clone());
            }
        }
        match self.consumer.connect(&mut self.ctx).await {
            Ok(()) => Ok(()),
            Err(ConsumerError::AcceptConnection) => self.ctx.accept(None).await,
            Err(ConsumerError::DenyConnection) => {
                debug!(path = %self.ctx.scope.path, "connection denied by consumer");
                self.ctx.close(None).await
            }
            Err(err) => Err(err),
        }
    }

    /// Leave every group actually joined so far, best-effort. Runs on the
    /// disconnect path and again on any abnormal exit; partial joins are
    /// unwound membership by membership.
    async fn leave_groups(&mut self) {
        if self.joined.is_empty() {
            return;
        }
        let joined = std::mem::take(&mut self.joined);
        if let (Some(layer), Some(channel)) = (&self.ctx.layer, &self.ctx.channel_name) {
            for group in &joined {
                if let Err(err) = layer.group_discard(group, channel).await {
                    warn!(group = %group, error = %err, "group discard during cleanup failed");
                }
            }
        }
    }

    /// Hand the channel identity back to the layer on termination, so
    /// per-channel resources (inboxes, cached connections, subscriptions)
    /// do not outlive the consumer.
    async fn release_channel(&mut self) {
        if let (Some(layer), Some(channel)) = (&self.ctx.layer, self.ctx.channel_name.take()) {
            if let Err(err) = layer.close_channel(&channel).await {
                warn!(channel = %channel, error = %err, "channel release failed");
            }
        }
    }
}
