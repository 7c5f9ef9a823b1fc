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

//! End-to-end scenarios across the facade

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::consumer::testing::WebsocketCommunicator;
use crate::{
    register_channel_layer, AsgiApplication, ChannelLayer, ConsumerResult, InMemoryChannelLayer,
    LayerConfig, LayerError, Message, MessageRouter, WebsocketApp, WebsocketConsumer,
    WebsocketContext,
};

const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct EchoConsumer;

#[async_trait]
impl WebsocketConsumer for EchoConsumer {
    async fn receive(
        &mut self,
        ctx: &mut WebsocketContext,
        text: Option<String>,
        _bytes: Option<Vec<u8>>,
    ) -> ConsumerResult<()> {
        if let Some(text) = text {
            ctx.send_text(format!("echo: {text}")).await?;
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_echo_scenario() {
    let app: Arc<dyn AsgiApplication> = Arc::new(WebsocketApp::<EchoConsumer>::new());
    let mut client = WebsocketCommunicator::new(app, "/echo/");
    let (accepted, _) = client.connect(TIMEOUT).await.unwrap();
    assert!(accepted);

    client.send_text_to("hi").await.unwrap();
    assert_eq!(client.receive_text_from(TIMEOUT).await.unwrap(), "echo: hi");

    client.disconnect(1000, TIMEOUT).await.unwrap();
}

const CHAT_ALIAS: &str = "smoke-room-chat";

#[derive(Default)]
struct RoomChatConsumer;

impl RoomChatConsumer {
    async fn chat_message(
        &mut self,
        ctx: &mut WebsocketContext,
        message: Message,
    ) -> ConsumerResult<()> {
        let text = message["text"].as_str().unwrap_or_default().to_string();
        ctx.send_text(text).await
    }
}

#[async_trait]
impl WebsocketConsumer for RoomChatConsumer {
    fn channel_layer_alias(&self) -> Option<&str> {
        Some(CHAT_ALIAS)
    }

    fn groups(&self) -> Vec<String> {
        vec!["room_general".to_string()]
    }

    fn router() -> MessageRouter<Self> {
        MessageRouter::new().route("chat.message", |consumer: &mut Self, ctx, message| {
            Box::pin(consumer.chat_message(ctx, message))
        })
    }
}

#[tokio::test]
async fn test_room_chat_scenario() {
    let layer = Arc::new(InMemoryChannelLayer::default());
    register_channel_layer(CHAT_ALIAS, layer.clone());

    let app: Arc<dyn AsgiApplication> = Arc::new(WebsocketApp::<RoomChatConsumer>::new());
    let mut alice = WebsocketCommunicator::new(app.clone(), "/chat/");
    let mut bob = WebsocketCommunicator::new(app, "/chat/");
    alice.connect(TIMEOUT).await.unwrap();
    bob.connect(TIMEOUT).await.unwrap();

    // An external producer publishes to the room; both clients see it.
    layer
        .group_send(
            "room_general",
            json!({"type": "chat.message", "text": "hello"}),
        )
        .await
        .unwrap();
    assert_eq!(alice.receive_text_from(TIMEOUT).await.unwrap(), "hello");
    assert_eq!(bob.receive_text_from(TIMEOUT).await.unwrap(), "hello");

    alice.disconnect(1000, TIMEOUT).await.unwrap();
    bob.disconnect(1000, TIMEOUT).await.unwrap();
    assert!(layer.group_channels("room_general").await.is_empty());
}

#[tokio::test]
async fn test_capacity_drop_scenario() {
    let layer = InMemoryChannelLayer::new(LayerConfig::new(60, 86_400, 2, &[]));
    layer.send("c", json!({"type": "m.1"})).await.unwrap();
    layer.send("c", json!({"type": "m.2"})).await.unwrap();
    let err = layer.send("c", json!({"type": "m.3"})).await.unwrap_err();
    assert!(matches!(err, LayerError::ChannelFull(_)));
}

#[tokio::test]
async fn test_expiry_scenario() {
    let layer = InMemoryChannelLayer::new(LayerConfig::new(1, 86_400, 100, &[]));
    layer.send("c", json!({"type": "m.stale"})).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1200)).await;
    // The message expired; the inbox suspends as if it were empty.
    let pending = tokio::time::timeout(Duration::from_millis(200), layer.receive("c")).await;
    assert!(pending.is_err());
}
