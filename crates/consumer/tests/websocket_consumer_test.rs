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

//! End-to-end consumer tests driven through the test communicators

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crosstalk_consumer::testing::WebsocketCommunicator;
use crosstalk_consumer::{
    AsgiApplication, ConsumerError, ConsumerResult, JsonWebsocketApp, JsonWebsocketConsumer,
    MessageRouter, Middleware, MiddlewareApp, Scope, WebsocketApp, WebsocketConsumer,
    WebsocketContext,
};
use crosstalk_layers::{register_channel_layer, InMemoryChannelLayer, Message};

const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct EchoConsumer;

#[async_trait]
impl WebsocketConsumer for EchoConsumer {
    async fn receive(
        &mut self,
        ctx: &mut WebsocketContext,
        text: Option<String>,
        bytes: Option<Vec<u8>>,
    ) -> ConsumerResult<()> {
        ctx.send(text, bytes, None).await
    }
}

#[tokio::test]
async fn test_websocket_consumer_echo() {
    let app: Arc<dyn AsgiApplication> = Arc::new(WebsocketApp::<EchoConsumer>::new());
    let mut communicator = WebsocketCommunicator::new(app, "/testws/");

    let (accepted, subprotocol) = communicator.connect(TIMEOUT).await.unwrap();
    assert!(accepted);
    assert!(subprotocol.is_none());

    communicator.send_text_to("hello").await.unwrap();
    assert_eq!(communicator.receive_text_from(TIMEOUT).await.unwrap(), "hello");

    communicator.send_bytes_to(b"w\0\0\0".to_vec()).await.unwrap();
    assert_eq!(
        communicator.receive_bytes_from(TIMEOUT).await.unwrap(),
        b"w\0\0\0"
    );

    communicator.disconnect(1000, TIMEOUT).await.unwrap();
}

#[derive(Default)]
struct SubprotocolConsumer;

#[async_trait]
impl WebsocketConsumer for SubprotocolConsumer {
    async fn connect(&mut self, ctx: &mut WebsocketContext) -> ConsumerResult<()> {
        assert_eq!(
            ctx.scope().subprotocols,
            vec!["subprotocol1".to_string(), "subprotocol2".to_string()]
        );
        ctx.accept(Some("subprotocol2")).await
    }
}

#[tokio::test]
async fn test_websocket_consumer_subprotocol() {
    let app: Arc<dyn AsgiApplication> = Arc::new(WebsocketApp::<SubprotocolConsumer>::new());
    let scope = Scope::websocket("/testws/")
        .with_subprotocols(vec!["subprotocol1".to_string(), "subprotocol2".to_string()]);
    let mut communicator = WebsocketCommunicator::with_scope(app, scope);

    let (accepted, subprotocol) = communicator.connect(TIMEOUT).await.unwrap();
    assert!(accepted);
    assert_eq!(subprotocol.as_deref(), Some("subprotocol2"));
}

const ROOM_ALIAS: &str = "test-room-layer";

#[derive(Default)]
struct RoomConsumer;

impl RoomConsumer {
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
impl WebsocketConsumer for RoomConsumer {
    fn channel_layer_alias(&self) -> Option<&str> {
        Some(ROOM_ALIAS)
    }

    fn groups(&self) -> Vec<String> {
        vec!["chat".to_string()]
    }

    fn router() -> MessageRouter<Self> {
        MessageRouter::new().route("chat.message", |consumer: &mut Self, ctx, message| {
            Box::pin(consumer.chat_message(ctx, message))
        })
    }
}

#[tokio::test]
async fn test_groups_auto_join_and_leave() {
    let layer = Arc::new(InMemoryChannelLayer::default());
    register_channel_layer(ROOM_ALIAS, layer.clone());

    let app: Arc<dyn AsgiApplication> = Arc::new(WebsocketApp::<RoomConsumer>::new());
    let mut communicator = WebsocketCommunicator::new(app, "/testws/");
    let (accepted, _) = communicator.connect(TIMEOUT).await.unwrap();
    assert!(accepted);

    // The consumer's channel joined the declared group on connect.
    let members = layer.group_channels("chat").await;
    assert_eq!(members.len(), 1);

    use crosstalk_layers::ChannelLayer;
    layer
        .group_send("chat", json!({"type": "chat.message", "text": "hello"}))
        .await
        .unwrap();
    assert_eq!(communicator.receive_text_from(TIMEOUT).await.unwrap(), "hello");

    communicator.disconnect(1000, TIMEOUT).await.unwrap();
    assert!(layer.group_channels("chat").await.is_empty());
}

const UNROUTED_ALIAS: &str = "test-unrouted-layer";

#[derive(Default)]
struct UnroutedConsumer;

#[async_trait]
impl WebsocketConsumer for UnroutedConsumer {
    fn channel_layer_alias(&self) -> Option<&str> {
        Some(UNROUTED_ALIAS)
    }

    fn groups(&self) -> Vec<String> {
        vec!["lobby".to_string()]
    }
}

#[tokio::test]
async fn test_unrouted_message_type_terminates_consumer() {
    let layer = Arc::new(InMemoryChannelLayer::default());
    register_channel_layer(UNROUTED_ALIAS, layer.clone());

    let app: Arc<dyn AsgiApplication> = Arc::new(WebsocketApp::<UnroutedConsumer>::new());
    let mut communicator = WebsocketCommunicator::new(app, "/testws/");
    communicator.connect(TIMEOUT).await.unwrap();

    use crosstalk_layers::ChannelLayer;
    layer
        .group_send("lobby", json!({"type": "not.routed"}))
        .await
        .unwrap();
    let err = communicator.wait(TIMEOUT).await.unwrap_err();
    assert!(matches!(err, ConsumerError::NoHandler(kind) if kind == "not.routed"));

    // Declared groups were left even though the exit was abnormal.
    assert!(layer.group_channels("lobby").await.is_empty());
}

const UNDERSCORE_ALIAS: &str = "test-underscore-layer";

#[derive(Default)]
struct UnderscoreTargetConsumer;

#[async_trait]
impl WebsocketConsumer for UnderscoreTargetConsumer {
    fn channel_layer_alias(&self) -> Option<&str> {
        Some(UNDERSCORE_ALIAS)
    }

    fn groups(&self) -> Vec<String> {
        vec!["lobby2".to_string()]
    }
}

#[tokio::test]
async fn test_underscored_message_type_is_rejected() {
    let layer = Arc::new(InMemoryChannelLayer::default());
    register_channel_layer(UNDERSCORE_ALIAS, layer.clone());

    let app: Arc<dyn AsgiApplication> = Arc::new(WebsocketApp::<UnderscoreTargetConsumer>::new());
    let mut communicator = WebsocketCommunicator::new(app, "/testws/");
    communicator.connect(TIMEOUT).await.unwrap();

    use crosstalk_layers::ChannelLayer;
    layer
        .group_send("lobby2", json!({"type": "_private.call"}))
        .await
        .unwrap();
    let err = communicator.wait(TIMEOUT).await.unwrap_err();
    assert!(matches!(err, ConsumerError::BadType(_)));
}

const PARTIAL_JOIN_ALIAS: &str = "test-partial-join-layer";

/// Wraps the in-memory layer and fails `group_add` for one group, to
/// exercise the runtime's unwind of partially-joined memberships.
struct PartialJoinLayer {
    inner: InMemoryChannelLayer,
    discarded: std::sync::Mutex<Vec<String>>,
}

impl PartialJoinLayer {
    fn new() -> Self {
        Self {
            inner: InMemoryChannelLayer::default(),
            discarded: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn discarded(&self) -> Vec<String> {
        self.discarded.lock().unwrap().clone()
    }
}

#[async_trait]
impl crosstalk_layers::ChannelLayer for PartialJoinLayer {
    async fn new_channel(&self, prefix: &str) -> crosstalk_layers::LayerResult<String> {
        self.inner.new_channel(prefix).await
    }

    async fn send(&self, channel: &str, message: Message) -> crosstalk_layers::LayerResult<()> {
        self.inner.send(channel, message).await
    }

    async fn receive(&self, channel: &str) -> crosstalk_layers::LayerResult<Message> {
        self.inner.receive(channel).await
    }

    async fn group_add(&self, group: &str, channel: &str) -> crosstalk_layers::LayerResult<()> {
        if group == "bad" {
            return Err(crosstalk_layers::LayerError::Transport(
                "injected join failure".to_string(),
            ));
        }
        self.inner.group_add(group, channel).await
    }

    async fn group_discard(&self, group: &str, channel: &str) -> crosstalk_layers::LayerResult<()> {
        self.discarded.lock().unwrap().push(group.to_string());
        self.inner.group_discard(group, channel).await
    }

    async fn group_send(&self, group: &str, message: Message) -> crosstalk_layers::LayerResult<()> {
        self.inner.group_send(group, message).await
    }

    async fn close_channel(&self, channel: &str) -> crosstalk_layers::LayerResult<()> {
        self.inner.close_channel(channel).await
    }

    async fn flush(&self) -> crosstalk_layers::LayerResult<()> {
        self.inner.flush().await
    }

    async fn close(&self) -> crosstalk_layers::LayerResult<()> {
        self.inner.close().await
    }
}

#[derive(Default)]
struct PartialJoinConsumer;

#[async_trait]
impl WebsocketConsumer for PartialJoinConsumer {
    fn channel_layer_alias(&self) -> Option<&str> {
        Some(PARTIAL_JOIN_ALIAS)
    }

    fn groups(&self) -> Vec<String> {
        vec!["good".to_string(), "bad".to_string()]
    }
}

#[tokio::test]
async fn test_partial_group_join_is_unwound() {
    let layer = Arc::new(PartialJoinLayer::new());
    register_channel_layer(PARTIAL_JOIN_ALIAS, layer.clone());

    let app: Arc<dyn AsgiApplication> = Arc::new(WebsocketApp::<PartialJoinConsumer>::new());
    let mut communicator = WebsocketCommunicator::new(app, "/testws/");
    // The handshake aborts when the second group join fails.
    let _ = communicator.connect(TIMEOUT).await;
    let err = communicator.wait(TIMEOUT).await.unwrap_err();
    assert!(matches!(err, ConsumerError::Layer(_)));

    // The membership that was written got unwound on the way out.
    assert_eq!(layer.discarded(), vec!["good".to_string()]);
    assert!(layer.inner.group_channels("good").await.is_empty());
}

#[derive(Default)]
struct DenyConsumer;

#[async_trait]
impl WebsocketConsumer for DenyConsumer {
    async fn connect(&mut self, _ctx: &mut WebsocketContext) -> ConsumerResult<()> {
        Err(ConsumerError::DenyConnection)
    }
}

#[tokio::test]
async fn test_deny_connection_closes_handshake() {
    let app: Arc<dyn AsgiApplication> = Arc::new(WebsocketApp::<DenyConsumer>::new());
    let mut communicator = WebsocketCommunicator::new(app, "/testws/");
    let (accepted, _) = communicator.connect(TIMEOUT).await.unwrap();
    assert!(!accepted);
}

#[derive(Default)]
struct GroupsWithoutLayerConsumer;

#[async_trait]
impl WebsocketConsumer for GroupsWithoutLayerConsumer {
    fn groups(&self) -> Vec<String> {
        vec!["chat".to_string()]
    }
}

#[tokio::test]
async fn test_groups_without_layer_fail_construction() {
    let app: Arc<dyn AsgiApplication> = Arc::new(WebsocketApp::<GroupsWithoutLayerConsumer>::new());
    let mut communicator = WebsocketCommunicator::new(app, "/testws/");
    let err = communicator.wait(TIMEOUT).await.unwrap_err();
    assert!(matches!(err, ConsumerError::LayerRequired(_)));
}

#[derive(Default)]
struct JsonEchoConsumer;

#[async_trait]
impl JsonWebsocketConsumer for JsonEchoConsumer {
    async fn receive_json(
        &mut self,
        ctx: &mut WebsocketContext,
        content: Value,
    ) -> ConsumerResult<()> {
        self.send_json(ctx, &content, false).await
    }
}

#[tokio::test]
async fn test_json_consumer_round_trip() {
    let app: Arc<dyn AsgiApplication> = Arc::new(JsonWebsocketApp::<JsonEchoConsumer>::new());
    let mut communicator = WebsocketCommunicator::new(app, "/testws/");
    let (accepted, _) = communicator.connect(TIMEOUT).await.unwrap();
    assert!(accepted);

    communicator
        .send_json_to(&json!({"hello": "world"}))
        .await
        .unwrap();
    assert_eq!(
        communicator.receive_json_from(TIMEOUT).await.unwrap(),
        json!({"hello": "world"})
    );
}

#[tokio::test]
async fn test_json_consumer_rejects_binary_frames() {
    let app: Arc<dyn AsgiApplication> = Arc::new(JsonWebsocketApp::<JsonEchoConsumer>::new());
    let mut communicator = WebsocketCommunicator::new(app, "/testws/");
    communicator.connect(TIMEOUT).await.unwrap();

    communicator.send_bytes_to(b"w\0\0\0".to_vec()).await.unwrap();
    let err = communicator.wait(TIMEOUT).await.unwrap_err();
    assert!(matches!(err, ConsumerError::Encoding(_)));
}

struct AttachUser;

#[async_trait]
impl Middleware for AttachUser {
    async fn transform_scope(&self, mut scope: Scope) -> ConsumerResult<Scope> {
        scope.user = Some("mary".to_string());
        Ok(scope)
    }
}

#[derive(Default)]
struct WhoAmIConsumer;

#[async_trait]
impl WebsocketConsumer for WhoAmIConsumer {
    async fn connect(&mut self, ctx: &mut WebsocketContext) -> ConsumerResult<()> {
        ctx.accept(None).await?;
        let user = ctx.scope().user.clone().unwrap_or_default();
        ctx.send_text(user).await
    }
}

#[tokio::test]
async fn test_middleware_transforms_scope() {
    let inner: Arc<dyn AsgiApplication> = Arc::new(WebsocketApp::<WhoAmIConsumer>::new());
    let app: Arc<dyn AsgiApplication> = Arc::new(MiddlewareApp::new(AttachUser, inner));
    let mut communicator = WebsocketCommunicator::new(app, "/testws/");
    let (accepted, _) = communicator.connect(TIMEOUT).await.unwrap();
    assert!(accepted);
    assert_eq!(communicator.receive_text_from(TIMEOUT).await.unwrap(), "mary");
}

#[tokio::test]
async fn test_receive_nothing_when_idle() {
    let app: Arc<dyn AsgiApplication> = Arc::new(WebsocketApp::<EchoConsumer>::new());
    let mut communicator = WebsocketCommunicator::new(app, "/testws/");
    communicator.connect(TIMEOUT).await.unwrap();
    assert!(communicator.receive_nothing(Duration::from_millis(100)).await);

    // A frame that arrives during the quiet check is not lost.
    communicator.send_text_to("late").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!communicator.receive_nothing(Duration::from_millis(100)).await);
    assert_eq!(communicator.receive_text_from(TIMEOUT).await.unwrap(), "late");
}
