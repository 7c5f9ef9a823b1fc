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

//! Queue layer integration tests against a real Redis instance
//!
//! ## Running Tests
//! ```bash
//! # Start Redis
//! docker run --rm -p 6379:6379 redis:7
//!
//! # Run tests
//! cargo test -p crosstalk-redis --test redis_integration_test
//! ```
//!
//! Tests are skipped silently when no server answers on localhost:6379.

use std::time::Duration;

use serde_json::json;

use crosstalk_layers::{ChannelLayer, LayerError};
use crosstalk_redis::{RedisChannelLayer, RedisLayerOptions};

const REDIS_URL: &str = "redis://localhost:6379";

async fn is_redis_available() -> bool {
    let Ok(client) = redis::Client::open(REDIS_URL) else {
        return false;
    };
    match client.get_multiplexed_async_connection().await {
        Ok(mut conn) => redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .is_ok(),
        Err(_) => false,
    }
}

fn test_layer(prefix: &str, options: RedisLayerOptions) -> RedisChannelLayer {
    RedisChannelLayer::new(RedisLayerOptions {
        hosts: vec![REDIS_URL.into()],
        prefix: prefix.to_string(),
        ..options
    })
    .expect("layer builds")
}

#[tokio::test]
async fn test_send_receive() {
    if !is_redis_available().await {
        return;
    }
    let layer = test_layer("it-sendrecv", RedisLayerOptions::default());
    layer
        .send("test.channel", json!({"type": "test.message", "text": "Ahoy-hoy!"}))
        .await
        .unwrap();
    let message = layer.receive("test.channel").await.unwrap();
    assert_eq!(message["type"], "test.message");
    assert_eq!(message["text"], "Ahoy-hoy!");
    layer.flush().await.unwrap();
}

#[tokio::test]
async fn test_single_producer_ordering() {
    if !is_redis_available().await {
        return;
    }
    let layer = test_layer("it-order", RedisLayerOptions::default());
    for i in 0..10 {
        layer
            .send("ordered", json!({"type": "test.message", "seq": i}))
            .await
            .unwrap();
    }
    for i in 0..10 {
        assert_eq!(layer.receive("ordered").await.unwrap()["seq"], i);
    }
    layer.flush().await.unwrap();
}

#[tokio::test]
async fn test_capacity_rejects_send() {
    if !is_redis_available().await {
        return;
    }
    let layer = test_layer(
        "it-capacity",
        RedisLayerOptions {
            capacity: 2,
            ..Default::default()
        },
    );
    layer.send("c", json!({"type": "m.1"})).await.unwrap();
    layer.send("c", json!({"type": "m.2"})).await.unwrap();
    let err = layer.send("c", json!({"type": "m.3"})).await.unwrap_err();
    assert!(matches!(err, LayerError::ChannelFull(name) if name == "c"));
    layer.flush().await.unwrap();
}

#[tokio::test]
async fn test_channel_capacity_override() {
    if !is_redis_available().await {
        return;
    }
    let layer = test_layer(
        "it-override",
        RedisLayerOptions {
            capacity: 100,
            channel_capacity: vec![("tight*".to_string(), 1)],
            ..Default::default()
        },
    );
    layer.send("tight-chan", json!({"type": "m.1"})).await.unwrap();
    let err = layer
        .send("tight-chan", json!({"type": "m.2"}))
        .await
        .unwrap_err();
    assert!(matches!(err, LayerError::ChannelFull(_)));
    layer.flush().await.unwrap();
}

#[tokio::test]
async fn test_expiry_discards_messages() {
    if !is_redis_available().await {
        return;
    }
    let layer = test_layer(
        "it-expiry",
        RedisLayerOptions {
            expiry: 1,
            ..Default::default()
        },
    );
    layer.send("c", json!({"type": "m.stale"})).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1300)).await;
    // The list key expired with the message in it.
    layer.send("c", json!({"type": "m.fresh"})).await.unwrap();
    assert_eq!(layer.receive("c").await.unwrap()["type"], "m.fresh");
    layer.flush().await.unwrap();
}

#[tokio::test]
async fn test_new_channel_round_trip() {
    if !is_redis_available().await {
        return;
    }
    let layer = test_layer("it-newchan", RedisLayerOptions::default());
    let channel = layer.new_channel("specific").await.unwrap();
    layer
        .send(&channel, json!({"type": "test.message"}))
        .await
        .unwrap();
    assert_eq!(layer.receive(&channel).await.unwrap()["type"], "test.message");
    // Terminating consumers hand their channel identity back.
    layer.close_channel(&channel).await.unwrap();
    layer.flush().await.unwrap();
}

#[tokio::test]
async fn test_groups_across_layer_instances() {
    if !is_redis_available().await {
        return;
    }
    // Two instances with the same hosts stand in for two processes.
    let receiver = test_layer("it-groups", RedisLayerOptions::default());
    let sender = test_layer("it-groups", RedisLayerOptions::default());

    let channel = receiver.new_channel("specific").await.unwrap();
    receiver.group_add("room_general", &channel).await.unwrap();

    sender
        .group_send(
            "room_general",
            json!({"type": "chat.message", "text": "hello"}),
        )
        .await
        .unwrap();

    let message = tokio::time::timeout(Duration::from_secs(10), receiver.receive(&channel))
        .await
        .expect("message delivered")
        .unwrap();
    assert_eq!(message["text"], "hello");

    // After discard, the next group_send leaves the channel empty.
    receiver
        .group_discard("room_general", &channel)
        .await
        .unwrap();
    sender
        .group_send("room_general", json!({"type": "chat.message", "text": "again"}))
        .await
        .unwrap();
    let nothing =
        tokio::time::timeout(Duration::from_millis(300), receiver.receive(&channel)).await;
    assert!(nothing.is_err());
    receiver.flush().await.unwrap();
}

#[tokio::test]
async fn test_group_send_skips_full_channels() {
    if !is_redis_available().await {
        return;
    }
    let layer = test_layer(
        "it-groupfull",
        RedisLayerOptions {
            capacity: 1,
            ..Default::default()
        },
    );
    layer.group_add("room", "full-chan").await.unwrap();
    layer.group_add("room", "open-chan").await.unwrap();
    layer.send("full-chan", json!({"type": "m.0"})).await.unwrap();

    // Fan-out succeeds even though one member is saturated.
    layer.group_send("room", json!({"type": "m.1"})).await.unwrap();

    assert_eq!(layer.receive("full-chan").await.unwrap()["type"], "m.0");
    assert_eq!(layer.receive("open-chan").await.unwrap()["type"], "m.1");
    layer.flush().await.unwrap();
}

#[tokio::test]
async fn test_group_send_to_empty_group_is_noop() {
    if !is_redis_available().await {
        return;
    }
    let layer = test_layer("it-emptygroup", RedisLayerOptions::default());
    layer
        .group_send("nobody-home", json!({"type": "chat.message"}))
        .await
        .unwrap();
    layer.flush().await.unwrap();
}

#[tokio::test]
async fn test_encrypted_layer_round_trip() {
    if !is_redis_available().await {
        return;
    }
    let options = RedisLayerOptions {
        symmetric_encryption_keys: Some(vec!["integration-secret".to_string()]),
        ..Default::default()
    };
    let layer = test_layer("it-crypto", options);
    layer
        .send("secure", json!({"type": "test.message", "text": "secret"}))
        .await
        .unwrap();
    assert_eq!(layer.receive("secure").await.unwrap()["text"], "secret");
    layer.flush().await.unwrap();
}
