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

//! Framework event types and the callable pair
//!
//! The events exchanged with the host framework are tagged enums whose serde
//! tag is the dotted event type (`websocket.connect`, `websocket.send`, …),
//! so they serialize to exactly the mapping shape the wire contract
//! describes. [`EventStream`] and [`EventSink`] are the receive/send
//! callables handed to an application: thin wrappers over bounded mpsc
//! channels.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{ConsumerError, ConsumerResult};

/// Close code sent when none is given.
pub const DEFAULT_CLOSE_CODE: u16 = 1000;

/// Events arriving from the client, via the framework.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// The connection handshake opened.
    #[serde(rename = "websocket.connect")]
    Connect,
    /// A data frame arrived. Exactly one of `text` and `bytes` is set.
    #[serde(rename = "websocket.receive")]
    Receive {
        /// Text frame payload.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        /// Binary frame payload.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bytes: Option<Vec<u8>>,
    },
    /// The client went away.
    #[serde(rename = "websocket.disconnect")]
    Disconnect {
        /// WebSocket close code.
        code: u16,
    },
}

impl ClientEvent {
    /// A text data frame.
    pub fn text(text: impl Into<String>) -> Self {
        ClientEvent::Receive {
            text: Some(text.into()),
            bytes: None,
        }
    }

    /// A binary data frame.
    pub fn bytes(bytes: Vec<u8>) -> Self {
        ClientEvent::Receive {
            text: None,
            bytes: Some(bytes),
        }
    }
}

/// Events emitted towards the client, via the framework.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Accept the pending handshake.
    #[serde(rename = "websocket.accept")]
    Accept {
        /// Subprotocol selected from the client's offer.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subprotocol: Option<String>,
    },
    /// A data frame for the client. Exactly one of `text` and `bytes` is set.
    #[serde(rename = "websocket.send")]
    Send {
        /// Text frame payload.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        /// Binary frame payload.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bytes: Option<Vec<u8>>,
    },
    /// Close the connection from the server end.
    #[serde(rename = "websocket.close")]
    Close {
        /// WebSocket close code.
        code: u16,
        /// Optional close reason.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

/// The upstream receive callable: yields the next client event, or `None`
/// when the framework tears the connection down.
pub struct EventStream {
    rx: mpsc::Receiver<ClientEvent>,
}

impl EventStream {
    /// A connected `(sender, stream)` pair with the given buffer.
    pub fn channel(buffer: usize) -> (mpsc::Sender<ClientEvent>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self { rx })
    }

    /// The next client event. `None` means the sender side is gone.
    pub async fn next(&mut self) -> Option<ClientEvent> {
        self.rx.recv().await
    }
}

/// The downstream send callable: accepts outbound events.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<ServerEvent>,
}

impl EventSink {
    /// A connected `(sink, receiver)` pair with the given buffer.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }

    /// Emit one event towards the client.
    pub async fn send(&self, event: ServerEvent) -> ConsumerResult<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| ConsumerError::Transport("framework closed the send side".to_string()))
    }
}
