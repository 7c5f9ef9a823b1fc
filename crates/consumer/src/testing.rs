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

//! Test communicators
//!
//! ## Purpose
//! Drives an application the way a framework would, from inside a test:
//! feed it client events, observe what it sends back, and await its
//! termination. [`WebsocketCommunicator`] layers the WebSocket handshake
//! and frame helpers on top of the raw [`ApplicationCommunicator`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;

use crate::application::AsgiApplication;
use crate::error::{ConsumerError, ConsumerResult};
use crate::events::{ClientEvent, EventSink, EventStream, ServerEvent};
use crate::scope::Scope;

const EVENT_BUFFER: usize = 64;

/// Runs an application and exchanges events with it.
pub struct ApplicationCommunicator {
    input_tx: tokio::sync::mpsc::Sender<ClientEvent>,
    output_rx: tokio::sync::mpsc::Receiver<ServerEvent>,
    pending: VecDeque<ServerEvent>,
    handle: Option<JoinHandle<ConsumerResult<()>>>,
}

impl ApplicationCommunicator {
    /// Spawn `app` against `scope`.
    pub fn new(app: Arc<dyn AsgiApplication>, scope: Scope) -> Self {
        let (input_tx, receive) = EventStream::channel(EVENT_BUFFER);
        let (send, output_rx) = EventSink::channel(EVENT_BUFFER);
        let handle = tokio::spawn(async move { app.call(scope, receive, send).await });
        Self {
            input_tx,
            output_rx,
            pending: VecDeque::new(),
            handle: Some(handle),
        }
    }

    /// Feed one client event to the application.
    pub async fn send_input(&self, event: ClientEvent) -> ConsumerResult<()> {
        self.input_tx
            .send(event)
            .await
            .map_err(|_| ConsumerError::Transport("application stopped reading input".to_string()))
    }

    /// The next event the application sent, waiting up to `timeout`.
    pub async fn receive_output(&mut self, timeout: Duration) -> ConsumerResult<ServerEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(event);
        }
        match tokio::time::timeout(timeout, self.output_rx.recv()).await {
            Ok(Some(event)) => Ok(event),
            Ok(None) => Err(ConsumerError::Transport(
                "application closed its send side".to_string(),
            )),
            Err(_) => Err(ConsumerError::Timeout(
                "no output within timeout".to_string(),
            )),
        }
    }

    /// Whether the application stays silent for `timeout`. An event that
    /// does arrive is kept for the next [`receive_output`](Self::receive_output).
    pub async fn receive_nothing(&mut self, timeout: Duration) -> bool {
        if !self.pending.is_empty() {
            return false;
        }
        match tokio::time::timeout(timeout, self.output_rx.recv()).await {
            Ok(Some(event)) => {
                self.pending.push_back(event);
                false
            }
            Ok(None) | Err(_) => true,
        }
    }

    /// Await the application's termination and surface its result.
    pub async fn wait(&mut self, timeout: Duration) -> ConsumerResult<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(ConsumerError::Transport(format!(
                "application task failed: {join_err}"
            ))),
            Err(_) => Err(ConsumerError::Timeout(
                "application did not terminate".to_string(),
            )),
        }
    }

    /// Abort the application task.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for ApplicationCommunicator {
    fn drop(&mut self) {
        self.stop();
    }
}

/// WebSocket-flavoured wrapper over [`ApplicationCommunicator`].
pub struct WebsocketCommunicator {
    inner: ApplicationCommunicator,
}

impl WebsocketCommunicator {
    /// Spawn `app` against a fresh WebSocket scope for `path`.
    pub fn new(app: Arc<dyn AsgiApplication>, path: impl Into<String>) -> Self {
        Self::with_scope(app, Scope::websocket(path))
    }

    /// Spawn `app` against a caller-provided scope.
    pub fn with_scope(app: Arc<dyn AsgiApplication>, scope: Scope) -> Self {
        Self {
            inner: ApplicationCommunicator::new(app, scope),
        }
    }

    /// Open the handshake. Returns `(accepted, subprotocol)`.
    pub async fn connect(&mut self, timeout: Duration) -> ConsumerResult<(bool, Option<String>)> {
        self.inner.send_input(ClientEvent::Connect).await?;
        match self.inner.receive_output(timeout).await? {
            ServerEvent::Accept { subprotocol } => Ok((true, subprotocol)),
            ServerEvent::Close { .. } => Ok((false, None)),
            ServerEvent::Send { .. } => Err(ConsumerError::Transport(
                "application sent a frame before accepting".to_string(),
            )),
        }
    }

    /// Send a text frame to the application.
    pub async fn send_text_to(&self, text: impl Into<String>) -> ConsumerResult<()> {
        self.inner.send_input(ClientEvent::text(text)).await
    }

    /// Send a binary frame to the application.
    pub async fn send_bytes_to(&self, bytes: Vec<u8>) -> ConsumerResult<()> {
        self.inner.send_input(ClientEvent::bytes(bytes)).await
    }

    /// Send a JSON-encoded text frame to the application.
    pub async fn send_json_to(&self, content: &Value) -> ConsumerResult<()> {
        let text = serde_json::to_string(content)
            .map_err(|e| ConsumerError::Encoding(format!("json encode: {e}")))?;
        self.send_text_to(text).await
    }

    /// The next outbound frame, as text. Fails on a binary frame.
    pub async fn receive_text_from(&mut self, timeout: Duration) -> ConsumerResult<String> {
        match self.inner.receive_output(timeout).await? {
            ServerEvent::Send {
                text: Some(text), ..
            } => Ok(text),
            other => Err(ConsumerError::Transport(format!(
                "expected a text frame, got {other:?}"
            ))),
        }
    }

    /// The next outbound frame, as bytes. Fails on a text frame.
    pub async fn receive_bytes_from(&mut self, timeout: Duration) -> ConsumerResult<Vec<u8>> {
        match self.inner.receive_output(timeout).await? {
            ServerEvent::Send {
                bytes: Some(bytes), ..
            } => Ok(bytes),
            other => Err(ConsumerError::Transport(format!(
                "expected a binary frame, got {other:?}"
            ))),
        }
    }

    /// The next outbound text frame, decoded as JSON.
    pub async fn receive_json_from(&mut self, timeout: Duration) -> ConsumerResult<Value> {
        let text = self.receive_text_from(timeout).await?;
        serde_json::from_str(&text).map_err(|e| ConsumerError::Encoding(format!("json decode: {e}")))
    }

    /// The next outbound event of any kind.
    pub async fn receive_output(&mut self, timeout: Duration) -> ConsumerResult<ServerEvent> {
        self.inner.receive_output(timeout).await
    }

    /// Whether the application stays silent for `timeout`.
    pub async fn receive_nothing(&mut self, timeout: Duration) -> bool {
        self.inner.receive_nothing(timeout).await
    }

    /// Close the connection from the client end and await termination.
    pub async fn disconnect(&mut self, code: u16, timeout: Duration) -> ConsumerResult<()> {
        self.inner
            .send_input(ClientEvent::Disconnect { code })
            .await?;
        self.inner.wait(timeout).await
    }

    /// Await the application's termination without a disconnect event.
    pub async fn wait(&mut self, timeout: Duration) -> ConsumerResult<()> {
        self.inner.wait(timeout).await
    }

    /// Abort the application task.
    pub fn stop(&mut self) {
        self.inner.stop();
    }
}
