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

//! # Crosstalk Consumer
//!
//! ## Purpose
//! The consumer runtime: turns a persistent client connection into an
//! event-driven handler with a well-defined lifecycle, wired to a channel
//! layer for cross-process messaging.
//!
//! ## Key Components
//! - [`WebsocketConsumer`] / [`WebsocketApp`]: the WebSocket lifecycle
//!   (connect/receive/disconnect) plus routed channel-layer messages
//! - [`JsonWebsocketConsumer`] / [`JsonWebsocketApp`]: JSON-frame variant
//! - [`MessageRouter`]: eager dotted-type → handler table
//! - [`AsgiApplication`] / [`Scope`] / [`ClientEvent`] / [`ServerEvent`]:
//!   the framework boundary
//! - [`Middleware`]: scope-transforming wrapper seam
//! - [`testing`]: communicators for driving applications from tests
//!
//! ## Examples
//! ```rust
//! use crosstalk_consumer::{
//!     ConsumerResult, WebsocketApp, WebsocketConsumer, WebsocketContext,
//! };
//! use async_trait::async_trait;
//!
//! #[derive(Default)]
//! struct EchoConsumer;
//!
//! #[async_trait]
//! impl WebsocketConsumer for EchoConsumer {
//!     async fn receive(
//!         &mut self,
//!         ctx: &mut WebsocketContext,
//!         text: Option<String>,
//!         _bytes: Option<Vec<u8>>,
//!     ) -> ConsumerResult<()> {
//!         if let Some(text) = text {
//!             ctx.send_text(format!("echo: {text}")).await?;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let app = WebsocketApp::<EchoConsumer>::new();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod application;
mod error;
mod events;
mod json;
mod middleware;
mod router;
mod scope;
pub mod testing;
mod websocket;

pub use application::AsgiApplication;
pub use error::{ConsumerError, ConsumerResult};
pub use events::{ClientEvent, EventSink, EventStream, ServerEvent, DEFAULT_CLOSE_CODE};
pub use json::{JsonAdapter, JsonWebsocketApp, JsonWebsocketConsumer};
pub use middleware::{Middleware, MiddlewareApp};
pub use router::{require_valid_type_name, valid_type_name, HandlerFuture, MessageRouter};
pub use scope::{Scope, ScopeKind};
pub use websocket::{WebsocketApp, WebsocketConsumer, WebsocketContext};
