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

//! Consumer error taxonomy
//!
//! Three of these variants are control-flow signals rather than failures:
//! [`StopConsumer`](ConsumerError::StopConsumer) ends the dispatch loop
//! cleanly, and [`AcceptConnection`](ConsumerError::AcceptConnection) /
//! [`DenyConnection`](ConsumerError::DenyConnection) raised from a `connect`
//! handler resolve the handshake. The runtime intercepts them; everything
//! else propagates to the framework as a connection abort.

use thiserror::Error;

use crosstalk_layers::LayerError;

/// Errors and control-flow signals raised by consumers and their runtime.
#[derive(Error, Debug)]
pub enum ConsumerError {
    /// Terminate the dispatch loop cleanly.
    #[error("consumer stopped")]
    StopConsumer,

    /// Accept the pending connection (raised from `connect`).
    #[error("connection accepted")]
    AcceptConnection,

    /// Deny the pending connection (raised from `connect`).
    #[error("connection denied")]
    DenyConnection,

    /// An inbound message type has no registered handler.
    #[error("no handler for message type: {0}")]
    NoHandler(String),

    /// An inbound message type failed validation.
    #[error("malformed message type: {0:?}")]
    BadType(String),

    /// The consumer needs a channel layer that is not configured.
    #[error("a channel layer is required: {0}")]
    LayerRequired(String),

    /// A frame could not be encoded or decoded.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// A channel layer operation failed.
    #[error(transparent)]
    Layer(#[from] LayerError),

    /// The upstream transport went away or misbehaved.
    #[error("transport error: {0}")]
    Transport(String),

    /// A bounded wait elapsed.
    #[error("timed out: {0}")]
    Timeout(String),
}

impl ConsumerError {
    /// Whether this is one of the control-flow signals the runtime handles
    /// rather than a failure.
    pub fn is_control_flow(&self) -> bool {
        matches!(
            self,
            ConsumerError::StopConsumer
                | ConsumerError::AcceptConnection
                | ConsumerError::DenyConnection
        )
    }
}

/// Result type for consumer operations.
pub type ConsumerResult<T> = Result<T, ConsumerError>;
