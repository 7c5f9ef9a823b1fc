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

//! The message data model
//!
//! A layer message is a JSON-shaped map carrying at least a `type` entry
//! whose value is a dotted lowercase identifier (`chat.message`). The layers
//! are agnostic to every other key; consumers interpret them.

use crate::error::{LayerError, LayerResult};

/// A message moved through a channel layer.
pub type Message = serde_json::Value;

/// The dispatch type of a message, if present.
pub fn message_type(message: &Message) -> Option<&str> {
    message.get("type").and_then(Message::as_str)
}

/// The dispatch type of a message, failing when absent or non-string.
pub fn require_message_type(message: &Message) -> LayerResult<&str> {
    message_type(message).ok_or_else(|| {
        LayerError::Serialization("message has no string 'type' entry".to_string())
    })
}
