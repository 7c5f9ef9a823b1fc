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

//! The channel layer contract

use async_trait::async_trait;

use crate::error::LayerResult;
use crate::message::Message;

/// Core trait every channel layer implements.
///
/// ## Purpose
/// A layer is the bus: it stores per-channel inboxes and group membership,
/// and moves messages between channels — within one process for the
/// in-memory layer, across processes and hosts for the Redis layers.
///
/// ## Invariants
/// - A channel name identifies exactly one consumer's inbox for the duration
///   of its connection; names are unique per process at any instant.
/// - Inbox capacity is a hard bound; `send` to a saturated inbox fails with
///   [`LayerError::ChannelFull`](crate::LayerError::ChannelFull).
/// - `group_send` attempts delivery to every current member; per-member
///   failures are independent and never abort the fan-out.
/// - At most one receiver per channel at a time; concurrent receivers yield
///   undefined interleaving.
#[async_trait]
pub trait ChannelLayer: Send + Sync {
    /// Return a fresh, unused channel name owned by this layer.
    ///
    /// Pass `"specific"` as the prefix unless you have a reason not to.
    async fn new_channel(&self, prefix: &str) -> LayerResult<String>;

    /// Enqueue `message` for `channel`.
    ///
    /// Unknown channels are created lazily, so sending to a channel nobody
    /// is receiving on yet silently succeeds.
    async fn send(&self, channel: &str, message: Message) -> LayerResult<()>;

    /// Suspend until a non-expired message is available for `channel` and
    /// return exactly one.
    async fn receive(&self, channel: &str) -> LayerResult<Message>;

    /// Add `channel` to `group`. Idempotent; re-adding refreshes the
    /// membership timestamp.
    async fn group_add(&self, group: &str, channel: &str) -> LayerResult<()>;

    /// Remove `channel` from `group`. No-op if absent.
    async fn group_discard(&self, group: &str, channel: &str) -> LayerResult<()>;

    /// Fan `message` out to every current member of `group`.
    ///
    /// Per-recipient capacity failures are swallowed and logged, not raised.
    async fn group_send(&self, group: &str, message: Message) -> LayerResult<()>;

    /// Release everything held for `channel`: its inbox, group memberships,
    /// cached connections, and subscriptions.
    ///
    /// Called when the owning consumer terminates. Queued messages need no
    /// explicit cleanup beyond this; anything already on the wire ages out
    /// via expiry.
    async fn close_channel(&self, channel: &str) -> LayerResult<()>;

    /// Discard all state. Testing only.
    async fn flush(&self) -> LayerResult<()>;

    /// Release transport resources.
    async fn close(&self) -> LayerResult<()>;
}
