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

//! The application boundary

use async_trait::async_trait;

use crate::error::ConsumerResult;
use crate::events::{EventSink, EventStream};
use crate::scope::Scope;

/// An application the framework can invoke per connection.
///
/// The framework calls [`call`](Self::call) once per accepted connection,
/// passing the connection's scope and the receive/send callable pair. The
/// call resolves when the connection is finished; an error return is a
/// connection abort.
#[async_trait]
pub trait AsgiApplication: Send + Sync {
    /// Handle one connection from start to finish.
    async fn call(
        &self,
        scope: Scope,
        receive: EventStream,
        send: EventSink,
    ) -> ConsumerResult<()>;
}
