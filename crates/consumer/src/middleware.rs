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

//! Middleware seam
//!
//! A middleware wraps an inner application and transforms the scope on the
//! way in — attaching users, cookies, or anything else downstream consumers
//! read. Middleware must not keep per-connection state on itself; one
//! instance serves every connection. The scope is the place for state.

use std::sync::Arc;

use async_trait::async_trait;

use crate::application::AsgiApplication;
use crate::error::ConsumerResult;
use crate::events::{EventSink, EventStream};
use crate::scope::Scope;

/// A scope transformation applied before the inner application runs.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    /// Inspect and rewrite the scope. Errors abort the connection.
    async fn transform_scope(&self, scope: Scope) -> ConsumerResult<Scope> {
        Ok(scope)
    }
}

/// An application wrapping `inner` with a [`Middleware`].
pub struct MiddlewareApp<M: Middleware> {
    middleware: M,
    inner: Arc<dyn AsgiApplication>,
}

impl<M: Middleware> MiddlewareApp<M> {
    /// Wrap `inner` with `middleware`.
    pub fn new(middleware: M, inner: Arc<dyn AsgiApplication>) -> Self {
        Self { middleware, inner }
    }
}

#[async_trait]
impl<M: Middleware> AsgiApplication for MiddlewareApp<M> {
    async fn call(
        &self,
        scope: Scope,
        receive: EventStream,
        send: EventSink,
    ) -> ConsumerResult<()> {
        let scope = self.middleware.transform_scope(scope).await?;
        self.inner.call(scope, receive, send).await
    }
}
