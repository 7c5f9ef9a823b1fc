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

//! Connection scope
//!
//! The framework-supplied metadata bag describing one connection: path,
//! query string, headers, negotiated subprotocols, and whatever middleware
//! attached on the way in. Middleware copies and extends the scope; the
//! consumer reads it.

use std::collections::HashMap;

/// The protocol a scope describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeKind {
    /// A long-lived WebSocket connection.
    WebSocket,
    /// A plain HTTP request/response exchange.
    Http,
}

/// Metadata describing one connection.
#[derive(Clone, Debug)]
pub struct Scope {
    /// Protocol of the connection.
    pub kind: ScopeKind,
    /// Request path, e.g. `/ws/chat/`.
    pub path: String,
    /// Parameters extracted from the path by the router, if any.
    pub path_params: HashMap<String, String>,
    /// Raw query string bytes (without the leading `?`).
    pub query_string: Vec<u8>,
    /// Header name/value byte pairs, in wire order.
    pub headers: Vec<(Vec<u8>, Vec<u8>)>,
    /// Subprotocols offered by the client, in preference order.
    pub subprotocols: Vec<String>,
    /// Parsed cookies, when middleware provided them.
    pub cookies: HashMap<String, String>,
    /// Authenticated user identity, when middleware provided one.
    pub user: Option<String>,
}

impl Scope {
    /// A minimal WebSocket scope for `path`.
    pub fn websocket(path: impl Into<String>) -> Self {
        Self {
            kind: ScopeKind::WebSocket,
            path: path.into(),
            path_params: HashMap::new(),
            query_string: Vec::new(),
            headers: Vec::new(),
            subprotocols: Vec::new(),
            cookies: HashMap::new(),
            user: None,
        }
    }

    /// A minimal HTTP scope for `path`.
    pub fn http(path: impl Into<String>) -> Self {
        Self {
            kind: ScopeKind::Http,
            ..Self::websocket(path)
        }
    }

    /// Offer `subprotocols` on this scope.
    pub fn with_subprotocols(mut self, subprotocols: Vec<String>) -> Self {
        self.subprotocols = subprotocols;
        self
    }
}
