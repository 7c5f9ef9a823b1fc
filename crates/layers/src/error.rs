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

//! Error types shared by every channel layer

use thiserror::Error;

/// Errors that can occur during channel layer operations
#[derive(Error, Debug)]
pub enum LayerError {
    /// Channel name failed validation
    #[error(
        "Channel name {0:?} is invalid: names must be shorter than 100 characters \
         and contain only ASCII alphanumerics, hyphens, underscores, or periods, \
         with at most one '!' separator"
    )]
    InvalidChannelName(String),

    /// Group name failed validation
    #[error(
        "Group name {0:?} is invalid: names must be shorter than 100 characters \
         and contain only ASCII alphanumerics, hyphens, underscores, or periods"
    )]
    InvalidGroupName(String),

    /// Per-channel inbox is at capacity
    #[error("Channel full: {0}")]
    ChannelFull(String),

    /// Registry lookup miss
    #[error("No channel layer registered under alias: {0}")]
    NoSuchLayer(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Message could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Transport failure surfaced after the retry budget was exhausted
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type for channel layer operations
pub type LayerResult<T> = Result<T, LayerError>;
