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

//! Channel and group name rules
//!
//! ## Purpose
//! Validation and generation of the string handles the layers route by.
//! A channel name has the shape `<prefix>.<non-local>!<local>`: the part up
//! to and including `!` selects the shard, the rest is local to one consumer.
//! Group names use the same alphabet but never contain `!`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use rand::RngCore;
use regex::Regex;

use crate::error::{LayerError, LayerResult};

/// Names must be strictly shorter than this.
pub const MAX_NAME_LENGTH: usize = 100;

static CHANNEL_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z\d\-_.]+(?:!([a-zA-Z\d\-_.]*))?$").expect("channel name regex")
});

static GROUP_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z\d\-_.]+$").expect("group name regex"));

/// Whether `name` is a well-formed channel name.
///
/// With `require_client_prefix` set, the name must contain the `!` separator,
/// i.e. it must be a process-specific channel rather than a plain one.
pub fn valid_channel_name(name: &str, require_client_prefix: bool) -> bool {
    if name.is_empty() || name.len() >= MAX_NAME_LENGTH {
        return false;
    }
    if !CHANNEL_NAME_RE.is_match(name) {
        return false;
    }
    if require_client_prefix && !name.contains('!') {
        return false;
    }
    true
}

/// Whether `name` is a well-formed group name.
pub fn valid_group_name(name: &str) -> bool {
    !name.is_empty() && name.len() < MAX_NAME_LENGTH && GROUP_NAME_RE.is_match(name)
}

/// Validate a channel name, failing with [`LayerError::InvalidChannelName`].
pub fn require_valid_channel_name(name: &str, require_client_prefix: bool) -> LayerResult<()> {
    if valid_channel_name(name, require_client_prefix) {
        Ok(())
    } else {
        Err(LayerError::InvalidChannelName(name.to_string()))
    }
}

/// Validate a group name, failing with [`LayerError::InvalidGroupName`].
pub fn require_valid_group_name(name: &str) -> LayerResult<()> {
    if valid_group_name(name) {
        Ok(())
    } else {
        Err(LayerError::InvalidGroupName(name.to_string()))
    }
}

/// The "non-local" part of a channel name.
///
/// For a process-specific channel (contains `!`) this is the part up to and
/// including the `!`; for anything else it is the full name. Shard selection
/// hashes this value, so every copy of the name routes identically.
pub fn non_local_name(name: &str) -> &str {
    match name.find('!') {
        Some(idx) => &name[..=idx],
        None => name,
    }
}

/// A random URL-safe-base64 component of `len` characters drawn from the OS
/// entropy source.
pub fn random_component(len: usize) -> String {
    // 3 bytes of entropy encode to 4 base64 characters; round up then trim.
    let mut bytes = vec![0u8; (len * 3).div_ceil(4) + 1];
    OsRng.fill_bytes(&mut bytes);
    let mut encoded = URL_SAFE_NO_PAD.encode(&bytes);
    encoded.truncate(len);
    encoded
}

/// Build a fresh process-unique channel name under `prefix`.
///
/// The non-local component is random, so channels created by one process
/// spread uniformly across shards.
pub fn new_channel_name(prefix: &str) -> String {
    format!("{}.{}!{}", prefix, random_component(12), random_component(12))
}
