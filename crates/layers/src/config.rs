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

//! Shared layer configuration
//!
//! ## Purpose
//! Every layer carries the same tuning knobs: message TTL, group membership
//! TTL, the default per-channel inbox bound, and an ordered list of
//! glob-pattern capacity overrides. The globs are compiled to anchored
//! regexes once, at construction; lookups scan the list in order and the
//! first matching pattern wins.

use regex::Regex;

/// Per-channel capacity overrides, compiled from glob patterns.
#[derive(Clone, Debug, Default)]
pub struct CapacityOverrides {
    compiled: Vec<(Regex, usize)>,
}

impl CapacityOverrides {
    /// Compile an ordered `(glob, capacity)` list.
    ///
    /// Globs support `*` (any run of characters) and `?` (any single
    /// character); everything else matches literally.
    pub fn compile(patterns: &[(String, usize)]) -> Self {
        let compiled = patterns
            .iter()
            .map(|(pattern, capacity)| {
                let regex = Regex::new(&glob_to_regex(pattern)).expect("translated glob regex");
                (regex, *capacity)
            })
            .collect();
        Self { compiled }
    }

    /// The capacity for `channel`: the first matching override, or `default`.
    pub fn capacity_for(&self, channel: &str, default: usize) -> usize {
        for (pattern, capacity) in &self.compiled {
            if pattern.is_match(channel) {
                return *capacity;
            }
        }
        default
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() + 8);
    out.push('^');
    for ch in glob.chars() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            c => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');
    out
}

/// Configuration shared by every channel layer.
///
/// ## Invariants
/// - `capacity` is a hard upper bound on any inbox; no layer buffers beyond
///   the configured bound anywhere in its data path.
/// - Messages older than `expiry` seconds are never delivered.
/// - Group memberships older than `group_expiry` seconds are reaped.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    /// Message TTL in seconds.
    pub expiry: u64,
    /// Group membership TTL in seconds.
    pub group_expiry: u64,
    /// Default per-channel inbox bound.
    pub capacity: usize,
    /// Ordered glob-pattern capacity overrides; first match wins.
    pub channel_capacity: CapacityOverrides,
}

impl LayerConfig {
    /// Build a config from the raw knobs, compiling the capacity globs.
    pub fn new(
        expiry: u64,
        group_expiry: u64,
        capacity: usize,
        channel_capacity: &[(String, usize)],
    ) -> Self {
        Self {
            expiry,
            group_expiry,
            capacity,
            channel_capacity: CapacityOverrides::compile(channel_capacity),
        }
    }

    /// The inbox bound for `channel`.
    pub fn capacity_for(&self, channel: &str) -> usize {
        self.channel_capacity.capacity_for(channel, self.capacity)
    }
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            expiry: 60,
            group_expiry: 86_400,
            capacity: 100,
            channel_capacity: CapacityOverrides::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity_without_overrides() {
        let config = LayerConfig::default();
        assert_eq!(config.capacity_for("anything"), 100);
    }

    #[test]
    fn test_first_matching_override_wins() {
        let config = LayerConfig::new(
            60,
            86_400,
            100,
            &[
                ("http.request*".to_string(), 200),
                ("http.*".to_string(), 10),
            ],
        );
        assert_eq!(config.capacity_for("http.request.body"), 200);
        assert_eq!(config.capacity_for("http.disconnect"), 10);
        assert_eq!(config.capacity_for("websocket.send"), 100);
    }

    #[test]
    fn test_glob_question_mark_and_literals() {
        let overrides = CapacityOverrides::compile(&[("room-?".to_string(), 5)]);
        assert_eq!(overrides.capacity_for("room-1", 100), 5);
        assert_eq!(overrides.capacity_for("room-12", 100), 100);
        // Dots in the glob are literal, not regex wildcards.
        let overrides = CapacityOverrides::compile(&[("a.b".to_string(), 5)]);
        assert_eq!(overrides.capacity_for("axb", 100), 100);
        assert_eq!(overrides.capacity_for("a.b", 100), 5);
    }
}
