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

//! Redis host descriptors
//!
//! A layer is configured with a list of hosts; each entry is either a plain
//! connection URL or a Sentinel block naming the monitored service. The
//! position of a host in the list is its shard index, so every process must
//! be configured with the same list in the same order.

/// One Redis shard: a direct URL or a Sentinel-monitored service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RedisHost {
    /// Direct connection URL, e.g. `redis://localhost:6379/0`.
    Url(String),
    /// Sentinel-monitored master, resolved at connect time.
    Sentinel {
        /// Service name the sentinels monitor.
        master_name: String,
        /// `(host, port)` pairs of the sentinel processes, tried in order.
        sentinels: Vec<(String, u16)>,
        /// Database index on the resolved master.
        db: i64,
        /// Password for the resolved master, if any.
        password: Option<String>,
    },
}

impl RedisHost {
    /// A direct-URL host.
    pub fn url(url: impl Into<String>) -> Self {
        RedisHost::Url(url.into())
    }

    /// A Sentinel host with database 0 and no password.
    pub fn sentinel(master_name: impl Into<String>, sentinels: Vec<(String, u16)>) -> Self {
        RedisHost::Sentinel {
            master_name: master_name.into(),
            sentinels,
            db: 0,
            password: None,
        }
    }
}

impl From<&str> for RedisHost {
    fn from(url: &str) -> Self {
        RedisHost::Url(url.to_string())
    }
}

impl From<String> for RedisHost {
    fn from(url: String) -> Self {
        RedisHost::Url(url)
    }
}

/// Normalize a configured host list, defaulting to a single local instance.
pub fn decode_hosts(hosts: &[RedisHost]) -> Vec<RedisHost> {
    if hosts.is_empty() {
        vec![RedisHost::url("redis://localhost:6379")]
    } else {
        hosts.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_hosts_default_to_localhost() {
        let hosts = decode_hosts(&[]);
        assert_eq!(hosts, vec![RedisHost::url("redis://localhost:6379")]);
    }

    #[test]
    fn test_configured_hosts_preserve_order() {
        let hosts = decode_hosts(&[
            RedisHost::url("redis://a:6379"),
            RedisHost::url("redis://b:6379"),
        ]);
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[0], RedisHost::url("redis://a:6379"));
    }

    #[test]
    fn test_from_str() {
        let host: RedisHost = "redis://localhost:6380".into();
        assert_eq!(host, RedisHost::url("redis://localhost:6380"));
    }
}
