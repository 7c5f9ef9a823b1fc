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

//! Shared helpers for the Redis layers

use std::time::{SystemTime, UNIX_EPOCH};

use crc::{Crc, CRC_32_ISO_HDLC};
use redis::{ErrorKind, RedisError};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Ring size of the hash space channels and groups are placed in.
const HASH_RING: u32 = 4096;

/// Map a channel or group name onto one of `ring_size` shards.
///
/// The hash is CRC-32 (ISO-HDLC, the zlib polynomial) reduced modulo 4096 and
/// scaled to the ring. It is deterministic and identical across processes and
/// implementations, so any producer configured with the same hosts list
/// computes the same shard for a given name.
pub fn consistent_hash(value: &str, ring_size: usize) -> usize {
    if ring_size == 1 {
        // Avoid the hashing overhead when there is nothing to choose.
        return 0;
    }
    let bigval = (CRC32.checksum(value.as_bytes()) % HASH_RING) as f64;
    let ring_divisor = f64::from(HASH_RING) / ring_size as f64;
    (bigval / ring_divisor) as usize
}

/// Whether a Redis error indicates a failover in progress: the node answered
/// as a read-only replica, or the connection itself went away. These trigger
/// master re-resolution and a retry rather than surfacing to the caller.
pub(crate) fn is_failover_error(err: &RedisError) -> bool {
    err.kind() == ErrorKind::ReadOnly
        || err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_io_error()
        || err.is_timeout()
}

/// Seconds since the Unix epoch, as a float score.
pub(crate) fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// The Redis key (and pub/sub channel string) for a logical channel.
pub(crate) fn channel_key(prefix: &str, channel: &str) -> String {
    format!("{prefix}:channel:{channel}")
}

/// The Redis key (and pub/sub channel string) for a group.
pub(crate) fn group_key(prefix: &str, group: &str) -> String {
    format!("{prefix}:group:{group}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consistent_hash_golden_values() {
        // Pinned values; changing the hash breaks cross-process routing.
        for (value, ring_size, expected) in [
            ("key_one", 1, 0),
            ("key_two", 1, 0),
            ("key_one", 2, 1),
            ("key_two", 2, 0),
            ("key_one", 10, 6),
            ("key_two", 10, 4),
        ] {
            assert_eq!(consistent_hash(value, ring_size), expected, "{value}/{ring_size}");
        }
    }

    #[test]
    fn test_consistent_hash_in_ring_bounds() {
        for ring_size in 1..16 {
            for value in ["a", "specific.abc!", "group-name", "x.y.z"] {
                assert!(consistent_hash(value, ring_size) < ring_size);
            }
        }
    }

    #[test]
    fn test_key_formats() {
        assert_eq!(channel_key("asgi", "specific.ab!cd"), "asgi:channel:specific.ab!cd");
        assert_eq!(group_key("asgi", "room"), "asgi:group:room");
    }
}
