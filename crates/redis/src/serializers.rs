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

//! Message wire formats
//!
//! ## Purpose
//! Turns layer messages into the byte strings that travel through Redis and
//! back. Two formats are registered out of the box: `msgpack` (the default)
//! and `json`. Both support the same envelope: an optional Fernet encryption
//! pass (the key list is the rotation order — the first key encrypts, any
//! key may decrypt) and an optional random prefix of raw entropy bytes.
//!
//! Encryption keys are derived from the configured secrets as
//! `urlsafe_base64(sha256(secret))`, so any string works as a key. When the
//! layer has a message TTL, decryption rejects tokens older than
//! `expiry + 10` seconds.

use std::collections::HashMap;
use std::sync::RwLock;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use fernet::Fernet;
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crosstalk_layers::{LayerError, LayerResult, Message};

/// Encodes and decodes messages for the Redis transports.
pub trait MessageSerializer: Send + Sync {
    /// Serialize a message to its wire bytes.
    fn serialize(&self, message: &Message) -> LayerResult<Vec<u8>>;
    /// Deserialize wire bytes back into a message.
    fn deserialize(&self, payload: &[u8]) -> LayerResult<Message>;
}

/// Options shared by every serializer format.
#[derive(Clone, Debug, Default)]
pub struct SerializerOptions {
    /// Symmetric encryption secrets; first entry encrypts, all may decrypt.
    pub symmetric_encryption_keys: Option<Vec<String>>,
    /// Number of random bytes prepended to each payload.
    pub random_prefix_length: usize,
    /// Message TTL used to bound decryption, in seconds.
    pub expiry: Option<u64>,
}

/// The base binary encoding of a payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireFormat {
    /// MessagePack binary encoding (the default).
    MsgPack,
    /// UTF-8 JSON encoding.
    Json,
}

/// Serializer applying a [`WireFormat`] plus the optional encryption and
/// random-prefix envelope.
pub struct EnvelopeSerializer {
    format: WireFormat,
    fernets: Vec<Fernet>,
    random_prefix_length: usize,
    expiry: Option<u64>,
}

impl EnvelopeSerializer {
    /// Build a serializer for `format` with the given envelope options.
    pub fn new(format: WireFormat, options: &SerializerOptions) -> LayerResult<Self> {
        let fernets = match &options.symmetric_encryption_keys {
            Some(keys) if !keys.is_empty() => keys
                .iter()
                .map(|key| make_fernet(key))
                .collect::<LayerResult<Vec<_>>>()?,
            _ => Vec::new(),
        };
        Ok(Self {
            format,
            fernets,
            random_prefix_length: options.random_prefix_length,
            expiry: options.expiry,
        })
    }

    fn encode_body(&self, message: &Message) -> LayerResult<Vec<u8>> {
        match self.format {
            WireFormat::MsgPack => rmp_serde::to_vec(message)
                .map_err(|e| LayerError::Serialization(format!("msgpack encode: {e}"))),
            WireFormat::Json => serde_json::to_vec(message)
                .map_err(|e| LayerError::Serialization(format!("json encode: {e}"))),
        }
    }

    fn decode_body(&self, body: &[u8]) -> LayerResult<Message> {
        match self.format {
            WireFormat::MsgPack => rmp_serde::from_slice(body)
                .map_err(|e| LayerError::Serialization(format!("msgpack decode: {e}"))),
            WireFormat::Json => serde_json::from_slice(body)
                .map_err(|e| LayerError::Serialization(format!("json decode: {e}"))),
        }
    }

    fn decrypt(&self, token: &str) -> LayerResult<Vec<u8>> {
        for fernet in &self.fernets {
            let decrypted = match self.expiry {
                Some(expiry) => fernet.decrypt_with_ttl(token, expiry + 10),
                None => fernet.decrypt(token),
            };
            if let Ok(data) = decrypted {
                return Ok(data);
            }
        }
        Err(LayerError::Serialization(
            "payload did not decrypt under any configured key".to_string(),
        ))
    }
}

impl MessageSerializer for EnvelopeSerializer {
    fn serialize(&self, message: &Message) -> LayerResult<Vec<u8>> {
        let mut data = self.encode_body(message)?;
        if let Some(fernet) = self.fernets.first() {
            data = fernet.encrypt(&data).into_bytes();
        }
        if self.random_prefix_length > 0 {
            let mut framed = vec![0u8; self.random_prefix_length];
            OsRng.fill_bytes(&mut framed);
            framed.extend_from_slice(&data);
            data = framed;
        }
        Ok(data)
    }

    fn deserialize(&self, payload: &[u8]) -> LayerResult<Message> {
        if payload.len() < self.random_prefix_length {
            return Err(LayerError::Serialization(
                "payload shorter than its random prefix".to_string(),
            ));
        }
        let body = &payload[self.random_prefix_length..];
        if self.fernets.is_empty() {
            return self.decode_body(body);
        }
        let token = std::str::from_utf8(body)
            .map_err(|_| LayerError::Serialization("encrypted payload is not a token".to_string()))?;
        let decrypted = self.decrypt(token)?;
        self.decode_body(&decrypted)
    }
}

/// Derive a Fernet instance from an arbitrary secret string.
fn make_fernet(key: &str) -> LayerResult<Fernet> {
    let digest = Sha256::digest(key.as_bytes());
    let encoded = URL_SAFE.encode(digest);
    Fernet::new(&encoded)
        .ok_or_else(|| LayerError::Configuration("could not derive encryption key".to_string()))
}

type SerializerFactory = fn(&SerializerOptions) -> LayerResult<Box<dyn MessageSerializer>>;

fn msgpack_factory(options: &SerializerOptions) -> LayerResult<Box<dyn MessageSerializer>> {
    Ok(Box::new(EnvelopeSerializer::new(WireFormat::MsgPack, options)?))
}

fn json_factory(options: &SerializerOptions) -> LayerResult<Box<dyn MessageSerializer>> {
    Ok(Box::new(EnvelopeSerializer::new(WireFormat::Json, options)?))
}

static FORMATS: Lazy<RwLock<HashMap<String, SerializerFactory>>> = Lazy::new(|| {
    let mut formats: HashMap<String, SerializerFactory> = HashMap::new();
    formats.insert("msgpack".to_string(), msgpack_factory);
    formats.insert("json".to_string(), json_factory);
    RwLock::new(formats)
});

/// Register a serializer format under `name`, replacing any existing one.
pub fn register_serializer(name: impl Into<String>, factory: SerializerFactory) {
    FORMATS
        .write()
        .unwrap_or_else(|e| e.into_inner())
        .insert(name.into(), factory);
}

/// Build a serializer for the named format.
pub fn get_serializer(
    format: &str,
    options: &SerializerOptions,
) -> LayerResult<Box<dyn MessageSerializer>> {
    let factory = {
        let formats = FORMATS.read().unwrap_or_else(|e| e.into_inner());
        formats.get(format).copied()
    };
    match factory {
        Some(factory) => factory(options),
        None => Err(LayerError::Configuration(format!(
            "unknown serializer format: {format}"
        ))),
    }
}
