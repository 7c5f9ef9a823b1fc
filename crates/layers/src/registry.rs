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

//! Process-wide channel layer registry
//!
//! ## Purpose
//! Maps an alias string to a layer instance so consumers can reference
//! layers by name and tests can swap instances at setup. Register layers at
//! application startup; mutation after startup is supported but discouraged.
//!
//! ## Examples
//! ```rust
//! use std::sync::Arc;
//! use crosstalk_layers::{register_channel_layer, get_channel_layer, InMemoryChannelLayer};
//!
//! register_channel_layer("default", Arc::new(InMemoryChannelLayer::default()));
//! assert!(get_channel_layer("default").is_some());
//! ```

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use crate::error::{LayerError, LayerResult};
use crate::layer::ChannelLayer;

/// Registry mapping alias strings to channel layer instances.
#[derive(Default)]
pub struct ChannelLayerRegistry {
    layers: RwLock<HashMap<String, Arc<dyn ChannelLayer>>>,
}

impl ChannelLayerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<dyn ChannelLayer>>> {
        self.layers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<dyn ChannelLayer>>> {
        self.layers.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `layer` under `alias`. Double-register replaces.
    pub fn register(&self, alias: impl Into<String>, layer: Arc<dyn ChannelLayer>) {
        self.write().insert(alias.into(), layer);
    }

    /// Remove the layer registered under `alias`, if any.
    pub fn unregister(&self, alias: &str) {
        self.write().remove(alias);
    }

    /// Look up a layer by alias.
    pub fn get(&self, alias: &str) -> Option<Arc<dyn ChannelLayer>> {
        self.read().get(alias).cloned()
    }

    /// Look up a layer by alias, failing with
    /// [`LayerError::NoSuchLayer`] when absent.
    pub fn require(&self, alias: &str) -> LayerResult<Arc<dyn ChannelLayer>> {
        self.get(alias)
            .ok_or_else(|| LayerError::NoSuchLayer(alias.to_string()))
    }

    /// Whether a layer is registered under `alias`.
    pub fn contains(&self, alias: &str) -> bool {
        self.read().contains_key(alias)
    }

    /// All registered aliases.
    pub fn aliases(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Number of registered layers.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Remove every registered layer.
    pub fn clear(&self) {
        self.write().clear();
    }
}

static CHANNEL_LAYERS: Lazy<ChannelLayerRegistry> = Lazy::new(ChannelLayerRegistry::new);

/// The process-wide registry instance.
pub fn channel_layers() -> &'static ChannelLayerRegistry {
    &CHANNEL_LAYERS
}

/// Register a layer instance under `alias` in the process-wide registry.
pub fn register_channel_layer(alias: impl Into<String>, layer: Arc<dyn ChannelLayer>) {
    channel_layers().register(alias, layer);
}

/// Look up a layer by alias in the process-wide registry.
pub fn get_channel_layer(alias: &str) -> Option<Arc<dyn ChannelLayer>> {
    channel_layers().get(alias)
}

/// Look up a layer by alias, failing with [`LayerError::NoSuchLayer`] when
/// absent.
pub fn require_channel_layer(alias: &str) -> LayerResult<Arc<dyn ChannelLayer>> {
    channel_layers().require(alias)
}

/// Remove the layer registered under `alias` from the process-wide registry.
pub fn unregister_channel_layer(alias: &str) {
    channel_layers().unregister(alias);
}

/// Whether a layer is registered under `alias` in the process-wide registry.
pub fn contains_channel_layer(alias: &str) -> bool {
    channel_layers().contains(alias)
}

/// All aliases registered in the process-wide registry.
pub fn list_channel_layers() -> Vec<String> {
    channel_layers().aliases()
}

/// Clear the process-wide registry. Testing only.
pub fn clear_channel_layers() {
    channel_layers().clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::InMemoryChannelLayer;

    #[test]
    fn test_register_get_unregister() {
        let registry = ChannelLayerRegistry::new();
        assert!(registry.is_empty());

        registry.register("default", Arc::new(InMemoryChannelLayer::default()));
        assert!(registry.contains("default"));
        assert!(registry.get("default").is_some());
        assert_eq!(registry.len(), 1);

        registry.unregister("default");
        assert!(!registry.contains("default"));
        assert!(registry.get("default").is_none());
    }

    #[test]
    fn test_require_missing_alias_fails() {
        let registry = ChannelLayerRegistry::new();
        match registry.require("nope") {
            Err(err) => assert!(matches!(err, LayerError::NoSuchLayer(alias) if alias == "nope")),
            Ok(_) => panic!("expected missing alias lookup to fail"),
        }
    }

    #[test]
    fn test_double_register_replaces() {
        let registry = ChannelLayerRegistry::new();
        let first: Arc<dyn ChannelLayer> = Arc::new(InMemoryChannelLayer::default());
        let second: Arc<dyn ChannelLayer> = Arc::new(InMemoryChannelLayer::default());
        registry.register("layer", first.clone());
        registry.register("layer", second.clone());
        assert_eq!(registry.len(), 1);
        let resolved = registry.get("layer").expect("registered");
        assert!(!Arc::ptr_eq(&resolved, &first));
        assert!(Arc::ptr_eq(&resolved, &second));
    }

    #[test]
    fn test_aliases_listing_and_clear() {
        let registry = ChannelLayerRegistry::new();
        registry.register("a", Arc::new(InMemoryChannelLayer::default()));
        registry.register("b", Arc::new(InMemoryChannelLayer::default()));
        let mut aliases = registry.aliases();
        aliases.sort();
        assert_eq!(aliases, vec!["a".to_string(), "b".to_string()]);
        registry.clear();
        assert!(registry.is_empty());
    }
}
