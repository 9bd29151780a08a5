// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Layered Properties
//!
//! Transport settings can come from several places. They are flattened into one
//! key-value map where the more specific source wins.
//!
//! ## Property Sources (Priority: Low to High)
//!
//! 1. **Default** - Built-in defaults
//! 2. **AddressBook** - Global address book (listening port, destinations)
//! 3. **LocalConfig** - The node's own JSON config
//! 4. **CommandLine** - Flags passed to the binary

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertySource {
    Default,
    AddressBook,
    LocalConfig,
    CommandLine,
}

impl PropertySource {
    /// Numeric priority for comparison (higher = more important)
    #[inline]
    pub const fn priority(&self) -> u8 {
        match self {
            PropertySource::Default => 0,
            PropertySource::AddressBook => 1,
            PropertySource::LocalConfig => 2,
            PropertySource::CommandLine => 3,
        }
    }

    #[inline]
    pub const fn description(&self) -> &'static str {
        match self {
            PropertySource::Default => "built-in default",
            PropertySource::AddressBook => "global address book",
            PropertySource::LocalConfig => "local node config",
            PropertySource::CommandLine => "command line",
        }
    }
}

/// Flat key-value configuration with source tracking
#[derive(Debug, Clone, Default)]
pub struct FlatConfig {
    properties: HashMap<String, String>,
    sources: HashMap<String, PropertySource>,
}

impl FlatConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a property unless a source of equal or higher priority already set it
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>, source: PropertySource) {
        let key = key.into();
        if let Some(existing) = self.sources.get(&key) {
            if existing.priority() >= source.priority() {
                return;
            }
        }
        self.properties.insert(key.clone(), value.into());
        self.sources.insert(key, source);
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<&String> {
        self.properties.get(key)
    }

    pub fn get_with_source(&self, key: &str) -> Option<(&String, PropertySource)> {
        self.properties
            .get(key)
            .and_then(|value| self.sources.get(key).map(|source| (value, *source)))
    }

    /// All resolved properties, as consumed by the `from_properties` constructors
    #[inline]
    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }

    /// Merge another configuration into this one (respects priorities)
    pub fn merge(&mut self, other: &FlatConfig) {
        for (key, value) in &other.properties {
            if let Some(source) = other.sources.get(key) {
                self.set(key.clone(), value.clone(), *source);
            }
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}
