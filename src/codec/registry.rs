//! Explicit protocol table.
//!
//! Links never guess a protocol; the caller hands over a registry
//! and names the entry to use.

use std::collections::HashMap;
use std::sync::Arc;

use super::{AlpProtocol, Protocol};
use crate::error::{LinkError, Result};

/// Name of the protocol picked when none is configured.
pub const DEFAULT_PROTOCOL: &str = AlpProtocol::NAME;

/// Table mapping protocol names to implementations.
#[derive(Clone)]
pub struct ProtocolRegistry {
    protocols: HashMap<String, Arc<dyn Protocol>>,
}

impl ProtocolRegistry {
    /// Create an empty registry.
    pub fn empty() -> Self {
        Self {
            protocols: HashMap::new(),
        }
    }

    /// Add a protocol under its own name, replacing any previous entry.
    pub fn register(&mut self, protocol: Arc<dyn Protocol>) {
        self.protocols.insert(protocol.name().to_string(), protocol);
    }

    /// Look up a protocol by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Protocol>> {
        self.protocols
            .get(name)
            .cloned()
            .ok_or_else(|| LinkError::UnknownProtocol(name.to_string()))
    }

    /// Names of all registered protocols, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.protocols.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ProtocolRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(AlpProtocol));
        registry
    }
}
