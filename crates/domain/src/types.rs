//! Core identity types shared across Ember crates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a configured IRC network.
///
/// OAuth sessions carry a `NetworkId` back to their caller instead of
/// holding the network configuration itself; the configuration stays owned
/// by the host application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkId(String);

impl NetworkId {
    /// Create a network identity from the network's configured name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The network's configured name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NetworkId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}
