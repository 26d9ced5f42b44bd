//! Implementation of the ring of storage nodes.
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

pub mod chord;

pub use chord::responsible_nodes;
pub use chord::PeerRing;

/// Position of a node on the ring.
pub type NodeKey = u64;

/// Key of a stored item, on the same circular keyspace as [NodeKey].
pub type ItemKey = u64;

/// Endpoint name a transport routes messages to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeAddr(String);

impl NodeAddr {
    /// Create a new endpoint name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Endpoint name as str.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeAddr {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for NodeAddr {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
