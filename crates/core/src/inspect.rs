//! Serializable snapshot of a node, for the harness and tests.
use serde::Deserialize;
use serde::Serialize;

use crate::dht::ItemKey;
use crate::dht::NodeKey;
use crate::error::Result;
use crate::message::MessageHandler;
use crate::message::NodeMode;
use crate::storage::Item;
use crate::storage::Lock;

/// State of one node at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInspect {
    /// Endpoint of the node.
    pub addr: String,
    /// Ring key, none outside of the ring.
    pub key: Option<NodeKey>,
    /// Handling mode.
    pub mode: NodeMode,
    /// Peers the node knows, ascending.
    pub peers: Vec<NodeKey>,
    /// Items held, ascending.
    pub items: Vec<Item>,
    /// Locks held.
    pub locks: Vec<(ItemKey, Lock)>,
    /// Requests waiting for a quorum.
    pub pending_requests: usize,
    /// A join, leave or recovery is in flight.
    pub busy: bool,
}

impl NodeInspect {
    /// Take a snapshot of a handler.
    pub fn inspect(handler: &MessageHandler) -> Result<Self> {
        Ok(Self {
            addr: handler.addr().to_string(),
            key: handler.key(),
            mode: handler.mode(),
            peers: handler.ring().keys().into_iter().collect(),
            items: handler.store().items()?,
            locks: handler.store().locks()?,
            pending_requests: handler.pending_requests(),
            busy: handler.is_busy(),
        })
    }

    /// Look up an item in the snapshot.
    pub fn item(&self, key: ItemKey) -> Option<&Item> {
        self.items.iter().find(|i| i.key == key)
    }
}
