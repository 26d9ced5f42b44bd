//! Ring responsibility math.
#![warn(missing_docs)]
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::ops::Bound;

use super::ItemKey;
use super::NodeAddr;
use super::NodeKey;

/// Compute the ordered responsible set of `key` over `ring`.
///
/// Scanning clockwise from just above `key`, the first `replication` node keys
/// are responsible, wrapping to the smallest key once. When the ring holds fewer
/// than `replication` keys, every key is responsible.
pub fn responsible_nodes(
    key: ItemKey,
    ring: &BTreeSet<NodeKey>,
    replication: usize,
) -> Vec<NodeKey> {
    let take = replication.min(ring.len());
    ring.range((Bound::Excluded(key), Bound::Unbounded))
        .chain(ring.range(..=key))
        .take(take)
        .copied()
        .collect()
}

/// PeerRing is the view a node keeps of the ring membership.
/// All nodes form a clockwise ring in ascending order of [NodeKey],
/// the successor of the largest key is the smallest key.
#[derive(Debug, Clone)]
pub struct PeerRing {
    /// Replication factor N.
    pub replication: usize,
    peers: BTreeMap<NodeKey, NodeAddr>,
}

impl PeerRing {
    /// Create an empty ring view.
    pub fn new(replication: usize) -> Self {
        Self {
            replication,
            peers: BTreeMap::new(),
        }
    }

    /// Insert or replace a peer.
    pub fn insert(&mut self, key: NodeKey, addr: NodeAddr) {
        self.peers.insert(key, addr);
    }

    /// Remove a peer, returning its address if it was present.
    pub fn remove(&mut self, key: NodeKey) -> Option<NodeAddr> {
        self.peers.remove(&key)
    }

    /// Replace the whole membership.
    pub fn replace(&mut self, peers: BTreeMap<NodeKey, NodeAddr>) {
        self.peers = peers;
    }

    /// Forget every peer.
    pub fn clear(&mut self) {
        self.peers.clear();
    }

    /// Check if `key` is a member.
    pub fn contains(&self, key: NodeKey) -> bool {
        self.peers.contains_key(&key)
    }

    /// Address of a member.
    pub fn addr(&self, key: NodeKey) -> Option<&NodeAddr> {
        self.peers.get(&key)
    }

    /// Count of members.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Check if the ring has no member.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Member keys in ascending order.
    pub fn keys(&self) -> BTreeSet<NodeKey> {
        self.peers.keys().copied().collect()
    }

    /// Copy of the membership, used to answer active node list requests.
    pub fn snapshot(&self) -> BTreeMap<NodeKey, NodeAddr> {
        self.peers.clone()
    }

    /// Iterate over members in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeKey, &NodeAddr)> {
        self.peers.iter()
    }

    /// Nodes responsible for `key` on the current ring.
    pub fn responsible(&self, key: ItemKey) -> Vec<NodeKey> {
        responsible_nodes(key, &self.keys(), self.replication)
    }

    /// Nodes responsible for `key` once `extra` is part of the ring.
    pub fn responsible_with(&self, key: ItemKey, extra: NodeKey) -> Vec<NodeKey> {
        let mut ring = self.keys();
        ring.insert(extra);
        responsible_nodes(key, &ring, self.replication)
    }

    /// Nodes responsible for `key` once `excluded` left the ring.
    pub fn responsible_without(&self, key: ItemKey, excluded: NodeKey) -> Vec<NodeKey> {
        let mut ring = self.keys();
        ring.remove(&excluded);
        responsible_nodes(key, &ring, self.replication)
    }

    /// Check if `node` is responsible for `item` on the current ring.
    pub fn is_responsible(&self, node: NodeKey, item: ItemKey) -> bool {
        self.responsible(item).contains(&node)
    }

    /// The first member clockwise after `key`, never `key` itself.
    pub fn clockwise_neighbor(&self, key: NodeKey) -> Option<NodeKey> {
        self.peers
            .range((Bound::Excluded(key), Bound::Unbounded))
            .chain(self.peers.range(..key))
            .map(|(k, _)| *k)
            .next()
    }
}
