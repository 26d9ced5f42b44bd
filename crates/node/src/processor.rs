#![warn(missing_docs)]

//! Processor of the ringkv harness.
//!
//! A [Processor] runs every node of a ring in one process, on a shared
//! [MemoryTransport], and drives membership changes with harness commands.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;

use crate::client::Client;
use crate::config::Config;
use crate::error::Error;
use crate::error::Result;
use crate::prelude::ringkv_core::message::types::CrashMsg;
use crate::prelude::ringkv_core::message::types::InitSystem;
use crate::prelude::ringkv_core::message::types::JoinMsg;
use crate::prelude::ringkv_core::message::types::LeaveMsg;
use crate::prelude::ringkv_core::message::types::PrintItemList;
use crate::prelude::ringkv_core::message::types::PrintNodeList;
use crate::prelude::ringkv_core::message::types::RecoveryMsg;
use crate::prelude::MemoryTransport;
use crate::prelude::Message;
use crate::prelude::MessagePayload;
use crate::prelude::NodeAddr;
use crate::prelude::NodeInspect;
use crate::prelude::NodeKey;
use crate::prelude::NodeMode;
use crate::prelude::RingConfig;
use crate::prelude::Swarm;
use crate::prelude::SwarmBuilder;
use crate::prelude::SwarmTransport;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Endpoint name of the node with ring key `key`.
pub fn node_addr(key: NodeKey) -> NodeAddr {
    NodeAddr::new(format!("node-{key}"))
}

/// Runs nodes and hands out clients.
pub struct Processor {
    config: Config,
    ring: RingConfig,
    transport: Arc<MemoryTransport>,
    nodes: DashMap<NodeKey, Arc<Swarm>>,
    listeners: DashMap<NodeKey, JoinHandle<()>>,
}

impl Processor {
    /// Create a processor with no node. The ring parameters are validated.
    pub fn new(config: Config) -> Result<Self> {
        let ring = config.ring()?;
        let transport = Arc::new(MemoryTransport::new(config.latency()));
        Ok(Self {
            config,
            ring,
            transport,
            nodes: DashMap::new(),
            listeners: DashMap::new(),
        })
    }

    /// Configuration the processor runs with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Start the node `key`, outside of any ring.
    pub fn spawn(&self, key: NodeKey) -> Result<Arc<Swarm>> {
        if self.nodes.contains_key(&key) {
            return Err(Error::NodeExists(key));
        }
        let swarm = Arc::new(
            SwarmBuilder::with_memory_transport(node_addr(key), self.transport.clone())?
                .config(self.ring)
                .build()?,
        );
        let listener = tokio::spawn(swarm.clone().listen());
        self.nodes.insert(key, swarm.clone());
        self.listeners.insert(key, listener);
        tracing::debug!("spawned node {}", key);
        Ok(swarm)
    }

    /// The running node `key`.
    pub fn node(&self, key: NodeKey) -> Result<Arc<Swarm>> {
        self.nodes
            .get(&key)
            .map(|n| n.value().clone())
            .ok_or(Error::NodeNotFound(key))
    }

    /// Keys of the running nodes, ascending.
    pub fn node_keys(&self) -> Vec<NodeKey> {
        let mut keys: Vec<NodeKey> = self.nodes.iter().map(|n| *n.key()).collect();
        keys.sort();
        keys
    }

    /// Deliver a harness command, it carries no sender.
    async fn command(&self, key: NodeKey, msg: Message) -> Result<()> {
        let payload = MessagePayload::new(msg, None, node_addr(key));
        self.transport.send_payload(payload).await?;
        Ok(())
    }

    /// Poll node `key` until `done` holds, for at most twice the ring timeout.
    pub async fn wait_for<F>(&self, key: NodeKey, done: F) -> Result<bool>
    where F: Fn(&NodeInspect) -> bool {
        let node = self.node(key)?;
        let deadline = tokio::time::Instant::now() + self.ring.timeout * 2;
        while tokio::time::Instant::now() < deadline {
            if done(&node.inspect()?) {
                return Ok(true);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        Ok(false)
    }

    /// Let the messages in flight land.
    pub async fn settle(&self) {
        let latency = Duration::from_millis(self.config.latency_max_ms);
        tokio::time::sleep(latency * 3 + POLL_INTERVAL).await;
    }

    /// Start `key` and found a ring with it.
    pub async fn init_system(&self, key: NodeKey) -> Result<bool> {
        self.spawn(key)?;
        self.command(key, Message::InitSystem(InitSystem { key }))
            .await?;
        self.wait_for(key, |n| n.peers.contains(&key)).await
    }

    /// Start `key` and join it through `bootstrap`. True once it is in the ring.
    pub async fn join(&self, key: NodeKey, bootstrap: NodeKey) -> Result<bool> {
        if !self.nodes.contains_key(&key) {
            self.spawn(key)?;
        }
        self.command(
            key,
            Message::JoinMsg(JoinMsg {
                key,
                bootstrap: node_addr(bootstrap),
            }),
        )
        .await?;
        let joined = self
            .wait_for(key, |n| n.key == Some(key) && n.peers.contains(&key))
            .await?;
        if joined {
            self.settle().await;
        } else {
            tracing::warn!("node {} did not join through {}", key, bootstrap);
        }
        Ok(joined)
    }

    /// Make `key` leave the ring. True once it is out.
    pub async fn leave(&self, key: NodeKey) -> Result<bool> {
        self.command(key, Message::LeaveMsg(LeaveMsg)).await?;
        let left = self.wait_for(key, |n| n.key.is_none()).await?;
        if left {
            self.settle().await;
        } else {
            tracing::warn!("node {} did not leave", key);
        }
        Ok(left)
    }

    /// Crash `key`.
    pub async fn crash(&self, key: NodeKey) -> Result<bool> {
        self.command(key, Message::CrashMsg(CrashMsg)).await?;
        self.wait_for(key, |n| n.mode == NodeMode::Crashed).await
    }

    /// Recover `key` through `bootstrap`. True once it is active again.
    pub async fn recover(&self, key: NodeKey, bootstrap: NodeKey) -> Result<bool> {
        self.command(
            key,
            Message::RecoveryMsg(RecoveryMsg {
                bootstrap: node_addr(bootstrap),
            }),
        )
        .await?;
        let recovered = self.wait_for(key, |n| n.mode == NodeMode::Active).await?;
        if !recovered {
            tracing::warn!("node {} did not recover through {}", key, bootstrap);
        }
        Ok(recovered)
    }

    /// Have `key` log its peers.
    pub async fn print_nodes(&self, key: NodeKey) -> Result<()> {
        self.command(key, Message::PrintNodeList(PrintNodeList))
            .await
    }

    /// Have `key` log its items.
    pub async fn print_items(&self, key: NodeKey) -> Result<()> {
        self.command(key, Message::PrintItemList(PrintItemList))
            .await
    }

    /// Have every node log its items.
    pub async fn print_all_items(&self) -> Result<()> {
        for key in self.node_keys() {
            self.print_items(key).await?;
        }
        self.settle().await;
        Ok(())
    }

    /// Snapshot of node `key`.
    pub fn inspect(&self, key: NodeKey) -> Result<NodeInspect> {
        Ok(self.node(key)?.inspect()?)
    }

    /// Snapshot of every node, ascending by key.
    pub fn inspect_all(&self) -> Result<Vec<NodeInspect>> {
        self.node_keys()
            .into_iter()
            .map(|k| self.inspect(k))
            .collect()
    }

    /// Snapshot of every node as pretty json.
    pub fn inspect_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.inspect_all()?)?)
    }

    /// A new client on the shared transport.
    pub fn client(&self, name: &str) -> Result<Client> {
        Client::new(name, self.transport.clone(), self.ring.timeout)
    }

    /// Stop every node.
    pub fn shutdown(&self) {
        for key in self.node_keys() {
            self.transport.unregister(&node_addr(key));
        }
        for listener in self.listeners.iter() {
            listener.value().abort();
        }
        self.listeners.clear();
    }
}

impl Drop for Processor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
