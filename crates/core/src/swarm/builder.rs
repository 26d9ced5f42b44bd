#![warn(missing_docs)]
//! This module provider [SwarmBuilder] and it's interface for
//! [Swarm]

use std::sync::Arc;
use std::sync::Mutex;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::config::RingConfig;
use crate::dht::NodeAddr;
use crate::error::Result;
use crate::message::MessageHandler;
use crate::swarm::Swarm;
use crate::transport::MemoryTransport;
use crate::transport::SwarmTransport;

/// Creates a SwarmBuilder to configure a Swarm.
pub struct SwarmBuilder {
    addr: NodeAddr,
    config: RingConfig,
    transport: Arc<dyn SwarmTransport>,
    inbox: mpsc::UnboundedReceiver<Bytes>,
}

impl SwarmBuilder {
    /// Creates new instance of [SwarmBuilder] over any transport.
    /// `inbox` receives the payloads the transport routes to `addr`.
    pub fn new(
        addr: NodeAddr,
        transport: Arc<dyn SwarmTransport>,
        inbox: mpsc::UnboundedReceiver<Bytes>,
    ) -> Self {
        SwarmBuilder {
            addr,
            config: RingConfig::default(),
            transport,
            inbox,
        }
    }

    /// Register `addr` on a [MemoryTransport] and build on it.
    pub fn with_memory_transport(addr: NodeAddr, transport: Arc<MemoryTransport>) -> Result<Self> {
        let inbox = transport.register(&addr)?;
        Ok(Self::new(addr, transport, inbox))
    }

    /// Sets up replication, quorums and timeout.
    pub fn config(mut self, config: RingConfig) -> Self {
        self.config = config;
        self
    }

    /// Try build for `Swarm`, the ring config is validated first.
    pub fn build(self) -> Result<Swarm> {
        self.config.validate()?;
        let message_handler = MessageHandler::new(self.addr.clone(), self.config);

        Ok(Swarm {
            addr: self.addr,
            message_handler: Mutex::new(message_handler),
            transport: self.transport,
            inbox: tokio::sync::Mutex::new(self.inbox),
        })
    }
}
