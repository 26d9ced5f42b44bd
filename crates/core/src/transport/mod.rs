//! Delivery substrate of the ring.
//!
//! A transport delivers [MessagePayload]s at most once, asynchronously, with no
//! ordering guarantee across senders.
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::message::MessagePayload;

pub mod memory;

pub use memory::LatencyConfig;
pub use memory::MemoryTransport;

/// Interface a [Swarm](crate::swarm::Swarm) uses to reach other endpoints.
#[async_trait]
pub trait SwarmTransport: Send + Sync {
    /// Deliver payload to its destination, never blocking on the delivery.
    async fn send_payload(&self, payload: MessagePayload) -> Result<()>;

    /// Deliver payload to its destination once `delay` elapsed.
    async fn schedule_payload(&self, delay: Duration, payload: MessagePayload) -> Result<()>;
}
