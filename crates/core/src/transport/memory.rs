//! In-process transport with injected latency.
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use rand::distributions::Distribution;
use rand::distributions::Uniform;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::consts::DEFAULT_LATENCY_MAX_MS;
use crate::consts::DEFAULT_LATENCY_MIN_MS;
use crate::dht::NodeAddr;
use crate::error::Error;
use crate::error::Result;
use crate::message::MessagePayload;
use crate::transport::SwarmTransport;

/// Bounds in ms of the random delay before each delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyConfig {
    /// Min delay in ms on sending message
    pub min_ms: u64,
    /// Max delay in ms on sending message
    pub max_ms: u64,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            min_ms: DEFAULT_LATENCY_MIN_MS,
            max_ms: DEFAULT_LATENCY_MAX_MS,
        }
    }
}

impl LatencyConfig {
    /// No delay at all.
    pub fn none() -> Self {
        Self {
            min_ms: 0,
            max_ms: 0,
        }
    }

    fn random_delay(&self) -> Duration {
        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        let between = Uniform::from(self.min_ms..=self.max_ms);
        let mut rng = rand::thread_rng();
        Duration::from_millis(between.sample(&mut rng))
    }
}

/// [MemoryTransport] routes bincode-encoded payloads between endpoints of one
/// process. Each send runs in its own task, so a sender never waits for the
/// injected latency.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    endpoints: DashMap<NodeAddr, mpsc::UnboundedSender<Bytes>>,
    latency: LatencyConfig,
}

impl MemoryTransport {
    /// Create a new [MemoryTransport] instance.
    pub fn new(latency: LatencyConfig) -> Self {
        Self {
            endpoints: DashMap::new(),
            latency,
        }
    }

    /// Register an endpoint and get its inbox.
    pub fn register(&self, addr: &NodeAddr) -> Result<mpsc::UnboundedReceiver<Bytes>> {
        if self.endpoints.contains_key(addr) {
            return Err(Error::EndpointRegistered(addr.clone()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.endpoints.insert(addr.clone(), tx);
        Ok(rx)
    }

    /// Remove an endpoint, later payloads to it are dropped.
    pub fn unregister(&self, addr: &NodeAddr) {
        self.endpoints.remove(addr);
    }

    /// Check an endpoint is registered.
    pub fn is_registered(&self, addr: &NodeAddr) -> bool {
        self.endpoints.contains_key(addr)
    }

    fn deliver_later(&self, delay: Duration, payload: MessagePayload) -> Result<()> {
        let Some(tx) = self
            .endpoints
            .get(&payload.destination)
            .map(|e| e.value().clone())
        else {
            tracing::warn!(
                "drop {} to unknown endpoint {}",
                payload.data.name(),
                payload.destination
            );
            return Ok(());
        };
        let data = payload.to_bincode()?;
        let destination = payload.destination;

        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if tx.send(data).is_err() {
                tracing::warn!("inbox of {} is closed, payload dropped", destination);
            }
        });
        Ok(())
    }
}

#[async_trait]
impl SwarmTransport for MemoryTransport {
    async fn send_payload(&self, payload: MessagePayload) -> Result<()> {
        self.deliver_later(self.latency.random_delay(), payload)
    }

    async fn schedule_payload(&self, delay: Duration, payload: MessagePayload) -> Result<()> {
        self.deliver_later(delay, payload)
    }
}
