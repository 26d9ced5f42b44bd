#![warn(missing_docs)]
//! A client of the ring.
//!
//! A [Client] has its own endpoint on the transport and at most one request
//! outstanding, which `&mut self` on every request enforces. A request gives up
//! after twice the ring timeout, so a coordinator that timed out always gets the
//! chance to report its `ERROR` first.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Error;
use crate::error::Result;
use crate::prelude::ringkv_core::message::types::GetRequest;
use crate::prelude::ringkv_core::message::types::GetResult;
use crate::prelude::ringkv_core::message::types::UpdateRequest;
use crate::prelude::ringkv_core::message::types::UpdateResult;
use crate::prelude::Item;
use crate::prelude::ItemKey;
use crate::prelude::MemoryTransport;
use crate::prelude::Message;
use crate::prelude::MessagePayload;
use crate::prelude::NodeAddr;
use crate::prelude::SwarmTransport;

/// Endpoint name of the client called `name`.
pub fn client_addr(name: &str) -> NodeAddr {
    NodeAddr::new(format!("client-{name}"))
}

fn now() -> String {
    chrono::Local::now().format("%H:%M:%S%.3f").to_string()
}

/// Issues gets and updates to coordinators and waits for their results.
pub struct Client {
    name: String,
    addr: NodeAddr,
    transport: Arc<MemoryTransport>,
    inbox: mpsc::UnboundedReceiver<Bytes>,
    deadline: Duration,
}

impl Client {
    /// Register a client endpoint. `timeout` is the ring timeout T.
    pub fn new(name: &str, transport: Arc<MemoryTransport>, timeout: Duration) -> Result<Self> {
        let addr = client_addr(name);
        let inbox = transport.register(&addr)?;
        Ok(Self {
            name: name.to_string(),
            addr,
            transport,
            inbox,
            deadline: timeout * 2,
        })
    }

    /// Name of the client, also the owner of the locks it causes.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Write `value` under `key` through `coordinator`.
    pub async fn update(
        &mut self,
        coordinator: &NodeAddr,
        key: ItemKey,
        value: &str,
    ) -> Result<UpdateResult> {
        let msg = Message::UpdateRequest(UpdateRequest {
            client_name: self.name.clone(),
            item: Item::new(key, value),
        });
        match self.request(coordinator, msg).await? {
            Message::UpdateResult(res) => {
                tracing::info!(
                    "[{}] {} update via {}: {:?} {}",
                    now(),
                    self.name,
                    coordinator,
                    res.result,
                    res.item
                );
                Ok(res)
            }
            other => Err(Error::UnexpectedReply(
                self.name.clone(),
                other.name().to_string(),
            )),
        }
    }

    /// Read `key` through `coordinator`.
    pub async fn get(&mut self, coordinator: &NodeAddr, key: ItemKey) -> Result<GetResult> {
        let msg = Message::GetRequest(GetRequest { item_key: key });
        match self.request(coordinator, msg).await? {
            Message::GetResult(res) => {
                match &res.item {
                    Some(item) => tracing::info!(
                        "[{}] {} get {} via {}: {:?} {}",
                        now(),
                        self.name,
                        key,
                        coordinator,
                        res.result,
                        item
                    ),
                    None => tracing::info!(
                        "[{}] {} get {} via {}: {:?}",
                        now(),
                        self.name,
                        key,
                        coordinator,
                        res.result
                    ),
                }
                Ok(res)
            }
            other => Err(Error::UnexpectedReply(
                self.name.clone(),
                other.name().to_string(),
            )),
        }
    }

    async fn request(&mut self, coordinator: &NodeAddr, msg: Message) -> Result<Message> {
        // Results of requests this client gave up on.
        while let Ok(data) = self.inbox.try_recv() {
            tracing::debug!("{}: drop {} late bytes", self.name, data.len());
        }

        let payload = MessagePayload::new_send(msg, &self.addr, coordinator);
        self.transport.send_payload(payload).await?;

        let deadline = tokio::time::Instant::now() + self.deadline;
        loop {
            let data = tokio::time::timeout_at(deadline, self.inbox.recv())
                .await
                .map_err(|_| Error::ClientTimeout(self.name.clone()))?
                .ok_or_else(|| Error::ClientInboxClosed(self.name.clone()))?;
            match MessagePayload::from_bincode(&data) {
                Ok(payload) => return Ok(payload.data),
                Err(e) => tracing::error!("{}: failed on decoding result: {}", self.name, e),
            }
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.transport.unregister(&self.addr);
    }
}
