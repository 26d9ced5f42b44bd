#![warn(missing_docs)]
//! Runtime of one node.
//!
//! A [Swarm] owns the [MessageHandler] of a node, polls the node inbox one
//! payload at a time and executes the [MessageHandlerEvent]s produced by the
//! handler over a [SwarmTransport].

mod builder;

use std::sync::Arc;
use std::sync::Mutex;

pub use builder::SwarmBuilder;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::dht::NodeAddr;
use crate::error::Error;
use crate::error::Result;
use crate::inspect::NodeInspect;
use crate::message::Message;
use crate::message::MessageHandler;
use crate::message::MessageHandlerEvent;
use crate::message::MessagePayload;
use crate::transport::SwarmTransport;

/// The node runtime.
pub struct Swarm {
    addr: NodeAddr,
    message_handler: Mutex<MessageHandler>,
    transport: Arc<dyn SwarmTransport>,
    inbox: tokio::sync::Mutex<mpsc::UnboundedReceiver<Bytes>>,
}

impl Swarm {
    /// Endpoint of self.
    pub fn addr(&self) -> &NodeAddr {
        &self.addr
    }

    /// Snapshot of the node state.
    pub fn inspect(&self) -> Result<NodeInspect> {
        let handler = self
            .message_handler
            .lock()
            .map_err(|_| Error::MessageHandlerLockError)?;
        NodeInspect::inspect(&handler)
    }

    /// Send a message from self to `destination`.
    pub async fn send_message(&self, msg: Message, destination: &NodeAddr) -> Result<()> {
        let payload = MessagePayload::new_send(msg, &self.addr, destination);
        self.transport.send_payload(payload).await
    }

    fn dispatch(&self, payload: &MessagePayload) -> Result<Vec<MessageHandlerEvent>> {
        let mut handler = self
            .message_handler
            .lock()
            .map_err(|_| Error::MessageHandlerLockError)?;
        handler.handle_message(payload)
    }

    /// Wait for the next payload. `Ok(None)` means a payload could not be decoded.
    pub async fn poll_message(&self) -> Result<Option<MessagePayload>> {
        let data = {
            let mut inbox = self.inbox.lock().await;
            inbox.recv().await
        };
        let Some(data) = data else {
            return Err(Error::InboxClosed(self.addr.clone()));
        };
        match MessagePayload::from_bincode(&data) {
            Ok(payload) => Ok(Some(payload)),
            Err(e) => {
                tracing::error!("{}: failed on decoding payload: {}", self.addr, e);
                Ok(None)
            }
        }
    }

    /// Process one payload to completion.
    /// Return the payload and the events already executed, which is ok to be ignored.
    pub async fn listen_once(&self) -> Result<Option<(MessagePayload, Vec<MessageHandlerEvent>)>> {
        let Some(payload) = self.poll_message().await? else {
            return Ok(None);
        };

        match self.dispatch(&payload) {
            Ok(evs) => {
                self.handle_message_handler_events(&evs).await;
                Ok(Some((payload, evs)))
            }
            Err(e) => {
                tracing::error!(
                    "{}: message handler failed on {}: {}",
                    self.addr,
                    payload.data.name(),
                    e
                );
                Ok(None)
            }
        }
    }

    /// Listen until the inbox is closed.
    pub async fn listen(self: Arc<Self>) {
        loop {
            if let Err(e) = self.listen_once().await {
                tracing::info!("{}: stop listening: {}", self.addr, e);
                return;
            }
        }
    }

    /// Event handler of Swarm.
    pub async fn handle_message_handler_event(&self, event: &MessageHandlerEvent) -> Result<()> {
        tracing::debug!("{}: handle event {:?}", self.addr, event);
        match event {
            MessageHandlerEvent::SendMessage(msg, destination) => {
                self.send_message(msg.clone(), destination).await
            }
            MessageHandlerEvent::SendReportMessage(payload, msg) => {
                let report = payload.new_report(msg.clone())?;
                self.transport.send_payload(report).await
            }
            MessageHandlerEvent::ScheduleTimeout(delay, timeout) => {
                let payload = MessagePayload::new_send(
                    Message::Timeout(timeout.clone()),
                    &self.addr,
                    &self.addr,
                );
                self.transport.schedule_payload(*delay, payload).await
            }
        }
    }

    /// Batch handle events.
    pub async fn handle_message_handler_events(&self, events: &[MessageHandlerEvent]) {
        let jobs = events
            .iter()
            .map(|ev| self.handle_message_handler_event(ev));

        for res in futures::future::join_all(jobs).await {
            if let Err(e) = res {
                tracing::error!("{}: failed on handling event: {}", self.addr, e)
            }
        }
    }
}
