//! Envelope of a [Message] on the transport.
use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;

use crate::dht::NodeAddr;
use crate::error::Error;
use crate::error::Result;
use crate::message::Message;

/// `MessagePayload` is used to transmit data between nodes.
/// Serialized by [bincode], so the receiver always owns a deep copy of the data.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MessagePayload {
    /// Unique id of the payload.
    pub tx_id: uuid::Uuid,
    /// Endpoint the payload comes from, none for the harness.
    pub sender: Option<NodeAddr>,
    /// Endpoint the payload is delivered to.
    pub destination: NodeAddr,
    /// Payload data.
    pub data: Message,
}

impl MessagePayload {
    /// Wrap a message with a fresh tx id.
    pub fn new(data: Message, sender: Option<NodeAddr>, destination: NodeAddr) -> Self {
        Self {
            tx_id: uuid::Uuid::new_v4(),
            sender,
            destination,
            data,
        }
    }

    /// Create a payload sent by `sender`.
    pub fn new_send(data: Message, sender: &NodeAddr, destination: &NodeAddr) -> Self {
        Self::new(data, Some(sender.clone()), destination.clone())
    }

    /// Create a payload that answers this one, addressed to its sender.
    pub fn new_report(&self, data: Message) -> Result<Self> {
        let destination = self.sender.clone().ok_or(Error::MissingSender)?;
        Ok(Self::new(data, Some(self.destination.clone()), destination))
    }

    /// Serialize by [bincode::serialize].
    pub fn to_bincode(&self) -> Result<Bytes> {
        bincode::serialize(self)
            .map(Bytes::from)
            .map_err(Error::BincodeSerialize)
    }

    /// Deserialize by [bincode::deserialize].
    pub fn from_bincode(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data).map_err(Error::BincodeDeserialize)
    }
}
