//! Error of ringkv_core

use crate::dht::NodeAddr;
use crate::dht::NodeKey;

/// A wrap `Result` contains custom errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors collections in ringkv-core.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Invalid ring config: {0}")]
    InvalidRingConfig(String),

    #[error("Node key is not assigned, join or init the ring first")]
    NodeKeyUnassigned,

    #[error("Cannot report message without sender")]
    MissingSender,

    #[error("Peer {0} is not in peer ring")]
    UnknownPeer(NodeKey),

    #[error("Bincode serialization error")]
    BincodeSerialize(#[source] bincode::Error),

    #[error("Bincode deserialization error")]
    BincodeDeserialize(#[source] bincode::Error),

    #[error("Failed to lock message handler")]
    MessageHandlerLockError,

    #[error("Inbox of {0} is closed")]
    InboxClosed(NodeAddr),

    #[error("Endpoint {0} is already registered on transport")]
    EndpointRegistered(NodeAddr),

    #[error("Failed to deliver message to {0}")]
    TransportSend(NodeAddr),
}
