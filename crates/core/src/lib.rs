//! Protocol engine of the ringkv replicated key-value ring.
//!
//! Every node owns a [message::MessageHandler], a single-threaded state machine
//! that turns one incoming [message::MessagePayload] into a list of
//! [message::MessageHandlerEvent]s. A [swarm::Swarm] drives the handler over a
//! [transport::SwarmTransport] and executes those events.
#![warn(missing_docs)]
pub mod config;
pub mod consts;
pub mod dht;
pub mod error;
pub mod inspect;
pub mod message;
pub mod storage;
pub mod swarm;
pub mod transport;

#[cfg(test)]
mod tests;
