#![warn(missing_docs)]
//! This module implemented message handler of ringkv.
//!
//! A [MessageHandler] is the whole state of one node. It processes a single
//! [MessagePayload] at a time and never performs IO itself: everything it wants
//! to happen outside is returned as [MessageHandlerEvent]s, executed by the
//! [Swarm](crate::swarm::Swarm) or by a test network.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::config::RingConfig;
use crate::dht::NodeAddr;
use crate::dht::NodeKey;
use crate::dht::PeerRing;
use crate::error::Error;
use crate::error::Result;
use crate::message::types::Message;
use crate::message::types::PrintItemList;
use crate::message::types::PrintNodeList;
use crate::message::types::Timeout;
use crate::message::MessagePayload;
use crate::storage::ReplicaStore;

/// Operator and Handler for Join
pub mod join;
/// Operator and Handler for Leave
pub mod leave;
/// Operator and Handler for Get and Update
pub mod quorum;
/// Operator and Handler for Crash and Recovery
pub mod recovery;

/// Message handling mode of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeMode {
    /// Serving every message.
    Active,
    /// Ignoring everything except recovery.
    Crashed,
}

/// The membership operation a node is running, at most one at a time.
#[derive(Debug)]
pub(crate) enum MembershipOp {
    Join(join::JoinState),
    Leave(leave::LeaveState),
    Recovery(recovery::RecoveryState),
}

/// MessageHandler owns the state of one node.
#[derive(Debug)]
pub struct MessageHandler {
    addr: NodeAddr,
    key: Option<NodeKey>,
    mode: NodeMode,
    config: RingConfig,
    ring: PeerRing,
    store: ReplicaStore,
    requests: BTreeMap<u64, quorum::PendingRequest>,
    request_counter: u64,
    attempt_counter: u64,
    membership: Option<MembershipOp>,
}

/// Events the handler asks its runtime to perform.
#[derive(Debug, Clone)]
pub enum MessageHandlerEvent {
    /// Send a message to an endpoint.
    SendMessage(Message, NodeAddr),
    /// Answer the sender of a payload.
    SendReportMessage(MessagePayload, Message),
    /// Deliver a timeout to this node after the duration.
    ScheduleTimeout(Duration, Timeout),
}

/// Generic trait for handle message in active mode, inspired by Actor-Model.
pub trait HandleMsg<T> {
    /// Message handler.
    fn handle(&mut self, ctx: &MessagePayload, msg: &T) -> Result<Vec<MessageHandlerEvent>>;
}

/// Handle the few messages a crashed node still reacts to.
pub trait HandleCrashedMsg<T> {
    /// Message handler in crashed mode.
    fn handle_crashed(
        &mut self,
        ctx: &MessagePayload,
        msg: &T,
    ) -> Result<Vec<MessageHandlerEvent>>;
}

impl MessageHandler {
    /// Create a new MessageHandler instance, not part of any ring yet.
    pub fn new(addr: NodeAddr, config: RingConfig) -> Self {
        Self {
            addr,
            key: None,
            mode: NodeMode::Active,
            ring: PeerRing::new(config.replication),
            config,
            store: ReplicaStore::new(),
            requests: BTreeMap::new(),
            request_counter: 0,
            attempt_counter: 0,
            membership: None,
        }
    }

    /// Endpoint of this node.
    pub fn addr(&self) -> &NodeAddr {
        &self.addr
    }

    /// Ring key, none before joining.
    pub fn key(&self) -> Option<NodeKey> {
        self.key
    }

    /// Current handling mode.
    pub fn mode(&self) -> NodeMode {
        self.mode
    }

    /// View of the ring.
    pub fn ring(&self) -> &PeerRing {
        &self.ring
    }

    /// Items and locks.
    pub fn store(&self) -> &ReplicaStore {
        &self.store
    }

    /// Quorum parameters.
    pub fn config(&self) -> &RingConfig {
        &self.config
    }

    /// Count of requests waiting for a quorum.
    pub fn pending_requests(&self) -> usize {
        self.requests.len()
    }

    /// Check a membership operation is in flight.
    pub fn is_busy(&self) -> bool {
        self.membership.is_some()
    }

    fn own_key(&self) -> Result<NodeKey> {
        self.key.ok_or(Error::NodeKeyUnassigned)
    }

    fn next_attempt(&mut self) -> u64 {
        self.attempt_counter += 1;
        self.attempt_counter
    }

    fn next_request_id(&mut self) -> u64 {
        self.request_counter += 1;
        self.request_counter
    }

    fn is_self(&self, key: NodeKey) -> bool {
        self.key == Some(key)
    }

    fn peer_addr(&self, key: NodeKey) -> Result<NodeAddr> {
        self.ring.addr(key).cloned().ok_or(Error::UnknownPeer(key))
    }

    /// Send to a member, a peer missing from the ring is skipped with a warning.
    fn send_to_peer(&self, key: NodeKey, msg: Message) -> Option<MessageHandlerEvent> {
        match self.ring.addr(key) {
            Some(addr) => Some(MessageHandlerEvent::SendMessage(msg, addr.clone())),
            None => {
                tracing::warn!(
                    "{}: peer {} left the ring, drop {}",
                    self.addr,
                    key,
                    msg.name()
                );
                None
            }
        }
    }

    fn schedule(&self, timeout: Timeout) -> MessageHandlerEvent {
        MessageHandlerEvent::ScheduleTimeout(self.config.timeout, timeout)
    }

    /// Dispatch a payload by `(mode, message)`.
    pub fn handle_message(&mut self, payload: &MessagePayload) -> Result<Vec<MessageHandlerEvent>> {
        tracing::debug!(
            "{} handle {} from {:?}",
            self.addr,
            payload.data.name(),
            payload.sender
        );
        match self.mode {
            NodeMode::Active => self.dispatch_active(payload),
            NodeMode::Crashed => self.dispatch_crashed(payload),
        }
    }

    fn dispatch_active(&mut self, payload: &MessagePayload) -> Result<Vec<MessageHandlerEvent>> {
        match &payload.data {
            Message::InitSystem(msg) => self.handle(payload, msg),
            Message::JoinMsg(msg) => self.handle(payload, msg),
            Message::ReqActiveNodeList(msg) => self.handle(payload, msg),
            Message::ResActiveNodeList(msg) => self.handle(payload, msg),
            Message::ReqDataItemsResponsibleFor(msg) => self.handle(payload, msg),
            Message::ResDataItemsResponsibleFor(msg) => self.handle(payload, msg),
            Message::ReqDataItemsResponsibleForRecovery(msg) => self.handle(payload, msg),
            Message::JoinReadOperationReq(msg) => self.handle(payload, msg),
            Message::JoinReadOperationRes(msg) => self.handle(payload, msg),
            Message::AnnouncePresence(msg) => self.handle(payload, msg),
            Message::LeaveMsg(msg) => self.handle(payload, msg),
            Message::PreLeaveStatusCheck(msg) => self.handle(payload, msg),
            Message::DepartureAck(msg) => self.handle(payload, msg),
            Message::AnnounceDeparture(msg) => self.handle(payload, msg),
            Message::CrashMsg(msg) => self.handle(payload, msg),
            Message::GetRequest(msg) => self.handle(payload, msg),
            Message::Read(msg) => self.handle(payload, msg),
            Message::ReadItemInformation(msg) => self.handle(payload, msg),
            Message::UpdateRequest(msg) => self.handle(payload, msg),
            Message::Version(msg) => self.handle(payload, msg),
            Message::UpdateVersion(msg) => self.handle(payload, msg),
            Message::Write(msg) => self.handle(payload, msg),
            Message::ReleaseLock(msg) => self.handle(payload, msg),
            Message::PrintNodeList(msg) => self.handle(payload, msg),
            Message::PrintItemList(msg) => self.handle(payload, msg),
            Message::Timeout(msg) => self.handle(payload, msg),
            Message::RecoveryMsg(_) | Message::GetResult(_) | Message::UpdateResult(_) => {
                tracing::warn!(
                    "{}: unexpected {} in active mode",
                    self.addr,
                    payload.data.name()
                );
                Ok(vec![])
            }
        }
    }

    fn dispatch_crashed(&mut self, payload: &MessagePayload) -> Result<Vec<MessageHandlerEvent>> {
        match &payload.data {
            Message::RecoveryMsg(msg) => self.handle_crashed(payload, msg),
            Message::ResActiveNodeList(msg) => self.handle_crashed(payload, msg),
            Message::ResDataItemsResponsibleFor(msg) => self.handle_crashed(payload, msg),
            Message::Timeout(msg) => self.handle_crashed(payload, msg),
            other => {
                tracing::debug!("{}: ignoring {} (crashed)", self.addr, other.name());
                Ok(vec![])
            }
        }
    }
}

impl HandleMsg<Timeout> for MessageHandler {
    fn handle(&mut self, _ctx: &MessagePayload, msg: &Timeout) -> Result<Vec<MessageHandlerEvent>> {
        match msg {
            Timeout::JoinActiveList { .. }
            | Timeout::JoinResponsibleItems { .. }
            | Timeout::JoinReadRepair { .. } => self.on_join_timeout(msg),
            Timeout::LeaveAcks { attempt } => self.on_leave_timeout(*attempt),
            Timeout::Request { request_id } => self.on_request_timeout(*request_id),
            Timeout::RecoveryActiveList { .. } | Timeout::RecoveryResponsibleItems { .. } => {
                tracing::debug!("{}: stale recovery timeout {:?}", self.addr, msg);
                Ok(vec![])
            }
        }
    }
}

impl HandleCrashedMsg<Timeout> for MessageHandler {
    fn handle_crashed(
        &mut self,
        _ctx: &MessagePayload,
        msg: &Timeout,
    ) -> Result<Vec<MessageHandlerEvent>> {
        match msg {
            Timeout::RecoveryActiveList { .. } | Timeout::RecoveryResponsibleItems { .. } => {
                self.on_recovery_timeout(msg)
            }
            _ => {
                tracing::debug!("{}: ignoring timeout {:?} (crashed)", self.addr, msg);
                Ok(vec![])
            }
        }
    }
}

impl HandleMsg<PrintNodeList> for MessageHandler {
    fn handle(
        &mut self,
        _ctx: &MessagePayload,
        _msg: &PrintNodeList,
    ) -> Result<Vec<MessageHandlerEvent>> {
        let peers = self
            .ring
            .iter()
            .map(|(k, addr)| format!("{k}@{addr}"))
            .collect::<Vec<_>>()
            .join(", ");
        tracing::info!("{} ({:?}) peers: [{}]", self.addr, self.key, peers);
        Ok(vec![])
    }
}

impl HandleMsg<PrintItemList> for MessageHandler {
    fn handle(
        &mut self,
        _ctx: &MessagePayload,
        _msg: &PrintItemList,
    ) -> Result<Vec<MessageHandlerEvent>> {
        let mut entries = vec![];
        for item in self.store.items()? {
            match self.store.lock(item.key)? {
                Some(lock) => entries.push(format!("{item} locked by {lock}")),
                None => entries.push(item.to_string()),
            }
        }
        tracing::info!(
            "{} ({:?}) items: [{}]",
            self.addr,
            self.key,
            entries.join(", ")
        );
        Ok(vec![])
    }
}
