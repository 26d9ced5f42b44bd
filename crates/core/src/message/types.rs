#![warn(missing_docs)]
//! This module defines the messages exchanged on the ring.
//! Most of the messages follow the Req/Res pattern, a node asking its peer and
//! the peer reporting back to the sender of the request.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::dht::ItemKey;
use crate::dht::NodeAddr;
use crate::dht::NodeKey;
use crate::storage::Item;
use crate::storage::Lock;

/// Harness asks a node to found the ring alone.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct InitSystem {
    /// Key of the first node.
    pub key: NodeKey,
}

/// Harness asks a node to join the ring through a bootstrap peer.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct JoinMsg {
    /// Key the node will take on the ring.
    pub key: NodeKey,
    /// Any member of the ring.
    pub bootstrap: NodeAddr,
}

/// Ask a member for the current ring membership.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ReqActiveNodeList {
    /// Attempt id of the asking node.
    pub attempt: u64,
}

/// Report the ring membership.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ResActiveNodeList {
    /// Attempt id echoed from request.
    pub attempt: u64,
    /// Membership of the ring.
    pub peers: BTreeMap<NodeKey, NodeAddr>,
}

/// Joiner asks its clockwise neighbor for the items it will be responsible for.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ReqDataItemsResponsibleFor {
    /// Attempt id of the joiner.
    pub attempt: u64,
    /// Key of the joiner.
    pub joining_key: NodeKey,
}

/// Report items the asking node is responsible for.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ResDataItemsResponsibleFor {
    /// Attempt id echoed from request.
    pub attempt: u64,
    /// Copies of items.
    pub items: Vec<Item>,
}

/// Recovering node asks its clockwise neighbor for items it misses.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ReqDataItemsResponsibleForRecovery {
    /// Attempt id of the recovering node.
    pub attempt: u64,
    /// Key of the recovering node.
    pub key: NodeKey,
    /// Items already held, the neighbor omits them.
    pub held_keys: Vec<ItemKey>,
}

/// Joiner asks other replicas to confirm versions of adopted items.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct JoinReadOperationReq {
    /// Attempt id of the joiner.
    pub attempt: u64,
    /// Adopted items the receiver is responsible for.
    pub items: Vec<Item>,
}

/// Replica reports its view of the items in a [JoinReadOperationReq].
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct JoinReadOperationRes {
    /// Attempt id echoed from request.
    pub attempt: u64,
    /// Requested items the replica holds, the copy with the higher version.
    pub items: Vec<Item>,
    /// Requested items the replica does not hold.
    pub missing: Vec<ItemKey>,
}

/// Joiner announces it is now part of the ring.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AnnouncePresence {
    /// Key of the joiner.
    pub key: NodeKey,
    /// Address of the joiner.
    pub addr: NodeAddr,
    /// Keys of items the joiner took over.
    pub item_keys: Vec<ItemKey>,
}

/// Harness asks a node to leave the ring.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LeaveMsg;

/// Leaver checks a future owner of its items is alive.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PreLeaveStatusCheck {
    /// Attempt id of the leaver.
    pub attempt: u64,
}

/// Future owner acknowledges it is alive.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DepartureAck {
    /// Attempt id echoed from check.
    pub attempt: u64,
    /// Key of the acknowledging node.
    pub key: NodeKey,
}

/// Leaver announces its departure together with the handoff items.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AnnounceDeparture {
    /// Key of the leaver.
    pub key: NodeKey,
    /// Items the receiver is newly responsible for.
    pub items: Vec<Item>,
}

/// Harness makes a node crash.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CrashMsg;

/// Harness asks a crashed node to recover through a bootstrap peer.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RecoveryMsg {
    /// Any member of the ring.
    pub bootstrap: NodeAddr,
}

/// Client asks a coordinator to read an item.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GetRequest {
    /// Key of the item.
    pub item_key: ItemKey,
}

/// Coordinator asks a replica for its copy of an item.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Read {
    /// Request id of the coordinator.
    pub request_id: u64,
    /// Key of the item.
    pub item_key: ItemKey,
}

/// Replica reports its copy of an item.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ReadItemInformation {
    /// Request id echoed from [Read].
    pub request_id: u64,
    /// Local copy.
    pub item: Item,
}

/// Client asks a coordinator to write an item.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct UpdateRequest {
    /// Name of the client, owner of the lock.
    pub client_name: String,
    /// New value, the version is ignored.
    pub item: Item,
}

/// Coordinator asks a replica to grant a lock and report its version.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Version {
    /// Lock of the write negotiation.
    pub lock: Lock,
    /// Request id of the coordinator.
    pub request_id: u64,
    /// Item to write.
    pub item: Item,
}

/// Replica granted the lock and reports its local version.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct UpdateVersion {
    /// Granted lock.
    pub lock: Lock,
    /// Request id echoed from [Version].
    pub request_id: u64,
    /// Key of the item.
    pub item_key: ItemKey,
    /// Local version, 0 if the replica does not hold the item.
    pub version: u64,
}

/// Coordinator commits the final value.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Write {
    /// Lock to release.
    pub lock: Lock,
    /// Final item.
    pub item: Item,
}

/// Coordinator gave up a write negotiation.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ReleaseLock {
    /// Lock to release.
    pub lock: Lock,
    /// Key of the item.
    pub item_key: ItemKey,
}

/// Outcome reported to a client.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum OpResult {
    /// Quorum reached.
    Success,
    /// Lock contention or quorum timeout.
    Error,
}

/// Result of a [GetRequest].
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct GetResult {
    /// Outcome.
    pub result: OpResult,
    /// Key of the item.
    pub item_key: ItemKey,
    /// Freshest copy among the quorum, set on success.
    pub item: Option<Item>,
}

/// Result of an [UpdateRequest].
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct UpdateResult {
    /// Outcome.
    pub result: OpResult,
    /// Written item on success, requested item on error.
    pub item: Item,
}

/// Harness asks a node to log its peers.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PrintNodeList;

/// Harness asks a node to log its items.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PrintItemList;

/// Self-scheduled timer, one per await phase.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub enum Timeout {
    /// Join waits for the active node list.
    JoinActiveList {
        /// Attempt id.
        attempt: u64,
    },
    /// Join waits for the items from its neighbor.
    JoinResponsibleItems {
        /// Attempt id.
        attempt: u64,
    },
    /// Join waits for read confirmations.
    JoinReadRepair {
        /// Attempt id.
        attempt: u64,
    },
    /// Leave waits for departure acks.
    LeaveAcks {
        /// Attempt id.
        attempt: u64,
    },
    /// Recovery waits for the active node list.
    RecoveryActiveList {
        /// Attempt id.
        attempt: u64,
    },
    /// Recovery waits for the items from its neighbor.
    RecoveryResponsibleItems {
        /// Attempt id.
        attempt: u64,
        /// Items discarded when the active list arrived.
        backup: Vec<Item>,
    },
    /// Coordinator waits for a quorum.
    Request {
        /// Request id.
        request_id: u64,
    },
}

/// A collection MessageType use for unified management.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[non_exhaustive]
pub enum Message {
    /// Found the ring.
    InitSystem(InitSystem),
    /// Join the ring.
    JoinMsg(JoinMsg),
    /// Ask membership.
    ReqActiveNodeList(ReqActiveNodeList),
    /// Report membership.
    ResActiveNodeList(ResActiveNodeList),
    /// Ask items for a joiner.
    ReqDataItemsResponsibleFor(ReqDataItemsResponsibleFor),
    /// Report items for a joiner or a recovering node.
    ResDataItemsResponsibleFor(ResDataItemsResponsibleFor),
    /// Ask items for a recovering node.
    ReqDataItemsResponsibleForRecovery(ReqDataItemsResponsibleForRecovery),
    /// Ask version confirmation.
    JoinReadOperationReq(JoinReadOperationReq),
    /// Report version confirmation.
    JoinReadOperationRes(JoinReadOperationRes),
    /// Joiner is in.
    AnnouncePresence(AnnouncePresence),
    /// Leave the ring.
    LeaveMsg(LeaveMsg),
    /// Check a future owner.
    PreLeaveStatusCheck(PreLeaveStatusCheck),
    /// Future owner is alive.
    DepartureAck(DepartureAck),
    /// Leaver is out.
    AnnounceDeparture(AnnounceDeparture),
    /// Crash.
    CrashMsg(CrashMsg),
    /// Recover.
    RecoveryMsg(RecoveryMsg),
    /// Client read.
    GetRequest(GetRequest),
    /// Replica read.
    Read(Read),
    /// Replica read answer.
    ReadItemInformation(ReadItemInformation),
    /// Client write.
    UpdateRequest(UpdateRequest),
    /// Lock and version request.
    Version(Version),
    /// Lock and version answer.
    UpdateVersion(UpdateVersion),
    /// Commit.
    Write(Write),
    /// Abort.
    ReleaseLock(ReleaseLock),
    /// Client read outcome.
    GetResult(GetResult),
    /// Client write outcome.
    UpdateResult(UpdateResult),
    /// Log peers.
    PrintNodeList(PrintNodeList),
    /// Log items.
    PrintItemList(PrintItemList),
    /// Timer.
    Timeout(Timeout),
}

impl Message {
    /// Short name of the variant for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Message::InitSystem(_) => "InitSystem",
            Message::JoinMsg(_) => "JoinMsg",
            Message::ReqActiveNodeList(_) => "ReqActiveNodeList",
            Message::ResActiveNodeList(_) => "ResActiveNodeList",
            Message::ReqDataItemsResponsibleFor(_) => "ReqDataItemsResponsibleFor",
            Message::ResDataItemsResponsibleFor(_) => "ResDataItemsResponsibleFor",
            Message::ReqDataItemsResponsibleForRecovery(_) => {
                "ReqDataItemsResponsibleForRecovery"
            }
            Message::JoinReadOperationReq(_) => "JoinReadOperationReq",
            Message::JoinReadOperationRes(_) => "JoinReadOperationRes",
            Message::AnnouncePresence(_) => "AnnouncePresence",
            Message::LeaveMsg(_) => "LeaveMsg",
            Message::PreLeaveStatusCheck(_) => "PreLeaveStatusCheck",
            Message::DepartureAck(_) => "DepartureAck",
            Message::AnnounceDeparture(_) => "AnnounceDeparture",
            Message::CrashMsg(_) => "CrashMsg",
            Message::RecoveryMsg(_) => "RecoveryMsg",
            Message::GetRequest(_) => "GetRequest",
            Message::Read(_) => "Read",
            Message::ReadItemInformation(_) => "ReadItemInformation",
            Message::UpdateRequest(_) => "UpdateRequest",
            Message::Version(_) => "Version",
            Message::UpdateVersion(_) => "UpdateVersion",
            Message::Write(_) => "Write",
            Message::ReleaseLock(_) => "ReleaseLock",
            Message::GetResult(_) => "GetResult",
            Message::UpdateResult(_) => "UpdateResult",
            Message::PrintNodeList(_) => "PrintNodeList",
            Message::PrintItemList(_) => "PrintItemList",
            Message::Timeout(_) => "Timeout",
        }
    }
}
