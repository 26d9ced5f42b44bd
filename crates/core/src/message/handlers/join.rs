#![warn(missing_docs)]
//! Join handshake.
//!
//! The joiner learns the membership from a bootstrap peer, pulls the items it
//! will own from its clockwise neighbor, confirms their versions with the other
//! replicas, then announces itself. Any timeout before the announcement rolls
//! the joiner back to an empty node outside of the ring.

use std::collections::BTreeMap;

use super::MembershipOp;
use super::MessageHandler;
use super::MessageHandlerEvent;
use crate::dht::ItemKey;
use crate::dht::NodeKey;
use crate::error::Result;
use crate::message::types::AnnouncePresence;
use crate::message::types::InitSystem;
use crate::message::types::JoinMsg;
use crate::message::types::JoinReadOperationReq;
use crate::message::types::JoinReadOperationRes;
use crate::message::types::Message;
use crate::message::types::ReqActiveNodeList;
use crate::message::types::ReqDataItemsResponsibleFor;
use crate::message::types::ResActiveNodeList;
use crate::message::types::ResDataItemsResponsibleFor;
use crate::message::types::Timeout;
use crate::message::HandleMsg;
use crate::message::MessagePayload;
use crate::storage::Item;

/// State of an in-flight join.
#[derive(Debug)]
pub(crate) struct JoinState {
    pub attempt: u64,
    pub phase: JoinPhase,
}

#[derive(Debug)]
pub(crate) enum JoinPhase {
    AwaitingActiveList,
    AwaitingResponsibleItems {
        neighbor: NodeKey,
    },
    /// Confirmations still expected per adopted item.
    AwaitingReadRepair {
        remaining: BTreeMap<ItemKey, RepairCount>,
    },
}

/// Read repair progress of one adopted item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RepairCount {
    /// Confirmations from holders still required.
    pub needed: usize,
    /// Replicas asked that did not answer yet.
    pub open: usize,
}

impl RepairCount {
    fn new(needed: usize, asked: usize) -> Self {
        Self {
            needed,
            open: asked,
        }
    }

    fn confirm(&mut self) {
        self.needed = self.needed.saturating_sub(1);
        self.open = self.open.saturating_sub(1);
    }

    fn lacking(&mut self) {
        self.open = self.open.saturating_sub(1);
    }

    /// Either enough holders confirmed, or every replica asked has answered.
    fn settled(&self) -> bool {
        self.needed == 0 || self.open == 0
    }
}

impl MessageHandler {
    fn join_state(&self, attempt: u64) -> Option<&JoinState> {
        match &self.membership {
            Some(MembershipOp::Join(state)) if state.attempt == attempt => Some(state),
            _ => None,
        }
    }

    fn set_join_phase(&mut self, attempt: u64, phase: JoinPhase) {
        self.membership = Some(MembershipOp::Join(JoinState { attempt, phase }));
    }

    /// Forget everything built by the current join attempt.
    pub(super) fn abort_join(&mut self) -> Result<()> {
        self.membership = None;
        self.ring.clear();
        self.store.clear()?;
        self.key = None;
        Ok(())
    }

    fn complete_join(&mut self) -> Result<Vec<MessageHandlerEvent>> {
        let key = self.own_key()?;
        self.membership = None;
        self.ring.insert(key, self.addr.clone());
        let item_keys = self.store.item_keys()?;
        tracing::info!(
            "{} joined ring as {} with {} items",
            self.addr,
            key,
            item_keys.len()
        );

        Ok(self
            .ring
            .iter()
            .filter(|(k, _)| **k != key)
            .map(|(_, addr)| {
                MessageHandlerEvent::SendMessage(
                    Message::AnnouncePresence(AnnouncePresence {
                        key,
                        addr: self.addr.clone(),
                        item_keys: item_keys.clone(),
                    }),
                    addr.clone(),
                )
            })
            .collect())
    }

    pub(super) fn on_join_timeout(&mut self, timeout: &Timeout) -> Result<Vec<MessageHandlerEvent>> {
        let expired = match timeout {
            Timeout::JoinActiveList { attempt } => matches!(
                self.join_state(*attempt),
                Some(JoinState {
                    phase: JoinPhase::AwaitingActiveList,
                    ..
                })
            ),
            Timeout::JoinResponsibleItems { attempt } => matches!(
                self.join_state(*attempt),
                Some(JoinState {
                    phase: JoinPhase::AwaitingResponsibleItems { .. },
                    ..
                })
            ),
            Timeout::JoinReadRepair { attempt } => matches!(
                self.join_state(*attempt),
                Some(JoinState {
                    phase: JoinPhase::AwaitingReadRepair { .. },
                    ..
                })
            ),
            _ => false,
        };
        if expired {
            tracing::warn!("{}: join aborted on {:?}", self.addr, timeout);
            self.abort_join()?;
        }
        Ok(vec![])
    }
}

impl HandleMsg<InitSystem> for MessageHandler {
    fn handle(&mut self, _ctx: &MessagePayload, msg: &InitSystem) -> Result<Vec<MessageHandlerEvent>> {
        if self.is_busy() || self.key.is_some() {
            tracing::warn!("{}: already part of a ring, ignore InitSystem", self.addr);
            return Ok(vec![]);
        }
        self.key = Some(msg.key);
        self.ring.clear();
        self.ring.insert(msg.key, self.addr.clone());
        tracing::info!("{} founded ring as {}", self.addr, msg.key);
        Ok(vec![])
    }
}

impl HandleMsg<JoinMsg> for MessageHandler {
    fn handle(&mut self, _ctx: &MessagePayload, msg: &JoinMsg) -> Result<Vec<MessageHandlerEvent>> {
        if self.is_busy() || self.key.is_some() {
            tracing::warn!("{}: busy or already joined, ignore JoinMsg", self.addr);
            return Ok(vec![]);
        }
        self.key = Some(msg.key);
        let attempt = self.next_attempt();
        self.set_join_phase(attempt, JoinPhase::AwaitingActiveList);
        tracing::debug!("{}: join as {} via {}", self.addr, msg.key, msg.bootstrap);

        Ok(vec![
            MessageHandlerEvent::SendMessage(
                Message::ReqActiveNodeList(ReqActiveNodeList { attempt }),
                msg.bootstrap.clone(),
            ),
            self.schedule(Timeout::JoinActiveList { attempt }),
        ])
    }
}

impl HandleMsg<ReqActiveNodeList> for MessageHandler {
    fn handle(
        &mut self,
        ctx: &MessagePayload,
        msg: &ReqActiveNodeList,
    ) -> Result<Vec<MessageHandlerEvent>> {
        Ok(vec![MessageHandlerEvent::SendReportMessage(
            ctx.clone(),
            Message::ResActiveNodeList(ResActiveNodeList {
                attempt: msg.attempt,
                peers: self.ring.snapshot(),
            }),
        )])
    }
}

impl HandleMsg<ResActiveNodeList> for MessageHandler {
    fn handle(
        &mut self,
        _ctx: &MessagePayload,
        msg: &ResActiveNodeList,
    ) -> Result<Vec<MessageHandlerEvent>> {
        if !matches!(
            self.join_state(msg.attempt),
            Some(JoinState {
                phase: JoinPhase::AwaitingActiveList,
                ..
            })
        ) {
            tracing::debug!("{}: stale ResActiveNodeList", self.addr);
            return Ok(vec![]);
        }

        let key = self.own_key()?;
        if msg.peers.contains_key(&key) {
            tracing::warn!("{}: key {} already in ring, abort join", self.addr, key);
            self.abort_join()?;
            return Ok(vec![]);
        }

        self.ring.replace(msg.peers.clone());
        let Some(neighbor) = self.ring.clockwise_neighbor(key) else {
            tracing::warn!("{}: bootstrap reported an empty ring, abort join", self.addr);
            self.abort_join()?;
            return Ok(vec![]);
        };
        let neighbor_addr = self.peer_addr(neighbor)?;
        self.set_join_phase(msg.attempt, JoinPhase::AwaitingResponsibleItems { neighbor });

        Ok(vec![
            MessageHandlerEvent::SendMessage(
                Message::ReqDataItemsResponsibleFor(ReqDataItemsResponsibleFor {
                    attempt: msg.attempt,
                    joining_key: key,
                }),
                neighbor_addr,
            ),
            self.schedule(Timeout::JoinResponsibleItems {
                attempt: msg.attempt,
            }),
        ])
    }
}

impl HandleMsg<ReqDataItemsResponsibleFor> for MessageHandler {
    fn handle(
        &mut self,
        ctx: &MessagePayload,
        msg: &ReqDataItemsResponsibleFor,
    ) -> Result<Vec<MessageHandlerEvent>> {
        let items: Vec<Item> = self
            .store
            .items()?
            .into_iter()
            .filter(|item| {
                self.ring
                    .responsible_with(item.key, msg.joining_key)
                    .contains(&msg.joining_key)
            })
            .collect();
        tracing::debug!(
            "{}: hand {} items to joiner {}",
            self.addr,
            items.len(),
            msg.joining_key
        );

        Ok(vec![MessageHandlerEvent::SendReportMessage(
            ctx.clone(),
            Message::ResDataItemsResponsibleFor(ResDataItemsResponsibleFor {
                attempt: msg.attempt,
                items,
            }),
        )])
    }
}

impl HandleMsg<ResDataItemsResponsibleFor> for MessageHandler {
    fn handle(
        &mut self,
        _ctx: &MessagePayload,
        msg: &ResDataItemsResponsibleFor,
    ) -> Result<Vec<MessageHandlerEvent>> {
        let neighbor = match self.join_state(msg.attempt) {
            Some(JoinState {
                phase: JoinPhase::AwaitingResponsibleItems { neighbor },
                ..
            }) => *neighbor,
            _ => {
                tracing::debug!("{}: stale ResDataItemsResponsibleFor", self.addr);
                return Ok(vec![]);
            }
        };
        let key = self.own_key()?;
        for item in &msg.items {
            self.store.merge(item.clone())?;
        }

        // Ask every other replica of each adopted item, on the ring without us.
        let needed = self.config.read_quorum.saturating_sub(1);
        let mut remaining = BTreeMap::new();
        let mut requests: BTreeMap<NodeKey, Vec<Item>> = BTreeMap::new();
        for item in &msg.items {
            let others: Vec<NodeKey> = self
                .ring
                .responsible(item.key)
                .into_iter()
                .filter(|k| *k != neighbor && *k != key)
                .collect();
            let quorum = needed.min(others.len());
            if quorum == 0 {
                continue;
            }
            remaining.insert(item.key, RepairCount::new(quorum, others.len()));
            for k in others {
                requests.entry(k).or_default().push(item.clone());
            }
        }

        if remaining.is_empty() {
            return self.complete_join();
        }

        self.set_join_phase(msg.attempt, JoinPhase::AwaitingReadRepair { remaining });
        let mut events: Vec<MessageHandlerEvent> = requests
            .into_iter()
            .filter_map(|(k, items)| {
                self.send_to_peer(
                    k,
                    Message::JoinReadOperationReq(JoinReadOperationReq {
                        attempt: msg.attempt,
                        items,
                    }),
                )
            })
            .collect();
        events.push(self.schedule(Timeout::JoinReadRepair {
            attempt: msg.attempt,
        }));
        Ok(events)
    }
}

impl HandleMsg<JoinReadOperationReq> for MessageHandler {
    fn handle(
        &mut self,
        ctx: &MessagePayload,
        msg: &JoinReadOperationReq,
    ) -> Result<Vec<MessageHandlerEvent>> {
        let mut items = Vec::with_capacity(msg.items.len());
        let mut missing = vec![];
        for item in &msg.items {
            match self.store.item(item.key)? {
                Some(local) => items.push(local.newer(item.clone())),
                None => missing.push(item.key),
            }
        }

        Ok(vec![MessageHandlerEvent::SendReportMessage(
            ctx.clone(),
            Message::JoinReadOperationRes(JoinReadOperationRes {
                attempt: msg.attempt,
                items,
                missing,
            }),
        )])
    }
}

impl HandleMsg<JoinReadOperationRes> for MessageHandler {
    fn handle(
        &mut self,
        _ctx: &MessagePayload,
        msg: &JoinReadOperationRes,
    ) -> Result<Vec<MessageHandlerEvent>> {
        let done = match &mut self.membership {
            Some(MembershipOp::Join(JoinState {
                attempt,
                phase: JoinPhase::AwaitingReadRepair { remaining },
            })) if *attempt == msg.attempt => {
                for item in &msg.items {
                    if let Some(count) = remaining.get_mut(&item.key) {
                        self.store.merge(item.clone())?;
                        count.confirm();
                    }
                }
                for key in &msg.missing {
                    if let Some(count) = remaining.get_mut(key) {
                        count.lacking();
                    }
                }
                remaining.retain(|_, count| !count.settled());
                remaining.is_empty()
            }
            _ => {
                tracing::debug!("{}: stale JoinReadOperationRes", self.addr);
                return Ok(vec![]);
            }
        };

        if done {
            self.complete_join()
        } else {
            Ok(vec![])
        }
    }
}

impl HandleMsg<AnnouncePresence> for MessageHandler {
    fn handle(
        &mut self,
        _ctx: &MessagePayload,
        msg: &AnnouncePresence,
    ) -> Result<Vec<MessageHandlerEvent>> {
        self.ring.insert(msg.key, msg.addr.clone());
        let Some(me) = self.key else {
            return Ok(vec![]);
        };
        for item_key in &msg.item_keys {
            if self.store.item(*item_key)?.is_some() && !self.ring.is_responsible(me, *item_key) {
                self.store.remove(*item_key)?;
                tracing::debug!(
                    "{}: evict item {} after {} joined",
                    self.addr,
                    item_key,
                    msg.key
                );
            }
        }
        Ok(vec![])
    }
}
