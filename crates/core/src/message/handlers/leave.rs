#![warn(missing_docs)]
//! Leave handshake.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use super::MembershipOp;
use super::MessageHandler;
use super::MessageHandlerEvent;
use crate::dht::NodeKey;
use crate::error::Result;
use crate::message::types::AnnounceDeparture;
use crate::message::types::DepartureAck;
use crate::message::types::LeaveMsg;
use crate::message::types::Message;
use crate::message::types::PreLeaveStatusCheck;
use crate::message::types::Timeout;
use crate::message::HandleMsg;
use crate::message::MessagePayload;
use crate::storage::Item;

/// State of an in-flight leave.
#[derive(Debug)]
pub(crate) struct LeaveState {
    pub attempt: u64,
    /// Future owners that did not ack yet.
    pub awaiting: BTreeSet<NodeKey>,
}

impl MessageHandler {
    /// Items each peer takes over once `key` is out of the ring.
    /// Same answer whether `key` is still in the view or already removed.
    fn handoff_sets(&self, key: NodeKey) -> Result<BTreeMap<NodeKey, Vec<Item>>> {
        let mut handoff: BTreeMap<NodeKey, Vec<Item>> = BTreeMap::new();
        for item in self.store.items()? {
            let before = self.ring.responsible_with(item.key, key);
            for peer in self.ring.responsible_without(item.key, key) {
                if !before.contains(&peer) {
                    handoff.entry(peer).or_default().push(item.clone());
                }
            }
        }
        Ok(handoff)
    }

    /// Settle requests coordinated while leaving, then hand off the store as it is now.
    fn complete_leave(&mut self, key: NodeKey) -> Result<Vec<MessageHandlerEvent>> {
        let mut events = self.abort_requests()?;
        let mut handoff = self.handoff_sets(key)?;
        let announces: Vec<MessageHandlerEvent> = self
            .ring
            .iter()
            .filter(|(k, _)| **k != key)
            .map(|(k, addr)| {
                MessageHandlerEvent::SendMessage(
                    Message::AnnounceDeparture(AnnounceDeparture {
                        key,
                        items: handoff.remove(k).unwrap_or_default(),
                    }),
                    addr.clone(),
                )
            })
            .collect();
        events.extend(announces);

        self.membership = None;
        self.ring.clear();
        self.store.clear()?;
        self.key = None;
        tracing::info!("{} left ring, was {}", self.addr, key);
        Ok(events)
    }

    /// Put the leaver back into its own view.
    pub(super) fn rollback_leave(&mut self) -> Result<()> {
        self.membership = None;
        let key = self.own_key()?;
        self.ring.insert(key, self.addr.clone());
        Ok(())
    }

    pub(super) fn on_leave_timeout(&mut self, attempt: u64) -> Result<Vec<MessageHandlerEvent>> {
        let missing = match &self.membership {
            Some(MembershipOp::Leave(state)) if state.attempt == attempt => state.awaiting.clone(),
            _ => {
                tracing::debug!("{}: stale leave timeout", self.addr);
                return Ok(vec![]);
            }
        };
        tracing::warn!("{}: leave aborted, {:?} did not ack", self.addr, missing);
        self.rollback_leave()?;
        Ok(vec![])
    }
}

impl HandleMsg<LeaveMsg> for MessageHandler {
    fn handle(&mut self, _ctx: &MessagePayload, _msg: &LeaveMsg) -> Result<Vec<MessageHandlerEvent>> {
        if self.is_busy() {
            tracing::warn!("{}: busy, ignore LeaveMsg", self.addr);
            return Ok(vec![]);
        }
        let Some(key) = self.key.filter(|k| self.ring.contains(*k)) else {
            tracing::warn!("{}: not in ring, ignore LeaveMsg", self.addr);
            return Ok(vec![]);
        };

        // Pending writes would otherwise commit after the store is cleared.
        let mut events = self.abort_requests()?;
        let awaiting: BTreeSet<NodeKey> = self.handoff_sets(key)?.into_keys().collect();
        self.ring.remove(key);

        if awaiting.is_empty() {
            events.extend(self.complete_leave(key)?);
            return Ok(events);
        }

        let attempt = self.next_attempt();
        events.extend(awaiting.iter().filter_map(|k| {
            self.send_to_peer(
                *k,
                Message::PreLeaveStatusCheck(PreLeaveStatusCheck { attempt }),
            )
        }));
        events.push(self.schedule(Timeout::LeaveAcks { attempt }));
        tracing::debug!("{}: leaving, waiting acks of {:?}", self.addr, awaiting);

        self.membership = Some(MembershipOp::Leave(LeaveState { attempt, awaiting }));
        Ok(events)
    }
}

impl HandleMsg<PreLeaveStatusCheck> for MessageHandler {
    fn handle(
        &mut self,
        ctx: &MessagePayload,
        msg: &PreLeaveStatusCheck,
    ) -> Result<Vec<MessageHandlerEvent>> {
        Ok(vec![MessageHandlerEvent::SendReportMessage(
            ctx.clone(),
            Message::DepartureAck(DepartureAck {
                attempt: msg.attempt,
                key: self.own_key()?,
            }),
        )])
    }
}

impl HandleMsg<DepartureAck> for MessageHandler {
    fn handle(
        &mut self,
        _ctx: &MessagePayload,
        msg: &DepartureAck,
    ) -> Result<Vec<MessageHandlerEvent>> {
        let done = match &mut self.membership {
            Some(MembershipOp::Leave(state)) if state.attempt == msg.attempt => {
                state.awaiting.remove(&msg.key);
                state.awaiting.is_empty()
            }
            _ => {
                tracing::debug!("{}: stale DepartureAck from {}", self.addr, msg.key);
                return Ok(vec![]);
            }
        };
        if !done {
            return Ok(vec![]);
        }

        let key = self.own_key()?;
        self.complete_leave(key)
    }
}

impl HandleMsg<AnnounceDeparture> for MessageHandler {
    fn handle(
        &mut self,
        _ctx: &MessagePayload,
        msg: &AnnounceDeparture,
    ) -> Result<Vec<MessageHandlerEvent>> {
        self.ring.remove(msg.key);
        for item in &msg.items {
            self.store.merge(item.clone())?;
        }
        tracing::debug!(
            "{}: {} departed, took {} items",
            self.addr,
            msg.key,
            msg.items.len()
        );
        Ok(vec![])
    }
}
