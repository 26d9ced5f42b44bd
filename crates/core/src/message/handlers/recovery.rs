#![warn(missing_docs)]
//! Crash and recovery.

use super::MembershipOp;
use super::MessageHandler;
use super::MessageHandlerEvent;
use super::NodeMode;
use crate::error::Result;
use crate::message::types::CrashMsg;
use crate::message::types::Message;
use crate::message::types::RecoveryMsg;
use crate::message::types::ReqActiveNodeList;
use crate::message::types::ReqDataItemsResponsibleForRecovery;
use crate::message::types::ResActiveNodeList;
use crate::message::types::ResDataItemsResponsibleFor;
use crate::message::types::Timeout;
use crate::message::HandleCrashedMsg;
use crate::message::HandleMsg;
use crate::message::MessagePayload;
use crate::storage::Item;

/// State of an in-flight recovery.
#[derive(Debug)]
pub(crate) struct RecoveryState {
    pub attempt: u64,
    pub phase: RecoveryPhase,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum RecoveryPhase {
    AwaitingActiveList,
    AwaitingResponsibleItems,
}

impl MessageHandler {
    fn recovery_phase(&self, attempt: u64) -> Option<&RecoveryPhase> {
        match &self.membership {
            Some(MembershipOp::Recovery(state)) if state.attempt == attempt => Some(&state.phase),
            _ => None,
        }
    }

    fn complete_recovery(&mut self, items: &[Item]) -> Result<Vec<MessageHandlerEvent>> {
        for item in items {
            self.store.merge(item.clone())?;
        }
        // Negotiations seen before the crash are long timed out.
        self.store.clear_locks()?;
        self.requests.clear();
        self.membership = None;
        self.mode = NodeMode::Active;
        tracing::info!(
            "{} recovered with {} items",
            self.addr,
            self.store.count()?
        );
        Ok(vec![])
    }

    pub(super) fn on_recovery_timeout(
        &mut self,
        timeout: &Timeout,
    ) -> Result<Vec<MessageHandlerEvent>> {
        match timeout {
            Timeout::RecoveryActiveList { attempt }
                if self.recovery_phase(*attempt) == Some(&RecoveryPhase::AwaitingActiveList) =>
            {
                tracing::warn!("{}: recovery aborted, no active node list", self.addr);
                self.ring.clear();
                self.membership = None;
            }
            Timeout::RecoveryResponsibleItems { attempt, backup }
                if self.recovery_phase(*attempt)
                    == Some(&RecoveryPhase::AwaitingResponsibleItems) =>
            {
                tracing::warn!(
                    "{}: recovery aborted, restore {} items",
                    self.addr,
                    backup.len()
                );
                self.ring.clear();
                for item in backup {
                    self.store.put(item.clone())?;
                }
                self.membership = None;
            }
            _ => tracing::debug!("{}: stale recovery timeout", self.addr),
        }
        Ok(vec![])
    }
}

impl HandleMsg<CrashMsg> for MessageHandler {
    fn handle(&mut self, _ctx: &MessagePayload, _msg: &CrashMsg) -> Result<Vec<MessageHandlerEvent>> {
        // A crashed node ignores its own membership timers, settle them now.
        match self.membership.take() {
            Some(MembershipOp::Join(_)) => self.abort_join()?,
            Some(MembershipOp::Leave(_)) => self.rollback_leave()?,
            _ => {}
        }
        self.mode = NodeMode::Crashed;
        tracing::warn!("{} crashed", self.addr);
        Ok(vec![])
    }
}

impl HandleMsg<ReqDataItemsResponsibleForRecovery> for MessageHandler {
    fn handle(
        &mut self,
        ctx: &MessagePayload,
        msg: &ReqDataItemsResponsibleForRecovery,
    ) -> Result<Vec<MessageHandlerEvent>> {
        let items: Vec<Item> = self
            .store
            .items()?
            .into_iter()
            .filter(|item| {
                !msg.held_keys.contains(&item.key)
                    && self.ring.responsible_with(item.key, msg.key).contains(&msg.key)
            })
            .collect();
        tracing::debug!(
            "{}: send {} items to recovering {}",
            self.addr,
            items.len(),
            msg.key
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

impl HandleCrashedMsg<RecoveryMsg> for MessageHandler {
    fn handle_crashed(
        &mut self,
        _ctx: &MessagePayload,
        msg: &RecoveryMsg,
    ) -> Result<Vec<MessageHandlerEvent>> {
        if self.is_busy() {
            tracing::warn!("{}: recovery in flight, ignore RecoveryMsg", self.addr);
            return Ok(vec![]);
        }
        if self.key.is_none() {
            tracing::warn!("{}: never joined, nothing to recover", self.addr);
            return Ok(vec![]);
        }
        self.ring.clear();
        let attempt = self.next_attempt();
        self.membership = Some(MembershipOp::Recovery(RecoveryState {
            attempt,
            phase: RecoveryPhase::AwaitingActiveList,
        }));
        tracing::debug!("{}: recover via {}", self.addr, msg.bootstrap);

        Ok(vec![
            MessageHandlerEvent::SendMessage(
                Message::ReqActiveNodeList(ReqActiveNodeList { attempt }),
                msg.bootstrap.clone(),
            ),
            self.schedule(Timeout::RecoveryActiveList { attempt }),
        ])
    }
}

impl HandleCrashedMsg<ResActiveNodeList> for MessageHandler {
    fn handle_crashed(
        &mut self,
        _ctx: &MessagePayload,
        msg: &ResActiveNodeList,
    ) -> Result<Vec<MessageHandlerEvent>> {
        if self.recovery_phase(msg.attempt) != Some(&RecoveryPhase::AwaitingActiveList) {
            tracing::debug!("{}: stale ResActiveNodeList (crashed)", self.addr);
            return Ok(vec![]);
        }
        let key = self.own_key()?;
        self.ring.replace(msg.peers.clone());
        self.ring.insert(key, self.addr.clone());

        let mut backup = vec![];
        for item in self.store.items()? {
            if !self.ring.is_responsible(key, item.key) {
                self.store.remove(item.key)?;
                backup.push(item);
            }
        }

        let Some(neighbor) = self.ring.clockwise_neighbor(key) else {
            return self.complete_recovery(&[]);
        };
        let neighbor_addr = self.peer_addr(neighbor)?;
        self.membership = Some(MembershipOp::Recovery(RecoveryState {
            attempt: msg.attempt,
            phase: RecoveryPhase::AwaitingResponsibleItems,
        }));

        Ok(vec![
            MessageHandlerEvent::SendMessage(
                Message::ReqDataItemsResponsibleForRecovery(ReqDataItemsResponsibleForRecovery {
                    attempt: msg.attempt,
                    key,
                    held_keys: self.store.item_keys()?,
                }),
                neighbor_addr,
            ),
            self.schedule(Timeout::RecoveryResponsibleItems {
                attempt: msg.attempt,
                backup,
            }),
        ])
    }
}

impl HandleCrashedMsg<ResDataItemsResponsibleFor> for MessageHandler {
    fn handle_crashed(
        &mut self,
        _ctx: &MessagePayload,
        msg: &ResDataItemsResponsibleFor,
    ) -> Result<Vec<MessageHandlerEvent>> {
        if self.recovery_phase(msg.attempt) != Some(&RecoveryPhase::AwaitingResponsibleItems) {
            tracing::debug!("{}: stale ResDataItemsResponsibleFor (crashed)", self.addr);
            return Ok(vec![]);
        }
        self.complete_recovery(&msg.items)
    }
}
