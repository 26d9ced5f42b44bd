#![warn(missing_docs)]
//! Quorum reads and writes, coordinator and replica sides.
//!
//! Writers are serialized by a per-item [Lock]: the coordinator takes the lock
//! locally and asks every other replica to grant it together with its version.
//! A replica holding another lock stays silent, so a conflicting write never
//! reaches `W` votes and times out.

use super::MessageHandler;
use super::MessageHandlerEvent;
use crate::dht::ItemKey;
use crate::dht::NodeAddr;
use crate::dht::NodeKey;
use crate::error::Error;
use crate::error::Result;
use crate::message::types::GetRequest;
use crate::message::types::GetResult;
use crate::message::types::Message;
use crate::message::types::OpResult;
use crate::message::types::Read;
use crate::message::types::ReadItemInformation;
use crate::message::types::ReleaseLock;
use crate::message::types::Timeout;
use crate::message::types::UpdateRequest;
use crate::message::types::UpdateResult;
use crate::message::types::UpdateVersion;
use crate::message::types::Version;
use crate::message::types::Write;
use crate::message::HandleMsg;
use crate::message::MessagePayload;
use crate::storage::Item;
use crate::storage::Lock;

/// A request waiting for its quorum on the coordinator.
#[derive(Debug)]
pub(crate) struct PendingRequest {
    client: NodeAddr,
    replies: usize,
    responsible: Vec<NodeKey>,
    op: PendingOp,
}

#[derive(Debug)]
enum PendingOp {
    Get {
        item_key: ItemKey,
        freshest: Option<Item>,
    },
    Update {
        item: Item,
        lock: Lock,
        max_version: u64,
    },
}

fn get_result(result: OpResult, item_key: ItemKey, item: Option<Item>) -> Message {
    Message::GetResult(GetResult {
        result,
        item_key,
        item,
    })
}

fn update_result(result: OpResult, item: Item) -> Message {
    Message::UpdateResult(UpdateResult { result, item })
}

impl MessageHandler {
    /// Coordinator counts as a replica when responsible for the key.
    fn coordinates_replica(&self, responsible: &[NodeKey]) -> bool {
        self.key.map_or(false, |k| responsible.contains(&k))
    }

    fn finalize_update(&mut self, req: PendingRequest) -> Result<Vec<MessageHandlerEvent>> {
        let PendingOp::Update {
            item,
            lock,
            max_version,
        } = req.op
        else {
            return Ok(vec![]);
        };
        let written = Item {
            version: max_version + 1,
            ..item
        };
        tracing::info!("{}: write {} committed by {}", self.addr, written, lock);

        let mut events = vec![MessageHandlerEvent::SendMessage(
            update_result(OpResult::Success, written.clone()),
            req.client,
        )];
        for k in req.responsible {
            if self.is_self(k) {
                self.store.release_if_matching(written.key, &lock)?;
                self.store.merge(written.clone())?;
            } else if let Some(ev) = self.send_to_peer(
                k,
                Message::Write(Write {
                    lock: lock.clone(),
                    item: written.clone(),
                }),
            ) {
                events.push(ev);
            }
        }
        Ok(events)
    }

    pub(super) fn on_request_timeout(
        &mut self,
        request_id: u64,
    ) -> Result<Vec<MessageHandlerEvent>> {
        let Some(req) = self.requests.remove(&request_id) else {
            tracing::debug!("{}: request {} already done", self.addr, request_id);
            return Ok(vec![]);
        };
        self.fail_request(req)
    }

    /// Answer ERROR to every pending request and release the locks they took.
    /// Runs while the ring view still routes to the voters.
    pub(super) fn abort_requests(&mut self) -> Result<Vec<MessageHandlerEvent>> {
        let requests = std::mem::take(&mut self.requests);
        let mut events = vec![];
        for (_, req) in requests {
            events.extend(self.fail_request(req)?);
        }
        Ok(events)
    }

    fn fail_request(&mut self, req: PendingRequest) -> Result<Vec<MessageHandlerEvent>> {
        match req.op {
            PendingOp::Get { item_key, .. } => {
                tracing::warn!(
                    "{}: read of {} failed with {} replies",
                    self.addr,
                    item_key,
                    req.replies
                );
                Ok(vec![MessageHandlerEvent::SendMessage(
                    get_result(OpResult::Error, item_key, None),
                    req.client,
                )])
            }
            PendingOp::Update { item, lock, .. } => {
                tracing::warn!(
                    "{}: write of {} failed with {} votes",
                    self.addr,
                    item.key,
                    req.replies
                );
                self.store.release_if_matching(item.key, &lock)?;
                let mut events: Vec<MessageHandlerEvent> = req
                    .responsible
                    .iter()
                    .filter(|k| !self.is_self(**k))
                    .filter_map(|k| {
                        self.send_to_peer(
                            *k,
                            Message::ReleaseLock(ReleaseLock {
                                lock: lock.clone(),
                                item_key: item.key,
                            }),
                        )
                    })
                    .collect();
                events.push(MessageHandlerEvent::SendMessage(
                    update_result(OpResult::Error, item),
                    req.client,
                ));
                Ok(events)
            }
        }
    }
}

impl HandleMsg<GetRequest> for MessageHandler {
    fn handle(&mut self, ctx: &MessagePayload, msg: &GetRequest) -> Result<Vec<MessageHandlerEvent>> {
        let client = ctx.sender.clone().ok_or(Error::MissingSender)?;
        let request_id = self.next_request_id();
        let responsible = self.ring.responsible(msg.item_key);

        let mut replies = 0;
        let mut freshest = None;
        if self.coordinates_replica(&responsible) && self.store.is_unlocked(msg.item_key)? {
            if let Some(local) = self.store.item(msg.item_key)? {
                replies = 1;
                freshest = Some(local);
            }
        }

        if replies >= self.config.read_quorum {
            return Ok(vec![MessageHandlerEvent::SendMessage(
                get_result(OpResult::Success, msg.item_key, freshest),
                client,
            )]);
        }

        let mut events: Vec<MessageHandlerEvent> = responsible
            .iter()
            .filter(|k| !self.is_self(**k))
            .filter_map(|k| {
                self.send_to_peer(
                    *k,
                    Message::Read(Read {
                        request_id,
                        item_key: msg.item_key,
                    }),
                )
            })
            .collect();
        events.push(self.schedule(Timeout::Request { request_id }));

        self.requests.insert(request_id, PendingRequest {
            client,
            replies,
            responsible,
            op: PendingOp::Get {
                item_key: msg.item_key,
                freshest,
            },
        });
        Ok(events)
    }
}

impl HandleMsg<Read> for MessageHandler {
    fn handle(&mut self, ctx: &MessagePayload, msg: &Read) -> Result<Vec<MessageHandlerEvent>> {
        if !self.store.is_unlocked(msg.item_key)? {
            tracing::debug!("{}: item {} under write, no read", self.addr, msg.item_key);
            return Ok(vec![]);
        }
        let Some(item) = self.store.item(msg.item_key)? else {
            return Ok(vec![]);
        };
        Ok(vec![MessageHandlerEvent::SendReportMessage(
            ctx.clone(),
            Message::ReadItemInformation(ReadItemInformation {
                request_id: msg.request_id,
                item,
            }),
        )])
    }
}

impl HandleMsg<ReadItemInformation> for MessageHandler {
    fn handle(
        &mut self,
        _ctx: &MessagePayload,
        msg: &ReadItemInformation,
    ) -> Result<Vec<MessageHandlerEvent>> {
        let reached = match self.requests.get_mut(&msg.request_id) {
            Some(PendingRequest {
                replies,
                op: PendingOp::Get { item_key, freshest },
                ..
            }) if *item_key == msg.item.key => {
                *freshest = Some(match freshest.take() {
                    Some(seen) => seen.newer(msg.item.clone()),
                    None => msg.item.clone(),
                });
                *replies += 1;
                *replies >= self.config.read_quorum
            }
            _ => {
                tracing::debug!("{}: late read reply {}", self.addr, msg.request_id);
                return Ok(vec![]);
            }
        };
        if !reached {
            return Ok(vec![]);
        }

        match self.requests.remove(&msg.request_id) {
            Some(PendingRequest {
                client,
                op: PendingOp::Get { item_key, freshest },
                ..
            }) => Ok(vec![MessageHandlerEvent::SendMessage(
                get_result(OpResult::Success, item_key, freshest),
                client,
            )]),
            _ => Ok(vec![]),
        }
    }
}

impl HandleMsg<UpdateRequest> for MessageHandler {
    fn handle(
        &mut self,
        ctx: &MessagePayload,
        msg: &UpdateRequest,
    ) -> Result<Vec<MessageHandlerEvent>> {
        let client = ctx.sender.clone().ok_or(Error::MissingSender)?;
        let request_id = self.next_request_id();
        let item_key = msg.item.key;
        let lock = Lock {
            owner: msg.client_name.clone(),
            coordinator: self.key.unwrap_or_default(),
            request_id,
        };

        // The candidate carries a fresh request id, so only a free item can take it.
        if !self.store.is_unlocked(item_key)? {
            tracing::info!(
                "{}: item {} is locked, reject write of {}",
                self.addr,
                item_key,
                msg.client_name
            );
            return Ok(vec![MessageHandlerEvent::SendMessage(
                update_result(OpResult::Error, msg.item.clone()),
                client,
            )]);
        }

        let responsible = self.ring.responsible(item_key);
        let mut replies = 0;
        let mut max_version = 0;
        if self.coordinates_replica(&responsible) {
            let granted = self.store.try_grant(item_key, &lock)?;
            debug_assert!(granted, "free item refused its coordinator lock");
            replies = 1;
            max_version = self.store.version(item_key)?;
        }

        let req = PendingRequest {
            client,
            replies,
            responsible,
            op: PendingOp::Update {
                item: msg.item.clone(),
                lock: lock.clone(),
                max_version,
            },
        };
        if replies >= self.config.write_quorum {
            return self.finalize_update(req);
        }

        let mut events: Vec<MessageHandlerEvent> = req
            .responsible
            .iter()
            .filter(|k| !self.is_self(**k))
            .filter_map(|k| {
                self.send_to_peer(
                    *k,
                    Message::Version(Version {
                        lock: lock.clone(),
                        request_id,
                        item: msg.item.clone(),
                    }),
                )
            })
            .collect();
        events.push(self.schedule(Timeout::Request { request_id }));
        self.requests.insert(request_id, req);
        Ok(events)
    }
}

impl HandleMsg<Version> for MessageHandler {
    fn handle(&mut self, ctx: &MessagePayload, msg: &Version) -> Result<Vec<MessageHandlerEvent>> {
        if !self.store.try_grant(msg.item.key, &msg.lock)? {
            tracing::debug!(
                "{}: item {} locked, no vote for {}",
                self.addr,
                msg.item.key,
                msg.lock
            );
            return Ok(vec![]);
        }
        Ok(vec![MessageHandlerEvent::SendReportMessage(
            ctx.clone(),
            Message::UpdateVersion(UpdateVersion {
                lock: msg.lock.clone(),
                request_id: msg.request_id,
                item_key: msg.item.key,
                version: self.store.version(msg.item.key)?,
            }),
        )])
    }
}

impl HandleMsg<UpdateVersion> for MessageHandler {
    fn handle(
        &mut self,
        ctx: &MessagePayload,
        msg: &UpdateVersion,
    ) -> Result<Vec<MessageHandlerEvent>> {
        let reached = match self.requests.get_mut(&msg.request_id) {
            Some(PendingRequest {
                replies,
                op:
                    PendingOp::Update {
                        lock, max_version, ..
                    },
                ..
            }) if *lock == msg.lock => {
                *max_version = (*max_version).max(msg.version);
                *replies += 1;
                *replies >= self.config.write_quorum
            }
            _ => {
                // The voter may have granted after our Write or ReleaseLock overtook it.
                tracing::debug!("{}: late vote {}, release it", self.addr, msg.request_id);
                return Ok(vec![MessageHandlerEvent::SendReportMessage(
                    ctx.clone(),
                    Message::ReleaseLock(ReleaseLock {
                        lock: msg.lock.clone(),
                        item_key: msg.item_key,
                    }),
                )]);
            }
        };
        if !reached {
            return Ok(vec![]);
        }

        match self.requests.remove(&msg.request_id) {
            Some(req) => self.finalize_update(req),
            None => Ok(vec![]),
        }
    }
}

impl HandleMsg<Write> for MessageHandler {
    fn handle(&mut self, _ctx: &MessagePayload, msg: &Write) -> Result<Vec<MessageHandlerEvent>> {
        self.store.release_if_matching(msg.item.key, &msg.lock)?;
        if !self.store.merge(msg.item.clone())? {
            tracing::debug!("{}: keep newer copy of {}", self.addr, msg.item.key);
        }
        Ok(vec![])
    }
}

impl HandleMsg<ReleaseLock> for MessageHandler {
    fn handle(
        &mut self,
        _ctx: &MessagePayload,
        msg: &ReleaseLock,
    ) -> Result<Vec<MessageHandlerEvent>> {
        if self.store.release_if_matching(msg.item_key, &msg.lock)? {
            tracing::debug!("{}: released {} on {}", self.addr, msg.lock, msg.item_key);
        }
        Ok(vec![])
    }
}
