//! A deterministic network of handlers.
//!
//! Payloads sit in a queue until a test delivers them and timers fire only when
//! a test asks for it, so every interleaving is reproducible.
use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RingConfig;
use crate::dht::ItemKey;
use crate::dht::NodeAddr;
use crate::dht::NodeKey;
use crate::inspect::NodeInspect;
use crate::message::types::GetRequest;
use crate::message::types::GetResult;
use crate::message::types::InitSystem;
use crate::message::types::JoinMsg;
use crate::message::types::Timeout;
use crate::message::types::UpdateRequest;
use crate::message::types::UpdateResult;
use crate::message::Message;
use crate::message::MessageHandler;
use crate::message::MessageHandlerEvent;
use crate::message::MessagePayload;
use crate::storage::Item;
use crate::swarm::Swarm;
use crate::swarm::SwarmBuilder;
use crate::transport::LatencyConfig;
use crate::transport::MemoryTransport;

mod test_join;
mod test_leave;
mod test_quorum;

pub fn node_addr(key: NodeKey) -> NodeAddr {
    NodeAddr::new(format!("node-{key}"))
}

pub fn client_addr(name: &str) -> NodeAddr {
    NodeAddr::new(format!("client-{name}"))
}

pub struct SimNetwork {
    config: RingConfig,
    nodes: BTreeMap<NodeAddr, MessageHandler>,
    queue: VecDeque<MessagePayload>,
    timers: Vec<(NodeAddr, Timeout)>,
    /// Payloads addressed to endpoints that are not nodes, i.e. clients.
    pub outbox: Vec<MessagePayload>,
    /// Every payload delivered so far.
    pub delivered: Vec<MessagePayload>,
}

impl SimNetwork {
    pub fn new(config: RingConfig) -> Self {
        config.validate().unwrap();
        Self {
            config,
            nodes: BTreeMap::new(),
            queue: VecDeque::new(),
            timers: vec![],
            outbox: vec![],
            delivered: vec![],
        }
    }

    /// Create a handler for `key`, outside of any ring.
    pub fn spawn(&mut self, key: NodeKey) -> NodeAddr {
        let addr = node_addr(key);
        self.nodes
            .insert(addr.clone(), MessageHandler::new(addr.clone(), self.config));
        addr
    }

    /// Found the ring with `first` then join every other key through it.
    pub fn ring_of(config: RingConfig, keys: &[NodeKey]) -> Self {
        let mut net = Self::new(config);
        let first = keys[0];
        net.spawn(first);
        net.post(first, Message::InitSystem(InitSystem { key: first }));
        net.deliver_all();
        for key in &keys[1..] {
            net.join(*key, first);
        }
        net
    }

    /// Spawn `key` and run its join through `bootstrap` to completion.
    pub fn join(&mut self, key: NodeKey, bootstrap: NodeKey) {
        self.spawn(key);
        self.post(
            key,
            Message::JoinMsg(JoinMsg {
                key,
                bootstrap: node_addr(bootstrap),
            }),
        );
        self.deliver_all();
    }

    /// Harness message to a node.
    pub fn post(&mut self, key: NodeKey, msg: Message) {
        self.queue
            .push_back(MessagePayload::new(msg, None, node_addr(key)));
    }

    /// Client message to a node.
    pub fn post_from(&mut self, client: &NodeAddr, key: NodeKey, msg: Message) {
        self.queue
            .push_back(MessagePayload::new_send(msg, client, &node_addr(key)));
    }

    pub fn update(&mut self, client: &str, coordinator: NodeKey, item: Item) {
        self.post_from(
            &client_addr(client),
            coordinator,
            Message::UpdateRequest(UpdateRequest {
                client_name: client.to_string(),
                item,
            }),
        );
    }

    pub fn get(&mut self, client: &str, coordinator: NodeKey, item_key: ItemKey) {
        self.post_from(
            &client_addr(client),
            coordinator,
            Message::GetRequest(GetRequest { item_key }),
        );
    }

    fn apply(&mut self, ctx: &MessagePayload, events: Vec<MessageHandlerEvent>) {
        for ev in events {
            match ev {
                MessageHandlerEvent::SendMessage(msg, dest) => {
                    self.queue
                        .push_back(MessagePayload::new_send(msg, &ctx.destination, &dest));
                }
                MessageHandlerEvent::SendReportMessage(payload, msg) => {
                    self.queue.push_back(payload.new_report(msg).unwrap());
                }
                MessageHandlerEvent::ScheduleTimeout(_, timeout) => {
                    self.timers.push((ctx.destination.clone(), timeout));
                }
            }
        }
    }

    /// Deliver one queued payload, return false when the queue is empty.
    pub fn step(&mut self) -> bool {
        let Some(payload) = self.queue.pop_front() else {
            return false;
        };
        self.delivered.push(payload.clone());
        let handled = self
            .nodes
            .get_mut(&payload.destination)
            .map(|handler| handler.handle_message(&payload));
        match handled {
            Some(Ok(events)) => self.apply(&payload, events),
            Some(Err(e)) => tracing::error!("handler failed: {}", e),
            None => self.outbox.push(payload),
        }
        true
    }

    /// Deliver until no payload is in flight, timers stay pending.
    pub fn deliver_all(&mut self) {
        while self.step() {}
    }

    /// Fire every pending timer, then deliver whatever they caused.
    pub fn fire_timeouts(&mut self) {
        let timers = std::mem::take(&mut self.timers);
        for (addr, timeout) in timers {
            self.queue.push_back(MessagePayload::new_send(
                Message::Timeout(timeout),
                &addr,
                &addr,
            ));
        }
        self.deliver_all();
    }

    /// Drop queued payloads matching the predicate, as a lossy link would.
    pub fn drop_where<F>(&mut self, f: F) -> usize
    where F: Fn(&MessagePayload) -> bool {
        let before = self.queue.len();
        self.queue.retain(|p| !f(p));
        before - self.queue.len()
    }

    /// Hold back queued payloads matching the predicate, see [SimNetwork::inject].
    pub fn take_where<F>(&mut self, f: F) -> Vec<MessagePayload>
    where F: Fn(&MessagePayload) -> bool {
        let (taken, kept): (VecDeque<_>, VecDeque<_>) = self.queue.drain(..).partition(|p| f(p));
        self.queue = kept;
        taken.into()
    }

    /// Queue a payload held back earlier.
    pub fn inject(&mut self, payload: MessagePayload) {
        self.queue.push_back(payload);
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn handler(&self, key: NodeKey) -> &MessageHandler {
        &self.nodes[&node_addr(key)]
    }

    pub fn inspect(&self, key: NodeKey) -> NodeInspect {
        NodeInspect::inspect(self.handler(key)).unwrap()
    }

    /// Results a client received, in order.
    pub fn update_results(&self, client: &str) -> Vec<UpdateResult> {
        let addr = client_addr(client);
        self.outbox
            .iter()
            .filter(|p| p.destination == addr)
            .filter_map(|p| match &p.data {
                Message::UpdateResult(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn get_results(&self, client: &str) -> Vec<GetResult> {
        let addr = client_addr(client);
        self.outbox
            .iter()
            .filter(|p| p.destination == addr)
            .filter_map(|p| match &p.data {
                Message::GetResult(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    /// Count delivered payloads of a kind.
    pub fn delivered_count(&self, name: &str) -> usize {
        self.delivered
            .iter()
            .filter(|p| p.data.name() == name)
            .count()
    }

    /// Ordered item keys held by a node.
    pub fn item_keys(&self, key: NodeKey) -> Vec<ItemKey> {
        self.handler(key).store().item_keys().unwrap()
    }

    /// Write `item` through `coordinator` and run the protocol to completion.
    pub fn put(&mut self, coordinator: NodeKey, item: Item) -> UpdateResult {
        self.update("harness", coordinator, item);
        self.deliver_all();
        self.fire_timeouts();
        self.update_results("harness").pop().unwrap()
    }
}

pub fn fast_config(replication: usize, read_quorum: usize, write_quorum: usize) -> RingConfig {
    RingConfig::new(replication, read_quorum, write_quorum, 5)
        .with_timeout(Duration::from_millis(300))
}

pub fn prepare_swarm(
    transport: &Arc<MemoryTransport>,
    key: NodeKey,
    config: RingConfig,
) -> Arc<Swarm> {
    let swarm = SwarmBuilder::with_memory_transport(node_addr(key), transport.clone())
        .unwrap()
        .config(config)
        .build()
        .unwrap();
    Arc::new(swarm)
}

pub fn prepare_transport() -> Arc<MemoryTransport> {
    Arc::new(MemoryTransport::new(LatencyConfig {
        min_ms: 0,
        max_ms: 10,
    }))
}
