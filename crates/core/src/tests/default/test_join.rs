use crate::dht::NodeAddr;
use crate::message::types::CrashMsg;
use crate::message::types::JoinMsg;
use crate::message::types::JoinReadOperationRes;
use crate::message::types::OpResult;
use crate::message::Message;
use crate::storage::Item;
use crate::tests::default::fast_config;
use crate::tests::default::node_addr;
use crate::tests::default::SimNetwork;

/// Ring {20, 30} with N = 2, every item on both nodes.
fn populated_pair(read_quorum: usize) -> SimNetwork {
    let mut net = SimNetwork::ring_of(fast_config(2, read_quorum, 2), &[20, 30]);
    for key in [6, 25, 35, 45] {
        let res = net.put(20, Item::new(key, format!("VALUE{key}")));
        assert_eq!(res.result, OpResult::Success);
    }
    assert_eq!(net.item_keys(20), vec![6, 25, 35, 45]);
    assert_eq!(net.item_keys(30), vec![6, 25, 35, 45]);
    net
}

#[test]
fn test_init_and_join_pair() {
    let net = SimNetwork::ring_of(fast_config(2, 2, 2), &[20, 30]);
    for key in [20, 30] {
        let node = net.inspect(key);
        assert_eq!(node.key, Some(key));
        assert_eq!(node.peers, vec![20, 30]);
        assert!(node.items.is_empty());
    }
    assert!(!net.handler(30).is_busy());
}

#[test]
fn test_joiner_takes_shifted_items() {
    let mut net = populated_pair(2);
    net.join(40, 20);

    for key in [20, 30, 40] {
        assert_eq!(net.inspect(key).peers, vec![20, 30, 40]);
    }
    assert_eq!(net.item_keys(40), vec![25, 35]);
    // Old owners drop what moved to 40.
    assert_eq!(net.item_keys(20), vec![6, 35, 45]);
    assert_eq!(net.item_keys(30), vec![6, 25, 45]);
    assert_eq!(net.delivered_count("JoinReadOperationReq"), 1);

    // Every item keeps exactly N copies, each on a responsible node.
    let ring = net.handler(40).ring();
    for item_key in [6, 25, 35, 45] {
        let holders: Vec<u64> = [20, 30, 40]
            .into_iter()
            .filter(|k| net.inspect(*k).item(item_key).is_some())
            .collect();
        assert_eq!(holders, {
            let mut owners = ring.responsible(item_key);
            owners.sort();
            owners
        });
    }
}

#[test]
fn test_joiner_repairs_stale_copy_from_neighbor() {
    let mut net = populated_pair(2);

    // Bump 25 through 30 and lose the Write to 20: 20 now serves version 1.
    net.update("alice", 30, Item::new(25, "FRESH"));
    loop {
        net.drop_where(|p| {
            matches!(p.data, Message::Write(_)) && p.destination == node_addr(20)
        });
        if !net.step() {
            break;
        }
    }
    assert_eq!(net.update_results("alice")[0].item.version, 2);
    assert_eq!(net.inspect(20).item(25).unwrap().version, 1);

    net.join(40, 20);
    assert_eq!(net.inspect(40).key, Some(40));
    assert_eq!(
        net.inspect(40).item(25),
        Some(&Item::new(25, "FRESH").with_version(2))
    );
}

#[test]
fn test_join_with_too_few_replicas_settles_for_what_exists() {
    // R - 1 = 2 confirmations wanted, only 30 besides the neighbor holds copies.
    let mut net = SimNetwork::ring_of(fast_config(3, 3, 2), &[20, 30]);
    assert_eq!(net.put(20, Item::new(6, "VALUE6")).result, OpResult::Success);

    net.join(40, 20);
    let joiner = net.inspect(40);
    assert_eq!(joiner.peers, vec![20, 30, 40]);
    assert_eq!(joiner.item(6).unwrap().version, 1);
    assert_eq!(net.delivered_count("JoinReadOperationRes"), 1);
}

#[test]
fn test_replica_lacking_item_does_not_confirm_it() {
    let mut net = populated_pair(2);
    // Besides the neighbor 20, only 30 replicates 25.
    net.handler(30).store().remove(25).unwrap();

    net.join(40, 20);
    let replies: Vec<JoinReadOperationRes> = net
        .delivered
        .iter()
        .filter_map(|p| match &p.data {
            Message::JoinReadOperationRes(res) => Some(res.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].missing, vec![25]);
    assert_eq!(
        replies[0].items.iter().map(|i| i.key).collect::<Vec<_>>(),
        vec![35]
    );

    // No holder besides the neighbor, the join keeps the neighbor copy.
    let joiner = net.inspect(40);
    assert_eq!(joiner.peers, vec![20, 30, 40]);
    assert_eq!(joiner.item(25).unwrap().value, "VALUE25");
}

#[test]
fn test_join_waits_for_holder_after_a_miss() {
    // N = 3, R = 3: items adopted from 50 need both 20 and 30 unless one lacks them.
    let mut net = SimNetwork::ring_of(fast_config(3, 3, 2), &[20, 30, 50]);
    assert_eq!(net.put(20, Item::new(35, "VALUE35")).result, OpResult::Success);
    net.handler(20).store().remove(35).unwrap();

    net.spawn(40);
    net.post(
        40,
        Message::JoinMsg(JoinMsg {
            key: 40,
            bootstrap: node_addr(20),
        }),
    );
    let mut held = vec![];
    loop {
        held.extend(net.take_where(|p| {
            matches!(p.data, Message::JoinReadOperationRes(_)) && p.sender == Some(node_addr(30))
        }));
        if !net.step() {
            break;
        }
    }
    assert_eq!(held.len(), 1);
    // 20 reported its miss, 30 may still hold a copy.
    assert!(net.handler(40).is_busy());

    for payload in held {
        net.inject(payload);
    }
    net.deliver_all();
    assert!(!net.handler(40).is_busy());
    assert_eq!(net.inspect(40).peers, vec![20, 30, 40, 50]);
    assert_eq!(net.inspect(40).item(35).unwrap().version, 1);
}

#[test]
fn test_join_without_read_repair() {
    let mut net = populated_pair(1);
    net.join(40, 20);
    assert_eq!(net.delivered_count("JoinReadOperationReq"), 0);
    assert_eq!(net.item_keys(40), vec![25, 35]);
}

#[test]
fn test_join_aborts_on_unreachable_bootstrap() {
    let mut net = SimNetwork::ring_of(fast_config(2, 2, 2), &[20, 30]);
    net.spawn(40);
    net.post(
        40,
        Message::JoinMsg(JoinMsg {
            key: 40,
            bootstrap: NodeAddr::from("node-99"),
        }),
    );
    net.deliver_all();
    assert!(net.handler(40).is_busy());

    net.fire_timeouts();
    let joiner = net.inspect(40);
    assert_eq!(joiner.key, None);
    assert!(joiner.peers.is_empty());
    assert!(!net.handler(40).is_busy());
}

#[test]
fn test_join_aborts_when_neighbor_is_silent() {
    let mut net = populated_pair(2);
    net.post(20, Message::CrashMsg(CrashMsg));
    net.deliver_all();

    // 30 answers with the member list, the neighbor 20 never sends items.
    net.join(40, 30);
    assert!(net.handler(40).is_busy());
    net.fire_timeouts();

    let joiner = net.inspect(40);
    assert_eq!(joiner.key, None);
    assert!(joiner.peers.is_empty());
    assert!(joiner.items.is_empty());
    assert_eq!(net.inspect(30).peers, vec![20, 30]);
}

#[test]
fn test_join_aborts_when_read_repair_is_silent() {
    let mut net = populated_pair(2);
    net.post(30, Message::CrashMsg(CrashMsg));
    net.deliver_all();

    net.join(40, 20);
    // Items arrived from 20, the confirmation from 30 never does.
    assert_eq!(net.item_keys(40), vec![25, 35]);
    net.fire_timeouts();

    let joiner = net.inspect(40);
    assert_eq!(joiner.key, None);
    assert!(joiner.items.is_empty());
    assert_eq!(net.delivered_count("AnnouncePresence"), 0);
    // Nobody evicted anything.
    assert_eq!(net.item_keys(20), vec![6, 25, 35, 45]);
}

#[test]
fn test_join_with_taken_key_aborts() {
    let mut net = SimNetwork::ring_of(fast_config(2, 2, 2), &[20, 30]);
    net.spawn(50);
    net.post(
        50,
        Message::JoinMsg(JoinMsg {
            key: 20,
            bootstrap: node_addr(30),
        }),
    );
    net.deliver_all();

    let node = net.inspect(50);
    assert_eq!(node.key, None);
    assert!(node.peers.is_empty());
    assert_eq!(net.delivered_count("ReqDataItemsResponsibleFor"), 0);
    assert_eq!(net.inspect(20).peers, vec![20, 30]);
}

#[test]
fn test_second_join_while_joining_is_ignored() {
    let mut net = SimNetwork::ring_of(fast_config(2, 2, 2), &[20, 30]);
    net.spawn(40);
    let join = |key| {
        Message::JoinMsg(JoinMsg {
            key,
            bootstrap: node_addr(20),
        })
    };
    net.post(40, join(40));
    net.post(40, join(41));
    net.deliver_all();

    assert_eq!(net.delivered_count("ReqActiveNodeList"), 1);
    assert_eq!(net.inspect(40).key, Some(40));
    assert_eq!(net.inspect(20).peers, vec![20, 30, 40]);
}
