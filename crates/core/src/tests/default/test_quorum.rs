use crate::message::types::CrashMsg;
use crate::message::types::OpResult;
use crate::message::types::RecoveryMsg;
use crate::message::Message;
use crate::message::NodeMode;
use crate::storage::Item;
use crate::tests::default::fast_config;
use crate::tests::default::node_addr;
use crate::tests::default::SimNetwork;

#[test]
fn test_update_on_two_nodes_sets_version_one() {
    let mut net = SimNetwork::ring_of(fast_config(2, 2, 2), &[20, 30]);
    assert_eq!(net.handler(20).ring().responsible(6), vec![20, 30]);

    net.update("alice", 20, Item::new(6, "VALUE6"));
    net.deliver_all();

    let results = net.update_results("alice");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].result, OpResult::Success);
    assert_eq!(results[0].item.version, 1);
    for key in [20, 30] {
        let node = net.inspect(key);
        assert_eq!(node.item(6), Some(&Item::new(6, "VALUE6").with_version(1)));
        assert!(node.locks.is_empty());
    }

    // The timer of a finished request is a no-op.
    net.fire_timeouts();
    assert_eq!(net.update_results("alice").len(), 1);
    assert_eq!(net.inspect(20).pending_requests, 0);
}

#[test]
fn test_successive_updates_bump_version_by_one() {
    let mut net = SimNetwork::ring_of(fast_config(2, 2, 2), &[20, 30]);
    for (i, coordinator) in [20, 30, 20, 30].into_iter().enumerate() {
        let res = net.put(coordinator, Item::new(6, format!("v{i}")));
        assert_eq!(res.result, OpResult::Success);
        assert_eq!(res.item.version, i as u64 + 1);
    }
}

#[test]
fn test_update_times_out_when_replica_crashed() {
    let mut net = SimNetwork::ring_of(fast_config(2, 2, 2), &[20, 30]);
    assert_eq!(net.put(20, Item::new(6, "before")).result, OpResult::Success);

    net.post(30, Message::CrashMsg(CrashMsg));
    net.deliver_all();
    assert_eq!(net.inspect(30).mode, NodeMode::Crashed);

    net.update("alice", 20, Item::new(6, "after"));
    net.deliver_all();
    assert!(net.update_results("alice").is_empty());
    // Coordinator holds its own lock while waiting for the second vote.
    assert_eq!(net.inspect(20).locks.len(), 1);

    net.fire_timeouts();
    let results = net.update_results("alice");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].result, OpResult::Error);

    let coordinator = net.inspect(20);
    assert!(coordinator.locks.is_empty());
    assert_eq!(coordinator.pending_requests, 0);
    assert_eq!(coordinator.item(6).unwrap().value, "before");
    assert!(net.delivered_count("ReleaseLock") >= 1);
}

#[test]
fn test_concurrent_writers_first_come_wins() {
    let mut net = SimNetwork::ring_of(fast_config(2, 2, 2), &[20, 30]);

    net.update("alice", 20, Item::new(6, "ALICE"));
    // UpdateRequest at 20, then Version at 30: both now hold alice's lock.
    assert!(net.step());
    assert!(net.step());
    assert_eq!(net.inspect(20).locks, net.inspect(30).locks);

    net.update("bob", 30, Item::new(6, "BOB"));
    net.deliver_all();

    let alice = net.update_results("alice");
    let bob = net.update_results("bob");
    assert_eq!(alice.len(), 1);
    assert_eq!(alice[0].result, OpResult::Success);
    assert_eq!(bob.len(), 1);
    assert_eq!(bob[0].result, OpResult::Error);
    // Bob was rejected locally, only alice's negotiation went on the wire.
    assert_eq!(net.delivered_count("Version"), 1);

    net.fire_timeouts();
    for key in [20, 30] {
        let node = net.inspect(key);
        assert_eq!(node.item(6).unwrap().value, "ALICE");
        assert!(node.locks.is_empty());
    }
}

#[test]
fn test_replica_with_other_lock_does_not_vote() {
    let mut net = SimNetwork::ring_of(fast_config(2, 2, 2), &[20, 30]);

    // Both coordinators lock locally before seeing each other's Version.
    net.update("alice", 20, Item::new(6, "ALICE"));
    net.update("bob", 30, Item::new(6, "BOB"));
    net.deliver_all();
    assert!(net.update_results("alice").is_empty());
    assert!(net.update_results("bob").is_empty());
    assert_eq!(net.delivered_count("UpdateVersion"), 0);

    net.fire_timeouts();
    assert_eq!(net.update_results("alice")[0].result, OpResult::Error);
    assert_eq!(net.update_results("bob")[0].result, OpResult::Error);
    for key in [20, 30] {
        assert!(net.inspect(key).locks.is_empty());
        assert!(net.inspect(key).item(6).is_none());
    }

    // The item is writable again.
    assert_eq!(net.put(30, Item::new(6, "BOB")).result, OpResult::Success);
}

#[test]
fn test_retry_through_locking_coordinator_is_refused() {
    let mut net = SimNetwork::ring_of(fast_config(2, 2, 2), &[20, 30]);
    net.update("alice", 20, Item::new(6, "FIRST"));
    net.update("alice", 20, Item::new(6, "RETRY"));
    // Same client, but the retry gets a new request id and never matches the held lock.
    assert!(net.step());
    assert!(net.step());
    net.deliver_all();

    let results = net.update_results("alice");
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].result, OpResult::Error);
    assert_eq!(results[0].item.value, "RETRY");
    assert_eq!(results[1].result, OpResult::Success);
    assert_eq!(results[1].item, Item::new(6, "FIRST").with_version(1));
    assert!(net.inspect(20).locks.is_empty());
}

#[test]
fn test_vote_overtaken_by_write_is_released() {
    let mut net = SimNetwork::ring_of(fast_config(3, 2, 2), &[10, 20, 30]);
    net.update("alice", 10, Item::new(5, "ALICE"));
    assert!(net.step());
    let delayed = net.take_where(|p| {
        matches!(p.data, Message::Version(_)) && p.destination == node_addr(30)
    });
    assert_eq!(delayed.len(), 1);

    net.deliver_all();
    assert_eq!(net.update_results("alice")[0].result, OpResult::Success);
    assert_eq!(net.inspect(30).item(5).unwrap().version, 1);

    // 30 grants after the Write, the coordinator answers the late vote.
    for payload in delayed {
        net.inject(payload);
    }
    net.deliver_all();
    assert!(net.inspect(30).locks.is_empty());
    assert_eq!(net.put(20, Item::new(5, "BOB")).item.version, 2);
}

#[test]
fn test_single_vote_quorum_skips_fan_out() {
    let mut net = SimNetwork::ring_of(fast_config(1, 1, 1), &[20, 30]);
    assert_eq!(net.handler(20).ring().responsible(6), vec![20]);

    let res = net.put(20, Item::new(6, "LOCAL"));
    assert_eq!(res.result, OpResult::Success);
    assert_eq!(res.item.version, 1);
    assert_eq!(net.delivered_count("Version"), 0);

    // A coordinator outside of the responsible set only relays.
    let res = net.put(30, Item::new(6, "RELAYED"));
    assert_eq!(res.item.version, 2);
    assert!(net.inspect(30).item(6).is_none());
    assert_eq!(net.inspect(20).item(6).unwrap().value, "RELAYED");

    net.get("carol", 20, 6);
    net.deliver_all();
    assert_eq!(net.delivered_count("Read"), 0);
    assert_eq!(net.get_results("carol")[0].item.as_ref().unwrap().version, 2);
}

#[test]
fn test_get_returns_freshest_of_quorum() {
    let mut net = SimNetwork::ring_of(fast_config(3, 2, 2), &[10, 20, 30]);
    assert_eq!(net.put(10, Item::new(5, "old")).item.version, 1);

    // 30 misses the second write while crashed and keeps its copy on recovery.
    net.post(30, Message::CrashMsg(CrashMsg));
    net.deliver_all();
    assert_eq!(net.put(10, Item::new(5, "new")).item.version, 2);
    net.post(
        30,
        Message::RecoveryMsg(RecoveryMsg {
            bootstrap: node_addr(10),
        }),
    );
    net.deliver_all();
    assert_eq!(net.inspect(30).mode, NodeMode::Active);
    assert_eq!(net.inspect(30).item(5).unwrap().version, 1);

    net.get("carol", 30, 5);
    net.deliver_all();
    let results = net.get_results("carol");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].result, OpResult::Success);
    assert_eq!(results[0].item, Some(Item::new(5, "new").with_version(2)));

    // The next write builds on the highest version among the voters.
    assert_eq!(net.put(30, Item::new(5, "newer")).item.version, 3);
}

#[test]
fn test_get_of_missing_item_times_out() {
    let mut net = SimNetwork::ring_of(fast_config(2, 2, 2), &[20, 30]);
    net.get("carol", 20, 99);
    net.deliver_all();
    assert!(net.get_results("carol").is_empty());

    net.fire_timeouts();
    let results = net.get_results("carol");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].result, OpResult::Error);
    assert_eq!(results[0].item, None);
}

#[test]
fn test_locked_item_is_not_read() {
    let mut net = SimNetwork::ring_of(fast_config(2, 2, 2), &[20, 30]);
    assert_eq!(net.put(20, Item::new(6, "v1")).result, OpResult::Success);

    // Leave alice's negotiation half way: both replicas hold her lock.
    net.update("alice", 20, Item::new(6, "v2"));
    assert!(net.step());
    assert!(net.step());
    net.drop_where(|p| matches!(p.data, Message::UpdateVersion(_)));

    net.get("carol", 30, 6);
    net.deliver_all();
    assert!(net.get_results("carol").is_empty());

    net.fire_timeouts();
    assert_eq!(net.get_results("carol")[0].result, OpResult::Error);
    assert_eq!(net.update_results("alice")[0].result, OpResult::Error);
    for key in [20, 30] {
        assert!(net.inspect(key).locks.is_empty());
    }
}
