use crate::message::types::CrashMsg;
use crate::message::types::LeaveMsg;
use crate::message::types::OpResult;
use crate::message::Message;
use crate::storage::Item;
use crate::tests::default::fast_config;
use crate::tests::default::SimNetwork;

/// Ring {20, 30, 40}, N = 2, items 6, 25, 35 and 45 spread over it.
fn populated_triple() -> SimNetwork {
    let mut net = SimNetwork::ring_of(fast_config(2, 2, 2), &[20, 30]);
    for key in [6, 25, 35, 45] {
        let res = net.put(30, Item::new(key, format!("VALUE{key}")));
        assert_eq!(res.result, OpResult::Success);
    }
    net.join(40, 20);
    assert_eq!(net.item_keys(40), vec![25, 35]);
    net
}

#[test]
fn test_leave_hands_items_to_new_owners() {
    let mut net = populated_triple();
    net.post(40, Message::LeaveMsg(LeaveMsg));
    net.deliver_all();

    assert_eq!(net.delivered_count("PreLeaveStatusCheck"), 2);
    assert_eq!(net.delivered_count("DepartureAck"), 2);
    assert_eq!(net.delivered_count("AnnounceDeparture"), 2);

    let leaver = net.inspect(40);
    assert_eq!(leaver.key, None);
    assert!(leaver.peers.is_empty());
    assert!(leaver.items.is_empty());
    for key in [20, 30] {
        let node = net.inspect(key);
        assert_eq!(node.peers, vec![20, 30]);
        assert_eq!(net.item_keys(key), vec![6, 25, 35, 45]);
        assert_eq!(node.item(25).unwrap().version, 1);
    }

    // The shrunk ring keeps serving writes.
    assert_eq!(net.put(20, Item::new(35, "AFTER")).item.version, 2);
}

#[test]
fn test_leave_without_handoff_is_immediate() {
    let mut net = SimNetwork::ring_of(fast_config(2, 2, 2), &[20, 30]);
    assert_eq!(net.put(20, Item::new(6, "VALUE6")).result, OpResult::Success);

    net.post(30, Message::LeaveMsg(LeaveMsg));
    net.deliver_all();

    assert_eq!(net.delivered_count("PreLeaveStatusCheck"), 0);
    assert_eq!(net.delivered_count("AnnounceDeparture"), 1);
    assert_eq!(net.pending_timers(), 0);
    assert_eq!(net.inspect(30).key, None);
    assert_eq!(net.inspect(20).peers, vec![20]);
    assert_eq!(net.item_keys(20), vec![6]);
}

#[test]
fn test_leave_rolls_back_when_owner_is_silent() {
    let mut net = populated_triple();
    net.post(30, Message::CrashMsg(CrashMsg));
    net.deliver_all();

    net.post(40, Message::LeaveMsg(LeaveMsg));
    net.deliver_all();
    assert!(net.handler(40).is_busy());
    assert_eq!(net.delivered_count("DepartureAck"), 1);

    net.fire_timeouts();
    assert_eq!(net.delivered_count("AnnounceDeparture"), 0);
    let leaver = net.inspect(40);
    assert_eq!(leaver.key, Some(40));
    assert_eq!(leaver.peers, vec![20, 30, 40]);
    assert_eq!(net.item_keys(40), vec![25, 35]);
    assert!(!net.handler(40).is_busy());
    assert_eq!(net.inspect(20).peers, vec![20, 30, 40]);
}

#[test]
fn test_crash_during_leave_rolls_back() {
    let mut net = populated_triple();
    net.post(40, Message::LeaveMsg(LeaveMsg));
    // LeaveMsg only, acks still queued.
    assert!(net.step());
    net.post(40, Message::CrashMsg(CrashMsg));
    net.drop_where(|p| matches!(p.data, Message::PreLeaveStatusCheck(_)));
    net.deliver_all();

    let node = net.inspect(40);
    assert_eq!(node.peers, vec![20, 30, 40]);
    assert_eq!(node.key, Some(40));
    assert!(!net.handler(40).is_busy());
}

#[test]
fn test_leave_outside_of_ring_is_ignored() {
    let mut net = SimNetwork::ring_of(fast_config(2, 2, 2), &[20, 30]);
    net.spawn(40);
    net.post(40, Message::LeaveMsg(LeaveMsg));
    net.deliver_all();
    assert_eq!(net.delivered_count("PreLeaveStatusCheck"), 0);
    assert_eq!(net.delivered_count("AnnounceDeparture"), 0);
}

#[test]
fn test_leave_fails_pending_write_and_frees_voter() {
    let mut net = SimNetwork::ring_of(fast_config(2, 2, 2), &[20, 30]);
    net.update("alice", 30, Item::new(6, "ALICE"));
    // 30 locked 6 and asked 20 for its vote.
    assert!(net.step());
    net.post(30, Message::LeaveMsg(LeaveMsg));
    net.deliver_all();
    net.fire_timeouts();

    let results = net.update_results("alice");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].result, OpResult::Error);

    let leaver = net.inspect(30);
    assert_eq!(leaver.key, None);
    assert_eq!(leaver.pending_requests, 0);
    let stayer = net.inspect(20);
    assert_eq!(stayer.peers, vec![20]);
    assert!(stayer.locks.is_empty());
    assert!(stayer.item(6).is_none());
}

#[test]
fn test_write_during_leave_is_handed_off_fresh() {
    let mut net = populated_triple();
    net.post(40, Message::LeaveMsg(LeaveMsg));
    assert!(net.step());

    // Hold the acks back until a write of 25 lands on 40.
    net.update("bob", 30, Item::new(25, "FRESH"));
    let mut acks = vec![];
    loop {
        acks.extend(net.take_where(|p| matches!(p.data, Message::DepartureAck(_))));
        if !net.step() {
            break;
        }
    }
    assert_eq!(acks.len(), 2);
    assert_eq!(net.update_results("bob")[0].item.version, 2);
    assert_eq!(net.inspect(40).item(25).unwrap().version, 2);

    for ack in acks {
        net.inject(ack);
    }
    net.deliver_all();

    assert_eq!(net.inspect(40).key, None);
    assert_eq!(
        net.inspect(20).item(25),
        Some(&Item::new(25, "FRESH").with_version(2))
    );
    assert!(net.inspect(20).locks.is_empty());
}
