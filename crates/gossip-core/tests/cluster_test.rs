//! Deterministic multi-node scenarios over the in-memory datagram hub.
//!
//! Each test wires several engines onto one [`Hub`] and drives them by hand:
//! drain every outbound queue, then feed every pending datagram back in.
//! Link cuts model silent peers and partitions.

use gossip_core::message::{Data, MESSAGE_MAX_SIZE};
use gossip_core::testing::{Hub, HubTransport};
use gossip_core::{Gossip, GossipConfig, GossipState, Transport, VectorRecord};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

type Node = Gossip<HubTransport>;
type Received = Arc<Mutex<Vec<Vec<u8>>>>;

fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

/// Engine plus a shared log of every payload its data receiver saw.
fn node(hub: &Hub, port: u16, config: GossipConfig) -> (Node, Received) {
    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let engine = Gossip::with_transport(
        hub.transport(addr(port)),
        config,
        Some(Box::new(move |payload: &[u8]| {
            sink.lock().unwrap().push(payload.to_vec());
        })),
    )
    .unwrap();
    (engine, received)
}

/// One round: every node drains its sends, then consumes everything queued
/// for it. Handler-level errors (bad state, stray datagrams) are part of
/// normal cluster life and are ignored here.
fn drive_round(hub: &Hub, nodes: &mut [&mut Node]) {
    for node in nodes.iter_mut() {
        node.process_send().unwrap();
    }
    for node in nodes.iter_mut() {
        let me = node.self_member().addr;
        while hub.pending(me) > 0 {
            let _ = node.process_receive();
        }
    }
}

fn drive(hub: &Hub, nodes: &mut [&mut Node], rounds: usize) {
    for _ in 0..rounds {
        drive_round(hub, nodes);
    }
}

fn uids(node: &Node) -> Vec<u32> {
    let mut ids: Vec<u32> = node.member_list().iter().map(|m| m.uid).collect();
    ids.sort_unstable();
    ids
}

#[test]
fn two_node_join() {
    let hub = Hub::new();
    let (mut a, _) = node(&hub, 6500, GossipConfig::default());
    let (mut b, _) = node(&hub, 6501, GossipConfig::default());

    a.join(&[]).unwrap();
    assert_eq!(a.state(), GossipState::Connected);

    b.join(&[addr(6500)]).unwrap();
    assert_eq!(b.state(), GossipState::Joining);

    drive(&hub, &mut [&mut a, &mut b], 2);

    assert_eq!(a.state(), GossipState::Connected);
    assert_eq!(b.state(), GossipState::Connected);

    // Both sides enumerate {self, peer}.
    let expected = {
        let mut ids = vec![a.self_member().uid, b.self_member().uid];
        ids.sort_unstable();
        ids
    };
    assert_eq!(uids(&a), expected);
    assert_eq!(uids(&b), expected);
}

#[test]
fn three_node_data_propagation() {
    let hub = Hub::new();
    let (mut a, _) = node(&hub, 6500, GossipConfig::default());
    let (mut b, b_received) = node(&hub, 6501, GossipConfig::default());
    let (mut c, c_received) = node(&hub, 6502, GossipConfig::default());

    a.join(&[]).unwrap();
    b.join(&[addr(6500)]).unwrap();
    drive(&hub, &mut [&mut a, &mut b], 2);
    c.join(&[addr(6500)]).unwrap();
    drive(&hub, &mut [&mut a, &mut b, &mut c], 3);

    // Fully meshed membership before the payload goes out.
    for engine in [&a, &b, &c] {
        assert_eq!(engine.member_list().len(), 3);
    }

    a.send_data(b"hello").unwrap();
    drive(&hub, &mut [&mut a, &mut b, &mut c], 3);

    assert_eq!(b_received.lock().unwrap().as_slice(), &[b"hello".to_vec()]);
    assert_eq!(c_received.lock().unwrap().as_slice(), &[b"hello".to_vec()]);
}

#[test]
fn duplicate_data_is_suppressed() {
    let hub = Hub::new();
    let (mut b, received) = node(&hub, 6500, GossipConfig::default());
    b.join(&[]).unwrap();

    // A raw peer replaying the identical DATA datagram three times.
    let replayer = hub.transport(addr(6600));
    let data = Data::new(
        VectorRecord {
            sequence_number: 1,
            member_id: 7777,
        },
        b"hello".to_vec(),
    );
    let mut buf = [0u8; MESSAGE_MAX_SIZE];
    let len = data.encode(&mut buf).unwrap();

    for _ in 0..3 {
        replayer.send_to(&buf[..len], addr(6500)).unwrap();
        b.process_receive().unwrap();
    }

    assert_eq!(received.lock().unwrap().as_slice(), &[b"hello".to_vec()]);
}

#[test]
fn silent_peer_is_evicted_after_retries() {
    // Shrink the retry timings so three attempts fit in a test run.
    let config = GossipConfig {
        message_retry_interval: 30,
        gossip_tick_interval: 20,
        ..GossipConfig::default()
    };

    let hub = Hub::new();
    let (mut a, _) = node(&hub, 6500, config.clone());
    let (mut b, _) = node(&hub, 6501, config);

    a.join(&[]).unwrap();
    b.join(&[addr(6500)]).unwrap();
    drive(&hub, &mut [&mut a, &mut b], 2);
    assert_eq!(a.member_list().len(), 2);

    // B goes silent: everything from B to A is lost from now on.
    hub.cut_link(addr(6501), addr(6500));

    // A keeps gossiping STATUS at B; with no ACKs coming back the retries
    // run out and B is presumed dead.
    for _ in 0..20 {
        a.tick().unwrap();
        a.process_send().unwrap();
        while hub.pending(addr(6500)) > 0 {
            let _ = a.process_receive();
        }
        if a.member_list().len() == 1 {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(15));
    }

    assert_eq!(a.member_list().len(), 1);
    assert_eq!(a.member_list()[0].uid, a.self_member().uid);
}

#[test]
fn anti_entropy_catches_both_sides_up() {
    let hub = Hub::new();
    let (mut a, a_received) = node(&hub, 6500, GossipConfig::default());
    let (mut b, b_received) = node(&hub, 6501, GossipConfig::default());

    a.join(&[]).unwrap();
    b.join(&[addr(6500)]).unwrap();
    drive(&hub, &mut [&mut a, &mut b], 2);

    // Partition the pair, then let each originate one payload. The rumor
    // fan-out dies on the cut links, so only the local logs advance.
    hub.cut_link(addr(6500), addr(6501));
    hub.cut_link(addr(6501), addr(6500));
    a.send_data(b"alpha").unwrap();
    b.send_data(b"beta").unwrap();
    drive_round(&hub, &mut [&mut a, &mut b]);
    assert!(a_received.lock().unwrap().is_empty());
    assert!(b_received.lock().unwrap().is_empty());

    // Heal the partition. The first tick on each side fires a STATUS, the
    // clocks conflict, and each side pushes what the other is missing.
    hub.restore_link(addr(6500), addr(6501));
    hub.restore_link(addr(6501), addr(6500));
    a.tick().unwrap();
    b.tick().unwrap();
    drive(&hub, &mut [&mut a, &mut b], 4);

    assert_eq!(a_received.lock().unwrap().as_slice(), &[b"beta".to_vec()]);
    assert_eq!(b_received.lock().unwrap().as_slice(), &[b"alpha".to_vec()]);
}

#[test]
fn membership_converges_across_a_chain_of_joins() {
    let hub = Hub::new();
    let mut seeds: Vec<SocketAddr> = Vec::new();
    let mut engines: Vec<Node> = Vec::new();

    for i in 0..5u16 {
        let (mut engine, _) = node(&hub, 6500 + i, GossipConfig::default());
        engine.join(&seeds).unwrap();
        seeds = vec![addr(6500 + i)];

        let mut refs: Vec<&mut Node> = engines.iter_mut().collect();
        refs.push(&mut engine);
        drive(&hub, &mut refs, 3);
        engines.push(engine);
    }

    // Every join went through the previous node only, yet the broadcast on
    // HELLO spreads each newcomer to the whole cluster.
    for engine in &engines {
        assert_eq!(engine.state(), GossipState::Connected);
        assert_eq!(engine.member_list().len(), engines.len());
    }
}
