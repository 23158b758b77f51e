//! Node keeper integration tests
//!
//! Drives the keeper through bootstrap, claim admission, promotion and
//! self-leave the way a round driver does, and checks the committed view
//! from the query surface only.

use ream_nodekeeper::network::*;
use ream_nodekeeper::security::{CryptographyService, Ed25519CryptographyService};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

/// A remote node able to sign its own join claims
struct Peer {
    id: NodeId,
    crypto: Ed25519CryptographyService,
}

impl Peer {
    fn new(seed: u8) -> Self {
        Self {
            id: NodeId::from_bytes([seed; 32]),
            crypto: Ed25519CryptographyService::generate().unwrap(),
        }
    }

    fn join(&self, role: StaticRole, short_id: u32, address: &str) -> Claim {
        let pk = self.crypto.get_public_key().unwrap().as_bytes().to_vec();
        NodeJoinClaim::new(self.id, role, ShortNodeId(short_id), address, pk)
            .sign(&self.crypto)
            .unwrap()
            .into()
    }
}

fn node(seed: u8, role: StaticRole) -> Node {
    Node::new(NodeId::from_bytes([seed; 32]), role, vec![seed], format!("10.0.0.{}:13831", seed))
}

fn keeper_with_origin(origin: Node) -> NodeKeeper {
    let crypto = Arc::new(Ed25519CryptographyService::generate().unwrap());
    NodeKeeper::new(origin, crypto)
}

fn promote(keeper: &NodeKeeper, pulse: u32) -> MergeReport {
    let mut list = keeper.get_unsync_list(PulseNumber(pulse));
    list.add_claims(keeper.get_claim_queue().drain());
    keeper.sync(list);
    keeper.move_sync_to_active()
}

#[test]
fn test_bootstrap_orders_by_identifier() {
    let a = node(0x10, StaticRole::Virtual);
    let b = node(0x20, StaticRole::LightMaterial);
    let keeper = keeper_with_origin(a.clone());

    keeper.add_active_nodes(vec![b.clone(), a.clone()]);

    let ids: Vec<NodeId> = keeper.get_active_nodes().iter().map(Node::id).collect();
    assert_eq!(ids, vec![a.id(), b.id()]);
    assert_eq!(keeper.get_active_nodes_by_role(StaticRole::Virtual), Some(vec![a.id()]));
    assert_eq!(keeper.get_active_nodes_by_role(StaticRole::LightMaterial), Some(vec![b.id()]));
    assert_eq!(keeper.get_active_nodes_by_role(StaticRole::HeavyMaterial), None);
}

#[test]
fn test_valid_join_is_admitted() {
    let a = node(0x10, StaticRole::Virtual);
    let keeper = keeper_with_origin(a.clone());
    keeper.add_active_nodes(vec![a]);

    let c = Peer::new(0x30);
    keeper.add_pending_claim(c.join(StaticRole::HeavyMaterial, 300, "10.0.0.30:13831"));
    let report = promote(&keeper, 65537);

    assert_eq!(report.admitted.len(), 1);
    let admitted = keeper.get_active_node(&c.id).expect("C should be active");
    assert_eq!(admitted.state(), NodeState::Active);
    assert_eq!(admitted.pulse_num(), PulseNumber(65537));
    assert_eq!(admitted.address(), "10.0.0.30:13831");
    assert_eq!(keeper.get_active_nodes_by_role(StaticRole::HeavyMaterial), Some(vec![c.id]));
    assert_eq!(keeper.get_active_node_by_short_id(ShortNodeId(300)).map(|n| n.id()), Some(c.id));
    assert!(keeper.nodes_joined_during_previous_pulse());
}

#[test]
fn test_forged_signature_is_dropped() {
    let keeper = keeper_with_origin(node(0x10, StaticRole::Virtual));
    let forged = Peer::new(0x40);
    let Claim::Join(claim) = forged.join(StaticRole::LightMaterial, 400, "10.0.0.40:13831") else {
        unreachable!()
    };
    keeper.add_pending_claim(claim.with_signature(vec![0u8; 64]).into());

    let report = promote(&keeper, 65537);

    assert!(keeper.get_active_node(&forged.id).is_none());
    assert_eq!(report.dropped.len(), 1);
    assert_eq!(report.dropped[0].reason, DropReason::BadSignature);
    assert!(!keeper.nodes_joined_during_previous_pulse());
}

#[test]
fn test_short_id_collision_keeps_original_holder() {
    let a = node(0x10, StaticRole::Virtual);
    let keeper = keeper_with_origin(a.clone());
    keeper.add_active_nodes(vec![a.clone()]);

    let intruder = Peer::new(0x50);
    keeper.add_pending_claim(intruder.join(StaticRole::Virtual, a.short_id().0, "10.0.0.50:13831"));
    let report = promote(&keeper, 65537);

    assert!(keeper.get_active_node(&intruder.id).is_none());
    assert!(matches!(report.dropped[0].reason, DropReason::ShortIdCollision { holder, .. } if holder == a.id()));
    assert_eq!(keeper.get_active_node_by_short_id(a.short_id()), Some(a));
}

#[test]
fn test_same_round_short_id_tie_break_follows_queue_order() {
    let keeper = keeper_with_origin(node(0x10, StaticRole::Virtual));
    let first = Peer::new(0x61);
    let second = Peer::new(0x62);
    keeper.add_pending_claim(first.join(StaticRole::Virtual, 600, "10.0.0.61:13831"));
    keeper.add_pending_claim(second.join(StaticRole::Virtual, 600, "10.0.0.62:13831"));

    let report = promote(&keeper, 65537);

    assert_eq!(report.admitted.len(), 1);
    assert_eq!(keeper.get_active_node_by_short_id(ShortNodeId(600)).map(|n| n.id()), Some(first.id));
    assert!(keeper.get_active_node(&second.id).is_none());
}

#[test]
fn test_self_leave_fires_graceful_stop_once() {
    let origin = node(0x10, StaticRole::Virtual);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let keeper = keeper_with_origin(origin.clone()).with_graceful_stop(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    keeper.add_active_nodes(vec![origin.clone(), node(0x20, StaticRole::LightMaterial)]);

    keeper.add_pending_claim(Claim::leave(origin.id()));
    keeper.add_pending_claim(Claim::leave(origin.id()));
    let report = promote(&keeper, 65537);
    assert!(report.left_cluster);
    assert_eq!(report.removed.len(), 1);

    keeper.add_pending_claim(Claim::leave(origin.id()));
    let again = promote(&keeper, 65538);
    assert!(!again.left_cluster);

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(keeper.get_active_node(&origin.id()).is_none());
    assert_eq!(keeper.get_origin().state(), NodeState::Leaved);
    assert!(keeper.has_left_cluster());
}

#[test]
fn test_duplicate_join_admits_first_in_queue_order() {
    let keeper = keeper_with_origin(node(0x10, StaticRole::Virtual));
    let c = Peer::new(0x70);
    keeper.add_pending_claim(c.join(StaticRole::LightMaterial, 700, "10.0.0.70:1"));
    keeper.add_pending_claim(c.join(StaticRole::LightMaterial, 700, "10.0.0.70:2"));

    let report = promote(&keeper, 65537);

    assert_eq!(report.admitted.len(), 1);
    assert_eq!(report.dropped.len(), 1);
    assert_eq!(keeper.get_active_node(&c.id).unwrap().address(), "10.0.0.70:1");
}

#[test]
fn test_leave_for_inactive_node_is_noop() {
    let a = node(0x10, StaticRole::Virtual);
    let keeper = keeper_with_origin(a.clone());
    keeper.add_active_nodes(vec![a.clone()]);

    keeper.add_pending_claim(Claim::leave(NodeId::from_bytes([0x99; 32])));
    let report = promote(&keeper, 65537);

    assert!(report.removed.is_empty());
    assert!(!report.left_cluster);
    assert_eq!(keeper.get_active_nodes(), vec![a]);
}

#[test]
fn test_left_node_cannot_rejoin() {
    let keeper = keeper_with_origin(node(0x10, StaticRole::Virtual));
    let c = Peer::new(0x80);
    keeper.add_pending_claim(c.join(StaticRole::Virtual, 800, "10.0.0.80:1"));
    promote(&keeper, 65537);

    keeper.add_pending_claim(Claim::leave(c.id));
    promote(&keeper, 65538);
    assert!(keeper.get_active_node(&c.id).is_none());

    keeper.add_pending_claim(c.join(StaticRole::Virtual, 800, "10.0.0.80:1"));
    let report = promote(&keeper, 65539);
    assert_eq!(report.dropped[0].reason, DropReason::PermanentlyLeft);
    assert!(keeper.get_active_node(&c.id).is_none());
}

#[test]
fn test_claims_are_consumed_exactly_once() {
    let keeper = Arc::new(keeper_with_origin(node(0x10, StaticRole::Virtual)));
    let mut driver = RoundDriver::new(keeper.clone());

    let forged = Peer::new(0x90);
    let Claim::Join(claim) = forged.join(StaticRole::Virtual, 900, "10.0.0.90:1") else {
        unreachable!()
    };
    keeper.add_pending_claim(claim.with_signature(vec![1u8; 64]).into());
    let first = driver.on_pulse(PulseNumber(65537)).unwrap();
    assert_eq!(first.dropped.len(), 1);
    assert!(keeper.get_claim_queue().is_empty());

    let second = driver.on_pulse(PulseNumber(65538)).unwrap();
    assert!(second.is_empty());

    let stats = keeper.get_stats();
    assert_eq!(stats.rounds_promoted, 2);
    assert_eq!(stats.claims_dropped, 1);
}

#[test]
fn test_non_membership_claims_are_counted_not_applied() {
    let a = node(0x10, StaticRole::Virtual);
    let keeper = keeper_with_origin(a.clone());
    keeper.add_active_nodes(vec![a.clone()]);

    keeper.add_pending_claim(Claim::Broadcast(NodeBroadcast {
        origin: a.id(),
        emergency_level: 1,
        announcement_id: 7,
    }));
    keeper.add_pending_claim(Claim::ViolationBlame(NodeViolationBlame {
        origin: a.id(),
        blame_node: NodeId::from_bytes([0x42; 32]),
        type_violation: 2,
    }));
    let report = promote(&keeper, 65537);

    assert_eq!(report.ignored, 2);
    assert_eq!(keeper.get_active_nodes(), vec![a]);
    assert_eq!(keeper.get_stats().claims_ignored, 2);
}

#[test]
fn test_readers_never_observe_partial_merge() {
    let origin = node(0x01, StaticRole::Virtual);
    let keeper = Arc::new(keeper_with_origin(origin.clone()));
    keeper.add_active_nodes(vec![origin]);

    let done = Arc::new(AtomicBool::new(false));
    let reader = {
        let keeper = keeper.clone();
        let done = done.clone();
        thread::spawn(move || {
            let mut observations = 0usize;
            while !done.load(Ordering::Acquire) {
                let stats = keeper.index_stats();
                assert_eq!(stats.nodes, stats.role_entries, "role index out of step: {:?}", stats);
                assert_eq!(stats.nodes, stats.short_ids, "short-id index out of step: {:?}", stats);
                observations += 1;
            }
            observations
        })
    };

    let peers: Vec<Peer> = (0x20..0x40).map(Peer::new).collect();
    let mut pulse = 65537;
    for chunk in peers.chunks(4) {
        for (i, peer) in chunk.iter().enumerate() {
            let role = [StaticRole::Virtual, StaticRole::HeavyMaterial, StaticRole::LightMaterial][i % 3];
            keeper.add_pending_claim(peer.join(role, u32::from(peer.id.as_bytes()[0]), "10.0.1.1:1"));
        }
        promote(&keeper, pulse);
        pulse += 1;
    }
    for peer in peers.iter().step_by(2) {
        keeper.add_pending_claim(Claim::leave(peer.id));
    }
    promote(&keeper, pulse);

    done.store(true, Ordering::Release);
    assert!(reader.join().unwrap() > 0);
    assert_eq!(keeper.get_active_nodes().len(), 1 + peers.len() / 2);
    assert!(keeper.is_index_consistent());
}

#[test]
fn test_independent_keepers_agree_on_order() {
    let nodes: Vec<Node> = [0x33, 0x11, 0x22, 0x44]
        .into_iter()
        .map(|seed| node(seed, StaticRole::LightMaterial))
        .collect();

    let first = keeper_with_origin(nodes[0].clone());
    first.add_active_nodes(nodes.clone());
    let second = keeper_with_origin(nodes[3].clone());
    second.add_active_nodes(nodes.iter().rev().cloned());

    assert_eq!(first.get_active_nodes(), first.get_active_nodes());
    assert_eq!(first.get_active_nodes(), second.get_active_nodes());
    assert_eq!(
        calculate_nodes_hash(&first.get_active_nodes()),
        calculate_nodes_hash(&second.get_active_nodes())
    );
}

#[test]
fn test_dynamic_role_lookup() {
    let heavy = node(0x10, StaticRole::HeavyMaterial);
    let keeper = keeper_with_origin(heavy.clone());
    keeper.add_active_nodes(vec![heavy.clone()]);

    assert_eq!(keeper.get_active_nodes_by_dynamic_role(DynamicRole::HeavyExecutor), Some(vec![heavy.id()]));
    assert_eq!(keeper.get_active_nodes_by_dynamic_role(DynamicRole::VirtualValidator), None);
}
