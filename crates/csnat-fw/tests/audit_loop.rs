//! End-to-end scenarios: events through the bus into the tree, and the
//! full challenge/verify loop catching silent corruption.

use csnat_core::config::SeuConfig;
use csnat_core::name::Component;
use csnat_core::{tag, AuditConfig, Name, Tag32};
use csnat_fw::{request_flip, AuditRuntime, ContentStore, FlipOutcome};
use sha2::{Digest, Sha256};
use std::sync::mpsc::sync_channel;
use std::time::{Duration, SystemTime};

const AGG_DOMAIN: &[u8] = b"ndnd-csnat-sha256-v1";

fn name(uri: &str) -> Name {
    uri.parse().unwrap()
}

fn t(secs: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
}

fn empty_root_agg() -> Tag32 {
    let mut h = Sha256::new();
    h.update(AGG_DOMAIN);
    h.update(0u32.to_be_bytes());
    h.update(0u32.to_be_bytes());
    h.finalize().into()
}

/// Spin until `pred` holds; the auditor applies events asynchronously.
fn wait_until(pred: impl Fn() -> bool) {
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while !pred() {
        assert!(
            std::time::Instant::now() < deadline,
            "condition not reached within 5s"
        );
        std::thread::sleep(Duration::from_millis(2));
    }
}

fn start_store(runtime: &AuditRuntime) -> (ContentStore, csnat_fw::ChallengeSignal) {
    let wiring = runtime.take_store_wiring().expect("wiring available");
    let challenge = wiring.challenge.clone();
    let store = ContentStore::new(wiring, SeuConfig::default(), 64, false);
    (store, challenge)
}

#[test]
fn empty_tree_has_the_defined_root_aggregate() {
    let runtime = AuditRuntime::start(AuditConfig::default());
    let stats = runtime.tree().stats();
    assert_eq!(stats.node_count, 1);
    assert_eq!(stats.active_leaf_count, 0);
    assert_eq!(stats.root_agg, empty_root_agg());
}

#[test]
fn single_insert_flows_into_the_tree() {
    let runtime = AuditRuntime::start(AuditConfig::default());
    let (mut store, _challenge) = start_store(&runtime);
    let tree = runtime.tree();
    let n = name("/a/b");

    store.insert_data(n.clone(), vec![0x01, 0x02], t(1));
    wait_until(|| tree.get_leaf(&n).is_some());

    let stats = tree.stats();
    assert_eq!(stats.node_count, 3); // root, "a", "b"
    assert_eq!(stats.active_leaf_count, 1);
    assert_eq!(tree.get_leaf(&n), Some(tag::compute_tag(&n, &[0x01, 0x02])));

    // agg("/a") follows the aggregation formula over its single child.
    let b_wire = Component::generic("b").encoded();
    let b_agg = tree.get_agg(&n).unwrap();
    let mut h = Sha256::new();
    h.update(AGG_DOMAIN);
    h.update(0u32.to_be_bytes());
    h.update(1u32.to_be_bytes());
    h.update((b_wire.len() as u32).to_be_bytes());
    h.update(&b_wire);
    h.update(b_agg);
    let expected: Tag32 = h.finalize().into();
    assert_eq!(tree.get_agg(&name("/a")), Some(expected));
}

#[test]
fn refresh_rekeys_the_leaf_in_place() {
    let runtime = AuditRuntime::start(AuditConfig::default());
    let (mut store, _challenge) = start_store(&runtime);
    let tree = runtime.tree();
    let n = name("/x");

    store.insert_data(n.clone(), vec![1], t(1));
    wait_until(|| tree.get_leaf(&n).is_some());
    let before = tree.stats();

    store.insert_data(n.clone(), vec![2], t(2));
    wait_until(|| tree.get_leaf(&n) == Some(tag::compute_tag(&n, &[2])));

    let after = tree.stats();
    assert_eq!(after.active_leaf_count, 1);
    assert_eq!(after.node_count, before.node_count);
    assert_ne!(after.root_agg, before.root_agg);
}

#[test]
fn erase_returns_the_tree_to_its_prior_state() {
    let runtime = AuditRuntime::start(AuditConfig::default());
    let (mut store, _challenge) = start_store(&runtime);
    let tree = runtime.tree();
    let n = name("/p/q/r");

    store.insert_data(n.clone(), vec![9, 9], t(1));
    wait_until(|| tree.get_leaf(&n).is_some());
    assert_eq!(tree.stats().node_count, 4);

    assert!(store.erase(&n));
    wait_until(|| tree.stats().node_count == 1);

    let stats = tree.stats();
    assert_eq!(stats.active_leaf_count, 0);
    assert_eq!(stats.root_agg, empty_root_agg());
}

#[test]
fn challenge_catches_a_silent_bit_flip() {
    let (summary_tx, summary_rx) = sync_channel(16);
    let runtime = AuditRuntime::start_with_summary(AuditConfig::default(), Some(summary_tx));
    let (mut store, challenge) = start_store(&runtime);
    let tree = runtime.tree();
    let n = name("/d");

    store.insert_data(n.clone(), vec![0x10, 0x20, 0x30], t(1));
    wait_until(|| tree.get_leaf(&n).is_some());

    // Cycle 1: the cache is intact.
    challenge.raise();
    store.poll(t(10));

    // Flip one bit without publishing an event; the store services the
    // queued request on its next poll.
    let outcome = request_flip(&runtime.flip_sender(), n.clone(), Duration::ZERO).unwrap();
    assert_eq!(outcome, FlipOutcome::TimedOut); // queued, unconfirmed
    store.poll(t(11));
    assert_ne!(store.wire(&n).unwrap(), &[0x10, 0x20, 0x30]);

    // The tree still holds the pre-flip tag.
    assert_eq!(tree.get_leaf(&n), Some(tag::compute_tag(&n, &[0x10, 0x20, 0x30])));

    // Cycle 2: the recomputed tag no longer matches.
    challenge.raise();
    store.poll(t(12));

    // Closing the store ends the proof stream; the verifier flushes the
    // final cycle on exit.
    drop(store);

    let first = summary_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!((first.ok, first.bad, first.unknown), (1, 0, 0));

    let second = summary_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!((second.ok, second.bad), (0, 1));
    assert_eq!(second.bad_samples.len(), 1);
    assert!(
        second.bad_samples[0].starts_with("/d: exp="),
        "sample names the corrupted entry: {}",
        second.bad_samples[0]
    );

    let metrics = runtime.metrics();
    assert_eq!(metrics.proofs_ok.get(), 1);
    assert_eq!(metrics.proofs_bad.get(), 1);
    assert_eq!(metrics.cycles_flushed.get(), 2);
}

#[test]
fn insert_racing_a_challenge_counts_as_unknown() {
    let (summary_tx, summary_rx) = sync_channel(16);
    let runtime = AuditRuntime::start_with_summary(AuditConfig::default(), Some(summary_tx));
    let (mut store, _challenge) = start_store(&runtime);

    // Challenge immediately after the insert: the proof may overtake the
    // still-queued event, in which case the verifier counts the entry as
    // unknown rather than reporting it. Either way it is never "bad".
    store.insert_data(name("/racy"), vec![1], t(1));
    runtime.raise_challenge();
    store.poll(t(2));
    drop(store);

    let summary = summary_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(summary.unknown + summary.ok, 1);
    assert_eq!(summary.bad, 0);
}
