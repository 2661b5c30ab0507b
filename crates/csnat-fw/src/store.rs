//! Minimal content store honoring the audit subsystem's contract.
//!
//! The real forwarder's CS is outside this crate; what the audit core
//! requires of it is narrow and lives here so the loop is exercisable
//! end to end:
//!
//! - every insert/refresh/erase publishes an audit event carrying a
//!   private copy of the wire bytes;
//! - a single owning thread calls [`ContentStore::poll`], which answers
//!   pending challenges, services flip requests, and runs one SEU step -
//!   all mutation of cache bytes is serialised on that thread;
//! - entries iterate in a deterministic order (a `BTreeMap` keyed by the
//!   name's TLV bytes), which the SEU injector's two scans both rely on.

use crate::bus::{
    ChallengeSignal, CsAuditEvent, CsAuditEventKind, CsProof, EventSender, ProofSender,
};
use crate::flip::FlipRequest;
use crate::seu::SeuState;
use csnat_core::config::SeuConfig;
use csnat_core::{tag, Name};
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::BTreeMap;
use std::sync::mpsc::Receiver;
use std::time::SystemTime;

/// Default entry capacity; the oldest-stale entry is evicted on overflow.
pub const DEFAULT_CAPACITY: usize = 1024;

pub(crate) struct CsEntry {
    pub(crate) name: Name,
    pub(crate) index: u64,
    pub(crate) wire: Vec<u8>,
    pub(crate) stale_time: SystemTime,
}

/// The store's ends of the event bus, produced by the runtime wiring.
pub struct StoreWiring {
    pub events: EventSender,
    pub proofs: ProofSender,
    pub challenge: ChallengeSignal,
    pub flip_rx: Receiver<FlipRequest>,
}

/// In-memory cache of Data packets, owned by the forwarding thread.
pub struct ContentStore {
    entries: BTreeMap<Vec<u8>, CsEntry>,
    capacity: usize,
    events: EventSender,
    proofs: ProofSender,
    challenge: ChallengeSignal,
    flip_rx: Receiver<FlipRequest>,
    seu: SeuState,
    rng: Box<dyn RngCore + Send>,
    audit_log: bool,
}

impl ContentStore {
    pub fn new(wiring: StoreWiring, seu: SeuConfig, capacity: usize, audit_log: bool) -> Self {
        Self {
            entries: BTreeMap::new(),
            capacity: capacity.max(1),
            events: wiring.events,
            proofs: wiring.proofs,
            challenge: wiring.challenge,
            flip_rx: wiring.flip_rx,
            seu: SeuState::new(seu),
            rng: Box::new(OsRng),
            audit_log,
        }
    }

    /// Replace the RNG feeding the flip and SEU paths. Deterministic
    /// tests inject a mock here.
    pub fn set_rng(&mut self, rng: Box<dyn RngCore + Send>) {
        self.rng = rng;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store or refresh a Data packet and publish the matching audit
    /// event with a copy of the wire.
    pub fn insert_data(&mut self, name: Name, wire: Vec<u8>, stale_time: SystemTime) {
        let key = name.encoded();
        let index = entry_index(&key);

        let kind = if let Some(entry) = self.entries.get_mut(&key) {
            entry.wire = wire.clone();
            entry.stale_time = stale_time;
            CsAuditEventKind::Refresh
        } else {
            while self.entries.len() >= self.capacity {
                self.evict_oldest();
            }
            self.entries.insert(
                key,
                CsEntry {
                    name: name.clone(),
                    index,
                    wire: wire.clone(),
                    stale_time,
                },
            );
            CsAuditEventKind::Insert
        };

        self.events.publish(CsAuditEvent {
            kind,
            name,
            index,
            wire,
            stale_time,
        });
    }

    /// Remove the exact-name entry, publishing Erase. Returns `false`
    /// when no such entry exists.
    pub fn erase(&mut self, name: &Name) -> bool {
        let Some(entry) = self.entries.remove(&name.encoded()) else {
            return false;
        };
        self.events.publish(CsAuditEvent {
            kind: CsAuditEventKind::Erase,
            name: entry.name,
            index: entry.index,
            wire: Vec::new(),
            stale_time: entry.stale_time,
        });
        true
    }

    /// One iteration of the forwarding thread's work loop: answer a
    /// pending challenge, service queued flip requests, run the SEU step.
    pub fn poll(&mut self, now: SystemTime) {
        if self.challenge.take() {
            self.answer_challenge(now);
        }
        while let Ok(request) = self.flip_rx.try_recv() {
            self.handle_flip(request, now);
        }
        self.seu_maybe_inject(now);
    }

    /// Recompute the tag of every live entry and publish one proof per
    /// entry, all carrying the cycle timestamp `now`.
    fn answer_challenge(&mut self, now: SystemTime) {
        for entry in self.entries.values() {
            self.proofs.publish(CsProof {
                name: entry.name.clone(),
                index: entry.index,
                computed: tag::compute_tag(&entry.name, &entry.wire),
                time: now,
            });
        }
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .values()
            .min_by_key(|e| e.stale_time)
            .map(|e| e.name.clone());
        if let Some(name) = oldest {
            self.erase(&name);
        }
    }

    pub(crate) fn has_entry(&self, name: &Name) -> bool {
        self.entries.contains_key(&name.encoded())
    }

    /// Wire bytes of the exact-name entry, for inspection.
    pub fn wire(&self, name: &Name) -> Option<&[u8]> {
        self.entries.get(&name.encoded()).map(|e| e.wire.as_slice())
    }

    pub(crate) fn wire_len(&self, name: &Name) -> Option<usize> {
        self.entries.get(&name.encoded()).map(|e| e.wire.len())
    }

    pub(crate) fn wire_mut(&mut self, name: &Name) -> Option<&mut Vec<u8>> {
        self.entries.get_mut(&name.encoded()).map(|e| &mut e.wire)
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = &CsEntry> {
        self.entries.values()
    }

    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = &mut CsEntry> {
        self.entries.values_mut()
    }

    pub(crate) fn rng_mut(&mut self) -> &mut (dyn RngCore + Send) {
        self.rng.as_mut()
    }

    pub(crate) fn seu_state_mut(&mut self) -> &mut SeuState {
        &mut self.seu
    }

    pub(crate) fn seu_state(&self) -> &SeuState {
        &self.seu
    }

    pub(crate) fn audit_log(&self) -> bool {
        self.audit_log
    }
}

/// Stable per-entry index: the leading 8 bytes of SHA-256 over the
/// name's TLV encoding.
fn entry_index(name_bytes: &[u8]) -> u64 {
    let digest = csnat_core::sha256(name_bytes);
    u64::from_be_bytes(digest[..8].try_into().expect("8-byte slice"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{audit_event_channel, flip_channel, proof_channel};
    use csnat_core::metrics::AuditMetrics;
    use std::sync::mpsc::Receiver as StdReceiver;
    use std::sync::Arc;
    use std::time::Duration;

    struct Harness {
        store: ContentStore,
        events_rx: StdReceiver<CsAuditEvent>,
        proofs_rx: StdReceiver<CsProof>,
        challenge: ChallengeSignal,
    }

    fn harness(capacity: usize) -> Harness {
        let metrics = Arc::new(AuditMetrics::new());
        let (events, events_rx) = audit_event_channel(Arc::clone(&metrics));
        let (proofs, proofs_rx) = proof_channel(Arc::clone(&metrics));
        let (_flips, flip_rx) = flip_channel(Arc::clone(&metrics));
        let challenge = ChallengeSignal::new();
        let store = ContentStore::new(
            StoreWiring {
                events,
                proofs,
                challenge: challenge.clone(),
                flip_rx,
            },
            SeuConfig::default(),
            capacity,
            false,
        );
        Harness {
            store,
            events_rx,
            proofs_rx,
            challenge,
        }
    }

    fn name(uri: &str) -> Name {
        uri.parse().unwrap()
    }

    fn t(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn insert_then_refresh_event_kinds() {
        let mut h = harness(16);
        h.store.insert_data(name("/a"), vec![1, 2], t(1));
        h.store.insert_data(name("/a"), vec![3, 4], t(2));

        let first = h.events_rx.try_recv().unwrap();
        assert_eq!(first.kind, CsAuditEventKind::Insert);
        assert_eq!(first.wire, vec![1, 2]);

        let second = h.events_rx.try_recv().unwrap();
        assert_eq!(second.kind, CsAuditEventKind::Refresh);
        assert_eq!(second.wire, vec![3, 4]);
        assert_eq!(second.index, first.index);
        assert_eq!(h.store.len(), 1);
    }

    #[test]
    fn queued_event_wire_is_a_private_copy() {
        let mut h = harness(16);
        h.store.insert_data(name("/a"), vec![0xaa, 0xbb], t(1));

        // Mutate the cached bytes after the event was queued.
        h.store.wire_mut(&name("/a")).unwrap()[0] = 0x00;

        let event = h.events_rx.try_recv().unwrap();
        assert_eq!(event.wire, vec![0xaa, 0xbb]);
    }

    #[test]
    fn erase_publishes_empty_wire() {
        let mut h = harness(16);
        h.store.insert_data(name("/a/b"), vec![9], t(1));
        assert!(h.store.erase(&name("/a/b")));
        assert!(!h.store.erase(&name("/a/b")));

        let _insert = h.events_rx.try_recv().unwrap();
        let erase = h.events_rx.try_recv().unwrap();
        assert_eq!(erase.kind, CsAuditEventKind::Erase);
        assert!(erase.wire.is_empty());
        assert_eq!(erase.name, name("/a/b"));
    }

    #[test]
    fn challenge_emits_one_proof_per_entry_with_shared_time() {
        let mut h = harness(16);
        h.store.insert_data(name("/a"), vec![1], t(1));
        h.store.insert_data(name("/b"), vec![2], t(1));

        h.challenge.raise();
        h.store.poll(t(5));

        let p1 = h.proofs_rx.try_recv().unwrap();
        let p2 = h.proofs_rx.try_recv().unwrap();
        assert!(h.proofs_rx.try_recv().is_err());
        assert_eq!(p1.time, t(5));
        assert_eq!(p2.time, t(5));
        assert_eq!(p1.computed, tag::compute_tag(&p1.name, &[1]));
        assert_eq!(p2.computed, tag::compute_tag(&p2.name, &[2]));
    }

    #[test]
    fn no_challenge_no_proofs() {
        let mut h = harness(16);
        h.store.insert_data(name("/a"), vec![1], t(1));
        h.store.poll(t(5));
        assert!(h.proofs_rx.try_recv().is_err());
    }

    #[test]
    fn overflow_evicts_oldest_stale_entry() {
        let mut h = harness(2);
        h.store.insert_data(name("/old"), vec![1], t(1));
        h.store.insert_data(name("/mid"), vec![2], t(5));
        h.store.insert_data(name("/new"), vec![3], t(9));

        assert_eq!(h.store.len(), 2);
        assert!(!h.store.has_entry(&name("/old")));

        let kinds: Vec<_> = std::iter::from_fn(|| h.events_rx.try_recv().ok())
            .map(|e| (e.kind, e.name.to_string()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (CsAuditEventKind::Insert, "/old".into()),
                (CsAuditEventKind::Insert, "/mid".into()),
                (CsAuditEventKind::Erase, "/old".into()),
                (CsAuditEventKind::Insert, "/new".into()),
            ]
        );
    }

    #[test]
    fn entry_index_is_stable_per_name() {
        let mut h = harness(16);
        h.store.insert_data(name("/idx"), vec![1], t(1));
        h.store.erase(&name("/idx"));
        h.store.insert_data(name("/idx"), vec![2], t(2));

        let indices: Vec<u64> = std::iter::from_fn(|| h.events_rx.try_recv().ok())
            .map(|e| e.index)
            .collect();
        assert_eq!(indices.len(), 3);
        assert!(indices.windows(2).all(|w| w[0] == w[1]));
    }
}
