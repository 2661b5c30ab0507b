//! Bounded, lossy queues between the forwarding thread and the audit
//! workers.
//!
//! Producers never block: a full queue discards the submission. An
//! Insert event dropped at peak load becomes a transient "unknown" at
//! the verifier on the next challenge - acceptable, where stalling the
//! forwarding thread to deliver audit data would not be. Drops are
//! counted in [`AuditMetrics`] and logged at debug level only.
//!
//! The challenge signal is not a queue but a level-triggered flag:
//! repeated raises before the content store drains it coalesce into a
//! single pending request.

use crate::flip::FlipRequest;
use csnat_core::metrics::AuditMetrics;
use csnat_core::{Name, Tag32};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::debug;

/// Capacity of the CS → auditor event queue.
pub const AUDIT_EVENT_CAPACITY: usize = 1024;
/// Capacity of the CS → verifier proof queue.
pub const PROOF_CAPACITY: usize = 1024;
/// Capacity of the mgmt → CS flip request queue.
pub const FLIP_CAPACITY: usize = 16;

/// What kind of CS mutation occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CsAuditEventKind {
    Insert,
    Refresh,
    Erase,
}

/// Published when the content store stores, refreshes, or erases a Data
/// packet. `wire` is a private copy of the cached packet's encoding
/// taken at publish time (empty for Erase); later in-place mutation of
/// the CS entry cannot reach an already-queued event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CsAuditEvent {
    pub kind: CsAuditEventKind,
    pub name: Name,
    pub index: u64,
    pub wire: Vec<u8>,
    pub stale_time: SystemTime,
}

/// One entry's response to a challenge: the freshly recomputed tag.
/// All proofs of one challenge cycle carry the same `time`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CsProof {
    pub name: Name,
    pub index: u64,
    pub computed: Tag32,
    pub time: SystemTime,
}

/// Non-blocking producer handle for the audit event queue.
#[derive(Clone)]
pub struct EventSender {
    tx: SyncSender<CsAuditEvent>,
    metrics: Arc<AuditMetrics>,
}

impl EventSender {
    /// Offer an event; returns `false` when it was discarded.
    pub fn publish(&self, event: CsAuditEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                self.metrics.events_dropped.inc();
                debug!(name = %event.name, "audit event queue full, dropping event");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Non-blocking producer handle for the proof queue.
#[derive(Clone)]
pub struct ProofSender {
    tx: SyncSender<CsProof>,
    metrics: Arc<AuditMetrics>,
}

impl ProofSender {
    pub fn publish(&self, proof: CsProof) -> bool {
        match self.tx.try_send(proof) {
            Ok(()) => true,
            Err(TrySendError::Full(proof)) => {
                self.metrics.proofs_dropped.inc();
                debug!(name = %proof.name, "proof queue full, dropping proof");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Coalesced challenge request flag. Raising an already-pending signal
/// is a no-op; the content store drains it in its own poll loop.
#[derive(Clone, Default)]
pub struct ChallengeSignal {
    pending: Arc<AtomicBool>,
}

impl ChallengeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.pending.store(true, Ordering::Release);
    }

    /// Consume the pending signal, if any.
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }
}

/// Producer handle for flip requests. Unlike the event queues, a full
/// queue is reported to the caller - the mgmt edge turns it into a 503.
#[derive(Clone)]
pub struct FlipSender {
    tx: SyncSender<FlipRequest>,
    metrics: Arc<AuditMetrics>,
}

impl FlipSender {
    /// Offer a request; returns `false` when the queue is full or the
    /// consumer is gone.
    pub fn submit(&self, request: FlipRequest) -> bool {
        match self.tx.try_send(request) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.metrics.flips_rejected.inc();
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

pub fn audit_event_channel(metrics: Arc<AuditMetrics>) -> (EventSender, Receiver<CsAuditEvent>) {
    let (tx, rx) = sync_channel(AUDIT_EVENT_CAPACITY);
    (EventSender { tx, metrics }, rx)
}

pub fn proof_channel(metrics: Arc<AuditMetrics>) -> (ProofSender, Receiver<CsProof>) {
    let (tx, rx) = sync_channel(PROOF_CAPACITY);
    (ProofSender { tx, metrics }, rx)
}

pub fn flip_channel(metrics: Arc<AuditMetrics>) -> (FlipSender, Receiver<FlipRequest>) {
    let (tx, rx) = sync_channel(FLIP_CAPACITY);
    (FlipSender { tx, metrics }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::sync_channel as reply_channel;

    fn event(uri: &str) -> CsAuditEvent {
        CsAuditEvent {
            kind: CsAuditEventKind::Insert,
            name: uri.parse().unwrap(),
            index: 0,
            wire: vec![1, 2, 3],
            stale_time: SystemTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn full_event_queue_drops_and_counts() {
        let metrics = Arc::new(AuditMetrics::new());
        let (tx, _rx) = audit_event_channel(Arc::clone(&metrics));

        for _ in 0..AUDIT_EVENT_CAPACITY {
            assert!(tx.publish(event("/a")));
        }
        assert!(!tx.publish(event("/overflow")));
        assert!(!tx.publish(event("/overflow")));
        assert_eq!(metrics.events_dropped.get(), 2);
    }

    #[test]
    fn disconnected_queue_does_not_count_as_drop() {
        let metrics = Arc::new(AuditMetrics::new());
        let (tx, rx) = audit_event_channel(Arc::clone(&metrics));
        drop(rx);
        assert!(!tx.publish(event("/a")));
        assert_eq!(metrics.events_dropped.get(), 0);
    }

    #[test]
    fn challenge_signal_coalesces() {
        let signal = ChallengeSignal::new();
        assert!(!signal.take());

        signal.raise();
        signal.raise();
        signal.raise();
        assert!(signal.take());
        assert!(!signal.take());
    }

    #[test]
    fn flip_queue_reports_full() {
        let metrics = Arc::new(AuditMetrics::new());
        let (tx, _rx) = flip_channel(Arc::clone(&metrics));

        for _ in 0..FLIP_CAPACITY {
            let (reply, _keep) = reply_channel(1);
            assert!(tx.submit(FlipRequest {
                name: "/x".parse().unwrap(),
                reply,
            }));
        }
        let (reply, _keep) = reply_channel(1);
        assert!(!tx.submit(FlipRequest {
            name: "/x".parse().unwrap(),
            reply,
        }));
        assert_eq!(metrics.flips_rejected.get(), 1);
    }
}
