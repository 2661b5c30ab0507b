//! Counters for the audit subsystem.
//!
//! Dropped events and verifier classifications are the only observable
//! trace of the bus's bounded-lossy policy, so they are tracked here even
//! when logging is off.

use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing counter.
#[derive(Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Counters shared by the bus producers and the verifier.
#[derive(Default)]
pub struct AuditMetrics {
    /// Audit events discarded because the queue was full.
    pub events_dropped: Counter,

    /// Challenge proofs discarded because the queue was full.
    pub proofs_dropped: Counter,

    /// Flip requests rejected with queue-full.
    pub flips_rejected: Counter,

    /// Proofs classified ok / bad / unknown, across all cycles.
    pub proofs_ok: Counter,
    pub proofs_bad: Counter,
    pub proofs_unknown: Counter,

    /// Challenge cycles whose summary was flushed.
    pub cycles_flushed: Counter,
}

impl AuditMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_accumulates() {
        let c = Counter::new();
        c.inc();
        c.inc_by(4);
        assert_eq!(c.get(), 5);
    }
}
