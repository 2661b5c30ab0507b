//! The verifier worker: cross-checks challenge proofs against the tree.
//!
//! Proofs arrive grouped by challenge cycle - every proof of one cycle
//! carries the same timestamp, and the store emits cycles back to back -
//! so a timestamp change marks a cycle boundary and flushes the previous
//! cycle's tally. Per proof:
//!
//! - **unknown**: the tree holds no leaf tag for the name. Usually a
//!   race with a still-queued event or a dropped one; counted, not
//!   reported.
//! - **ok**: recomputed tag matches the tree.
//! - **bad**: mismatch - the corruption-detection signal. Logged at
//!   warning level; up to five samples per cycle are kept in the
//!   summary.

use crate::bus::CsProof;
use csnat_core::metrics::AuditMetrics;
use csnat_core::{CsNatTree, Tag32};
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::SystemTime;
use tracing::{info, warn};

/// Mismatched-name samples retained per cycle.
const MAX_BAD_SAMPLES: usize = 5;

/// Classification of a single proof.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProofStatus {
    Ok,
    Bad,
    Unknown,
}

/// Aggregated result of one challenge cycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub time: SystemTime,
    pub ok: u64,
    pub bad: u64,
    pub unknown: u64,
    /// Up to [`MAX_BAD_SAMPLES`] entries of `<name>: exp=<8hex> got=<8hex>`.
    pub bad_samples: Vec<String>,
}

/// Per-cycle tally. Pure accounting, no I/O; the worker thread feeds it
/// and emits whatever it flushes.
#[derive(Default)]
pub struct CycleTally {
    time: Option<SystemTime>,
    ok: u64,
    bad: u64,
    unknown: u64,
    bad_samples: Vec<String>,
}

impl CycleTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account one proof against the expected leaf tag. When the proof
    /// opens a new cycle, the previous cycle's summary is returned.
    pub fn observe(
        &mut self,
        proof: &CsProof,
        expected: Option<Tag32>,
    ) -> (ProofStatus, Option<CycleSummary>) {
        let flushed = if self.time.is_some_and(|t| t != proof.time) {
            self.flush()
        } else {
            None
        };
        self.time.get_or_insert(proof.time);

        let status = match expected {
            None => {
                self.unknown += 1;
                ProofStatus::Unknown
            }
            Some(expected) if expected == proof.computed => {
                self.ok += 1;
                ProofStatus::Ok
            }
            Some(expected) => {
                self.bad += 1;
                if self.bad_samples.len() < MAX_BAD_SAMPLES {
                    self.bad_samples.push(format!(
                        "{}: exp={} got={}",
                        proof.name,
                        hex::encode(&expected[..8]),
                        hex::encode(&proof.computed[..8]),
                    ));
                }
                ProofStatus::Bad
            }
        };
        (status, flushed)
    }

    /// Close the current cycle, if one is open, and return its summary.
    pub fn flush(&mut self) -> Option<CycleSummary> {
        let time = self.time.take()?;
        let summary = CycleSummary {
            time,
            ok: std::mem::take(&mut self.ok),
            bad: std::mem::take(&mut self.bad),
            unknown: std::mem::take(&mut self.unknown),
            bad_samples: std::mem::take(&mut self.bad_samples),
        };
        Some(summary)
    }
}

/// Spawn the verifier thread. Reads the tree under its shared lock; the
/// optional `summary_tx` receives every flushed cycle (integration tests
/// and external policy hooks attach here). Exits when all proof
/// producers are gone, flushing the final cycle first.
pub fn spawn_verifier(
    tree: Arc<CsNatTree>,
    proofs: Receiver<CsProof>,
    metrics: Arc<AuditMetrics>,
    summary_tx: Option<SyncSender<CycleSummary>>,
    audit_log: bool,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name("csnat-verifier".into())
        .spawn(move || {
            let mut tally = CycleTally::new();
            while let Ok(proof) = proofs.recv() {
                let expected = tree.get_leaf(&proof.name);
                let (status, flushed) = tally.observe(&proof, expected);
                match status {
                    ProofStatus::Ok => metrics.proofs_ok.inc(),
                    ProofStatus::Unknown => metrics.proofs_unknown.inc(),
                    ProofStatus::Bad => {
                        metrics.proofs_bad.inc();
                        warn!(name = %proof.name, "cached entry failed tag verification");
                    }
                }
                if let Some(summary) = flushed {
                    emit(&metrics, &summary_tx, summary, audit_log);
                }
            }
            if let Some(summary) = tally.flush() {
                emit(&metrics, &summary_tx, summary, audit_log);
            }
        })
        .expect("spawn verifier thread")
}

fn emit(
    metrics: &AuditMetrics,
    summary_tx: &Option<SyncSender<CycleSummary>>,
    summary: CycleSummary,
    audit_log: bool,
) {
    metrics.cycles_flushed.inc();
    if audit_log {
        info!(
            ok = summary.ok,
            bad = summary.bad,
            unknown = summary.unknown,
            samples = ?summary.bad_samples,
            "challenge cycle verified"
        );
    }
    if let Some(tx) = summary_tx {
        let _ = tx.try_send(summary);
    }
}
