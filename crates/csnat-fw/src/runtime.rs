//! Wiring: build the tree and the bus, spawn the workers.
//!
//! One [`AuditRuntime`] owns the audit side of the subsystem - the tree,
//! the worker threads, and the producer handles the rest of the process
//! uses. The content-store side of the bus is handed out exactly once
//! through [`AuditRuntime::take_store_wiring`]; the forwarding thread
//! builds its [`ContentStore`](crate::store::ContentStore) from it.
//!
//! [`global`] starts a process-wide runtime from the environment,
//! idempotently: concurrent callers race to initialize once and all
//! observe the same instance. Workers are never cancelled; they run
//! until their producers disappear, which for the global runtime means
//! process exit.

use crate::auditor::spawn_auditor;
use crate::bus::{
    audit_event_channel, flip_channel, proof_channel, ChallengeSignal, FlipSender,
};
use crate::challenger::spawn_challenger;
use crate::mgmt::CsAuditModule;
use crate::store::StoreWiring;
use crate::verifier::{spawn_verifier, CycleSummary};
use csnat_core::metrics::AuditMetrics;
use csnat_core::{AuditConfig, CsNatTree};
use std::sync::mpsc::SyncSender;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread::JoinHandle;

/// A started audit subsystem.
pub struct AuditRuntime {
    tree: Arc<CsNatTree>,
    metrics: Arc<AuditMetrics>,
    flips: FlipSender,
    challenge: ChallengeSignal,
    config: AuditConfig,
    wiring: Mutex<Option<StoreWiring>>,
    workers: Vec<JoinHandle<()>>,
}

impl AuditRuntime {
    /// Build the bus, spawn auditor + verifier (and the challenger when
    /// an interval is configured).
    pub fn start(config: AuditConfig) -> Self {
        Self::start_with_summary(config, None)
    }

    /// Like [`start`](Self::start), with a sink receiving every flushed
    /// challenge-cycle summary.
    pub fn start_with_summary(
        config: AuditConfig,
        summary_tx: Option<SyncSender<CycleSummary>>,
    ) -> Self {
        let tree = Arc::new(CsNatTree::new());
        let metrics = Arc::new(AuditMetrics::new());

        let (events, events_rx) = audit_event_channel(Arc::clone(&metrics));
        let (proofs, proofs_rx) = proof_channel(Arc::clone(&metrics));
        let (flips, flip_rx) = flip_channel(Arc::clone(&metrics));
        let challenge = ChallengeSignal::new();

        let mut workers = Vec::new();
        workers.push(spawn_auditor(Arc::clone(&tree), events_rx));
        workers.push(spawn_verifier(
            Arc::clone(&tree),
            proofs_rx,
            Arc::clone(&metrics),
            summary_tx,
            config.audit_log,
        ));
        if let Some(interval) = config.challenge_interval {
            workers.push(spawn_challenger(
                interval,
                challenge.clone(),
                config.audit_log,
            ));
        }

        Self {
            tree,
            metrics,
            flips,
            challenge: challenge.clone(),
            config,
            wiring: Mutex::new(Some(StoreWiring {
                events,
                proofs,
                challenge,
                flip_rx,
            })),
            workers,
        }
    }

    /// The content-store side of the bus. Yields `Some` exactly once:
    /// there is one forwarding thread and one flip-request consumer.
    pub fn take_store_wiring(&self) -> Option<StoreWiring> {
        self.wiring
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn tree(&self) -> Arc<CsNatTree> {
        Arc::clone(&self.tree)
    }

    pub fn metrics(&self) -> Arc<AuditMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Producer handle for flip requests (mgmt handlers clone this).
    pub fn flip_sender(&self) -> FlipSender {
        self.flips.clone()
    }

    /// Raise an out-of-band challenge, as the periodic challenger would.
    pub fn raise_challenge(&self) {
        self.challenge.raise();
    }

    /// A management module bound to this runtime's tree and flip queue.
    pub fn mgmt_module(&self) -> CsAuditModule {
        CsAuditModule::new(self.tree(), self.flips.clone())
    }

    /// Worker handles, for tests that join after closing the bus.
    pub fn workers(&self) -> &[JoinHandle<()>] {
        &self.workers
    }
}

/// The process-wide audit runtime, configured from the environment on
/// first use. Subsequent calls return the same instance.
pub fn global() -> &'static AuditRuntime {
    static GLOBAL: OnceLock<AuditRuntime> = OnceLock::new();
    GLOBAL.get_or_init(|| AuditRuntime::start(AuditConfig::from_env()))
}
