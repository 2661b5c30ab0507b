//! The auditor worker: sole writer of the CSNAT tree.
//!
//! Consumes the audit event stream, computes the keyed tag for each
//! Insert/Refresh, and applies the mutation to the tree. Because there
//! is exactly one consumer on a FIFO queue, events for the same name are
//! applied in producer order.

use crate::bus::{CsAuditEvent, CsAuditEventKind};
use csnat_core::{tag, CsNatTree};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::debug;

/// Spawn the auditor thread. It owns the receiver, so a second consumer
/// cannot exist; the worker runs until every event producer is dropped.
pub fn spawn_auditor(tree: Arc<CsNatTree>, events: Receiver<CsAuditEvent>) -> JoinHandle<()> {
    thread::Builder::new()
        .name("csnat-auditor".into())
        .spawn(move || {
            while let Ok(event) = events.recv() {
                apply_event(&tree, &event);
            }
            debug!("audit event stream closed, auditor exiting");
        })
        .expect("spawn auditor thread")
}

fn apply_event(tree: &CsNatTree, event: &CsAuditEvent) {
    match event.kind {
        CsAuditEventKind::Insert => {
            let tag = tag::compute_tag(&event.name, &event.wire);
            tree.on_insert(&event.name, tag, event.stale_time);
        }
        CsAuditEventKind::Refresh => {
            let tag = tag::compute_tag(&event.name, &event.wire);
            tree.on_refresh(&event.name, tag, event.stale_time);
        }
        CsAuditEventKind::Erase => {
            if !tree.on_erase(&event.name) {
                debug!(name = %event.name, "erase event for a name the tree does not hold");
            }
        }
    }
}
