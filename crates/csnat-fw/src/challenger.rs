//! Periodic challenge timer.
//!
//! Never touches the content store: it only raises the coalesced
//! challenge signal, which the forwarding thread drains in its own poll
//! loop. If the store has not drained a previous signal, repeated ticks
//! stay a single pending request.

use crate::bus::ChallengeSignal;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::info;

/// Spawn the challenge timer. Callers guard the zero-interval
/// (disabled) case; the runtime only spawns this when an interval is
/// configured.
pub fn spawn_challenger(
    interval: Duration,
    signal: ChallengeSignal,
    audit_log: bool,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name("csnat-challenger".into())
        .spawn(move || loop {
            thread::sleep(interval);
            if audit_log {
                info!(interval_ms = interval.as_millis() as u64, "issuing periodic challenge");
            }
            signal.raise();
        })
        .expect("spawn challenger thread")
}
