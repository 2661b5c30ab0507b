//! On-demand 1-bit corruption of a named cache entry.
//!
//! Test harnesses use this to force a specific entry into a corrupted
//! state: the flip mutates the cached wire in place and deliberately
//! publishes **no** audit event, so the tree keeps the stale tag and the
//! next challenge surfaces the mismatch.
//!
//! Requests travel over the bounded flip queue and are serviced on the
//! forwarding thread inside [`ContentStore::poll`](crate::store::ContentStore::poll)
//! - the only thread allowed to touch cache bytes.

use crate::bus::FlipSender;
use crate::store::ContentStore;
use csnat_core::name::Component;
use csnat_core::{AuditError, Name, Result};
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{sync_channel, SyncSender};
use std::time::{Duration, SystemTime};
use tracing::info;

/// Result of a serviced flip request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlipResult {
    pub found: bool,
    pub flipped: bool,
    pub byte_index: usize,
    pub bit_index: u8,
    pub old_byte: u8,
    pub new_byte: u8,
    pub time: SystemTime,
}

impl FlipResult {
    fn not_found(time: SystemTime) -> Self {
        Self {
            found: false,
            flipped: false,
            byte_index: 0,
            bit_index: 0,
            old_byte: 0,
            new_byte: 0,
            time,
        }
    }
}

/// A flip request in flight: the target name and the reply slot.
pub struct FlipRequest {
    pub name: Name,
    pub reply: SyncSender<FlipResult>,
}

/// Outcome as seen by the requester.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlipOutcome {
    /// The forwarding thread serviced the request within the wait.
    Completed(FlipResult),
    /// The request was queued but no reply arrived in time. The flip may
    /// still happen; it is submitted, not cancelled.
    TimedOut,
}

/// Submit a flip request and wait up to `timeout` for the reply. A zero
/// timeout queues without waiting. Errors with
/// [`AuditError::FlipQueueFull`] when the queue rejects the request.
pub fn request_flip(flips: &FlipSender, name: Name, timeout: Duration) -> Result<FlipOutcome> {
    let (reply_tx, reply_rx) = sync_channel(1);
    let submitted = flips.submit(FlipRequest {
        name,
        reply: reply_tx,
    });
    if !submitted {
        return Err(AuditError::FlipQueueFull);
    }
    if timeout.is_zero() {
        return Ok(FlipOutcome::TimedOut);
    }
    match reply_rx.recv_timeout(timeout) {
        Ok(result) => Ok(FlipOutcome::Completed(result)),
        Err(_) => Ok(FlipOutcome::TimedOut),
    }
}

impl ContentStore {
    /// Service one flip request. Forwarding-thread only.
    pub(crate) fn handle_flip(&mut self, request: FlipRequest, now: SystemTime) {
        let audit_log = self.audit_log();

        // Exact-name lookup, with two fallbacks for how users write
        // object names:
        //  - names given up to the version get `/seg=0` appended
        //    (multi-packet objects);
        //  - names given with `/seg=0` get it stripped (single-packet
        //    objects carry no segment component).
        let mut target = request.name;
        if !self.has_entry(&target) && !target.last().is_some_and(Component::is_segment) {
            target = target.append(Component::segment(0));
        }
        if !self.has_entry(&target) && target.last().is_some_and(Component::is_segment) {
            let stripped = target.strip_last();
            if self.has_entry(&stripped) {
                target = stripped;
            }
        }

        let Some(wire_len) = self.wire_len(&target).filter(|len| *len > 0) else {
            let _ = request.reply.try_send(FlipResult::not_found(now));
            return;
        };

        let mut r = [0u8; 2];
        self.rng_mut().fill_bytes(&mut r);
        let byte_index = usize::from(r[0]) % wire_len;
        let bit_index = r[1] % 8;
        let mask = 1u8 << bit_index;

        let (old_byte, new_byte) = match self.wire_mut(&target) {
            Some(wire) => {
                let old = wire[byte_index];
                wire[byte_index] = old ^ mask;
                (old, old ^ mask)
            }
            None => {
                let _ = request.reply.try_send(FlipResult::not_found(now));
                return;
            }
        };

        let result = FlipResult {
            found: true,
            flipped: true,
            byte_index,
            bit_index,
            old_byte,
            new_byte,
            time: now,
        };

        if audit_log {
            info!(
                name = %target,
                byte_index,
                bit_index,
                old = old_byte,
                new = new_byte,
                "flipped one bit of a cached entry"
            );
        }

        // No audit event: the corruption is intentionally silent.
        let _ = request.reply.try_send(result);
    }
}
