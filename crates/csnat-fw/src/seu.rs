//! Poisson-process Single Event Upset injector.
//!
//! Models independent per-bit flips at rate `r` (per bit per day): with
//! `B` cached bits in scope, flip events arrive at `λ = (r/86400)·B`
//! per second, so inter-arrival times are exponential. Each event flips
//! one uniformly chosen bit in place, publishing no audit event - the
//! corruption is silent by construction and must be caught by the next
//! challenge.
//!
//! Runs on the forwarding thread inside
//! [`ContentStore::poll`](crate::store::ContentStore::poll). Both scans
//! (bit total, then bit selection) walk the store's `BTreeMap` in the
//! same deterministic order; a nondeterministic container here would
//! break bit uniformity.

use crate::store::ContentStore;
use csnat_core::config::SeuConfig;
use rand::RngCore;
use std::time::{Duration, SystemTime};
use tracing::info;

/// Retry delay when the scope currently holds no bits, and floor for a
/// degenerate exponential sample.
const EMPTY_SCOPE_RETRY: Duration = Duration::from_secs(30);

/// Cap on the sampled inter-arrival time. A tiny λ would otherwise
/// produce durations beyond what `Duration` arithmetic on wall-clock
/// time can carry.
const MAX_INTERVAL: Duration = Duration::from_secs(200 * 365 * 24 * 3600);

/// Injector state carried by the content store.
pub struct SeuState {
    config: SeuConfig,
    next: Option<SystemTime>,
}

impl SeuState {
    pub(crate) fn new(config: SeuConfig) -> Self {
        Self { config, next: None }
    }

    pub(crate) fn next_attempt(&self) -> Option<SystemTime> {
        self.next
    }
}

impl ContentStore {
    /// One SEU step. Flips at most one bit; reschedules itself by
    /// sampling the next inter-arrival time. Forwarding-thread only.
    pub(crate) fn seu_maybe_inject(&mut self, now: SystemTime) {
        if !self.seu_state().config.enabled {
            return;
        }
        if let Some(next) = self.seu_state().next_attempt() {
            if now < next {
                return;
            }
        }

        let prefix = self.seu_state().config.prefix.clone();
        let log = self.seu_state().config.log;

        // Total bits currently in scope.
        let total_bits: u64 = self
            .entries()
            .filter(|e| !e.wire.is_empty() && prefix.is_prefix_of(&e.name))
            .map(|e| e.wire.len() as u64 * 8)
            .sum();

        if total_bits == 0 {
            self.seu_state_mut().next = Some(now + EMPTY_SCOPE_RETRY);
            return;
        }

        // One flip event: pick the target bit uniformly, then locate it
        // by walking entries in the same order the total was computed.
        let target_bit = self.rng_mut().next_u64() % total_bits;
        let mut seen_bits = 0u64;
        for entry in self.entries_mut() {
            if entry.wire.is_empty() || !prefix.is_prefix_of(&entry.name) {
                continue;
            }
            let entry_bits = entry.wire.len() as u64 * 8;
            if target_bit >= seen_bits + entry_bits {
                seen_bits += entry_bits;
                continue;
            }

            let offset = target_bit - seen_bits;
            let byte_index = (offset / 8) as usize;
            let bit_index = (offset % 8) as u8;
            let mask = 1u8 << bit_index;

            let old = entry.wire[byte_index];
            let new = old ^ mask;
            entry.wire[byte_index] = new;

            if log {
                info!(
                    name = %entry.name,
                    byte_index,
                    bit_index,
                    old,
                    new,
                    total_bits,
                    prefix = %prefix,
                    "SEU injected: flipped one random cached bit"
                );
            }
            break;
        }

        let rate_per_day = self.seu_state().config.rate_per_bit_per_day;
        let lambda_per_sec = (rate_per_day / 86_400.0) * total_bits as f64;
        let u = rand_f64_open01(self.rng_mut());
        let delta = match exp_interval(lambda_per_sec, u) {
            Some(d) if !d.is_zero() => d,
            _ => EMPTY_SCOPE_RETRY,
        };
        self.seu_state_mut().next = Some(now + delta);
    }
}

/// Map a uniform `u64` to (0, 1), never exactly zero so `ln` stays finite.
fn rand_f64_open01(rng: &mut (dyn RngCore + Send)) -> f64 {
    let raw = rng.next_u64().max(1);
    raw as f64 / (u64::MAX as f64 + 1.0)
}

/// Sample an exponential inter-arrival time: `Δ = -ln(u) / λ`, clamped
/// to [`MAX_INTERVAL`]. `None` for a degenerate rate.
fn exp_interval(lambda_per_sec: f64, u: f64) -> Option<Duration> {
    if !(lambda_per_sec.is_finite() && lambda_per_sec > 0.0) {
        return None;
    }
    let secs = (-u.ln() / lambda_per_sec).max(0.0);
    if !secs.is_finite() || secs >= MAX_INTERVAL.as_secs_f64() {
        return Some(MAX_INTERVAL);
    }
    Some(Duration::from_secs_f64(secs))
}
