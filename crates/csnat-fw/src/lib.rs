//! Forwarder-side runtime of the CSNAT audit subsystem.
//!
//! Data flow: a content-store mutation publishes an event on the bus →
//! the auditor computes the keyed tag and applies it to the tree. On a
//! challenge tick the challenger raises a coalesced signal → the
//! forwarding thread drains it in its own poll loop and emits one proof
//! per live entry → the verifier cross-checks each proof against the
//! tree. The SEU injector and the manual flip path corrupt cached bytes
//! *without* publishing events, so the tree keeps the stale tag and the
//! next challenge reports the mismatch.
//!
//! Threading: the forwarding thread owns all cache bytes; the auditor is
//! the tree's only writer; verifier and management handlers read under
//! the shared lock; the challenger only raises a flag.

pub mod auditor;
pub mod bus;
pub mod challenger;
pub mod flip;
pub mod mgmt;
pub mod runtime;
pub mod seu;
pub mod store;
pub mod verifier;

pub use bus::{ChallengeSignal, CsAuditEvent, CsAuditEventKind, CsProof};
pub use flip::{request_flip, FlipOutcome, FlipResult};
pub use mgmt::{CsAuditModule, MgmtReply};
pub use runtime::{global, AuditRuntime};
pub use store::{ContentStore, StoreWiring};
pub use verifier::{CycleSummary, ProofStatus};
