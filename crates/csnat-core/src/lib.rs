//! CSNAT: Content Store Name Audit Tree.
//!
//! Detects silent bit corruption of cached Data packets by maintaining a
//! Merkle-style aggregation tree over per-name keyed tags:
//!
//! 1. Every cached `(Name, Wire)` pair is bound to a 32-byte keyed tag
//!    ([`tag::compute_tag`]).
//! 2. Tags are stored at the leaves of a name-prefix trie whose internal
//!    nodes carry bottom-up aggregated digests ([`tree::CsNatTree`]).
//! 3. A periodic challenge makes the content store recompute every tag;
//!    a verifier compares them against the tree, and any in-place wire
//!    mutation that bypassed the event stream surfaces as a mismatch.
//!
//! # Security model
//!
//! The tag key is symmetric and process-local: this is a **corruption
//! detector**, not an authentication boundary. Any process holding the key
//! can forge tags. The aggregation formula is a bit-for-bit external
//! contract - independent implementations observing the same event
//! sequence must agree on the root aggregate.

pub mod config;
pub mod metrics;
pub mod name;
pub mod tag;
pub mod tree;

use thiserror::Error;

pub use config::AuditConfig;
pub use name::{Component, Name};
pub use tree::{CsNatTree, TreeStats};

/// 32-byte tag/aggregate value used throughout the audit subsystem.
pub type Tag32 = [u8; 32];

/// Compute SHA-256 over arbitrary bytes.
pub fn sha256(data: &[u8]) -> Tag32 {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Unified error type for audit-core operations.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("malformed TLV: {0}")]
    MalformedTlv(String),

    #[error("flip queue full")]
    FlipQueueFull,
}

pub type Result<T> = std::result::Result<T, AuditError>;
