//! Local-only management query surface for the audit subsystem.
//!
//! Three verbs under `/localhost/nfd/cs-audit`:
//!
//! - `agg[/<prefix...>][/_]` - aggregate digest of the prefix subtree
//!   (32 raw bytes, 404 when the prefix names no node);
//! - `leaf/<name...>/_` - leaf tag of the exact name (32 raw bytes, 404
//!   when no live leaf);
//! - `flip/<name...>/_` - submit a 1-bit flip, wait up to 800 ms, reply
//!   with one human-readable line.
//!
//! The protocol framing (Interest/Data, control-response encoding) is
//! the manager's concern; this module consumes a parsed request name and
//! produces either a dataset payload or a numeric control status.
//! Requests from non-local prefixes are dropped silently.
//!
//! Every response name carries a trailing generic `_` component so the
//! dataset framer's version component cannot clobber a version component
//! inside the user-supplied name; request parsers strip a trailing `_`
//! before using the remainder as the query key. The request-name
//! builders below append it for client tooling.

use crate::bus::FlipSender;
use crate::flip::{request_flip, FlipOutcome};
use chrono::{DateTime, SecondsFormat, Utc};
use csnat_core::name::Component;
use csnat_core::{CsNatTree, Name};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::warn;

/// Local management prefix; requests from outside it are ignored.
pub fn local_prefix() -> &'static Name {
    static PREFIX: OnceLock<Name> = OnceLock::new();
    PREFIX.get_or_init(|| "/localhost/nfd".parse().expect("static prefix parses"))
}

/// Module component under the local prefix.
pub const MODULE: &str = "cs-audit";

/// How long a flip query waits for the forwarding thread's reply.
pub const FLIP_WAIT: Duration = Duration::from_millis(800);

/// Reply produced for a management request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MgmtReply {
    /// Status dataset: response name plus payload bytes.
    Dataset { name: Name, content: Vec<u8> },
    /// Numeric control response (400, 404, 501, 503).
    Control { status: u16, text: String },
}

/// Handler for `cs-audit` management requests.
pub struct CsAuditModule {
    tree: Arc<CsNatTree>,
    flips: FlipSender,
    flip_wait: Duration,
}

impl CsAuditModule {
    pub fn new(tree: Arc<CsNatTree>, flips: FlipSender) -> Self {
        Self {
            tree,
            flips,
            flip_wait: FLIP_WAIT,
        }
    }

    /// Shorten the flip wait; tests exercising the timeout path use this.
    pub fn with_flip_wait(mut self, wait: Duration) -> Self {
        self.flip_wait = wait;
        self
    }

    /// Handle one request name. `None` means the request is not for this
    /// module or not from the local prefix and must be dropped silently.
    pub fn handle_interest(&self, name: &Name) -> Option<MgmtReply> {
        if !local_prefix().is_prefix_of(name) {
            warn!(name = %name, "cs-audit request from non-local source");
            return None;
        }
        let local_len = local_prefix().len();
        if name.len() < local_len + 2 {
            warn!(name = %name, "malformed cs-audit request");
            return Some(MgmtReply::Control {
                status: 400,
                text: "Bad request".into(),
            });
        }
        if !name.components()[local_len].is_generic_str(MODULE) {
            return None; // routed to another module
        }

        let verb = &name.components()[local_len + 1];
        let rest = name.suffix(local_len + 2);
        if verb.is_generic_str("agg") {
            Some(self.agg(rest))
        } else if verb.is_generic_str("leaf") {
            Some(self.leaf(rest))
        } else if verb.is_generic_str("flip") {
            Some(self.flip(rest))
        } else {
            warn!(verb = %verb, "cs-audit request for unknown verb");
            Some(MgmtReply::Control {
                status: 501,
                text: "Unknown verb".into(),
            })
        }
    }

    fn agg(&self, prefix: Name) -> MgmtReply {
        let prefix = strip_marker(prefix);
        match self.tree.get_agg(&prefix) {
            Some(agg) => MgmtReply::Dataset {
                name: agg_request_name(&prefix),
                content: agg.to_vec(),
            },
            None => MgmtReply::Control {
                status: 404,
                text: "Prefix not found".into(),
            },
        }
    }

    fn leaf(&self, target: Name) -> MgmtReply {
        if target.is_empty() {
            return MgmtReply::Control {
                status: 400,
                text: "Missing leaf name".into(),
            };
        }
        let target = strip_marker(target);
        match self.tree.get_leaf(&target) {
            Some(tag) => MgmtReply::Dataset {
                name: leaf_request_name(&target),
                content: tag.to_vec(),
            },
            None => MgmtReply::Control {
                status: 404,
                text: "Name not found".into(),
            },
        }
    }

    fn flip(&self, target: Name) -> MgmtReply {
        if target.is_empty() {
            return MgmtReply::Control {
                status: 400,
                text: "Missing flip target name".into(),
            };
        }
        let target = strip_marker(target);

        let outcome = match request_flip(&self.flips, target.clone(), self.flip_wait) {
            Ok(outcome) => outcome,
            Err(_) => {
                return MgmtReply::Control {
                    status: 503,
                    text: "Flip queue full".into(),
                }
            }
        };

        let msg = match outcome {
            FlipOutcome::TimedOut => "queued=1 flipped=0 found=unknown timeout=1".to_string(),
            FlipOutcome::Completed(res) => format!(
                "queued=1 flipped={} found={} byteIndex={} bitIndex={} old={} new={} time={}",
                res.flipped,
                res.found,
                res.byte_index,
                res.bit_index,
                res.old_byte,
                res.new_byte,
                rfc3339(res.time),
            ),
        };

        MgmtReply::Dataset {
            name: flip_request_name(&target),
            content: msg.into_bytes(),
        }
    }
}

/// Drop a trailing generic `_` marker, if present.
fn strip_marker(name: Name) -> Name {
    match name.last() {
        Some(last) if last.is_generic_str("_") => name.strip_last(),
        _ => name,
    }
}

fn rfc3339(time: std::time::SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn request_name(verb: &str, key: &Name) -> Name {
    local_prefix()
        .append(Component::generic(MODULE))
        .append(Component::generic(verb))
        .join(key)
        .append(Component::generic("_"))
}

/// `/localhost/nfd/cs-audit/agg/<prefix...>/_`
pub fn agg_request_name(prefix: &Name) -> Name {
    request_name("agg", prefix)
}

/// `/localhost/nfd/cs-audit/leaf/<name...>/_`
pub fn leaf_request_name(name: &Name) -> Name {
    request_name("leaf", name)
}

/// `/localhost/nfd/cs-audit/flip/<name...>/_`
pub fn flip_request_name(name: &Name) -> Name {
    request_name("flip", name)
}
