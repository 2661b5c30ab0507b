//! The Content Store Name Audit Tree (CSNAT).
//!
//! A name-prefix trie, one level per name component. A node holds the
//! leaf tag for the exact name ending there (`leaf_count > 0` iff that
//! name is resident in the content store) and an aggregate digest derived
//! from its own leaf state plus its children's aggregates. Any leaf
//! mutation recomputes aggregates along the path to the root only;
//! sibling subtrees are untouched.
//!
//! # Aggregation contract
//!
//! ```text
//! agg(n) = SHA256( DOMAIN
//!                ‖ u32be(leaf_count)
//!                ‖ (leaf_tag iff leaf_count > 0)
//!                ‖ u32be(|children|)
//!                ‖ for each child in ascending byte-lex order of comp wire:
//!                      u32be(|comp_wire|) ‖ comp_wire ‖ child.agg )
//! ```
//!
//! Children are keyed by the exact component TLV bytes; a `BTreeMap`
//! iterates them in ascending byte-lex order, which *is* the contract
//! order. Independent implementations replaying the same event sequence
//! must agree on the root aggregate bit for bit.
//!
//! # Concurrency
//!
//! Single writer (the auditor worker), many readers (verifier, mgmt
//! handlers) behind an `RwLock`. Operations never fail and never panic;
//! a poisoned lock is absorbed since every mutation leaves the tree
//! consistent before unlocking.

use crate::{name::Component, name::Name, Tag32};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};
use std::time::SystemTime;

/// Domain separation tag for the aggregate digest, fixed by the external
/// contract.
const AGG_DOMAIN: &[u8] = b"ndnd-csnat-sha256-v1";

/// Debug snapshot of tree size and root aggregate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStats {
    /// Total nodes, including the root.
    pub node_count: u64,
    /// Nodes with `leaf_count > 0`.
    pub active_leaf_count: u64,
    /// Aggregate digest at the root.
    pub root_agg: Tag32,
}

struct Node {
    /// Children keyed by the child component's TLV bytes. Ascending
    /// byte-lex iteration order is the aggregation order.
    children: BTreeMap<Vec<u8>, Node>,

    /// Number of distinct CS residencies of the exact name ending here.
    leaf_count: u32,

    /// Valid iff `leaf_count > 0`.
    leaf_tag: Tag32,

    /// Some iff `leaf_count > 0`.
    stale_time: Option<SystemTime>,

    agg: Tag32,
}

impl Node {
    fn new() -> Self {
        Self {
            children: BTreeMap::new(),
            leaf_count: 0,
            leaf_tag: [0; 32],
            stale_time: None,
            agg: [0; 32],
        }
    }

    fn recompute_agg(&mut self) {
        let mut h = Sha256::new();
        h.update(AGG_DOMAIN);

        h.update(self.leaf_count.to_be_bytes());
        if self.leaf_count > 0 {
            h.update(self.leaf_tag);
        }

        h.update((self.children.len() as u32).to_be_bytes());
        for (comp_wire, child) in &self.children {
            h.update((comp_wire.len() as u32).to_be_bytes());
            h.update(comp_wire);
            h.update(child.agg);
        }

        self.agg = h.finalize().into();
    }

    fn prunable(&self) -> bool {
        self.leaf_count == 0 && self.children.is_empty()
    }
}

struct TreeInner {
    root: Node,
    node_count: u64,
    active_leaf_count: u64,
}

/// Concurrency-safe CSNAT tree.
pub struct CsNatTree {
    inner: RwLock<TreeInner>,
}

impl CsNatTree {
    pub fn new() -> Self {
        let mut root = Node::new();
        // The empty tree's root still has a well-defined aggregate.
        root.recompute_agg();
        Self {
            inner: RwLock::new(TreeInner {
                root,
                node_count: 1,
                active_leaf_count: 0,
            }),
        }
    }

    /// First residency of `name`: bump `leaf_count`, set the leaf tag,
    /// and recompute aggregates along the path to the root.
    pub fn on_insert(&self, name: &Name, tag: Tag32, stale_time: SystemTime) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let TreeInner {
            root,
            node_count,
            active_leaf_count,
        } = &mut *inner;
        apply_leaf(root, name.components(), node_count, |leaf| {
            if leaf.leaf_count == 0 {
                *active_leaf_count += 1;
            }
            leaf.leaf_count += 1;
            leaf.leaf_tag = tag;
            leaf.stale_time = Some(stale_time);
        });
    }

    /// Same-name overwrite: update the leaf tag without changing
    /// `leaf_count`. A refresh with no prior leaf is treated as an
    /// insert, tolerating a lost Insert event.
    pub fn on_refresh(&self, name: &Name, tag: Tag32, stale_time: SystemTime) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let TreeInner {
            root,
            node_count,
            active_leaf_count,
        } = &mut *inner;
        apply_leaf(root, name.components(), node_count, |leaf| {
            if leaf.leaf_count == 0 {
                leaf.leaf_count = 1;
                *active_leaf_count += 1;
            }
            leaf.leaf_tag = tag;
            leaf.stale_time = Some(stale_time);
        });
    }

    /// Eviction/deletion of one residency of `name`. Prunes now-empty
    /// nodes upward and recomputes aggregates from the lowest surviving
    /// node to the root. Returns `false` (with no state change) when the
    /// name has no node or its `leaf_count` is already zero.
    pub fn on_erase(&self, name: &Name) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let TreeInner {
            root,
            node_count,
            active_leaf_count,
        } = &mut *inner;
        erase_at(root, name.components(), node_count, active_leaf_count)
    }

    /// Aggregate digest of the subtree at `prefix`, or `None` when the
    /// prefix names no node.
    pub fn get_agg(&self, prefix: &Name) -> Option<Tag32> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        find_node(&inner.root, prefix.components()).map(|n| n.agg)
    }

    /// Leaf tag of the exact `name`, or `None` when no live leaf exists
    /// there.
    pub fn get_leaf(&self, name: &Name) -> Option<Tag32> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        find_node(&inner.root, name.components())
            .filter(|n| n.leaf_count > 0)
            .map(|n| n.leaf_tag)
    }

    /// Stale time recorded for the exact `name`, when a live leaf exists.
    pub fn get_stale_time(&self, name: &Name) -> Option<SystemTime> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        find_node(&inner.root, name.components())
            .filter(|n| n.leaf_count > 0)
            .and_then(|n| n.stale_time)
    }

    pub fn stats(&self) -> TreeStats {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        TreeStats {
            node_count: inner.node_count,
            active_leaf_count: inner.active_leaf_count,
            root_agg: inner.root.agg,
        }
    }
}

impl Default for CsNatTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Descend to the terminal node for `comps` (creating nodes as needed),
/// apply `mutate` to it, then recompute aggregates on the unwind - the
/// path back to the root.
fn apply_leaf<F>(node: &mut Node, comps: &[Component], node_count: &mut u64, mutate: F)
where
    F: FnOnce(&mut Node),
{
    match comps.split_first() {
        None => mutate(node),
        Some((comp, rest)) => {
            let child = node.children.entry(comp.encoded()).or_insert_with(|| {
                *node_count += 1;
                Node::new()
            });
            apply_leaf(child, rest, node_count, mutate);
        }
    }
    node.recompute_agg();
}

/// Erase walk. Returns `true` iff a live leaf was found and decremented;
/// on the unwind, removes children that became empty and recomputes
/// aggregates for every surviving node on the path. A failed lookup
/// returns without touching any aggregate.
fn erase_at(
    node: &mut Node,
    comps: &[Component],
    node_count: &mut u64,
    active_leaf_count: &mut u64,
) -> bool {
    match comps.split_first() {
        None => {
            if node.leaf_count == 0 {
                return false;
            }
            node.leaf_count -= 1;
            if node.leaf_count == 0 {
                node.stale_time = None;
                *active_leaf_count = active_leaf_count.saturating_sub(1);
            }
            node.recompute_agg();
            true
        }
        Some((comp, rest)) => {
            let key = comp.encoded();
            let Some(child) = node.children.get_mut(&key) else {
                return false;
            };
            if !erase_at(child, rest, node_count, active_leaf_count) {
                return false;
            }
            if child.prunable() {
                node.children.remove(&key);
                *node_count = node_count.saturating_sub(1);
            }
            node.recompute_agg();
            true
        }
    }
}

fn find_node<'a>(mut node: &'a Node, comps: &[Component]) -> Option<&'a Node> {
    for comp in comps {
        node = node.children.get(&comp.encoded())?;
    }
    Some(node)
}
