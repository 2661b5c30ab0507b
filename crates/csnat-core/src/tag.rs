//! Keyed audit tag: HMAC-SHA256 over `(Name, Wire)`.
//!
//! The tag binds *both* the name (so rearranging the tree cannot silently
//! re-key entries) and the wire bytes (so in-place corruption changes the
//! recomputed tag). Domain separation and length prefixes prevent this
//! MAC from colliding with unrelated uses of the same key or with
//! ambiguous concatenations.
//!
//! # Key handling
//!
//! The 32-byte symmetric key is process-wide, initialized exactly once:
//! from `CSNAT_BLS_SK_HEX` (64 hex chars) when present and valid, else a
//! compiled-in constant. The key is shared within one process only; the
//! tag provides corruption detection, not non-repudiation.

use crate::{name::Name, Tag32};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::OnceLock;
use zeroize::Zeroize;

type HmacSha256 = Hmac<Sha256>;

/// Domain separation tag, fixed by the external contract.
const TAG_DOMAIN: &[u8] = b"ndnd-cs-blstag-v1";

/// Environment variable overriding the compiled-in tag key.
pub const KEY_ENV: &str = "CSNAT_BLS_SK_HEX";

/// Compiled-in default tag key. Experiments only; deployments override it
/// through [`KEY_ENV`].
const DEFAULT_KEY: [u8; 32] = [
    0x3a, 0x1f, 0x8b, 0x23, 0x71, 0x4c, 0x9d, 0x5e, 0x0f, 0x44, 0x12, 0x9a, 0x6d, 0x2c, 0x80,
    0x11, 0x55, 0x90, 0xe3, 0x7b, 0x6a, 0x0d, 0x2e, 0x4f, 0x91, 0x0a, 0x7c, 0x3d, 0x18, 0xe6,
    0x2b, 0xc0,
];

static TAG_KEY: OnceLock<[u8; 32]> = OnceLock::new();

fn tag_key() -> &'static [u8; 32] {
    TAG_KEY.get_or_init(|| {
        if let Ok(hex_key) = std::env::var(KEY_ENV) {
            if let Ok(mut bytes) = hex::decode(&hex_key) {
                if bytes.len() == 32 {
                    let mut key = [0u8; 32];
                    key.copy_from_slice(&bytes);
                    bytes.zeroize();
                    return key;
                }
                bytes.zeroize();
            }
            tracing::debug!(var = KEY_ENV, "ignoring invalid tag key override");
        }
        DEFAULT_KEY
    })
}

/// Compute the 32-byte keyed tag binding `name` to `wire`.
///
/// MAC input: `DOMAIN ‖ u32be(|name_bytes|) ‖ name_bytes ‖ u32be(|wire|) ‖ wire`
/// where `name_bytes` is the concatenated component TLV encoding.
pub fn compute_tag(name: &Name, wire: &[u8]) -> Tag32 {
    let mut mac =
        HmacSha256::new_from_slice(tag_key()).expect("HMAC-SHA256 accepts any key size");

    mac.update(TAG_DOMAIN);

    let name_bytes = name.encoded();
    mac.update(&(name_bytes.len() as u32).to_be_bytes());
    mac.update(&name_bytes);

    mac.update(&(wire.len() as u32).to_be_bytes());
    mac.update(wire);

    mac.finalize().into_bytes().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(uri: &str) -> Name {
        uri.parse().unwrap()
    }

    #[test]
    fn tag_is_stable() {
        let n = name("/a/b");
        let wire = [0x01, 0x02, 0x03];
        assert_eq!(compute_tag(&n, &wire), compute_tag(&n, &wire));
    }

    #[test]
    fn tag_changes_with_wire() {
        let n = name("/a/b");
        let t1 = compute_tag(&n, &[0x01, 0x02]);
        let t2 = compute_tag(&n, &[0x01, 0x03]);
        assert_ne!(t1, t2);
    }

    #[test]
    fn tag_changes_with_name() {
        let wire = [0xaa; 16];
        assert_ne!(compute_tag(&name("/a"), &wire), compute_tag(&name("/b"), &wire));
    }

    #[test]
    fn single_bit_flip_changes_tag() {
        let n = name("/d");
        let mut wire = vec![0u8; 64];
        let before = compute_tag(&n, &wire);
        wire[17] ^= 0x08;
        assert_ne!(before, compute_tag(&n, &wire));
    }

    #[test]
    fn length_prefixes_prevent_boundary_shifting() {
        // Moving a byte across the name/wire boundary must not collide.
        let t1 = compute_tag(&name("/ab"), b"c");
        let t2 = compute_tag(&name("/a"), b"bc");
        assert_ne!(t1, t2);
    }

    #[test]
    fn empty_wire_is_valid_input() {
        let n = name("/x");
        assert_eq!(compute_tag(&n, &[]), compute_tag(&n, &[]));
        assert_ne!(compute_tag(&n, &[]), compute_tag(&n, &[0]));
    }
}
