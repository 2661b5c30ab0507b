//! NDN name model: typed components with TLV wire encoding.
//!
//! The component's full TLV encoding (type + length + value) is the
//! canonical identity everywhere in the audit subsystem: it keys child
//! maps in the aggregation tree and it is the exact byte string fed to
//! the tag function. Keying by bytes (not by a higher-level "component
//! identity") is what makes aggregation deterministic and
//! language-independent.

use crate::{AuditError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// TLV type for a generic name component.
pub const TYPE_GENERIC: u32 = 8;
/// TLV type for a segment-number component (`seg=` in URIs).
pub const TYPE_SEGMENT: u32 = 50;
/// TLV type for a version component (`v=` in URIs).
pub const TYPE_VERSION: u32 = 54;

/// One name component: a TLV type and its value bytes.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Component {
    pub typ: u32,
    pub value: Vec<u8>,
}

impl Component {
    /// Generic component from UTF-8 text.
    pub fn generic(text: impl AsRef<str>) -> Self {
        Self {
            typ: TYPE_GENERIC,
            value: text.as_ref().as_bytes().to_vec(),
        }
    }

    /// Segment-number component (`seg=<n>`).
    pub fn segment(n: u64) -> Self {
        Self {
            typ: TYPE_SEGMENT,
            value: encode_nonneg(n),
        }
    }

    /// Version component (`v=<n>`).
    pub fn version(n: u64) -> Self {
        Self {
            typ: TYPE_VERSION,
            value: encode_nonneg(n),
        }
    }

    pub fn is_segment(&self) -> bool {
        self.typ == TYPE_SEGMENT
    }

    /// True if this is a generic component whose value equals `text`.
    pub fn is_generic_str(&self, text: &str) -> bool {
        self.typ == TYPE_GENERIC && self.value == text.as_bytes()
    }

    /// Full TLV encoding: the canonical identity of this component.
    pub fn encoded(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        write_var_number(&mut out, u64::from(self.typ));
        write_var_number(&mut out, self.value.len() as u64);
        out.extend_from_slice(&self.value);
        out
    }

    pub fn encoded_len(&self) -> usize {
        var_number_len(u64::from(self.typ))
            + var_number_len(self.value.len() as u64)
            + self.value.len()
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.typ {
            TYPE_SEGMENT => write!(f, "seg={}", decode_nonneg(&self.value)),
            TYPE_VERSION => write!(f, "v={}", decode_nonneg(&self.value)),
            _ => {
                for &b in &self.value {
                    // URI-safe characters pass through; everything else is
                    // percent-escaped.
                    if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') {
                        write!(f, "{}", b as char)?;
                    } else {
                        write!(f, "%{:02X}", b)?;
                    }
                }
                Ok(())
            }
        }
    }
}

/// An NDN name: an ordered sequence of components.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Name(pub Vec<Component>);

impl Name {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn components(&self) -> &[Component] {
        &self.0
    }

    pub fn last(&self) -> Option<&Component> {
        self.0.last()
    }

    /// New name with `comp` appended.
    pub fn append(&self, comp: Component) -> Self {
        let mut comps = self.0.clone();
        comps.push(comp);
        Self(comps)
    }

    /// New name with the components of `suffix` appended.
    pub fn join(&self, suffix: &Name) -> Self {
        let mut comps = self.0.clone();
        comps.extend_from_slice(&suffix.0);
        Self(comps)
    }

    /// Prefix of the first `n` components.
    pub fn prefix(&self, n: usize) -> Self {
        Self(self.0[..n.min(self.0.len())].to_vec())
    }

    /// New name with the final component removed; identity on the empty name.
    pub fn strip_last(&self) -> Self {
        match self.0.len() {
            0 => Self::empty(),
            n => self.prefix(n - 1),
        }
    }

    /// Name suffix starting at component `n`.
    pub fn suffix(&self, n: usize) -> Self {
        Self(self.0[n.min(self.0.len())..].to_vec())
    }

    /// True if every component of `self` matches the corresponding
    /// component of `other`.
    pub fn is_prefix_of(&self, other: &Name) -> bool {
        self.0.len() <= other.0.len() && self.0.iter().zip(&other.0).all(|(a, b)| a == b)
    }

    /// Concatenated TLV encodings of all components. This is the byte
    /// string fed to the tag function and hashed for entry indices.
    pub fn encoded(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.0.iter().map(Component::encoded_len).sum());
        for comp in &self.0 {
            write_var_number(&mut out, u64::from(comp.typ));
            write_var_number(&mut out, comp.value.len() as u64);
            out.extend_from_slice(&comp.value);
        }
        out
    }

    /// Decode a name from concatenated component TLVs.
    pub fn decode(mut input: &[u8]) -> Result<Self> {
        let mut comps = Vec::new();
        while !input.is_empty() {
            let (typ, rest) = read_var_number(input)?;
            let (len, rest) = read_var_number(rest)?;
            let len = usize::try_from(len)
                .map_err(|_| AuditError::MalformedTlv("length overflow".into()))?;
            if rest.len() < len {
                return Err(AuditError::MalformedTlv("value truncated".into()));
            }
            let typ = u32::try_from(typ)
                .map_err(|_| AuditError::MalformedTlv("component type too large".into()))?;
            comps.push(Component {
                typ,
                value: rest[..len].to_vec(),
            });
            input = &rest[len..];
        }
        Ok(Self(comps))
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for comp in &self.0 {
            write!(f, "/{comp}")?;
        }
        Ok(())
    }
}

impl FromStr for Name {
    type Err = AuditError;

    /// Parse a URI-style name: `/a/b`, `/obj/v=3/seg=0`. Empty segments
    /// are skipped, so `/`, `//a//` and ` /a/` normalize cleanly.
    fn from_str(s: &str) -> Result<Self> {
        let mut comps = Vec::new();
        for part in s.trim().split('/') {
            if part.is_empty() {
                continue;
            }
            if let Some(n) = part.strip_prefix("seg=") {
                let n = n
                    .parse::<u64>()
                    .map_err(|_| AuditError::InvalidName(format!("bad segment number in {s:?}")))?;
                comps.push(Component::segment(n));
            } else if let Some(n) = part.strip_prefix("v=") {
                let n = n
                    .parse::<u64>()
                    .map_err(|_| AuditError::InvalidName(format!("bad version number in {s:?}")))?;
                comps.push(Component::version(n));
            } else {
                comps.push(Component {
                    typ: TYPE_GENERIC,
                    value: percent_decode(part)?,
                });
            }
        }
        Ok(Self(comps))
    }
}

/// TLV variable-length number encoding (1, 3, 5, or 9 bytes).
fn write_var_number(out: &mut Vec<u8>, n: u64) {
    if n < 253 {
        out.push(n as u8);
    } else if n <= u64::from(u16::MAX) {
        out.push(253);
        out.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= u64::from(u32::MAX) {
        out.push(254);
        out.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        out.push(255);
        out.extend_from_slice(&n.to_be_bytes());
    }
}

fn var_number_len(n: u64) -> usize {
    if n < 253 {
        1
    } else if n <= u64::from(u16::MAX) {
        3
    } else if n <= u64::from(u32::MAX) {
        5
    } else {
        9
    }
}

fn read_var_number(input: &[u8]) -> Result<(u64, &[u8])> {
    let (&first, rest) = input
        .split_first()
        .ok_or_else(|| AuditError::MalformedTlv("empty input".into()))?;
    let (width, rest) = match first {
        253 => (2, rest),
        254 => (4, rest),
        255 => (8, rest),
        b => return Ok((u64::from(b), rest)),
    };
    if rest.len() < width {
        return Err(AuditError::MalformedTlv("number truncated".into()));
    }
    let mut n = 0u64;
    for &b in &rest[..width] {
        n = (n << 8) | u64::from(b);
    }
    Ok((n, &rest[width..]))
}

/// NonNegativeInteger encoding: big-endian in 1, 2, 4, or 8 bytes.
fn encode_nonneg(n: u64) -> Vec<u8> {
    if n <= u64::from(u8::MAX) {
        vec![n as u8]
    } else if n <= u64::from(u16::MAX) {
        (n as u16).to_be_bytes().to_vec()
    } else if n <= u64::from(u32::MAX) {
        (n as u32).to_be_bytes().to_vec()
    } else {
        n.to_be_bytes().to_vec()
    }
}

fn decode_nonneg(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

fn percent_decode(part: &str) -> Result<Vec<u8>> {
    let raw = part.as_bytes();
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'%' {
            if i + 3 > raw.len() {
                return Err(AuditError::InvalidName(format!("truncated escape in {part:?}")));
            }
            let hi = (raw[i + 1] as char)
                .to_digit(16)
                .ok_or_else(|| AuditError::InvalidName(format!("bad escape in {part:?}")))?;
            let lo = (raw[i + 2] as char)
                .to_digit(16)
                .ok_or_else(|| AuditError::InvalidName(format!("bad escape in {part:?}")))?;
            out.push(((hi << 4) | lo) as u8);
            i += 3;
        } else {
            out.push(raw[i]);
            i += 1;
        }
    }
    Ok(out)
}
