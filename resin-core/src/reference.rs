//! Packed references into a mold.
//!
//! A [`Reference`] is one `u64`. The low [`KIND_BITS`] bits select the [`Kind`], the
//! remaining [`PAYLOAD_BITS`] bits carry either an ident index or a region address.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of low bits holding the kind.
pub const KIND_BITS: u32 = 3;

/// Number of high bits holding the payload.
pub const PAYLOAD_BITS: u32 = 64 - KIND_BITS;

/// Largest payload a reference can carry.
pub const MAX_PAYLOAD: u64 = (1 << PAYLOAD_BITS) - 1;

const KIND_MASK: u64 = (1 << KIND_BITS) - 1;

/// The kind of a reference, stored in its low bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Kind {
    /// Payload indexes the canonical singleton table.
    Ident = 0,
    /// Payload addresses an 8-byte `i64` record.
    Integer = 1,
    /// Payload addresses an 8-byte `f64` record.
    Decimal = 2,
    /// Payload addresses an 8-byte duration record.
    Duration = 3,
    /// Payload addresses an 8-byte timestamp record.
    Datetime = 4,
    /// Payload addresses an 8-byte object id record.
    Object = 5,
    /// Payload addresses an 8-byte record holding the handled function's reference.
    Handler = 6,
    /// Payload addresses a tagged variable-length record.
    Addr = 7,
}

impl Kind {
    fn from_bits(bits: u64) -> Kind {
        match bits & KIND_MASK {
            0 => Kind::Ident,
            1 => Kind::Integer,
            2 => Kind::Decimal,
            3 => Kind::Duration,
            4 => Kind::Datetime,
            5 => Kind::Object,
            6 => Kind::Handler,
            _ => Kind::Addr,
        }
    }
}

/// A packed word identifying an ident, an inline scalar record or a tagged record.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reference(u64);

impl Reference {
    /// The null reference: "absent", used by the empty root slot and unbound proxies.
    pub const NULL: Reference = Reference(0);

    /// Packs a kind and payload. Payload bits above [`PAYLOAD_BITS`] are discarded;
    /// use [`try_pack`](Reference::try_pack) when the payload is not known to fit.
    pub const fn pack(kind: Kind, payload: u64) -> Reference {
        Reference((payload << KIND_BITS) | kind as u64)
    }

    /// Packs a kind and payload, or returns `None` if the payload does not fit.
    pub fn try_pack(kind: Kind, payload: u64) -> Option<Reference> {
        (payload <= MAX_PAYLOAD).then(|| Reference::pack(kind, payload))
    }

    /// Reinterprets a raw word read from a region.
    pub const fn from_raw(raw: u64) -> Reference {
        Reference(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub fn kind(self) -> Kind {
        Kind::from_bits(self.0)
    }

    pub const fn payload(self) -> u64 {
        self.0 >> KIND_BITS
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reference({})", self)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{:#x}", self.kind(), self.payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KINDS: [Kind; 8] = [
        Kind::Ident,
        Kind::Integer,
        Kind::Decimal,
        Kind::Duration,
        Kind::Datetime,
        Kind::Object,
        Kind::Handler,
        Kind::Addr,
    ];

    #[test]
    fn pack_unpack() {
        for kind in KINDS {
            for payload in [0, 1, 24, 0xFFFF_FFFF, MAX_PAYLOAD] {
                let reference = Reference::pack(kind, payload);
                assert_eq!(reference.kind(), kind);
                assert_eq!(reference.payload(), payload);
            }
        }
    }

    #[test]
    fn null_is_ident_zero() {
        assert_eq!(Reference::pack(Kind::Ident, 0), Reference::NULL);
        assert!(Reference::NULL.is_null());
        assert!(!Reference::pack(Kind::Ident, 1).is_null());
    }

    #[test]
    fn try_pack_rejects_wide_payload() {
        assert!(Reference::try_pack(Kind::Addr, MAX_PAYLOAD).is_some());
        assert!(Reference::try_pack(Kind::Addr, MAX_PAYLOAD + 1).is_none());
    }

    #[test]
    fn raw_roundtrip() {
        let reference = Reference::pack(Kind::Addr, 0x40);
        assert_eq!(Reference::from_raw(reference.raw()), reference);
        assert_eq!(reference.raw(), (0x40 << 3) | 7);
    }

    #[test]
    fn display() {
        let reference = Reference::pack(Kind::Integer, 0x18);
        assert_eq!(reference.to_string(), "Integer:0x18");
    }
}
