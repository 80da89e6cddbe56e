//! Binary layouts of tagged records and the canonical ident table.
//!
//! ```text
//! offset  width  field
//! 0       4      type tag
//! 4       4      hash
//! 8       4      length
//! 12      4      flags
//! 16      ...    payload
//! ```

use byteorder::{ByteOrder, LittleEndian};

use crate::index::BucketTable;
use crate::key::{DedupKey, Key};
use crate::reference::{Kind, Reference};

/// Size of the record header preceding every payload.
pub const RECORD_HEADER_SIZE: u64 = 16;

/// Flag bit: a hash-bucket table follows the array members.
pub const FLAG_INDEXED: u32 = 1;

pub const IDENT_VOID: u64 = 1;
pub const IDENT_TRUE: u64 = 2;
pub const IDENT_FALSE: u64 = 3;
pub const IDENT_EMPTY_ARRAY: u64 = 4;
pub const IDENT_EMPTY_STRING: u64 = 5;
pub const IDENT_EMPTY_BINARY: u64 = 6;

/// Ident of parameter 0. Parameter `i` is `PARAM_IDENT_BASE + i`.
pub const PARAM_IDENT_BASE: u64 = 16;

/// Parameters at or above this index are written as param records.
pub const PARAM_IDENT_LIMIT: u32 = 240;

pub(crate) const fn ident(payload: u64) -> Reference {
    Reference::pack(Kind::Ident, payload)
}

/// Type tag of an `Addr` record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum Tag {
    Array = 1,
    String8 = 2,
    String16 = 3,
    String32 = 4,
    Binary = 5,
    Future = 6,
    Native = 7,
    Proxy = 8,
    Param = 9,
    Concat = 10,
    Closure = 11,
    Composite = 12,
}

impl Tag {
    pub fn from_u32(value: u32) -> Option<Tag> {
        Some(match value {
            1 => Tag::Array,
            2 => Tag::String8,
            3 => Tag::String16,
            4 => Tag::String32,
            5 => Tag::Binary,
            6 => Tag::Future,
            7 => Tag::Native,
            8 => Tag::Proxy,
            9 => Tag::Param,
            10 => Tag::Concat,
            11 => Tag::Closure,
            12 => Tag::Composite,
            _ => return None,
        })
    }

    /// String tag for code points `width` bytes wide.
    pub fn string(width: u8) -> Tag {
        match width {
            1 => Tag::String8,
            2 => Tag::String16,
            _ => Tag::String32,
        }
    }
}

/// The fixed 16-byte header of a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct RecordHeader {
    pub tag: u32,
    pub hash: u32,
    pub length: u32,
    pub flags: u32,
}

impl RecordHeader {
    pub fn decode(bytes: &[u8; RECORD_HEADER_SIZE as usize]) -> Self {
        RecordHeader {
            tag: LittleEndian::read_u32(&bytes[0..4]),
            hash: LittleEndian::read_u32(&bytes[4..8]),
            length: LittleEndian::read_u32(&bytes[8..12]),
            flags: LittleEndian::read_u32(&bytes[12..16]),
        }
    }
}

/// Assembles a record in memory before it is appended to the arena.
pub(crate) struct RecordBuilder {
    buf: Vec<u8>,
}

impl RecordBuilder {
    /// Starts a record with no flags, reserving room for `payload_len` bytes.
    pub fn new(tag: Tag, hash: u32, length: u32, payload_len: usize) -> Self {
        let mut buf = Vec::with_capacity(RECORD_HEADER_SIZE as usize + payload_len);
        buf.resize(RECORD_HEADER_SIZE as usize, 0);
        LittleEndian::write_u32(&mut buf[0..4], tag as u32);
        LittleEndian::write_u32(&mut buf[4..8], hash);
        LittleEndian::write_u32(&mut buf[8..12], length);
        RecordBuilder { buf }
    }

    pub fn put_ref(&mut self, reference: Reference) {
        self.put_u64(reference.raw());
    }

    pub fn put_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Appends one code point as a `width`-byte unit.
    pub fn put_unit(&mut self, width: u8, value: u32) {
        match width {
            1 => self.buf.push(value as u8),
            2 => self.buf.extend_from_slice(&(value as u16).to_le_bytes()),
            _ => self.buf.extend_from_slice(&value.to_le_bytes()),
        }
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Dedup key of the bytes written so far.
    pub fn key(&self) -> DedupKey {
        DedupKey::Record(Key::of(&self.buf))
    }

    /// Marks the record indexed and appends the table.
    pub fn put_table(&mut self, table: &BucketTable) {
        LittleEndian::write_u32(&mut self.buf[12..16], FLAG_INDEXED);
        let start = self.buf.len();
        self.buf.resize(start + table.encoded_len(), 0);
        table.encode(&mut self.buf[start..]);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_roundtrip() {
        for value in 1..=12 {
            let tag = Tag::from_u32(value).unwrap();
            assert_eq!(tag as u32, value);
        }
        assert_eq!(Tag::from_u32(0), None);
        assert_eq!(Tag::from_u32(13), None);
    }

    #[test]
    fn string_tags_by_width() {
        assert_eq!(Tag::string(1), Tag::String8);
        assert_eq!(Tag::string(2), Tag::String16);
        assert_eq!(Tag::string(4), Tag::String32);
    }

    #[test]
    fn builder_layout() {
        let mut builder = RecordBuilder::new(Tag::Array, 0xAABB_CCDD, 2, 16);
        builder.put_ref(Reference::pack(Kind::Integer, 24));
        builder.put_ref(ident(IDENT_TRUE));
        let bytes = builder.as_bytes();

        assert_eq!(bytes.len(), 32);
        let header = RecordHeader::decode(bytes[..16].try_into().unwrap());
        assert_eq!(
            header,
            RecordHeader {
                tag: 1,
                hash: 0xAABB_CCDD,
                length: 2,
                flags: 0,
            }
        );
        assert_eq!(LittleEndian::read_u64(&bytes[16..24]), (24 << 3) | 1);
        assert_eq!(LittleEndian::read_u64(&bytes[24..32]), 2 << 3);
    }

    #[test]
    fn table_sets_flag_but_not_key() {
        let mut builder = RecordBuilder::new(Tag::Array, 1, 1, 8);
        builder.put_ref(ident(IDENT_VOID));
        let key = builder.key();

        let mut plain = RecordBuilder::new(Tag::Array, 1, 1, 8);
        plain.put_ref(ident(IDENT_VOID));
        assert_eq!(plain.key(), key);

        let table = BucketTable::build(&[7]).unwrap();
        builder.put_table(&table);
        let bytes = builder.as_bytes();
        assert_eq!(LittleEndian::read_u32(&bytes[12..16]), FLAG_INDEXED);
        assert_eq!(bytes.len(), 24 + table.encoded_len());
    }

    #[test]
    fn units_are_little_endian() {
        let mut builder = RecordBuilder::new(Tag::String16, 0, 1, 2);
        builder.put_unit(2, 0x20AC);
        assert_eq!(&builder.as_bytes()[16..], &[0xAC, 0x20]);
    }
}
