//! Content identity of written records, as tracked by the dedup table.

use std::fmt;

use crate::reference::Kind;

/// Blake3 digest of a record's header and payload bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Key([u8; 32]);

impl Key {
    pub fn of(record: &[u8]) -> Self {
        Key(*blake3::hash(record).as_bytes())
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Key(")?;
        for byte in &self.0[..8] {
            write!(f, "{byte:02x}")?;
        }
        f.write_str("..)")
    }
}

/// Identity of a record's content in the dedup table.
///
/// Inline scalars are keyed by kind and raw bits, records by the key of their bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum DedupKey {
    Scalar(Kind, u64),
    Record(Key),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{IDENT_TRUE, IDENT_VOID, RecordBuilder, Tag, ident};

    fn closure_over(payload: u64) -> RecordBuilder {
        let mut record = RecordBuilder::new(Tag::Closure, 9, 0, 8);
        record.put_ref(ident(payload));
        record
    }

    #[test]
    fn equal_records_share_a_key() {
        assert_eq!(closure_over(IDENT_VOID).key(), closure_over(IDENT_VOID).key());
        assert_ne!(closure_over(IDENT_VOID).key(), closure_over(IDENT_TRUE).key());
    }

    #[test]
    fn header_fields_are_part_of_the_key() {
        let mut concat = RecordBuilder::new(Tag::Concat, 9, 0, 8);
        concat.put_ref(ident(IDENT_VOID));
        assert_ne!(concat.key(), closure_over(IDENT_VOID).key());

        let mut rehashed = RecordBuilder::new(Tag::Closure, 10, 0, 8);
        rehashed.put_ref(ident(IDENT_VOID));
        assert_ne!(rehashed.key(), closure_over(IDENT_VOID).key());
    }

    #[test]
    fn scalars_and_records_never_collide() {
        assert_ne!(
            DedupKey::Scalar(Kind::Integer, 7),
            DedupKey::Scalar(Kind::Duration, 7)
        );
        assert!(matches!(closure_over(IDENT_VOID).key(), DedupKey::Record(_)));
    }
}
