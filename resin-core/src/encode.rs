//! The put path: node to reference, children first.

use indexmap::IndexMap;
use tracing::trace;

use crate::arena::Arena;
use crate::array::Array;
use crate::binary::Binary;
use crate::error::{Error, Result};
use crate::index::BucketTable;
use crate::key::DedupKey;
use crate::node::{Call, Node, Proxy};
use crate::record::{
    FLAG_INDEXED, IDENT_EMPTY_ARRAY, IDENT_EMPTY_BINARY, IDENT_EMPTY_STRING, IDENT_FALSE,
    IDENT_TRUE, IDENT_VOID, PARAM_IDENT_BASE, PARAM_IDENT_LIMIT, RecordBuilder, Tag, ident,
};
use crate::reference::{Kind, MAX_PAYLOAD, Reference};
use crate::text::{Text, width_for};

/// Writer state of a mold: the arena and the dedup table.
///
/// Owned by the mold's writer lock.
pub(crate) struct Writer {
    arena: Arena,
    store_id: u64,
    dedup: IndexMap<DedupKey, Reference>,
    dedup_enabled: bool,
    index_arrays: bool,
}

impl Writer {
    pub fn new(arena: Arena, store_id: u64, dedup_enabled: bool, index_arrays: bool) -> Self {
        Writer {
            arena,
            store_id,
            dedup: IndexMap::new(),
            dedup_enabled,
            index_arrays,
        }
    }

    /// References in the dedup table, oldest first.
    pub fn reusables(&self) -> Vec<Reference> {
        self.dedup.values().copied().collect()
    }

    pub fn reusable_count(&self) -> usize {
        self.dedup.len()
    }

    pub fn clear_reusables(&mut self) {
        self.dedup.clear();
        self.dedup.shrink_to_fit();
    }

    pub fn put(&mut self, node: &Node) -> Result<Reference> {
        if let Some(reference) = node.resident_in(self.store_id) {
            return Ok(reference);
        }
        match node {
            Node::Void => Ok(ident(IDENT_VOID)),
            Node::Bool(true) => Ok(ident(IDENT_TRUE)),
            Node::Bool(false) => Ok(ident(IDENT_FALSE)),
            Node::Integer(v) => self.put_scalar(Kind::Integer, *v as u64),
            Node::Decimal(v) => self.put_scalar(Kind::Decimal, v.to_bits()),
            Node::Duration(v) => self.put_scalar(Kind::Duration, *v as u64),
            Node::Datetime(v) => self.put_scalar(Kind::Datetime, *v as u64),
            Node::Object(v) => self.put_scalar(Kind::Object, *v),
            Node::Handler(function) => {
                let function = self.put(function)?;
                self.put_scalar(Kind::Handler, function.raw())
            }
            Node::Array(array) => self.put_array(array),
            Node::String(text) => self.put_text(text),
            Node::Binary(binary) => self.put_binary(binary),
            Node::Proxy(proxy) => self.put_proxy(proxy, node.hash_code()),
            Node::Param(index) if *index < PARAM_IDENT_LIMIT => {
                Ok(ident(PARAM_IDENT_BASE + *index as u64))
            }
            Node::Param(index) => self.put_refs(Tag::Param, node.hash_code(), *index, &[]),
            Node::Concat(call) => self.put_call(Tag::Concat, call, node.hash_code()),
            Node::Closure(function) => {
                let function = self.put(function)?;
                self.put_refs(Tag::Closure, node.hash_code(), 0, &[function])
            }
            Node::Composite(call) => self.put_call(Tag::Composite, call, node.hash_code()),
            Node::Future(_) => Err(Error::UnsupportedNode("future")),
            Node::Native(_) => Err(Error::UnsupportedNode("native")),
        }
    }

    fn put_scalar(&mut self, kind: Kind, bits: u64) -> Result<Reference> {
        let key = DedupKey::Scalar(kind, bits);
        if let Some(reference) = self.reuse(&key) {
            return Ok(reference);
        }
        let addr = self.arena.append(&bits.to_le_bytes())?;
        self.register(key, pack(kind, addr)?)
    }

    fn put_array(&mut self, array: &Array) -> Result<Reference> {
        if array.is_empty() {
            return Ok(ident(IDENT_EMPTY_ARRAY));
        }
        let length = checked_length(array.len())?;
        let mut refs = Vec::with_capacity(array.len());
        let mut hashes = Vec::with_capacity(array.len());
        for item in array.iter() {
            let item = item?;
            hashes.push(item.hash_code());
            refs.push(self.put(&item)?);
        }
        let table = match array.index_table()? {
            Some(table) => Some(table),
            None if self.index_arrays => Some(BucketTable::build(&hashes)?.into()),
            None => None,
        };

        let payload_len = 8 * refs.len() + table.as_ref().map_or(0, |t| t.encoded_len());
        let mut record = RecordBuilder::new(Tag::Array, array.hash_code(), length, payload_len);
        for reference in &refs {
            record.put_ref(*reference);
        }
        let key = record.key();
        if let Some(existing) = self.reuse(&key) {
            // An indexed array may not reuse a record written without its table.
            if table.is_none() || self.is_indexed_record(existing)? {
                return Ok(existing);
            }
            trace!(%existing, "rewriting array with its bucket table");
        }
        if let Some(table) = &table {
            record.put_table(table);
        }
        self.commit(key, record)
    }

    fn put_text(&mut self, text: &Text) -> Result<Reference> {
        if text.is_empty() {
            return Ok(ident(IDENT_EMPTY_STRING));
        }
        let length = checked_length(text.len())?;
        let points = text.code_points()?;
        let width = width_for(&points);
        let mut record = RecordBuilder::new(
            Tag::string(width),
            text.hash_code(),
            length,
            points.len() * width as usize,
        );
        for point in points {
            record.put_unit(width, point);
        }
        self.put_record(record)
    }

    fn put_binary(&mut self, binary: &Binary) -> Result<Reference> {
        if binary.is_empty() {
            return Ok(ident(IDENT_EMPTY_BINARY));
        }
        let length = checked_length(binary.len())?;
        let bytes = binary.to_bytes()?;
        let mut record = RecordBuilder::new(Tag::Binary, binary.hash_code(), length, bytes.len());
        record.put_bytes(&bytes);
        self.put_record(record)
    }

    fn put_proxy(&mut self, proxy: &Proxy, hash: u32) -> Result<Reference> {
        let id = self.put(proxy.id())?;
        let name = self.put_text(proxy.name())?;
        let target = match proxy.target() {
            Some(target) => self.put(target)?,
            None => Reference::NULL,
        };
        self.put_refs(Tag::Proxy, hash, 0, &[id, name, target])
    }

    fn put_call(&mut self, tag: Tag, call: &Call, hash: u32) -> Result<Reference> {
        let length = checked_length(call.params().len())?;
        let mut refs = Vec::with_capacity(call.params().len() + 1);
        refs.push(self.put(call.function())?);
        for param in call.params() {
            refs.push(self.put(param)?);
        }
        self.put_refs(tag, hash, length, &refs)
    }

    fn put_refs(
        &mut self,
        tag: Tag,
        hash: u32,
        length: u32,
        refs: &[Reference],
    ) -> Result<Reference> {
        let mut record = RecordBuilder::new(tag, hash, length, 8 * refs.len());
        for reference in refs {
            record.put_ref(*reference);
        }
        self.put_record(record)
    }

    fn put_record(&mut self, record: RecordBuilder) -> Result<Reference> {
        let key = record.key();
        if let Some(reference) = self.reuse(&key) {
            return Ok(reference);
        }
        self.commit(key, record)
    }

    fn commit(&mut self, key: DedupKey, record: RecordBuilder) -> Result<Reference> {
        let addr = self.arena.append(record.as_bytes())?;
        self.register(key, pack(Kind::Addr, addr)?)
    }

    fn reuse(&self, key: &DedupKey) -> Option<Reference> {
        if !self.dedup_enabled {
            return None;
        }
        let reference = self.dedup.get(key).copied();
        if let Some(reference) = reference {
            trace!(%reference, "reusing record");
        }
        reference
    }

    fn register(&mut self, key: DedupKey, reference: Reference) -> Result<Reference> {
        if self.dedup_enabled {
            self.dedup.insert(key, reference);
        }
        Ok(reference)
    }

    fn is_indexed_record(&self, reference: Reference) -> Result<bool> {
        let flags = self.arena.region().read_u32(reference.payload() + 12)?;
        Ok(flags & FLAG_INDEXED != 0)
    }
}

fn pack(kind: Kind, addr: u64) -> Result<Reference> {
    Reference::try_pack(kind, addr).ok_or(Error::CapacityOverflow {
        requested: addr,
        available: MAX_PAYLOAD,
    })
}

fn checked_length(length: usize) -> Result<u32> {
    u32::try_from(length).map_err(|_| Error::CapacityOverflow {
        requested: length as u64,
        available: u32::MAX as u64,
    })
}
