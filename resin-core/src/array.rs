use std::fmt;
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};

use crate::decode;
use crate::error::{Error, Result};
use crate::hash::hash_all;
use crate::index::{self, BucketTable, MappedBuckets};
use crate::node::Node;
use crate::reference::Reference;
use crate::view::View;

/// An immutable array of nodes, optionally carrying a hash-bucket table for fast
/// [`find`](Array::find).
#[derive(Clone)]
pub struct Array {
    repr: Repr,
}

#[derive(Clone)]
enum Repr {
    Owned {
        items: Arc<[Node]>,
        hash: u32,
        table: Option<Arc<BucketTable>>,
    },
    /// Member references read on demand. `table` is the address of a persisted
    /// bucket table.
    Mapped { view: View, table: Option<u64> },
}

impl Array {
    pub fn new(items: Vec<Node>) -> Self {
        let items: Arc<[Node]> = items.into();
        let hash = hash_all(items.iter().map(Node::hash_code));
        Array {
            repr: Repr::Owned {
                items,
                hash,
                table: None,
            },
        }
    }

    /// Creates an array with a bucket table over its members.
    pub fn indexed(items: Vec<Node>) -> Result<Self> {
        Self::new(items).with_table()
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub(crate) fn mapped(view: View, table: Option<u64>) -> Self {
        Array {
            repr: Repr::Mapped { view, table },
        }
    }

    pub(crate) fn view(&self) -> Option<&View> {
        match &self.repr {
            Repr::Mapped { view, .. } => Some(view),
            Repr::Owned { .. } => None,
        }
    }

    fn with_table(self) -> Result<Self> {
        Ok(match self.repr {
            Repr::Owned { items, hash, .. } => {
                let hashes: Vec<u32> = items.iter().map(Node::hash_code).collect();
                let table = Some(Arc::new(BucketTable::build(&hashes)?));
                Array {
                    repr: Repr::Owned { items, hash, table },
                }
            }
            mapped => Array { repr: mapped },
        })
    }

    /// Returns an owned copy of this array with a bucket table. Arrays that already
    /// carry one are returned as they are.
    pub fn compact_with_index(&self) -> Result<Array> {
        if self.is_indexed() {
            return Ok(self.clone());
        }
        Array::new(self.to_vec()?).with_table()
    }

    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::Owned { items, .. } => items.len(),
            Repr::Mapped { view, .. } => view.len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hash_code(&self) -> u32 {
        match &self.repr {
            Repr::Owned { hash, .. } => *hash,
            Repr::Mapped { view, .. } => view.hash,
        }
    }

    pub fn is_indexed(&self) -> bool {
        match &self.repr {
            Repr::Owned { table, .. } => table.is_some(),
            Repr::Mapped { table, .. } => table.is_some(),
        }
    }

    /// The bucket table, read from the region for views.
    pub fn index_table(&self) -> Result<Option<Arc<BucketTable>>> {
        match &self.repr {
            Repr::Owned { table, .. } => Ok(table.clone()),
            Repr::Mapped {
                view,
                table: Some(addr),
            } => Ok(Some(Arc::new(BucketTable::read(view.region(), *addr, view.len)?))),
            Repr::Mapped { table: None, .. } => Ok(None),
        }
    }

    /// Member at `index`. Views read one reference and decode it.
    pub fn get(&self, index: usize) -> Result<Node> {
        match &self.repr {
            Repr::Owned { items, .. } => items.get(index).cloned().ok_or(Error::IndexOutOfBounds {
                index,
                length: items.len(),
            }),
            Repr::Mapped { view, .. } => {
                view.check_index(index)?;
                let raw = view.region().read_u64(view.data + 8 * index as u64)?;
                let member = Reference::from_raw(raw);
                decode::check_child(view.reference, member)?;
                decode::decode(&view.context, member)
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<Node>> + '_ {
        (0..self.len()).map(|index| self.get(index))
    }

    /// Materializes every member.
    pub fn to_vec(&self) -> Result<Vec<Node>> {
        match &self.repr {
            Repr::Owned { items, .. } => Ok(items.to_vec()),
            Repr::Mapped { view, .. } => {
                let mut raw = vec![0u8; 8 * view.len];
                view.region().read_bytes(view.data, &mut raw)?;
                raw.chunks_exact(8)
                    .map(|word| {
                        let member = Reference::from_raw(LittleEndian::read_u64(word));
                        decode::check_child(view.reference, member)?;
                        decode::decode(&view.context, member)
                    })
                    .collect()
            }
        }
    }

    /// Searches `offset..offset + length` for a member equal to `query`, returning
    /// the first match when `forward`, else the last.
    ///
    /// The window is clipped to the array. With a bucket table only members in the
    /// query's bucket are compared.
    pub fn find(
        &self,
        query: &Node,
        offset: usize,
        length: usize,
        forward: bool,
    ) -> Result<Option<usize>> {
        let end = offset.saturating_add(length).min(self.len());
        if offset >= end {
            return Ok(None);
        }
        let matches = |index| self.get(index)?.equals(query);
        match &self.repr {
            Repr::Owned {
                table: Some(table), ..
            } => index::search_indexed(table.as_ref(), query.hash_code(), offset, end, forward, matches),
            Repr::Mapped {
                view,
                table: Some(addr),
            } => {
                let buckets = MappedBuckets {
                    region: view.region(),
                    addr: *addr,
                };
                index::search_indexed(&buckets, query.hash_code(), offset, end, forward, matches)
            }
            _ => index::search_linear(offset, end, forward, matches),
        }
    }

    pub(crate) fn equals(&self, other: &Array) -> Result<bool> {
        if self.len() != other.len() || self.hash_code() != other.hash_code() {
            return Ok(false);
        }
        if let (Some(a), Some(b)) = (self.view(), other.view())
            && a.same_record(b)
        {
            return Ok(true);
        }
        for index in 0..self.len() {
            if !self.get(index)?.equals(&other.get(index)?)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl From<Vec<Node>> for Array {
    fn from(items: Vec<Node>) -> Array {
        Array::new(items)
    }
}

impl PartialEq for Array {
    fn eq(&self, other: &Array) -> bool {
        self.equals(other).unwrap_or(false)
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_vec() {
            Ok(items) => f.debug_list().entries(items).finish(),
            Err(_) => write!(f, "Array({:?})", self.view()),
        }
    }
}
