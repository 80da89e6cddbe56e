//! Hash-bucket index for accelerated member search in arrays.
//!
//! A [`BucketTable`] groups member positions by `hash & (bucket_count - 1)`. Inside a
//! bucket, positions ascend by original index, which lets a bounded search stop as
//! soon as it walks past its window.
//!
//! Persisted layout, directly after an indexed array's member references:
//!
//! ```text
//! bucket_count: u32
//! bounds:       u32[bucket_count + 1]   bucket b = positions[bounds[b]..bounds[b + 1]]
//! positions:    u32[length]
//! ```

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};
use crate::region::Region;

/// Bucket-grouped member positions of an array.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BucketTable {
    bounds: Vec<u32>,
    positions: Vec<u32>,
}

impl BucketTable {
    /// Builds the table for members with the given hashes, in member order.
    pub fn build(hashes: &[u32]) -> Result<Self> {
        let count = bucket_count_for(hashes.len())?;
        let mask = count - 1;
        let mut bounds = vec![0u32; count as usize + 1];
        for hash in hashes {
            bounds[(hash & mask) as usize + 1] += 1;
        }
        for b in 1..bounds.len() {
            bounds[b] += bounds[b - 1];
        }
        let mut cursor = bounds.clone();
        let mut positions = vec![0u32; hashes.len()];
        for (index, hash) in hashes.iter().enumerate() {
            let slot = &mut cursor[(hash & mask) as usize];
            positions[*slot as usize] = index as u32;
            *slot += 1;
        }
        Ok(BucketTable { bounds, positions })
    }

    pub fn bucket_count(&self) -> u32 {
        (self.bounds.len() - 1) as u32
    }

    /// Number of indexed members.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Member positions whose hash falls into `hash`'s bucket, ascending.
    pub fn bucket(&self, hash: u32) -> &[u32] {
        let b = (hash & (self.bucket_count() - 1)) as usize;
        &self.positions[self.bounds[b] as usize..self.bounds[b + 1] as usize]
    }

    /// Size of the persisted form in bytes.
    pub fn encoded_len(&self) -> usize {
        4 * (1 + self.bounds.len() + self.positions.len())
    }

    /// Writes the persisted form into `out`, which must be `encoded_len` bytes long.
    pub fn encode(&self, out: &mut [u8]) {
        LittleEndian::write_u32(&mut out[0..4], self.bucket_count());
        let mut pos = 4;
        for value in self.bounds.iter().chain(&self.positions) {
            LittleEndian::write_u32(&mut out[pos..pos + 4], *value);
            pos += 4;
        }
    }

    /// Reads a persisted table for `length` members at `addr`.
    pub(crate) fn read(region: &dyn Region, addr: u64, length: usize) -> Result<Self> {
        let count = region.read_u32(addr)? as usize;
        let mut raw = vec![0u8; 4 * (count + 1 + length)];
        region.read_bytes(addr + 4, &mut raw)?;
        let mut words = raw.chunks_exact(4).map(LittleEndian::read_u32);
        let bounds = words.by_ref().take(count + 1).collect();
        let positions = words.collect();
        Ok(BucketTable { bounds, positions })
    }
}

/// Smallest bucket count of any table.
pub const MIN_BUCKETS: u32 = 2;

/// Number of buckets used for `length` members: a power of two, at least
/// [`MIN_BUCKETS`].
pub fn bucket_count_for(length: usize) -> Result<u32> {
    u32::try_from(length)
        .ok()
        .and_then(|length| length.max(MIN_BUCKETS).checked_next_power_of_two())
        .ok_or(Error::CapacityOverflow {
            requested: length as u64,
            available: 1 << 31,
        })
}

/// Random access to the buckets of a table, in memory or in a region.
pub(crate) trait Buckets {
    /// Start and end slot of the bucket `hash` falls into.
    fn range(&self, hash: u32) -> Result<(u32, u32)>;

    /// Member position stored in `slot`.
    fn position(&self, slot: u32) -> Result<u32>;
}

impl Buckets for BucketTable {
    fn range(&self, hash: u32) -> Result<(u32, u32)> {
        let b = (hash & (self.bucket_count() - 1)) as usize;
        Ok((self.bounds[b], self.bounds[b + 1]))
    }

    fn position(&self, slot: u32) -> Result<u32> {
        Ok(self.positions[slot as usize])
    }
}

/// A persisted table read slot by slot without materializing it.
pub(crate) struct MappedBuckets<'a> {
    pub region: &'a dyn Region,
    /// Address of the table's `bucket_count` word.
    pub addr: u64,
}

impl MappedBuckets<'_> {
    fn positions_addr(&self, count: u32) -> u64 {
        self.addr + 4 + 4 * (count as u64 + 1)
    }
}

impl Buckets for MappedBuckets<'_> {
    fn range(&self, hash: u32) -> Result<(u32, u32)> {
        let count = self.region.read_u32(self.addr)?.max(1);
        let b = (hash & (count - 1)) as u64;
        let bound = self.addr + 4 + 4 * b;
        Ok((self.region.read_u32(bound)?, self.region.read_u32(bound + 4)?))
    }

    fn position(&self, slot: u32) -> Result<u32> {
        let count = self.region.read_u32(self.addr)?;
        Ok(self.region.read_u32(self.positions_addr(count) + 4 * slot as u64)?)
    }
}

/// Finds the first (`forward`) or last member in `offset..end` whose bucket matches
/// `hash` and for which `matches` confirms full equality.
pub(crate) fn search_indexed(
    buckets: &impl Buckets,
    hash: u32,
    offset: usize,
    end: usize,
    forward: bool,
    mut matches: impl FnMut(usize) -> Result<bool>,
) -> Result<Option<usize>> {
    let (lo, hi) = buckets.range(hash)?;
    if forward {
        for slot in lo..hi {
            let index = buckets.position(slot)? as usize;
            if index >= end {
                return Ok(None);
            }
            if index >= offset && matches(index)? {
                return Ok(Some(index));
            }
        }
    } else {
        for slot in (lo..hi).rev() {
            let index = buckets.position(slot)? as usize;
            if index < offset {
                return Ok(None);
            }
            if index < end && matches(index)? {
                return Ok(Some(index));
            }
        }
    }
    Ok(None)
}

/// Scans `offset..end` in the requested direction for a member `matches` accepts.
pub(crate) fn search_linear(
    offset: usize,
    end: usize,
    forward: bool,
    mut matches: impl FnMut(usize) -> Result<bool>,
) -> Result<Option<usize>> {
    if forward {
        for index in offset..end {
            if matches(index)? {
                return Ok(Some(index));
            }
        }
    } else {
        for index in (offset..end).rev() {
            if matches(index)? {
                return Ok(Some(index));
            }
        }
    }
    Ok(None)
}
