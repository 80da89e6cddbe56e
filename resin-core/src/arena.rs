//! Append-only bump allocator over a region.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::header;
use crate::reference::MAX_PAYLOAD;
use crate::region::Region;

/// Alignment of every allocated address.
pub const ALIGNMENT: u64 = 8;

/// Hands out aligned, monotonically increasing address ranges of a region.
///
/// The arena is the single writer of the header's next free address. It must be
/// used under one lock; concurrent allocation is not supported. Readers observe the
/// published next free address through [`limit`](Arena::limit), which only advances
/// after the bytes below it are written.
pub struct Arena {
    region: Arc<dyn Region>,
    next_free: u64,
    grow_step: u64,
    limit: Arc<AtomicU64>,
}

impl Arena {
    /// Creates an arena continuing at `next_free`, which must already be published.
    ///
    /// `grow_step` is rounded up to a power of two of at least [`ALIGNMENT`]; steps
    /// beyond the addressable range are a [`CapacityOverflow`](Error::CapacityOverflow).
    pub fn new(region: Arc<dyn Region>, next_free: u64, grow_step: u64) -> Result<Self> {
        let grow_step = grow_step
            .max(ALIGNMENT)
            .checked_next_power_of_two()
            .filter(|step| *step <= MAX_PAYLOAD)
            .ok_or(Error::CapacityOverflow {
                requested: grow_step,
                available: MAX_PAYLOAD,
            })?;
        Ok(Arena {
            region,
            next_free,
            grow_step,
            limit: Arc::new(AtomicU64::new(next_free)),
        })
    }

    /// Shared handle to the published next free address.
    pub fn limit(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.limit)
    }

    pub fn region(&self) -> &dyn Region {
        self.region.as_ref()
    }

    /// Address the next allocation will start at.
    pub fn next_free(&self) -> u64 {
        self.next_free
    }

    /// Reserves `size` bytes and publishes the new next free address immediately.
    pub fn allocate(&mut self, size: u64) -> Result<u64> {
        let (addr, next) = self.reserve(size)?;
        self.publish(next)?;
        Ok(addr)
    }

    /// Writes `bytes` into a fresh range and publishes it only once fully written.
    pub fn append(&mut self, bytes: &[u8]) -> Result<u64> {
        let (addr, next) = self.reserve(bytes.len() as u64)?;
        self.region.write_bytes(addr, bytes)?;
        self.publish(next)?;
        trace!(addr, len = bytes.len(), "appended record");
        Ok(addr)
    }

    fn reserve(&mut self, size: u64) -> Result<(u64, u64)> {
        let addr = self.next_free;
        let overflow = || Error::CapacityOverflow {
            requested: size,
            available: MAX_PAYLOAD.saturating_sub(addr),
        };
        let next = addr
            .checked_add(size)
            .and_then(|end| align_up(end, ALIGNMENT))
            .filter(|next| *next <= MAX_PAYLOAD)
            .ok_or_else(overflow)?;
        if next > self.region.size() {
            let target = align_up(next, self.grow_step).unwrap_or(next);
            debug!(from = self.region.size(), to = target, "growing region");
            self.region.grow(target)?;
        }
        Ok((addr, next))
    }

    fn publish(&mut self, next: u64) -> Result<()> {
        header::write_next_free(self.region.as_ref(), next)?;
        self.next_free = next;
        self.limit.store(next, Ordering::Release);
        Ok(())
    }
}

/// Rounds `value` up to a multiple of the power of two `align`.
pub(crate) fn align_up(value: u64, align: u64) -> Option<u64> {
    let mask = align - 1;
    value.checked_add(mask).map(|v| v & !mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{HEADER_SIZE, Header};
    use crate::region::MemoryRegion;

    fn arena(grow_step: u64) -> (Arena, Arc<dyn Region>) {
        let region: Arc<dyn Region> = Arc::new(MemoryRegion::new());
        region.grow(HEADER_SIZE).unwrap();
        Header::new().write(region.as_ref()).unwrap();
        (Arena::new(region.clone(), HEADER_SIZE, grow_step).unwrap(), region)
    }

    #[test]
    fn allocations_are_aligned_and_increasing() {
        let (mut arena, region) = arena(8);

        let a = arena.allocate(3).unwrap();
        let b = arena.allocate(8).unwrap();
        let c = arena.allocate(13).unwrap();

        assert_eq!(a, HEADER_SIZE);
        assert_eq!(b, HEADER_SIZE + 8);
        assert_eq!(c, HEADER_SIZE + 16);
        assert_eq!(arena.next_free(), HEADER_SIZE + 32);
        assert_eq!(header::read_next_free(region.as_ref()).unwrap(), HEADER_SIZE + 32);
    }

    #[test]
    fn allocation_grows_region_in_steps() {
        let (mut arena, region) = arena(256);
        arena.allocate(10).unwrap();
        assert_eq!(region.size(), 256);

        arena.allocate(300).unwrap();
        assert_eq!(region.size(), 512);
    }

    #[test]
    fn append_writes_then_publishes() {
        let (mut arena, region) = arena(64);
        let addr = arena.append(&[1, 2, 3, 4, 5]).unwrap();

        let mut buf = [0u8; 5];
        region.read_bytes(addr, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 5]);
        assert_eq!(header::read_next_free(region.as_ref()).unwrap(), addr + 8);
        assert_eq!(arena.limit().load(Ordering::Acquire), addr + 8);
    }

    #[test]
    fn zero_sized_allocation() {
        let (mut arena, _region) = arena(64);
        let a = arena.allocate(0).unwrap();
        let b = arena.allocate(0).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn capacity_overflow() {
        let (mut arena, _region) = arena(64);
        assert!(matches!(
            arena.allocate(u64::MAX),
            Err(Error::CapacityOverflow { .. })
        ));
        assert!(matches!(
            arena.allocate(MAX_PAYLOAD),
            Err(Error::CapacityOverflow { .. })
        ));
        // A failed allocation leaves the arena untouched.
        assert_eq!(arena.next_free(), HEADER_SIZE);
    }

    #[test]
    fn grow_step_is_rounded_or_rejected() {
        let region: Arc<dyn Region> = Arc::new(MemoryRegion::new());
        assert_eq!(Arena::new(region.clone(), HEADER_SIZE, 0).unwrap().grow_step, ALIGNMENT);
        assert_eq!(Arena::new(region.clone(), HEADER_SIZE, 100).unwrap().grow_step, 128);
        for step in [1 << 63 | 1, MAX_PAYLOAD + 1, u64::MAX] {
            assert!(matches!(
                Arena::new(region.clone(), HEADER_SIZE, step),
                Err(Error::CapacityOverflow { requested, .. }) if requested == step
            ));
        }
    }

    #[test]
    fn align_up_rounds() {
        assert_eq!(align_up(0, 8), Some(0));
        assert_eq!(align_up(1, 8), Some(8));
        assert_eq!(align_up(16, 8), Some(16));
        assert_eq!(align_up(u64::MAX, 8), None);
    }
}
