use byteorder::{ByteOrder, LittleEndian};
use parking_lot::RwLock;
use thiserror::Error;

/// Errors raised by a backing region.
#[derive(Debug, Error)]
pub enum RegionError {
    #[error("access of {len} bytes at {addr:#x} exceeds region size {size}")]
    OutOfBounds { addr: u64, len: usize, size: u64 },
    #[error("region is read-only")]
    ReadOnly,
    #[error("region I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A growable, byte-addressable memory region.
///
/// Regions know nothing about records, references or nodes; they only move bytes.
/// All methods take `&self` so implementations can guard their buffer with an
/// internal lock (growth may need to remap while readers are active).
///
/// Fixed-width accessors are little-endian and provided on top of
/// [`read_bytes`](Region::read_bytes) and [`write_bytes`](Region::write_bytes).
pub trait Region: Send + Sync {
    /// Current size of the region in bytes.
    fn size(&self) -> u64;

    /// Grows the region to at least `new_size` bytes. Never shrinks.
    fn grow(&self, new_size: u64) -> Result<(), RegionError>;

    /// Copies `buf.len()` bytes starting at `addr` into `buf`.
    fn read_bytes(&self, addr: u64, buf: &mut [u8]) -> Result<(), RegionError>;

    /// Copies `bytes` into the region starting at `addr`.
    fn write_bytes(&self, addr: u64, bytes: &[u8]) -> Result<(), RegionError>;

    /// Returns true if writes are rejected.
    fn is_read_only(&self) -> bool {
        false
    }

    /// Persists pending writes, if the region has a durable backing.
    fn flush(&self) -> Result<(), RegionError> {
        Ok(())
    }

    fn read_u8(&self, addr: u64) -> Result<u8, RegionError> {
        let mut buf = [0u8; 1];
        self.read_bytes(addr, &mut buf)?;
        Ok(buf[0])
    }

    fn read_u16(&self, addr: u64) -> Result<u16, RegionError> {
        let mut buf = [0u8; 2];
        self.read_bytes(addr, &mut buf)?;
        Ok(LittleEndian::read_u16(&buf))
    }

    fn read_u32(&self, addr: u64) -> Result<u32, RegionError> {
        let mut buf = [0u8; 4];
        self.read_bytes(addr, &mut buf)?;
        Ok(LittleEndian::read_u32(&buf))
    }

    fn read_u64(&self, addr: u64) -> Result<u64, RegionError> {
        let mut buf = [0u8; 8];
        self.read_bytes(addr, &mut buf)?;
        Ok(LittleEndian::read_u64(&buf))
    }

    fn write_u8(&self, addr: u64, value: u8) -> Result<(), RegionError> {
        self.write_bytes(addr, &[value])
    }

    fn write_u16(&self, addr: u64, value: u16) -> Result<(), RegionError> {
        let mut buf = [0u8; 2];
        LittleEndian::write_u16(&mut buf, value);
        self.write_bytes(addr, &buf)
    }

    fn write_u32(&self, addr: u64, value: u32) -> Result<(), RegionError> {
        let mut buf = [0u8; 4];
        LittleEndian::write_u32(&mut buf, value);
        self.write_bytes(addr, &buf)
    }

    fn write_u64(&self, addr: u64, value: u64) -> Result<(), RegionError> {
        let mut buf = [0u8; 8];
        LittleEndian::write_u64(&mut buf, value);
        self.write_bytes(addr, &buf)
    }
}

/// Checks that `len` bytes at `addr` fit into a region of `size` bytes and returns the
/// byte range to slice with.
pub fn checked_range(addr: u64, len: usize, size: u64) -> Result<std::ops::Range<usize>, RegionError> {
    let end = addr.checked_add(len as u64).filter(|end| *end <= size);
    match end {
        Some(end) => Ok(addr as usize..end as usize),
        None => Err(RegionError::OutOfBounds { addr, len, size }),
    }
}

/// An in-memory region backed by a `Vec<u8>`.
///
/// Useful for testing and as a reference implementation.
#[derive(Debug, Default)]
pub struct MemoryRegion {
    data: RwLock<Vec<u8>>,
    read_only: bool,
}

impl MemoryRegion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a writable region pre-filled with `bytes`.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        MemoryRegion {
            data: RwLock::new(bytes),
            read_only: false,
        }
    }

    /// Creates a region over `bytes` that rejects every write and growth.
    pub fn read_only(bytes: Vec<u8>) -> Self {
        MemoryRegion {
            data: RwLock::new(bytes),
            read_only: true,
        }
    }

    /// Returns a copy of the region's current contents.
    pub fn to_vec(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

impl Region for MemoryRegion {
    fn size(&self) -> u64 {
        self.data.read().len() as u64
    }

    fn grow(&self, new_size: u64) -> Result<(), RegionError> {
        if self.read_only {
            return Err(RegionError::ReadOnly);
        }
        let mut data = self.data.write();
        if new_size as usize > data.len() {
            data.resize(new_size as usize, 0);
        }
        Ok(())
    }

    fn read_bytes(&self, addr: u64, buf: &mut [u8]) -> Result<(), RegionError> {
        let data = self.data.read();
        let range = checked_range(addr, buf.len(), data.len() as u64)?;
        buf.copy_from_slice(&data[range]);
        Ok(())
    }

    fn write_bytes(&self, addr: u64, bytes: &[u8]) -> Result<(), RegionError> {
        if self.read_only {
            return Err(RegionError::ReadOnly);
        }
        let mut data = self.data.write();
        let range = checked_range(addr, bytes.len(), data.len() as u64)?;
        data[range].copy_from_slice(bytes);
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_region_grow_and_access() {
        let region = MemoryRegion::new();
        assert_eq!(region.size(), 0);

        region.grow(32).unwrap();
        assert_eq!(region.size(), 32);

        region.write_u64(8, 0x0102_0304_0506_0708).unwrap();
        region.write_u32(16, 0xDEAD_BEEF).unwrap();
        region.write_u16(20, 0xABCD).unwrap();
        region.write_u8(22, 7).unwrap();

        assert_eq!(region.read_u64(8).unwrap(), 0x0102_0304_0506_0708);
        assert_eq!(region.read_u32(16).unwrap(), 0xDEAD_BEEF);
        assert_eq!(region.read_u16(20).unwrap(), 0xABCD);
        assert_eq!(region.read_u8(22).unwrap(), 7);
    }

    #[test]
    fn memory_region_is_little_endian() {
        let region = MemoryRegion::new();
        region.grow(4).unwrap();
        region.write_u32(0, 1).unwrap();
        assert_eq!(region.to_vec(), vec![1, 0, 0, 0]);
    }

    #[test]
    fn memory_region_never_shrinks() {
        let region = MemoryRegion::new();
        region.grow(64).unwrap();
        region.grow(16).unwrap();
        assert_eq!(region.size(), 64);
    }

    #[test]
    fn memory_region_out_of_bounds() {
        let region = MemoryRegion::new();
        region.grow(8).unwrap();

        assert!(matches!(
            region.read_u64(4),
            Err(RegionError::OutOfBounds { addr: 4, len: 8, size: 8 })
        ));
        assert!(region.write_u32(6, 1).is_err());
        assert!(region.read_u64(u64::MAX - 2).is_err());
    }

    #[test]
    fn memory_region_read_only() {
        let region = MemoryRegion::read_only(vec![0u8; 16]);
        assert!(region.is_read_only());
        assert_eq!(region.read_u64(0).unwrap(), 0);
        assert!(matches!(region.write_u8(0, 1), Err(RegionError::ReadOnly)));
        assert!(matches!(region.grow(32), Err(RegionError::ReadOnly)));
    }
}
