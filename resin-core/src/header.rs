//! Region header.
//!
//! ```text
//! offset  width  field
//! 0       8      magic
//! 8       8      next free address
//! 16      8      root reference
//! ```

use crate::error::{Error, Result};
use crate::reference::Reference;
use crate::region::Region;

/// Magic number identifying a resin region ("RESIN" + format version 1).
pub const MAGIC: u64 = u64::from_le_bytes(*b"RESIN\0\x01\0");

/// Fixed size of the header in bytes. Also the first record address.
pub const HEADER_SIZE: u64 = 24;

const MAGIC_OFFSET: u64 = 0;
const NEXT_FREE_OFFSET: u64 = 8;
const ROOT_OFFSET: u64 = 16;

/// Header fields as read from a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: u64,
    pub next_free: u64,
    pub root: Reference,
}

impl Header {
    /// Header of a freshly created region.
    pub fn new() -> Self {
        Header {
            magic: MAGIC,
            next_free: HEADER_SIZE,
            root: Reference::NULL,
        }
    }

    /// Reads the header from the start of `region`.
    pub fn read(region: &dyn Region) -> Result<Self> {
        if region.size() < HEADER_SIZE {
            return Err(Error::CorruptHeader(format!(
                "region of {} bytes is smaller than the {HEADER_SIZE}-byte header",
                region.size()
            )));
        }
        Ok(Header {
            magic: region.read_u64(MAGIC_OFFSET)?,
            next_free: region.read_u64(NEXT_FREE_OFFSET)?,
            root: Reference::from_raw(region.read_u64(ROOT_OFFSET)?),
        })
    }

    /// Writes every header field to `region`.
    pub fn write(&self, region: &dyn Region) -> Result<()> {
        region.write_u64(MAGIC_OFFSET, self.magic)?;
        write_next_free(region, self.next_free)?;
        write_root(region, self.root)
    }

    /// Checks the magic number and the next free address against the region size.
    pub fn validate(&self, region_size: u64) -> Result<()> {
        if self.magic != MAGIC {
            return Err(Error::CorruptHeader(format!(
                "invalid magic number {:#018x}",
                self.magic
            )));
        }
        if self.next_free < HEADER_SIZE {
            return Err(Error::CorruptHeader(format!(
                "next free address {} is inside the header",
                self.next_free
            )));
        }
        if self.next_free > region_size {
            return Err(Error::CorruptHeader(format!(
                "next free address {} exceeds region size {region_size}",
                self.next_free
            )));
        }
        Ok(())
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::new()
    }
}

pub fn read_next_free(region: &dyn Region) -> Result<u64> {
    Ok(region.read_u64(NEXT_FREE_OFFSET)?)
}

pub(crate) fn write_next_free(region: &dyn Region, next_free: u64) -> Result<()> {
    Ok(region.write_u64(NEXT_FREE_OFFSET, next_free)?)
}

pub fn read_root(region: &dyn Region) -> Result<Reference> {
    Ok(Reference::from_raw(region.read_u64(ROOT_OFFSET)?))
}

pub(crate) fn write_root(region: &dyn Region, root: Reference) -> Result<()> {
    Ok(region.write_u64(ROOT_OFFSET, root.raw())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::MemoryRegion;

    #[test]
    fn header_roundtrip() {
        let region = MemoryRegion::new();
        region.grow(HEADER_SIZE).unwrap();

        let header = Header {
            magic: MAGIC,
            next_free: 64,
            root: Reference::from_raw(0x1234),
        };
        header.write(&region).unwrap();

        let restored = Header::read(&region).unwrap();
        assert_eq!(restored, header);
    }

    #[test]
    fn header_validation() {
        let header = Header::new();
        assert!(header.validate(HEADER_SIZE).is_ok());

        let mut bad_magic = header;
        bad_magic.magic = 0xDEADBEEF;
        assert!(matches!(bad_magic.validate(1024), Err(Error::CorruptHeader(_))));

        let mut inside_header = header;
        inside_header.next_free = 8;
        assert!(matches!(inside_header.validate(1024), Err(Error::CorruptHeader(_))));

        let mut past_end = header;
        past_end.next_free = 2048;
        assert!(matches!(past_end.validate(1024), Err(Error::CorruptHeader(_))));
    }

    #[test]
    fn header_read_truncated() {
        let region = MemoryRegion::from_bytes(vec![0u8; 10]);
        assert!(matches!(Header::read(&region), Err(Error::CorruptHeader(_))));
    }

    #[test]
    fn magic_spells_resin() {
        assert_eq!(&MAGIC.to_le_bytes()[..5], b"RESIN");
    }
}
