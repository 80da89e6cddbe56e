//! Memory-mapped file region for Resin.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use memmap2::{Mmap, MmapMut};
use parking_lot::RwLock;
use resin_core::{Mold, MoldConfig, Region, RegionError, checked_range};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum MmapError {
    #[error("cannot open {}: {source}", .path.display())]
    Open { path: PathBuf, source: io::Error },
    #[error("{} is locked by another process", .path.display())]
    Locked { path: PathBuf },
    #[error("mmap I/O error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Mold(#[from] resin_core::Error),
}

/// Options of a [`MmapRegion`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MmapConfig {
    /// The file is extended to at least this many bytes the first time it grows.
    pub initial_size: u64,
    /// Map the file read-only and take a shared lock instead of an exclusive one.
    pub read_only: bool,
    /// Make [`flush`](Region::flush) wait until the data reached the disk.
    pub sync_on_flush: bool,
}

impl Default for MmapConfig {
    fn default() -> Self {
        MmapConfig {
            initial_size: 1024 * 1024,
            read_only: false,
            sync_on_flush: true,
        }
    }
}

impl MmapConfig {
    pub fn with_initial_size(mut self, initial_size: u64) -> Self {
        self.initial_size = initial_size;
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_sync_on_flush(mut self, sync_on_flush: bool) -> Self {
        self.sync_on_flush = sync_on_flush;
        self
    }
}

enum Map {
    /// Zero-length files are not mapped.
    Empty,
    ReadOnly(Mmap),
    Writable(MmapMut),
}

impl Map {
    fn bytes(&self) -> &[u8] {
        match self {
            Map::Empty => &[],
            Map::ReadOnly(map) => &map[..],
            Map::Writable(map) => &map[..],
        }
    }
}

/// A region backed by a memory-mapped file.
///
/// The file is locked for the lifetime of the region: exclusively when writable,
/// shared when read-only. Growing extends the file and remaps it.
pub struct MmapRegion {
    path: PathBuf,
    file: File,
    map: RwLock<Map>,
    config: MmapConfig,
}

impl MmapRegion {
    /// Opens the file at `path`, creating it unless the region is read-only.
    pub fn open(path: impl AsRef<Path>, config: MmapConfig) -> Result<Self, MmapError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(!config.read_only)
            .create(!config.read_only)
            .truncate(false)
            .open(&path)
            .map_err(|source| MmapError::Open {
                path: path.clone(),
                source,
            })?;

        let locked = if config.read_only {
            FileExt::try_lock_shared(&file)
        } else {
            FileExt::try_lock_exclusive(&file)
        };
        if locked.is_err() {
            return Err(MmapError::Locked { path });
        }

        let map = map_file(&file, config.read_only)?;
        debug!(
            path = %path.display(),
            size = map.bytes().len(),
            read_only = config.read_only,
            "mapped file"
        );
        Ok(MmapRegion {
            path,
            file,
            map: RwLock::new(map),
            config,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &MmapConfig {
        &self.config
    }
}

fn map_file(file: &File, read_only: bool) -> io::Result<Map> {
    if file.metadata()?.len() == 0 {
        return Ok(Map::Empty);
    }
    // SAFETY: the file is locked for as long as the map lives, so no cooperating
    // process modifies or truncates it. Every access is bounds-checked against the
    // mapped length under the map lock.
    Ok(if read_only {
        Map::ReadOnly(unsafe { Mmap::map(file)? })
    } else {
        Map::Writable(unsafe { MmapMut::map_mut(file)? })
    })
}

impl Region for MmapRegion {
    fn size(&self) -> u64 {
        self.map.read().bytes().len() as u64
    }

    fn grow(&self, new_size: u64) -> Result<(), RegionError> {
        if self.config.read_only {
            return Err(RegionError::ReadOnly);
        }
        let mut map = self.map.write();
        let size = map.bytes().len() as u64;
        if new_size <= size {
            return Ok(());
        }
        let target = new_size.max(self.config.initial_size);
        self.file.set_len(target)?;
        *map = map_file(&self.file, false)?;
        debug!(path = %self.path.display(), from = size, to = target, "grew mapped file");
        Ok(())
    }

    fn read_bytes(&self, addr: u64, buf: &mut [u8]) -> Result<(), RegionError> {
        let map = self.map.read();
        let bytes = map.bytes();
        let range = checked_range(addr, buf.len(), bytes.len() as u64)?;
        buf.copy_from_slice(&bytes[range]);
        Ok(())
    }

    fn write_bytes(&self, addr: u64, bytes: &[u8]) -> Result<(), RegionError> {
        let mut map = self.map.write();
        match &mut *map {
            Map::Writable(target) => {
                let range = checked_range(addr, bytes.len(), target.len() as u64)?;
                target[range].copy_from_slice(bytes);
                Ok(())
            }
            Map::ReadOnly(_) => Err(RegionError::ReadOnly),
            Map::Empty if self.config.read_only => Err(RegionError::ReadOnly),
            Map::Empty => Err(RegionError::OutOfBounds {
                addr,
                len: bytes.len(),
                size: 0,
            }),
        }
    }

    fn is_read_only(&self) -> bool {
        self.config.read_only
    }

    fn flush(&self) -> Result<(), RegionError> {
        if let Map::Writable(map) = &*self.map.read() {
            if self.config.sync_on_flush {
                map.flush()?;
            } else {
                map.flush_async()?;
            }
        }
        Ok(())
    }
}

impl Drop for MmapRegion {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Opens a mold over the file at `path`.
pub fn open(
    path: impl AsRef<Path>,
    config: MmapConfig,
    mold_config: MoldConfig,
) -> Result<Mold, MmapError> {
    let region = MmapRegion::open(path, config)?;
    Ok(Mold::open(std::sync::Arc::new(region), mold_config)?)
}
