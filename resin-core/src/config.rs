use serde::{Deserialize, Serialize};

/// Default growth step of a region: 64 KiB.
pub const DEFAULT_GROW_STEP: u64 = 64 * 1024;

/// Options of a [`Mold`](crate::Mold).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoldConfig {
    /// Reuse the reference of equal content instead of writing it again.
    pub dedup: bool,
    /// Keep decoded nodes by reference.
    pub decode_cache: bool,
    /// Regions grow to a multiple of this many bytes. Rounded up to a power of two.
    pub grow_step: u64,
    /// Write a bucket table for every non-empty array that does not carry one.
    pub index_arrays: bool,
}

impl Default for MoldConfig {
    fn default() -> Self {
        MoldConfig {
            dedup: true,
            decode_cache: true,
            grow_step: DEFAULT_GROW_STEP,
            index_arrays: false,
        }
    }
}

impl MoldConfig {
    pub fn with_dedup(mut self, dedup: bool) -> Self {
        self.dedup = dedup;
        self
    }

    pub fn with_decode_cache(mut self, decode_cache: bool) -> Self {
        self.decode_cache = decode_cache;
        self
    }

    pub fn with_grow_step(mut self, grow_step: u64) -> Self {
        self.grow_step = grow_step;
        self
    }

    pub fn with_index_arrays(mut self, index_arrays: bool) -> Self {
        self.index_arrays = index_arrays;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = MoldConfig::default();
        assert!(config.dedup);
        assert!(config.decode_cache);
        assert!(!config.index_arrays);
        assert_eq!(config.grow_step, 65536);
    }

    #[test]
    fn builders() {
        let config = MoldConfig::default()
            .with_dedup(false)
            .with_decode_cache(false)
            .with_grow_step(256)
            .with_index_arrays(true);
        assert_eq!(
            config,
            MoldConfig {
                dedup: false,
                decode_cache: false,
                grow_step: 256,
                index_arrays: true,
            }
        );
    }
}
