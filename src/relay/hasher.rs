//! Change detection using xxhash
//!
//! Suppresses consecutive byte-identical snapshots.

use bytes::Bytes;
use xxhash_rust::xxh64::xxh64;

/// Hasher configuration
#[derive(Debug, Clone)]
pub struct HasherConfig {
    /// Hash seed
    pub seed: u64,
}

impl Default for HasherConfig {
    fn default() -> Self {
        Self {
            seed: 0x123456789ABCDEF0,
        }
    }
}

/// Remembers the last image seen and reports whether a new one differs
pub struct ChangeDetector {
    config: HasherConfig,
    /// Hash and bytes of the last image
    last: Option<(u64, Bytes)>,
}

impl ChangeDetector {
    pub fn new(config: HasherConfig) -> Self {
        Self { config, last: None }
    }

    /// Hash a slice of data
    pub fn hash(&self, data: &[u8]) -> u64 {
        xxh64(data, self.config.seed)
    }

    /// Returns true and remembers `data` if it differs from the previous image.
    /// The hash only short-cuts the comparison; equal hashes still compare
    /// bytes.
    pub fn observe(&mut self, data: &Bytes) -> bool {
        let hash = self.hash(data);
        if let Some((last_hash, last)) = &self.last {
            if *last_hash == hash && last == data {
                return false;
            }
        }
        self.last = Some((hash, data.clone()));
        true
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new(HasherConfig::default())
    }
}
