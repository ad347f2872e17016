//! Process-wide cache of opened backing volumes.
//!
//! Opening a volume (parsing the partition layout, the filesystem superblock
//! or a shadow-copy store) is expensive; every file resolved from the same
//! container/offset/snapshot reuses one opened handle. The cache key
//! distinguishes "same container, different offset" (multiple partitions in
//! one image) and "same container and offset, different snapshot index"
//! (multiple point-in-time stores of one volume).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::volume::{CachedVolume, VolumeBackend};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    container_path: PathBuf,
    byte_offset: u64,
    /// `None` means "not a snapshot"
    snapshot_index: Option<u32>,
}

/// Registry mapping (container path, byte offset, snapshot index) to an
/// opened backing volume.
///
/// One mutex guards the check-then-insert and is held across the backend
/// open, so concurrent acquires racing on the same key perform exactly one
/// underlying open: late arrivals block until the first opener has populated
/// the entry, then reuse it. A failed open inserts nothing, leaving the key
/// clean for future legitimate opens.
pub struct FilesystemCache {
    backend: Arc<dyn VolumeBackend>,
    volumes: Mutex<HashMap<CacheKey, Arc<CachedVolume>>>,
}

impl FilesystemCache {
    /// Create a cache that opens volumes through `backend`.
    pub fn new(backend: Arc<dyn VolumeBackend>) -> Self {
        Self {
            backend,
            volumes: Mutex::new(HashMap::new()),
        }
    }

    /// Return the volume for the given key, opening it on first use.
    pub fn acquire(
        &self,
        container_path: &Path,
        byte_offset: u64,
        snapshot_index: Option<u32>,
    ) -> Result<Arc<CachedVolume>> {
        let key = CacheKey {
            container_path: container_path.to_path_buf(),
            byte_offset,
            snapshot_index,
        };

        let mut volumes = self.volumes.lock();
        if let Some(cached) = volumes.get(&key) {
            return Ok(Arc::clone(cached));
        }

        let volume = match snapshot_index {
            Some(index) => self
                .backend
                .open_snapshot(container_path, byte_offset, index)?,
            None => self.backend.open_volume(container_path, byte_offset)?,
        };

        let cached = Arc::new(CachedVolume::new(
            volume,
            key.container_path.clone(),
            byte_offset,
            snapshot_index,
        ));
        volumes.insert(key, Arc::clone(&cached));
        Ok(cached)
    }

    /// Number of volumes currently held open.
    pub fn len(&self) -> usize {
        self.volumes.lock().len()
    }

    /// Whether no volume has been opened yet.
    pub fn is_empty(&self) -> bool {
        self.volumes.lock().is_empty()
    }
}
