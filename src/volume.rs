//! Volume backend boundary and the shared filesystem handle cache.
//!
//! Image and filesystem codecs (TSK-style image readers, shadow-copy
//! parsers) live outside this crate. This module pins down the contract they
//! have to satisfy: a [`VolumeBackend`] opens a volume found at a byte offset
//! inside a container file, optionally through a numbered snapshot store,
//! and yields [`Volume`] objects from which individual files are opened by
//! path or by the filesystem's internal entry id.
//!
//! Opened volumes are expensive; the [`cache::FilesystemCache`] shares them
//! across every resolution that addresses the same container, offset and
//! snapshot.

pub mod cache;

use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;
use crate::stat::StatProjection;

/// Opens backing volumes from evidence containers.
///
/// Implementations wrap whatever image/filesystem codec the surrounding
/// pipeline links against. Opening is allowed to be slow; results are cached.
pub trait VolumeBackend: Send + Sync {
    /// Open the volume at `offset` bytes into the container file.
    fn open_volume(&self, container: &Path, offset: u64) -> Result<Arc<dyn Volume>>;

    /// Open the numbered snapshot store of the volume at `offset` bytes into
    /// the container file.
    fn open_snapshot(
        &self,
        container: &Path,
        offset: u64,
        snapshot_index: u32,
    ) -> Result<Arc<dyn Volume>>;
}

/// An opened backing volume. Shared read-only between resolutions; all
/// position state lives in the [`VolumeFile`] cursors it hands out.
pub trait Volume: Send + Sync {
    /// Open a file by the backing filesystem's internal object identifier.
    fn open_by_entry(&self, entry_id: u64) -> Result<Box<dyn VolumeFile>>;

    /// Open a file by its path within the volume.
    fn open_by_path(&self, member_path: &str) -> Result<Box<dyn VolumeFile>>;

    /// Descriptive label of the backing filesystem type, e.g. "NTFS".
    fn label(&self) -> String;
}

/// A file opened from a volume: a native random-access stream plus the
/// backing filesystem's metadata record. Each open yields a fresh cursor.
pub trait VolumeFile: Read + Seek + Send {
    /// Size of the file in bytes.
    fn size(&self) -> u64;

    /// Project the native metadata record. Fields the backing filesystem
    /// type does not supply stay unset.
    fn metadata(&self) -> StatProjection;
}

/// A cached volume handle: the opened volume plus the key it was opened
/// under. Never mutated after creation; shared by every handler reading from
/// the same backing volume.
pub struct CachedVolume {
    volume: Arc<dyn Volume>,
    container_path: PathBuf,
    byte_offset: u64,
    snapshot_index: Option<u32>,
}

impl CachedVolume {
    pub(crate) fn new(
        volume: Arc<dyn Volume>,
        container_path: PathBuf,
        byte_offset: u64,
        snapshot_index: Option<u32>,
    ) -> Self {
        Self {
            volume,
            container_path,
            byte_offset,
            snapshot_index,
        }
    }

    /// The opened backing volume.
    pub fn volume(&self) -> &Arc<dyn Volume> {
        &self.volume
    }

    /// Path of the container file this volume was opened from.
    pub fn container_path(&self) -> &Path {
        &self.container_path
    }

    /// Byte offset of the volume within the container.
    pub fn byte_offset(&self) -> u64 {
        self.byte_offset
    }

    /// Snapshot store index, if this is a snapshot-backed volume.
    pub fn snapshot_index(&self) -> Option<u32> {
        self.snapshot_index
    }
}
