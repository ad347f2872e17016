//! Handlers for files addressed inside image-backed volumes and their
//! point-in-time snapshots.
//!
//! Both acquire the backing volume through the shared
//! [`FilesystemCache`](crate::volume::cache::FilesystemCache) and locate the
//! target by the backing filesystem's entry id (when the specification
//! carries one) or by path. Read, seek and tell delegate to the native
//! random-access stream; these formats need no emulation.

use std::io::{Read, Seek, SeekFrom};

use crate::error::{NestfileError, Result};
use crate::handler::{check_hop_type, StreamHandler};
use crate::spec::{HopType, PathSpec};
use crate::stat::StatProjection;
use crate::volume::cache::FilesystemCache;
use crate::volume::VolumeFile;

struct VolumeInner {
    file: Option<Box<dyn VolumeFile>>,
    display_name: String,
    size: u64,
    stat: StatProjection,
}

impl VolumeInner {
    fn open(
        spec: &PathSpec,
        upstream: Option<Box<dyn StreamHandler>>,
        cache: &FilesystemCache,
        snapshot_index: Option<u32>,
    ) -> Result<Self> {
        if upstream.is_some() {
            // The backend addresses containers by host path; a volume found
            // inside another stream has no such path.
            return Err(NestfileError::VolumeNotOutermost);
        }
        let container = spec
            .container_path
            .as_deref()
            .ok_or_else(|| NestfileError::volume("Volume hop carries no container path"))?;
        let offset = spec.volume_offset.unwrap_or(0);

        let cached = cache.acquire(container, offset, snapshot_index)?;
        let file = match spec.volume_entry {
            Some(entry) => cached.volume().open_by_entry(entry)?,
            None => cached.volume().open_by_path(&spec.member_path)?,
        };

        let mut stat = file.metadata();
        stat.container_label = Some(cached.volume().label());

        Ok(Self {
            size: file.size(),
            file: Some(file),
            display_name: format!("{}:{}", container.display(), spec.member_path),
            stat,
        })
    }

    fn read(&mut self, size: Option<usize>) -> Result<Vec<u8>> {
        let file = self.file.as_mut().ok_or(NestfileError::not_open("read"))?;
        let mut data = Vec::new();
        match size {
            Some(size) => {
                file.take(size as u64)
                    .read_to_end(&mut data)
                    .map_err(|e| NestfileError::io("Failed to read volume file", e))?;
            }
            None => {
                file.read_to_end(&mut data)
                    .map_err(|e| NestfileError::io("Failed to read volume file", e))?;
            }
        }
        Ok(data)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let file = self
            .file
            .as_mut()
            .ok_or(NestfileError::not_open("seek into"))?;
        file.seek(pos)
            .map_err(|e| NestfileError::io("Failed to seek volume file", e))
    }

    fn tell(&mut self) -> Result<u64> {
        let file = self
            .file
            .as_mut()
            .ok_or(NestfileError::not_open("tell position of"))?;
        file.stream_position()
            .map_err(|e| NestfileError::io("Failed to read volume file position", e))
    }
}

/// Handler for VOLUME hops: a file inside an image-backed filesystem.
pub struct VolumeFileHandler {
    inner: VolumeInner,
}

impl VolumeFileHandler {
    /// Acquire the backing volume from the cache and locate the target file.
    pub fn open(
        spec: &PathSpec,
        upstream: Option<Box<dyn StreamHandler>>,
        cache: &FilesystemCache,
    ) -> Result<Self> {
        check_hop_type(spec, HopType::Volume)?;
        Ok(Self {
            inner: VolumeInner::open(spec, upstream, cache, None)?,
        })
    }
}

impl StreamHandler for VolumeFileHandler {
    fn display_name(&self) -> &str {
        &self.inner.display_name
    }

    fn size(&self) -> Option<u64> {
        Some(self.inner.size)
    }

    fn read(&mut self, size: Option<usize>) -> Result<Vec<u8>> {
        self.inner.read(size)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.inner.seek(pos)
    }

    fn tell(&mut self) -> Result<u64> {
        self.inner.tell()
    }

    fn stat(&self) -> StatProjection {
        self.inner.stat.clone()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.file = None;
        Ok(())
    }
}

/// Handler for SNAPSHOT hops: a file inside a point-in-time snapshot store.
///
/// The snapshot index is mandatory and becomes part of both the cache key
/// and the display name, so provenance records name the exact store.
pub struct SnapshotFileHandler {
    inner: VolumeInner,
}

impl SnapshotFileHandler {
    /// Acquire the snapshot-backed volume from the cache and locate the
    /// target file. Fails before any volume I/O if the specification names
    /// no snapshot index.
    pub fn open(
        spec: &PathSpec,
        upstream: Option<Box<dyn StreamHandler>>,
        cache: &FilesystemCache,
    ) -> Result<Self> {
        check_hop_type(spec, HopType::Snapshot)?;
        let snapshot_index =
            spec.snapshot_index
                .ok_or_else(|| NestfileError::MissingSnapshotIndex {
                    member: spec.member_path.clone(),
                })?;

        let mut inner = VolumeInner::open(spec, upstream, cache, Some(snapshot_index))?;
        inner.display_name = format!("{}:snapshot_{}", inner.display_name, snapshot_index);
        Ok(Self { inner })
    }
}

impl StreamHandler for SnapshotFileHandler {
    fn display_name(&self) -> &str {
        &self.inner.display_name
    }

    fn size(&self) -> Option<u64> {
        Some(self.inner.size)
    }

    fn read(&mut self, size: Option<usize>) -> Result<Vec<u8>> {
        self.inner.read(size)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.inner.seek(pos)
    }

    fn tell(&mut self) -> Result<u64> {
        self.inner.tell()
    }

    fn stat(&self) -> StatProjection {
        self.inner.stat.clone()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.file = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stat::Timestamp;
    use crate::volume::{Volume, VolumeBackend};
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::Arc;

    struct MemFile {
        cursor: Cursor<Vec<u8>>,
        entry_id: u64,
    }

    impl Read for MemFile {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.cursor.read(buf)
        }
    }

    impl Seek for MemFile {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            self.cursor.seek(pos)
        }
    }

    impl VolumeFile for MemFile {
        fn size(&self) -> u64 {
            self.cursor.get_ref().len() as u64
        }

        fn metadata(&self) -> StatProjection {
            StatProjection {
                entry_id: Some(self.entry_id),
                size: Some(self.size()),
                mtime: Some(Timestamp::from_seconds(1_355_961_600)),
                ..StatProjection::new()
            }
        }
    }

    struct MemVolume {
        label: &'static str,
    }

    impl Volume for MemVolume {
        fn open_by_entry(&self, entry_id: u64) -> Result<Box<dyn VolumeFile>> {
            Ok(Box::new(MemFile {
                cursor: Cursor::new(format!("entry-{entry_id}").into_bytes()),
                entry_id,
            }))
        }

        fn open_by_path(&self, member_path: &str) -> Result<Box<dyn VolumeFile>> {
            if member_path == "/missing" {
                return Err(NestfileError::volume("no such file"));
            }
            Ok(Box::new(MemFile {
                cursor: Cursor::new(format!("path-{member_path}").into_bytes()),
                entry_id: 99,
            }))
        }

        fn label(&self) -> String {
            self.label.to_string()
        }
    }

    struct MemBackend;

    impl VolumeBackend for MemBackend {
        fn open_volume(&self, _container: &Path, _offset: u64) -> Result<Arc<dyn Volume>> {
            Ok(Arc::new(MemVolume { label: "TESTFS" }))
        }

        fn open_snapshot(
            &self,
            _container: &Path,
            _offset: u64,
            _snapshot_index: u32,
        ) -> Result<Arc<dyn Volume>> {
            Ok(Arc::new(MemVolume { label: "TESTFS-SNAP" }))
        }
    }

    fn cache() -> FilesystemCache {
        FilesystemCache::new(Arc::new(MemBackend))
    }

    #[test]
    fn test_volume_open_by_entry() {
        let spec = PathSpec::volume("image.dd", "/logs/syslog").with_volume_entry(12);
        let mut handler = VolumeFileHandler::open(&spec, None, &cache()).unwrap();

        assert_eq!(handler.read(None).unwrap(), b"entry-12");
        assert_eq!(handler.display_name(), "image.dd:/logs/syslog");
        assert_eq!(handler.stat().entry_id_value().unwrap(), 12);
        assert_eq!(handler.stat().container_label_value().unwrap(), "TESTFS");
    }

    #[test]
    fn test_volume_open_by_path_when_no_entry() {
        let spec = PathSpec::volume("image.dd", "/logs/syslog");
        let mut handler = VolumeFileHandler::open(&spec, None, &cache()).unwrap();
        assert_eq!(handler.read(None).unwrap(), b"path-/logs/syslog");
    }

    #[test]
    fn test_volume_native_seek() {
        let spec = PathSpec::volume("image.dd", "/logs/syslog").with_volume_entry(7);
        let mut handler = VolumeFileHandler::open(&spec, None, &cache()).unwrap();

        handler.seek(SeekFrom::Start(6)).unwrap();
        assert_eq!(handler.tell().unwrap(), 6);
        assert_eq!(handler.read(None).unwrap(), b"7");
    }

    #[test]
    fn test_volume_rejects_upstream_source() {
        let spec = PathSpec::volume("image.dd", "/logs/syslog");
        let upstream_spec = PathSpec::volume("other.dd", "/outer");
        let upstream = VolumeFileHandler::open(&upstream_spec, None, &cache()).unwrap();

        assert!(matches!(
            VolumeFileHandler::open(&spec, Some(Box::new(upstream)), &cache()),
            Err(NestfileError::VolumeNotOutermost)
        ));
    }

    #[test]
    fn test_snapshot_requires_index_before_volume_io() {
        let mut spec = PathSpec::snapshot("image.dd", "/logs/syslog", 0);
        spec.snapshot_index = None;

        match SnapshotFileHandler::open(&spec, None, &cache()).err() {
            Some(NestfileError::MissingSnapshotIndex { member }) => {
                assert_eq!(member, "/logs/syslog");
            }
            other => panic!("expected MissingSnapshotIndex, got {other:?}"),
        }
    }

    #[test]
    fn test_snapshot_display_name_carries_index() {
        let spec = PathSpec::snapshot("image.dd", "/logs/syslog", 2);
        let handler = SnapshotFileHandler::open(&spec, None, &cache()).unwrap();

        assert_eq!(handler.display_name(), "image.dd:/logs/syslog:snapshot_2");
        assert_eq!(
            handler.stat().container_label_value().unwrap(),
            "TESTFS-SNAP"
        );
    }

    #[test]
    fn test_missing_member_surfaces_backend_error() {
        let spec = PathSpec::volume("image.dd", "/missing");
        assert!(matches!(
            VolumeFileHandler::open(&spec, None, &cache()),
            Err(NestfileError::Volume { .. })
        ));
    }
}
