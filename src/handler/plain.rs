//! Handler for plain files on a mounted host filesystem.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;

use crate::error::{NestfileError, Result};
use crate::handler::{check_hop_type, StreamHandler};
use crate::spec::{HopType, PathSpec};
use crate::stat::{StatProjection, Timestamp};

/// Opens the named host path directly for reading. No cache involved; the
/// host filesystem is not a container mount.
pub struct PlainFileHandler {
    file: Option<File>,
    display_name: String,
    size: u64,
    stat: StatProjection,
}

impl PlainFileHandler {
    /// Open the file named by `spec.member_path` on the host filesystem.
    pub fn open(spec: &PathSpec, upstream: Option<Box<dyn StreamHandler>>) -> Result<Self> {
        check_hop_type(spec, HopType::Plain)?;

        let path = PathBuf::from(&spec.member_path);
        let file = File::open(&path)
            .map_err(|e| NestfileError::io(format!("Failed to open: {}", path.display()), e))?;
        let metadata = file
            .metadata()
            .map_err(|e| NestfileError::io("Failed to read file metadata", e))?;

        let display_name = match &upstream {
            Some(up) => format!("{}:{}", up.display_name(), spec.member_path),
            None => spec.member_path.clone(),
        };

        Ok(Self {
            file: Some(file),
            display_name,
            size: metadata.len(),
            stat: project_host_metadata(&metadata),
        })
    }
}

/// Map host filesystem attributes 1:1 onto the projection.
fn project_host_metadata(metadata: &std::fs::Metadata) -> StatProjection {
    let mut stat = StatProjection::new();
    stat.size = Some(metadata.len());
    stat.container_label = Some("Unknown".to_string());

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        stat.mode = Some(metadata.mode());
        stat.entry_id = Some(metadata.ino());
        stat.device = Some(metadata.dev());
        stat.link_count = Some(metadata.nlink());
        stat.uid = Some(metadata.uid() as u64);
        stat.gid = Some(metadata.gid() as u64);
        stat.atime = Some(Timestamp::new(metadata.atime(), metadata.atime_nsec() as u32));
        stat.mtime = Some(Timestamp::new(metadata.mtime(), metadata.mtime_nsec() as u32));
        stat.ctime = Some(Timestamp::new(metadata.ctime(), metadata.ctime_nsec() as u32));
    }
    #[cfg(not(unix))]
    {
        use std::time::UNIX_EPOCH;
        for (field, time) in [
            (&mut stat.atime, metadata.accessed()),
            (&mut stat.mtime, metadata.modified()),
        ] {
            if let Ok(time) = time {
                if let Ok(since) = time.duration_since(UNIX_EPOCH) {
                    *field = Some(Timestamp::new(since.as_secs() as i64, since.subsec_nanos()));
                }
            }
        }
    }

    stat
}

impl StreamHandler for PlainFileHandler {
    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn size(&self) -> Option<u64> {
        Some(self.size)
    }

    fn read(&mut self, size: Option<usize>) -> Result<Vec<u8>> {
        let file = self.file.as_mut().ok_or(NestfileError::not_open("read"))?;
        let mut data = Vec::new();
        match size {
            Some(size) => {
                file.take(size as u64)
                    .read_to_end(&mut data)
                    .map_err(|e| NestfileError::io("Failed to read file", e))?;
            }
            None => {
                file.read_to_end(&mut data)
                    .map_err(|e| NestfileError::io("Failed to read file", e))?;
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
            .map_err(|e| NestfileError::io("Failed to seek file", e))
    }

    fn tell(&mut self) -> Result<u64> {
        let file = self
            .file
            .as_mut()
            .ok_or(NestfileError::not_open("tell position of"))?;
        file.stream_position()
            .map_err(|e| NestfileError::io("Failed to read file position", e))
    }

    fn stat(&self) -> StatProjection {
        self.stat.clone()
    }

    fn close(&mut self) -> Result<()> {
        self.file = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn fixture(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content).expect("Failed to write fixture");
        file.flush().expect("Failed to flush fixture");
        file
    }

    fn spec_for(file: &NamedTempFile) -> PathSpec {
        PathSpec::plain(file.path().display().to_string())
    }

    #[test]
    fn test_open_read_seek_tell() {
        let file = fixture(b"0123456789");
        let mut handler = PlainFileHandler::open(&spec_for(&file), None).unwrap();

        assert_eq!(handler.size(), Some(10));
        assert_eq!(handler.read(Some(4)).unwrap(), b"0123");
        assert_eq!(handler.tell().unwrap(), 4);

        handler.seek(SeekFrom::Start(7)).unwrap();
        assert_eq!(handler.read(None).unwrap(), b"789");

        handler.seek(SeekFrom::End(-2)).unwrap();
        assert_eq!(handler.read(None).unwrap(), b"89");
    }

    #[test]
    fn test_stat_maps_host_attributes() {
        let file = fixture(b"stat me");
        let handler = PlainFileHandler::open(&spec_for(&file), None).unwrap();
        let stat = handler.stat();

        assert_eq!(stat.size_value().unwrap(), 7);
        #[cfg(unix)]
        {
            assert!(stat.entry_id_value().unwrap() > 0);
            assert!(stat.mtime_value().is_ok());
        }
        // A plain file knows nothing about deletion or backup times.
        assert!(stat.dtime_value().is_err());
        assert!(stat.backup_time_value().is_err());
    }

    #[test]
    fn test_read_after_close_is_a_usage_error() {
        let file = fixture(b"content");
        let mut handler = PlainFileHandler::open(&spec_for(&file), None).unwrap();
        handler.close().unwrap();

        match handler.read(Some(1)) {
            Err(NestfileError::NotOpen { operation }) => assert_eq!(operation, "read"),
            other => panic!("expected NotOpen, got {other:?}"),
        }
        assert!(matches!(
            handler.seek(SeekFrom::Start(0)),
            Err(NestfileError::NotOpen { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_an_open_error() {
        let spec = PathSpec::plain("/this/file/does/not/exist.log");
        assert!(matches!(
            PlainFileHandler::open(&spec, None),
            Err(NestfileError::Io { .. })
        ));
    }

    #[test]
    fn test_type_mismatch_fails_fast() {
        let spec = PathSpec::gzip("whatever.gz");
        match PlainFileHandler::open(&spec, None).err() {
            Some(NestfileError::TypeMismatch { expected, actual }) => {
                assert_eq!(expected, "PLAIN");
                assert_eq!(actual, "GZIP");
            }
            other => panic!("expected TypeMismatch, got {other:?}"),
        }
    }
}
