//! Handler for BZIP2 compressed streams.
//!
//! The simplest wrapping format: reads delegate straight to the
//! decompression stream and no size is reliably known in advance. Forward
//! seeks discard, backward seeks rewind the decoder; seeking from the end is
//! not possible without a size.

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use bzip2::read::BzDecoder;

use crate::error::{NestfileError, Result};
use crate::handler::{check_hop_type, SourceStream, StreamHandler};
use crate::spec::{HopType, PathSpec};
use crate::stat::StatProjection;

const DISCARD_CHUNK: usize = 8192;

pub struct Bzip2StreamHandler {
    decoder: Option<BzDecoder<SourceStream>>,
    offset: u64,
    display_name: String,
    stat: StatProjection,
}

impl Bzip2StreamHandler {
    /// Wrap the upstream byte source (or the host path named by the
    /// specification) as a BZIP2-decoded stream.
    pub fn open(spec: &PathSpec, upstream: Option<Box<dyn StreamHandler>>) -> Result<Self> {
        check_hop_type(spec, HopType::Bzip2)?;

        let (mut source, display_name) = match upstream {
            Some(handler) => {
                let source = SourceStream::from_upstream(handler);
                let name = format!("{}:{}", source.name(), spec.member_path);
                (source, name)
            }
            None => (
                SourceStream::from_host(Path::new(&spec.member_path))?,
                spec.member_path.clone(),
            ),
        };
        source
            .seek(SeekFrom::Start(0))
            .map_err(|e| NestfileError::io("Failed to rewind BZIP2 source", e))?;

        let mut stat = StatProjection::new();
        stat.entry_id = source.entry_id();
        stat.container_label = Some("BZ2 container".to_string());

        Ok(Self {
            decoder: Some(BzDecoder::new(source)),
            offset: 0,
            display_name,
            stat,
        })
    }

    fn rewind(&mut self) -> Result<()> {
        let decoder = self
            .decoder
            .take()
            .ok_or(NestfileError::not_open("seek into"))?;
        let mut source = decoder.into_inner();
        source
            .seek(SeekFrom::Start(0))
            .map_err(|e| NestfileError::io("Failed to rewind BZIP2 source", e))?;
        self.decoder = Some(BzDecoder::new(source));
        self.offset = 0;
        Ok(())
    }

    fn discard(&mut self, count: u64) -> Result<()> {
        let decoder = self
            .decoder
            .as_mut()
            .ok_or(NestfileError::not_open("seek into"))?;
        let mut remaining = count;
        let mut chunk = [0u8; DISCARD_CHUNK];
        while remaining > 0 {
            let take = (remaining as usize).min(DISCARD_CHUNK);
            let got = decoder
                .read(&mut chunk[..take])
                .map_err(|e| NestfileError::io("Failed to read BZIP2 stream", e))?;
            if got == 0 {
                break;
            }
            self.offset += got as u64;
            remaining -= got as u64;
        }
        Ok(())
    }
}

impl StreamHandler for Bzip2StreamHandler {
    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn size(&self) -> Option<u64> {
        None
    }

    fn read(&mut self, size: Option<usize>) -> Result<Vec<u8>> {
        let decoder = self.decoder.as_mut().ok_or(NestfileError::not_open("read"))?;
        let mut data = Vec::new();
        match size {
            Some(size) => {
                decoder
                    .take(size as u64)
                    .read_to_end(&mut data)
                    .map_err(|e| NestfileError::io("Failed to read BZIP2 stream", e))?;
            }
            None => {
                decoder
                    .read_to_end(&mut data)
                    .map_err(|e| NestfileError::io("Failed to read BZIP2 stream", e))?;
            }
        }
        self.offset += data.len() as u64;
        Ok(data)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        if self.decoder.is_none() {
            return Err(NestfileError::not_open("seek into"));
        }
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(delta) => self.offset as i64 + delta,
            SeekFrom::End(_) => {
                return Err(NestfileError::seek(
                    "BZIP2 stream size unknown, cannot seek from end",
                ));
            }
        };
        if target < 0 {
            return Err(NestfileError::seek("seek before start of stream"));
        }
        let target = target as u64;

        if target >= self.offset {
            self.discard(target - self.offset)?;
        } else {
            self.rewind()?;
            self.discard(target)?;
        }
        Ok(self.offset)
    }

    fn tell(&mut self) -> Result<u64> {
        if self.decoder.is_none() {
            return Err(NestfileError::not_open("tell position of"));
        }
        Ok(self.offset)
    }

    fn stat(&self) -> StatProjection {
        self.stat.clone()
    }

    fn close(&mut self) -> Result<()> {
        self.decoder = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bzip2::write::BzEncoder;
    use bzip2::Compression;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn bzip2_fixture(content: &[u8]) -> NamedTempFile {
        let file = NamedTempFile::new().expect("Failed to create temp file");
        let mut encoder = BzEncoder::new(
            std::fs::File::create(file.path()).unwrap(),
            Compression::default(),
        );
        encoder.write_all(content).unwrap();
        encoder.finish().unwrap();
        file
    }

    fn open_fixture(file: &NamedTempFile) -> Bzip2StreamHandler {
        let spec = PathSpec::bzip2(file.path().display().to_string());
        Bzip2StreamHandler::open(&spec, None).unwrap()
    }

    #[test]
    fn test_read_round_trip() {
        let content = b"bzip2 payload line one\nand line two\n";
        let file = bzip2_fixture(content);
        let mut handler = open_fixture(&file);

        assert_eq!(handler.read(None).unwrap(), content);
    }

    #[test]
    fn test_read_line_delegates_through_default() {
        let file = bzip2_fixture(b"alpha\nbeta\n");
        let mut handler = open_fixture(&file);

        assert_eq!(handler.read_line(None).unwrap(), b"alpha\n");
        assert_eq!(handler.read_line(None).unwrap(), b"beta\n");
        assert_eq!(handler.read_line(None).unwrap(), b"");
    }

    #[test]
    fn test_size_is_unknown() {
        let file = bzip2_fixture(b"opaque");
        let handler = open_fixture(&file);

        assert_eq!(handler.size(), None);
        assert!(handler.stat().size_value().is_err());
        assert_eq!(
            handler.stat().container_label_value().unwrap(),
            "BZ2 container"
        );
    }

    #[test]
    fn test_seek_forward_and_back() {
        let file = bzip2_fixture(b"0123456789");
        let mut handler = open_fixture(&file);

        handler.seek(SeekFrom::Start(7)).unwrap();
        assert_eq!(handler.read(Some(2)).unwrap(), b"78");
        handler.seek(SeekFrom::Current(-5)).unwrap();
        assert_eq!(handler.read(Some(2)).unwrap(), b"45");

        assert!(matches!(
            handler.seek(SeekFrom::End(-1)),
            Err(NestfileError::Seek { .. })
        ));
    }
}
