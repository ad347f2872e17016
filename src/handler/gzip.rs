//! Handler for GZIP compressed streams.
//!
//! GZIP exposes no compressed-content random access, so seeks are emulated:
//! forward by reading and discarding, backward by rewinding the decoder to
//! the start of the source and discarding up to the target. The decompressed
//! size comes from the ISIZE trailer when the compressed source's length is
//! known; multi-member or truncated streams leave it unknown.

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use flate2::read::GzDecoder;

use crate::error::{NestfileError, Result};
use crate::handler::{check_hop_type, SourceStream, StreamHandler};
use crate::spec::{HopType, PathSpec};
use crate::stat::StatProjection;

const DISCARD_CHUNK: usize = 8192;

pub struct GzipStreamHandler {
    decoder: Option<GzDecoder<SourceStream>>,
    /// Decompressed position; the decoder's own accounting is not exposed.
    offset: u64,
    size: Option<u64>,
    display_name: String,
    stat: StatProjection,
}

impl GzipStreamHandler {
    /// Wrap the upstream byte source (or the host path named by the
    /// specification) as a GZIP-decoded stream. A small probe read validates
    /// the stream before the handler is handed out.
    pub fn open(spec: &PathSpec, upstream: Option<Box<dyn StreamHandler>>) -> Result<Self> {
        check_hop_type(spec, HopType::Gzip)?;

        let (mut source, display_name) = match upstream {
            Some(handler) => {
                let source = SourceStream::from_upstream(handler);
                let name = format!("{}_uncompressed", source.name());
                (source, name)
            }
            None => (
                SourceStream::from_host(Path::new(&spec.member_path))?,
                spec.member_path.clone(),
            ),
        };

        let size = read_isize_trailer(&mut source)?;
        source
            .seek(SeekFrom::Start(0))
            .map_err(|e| NestfileError::io("Failed to rewind GZIP source", e))?;

        let mut stat = StatProjection::new();
        stat.entry_id = source.entry_id();
        stat.size = size;
        stat.container_label = Some("GZ File".to_string());

        let mut handler = Self {
            decoder: Some(GzDecoder::new(source)),
            offset: 0,
            size,
            display_name,
            stat,
        };

        // Probe read so a corrupt header fails at open, not mid-parse.
        let probe = handler.read(Some(4)).map_err(|e| {
            NestfileError::io(
                format!(
                    "Not able to open the GZIP file {} -> {}",
                    spec.member_path, e
                ),
                std::io::Error::new(std::io::ErrorKind::InvalidData, "bad gzip stream"),
            )
        })?;
        if probe.is_empty() && size.is_some_and(|s| s > 0) {
            return Err(NestfileError::io(
                format!("Not able to open the GZIP file {}", spec.member_path),
                std::io::Error::new(std::io::ErrorKind::InvalidData, "empty gzip stream"),
            ));
        }
        handler.rewind()?;
        Ok(handler)
    }

    /// Rewind the decoder to decompressed position 0.
    fn rewind(&mut self) -> Result<()> {
        let decoder = self
            .decoder
            .take()
            .ok_or(NestfileError::not_open("seek into"))?;
        let mut source = decoder.into_inner();
        source
            .seek(SeekFrom::Start(0))
            .map_err(|e| NestfileError::io("Failed to rewind GZIP source", e))?;
        self.decoder = Some(GzDecoder::new(source));
        self.offset = 0;
        Ok(())
    }

    /// Skip forward by reading and discarding `count` decompressed bytes.
    fn discard(&mut self, count: u64) -> Result<()> {
        let decoder = self.decoder.as_mut().ok_or(NestfileError::not_open("seek into"))?;
        let mut remaining = count;
        let mut chunk = [0u8; DISCARD_CHUNK];
        while remaining > 0 {
            let take = (remaining as usize).min(DISCARD_CHUNK);
            let got = decoder
                .read(&mut chunk[..take])
                .map_err(|e| NestfileError::io("Failed to read GZIP stream", e))?;
            if got == 0 {
                break;
            }
            self.offset += got as u64;
            remaining -= got as u64;
        }
        Ok(())
    }
}

/// Last four bytes of a GZIP stream hold the decompressed size modulo 2^32.
/// Only readable when the compressed length is known up front.
fn read_isize_trailer(source: &mut SourceStream) -> Result<Option<u64>> {
    const MIN_GZIP_LEN: u64 = 18;
    let Some(len) = source.len() else {
        return Ok(None);
    };
    if len < MIN_GZIP_LEN {
        return Ok(None);
    }
    source
        .seek(SeekFrom::End(-4))
        .map_err(|e| NestfileError::io("Failed to seek GZIP trailer", e))?;
    let mut trailer = [0u8; 4];
    source
        .read_exact(&mut trailer)
        .map_err(|e| NestfileError::io("Failed to read GZIP trailer", e))?;
    Ok(Some(u32::from_le_bytes(trailer) as u64))
}

impl StreamHandler for GzipStreamHandler {
    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn size(&self) -> Option<u64> {
        self.size
    }

    fn read(&mut self, size: Option<usize>) -> Result<Vec<u8>> {
        let decoder = self.decoder.as_mut().ok_or(NestfileError::not_open("read"))?;
        let mut data = Vec::new();
        match size {
            Some(size) => {
                decoder
                    .take(size as u64)
                    .read_to_end(&mut data)
                    .map_err(|e| NestfileError::io("Failed to read GZIP stream", e))?;
            }
            None => {
                decoder
                    .read_to_end(&mut data)
                    .map_err(|e| NestfileError::io("Failed to read GZIP stream", e))?;
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
            SeekFrom::End(delta) => {
                let size = self.size.ok_or_else(|| {
                    NestfileError::seek("GZIP stream size unknown, cannot seek from end")
                })? as i64;
                size + delta
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
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn gzip_fixture(content: &[u8]) -> NamedTempFile {
        let file = NamedTempFile::new().expect("Failed to create temp file");
        let mut encoder = GzEncoder::new(
            std::fs::File::create(file.path()).unwrap(),
            Compression::default(),
        );
        encoder.write_all(content).unwrap();
        encoder.finish().unwrap();
        file
    }

    fn open_fixture(file: &NamedTempFile) -> GzipStreamHandler {
        let spec = PathSpec::gzip(file.path().display().to_string());
        GzipStreamHandler::open(&spec, None).unwrap()
    }

    #[test]
    fn test_read_round_trip() {
        let content = b"What if GZIP could be read like a plain file?\n";
        let file = gzip_fixture(content);
        let mut handler = open_fixture(&file);

        assert_eq!(handler.read(None).unwrap(), content);
        assert_eq!(handler.tell().unwrap(), content.len() as u64);
    }

    #[test]
    fn test_size_from_isize_trailer() {
        let content = vec![b'a'; 3000];
        let file = gzip_fixture(&content);
        let handler = open_fixture(&file);

        assert_eq!(handler.size(), Some(3000));
        assert_eq!(handler.stat().size_value().unwrap(), 3000);
        assert_eq!(handler.stat().container_label_value().unwrap(), "GZ File");
    }

    #[test]
    fn test_seek_forward_discards() {
        let file = gzip_fixture(b"0123456789");
        let mut handler = open_fixture(&file);

        assert_eq!(handler.seek(SeekFrom::Start(6)).unwrap(), 6);
        assert_eq!(handler.read(None).unwrap(), b"6789");
    }

    #[test]
    fn test_seek_backward_rewinds() {
        let file = gzip_fixture(b"0123456789");
        let mut handler = open_fixture(&file);

        handler.read(Some(8)).unwrap();
        assert_eq!(handler.seek(SeekFrom::Current(-6)).unwrap(), 2);
        assert_eq!(handler.read(Some(3)).unwrap(), b"234");
    }

    #[test]
    fn test_seek_from_end() {
        let file = gzip_fixture(b"0123456789");
        let mut handler = open_fixture(&file);

        assert_eq!(handler.seek(SeekFrom::End(-4)).unwrap(), 6);
        assert_eq!(handler.read(None).unwrap(), b"6789");
    }

    #[test]
    fn test_seek_then_read_matches_read_then_discard() {
        let content = b"the quick brown fox jumps over the lazy dog";
        let file = gzip_fixture(content);

        let mut seeker = open_fixture(&file);
        seeker.seek(SeekFrom::Start(10)).unwrap();
        let seeked = seeker.read(Some(9)).unwrap();

        let mut reader = open_fixture(&file);
        let all = reader.read(Some(19)).unwrap();
        assert_eq!(seeked, all[10..]);
    }

    #[test]
    fn test_corrupt_stream_fails_at_open() {
        let mut file = NamedTempFile::new().unwrap();
        // Valid magic, garbage deflate payload, plausible length.
        file.write_all(&[0x1f, 0x8b, 0x08, 0x00]).unwrap();
        file.write_all(&[0xde; 32]).unwrap();
        file.flush().unwrap();

        let spec = PathSpec::gzip(file.path().display().to_string());
        assert!(GzipStreamHandler::open(&spec, None).is_err());
    }

    #[test]
    fn test_closed_handler_is_a_usage_error() {
        let file = gzip_fixture(b"payload");
        let mut handler = open_fixture(&file);
        handler.close().unwrap();

        assert!(matches!(
            handler.read(None),
            Err(NestfileError::NotOpen { .. })
        ));
        assert!(matches!(
            handler.tell(),
            Err(NestfileError::NotOpen { .. })
        ));
    }
}
