//! Handler for members of ZIP archives.
//!
//! The member is located through the archive's central directory at open;
//! its raw data window is then streamed by this handler directly (stored
//! copy or raw deflate), so the handler owns its cursor and its offset
//! bookkeeping — the decompressor cannot report a trustworthy position once
//! buffered read-ahead has occurred. True random access is not available
//! from the decompression stream, so seeks are emulated by reading and
//! discarding forward, or by reopening the member stream from position 0
//! and discarding up to the target.

use std::io::{Read, Seek, SeekFrom, Take};

use flate2::read::DeflateDecoder;
use zip::result::ZipError;
use zip::CompressionMethod;

use crate::error::{NestfileError, Result};
use crate::handler::{check_hop_type, SourceStream, StreamHandler};
use crate::spec::{HopType, PathSpec};
use crate::stat::{StatProjection, Timestamp};

/// Ceiling for reads with no explicit size. A safety bound, not a silent
/// truncation: hitting it is flagged in the log.
const UNBOUND_READ_CAP: u64 = 24 * 1024 * 1024;

const DISCARD_CHUNK: usize = 8192;

enum MemberStream {
    Stored(Take<SourceStream>),
    Deflated(DeflateDecoder<Take<SourceStream>>),
}

impl MemberStream {
    fn into_source(self) -> SourceStream {
        match self {
            Self::Stored(take) => take.into_inner(),
            Self::Deflated(decoder) => decoder.into_inner().into_inner(),
        }
    }
}

impl Read for MemberStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::Stored(take) => take.read(buf),
            Self::Deflated(decoder) => decoder.read(buf),
        }
    }
}

#[derive(Clone, Copy)]
enum StoredMethod {
    Stored,
    Deflated,
}

pub struct ZipMemberHandler {
    stream: Option<MemberStream>,
    /// Member offset maintained by the handler itself.
    offset: u64,
    /// Offset of the member's raw data within the source stream.
    data_start: u64,
    compressed_size: u64,
    /// Decompressed member size from the central directory entry.
    size: u64,
    method: StoredMethod,
    member_path: String,
    display_name: String,
    stat: StatProjection,
}

impl ZipMemberHandler {
    /// Open the member named by the specification inside the ZIP container
    /// read from the upstream byte source (or the host container path).
    pub fn open(spec: &PathSpec, upstream: Option<Box<dyn StreamHandler>>) -> Result<Self> {
        check_hop_type(spec, HopType::Zip)?;

        let mut source = match upstream {
            Some(handler) => SourceStream::from_upstream(handler),
            None => {
                let container = spec.container_path.as_deref().ok_or_else(|| {
                    NestfileError::io(
                        "ZIP hop carries no container path".to_string(),
                        std::io::Error::new(std::io::ErrorKind::InvalidInput, "no container"),
                    )
                })?;
                SourceStream::from_host(container)?
            }
        };
        let display_name = format!("{}:{}", source.name(), spec.member_path);

        source
            .seek(SeekFrom::Start(0))
            .map_err(|e| NestfileError::io("Failed to rewind ZIP source", e))?;
        let member = locate_member(&mut source, &spec.member_path)?;

        let stat = StatProjection {
            entry_id: source.entry_id(),
            size: Some(member.size),
            ctime: member.modified.map(Timestamp::from_seconds),
            container_label: Some("ZIP Container".to_string()),
            ..StatProjection::new()
        };

        let mut handler = Self {
            stream: None,
            offset: 0,
            data_start: member.data_start,
            compressed_size: member.compressed_size,
            size: member.size,
            method: member.method,
            member_path: spec.member_path.clone(),
            display_name,
            stat,
        };
        handler.reopen_stream(source)?;
        Ok(handler)
    }

    /// Build the member stream from position 0 over the given source.
    fn reopen_stream(&mut self, mut source: SourceStream) -> Result<()> {
        source
            .seek(SeekFrom::Start(self.data_start))
            .map_err(|e| NestfileError::io("Failed to seek ZIP member data", e))?;
        let window = source.take(self.compressed_size);
        self.stream = Some(match self.method {
            StoredMethod::Stored => MemberStream::Stored(window),
            StoredMethod::Deflated => MemberStream::Deflated(DeflateDecoder::new(window)),
        });
        self.offset = 0;
        Ok(())
    }

    /// Close and reopen the member stream at position 0.
    fn rewind(&mut self) -> Result<()> {
        let stream = self
            .stream
            .take()
            .ok_or(NestfileError::not_open("seek into"))?;
        self.reopen_stream(stream.into_source())
    }

    /// Read and drop `count` bytes to advance the emulated position.
    fn discard(&mut self, count: u64) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or(NestfileError::not_open("seek into"))?;
        let mut remaining = count;
        let mut chunk = [0u8; DISCARD_CHUNK];
        while remaining > 0 {
            let take = (remaining as usize).min(DISCARD_CHUNK);
            let got = stream
                .read(&mut chunk[..take])
                .map_err(|e| NestfileError::io("Failed to read ZIP member", e))?;
            if got == 0 {
                break;
            }
            self.offset += got as u64;
            remaining -= got as u64;
        }
        Ok(())
    }
}

struct ZipMemberInfo {
    data_start: u64,
    compressed_size: u64,
    size: u64,
    method: StoredMethod,
    modified: Option<i64>,
}

/// Look the member up in the central directory and record how to stream its
/// raw data.
fn locate_member(source: &mut SourceStream, member_path: &str) -> Result<ZipMemberInfo> {
    let mut archive = zip::ZipArchive::new(&mut *source).map_err(|e| {
        NestfileError::io(
            "Failed to read ZIP central directory".to_string(),
            std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        )
    })?;

    let member = match archive.by_name(member_path) {
        Ok(member) => member,
        Err(ZipError::FileNotFound) => {
            return Err(NestfileError::MemberNotFound {
                member: member_path.to_string(),
            })
        }
        Err(e) => {
            return Err(NestfileError::io(
                format!("Unable to open ZIP member: {member_path}"),
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            ))
        }
    };

    let method = match member.compression() {
        CompressionMethod::Stored => StoredMethod::Stored,
        CompressionMethod::Deflated => StoredMethod::Deflated,
        other => {
            return Err(NestfileError::UnsupportedCompression {
                method: format!("{other}"),
            })
        }
    };

    Ok(ZipMemberInfo {
        data_start: member.data_start(),
        compressed_size: member.compressed_size(),
        size: member.size(),
        method,
        modified: member.last_modified().map(|dt| {
            civil_to_epoch(
                dt.year() as i64,
                dt.month() as u32,
                dt.day() as u32,
                dt.hour() as u32,
                dt.minute() as u32,
                dt.second() as u32,
            )
        }),
    })
}

/// Days-from-civil conversion of the member's MS-DOS date to epoch seconds.
/// The archive records local time with no zone; taken as UTC.
fn civil_to_epoch(year: i64, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as u64;
    let mp = ((month + 9) % 12) as u64;
    let doy = (153 * mp + 2) / 5 + u64::from(day) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    let days = era * 146_097 + doe as i64 - 719_468;
    days * 86_400 + i64::from(hour * 3600 + minute * 60 + second)
}

impl StreamHandler for ZipMemberHandler {
    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn size(&self) -> Option<u64> {
        Some(self.size)
    }

    fn read(&mut self, size: Option<usize>) -> Result<Vec<u8>> {
        // A corrupt central directory can understate the member size, in
        // which case the data window over-delivers; capping every read at
        // the declared size keeps the offset inside it.
        let remaining = self.size.saturating_sub(self.offset);
        let take = match size {
            Some(size) => (size as u64).min(remaining),
            None => {
                log::debug!(
                    "[ZIP] Unbound read attempted: {} -> {}",
                    self.member_path,
                    self.display_name
                );
                let capped = remaining.min(UNBOUND_READ_CAP);
                if capped != remaining {
                    log::debug!("[ZIP] Not able to read in the entire file (too large).");
                }
                capped
            }
        };

        let stream = self.stream.as_mut().ok_or(NestfileError::not_open("read"))?;
        let mut data = Vec::new();
        stream
            .take(take)
            .read_to_end(&mut data)
            .map_err(|e| NestfileError::io("Failed to read ZIP member", e))?;
        self.offset += data.len() as u64;
        Ok(data)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        if self.stream.is_none() {
            return Err(NestfileError::not_open("seek into"));
        }

        match pos {
            SeekFrom::Start(target) => {
                self.rewind()?;
                self.discard(target)?;
            }
            SeekFrom::Current(delta) => {
                if delta > 0 {
                    self.discard(delta as u64)?;
                } else {
                    let target = self.offset as i64 + delta;
                    if target < 0 {
                        return Err(NestfileError::seek("seek before start of member"));
                    }
                    self.rewind()?;
                    self.discard(target as u64)?;
                }
            }
            SeekFrom::End(delta) => {
                let target = self.size as i64 + delta;
                if target < 0 {
                    return Err(NestfileError::seek("seek before start of member"));
                }
                let target = target as u64;
                if target > self.offset {
                    self.discard(target - self.offset)?;
                } else {
                    self.rewind()?;
                    self.discard(target)?;
                }
            }
        }
        Ok(self.offset)
    }

    fn tell(&mut self) -> Result<u64> {
        if self.stream.is_none() {
            return Err(NestfileError::not_open("tell position of"));
        }
        Ok(self.offset)
    }

    fn stat(&self) -> StatProjection {
        self.stat.clone()
    }

    fn close(&mut self) -> Result<()> {
        self.stream = None;
        Ok(())
    }
}
