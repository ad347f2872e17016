//! Handler for members of TAR archives.
//!
//! The member is located through the archive reader once, at open, recording
//! the raw byte window its data occupies in the source stream. Reads then
//! stream that window through an explicit lookahead buffer: extraction
//! primitives are known to over-read past the requested size on some inputs,
//! so excess bytes are held back and spliced into subsequent reads instead
//! of being discarded. Line reads refill the buffer until a terminator is
//! present and preserve the remainder for the next call.

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{NestfileError, Result};
use crate::handler::{check_hop_type, SourceStream, StreamHandler};
use crate::spec::{HopType, PathSpec};
use crate::stat::{StatProjection, Timestamp};

/// Refill granularity for line reads.
const LINE_CHUNK: usize = 512;

pub struct TarMemberHandler {
    source: Option<SourceStream>,
    /// Offset of the member's data within the source stream.
    data_start: u64,
    /// Member size from the archive header.
    size: u64,
    /// Bytes of the member consumed from the source so far.
    source_pos: u64,
    /// Unread lookahead; `tell` subtracts it from the source position.
    buffer: Vec<u8>,
    display_name: String,
    stat: StatProjection,
}

impl TarMemberHandler {
    /// Open the member named by the specification inside the TAR container
    /// read from the upstream byte source (or the host container path).
    pub fn open(spec: &PathSpec, upstream: Option<Box<dyn StreamHandler>>) -> Result<Self> {
        check_hop_type(spec, HopType::Tar)?;

        let mut source = match upstream {
            Some(handler) => SourceStream::from_upstream(handler),
            None => {
                let container = spec.container_path.as_deref().ok_or_else(|| {
                    NestfileError::io(
                        "TAR hop carries no container path".to_string(),
                        std::io::Error::new(std::io::ErrorKind::InvalidInput, "no container"),
                    )
                })?;
                SourceStream::from_host(container)?
            }
        };
        let display_name = format!("{}:{}", source.name(), spec.member_path);

        source
            .seek(SeekFrom::Start(0))
            .map_err(|e| NestfileError::io("Failed to rewind TAR source", e))?;
        let member = locate_member(&mut source, &spec.member_path)?;
        if member.size == 0 || !member.is_file {
            return Err(NestfileError::io(
                format!(
                    "[TAR] File {} empty or unable to open.",
                    spec.member_path
                ),
                std::io::Error::new(std::io::ErrorKind::InvalidData, "empty member"),
            ));
        }

        source
            .seek(SeekFrom::Start(member.data_start))
            .map_err(|e| NestfileError::io("Failed to seek TAR member data", e))?;

        let stat = StatProjection {
            entry_id: source.entry_id(),
            mode: member.mode,
            uid: member.uid,
            gid: member.gid,
            size: Some(member.size),
            mtime: member.mtime.map(Timestamp::from_seconds),
            container_label: Some("Tar container".to_string()),
            ..StatProjection::new()
        };

        Ok(Self {
            source: Some(source),
            data_start: member.data_start,
            size: member.size,
            source_pos: 0,
            buffer: Vec::new(),
            display_name,
            stat,
        })
    }

    /// Read up to `size` bytes of member data from the source window,
    /// starting at the current source position.
    fn window_read(&mut self, size: Option<usize>) -> Result<Vec<u8>> {
        let remaining = (self.size - self.source_pos) as usize;
        let take = size.unwrap_or(remaining).min(remaining);
        let source = self.source.as_mut().ok_or(NestfileError::not_open("read"))?;

        let mut data = vec![0u8; take];
        let mut filled = 0;
        while filled < take {
            let got = source
                .read(&mut data[filled..])
                .map_err(|e| NestfileError::io("Failed to read TAR member", e))?;
            if got == 0 {
                break;
            }
            filled += got;
        }
        data.truncate(filled);
        self.source_pos += filled as u64;
        Ok(data)
    }

    /// Reposition the source cursor to `member_offset` within the member.
    fn window_seek(&mut self, member_offset: i64) -> Result<u64> {
        if member_offset < 0 {
            return Err(NestfileError::seek("seek before start of member"));
        }
        let member_offset = (member_offset as u64).min(self.size);
        let source = self
            .source
            .as_mut()
            .ok_or(NestfileError::not_open("seek into"))?;
        source
            .seek(SeekFrom::Start(self.data_start + member_offset))
            .map_err(|e| NestfileError::io("Failed to seek TAR member", e))?;
        self.source_pos = member_offset;
        Ok(member_offset)
    }
}

struct MemberInfo {
    data_start: u64,
    size: u64,
    is_file: bool,
    mode: Option<u32>,
    uid: Option<u64>,
    gid: Option<u64>,
    mtime: Option<i64>,
}

/// Walk the archive's headers and record the raw data window of the named
/// member, plus the header metadata worth projecting.
fn locate_member(source: &mut SourceStream, member_path: &str) -> Result<MemberInfo> {
    let mut archive = tar::Archive::new(source);
    let entries = archive
        .entries()
        .map_err(|e| NestfileError::io("Failed to read TAR archive", e))?;

    for entry in entries {
        let entry = entry.map_err(|e| NestfileError::io("Failed to read TAR entry", e))?;
        let path = entry
            .path()
            .map_err(|e| NestfileError::io("Failed to read TAR entry path", e))?;
        if path.as_ref() != Path::new(member_path) {
            continue;
        }

        let header = entry.header();
        return Ok(MemberInfo {
            data_start: entry.raw_file_position(),
            size: entry.size(),
            is_file: header.entry_type().is_file(),
            mode: header.mode().ok(),
            uid: header.uid().ok(),
            gid: header.gid().ok(),
            mtime: header.mtime().ok().map(|t| t as i64),
        });
    }

    Err(NestfileError::MemberNotFound {
        member: member_path.to_string(),
    })
}

impl StreamHandler for TarMemberHandler {
    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn size(&self) -> Option<u64> {
        Some(self.size)
    }

    fn read(&mut self, size: Option<usize>) -> Result<Vec<u8>> {
        if self.source.is_none() {
            return Err(NestfileError::not_open("read"));
        }

        // Serve from the lookahead buffer first.
        if let Some(size) = size {
            if self.buffer.len() >= size {
                let rest = self.buffer.split_off(size);
                return Ok(std::mem::replace(&mut self.buffer, rest));
            }
        }

        let mut data = std::mem::take(&mut self.buffer);
        let read_size = size.map(|s| s - data.len());
        data.extend(self.window_read(read_size)?);

        // Hold back anything past the requested size rather than dropping
        // it; the excess belongs to the next read.
        if let Some(size) = size {
            if data.len() > size {
                self.buffer = data.split_off(size);
            }
        }
        Ok(data)
    }

    fn read_line(&mut self, max: Option<usize>) -> Result<Vec<u8>> {
        if self.source.is_none() {
            return Err(NestfileError::not_open("read"));
        }

        // Refill until a terminator is buffered or the member is exhausted.
        while !self.buffer.contains(&b'\n') && self.source_pos < self.size {
            let chunk = self.window_read(Some(LINE_CHUNK))?;
            if chunk.is_empty() {
                break;
            }
            self.buffer.extend(chunk);
        }

        let take = match max {
            Some(max) if self.buffer.len() > max => max,
            _ => self.buffer.len(),
        };
        let mut line = {
            let rest = self.buffer.split_off(take);
            std::mem::replace(&mut self.buffer, rest)
        };

        // Split at the first terminator, preserving the remainder.
        if let Some(pos) = line.iter().position(|&b| b == b'\n') {
            let remainder = line.split_off(pos + 1);
            self.buffer.splice(0..0, remainder);
        }
        Ok(line)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        if self.source.is_none() {
            return Err(NestfileError::not_open("seek into"));
        }

        match pos {
            SeekFrom::Current(delta) => {
                // Consume from the buffer first, then fall back to the
                // underlying stream.
                if delta > 0 && self.buffer.len() > delta as usize {
                    self.buffer.drain(..delta as usize);
                } else {
                    let target = self.source_pos as i64 - self.buffer.len() as i64 + delta;
                    self.buffer.clear();
                    self.window_seek(target)?;
                }
            }
            SeekFrom::Start(offset) => {
                self.buffer.clear();
                self.window_seek(offset as i64)?;
            }
            SeekFrom::End(delta) => {
                self.buffer.clear();
                self.window_seek(self.size as i64 + delta)?;
            }
        }
        self.tell()
    }

    fn tell(&mut self) -> Result<u64> {
        if self.source.is_none() {
            return Err(NestfileError::not_open("tell position of"));
        }
        Ok(self.source_pos - self.buffer.len() as u64)
    }

    fn stat(&self) -> StatProjection {
        self.stat.clone()
    }

    fn close(&mut self) -> Result<()> {
        self.source = None;
        self.buffer.clear();
        Ok(())
    }
}
