//! Stream handler contract and shared byte-source plumbing.
//!
//! Every storage format implements [`StreamHandler`]: open (fused into the
//! constructor), read, seek, tell, stat, close. The resolver walks a path
//! specification chain and wires each hop's handler to the previous hop's
//! handler as its byte source, so a log file inside a GZIP stream inside a
//! TAR archive inside a disk image reads like a plain file.
//!
//! Handlers are stateful and single-use: one current-position cursor each,
//! created by `open`, finished by `close` (or drop). A wrapping handler owns
//! the upstream handler it was opened from; the chain unwinds innermost-out
//! through ownership when the resolved handler is dropped.

pub mod bzip;
pub mod gzip;
pub mod plain;
pub mod tar;
pub mod volume;
pub mod zip;

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{NestfileError, Result};
use crate::stat::StatProjection;

pub use self::bzip::Bzip2StreamHandler;
pub use self::gzip::GzipStreamHandler;
pub use self::plain::PlainFileHandler;
pub use self::tar::TarMemberHandler;
pub use self::volume::{SnapshotFileHandler, VolumeFileHandler};
pub use self::zip::ZipMemberHandler;

/// Uniform stream contract over any resolved storage hop.
///
/// `read(None)` reads to the end of the stream (format handlers without a
/// reliable size cap this, see the ZIP handler). `seek` supports all three
/// whence modes of [`SeekFrom`]; formats without native random access
/// emulate it by rewinding and discarding. Calling `read`, `seek` or `tell`
/// after `close` is a usage error, distinct from I/O failure.
pub trait StreamHandler: Send {
    /// Fully-qualified display name encoding every hop up to this one.
    fn display_name(&self) -> &str;

    /// Stream size in bytes, when the format can know it up front.
    fn size(&self) -> Option<u64>;

    /// Read up to `size` bytes (to end-of-stream when `None`).
    fn read(&mut self, size: Option<usize>) -> Result<Vec<u8>>;

    /// Read one line including its terminator, capped at `max` bytes.
    ///
    /// Returns an empty buffer at end-of-stream. The default implementation
    /// reads byte-wise through `read`; buffered formats override it.
    fn read_line(&mut self, max: Option<usize>) -> Result<Vec<u8>> {
        let mut line = Vec::new();
        loop {
            if let Some(max) = max {
                if line.len() >= max {
                    break;
                }
            }
            let byte = self.read(Some(1))?;
            match byte.first() {
                None => break,
                Some(&b) => {
                    line.push(b);
                    if b == b'\n' {
                        break;
                    }
                }
            }
        }
        Ok(line)
    }

    /// Seek to a position in the stream; returns the new absolute offset.
    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;

    /// Current offset into the stream.
    fn tell(&mut self) -> Result<u64>;

    /// Project the metadata this format knows about the target.
    fn stat(&self) -> StatProjection;

    /// Release the resources this handler itself acquired.
    ///
    /// Closing is idempotent. The upstream handler (if any) stays owned and
    /// is released when this handler is dropped.
    fn close(&mut self) -> Result<()>;
}

/// Adapter exposing a boxed handler as [`std::io::Read`] + [`Seek`] so codec
/// crates (flate2, bzip2, zip, tar) can consume it directly.
pub struct HandlerReader {
    handler: Box<dyn StreamHandler>,
}

impl HandlerReader {
    pub fn new(handler: Box<dyn StreamHandler>) -> Self {
        Self { handler }
    }

    pub fn handler(&self) -> &dyn StreamHandler {
        self.handler.as_ref()
    }
}

fn to_io_error(err: NestfileError) -> io::Error {
    io::Error::other(err)
}

impl Read for HandlerReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.handler.read(Some(buf.len())).map_err(to_io_error)?;
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }
}

impl Seek for HandlerReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.handler.seek(pos).map_err(to_io_error)
    }
}

/// Defensive dispatch check: a handler only opens specifications of its own
/// hop type. The resolver's closed dispatch makes a mismatch a programming
/// error, reported at construction.
pub(crate) fn check_hop_type(spec: &crate::spec::PathSpec, expected: crate::spec::HopType) -> Result<()> {
    if spec.hop_type != expected {
        return Err(NestfileError::TypeMismatch {
            expected: expected.name(),
            actual: spec.hop_type.name(),
        });
    }
    Ok(())
}

enum SourceInner {
    Host(File),
    Upstream(HandlerReader),
}

/// The byte source an archive or compression hop reads from: either a host
/// file (outermost hop) or the previously opened handler.
///
/// Carries the provenance the wrapping handler inherits: the source's
/// display name (for hop-by-hop name composition) and its entry id.
pub(crate) struct SourceStream {
    inner: SourceInner,
    name: String,
    entry_id: Option<u64>,
    len: Option<u64>,
}

impl SourceStream {
    /// Wrap the previously opened handler as the byte source.
    pub(crate) fn from_upstream(handler: Box<dyn StreamHandler>) -> Self {
        let name = handler.display_name().to_string();
        let entry_id = handler.stat().entry_id;
        let len = handler.size();
        Self {
            inner: SourceInner::Upstream(HandlerReader::new(handler)),
            name,
            entry_id,
            len,
        }
    }

    /// Open a host file as the byte source.
    pub(crate) fn from_host(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            NestfileError::io(format!("Failed to open container: {}", path.display()), e)
        })?;
        let metadata = file
            .metadata()
            .map_err(|e| NestfileError::io("Failed to read container metadata", e))?;
        #[cfg(unix)]
        let entry_id = {
            use std::os::unix::fs::MetadataExt;
            Some(metadata.ino())
        };
        #[cfg(not(unix))]
        let entry_id = None;
        Ok(Self {
            inner: SourceInner::Host(file),
            name: path.display().to_string(),
            entry_id,
            len: Some(metadata.len()),
        })
    }

    /// Display name of the source, used to build the wrapping hop's name.
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Entry id inherited from the source for provenance.
    pub(crate) fn entry_id(&self) -> Option<u64> {
        self.entry_id
    }

    /// Total length of the source stream, when known.
    pub(crate) fn len(&self) -> Option<u64> {
        self.len
    }
}

impl Read for SourceStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            SourceInner::Host(file) => file.read(buf),
            SourceInner::Upstream(reader) => reader.read(buf),
        }
    }
}

impl Seek for SourceStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match &mut self.inner {
            SourceInner::Host(file) => file.seek(pos),
            SourceInner::Upstream(reader) => reader.seek(pos),
        }
    }
}
