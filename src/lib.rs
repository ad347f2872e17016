//! # nestfile - Nested Evidence File Resolver
//!
//! Resolves a declarative, possibly multi-level file location into a live,
//! uniformly addressable byte stream, regardless of how many storage layers
//! separate the logical file from the raw input. A log file inside a GZIP
//! stream inside a TAR archive inside a file carved from a disk image opens,
//! seeks, reads and stats exactly like a plain file.
//!
//! ## Features
//!
//! - **Recursive resolution**: walk a [`PathSpec`] chain hop by hop, wiring
//!   each format handler to the previous one as its byte source
//! - **Uniform stream contract**: read/seek/tell/stat/close over plain
//!   files, volumes, snapshots, ZIP/TAR members and GZIP/BZIP2 streams
//! - **Seek emulation**: formats without native random access fake it by
//!   rewinding and discarding
//! - **Shared volume handles**: one expensive volume open per
//!   (container, offset, snapshot), shared across resolutions
//! - **Sparse stat projection**: per-format metadata where "unknown here"
//!   is distinguishable from zero
//!
//! ## Architecture
//!
//! The library is organized into focused modules following modern Rust patterns:
//!
//! - [`error`] - Centralized error types and handling
//! - [`spec`] - Path specifications describing nested file locations
//! - [`handler`] - Per-format stream handlers and the shared contract
//! - [`volume`] - Volume backend boundary and the filesystem handle cache
//! - [`stat`] - Sparse metadata projection
//! - [`resolver`] - The chain walk tying it all together

// Core modules
pub mod error;
pub mod handler;
pub mod resolver;
pub mod spec;
pub mod stat;
pub mod volume;

// Re-export commonly used types for convenience
pub use error::{NestfileError, Result};

// Public API surface for external usage
pub use handler::StreamHandler;
pub use resolver::Resolver;
pub use spec::{HopType, PathSpec};
pub use stat::{StatProjection, StatValue, Timestamp};
pub use volume::cache::FilesystemCache;
pub use volume::{CachedVolume, Volume, VolumeBackend, VolumeFile};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
