//! Error types and handling infrastructure for nestfile.
//!
//! This module provides a centralized error handling system using `thiserror` for
//! custom error types covering the whole resolution taxonomy: dispatch mistakes,
//! open/resolution failures, handler misuse and unset stat fields.
//!
//! ## Design Principles
//!
//! - **Context preservation**: resolution failures chain the failing hop's
//!   member path and handler kind onto the underlying cause
//! - **Distinct misuse errors**: calling into a closed handler is reported
//!   separately from genuine I/O failure
//! - **Consistency**: Standardized Result type across all modules

use thiserror::Error;

/// The main error type for nestfile operations.
///
/// This enum covers all error conditions that can occur while resolving a
/// path specification chain and reading from the resulting stream.
#[derive(Error, Debug)]
pub enum NestfileError {
    /// A handler was constructed against a specification of the wrong hop
    /// type. Dispatch-table programming error; fails fast at construction.
    #[error("Handler for {expected} cannot open a {actual} specification")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// Opening one hop of a specification chain failed. Carries the failing
    /// handler kind and member path, chained onto the underlying cause.
    #[error("[{handler}] Unable to open the file: {member_path}")]
    Resolve {
        handler: &'static str,
        member_path: String,
        #[source]
        source: Box<NestfileError>,
    },

    /// Underlying I/O failure (bad path, corrupt container, short stream).
    #[error("File operation failed: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// An archive member named by the specification is not present.
    #[error("Archive member not found: {member}")]
    MemberNotFound { member: String },

    /// A snapshot specification did not carry a snapshot index.
    #[error("Unable to open snapshot file: {member} -> no snapshot index defined")]
    MissingSnapshotIndex { member: String },

    /// Volume-backed hops need a host-addressable container path and cannot
    /// be opened from another handler's byte stream.
    #[error("Volume hops must be the outermost hop of a chain")]
    VolumeNotOutermost,

    /// `read`/`seek`/`tell` invoked on a handler that has been closed.
    #[error("Unable to {operation} a file that is not open")]
    NotOpen { operation: &'static str },

    /// A seek could not be carried out (unknown stream size, bad target).
    #[error("Seek failed: {message}")]
    Seek { message: String },

    /// A stat projection field is not populated for this format. Callers can
    /// branch on "unknown here" explicitly instead of reading a default.
    #[error("Stat field not populated for this format: {field}")]
    StatFieldUnset { field: &'static str },

    /// The specification chain nests deeper than the resolver allows.
    #[error("Specification chain exceeds maximum depth of {max_depth}")]
    MaxDepthExceeded { max_depth: usize },

    /// Failure reported by the volume backend (corrupt image, bad store).
    #[error("Volume backend error: {message}")]
    Volume { message: String },

    /// The archive uses a compression method this layer cannot stream.
    #[error("Unsupported compression method: {method}")]
    UnsupportedCompression { method: String },
}

/// Standard Result type for nestfile operations.
pub type Result<T> = std::result::Result<T, NestfileError>;

impl NestfileError {
    /// Create an Io error from an io::Error with additional context
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Create a Volume backend error with a descriptive message
    pub fn volume(message: impl Into<String>) -> Self {
        Self::Volume {
            message: message.into(),
        }
    }

    /// Create a Seek error with a descriptive message
    pub fn seek(message: impl Into<String>) -> Self {
        Self::Seek {
            message: message.into(),
        }
    }

    /// Usage error for an operation attempted on a closed handler
    pub fn not_open(operation: &'static str) -> Self {
        Self::NotOpen { operation }
    }
}

// Automatic conversion from io::Error to NestfileError
impl From<std::io::Error> for NestfileError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::Io {
                // The specific path context is lost here; call sites that
                // have it attach it through NestfileError::io instead.
                message: "File not found".to_string(),
                source: err,
            },
            std::io::ErrorKind::PermissionDenied => Self::Io {
                message: "Permission denied".to_string(),
                source: err,
            },
            _ => Self::Io {
                message: "IO operation failed".to_string(),
                source: err,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let mismatch = NestfileError::TypeMismatch {
            expected: "GZIP",
            actual: "TAR",
        };
        assert_eq!(
            mismatch.to_string(),
            "Handler for GZIP cannot open a TAR specification"
        );

        let unset = NestfileError::StatFieldUnset { field: "size" };
        assert_eq!(
            unset.to_string(),
            "Stat field not populated for this format: size"
        );

        let not_open = NestfileError::not_open("seek into");
        assert_eq!(
            not_open.to_string(),
            "Unable to seek into a file that is not open"
        );
    }

    #[test]
    fn test_resolve_error_chains_cause() {
        let cause = NestfileError::MemberNotFound {
            member: "syslog.gz".to_string(),
        };
        let wrapped = NestfileError::Resolve {
            handler: "TAR",
            member_path: "syslog.gz".to_string(),
            source: Box::new(cause),
        };

        assert_eq!(
            wrapped.to_string(),
            "[TAR] Unable to open the file: syslog.gz"
        );
        let source = std::error::Error::source(&wrapped).expect("cause should be chained");
        assert!(source.to_string().contains("syslog.gz"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: NestfileError = io_err.into();

        match err {
            NestfileError::Io { message, .. } => {
                assert_eq!(message, "File not found");
            }
            _ => panic!("Expected Io variant"),
        }
    }
}
