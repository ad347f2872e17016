//! Path specifications: declarative descriptions of where a file lives.
//!
//! A [`PathSpec`] describes one storage hop (a disk image, an archive member,
//! a compressed stream, a plain host file) and may nest another specification
//! describing the next hop inward. A chain like
//! `VOLUME -> GZIP -> TAR -> GZIP` addresses a syslog file buried four layers
//! deep in an evidence image. Specifications are produced and persisted by an
//! upstream case-management layer; this crate only consumes them.

use std::path::PathBuf;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The storage format of a single hop.
///
/// Closed set: adding a format means adding a variant here and a constructor
/// arm in the resolver dispatch, not registering anything at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum HopType {
    /// A plain file on a mounted host filesystem
    Plain,
    /// A file inside an image-backed or mounted volume
    Volume,
    /// A file inside a point-in-time snapshot of a volume
    Snapshot,
    /// A member of a ZIP archive
    Zip,
    /// A GZIP compressed stream
    Gzip,
    /// A BZIP2 compressed stream
    Bzip2,
    /// A member of a TAR archive
    Tar,
}

impl HopType {
    /// Stable display name, used in error context and log traces
    pub fn name(&self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Volume => "VOLUME",
            Self::Snapshot => "SNAPSHOT",
            Self::Zip => "ZIP",
            Self::Gzip => "GZIP",
            Self::Bzip2 => "BZIP2",
            Self::Tar => "TAR",
        }
    }
}

impl std::fmt::Display for HopType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One hop of a file location, possibly nesting the next hop inward.
///
/// The chain is a simple path: each `nested` specification strictly
/// describes content inside the current hop's resolved byte stream. Depth is
/// bounded by the resolver, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PathSpec {
    /// Storage format of this hop
    pub hop_type: HopType,
    /// Logical path of the target within this hop
    pub member_path: String,
    /// Path to the backing container file (volume/snapshot hops, or the
    /// archive container when the hop is outermost)
    pub container_path: Option<PathBuf>,
    /// Byte offset of the volume within the container (partitioned images)
    pub volume_offset: Option<u64>,
    /// The backing filesystem's internal object identifier, when known
    pub volume_entry: Option<u64>,
    /// Snapshot store index; required for snapshot hops
    pub snapshot_index: Option<u32>,
    /// The next hop inward, if the target is nested deeper
    pub nested: Option<Box<PathSpec>>,
}

impl PathSpec {
    fn new(hop_type: HopType, member_path: impl Into<String>) -> Self {
        Self {
            hop_type,
            member_path: member_path.into(),
            container_path: None,
            volume_offset: None,
            volume_entry: None,
            snapshot_index: None,
            nested: None,
        }
    }

    /// A plain file on the host filesystem
    pub fn plain(path: impl Into<String>) -> Self {
        Self::new(HopType::Plain, path)
    }

    /// A file addressed inside an image-backed volume
    pub fn volume(container: impl Into<PathBuf>, member_path: impl Into<String>) -> Self {
        Self {
            container_path: Some(container.into()),
            ..Self::new(HopType::Volume, member_path)
        }
    }

    /// A file addressed inside a volume snapshot
    pub fn snapshot(
        container: impl Into<PathBuf>,
        member_path: impl Into<String>,
        snapshot_index: u32,
    ) -> Self {
        Self {
            container_path: Some(container.into()),
            snapshot_index: Some(snapshot_index),
            ..Self::new(HopType::Snapshot, member_path)
        }
    }

    /// A member of a ZIP archive
    pub fn zip_member(member_path: impl Into<String>) -> Self {
        Self::new(HopType::Zip, member_path)
    }

    /// A GZIP compressed stream
    pub fn gzip(member_path: impl Into<String>) -> Self {
        Self::new(HopType::Gzip, member_path)
    }

    /// A BZIP2 compressed stream
    pub fn bzip2(member_path: impl Into<String>) -> Self {
        Self::new(HopType::Bzip2, member_path)
    }

    /// A member of a TAR archive
    pub fn tar_member(member_path: impl Into<String>) -> Self {
        Self::new(HopType::Tar, member_path)
    }

    /// Set the container path (outermost archive hops opened from the host)
    pub fn with_container(mut self, container: impl Into<PathBuf>) -> Self {
        self.container_path = Some(container.into());
        self
    }

    /// Set the byte offset of the volume within its container
    pub fn with_volume_offset(mut self, offset: u64) -> Self {
        self.volume_offset = Some(offset);
        self
    }

    /// Set the backing filesystem's internal object identifier
    pub fn with_volume_entry(mut self, entry: u64) -> Self {
        self.volume_entry = Some(entry);
        self
    }

    /// Nest the next hop inward
    pub fn with_nested(mut self, nested: PathSpec) -> Self {
        self.nested = Some(Box::new(nested));
        self
    }

    /// Check whether this hop nests another specification
    pub fn has_nested(&self) -> bool {
        self.nested.is_some()
    }

    /// Number of hops in the chain, this one included
    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut current = self;
        while let Some(nested) = current.nested.as_deref() {
            depth += 1;
            current = nested;
        }
        depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hop_type_names() {
        assert_eq!(HopType::Plain.name(), "PLAIN");
        assert_eq!(HopType::Snapshot.name(), "SNAPSHOT");
        assert_eq!(HopType::Bzip2.name(), "BZIP2");
        assert_eq!(format!("{}", HopType::Tar), "TAR");
    }

    #[test]
    fn test_builder_chain_depth() {
        let spec = PathSpec::volume("eimg.dd", "/logs/sys.tgz")
            .with_volume_entry(12)
            .with_nested(
                PathSpec::gzip("/logs/sys.tgz").with_nested(
                    PathSpec::tar_member("syslog.gz").with_nested(PathSpec::gzip("syslog.gz")),
                ),
            );

        assert_eq!(spec.depth(), 4);
        assert!(spec.has_nested());
        assert_eq!(spec.hop_type, HopType::Volume);
        assert_eq!(spec.volume_entry, Some(12));

        let innermost = spec
            .nested
            .as_deref()
            .and_then(|s| s.nested.as_deref())
            .and_then(|s| s.nested.as_deref())
            .unwrap();
        assert_eq!(innermost.hop_type, HopType::Gzip);
        assert_eq!(innermost.member_path, "syslog.gz");
        assert!(!innermost.has_nested());
    }

    #[test]
    fn test_snapshot_builder_sets_index() {
        let spec = PathSpec::snapshot("image.dd", "/Windows/setupapi.log", 3);
        assert_eq!(spec.snapshot_index, Some(3));
        assert_eq!(spec.container_path, Some(PathBuf::from("image.dd")));
    }
}
