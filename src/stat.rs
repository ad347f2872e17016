//! Sparse stat projection over disparate native metadata shapes.
//!
//! Image filesystem inode records, host filesystem stat results and archive
//! member headers all expose different metadata subsets. [`StatProjection`]
//! unifies them into one queryable shape where "not known for this format"
//! is a first-class state: every field is optional and the typed getters
//! return [`NestfileError::StatFieldUnset`] for fields the backing format
//! did not supply, so callers can tell "unset" apart from "zero".

use crate::error::{NestfileError, Result};

/// An instant with a nanosecond component, for backing formats that offer
/// sub-second precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    /// Seconds since the Unix epoch
    pub seconds: i64,
    /// Nanosecond remainder
    pub nanos: u32,
}

impl Timestamp {
    /// Whole-second instant
    pub fn from_seconds(seconds: i64) -> Self {
        Self { seconds, nanos: 0 }
    }

    /// Instant with a nanosecond remainder
    pub fn new(seconds: i64, nanos: u32) -> Self {
        Self { seconds, nanos }
    }
}

/// A populated stat field, as yielded by [`StatProjection::populated`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatValue<'a> {
    Number(u64),
    Time(Timestamp),
    Label(&'a str),
}

macro_rules! stat_getter {
    ($(#[$doc:meta])* $name:ident, $field:ident, $ty:ty) => {
        $(#[$doc])*
        pub fn $name(&self) -> Result<$ty> {
            self.$field.ok_or(NestfileError::StatFieldUnset {
                field: stringify!($field),
            })
        }
    };
}

/// Sparse, per-format metadata record.
///
/// Fields are written by the handler (or volume backend) that opened the
/// file and read through the typed getters. Not all formats populate all
/// fields; an archive member typically carries little more than a size, a
/// timestamp and a container label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatProjection {
    pub mode: Option<u32>,
    /// Inode-like identifier of the backing object
    pub entry_id: Option<u64>,
    pub device: Option<u64>,
    pub link_count: Option<u64>,
    pub uid: Option<u64>,
    pub gid: Option<u64>,
    pub size: Option<u64>,
    pub atime: Option<Timestamp>,
    /// Creation time, where the backing filesystem records one
    pub crtime: Option<Timestamp>,
    pub mtime: Option<Timestamp>,
    /// Metadata-change time
    pub ctime: Option<Timestamp>,
    /// Deletion time, where the backing filesystem records one
    pub dtime: Option<Timestamp>,
    pub backup_time: Option<Timestamp>,
    /// Descriptive label for the backing format or filesystem type
    pub container_label: Option<String>,
}

impl StatProjection {
    /// Empty projection; handlers fill in what their format supplies
    pub fn new() -> Self {
        Self::default()
    }

    stat_getter!(
        /// File mode bits
        mode_value, mode, u32
    );
    stat_getter!(
        /// Inode-like identifier
        entry_id_value, entry_id, u64
    );
    stat_getter!(
        /// Device identifier
        device_value, device, u64
    );
    stat_getter!(
        /// Hard link count
        link_count_value, link_count, u64
    );
    stat_getter!(
        /// Owner id
        uid_value, uid, u64
    );
    stat_getter!(
        /// Group id
        gid_value, gid, u64
    );
    stat_getter!(
        /// File size in bytes
        size_value, size, u64
    );
    stat_getter!(
        /// Last access time
        atime_value, atime, Timestamp
    );
    stat_getter!(
        /// Creation time
        crtime_value, crtime, Timestamp
    );
    stat_getter!(
        /// Last modification time
        mtime_value, mtime, Timestamp
    );
    stat_getter!(
        /// Metadata-change time
        ctime_value, ctime, Timestamp
    );
    stat_getter!(
        /// Deletion time
        dtime_value, dtime, Timestamp
    );
    stat_getter!(
        /// Backup time
        backup_time_value, backup_time, Timestamp
    );

    /// Backing format label, e.g. "NTFS" or "TAR container"
    pub fn container_label_value(&self) -> Result<&str> {
        self.container_label
            .as_deref()
            .ok_or(NestfileError::StatFieldUnset {
                field: "container_label",
            })
    }

    /// Iterate the populated fields in a stable order, for display.
    pub fn populated(&self) -> impl Iterator<Item = (&'static str, StatValue<'_>)> {
        let number = |v: Option<u64>| v.map(StatValue::Number);
        let time = |v: Option<Timestamp>| v.map(StatValue::Time);

        let fields: [(&'static str, Option<StatValue<'_>>); 14] = [
            ("mode", self.mode.map(|m| StatValue::Number(m as u64))),
            ("entry_id", number(self.entry_id)),
            ("device", number(self.device)),
            ("link_count", number(self.link_count)),
            ("uid", number(self.uid)),
            ("gid", number(self.gid)),
            ("size", number(self.size)),
            ("atime", time(self.atime)),
            ("crtime", time(self.crtime)),
            ("mtime", time(self.mtime)),
            ("ctime", time(self.ctime)),
            ("dtime", time(self.dtime)),
            ("backup_time", time(self.backup_time)),
            (
                "container_label",
                self.container_label.as_deref().map(StatValue::Label),
            ),
        ];
        fields.into_iter().filter_map(|(name, v)| Some((name, v?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_field_is_an_error_not_zero() {
        let stat = StatProjection::new();
        match stat.size_value() {
            Err(NestfileError::StatFieldUnset { field }) => assert_eq!(field, "size"),
            other => panic!("expected StatFieldUnset, got {other:?}"),
        }
    }

    #[test]
    fn test_populated_zero_is_distinguishable_from_unset() {
        let stat = StatProjection {
            size: Some(0),
            ..StatProjection::new()
        };
        assert_eq!(stat.size_value().unwrap(), 0);
        assert!(stat.mtime_value().is_err());
    }

    #[test]
    fn test_populated_iteration_order_and_contents() {
        let stat = StatProjection {
            entry_id: Some(12),
            size: Some(1024),
            mtime: Some(Timestamp::new(1_355_961_600, 247)),
            container_label: Some("TAR container".to_string()),
            ..StatProjection::new()
        };

        let fields: Vec<_> = stat.populated().collect();
        assert_eq!(
            fields,
            vec![
                ("entry_id", StatValue::Number(12)),
                ("size", StatValue::Number(1024)),
                ("mtime", StatValue::Time(Timestamp::new(1_355_961_600, 247))),
                ("container_label", StatValue::Label("TAR container")),
            ]
        );
    }
}
