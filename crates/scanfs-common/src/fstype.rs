//! Filesystem types the scanner knows how to check.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Filesystem types with a non-destructive consistency checker.
///
/// Anything `blkid` reports outside this set is ignored by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FsType {
    Xfs,
    Ext4,
}

impl FsType {
    /// The `TYPE=` tag value blkid reports for this filesystem.
    pub fn blkid_tag(self) -> &'static str {
        match self {
            FsType::Xfs => "xfs",
            FsType::Ext4 => "ext4",
        }
    }

    /// Argument vector of the read-only consistency checker.
    ///
    /// Both tools report corruption through their exit status and never
    /// modify the device in these modes.
    pub fn check_command(self) -> (&'static str, &'static [&'static str]) {
        match self {
            FsType::Xfs => ("/sbin/xfs_repair", &["-n"]),
            FsType::Ext4 => ("/sbin/e2fsck", &["-fn"]),
        }
    }

    /// Both scannable types, in scan order.
    pub fn all() -> [FsType; 2] {
        [FsType::Xfs, FsType::Ext4]
    }

    /// Parse a blkid `TYPE=` value; `None` for unscannable filesystems.
    pub fn from_blkid_tag(tag: &str) -> Option<Self> {
        match tag {
            "xfs" => Some(FsType::Xfs),
            "ext4" => Some(FsType::Ext4),
            _ => None,
        }
    }
}

impl fmt::Display for FsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.blkid_tag())
    }
}
