//! Recognized job_stats operations
//!
//! Storage targets export one counter line per operation. Only the operations
//! listed here are aggregated; everything else in a dump is parsed but dropped
//! by the aggregator. `Ops` is synthetic: it is never read from a dump, it is
//! the per-job sum of all other operations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the 26 operation columns a job record can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Ops,
    Create,
    Open,
    Close,
    Mknod,
    Link,
    Unlink,
    Mkdir,
    Rmdir,
    Rename,
    Getattr,
    Setattr,
    Getxattr,
    Setxattr,
    Statfs,
    Sync,
    Read,
    Write,
    Punch,
    Migrate,
    Fallocate,
    Destroy,
    GetInfo,
    SetInfo,
    Quotactl,
    Prealloc,
}

/// Number of operation columns, including the synthetic `ops` total
pub const OPERATION_COUNT: usize = 26;

impl Operation {
    /// All operations in report order (`ops` first)
    pub const ALL: [Operation; OPERATION_COUNT] = [
        Operation::Ops,
        Operation::Create,
        Operation::Open,
        Operation::Close,
        Operation::Mknod,
        Operation::Link,
        Operation::Unlink,
        Operation::Mkdir,
        Operation::Rmdir,
        Operation::Rename,
        Operation::Getattr,
        Operation::Setattr,
        Operation::Getxattr,
        Operation::Setxattr,
        Operation::Statfs,
        Operation::Sync,
        Operation::Read,
        Operation::Write,
        Operation::Punch,
        Operation::Migrate,
        Operation::Fallocate,
        Operation::Destroy,
        Operation::GetInfo,
        Operation::SetInfo,
        Operation::Quotactl,
        Operation::Prealloc,
    ];

    /// Column index into fixed-size counter arrays
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Name as it appears in a job_stats dump
    pub fn long_name(self) -> &'static str {
        match self {
            Operation::Ops => "ops",
            Operation::Create => "create",
            Operation::Open => "open",
            Operation::Close => "close",
            Operation::Mknod => "mknod",
            Operation::Link => "link",
            Operation::Unlink => "unlink",
            Operation::Mkdir => "mkdir",
            Operation::Rmdir => "rmdir",
            Operation::Rename => "rename",
            Operation::Getattr => "getattr",
            Operation::Setattr => "setattr",
            Operation::Getxattr => "getxattr",
            Operation::Setxattr => "setxattr",
            Operation::Statfs => "statfs",
            Operation::Sync => "sync",
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::Punch => "punch",
            Operation::Migrate => "migrate",
            Operation::Fallocate => "fallocate",
            Operation::Destroy => "destroy",
            Operation::GetInfo => "get_info",
            Operation::SetInfo => "set_info",
            Operation::Quotactl => "quotactl",
            Operation::Prealloc => "prealloc",
        }
    }

    /// Two-letter alias used in compact reports
    pub fn short_name(self) -> &'static str {
        match self {
            Operation::Ops => "ops",
            Operation::Create => "cr",
            Operation::Open => "op",
            Operation::Close => "cl",
            Operation::Mknod => "mn",
            Operation::Link => "ln",
            Operation::Unlink => "ul",
            Operation::Mkdir => "mk",
            Operation::Rmdir => "rm",
            Operation::Rename => "mv",
            Operation::Getattr => "ga",
            Operation::Setattr => "sa",
            Operation::Getxattr => "gx",
            Operation::Setxattr => "sx",
            Operation::Statfs => "st",
            Operation::Sync => "sy",
            Operation::Read => "rd",
            Operation::Write => "wr",
            Operation::Punch => "pu",
            Operation::Migrate => "mi",
            Operation::Fallocate => "fa",
            Operation::Destroy => "dt",
            Operation::GetInfo => "gi",
            Operation::SetInfo => "si",
            Operation::Quotactl => "qc",
            Operation::Prealloc => "pa",
        }
    }

    /// Display name for reports
    pub fn display_name(self, fullname: bool) -> &'static str {
        if fullname {
            self.long_name()
        } else {
            self.short_name()
        }
    }

    /// Look up an operation read from a dump
    ///
    /// Returns `None` for unknown names and for `ops`, which is always derived
    /// and never accepted from input.
    pub fn from_metric_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .filter(|op| !op.is_synthetic())
            .find(|op| op.long_name() == name)
    }

    /// Whether this is the derived `ops` column
    #[inline]
    pub fn is_synthetic(self) -> bool {
        self == Operation::Ops
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.long_name())
    }
}
