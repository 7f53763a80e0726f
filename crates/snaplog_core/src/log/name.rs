//! File naming: `<unix-nanos>.<kind>`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// What a file in the log directory holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogKind {
    /// Compacted base state.
    Snap,
    /// Append segment, active or closed.
    Log,
    /// Snapshot under construction; never replayed.
    Unfinished,
}

impl LogKind {
    /// File extension for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Snap => "snap",
            Self::Log => "log",
            Self::Unfinished => "unfinished",
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "snap" => Ok(Self::Snap),
            "log" => Ok(Self::Log),
            "unfinished" => Ok(Self::Unfinished),
            _ => Err(()),
        }
    }
}

/// Name of a log, snapshot or unfinished snapshot file.
///
/// Ordered by timestamp first, so sorting a directory listing yields
/// replay order.
///
/// # Example
///
/// ```rust
/// use snaplog_core::{LogFileName, LogKind};
///
/// let name: LogFileName = "1700000000000000000.snap".parse().unwrap();
/// assert_eq!(name.kind, LogKind::Snap);
/// assert_eq!(name.to_string(), "1700000000000000000.snap");
/// assert!("notes.txt".parse::<LogFileName>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogFileName {
    /// Unix timestamp in nanoseconds.
    pub timestamp: u64,
    /// File kind.
    pub kind: LogKind,
}

impl LogFileName {
    /// Creates a name.
    #[must_use]
    pub const fn new(timestamp: u64, kind: LogKind) -> Self {
        Self { timestamp, kind }
    }

    /// Same timestamp, different kind.
    #[must_use]
    pub const fn with_kind(self, kind: LogKind) -> Self {
        Self {
            timestamp: self.timestamp,
            kind,
        }
    }

    /// Full path of this file inside `dir`.
    #[must_use]
    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(self.to_string())
    }
}

impl fmt::Display for LogFileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.timestamp, self.kind)
    }
}

impl FromStr for LogFileName {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (stamp, kind) = s.split_once('.').ok_or(())?;
        if stamp.is_empty() || !stamp.bytes().all(|b| b.is_ascii_digit()) {
            return Err(());
        }
        // Only the canonical form maps back to the same path.
        if stamp.len() > 1 && stamp.starts_with('0') {
            return Err(());
        }
        let timestamp = stamp.parse().map_err(|_| ())?;
        Ok(Self {
            timestamp,
            kind: kind.parse()?,
        })
    }
}
