//! Reconciliation modes.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::scanner::DbOrder;

/// What a reconciliation run does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Re-read every file into a brand-new database.
    Rebuild,
    /// Add files that are not in the database yet.
    CheckNew,
    /// Copy the database into a new one, dropping duplicate and missing
    /// records. With `check_new`, files on disk drive the run and new ones
    /// are added too.
    Compact { check_new: bool },
    /// Re-read the tags of every file in the database.
    UpdateFromTags,
    /// Copy imported iTunes fields into the database.
    UpdateFromItunes,
    /// Write database tags back into the files.
    WriteTags,
    /// Move every file to its organized location.
    Reorganize,
}

/// Where a run's candidates come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Filesystem,
    Database(DbOrder),
}

impl Mode {
    /// Destructive runs write a new database that replaces the old one.
    pub fn is_destructive(&self) -> bool {
        matches!(self, Mode::Rebuild | Mode::Compact { .. })
    }

    pub fn source(&self) -> Source {
        match self {
            Mode::Rebuild | Mode::CheckNew | Mode::Compact { check_new: true } => {
                Source::Filesystem
            }
            Mode::Compact { check_new: false } => Source::Database(DbOrder::Location),
            Mode::UpdateFromTags | Mode::UpdateFromItunes | Mode::WriteTags | Mode::Reorganize => {
                Source::Database(DbOrder::Id)
            }
        }
    }

    /// Whether new files may be moved into place when auto-organize is on.
    pub fn allows_autorename(&self) -> bool {
        matches!(self, Mode::Rebuild | Mode::CheckNew)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mode::Rebuild => "rebuild",
            Mode::CheckNew => "check-new",
            Mode::Compact { check_new: false } => "compact",
            Mode::Compact { check_new: true } => "compact+check-new",
            Mode::UpdateFromTags => "update-tags",
            Mode::UpdateFromItunes => "update-itunes",
            Mode::WriteTags => "write-tags",
            Mode::Reorganize => "reorganize",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "rebuild" => Mode::Rebuild,
            "check-new" => Mode::CheckNew,
            "compact" => Mode::Compact { check_new: false },
            "compact+check-new" => Mode::Compact { check_new: true },
            "update-tags" => Mode::UpdateFromTags,
            "update-itunes" => Mode::UpdateFromItunes,
            "write-tags" => Mode::WriteTags,
            "reorganize" => Mode::Reorganize,
            other => return Err(Error::config(format!("unknown mode: {other}"))),
        })
    }
}
