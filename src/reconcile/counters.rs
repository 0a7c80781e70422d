//! Per-run counters.

use std::fmt;

/// A counted outcome category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    Found,
    Skipped,
    SkipNonAudio,
    SkipOrigBackup,
    SkipDeleted,
    SkipLegacyDir,
    AlreadyInDb,
    Missing,
    BadFilename,
    NoTags,
    Queued,
    Processed,
    New,
    Updated,
    Renamed,
    RenameFailed,
    WrittenTags,
    Bad,
    QueueHighWater,
}

impl Counter {
    pub const ALL: [Counter; 19] = [
        Counter::Found,
        Counter::Skipped,
        Counter::SkipNonAudio,
        Counter::SkipOrigBackup,
        Counter::SkipDeleted,
        Counter::SkipLegacyDir,
        Counter::AlreadyInDb,
        Counter::Missing,
        Counter::BadFilename,
        Counter::NoTags,
        Counter::Queued,
        Counter::Processed,
        Counter::New,
        Counter::Updated,
        Counter::Renamed,
        Counter::RenameFailed,
        Counter::WrittenTags,
        Counter::Bad,
        Counter::QueueHighWater,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Counter::Found => "found",
            Counter::Skipped => "skipped",
            Counter::SkipNonAudio => "skip_non_audio",
            Counter::SkipOrigBackup => "skip_orig_backup",
            Counter::SkipDeleted => "skip_deleted",
            Counter::SkipLegacyDir => "skip_legacy_dir",
            Counter::AlreadyInDb => "already_in_db",
            Counter::Missing => "missing",
            Counter::BadFilename => "bad_filename",
            Counter::NoTags => "no_tags",
            Counter::Queued => "queued",
            Counter::Processed => "processed",
            Counter::New => "new",
            Counter::Updated => "updated",
            Counter::Renamed => "renamed",
            Counter::RenameFailed => "rename_failed",
            Counter::WrittenTags => "written_tags",
            Counter::Bad => "bad",
            Counter::QueueHighWater => "queue_high_water",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counts for every [`Counter`], all zero at the start of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counters {
    values: [u64; Counter::ALL.len()],
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.values[counter.index()]
    }

    pub fn incr(&mut self, counter: Counter) {
        self.values[counter.index()] += 1;
    }

    /// Count a skip under its specific reason and the skipped total.
    pub fn skip(&mut self, reason: Counter) {
        self.incr(reason);
        self.incr(Counter::Skipped);
    }

    /// Raise `counter` to `value` if it is lower.
    pub fn record_max(&mut self, counter: Counter, value: u64) {
        let slot = &mut self.values[counter.index()];
        *slot = (*slot).max(value);
    }

    /// Candidates whose outcome is settled.
    pub fn settled(&self) -> u64 {
        self.get(Counter::Processed) + self.get(Counter::Skipped)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Counter, u64)> + '_ {
        Counter::ALL.into_iter().map(|c| (c, self.get(c)))
    }

    /// One `name: value` line per counter.
    pub fn summary(&self) -> Vec<String> {
        self.iter().map(|(c, v)| format!("{c}: {v}")).collect()
    }
}
