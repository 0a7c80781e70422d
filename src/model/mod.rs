//! Core data models for the song database.
//!
//! Defines [`Song`], the record stored per audio file, and [`TagKey`], the
//! closed set of metadata fields the library tracks. Tag values are kept as
//! strings in a [`TagMap`] so tag reader output, path-derived values and
//! iTunes imports can be merged field by field.
//!
//! # Database Schema
//!
//! Songs map to the `songs` table; the tag map is stored as a JSON column.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Metadata fields known to the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagKey {
    Album,
    AlbumArtist,
    Artist,
    Bpm,
    Composer,
    Conductor,
    Dance,
    DanceLevel,
    DanceRating,
    DiscNumber,
    DiscTotal,
    /// Duration in milliseconds. Its absence marks a file with no usable tags.
    Duration,
    Genre,
    Status,
    Title,
    TrackNumber,
    TrackTotal,
}

impl TagKey {
    pub const ALL: [TagKey; 17] = [
        TagKey::Album,
        TagKey::AlbumArtist,
        TagKey::Artist,
        TagKey::Bpm,
        TagKey::Composer,
        TagKey::Conductor,
        TagKey::Dance,
        TagKey::DanceLevel,
        TagKey::DanceRating,
        TagKey::DiscNumber,
        TagKey::DiscTotal,
        TagKey::Duration,
        TagKey::Genre,
        TagKey::Status,
        TagKey::Title,
        TagKey::TrackNumber,
        TagKey::TrackTotal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TagKey::Album => "album",
            TagKey::AlbumArtist => "album_artist",
            TagKey::Artist => "artist",
            TagKey::Bpm => "bpm",
            TagKey::Composer => "composer",
            TagKey::Conductor => "conductor",
            TagKey::Dance => "dance",
            TagKey::DanceLevel => "dance_level",
            TagKey::DanceRating => "dance_rating",
            TagKey::DiscNumber => "disc_number",
            TagKey::DiscTotal => "disc_total",
            TagKey::Duration => "duration",
            TagKey::Genre => "genre",
            TagKey::Status => "status",
            TagKey::Title => "title",
            TagKey::TrackNumber => "track_number",
            TagKey::TrackTotal => "track_total",
        }
    }

    /// Whether values of this field are integers.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            TagKey::Bpm
                | TagKey::DiscNumber
                | TagKey::DiscTotal
                | TagKey::Duration
                | TagKey::TrackNumber
                | TagKey::TrackTotal
        )
    }
}

impl fmt::Display for TagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TagKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TagKey::ALL
            .iter()
            .find(|k| k.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown tag key: {s}"))
    }
}

/// Field values keyed by [`TagKey`].
pub type TagMap = BTreeMap<TagKey, String>;

/// A song record (one audio file) in the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Song {
    /// Database row id; `None` until first written.
    pub id: Option<i64>,
    /// Stored location: path relative to the music directory, or an absolute
    /// path for files outside it. Always uses `/` separators.
    pub uri: String,
    pub tags: TagMap,
    /// RFC 3339 timestamp of when the song first entered the database.
    pub date_added: String,
    /// Length of a leading filename prefix that is not part of the title.
    pub prefix_len: i64,
    /// Never move this file during automatic organization.
    pub prevent_rename: bool,
}

impl Song {
    /// Create an unsaved song at `uri`, added now.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            id: None,
            uri: uri.into(),
            tags: TagMap::new(),
            date_added: chrono::Utc::now().to_rfc3339(),
            prefix_len: 0,
            prevent_rename: false,
        }
    }

    /// Non-empty value of a field.
    pub fn get(&self, key: TagKey) -> Option<&str> {
        self.tags
            .get(&key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Field value as an integer, `0` when absent or unparsable.
    pub fn number(&self, key: TagKey) -> i64 {
        self.get(key)
            .and_then(|v| leading_number(v))
            .unwrap_or(0)
    }

    pub fn set(&mut self, key: TagKey, value: impl Into<String>) {
        self.tags.insert(key, value.into());
    }

    /// File extension of the stored location, without the dot.
    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.uri).extension().and_then(|e| e.to_str())
    }
}

/// Parse the leading integer of values such as `"3"` or `"3/12"`.
fn leading_number(value: &str) -> Option<i64> {
    let digits: String = value
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
