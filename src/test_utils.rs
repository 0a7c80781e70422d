//! Test utilities and fixtures for songkeeper tests.
//!
//! This module provides common test helpers, mock factories, and
//! database utilities to reduce boilerplate in tests.
//!
//! # Example
//!
//! ```ignore
//! use songkeeper::test_utils::{temp_db, mock_song};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let (pool, _dir) = temp_db().await;
//!     let song = mock_song("Artist/Album/01 - Title.mp3");
//!     // ... test logic
//! }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use sqlx::sqlite::SqlitePool;
use tempfile::TempDir;

use crate::error::{Error, Result};
use crate::metadata::{ParsedTags, TagReader, TagWriter, WriteFlags, changed_fields};
use crate::model::{Song, TagKey, TagMap};

/// Creates a temporary database for testing.
///
/// The database is created in a temporary directory that is automatically
/// cleaned up when the returned `TempDir` is dropped. Migrations are run
/// automatically.
///
/// # Returns
///
/// A tuple of (connection pool, temp directory handle).
/// Keep the TempDir alive for the duration of your test.
pub async fn temp_db() -> (SqlitePool, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = dir.path().join("test.db");

    let pool = crate::db::init_db(&db_path)
        .await
        .expect("Failed to initialize test database");

    (pool, dir)
}

/// Tags used by [`mock_song`].
pub fn mock_tags() -> TagMap {
    let mut tags = TagMap::new();
    tags.insert(TagKey::Title, "Test Track".to_string());
    tags.insert(TagKey::Artist, "Test Artist".to_string());
    tags.insert(TagKey::Album, "Test Album".to_string());
    tags.insert(TagKey::TrackNumber, "1".to_string());
    tags.insert(TagKey::Duration, "180000".to_string());
    tags
}

/// Creates a mock song stored at `uri` with sensible default tags.
pub fn mock_song(uri: &str) -> Song {
    Song {
        tags: mock_tags(),
        ..Song::new(uri)
    }
}

/// In-memory tag reader/writer keyed by file name.
///
/// Files without registered tags fail to parse. Writes are recorded and
/// applied, so a later parse sees them.
#[derive(Debug, Default)]
pub struct FakeTags {
    files: Mutex<HashMap<String, TagMap>>,
    writes: Mutex<Vec<(PathBuf, TagMap)>>,
}

impl FakeTags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the tags returned for any path whose file name is `name`.
    pub fn insert(&self, name: &str, tags: TagMap) {
        self.files.lock().insert(name.to_string(), tags);
    }

    /// Fields written so far, one entry per `write_tags` call that changed
    /// something.
    pub fn writes(&self) -> Vec<(PathBuf, TagMap)> {
        self.writes.lock().clone()
    }

    fn name(path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl TagReader for FakeTags {
    fn parse_tags(&self, path: &Path) -> Result<ParsedTags> {
        let tags = self
            .files
            .lock()
            .get(&Self::name(path))
            .cloned()
            .ok_or_else(|| Error::metadata(path, "no tags registered"))?;
        Ok(ParsedTags {
            tags,
            needs_rewrite: false,
        })
    }
}

impl TagWriter for FakeTags {
    fn write_tags(
        &self,
        path: &Path,
        desired: &TagMap,
        existing: &TagMap,
        flags: WriteFlags,
    ) -> Result<usize> {
        let keys = if flags.contains(WriteFlags::FULL_REWRITE) {
            desired.keys().copied().collect()
        } else {
            changed_fields(desired, existing)
        };
        if keys.is_empty() {
            return Ok(0);
        }

        let written: TagMap = keys
            .iter()
            .filter_map(|k| desired.get(k).map(|v| (*k, v.clone())))
            .collect();
        self.files
            .lock()
            .entry(Self::name(path))
            .or_default()
            .extend(written.clone());
        self.writes.lock().push((path.to_path_buf(), written));
        Ok(keys.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_temp_db_creates_working_database() {
        let (pool, _dir) = temp_db().await;

        // Should be able to query
        let songs = crate::db::get_all_songs(&pool).await.unwrap();
        assert!(songs.is_empty());
    }

    #[test]
    fn test_mock_song_defaults() {
        let song = mock_song("a/b.mp3");
        assert_eq!(song.uri, "a/b.mp3");
        assert_eq!(song.get(TagKey::Title), Some("Test Track"));
        assert_eq!(song.get(TagKey::Artist), Some("Test Artist"));
        assert_eq!(song.number(TagKey::TrackNumber), 1);
        assert!(song.id.is_none());
    }

    #[test]
    fn test_fake_tags_parse_by_file_name() {
        let fake = FakeTags::new();
        fake.insert("song.mp3", mock_tags());

        let parsed = fake.parse_tags(Path::new("/anywhere/song.mp3")).unwrap();
        assert_eq!(parsed.tags, mock_tags());
        assert!(fake.parse_tags(Path::new("/anywhere/other.mp3")).is_err());
    }

    #[test]
    fn test_fake_tags_records_only_changed_fields() {
        let fake = FakeTags::new();
        fake.insert("song.mp3", mock_tags());

        let mut desired = mock_tags();
        desired.insert(TagKey::Title, "New Title".to_string());
        let written = fake
            .write_tags(Path::new("song.mp3"), &desired, &mock_tags(), WriteFlags::empty())
            .unwrap();

        assert_eq!(written, 1);
        let writes = fake.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].1.get(&TagKey::Title).map(String::as_str), Some("New Title"));

        let parsed = fake.parse_tags(Path::new("song.mp3")).unwrap();
        assert_eq!(parsed.tags.get(&TagKey::Title).map(String::as_str), Some("New Title"));
    }
}
