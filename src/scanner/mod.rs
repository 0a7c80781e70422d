//! Candidate discovery and classification.
//!
//! A reconciliation run pulls candidates from one of two sources:
//! - [`FsSource`]: every file under a directory, found with `walkdir`
//! - [`DbSource`]: every record already in the song database, paged
//!
//! [`Classifier`] decides which candidates are skipped before any tag is read.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use regex::Regex;
use sqlx::SqliteConnection;
use walkdir::WalkDir;

use crate::config::LibraryConfig;
use crate::db::{self, SongCursor};
use crate::error::{Error, Result};
use crate::model::Song;
use crate::organizer::{Platform, path_to_uri};

/// Why a candidate was skipped without being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NonAudio,
    OriginalBackup,
    MarkedDeleted,
    LegacyDir,
}

/// Skip rules for candidate files.
#[derive(Debug, Clone)]
pub struct Classifier {
    non_audio: Vec<String>,
    backup_suffix: String,
    delete_prefix: String,
    legacy_dirs: Vec<PathBuf>,
    bad_filename: Regex,
}

impl Classifier {
    /// Build the rules for a library rooted at `music_dir`.
    pub fn new(library: &LibraryConfig, music_dir: &Path, platform: Platform) -> Result<Self> {
        // Backslash is a separator on Windows and never reaches a file name there
        let bad_filename = if platform.uses_backslash_separator() {
            Regex::new(r#"["]"#)?
        } else {
            Regex::new(r#"["\\]"#)?
        };

        Ok(Self {
            non_audio: library
                .non_audio_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            backup_suffix: library.backup_suffix.to_lowercase(),
            delete_prefix: library.delete_prefix.clone(),
            legacy_dirs: library.legacy_dirs.iter().map(|d| music_dir.join(d)).collect(),
            bad_filename,
        })
    }

    /// The reason `path` should be skipped, if any. Legacy directories only
    /// apply to candidates found on disk.
    pub fn skip_reason(&self, path: &Path, from_filesystem: bool) -> Option<SkipReason> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        if ext.is_empty() || self.non_audio.contains(&ext) {
            return Some(SkipReason::NonAudio);
        }
        if !self.backup_suffix.is_empty() && ext.ends_with(&self.backup_suffix) {
            return Some(SkipReason::OriginalBackup);
        }
        if !self.delete_prefix.is_empty()
            && path
                .file_name()
                .is_some_and(|n| n.to_string_lossy().starts_with(&self.delete_prefix))
        {
            return Some(SkipReason::MarkedDeleted);
        }
        if from_filesystem && self.legacy_dirs.iter().any(|d| path.starts_with(d)) {
            return Some(SkipReason::LegacyDir);
        }
        None
    }

    /// Whether the file name holds characters that are never accepted.
    pub fn is_bad_filename(&self, path: &Path) -> bool {
        path.file_name()
            .is_some_and(|n| self.bad_filename.is_match(&n.to_string_lossy()))
    }
}

/// A file considered during a run.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub full_path: PathBuf,
    /// Database location key.
    pub key: String,
    /// The stored record, for candidates read from the database.
    pub record: Option<Song>,
}

/// The database key for `path`: relative to `music_dir` when inside it.
pub fn db_key(path: &Path, music_dir: &Path) -> String {
    match path.strip_prefix(music_dir) {
        Ok(relative) => path_to_uri(relative),
        Err(_) => path_to_uri(path),
    }
}

/// Files under a directory, in walk order.
#[derive(Debug, Default)]
pub struct FsSource {
    paths: VecDeque<PathBuf>,
    total: usize,
}

impl FsSource {
    /// Walk `root` recursively. Unreadable entries are logged and left out.
    pub async fn walk(root: PathBuf) -> Result<Self> {
        // Spawn a blocking task to perform the synchronous file system traversal
        let paths = tokio::task::spawn_blocking(move || {
            let mut paths = VecDeque::new();
            for entry in WalkDir::new(&root).sort_by_file_name() {
                match entry {
                    Ok(entry) if entry.file_type().is_file() => {
                        paths.push_back(entry.into_path());
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(target: "reconcile", error = %e, "Unreadable entry"),
                }
            }
            paths
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?;

        Ok(Self::from_paths(paths))
    }

    pub fn from_paths(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        let paths: VecDeque<PathBuf> = paths.into_iter().collect();
        Self {
            total: paths.len(),
            paths,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn next(&mut self, music_dir: &Path) -> Option<Candidate> {
        let full_path = self.paths.pop_front()?;
        Some(Candidate {
            key: db_key(&full_path, music_dir),
            full_path,
            record: None,
        })
    }
}

/// Traversal order of a [`DbSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbOrder {
    /// By location, then id. Duplicate locations come out adjacent.
    Location,
    /// By id. Stable while records are updated in place.
    Id,
}

/// Records of the song database, fetched a page at a time.
#[derive(Debug)]
pub struct DbSource {
    order: DbOrder,
    cursor: SongCursor,
    page: VecDeque<Song>,
    page_size: u32,
    exhausted: bool,
    total: usize,
}

impl DbSource {
    pub async fn open(conn: &mut SqliteConnection, order: DbOrder, page_size: u32) -> Result<Self> {
        let total = db::count_songs(conn).await?;
        Ok(Self {
            order,
            cursor: SongCursor::default(),
            page: VecDeque::new(),
            page_size: page_size.max(1),
            exhausted: false,
            total: usize::try_from(total).unwrap_or_default(),
        })
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub async fn next(
        &mut self,
        conn: &mut SqliteConnection,
        music_dir: &Path,
    ) -> Result<Option<Candidate>> {
        if self.page.is_empty() && !self.exhausted {
            let page = match self.order {
                DbOrder::Location => {
                    db::fetch_songs_page(conn, &self.cursor, self.page_size).await?
                }
                DbOrder::Id => db::fetch_songs_by_id(conn, self.cursor.id, self.page_size).await?,
            };
            if let Some(last) = page.last() {
                self.cursor = SongCursor::after(last);
            }
            self.exhausted = page.len() < self.page_size as usize;
            self.page.extend(page);
        }

        Ok(self.page.pop_front().map(|song| Candidate {
            full_path: resolve(&song.uri, music_dir),
            key: song.uri.clone(),
            record: Some(song),
        }))
    }
}

/// Full path of a stored location.
pub fn resolve(uri: &str, music_dir: &Path) -> PathBuf {
    let path = Path::new(uri);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        music_dir.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{mock_song, temp_db};
    use std::fs::File;
    use tempfile::tempdir;

    fn classifier(platform: Platform) -> Classifier {
        let library = LibraryConfig {
            legacy_dirs: vec!["Old".to_string()],
            ..LibraryConfig::default()
        };
        Classifier::new(&library, Path::new("/music"), platform).unwrap()
    }

    #[test]
    fn test_skip_reasons() {
        let c = classifier(Platform::Linux);
        assert_eq!(
            c.skip_reason(Path::new("/music/A/cover.JPG"), true),
            Some(SkipReason::NonAudio)
        );
        assert_eq!(
            c.skip_reason(Path::new("/music/A/README"), true),
            Some(SkipReason::NonAudio)
        );
        assert_eq!(
            c.skip_reason(Path::new("/music/A/song.mp3.original"), true),
            Some(SkipReason::OriginalBackup)
        );
        assert_eq!(
            c.skip_reason(Path::new("/music/A/delete-song.mp3"), true),
            Some(SkipReason::MarkedDeleted)
        );
        assert_eq!(
            c.skip_reason(Path::new("/music/Old/song.mp3"), true),
            Some(SkipReason::LegacyDir)
        );
        assert_eq!(c.skip_reason(Path::new("/music/Old/song.mp3"), false), None);
        assert_eq!(c.skip_reason(Path::new("/music/A/song.mp3"), true), None);
    }

    #[test]
    fn test_double_quote_is_always_a_bad_filename() {
        for platform in [Platform::Windows, Platform::MacOs, Platform::Linux] {
            assert!(classifier(platform).is_bad_filename(Path::new("/music/say \"hi\".mp3")));
        }
    }

    #[test]
    fn test_backslash_is_bad_only_off_windows() {
        let name = Path::new("back\\slash.mp3");
        assert!(classifier(Platform::Linux).is_bad_filename(name));
        assert!(classifier(Platform::MacOs).is_bad_filename(name));
        assert!(!classifier(Platform::Windows).is_bad_filename(name));
    }

    #[test]
    fn test_db_key_is_relative_inside_music_dir() {
        let music = Path::new("/music");
        assert_eq!(db_key(Path::new("/music/A/b.mp3"), music), "A/b.mp3");
        assert_eq!(db_key(Path::new("/elsewhere/b.mp3"), music), "/elsewhere/b.mp3");
        assert_eq!(resolve("A/b.mp3", music), PathBuf::from("/music/A/b.mp3"));
    }

    #[tokio::test]
    async fn test_walk_finds_files_recursively() {
        let dir = tempdir().unwrap();
        let root = dir.path();

        File::create(root.join("song.mp3")).unwrap();
        File::create(root.join("notes.txt")).unwrap();
        let subdir = root.join("subdir");
        std::fs::create_dir(&subdir).unwrap();
        File::create(subdir.join("track.wav")).unwrap();

        let mut source = FsSource::walk(root.to_path_buf()).await.unwrap();
        assert_eq!(source.total(), 3);

        let mut keys = Vec::new();
        while let Some(candidate) = source.next(root) {
            assert!(candidate.record.is_none());
            keys.push(candidate.key);
        }
        keys.sort();
        assert_eq!(keys, vec!["notes.txt", "song.mp3", "subdir/track.wav"]);
    }

    #[tokio::test]
    async fn test_db_source_pages_through_all_records() {
        let (pool, _dir) = temp_db().await;
        let mut conn = pool.acquire().await.unwrap();
        for uri in ["c.mp3", "a.mp3", "b.mp3", "a.mp3", "d.mp3"] {
            db::insert_song(&mut conn, &mock_song(uri)).await.unwrap();
        }

        let music = Path::new("/music");
        let mut source = DbSource::open(&mut conn, DbOrder::Location, 2).await.unwrap();
        assert_eq!(source.total(), 5);

        let mut keys = Vec::new();
        while let Some(candidate) = source.next(&mut conn, music).await.unwrap() {
            assert!(candidate.record.is_some());
            assert!(candidate.full_path.starts_with(music));
            keys.push(candidate.key);
        }
        assert_eq!(keys, vec!["a.mp3", "a.mp3", "b.mp3", "c.mp3", "d.mp3"]);

        let mut source = DbSource::open(&mut conn, DbOrder::Id, 2).await.unwrap();
        let mut keys = Vec::new();
        while let Some(candidate) = source.next(&mut conn, music).await.unwrap() {
            keys.push(candidate.key);
        }
        assert_eq!(keys, vec!["c.mp3", "a.mp3", "b.mp3", "a.mp3", "d.mp3"]);
    }
}
