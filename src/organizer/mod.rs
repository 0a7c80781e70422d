//! File organization.
//!
//! Songs are organized into a directory hierarchy described by an
//! organization template such as
//! `{%DANCE%/}{%ALBUMARTIST%/}{%ALBUM%/}{%TRACKNUMBER0% - }{%TITLE%}`.
//!
//! # Features
//! - Template compilation into groups and a matching regex ([`OrgPath`])
//! - Path generation from song metadata ([`OrgPath::generate`])
//! - Field extraction from existing paths ([`OrgPath::extract`])
//! - Filename sanitizing per platform ([`Sanitizer`])
//! - Moving files into place with cleanup of emptied directories

mod generate;
mod parse;
pub mod sanitize;
mod template;

pub use parse::MatchCache;
pub use sanitize::{Platform, Sanitizer, sanitize};
pub use template::{Conversion, Group, OrgField, OrgPath, Placeholder, Segment};

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result, ResultExt};
use crate::model::Song;
use crate::reference::ReferenceData;

/// Preview result for dry-run
#[derive(Debug, Clone)]
pub struct OrganizePreview {
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Destination relative to the music directory, `/`-separated.
    pub relative: String,
}

impl OrganizePreview {
    /// Whether organizing would move the file.
    pub fn moves(&self) -> bool {
        self.source != self.destination
    }
}

/// Generates a preview of where `song` would be organized to (dry-run).
pub fn preview_organize(
    source_path: &Path,
    song: &Song,
    org: &OrgPath,
    bypass: Option<&str>,
    refs: &ReferenceData,
    music_dir: &Path,
) -> OrganizePreview {
    let relative = org.generate(song, bypass, refs);
    OrganizePreview {
        source: source_path.to_path_buf(),
        destination: music_dir.join(&relative),
        relative,
    }
}

/// Moves `source` to `relative` under `music_dir`.
///
/// Never overwrites: an existing destination is an error. Directories left
/// empty by the move are removed, up to but not including `music_dir`.
pub fn organize_file(source: &Path, music_dir: &Path, relative: &str) -> Result<PathBuf> {
    if relative.is_empty() {
        return Err(Error::organization(format!(
            "empty destination for {}",
            source.display()
        )));
    }
    let dest_path = music_dir.join(relative);
    if dest_path == source {
        return Ok(dest_path);
    }
    if dest_path.exists() {
        return Err(Error::organization(format!(
            "destination already exists: {}",
            dest_path.display()
        )));
    }

    if let Some(parent) = dest_path.parent() {
        fs::create_dir_all(parent)
            .with_context(format!("Failed to create directory: {}", parent.display()))?;
    }

    if let Err(e) = fs::rename(source, &dest_path) {
        // Cross-device moves fall back to copy + delete
        tracing::debug!(target: "organizer", error = %e, "rename failed, copying instead");
        fs::copy(source, &dest_path)
            .with_context(format!("Failed to copy file to: {}", dest_path.display()))?;
        fs::remove_file(source)
            .with_context(format!("Failed to remove source file: {}", source.display()))?;
    }

    if let Some(parent) = source.parent() {
        let _ = remove_empty_dirs(parent, music_dir);
    }

    Ok(dest_path)
}

/// Recursively removes empty directories up the tree, stopping at `root`.
fn remove_empty_dirs(path: &Path, root: &Path) -> std::io::Result<()> {
    if path == root || !path.starts_with(root) {
        return Ok(());
    }
    if path.is_dir() && fs::read_dir(path)?.next().is_none() {
        fs::remove_dir(path)?;
        if let Some(parent) = path.parent() {
            let _ = remove_empty_dirs(parent, root);
        }
    }
    Ok(())
}

/// The `/`-separated form of a relative or absolute path, as stored in the
/// database and matched by templates.
pub fn path_to_uri(path: &Path) -> String {
    let text = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '\\' {
        text.replace('\\', "/")
    } else {
        text.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TagKey;
    use tempfile::tempdir;

    fn song(title: &str) -> Song {
        let mut song = Song::new("incoming/test.mp3");
        song.set(TagKey::Artist, "Artist");
        song.set(TagKey::Album, "Album");
        song.set(TagKey::Title, title);
        song.set(TagKey::TrackNumber, "1");
        song
    }

    #[test]
    fn test_preview_organize_generates_correct_path() {
        let org = OrgPath::compile_with(
            "{%ARTIST%/}{%ALBUM%/}{%TRACKNUMBER0% - }{%TITLE%}",
            Sanitizer::new(Platform::Linux),
        )
        .unwrap();
        let preview = preview_organize(
            Path::new("/music/incoming/test.mp3"),
            &song("Song Title"),
            &org,
            None,
            &ReferenceData::default(),
            Path::new("/music"),
        );

        assert_eq!(preview.relative, "Artist/Album/01 - Song Title.mp3");
        assert_eq!(
            preview.destination,
            PathBuf::from("/music/Artist/Album/01 - Song Title.mp3")
        );
        assert!(preview.moves());
    }

    #[test]
    fn test_organize_file_moves_and_cleans_up() {
        let temp = tempdir().unwrap();
        let music = temp.path();
        let source_dir = music.join("incoming").join("batch");
        fs::create_dir_all(&source_dir).unwrap();
        let source = source_dir.join("test.mp3");
        fs::write(&source, b"fake mp3 content").unwrap();

        let dest = organize_file(&source, music, "Artist/Album/Test.mp3").unwrap();

        assert_eq!(dest, music.join("Artist/Album/Test.mp3"));
        assert_eq!(fs::read_to_string(&dest).unwrap(), "fake mp3 content");
        assert!(!source.exists());
        assert!(!music.join("incoming").exists());
        assert!(music.exists());
    }

    #[test]
    fn test_organize_file_refuses_to_overwrite() {
        let temp = tempdir().unwrap();
        let music = temp.path();
        let source = music.join("a.mp3");
        fs::write(&source, b"a").unwrap();
        fs::create_dir_all(music.join("X")).unwrap();
        fs::write(music.join("X/b.mp3"), b"b").unwrap();

        let result = organize_file(&source, music, "X/b.mp3");

        assert!(result.is_err());
        assert!(source.exists());
        assert_eq!(fs::read_to_string(music.join("X/b.mp3")).unwrap(), "b");
    }

    #[test]
    fn test_organize_file_same_location_is_noop() {
        let temp = tempdir().unwrap();
        let music = temp.path();
        fs::write(music.join("a.mp3"), b"a").unwrap();

        let dest = organize_file(&music.join("a.mp3"), music, "a.mp3").unwrap();
        assert!(dest.exists());
    }

    #[test]
    fn test_organize_file_rejects_empty_destination() {
        let temp = tempdir().unwrap();
        let source = temp.path().join("a.mp3");
        fs::write(&source, b"a").unwrap();
        assert!(organize_file(&source, temp.path(), "").is_err());
    }
}
