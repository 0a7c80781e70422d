//! Audio file tag reading and writing.
//!
//! Reconciliation only sees tags as a [`TagMap`]; the codec behind it is a
//! collaborator behind the [`TagReader`] and [`TagWriter`] traits.
//! [`LoftyTags`] implements both with the lofty crate, supporting MP3, FLAC,
//! OGG, M4A and WAV.
//!
//! Dance-specific fields have no standard tag item and are stored as custom
//! items (`DANCE`, `DANCELEVEL`, `DANCERATING`, `STATUS`).

use std::path::Path;

use bitflags::bitflags;
use lofty::config::WriteOptions;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::{ItemKey, Tag, TagExt};

use crate::error::{Error, Result};
use crate::model::{TagKey, TagMap};

/// Tags read from a file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTags {
    pub tags: TagMap,
    /// The file's tags are in a legacy or secondary format and should be
    /// rewritten in the primary format.
    pub needs_rewrite: bool,
}

impl ParsedTags {
    /// A parse that found no audio stream (no duration).
    pub fn is_empty(&self) -> bool {
        !self.tags.contains_key(&TagKey::Duration)
    }
}

bitflags! {
    /// Options for [`TagWriter::write_tags`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WriteFlags: u8 {
        /// Write every desired field, even ones that already match.
        const FULL_REWRITE = 1 << 0;
    }
}

/// Reads a file's tags.
pub trait TagReader: Send + Sync {
    fn parse_tags(&self, path: &Path) -> Result<ParsedTags>;
}

/// Writes a file's tags.
pub trait TagWriter: Send + Sync {
    /// Make the file's tags match `desired`, given the tags it currently has.
    /// Returns the number of fields written.
    fn write_tags(
        &self,
        path: &Path,
        desired: &TagMap,
        existing: &TagMap,
        flags: WriteFlags,
    ) -> Result<usize>;
}

/// Fields in `desired` whose value differs from `existing`.
pub fn changed_fields<'a>(desired: &'a TagMap, existing: &'a TagMap) -> Vec<TagKey> {
    desired
        .iter()
        .filter(|(key, value)| **key != TagKey::Duration && existing.get(key) != Some(*value))
        .map(|(key, _)| *key)
        .collect()
}

/// Tag access through lofty.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyTags;

fn item_key(key: TagKey) -> Option<ItemKey> {
    Some(match key {
        TagKey::Album => ItemKey::AlbumTitle,
        TagKey::AlbumArtist => ItemKey::AlbumArtist,
        TagKey::Artist => ItemKey::TrackArtist,
        TagKey::Bpm => ItemKey::Bpm,
        TagKey::Composer => ItemKey::Composer,
        TagKey::Conductor => ItemKey::Conductor,
        TagKey::Dance => ItemKey::Unknown("DANCE".to_string()),
        TagKey::DanceLevel => ItemKey::Unknown("DANCELEVEL".to_string()),
        TagKey::DanceRating => ItemKey::Unknown("DANCERATING".to_string()),
        TagKey::DiscNumber => ItemKey::DiscNumber,
        TagKey::DiscTotal => ItemKey::DiscTotal,
        TagKey::Duration => return None,
        TagKey::Genre => ItemKey::Genre,
        TagKey::Status => ItemKey::Unknown("STATUS".to_string()),
        TagKey::Title => ItemKey::TrackTitle,
        TagKey::TrackNumber => ItemKey::TrackNumber,
        TagKey::TrackTotal => ItemKey::TrackTotal,
    })
}

fn read_tag(tag: &Tag, tags: &mut TagMap) {
    for key in TagKey::ALL {
        let Some(item) = item_key(key) else { continue };
        let value = tag.get_string(&item).or_else(|| match key {
            TagKey::Bpm => tag.get_string(&ItemKey::IntegerBpm),
            _ => None,
        });
        if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
            tags.insert(key, value.to_string());
        }
    }
}

impl TagReader for LoftyTags {
    fn parse_tags(&self, path: &Path) -> Result<ParsedTags> {
        let tagged_file = Probe::open(path)
            .map_err(|e| Error::metadata(path, format!("Failed to open file for probing: {e}")))?
            .read()
            .map_err(|e| Error::metadata(path, format!("Failed to read file metadata: {e}")))?;

        let primary = tagged_file.primary_tag();
        let tag = primary.or_else(|| tagged_file.first_tag());

        let mut tags = TagMap::new();
        if let Some(tag) = tag {
            read_tag(tag, &mut tags);
        }

        let duration = tagged_file.properties().duration().as_millis();
        if duration > 0 {
            tags.insert(TagKey::Duration, duration.to_string());
        }

        Ok(ParsedTags {
            tags,
            needs_rewrite: primary.is_none() && tag.is_some(),
        })
    }
}

impl TagWriter for LoftyTags {
    fn write_tags(
        &self,
        path: &Path,
        desired: &TagMap,
        existing: &TagMap,
        flags: WriteFlags,
    ) -> Result<usize> {
        let mut tagged_file = Probe::open(path)
            .map_err(|e| Error::metadata(path, format!("Failed to open file for writing: {e}")))?
            .read()
            .map_err(|e| Error::metadata(path, format!("Failed to read file for tag writing: {e}")))?;

        let tag_type = tagged_file.primary_tag_type();
        if tagged_file.tag(tag_type).is_none() {
            tagged_file.insert_tag(Tag::new(tag_type));
        }
        let Some(tag) = tagged_file.tag_mut(tag_type) else {
            return Err(Error::metadata(path, "No writable tag"));
        };

        let keys = if flags.contains(WriteFlags::FULL_REWRITE) {
            desired.keys().copied().collect()
        } else {
            changed_fields(desired, existing)
        };

        let mut written = 0;
        for key in keys {
            let (Some(item), Some(value)) = (item_key(key), desired.get(&key)) else {
                continue;
            };
            if value.is_empty() {
                tag.remove_key(&item);
            } else {
                tag.insert_text(item, value.clone());
            }
            written += 1;
        }

        if written > 0 {
            tag.save_to_path(path, WriteOptions::default())
                .map_err(|e| Error::metadata(path, format!("Failed to write tags to file: {e}")))?;
            tracing::debug!(target: "metadata", path = %path.display(), written, "Wrote tags");
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_non_audio_file_returns_error() {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        writeln!(file, "This is just some text, not music.").expect("Failed to write to temp file");

        let result = LoftyTags.parse_tags(file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_read_non_existent_file_returns_error() {
        let result = LoftyTags.parse_tags(Path::new("non_existent_file.mp3"));
        assert!(result.is_err());
    }

    #[test]
    fn test_parsed_tags_without_duration_are_empty() {
        let mut parsed = ParsedTags::default();
        parsed.tags.insert(TagKey::Title, "Only a title".to_string());
        assert!(parsed.is_empty());
        parsed.tags.insert(TagKey::Duration, "1000".to_string());
        assert!(!parsed.is_empty());
    }

    #[test]
    fn test_changed_fields_ignores_duration_and_equal_values() {
        let mut desired = TagMap::new();
        desired.insert(TagKey::Title, "New".to_string());
        desired.insert(TagKey::Artist, "Same".to_string());
        desired.insert(TagKey::Duration, "5".to_string());
        let mut existing = TagMap::new();
        existing.insert(TagKey::Title, "Old".to_string());
        existing.insert(TagKey::Artist, "Same".to_string());

        assert_eq!(changed_fields(&desired, &existing), vec![TagKey::Title]);
    }

    #[test]
    fn test_every_key_but_duration_maps_to_a_tag_item() {
        for key in TagKey::ALL {
            assert_eq!(item_key(key).is_none(), key == TagKey::Duration);
        }
    }

    #[test]
    fn test_write_flags_default_is_empty() {
        let flags = WriteFlags::default();
        assert!(!flags.contains(WriteFlags::FULL_REWRITE));
        assert!(WriteFlags::all().contains(WriteFlags::FULL_REWRITE));
    }
}
