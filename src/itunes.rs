//! iTunes field source.
//!
//! Update-from-iTunes runs copy selected fields from an iTunes library into
//! the song database. The library itself is read elsewhere; this module only
//! sees it as a lookup from file name to fields, plus the set of fields the
//! user chose to import.
//!
//! [`ItunesFields`] is backed by a JSON export:
//!
//! ```json
//! {
//!   "import": ["genre", "bpm"],
//!   "tracks": {
//!     "Smooth.mp3": { "genre": "Cha Cha", "bpm": "116" }
//!   }
//! }
//! ```

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result, ResultExt};
use crate::model::{TagKey, TagMap};

/// Lookup of iTunes fields by file name.
pub trait ItunesSource: Send + Sync {
    /// Fields recorded for the file called `name`, if iTunes knows it.
    fn fields_by_filename(&self, name: &str) -> Option<TagMap>;

    /// Whether `key` should be imported.
    fn import_enabled(&self, key: TagKey) -> bool;
}

/// iTunes fields loaded from a JSON export.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ItunesFields {
    import: BTreeSet<TagKey>,
    tracks: HashMap<String, TagMap>,
}

impl ItunesFields {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::config(format!("invalid iTunes export: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(format!("reading iTunes export {}", path.display()))?;
        let fields = Self::from_json(&json)?;
        tracing::info!(
            target: "config",
            path = %path.display(),
            tracks = fields.tracks.len(),
            "Loaded iTunes export"
        );
        Ok(fields)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

impl ItunesSource for ItunesFields {
    fn fields_by_filename(&self, name: &str) -> Option<TagMap> {
        self.tracks.get(name).cloned()
    }

    fn import_enabled(&self, key: TagKey) -> bool {
        self.import.contains(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = r#"{
        "import": ["genre", "bpm"],
        "tracks": {
            "Smooth.mp3": { "genre": "Cha Cha", "bpm": "116", "title": "Smooth" }
        }
    }"#;

    #[test]
    fn test_lookup_by_file_name() {
        let fields = ItunesFields::from_json(EXPORT).unwrap();
        let smooth = fields.fields_by_filename("Smooth.mp3").unwrap();
        assert_eq!(smooth.get(&TagKey::Genre).map(String::as_str), Some("Cha Cha"));
        assert!(fields.fields_by_filename("Other.mp3").is_none());
        assert_eq!(fields.len(), 1);
    }

    #[test]
    fn test_import_flags() {
        let fields = ItunesFields::from_json(EXPORT).unwrap();
        assert!(fields.import_enabled(TagKey::Genre));
        assert!(fields.import_enabled(TagKey::Bpm));
        assert!(!fields.import_enabled(TagKey::Title));
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let err = ItunesFields::from_json("{ not json").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("itunes.json");
        std::fs::write(&path, EXPORT).unwrap();

        let fields = ItunesFields::load(&path).unwrap();
        assert!(!fields.is_empty());
        assert!(ItunesFields::load(&dir.path().join("missing.json")).is_err());
    }
}
