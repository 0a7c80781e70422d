//! Organized-path preview command.

use std::path::{Path, PathBuf};

use crate::config;
use crate::metadata::{LoftyTags, TagReader};
use crate::model::{Song, TagKey};
use crate::organizer::{self, OrgPath, Platform, Sanitizer, path_to_uri};

/// Print where `path` would be organized to.
pub fn cmd_preview(path: &Path, music_dir: Option<&Path>) -> anyhow::Result<()> {
    let config = config::load();
    let music_dir: PathBuf = music_dir
        .map(Path::to_path_buf)
        .or_else(|| config.library.music_dir.clone())
        .or_else(|| path.parent().map(Path::to_path_buf))
        .unwrap_or_default();

    let relative = match path.strip_prefix(&music_dir) {
        Ok(relative) => path_to_uri(relative),
        Err(_) => path_to_uri(Path::new(path.file_name().unwrap_or_default())),
    };

    let sanitizer = Sanitizer::new(Platform::current());
    let mut org = OrgPath::compile_with(&config.library.org_path, sanitizer)?;
    let mut bypass_org = match &config.library.bypass_org_path {
        Some(template) if org.has_bypass() => Some(OrgPath::compile_with(template, sanitizer)?),
        _ => None,
    };

    let mut song = Song::new(relative.clone());
    song.tags = LoftyTags.parse_tags(path)?.tags;
    if song.get(TagKey::Dance).is_none()
        && let Some(dance) = song
            .get(TagKey::Genre)
            .and_then(|genre| config.reference.genre_to_dance(genre))
            .map(str::to_string)
    {
        song.set(TagKey::Dance, dance);
    }

    let bypass = if org.has_bypass() {
        bypass_org.as_mut().unwrap_or(&mut org).extract_bypass(&relative)
    } else {
        None
    };

    let preview = organizer::preview_organize(
        path,
        &song,
        &org,
        bypass.as_deref(),
        &config.reference,
        &music_dir,
    );

    println!("{}", preview.destination.display());
    if !preview.moves() {
        println!("(already organized)");
    }
    Ok(())
}
