//! Rendering a song into its organized relative path.

use super::template::{Conversion, OrgField, OrgPath, Segment};
use crate::model::{Song, TagKey};
use crate::reference::ReferenceData;

/// Field values after the organization business rules are applied.
struct Resolved<'a> {
    song: &'a Song,
    bypass: Option<&'a str>,
    artist: &'a str,
    album_artist: &'a str,
    composer: &'a str,
    conductor: &'a str,
}

impl<'a> Resolved<'a> {
    fn new(org: &OrgPath, song: &'a Song, bypass: Option<&'a str>, refs: &ReferenceData) -> Self {
        let mut artist = song.get(TagKey::Artist).unwrap_or_default();
        let album_artist = song.get(TagKey::AlbumArtist).unwrap_or(artist);
        if org.has_album_artist() && !album_artist.is_empty() && artist == album_artist {
            artist = "";
        }

        let classical = song
            .get(TagKey::Genre)
            .is_some_and(|g| refs.is_classical(g));
        let (mut composer, conductor) = if classical {
            (
                song.get(TagKey::Composer).unwrap_or_default(),
                song.get(TagKey::Conductor).unwrap_or_default(),
            )
        } else {
            ("", "")
        };
        let raw_artist = song.get(TagKey::Artist).unwrap_or_default();
        if !composer.is_empty() && (composer == album_artist || composer == raw_artist) {
            composer = "";
        }

        Self {
            song,
            bypass,
            artist,
            album_artist,
            composer,
            conductor,
        }
    }

    fn positive(&self, key: TagKey) -> Option<i64> {
        Some(self.song.number(key)).filter(|n| *n > 0)
    }

    /// Unsanitized value for a placeholder, empty when it renders nothing.
    fn value(&self, field: OrgField) -> String {
        let text = match field {
            OrgField::TrackNumber | OrgField::TrackNumber0 | OrgField::Bpm => {
                let key = field.tag_key().unwrap_or(TagKey::TrackNumber);
                return self
                    .positive(key)
                    .map(|n| render_number(field.conversion(), n))
                    .unwrap_or_default();
            }
            OrgField::Disc => {
                if self.song.number(TagKey::DiscTotal) <= 1 {
                    return String::new();
                }
                return self
                    .positive(TagKey::DiscNumber)
                    .map(|n| n.to_string())
                    .unwrap_or_default();
            }
            OrgField::Bypass => self.bypass.unwrap_or_default(),
            OrgField::Artist => self.artist,
            OrgField::AlbumArtist => self.album_artist,
            OrgField::Composer => self.composer,
            OrgField::Conductor => self.conductor,
            other => other
                .tag_key()
                .and_then(|k| self.song.get(k))
                .unwrap_or_default(),
        };
        text.to_string()
    }
}

fn render_number(conversion: Conversion, n: i64) -> String {
    match conversion {
        Conversion::ZeroPadded => format!("{n:02}"),
        _ => n.to_string(),
    }
}

impl OrgPath {
    /// Generate the organized path for `song`, relative to the music directory.
    ///
    /// A group is only emitted when at least one of its placeholders renders a
    /// value; groups without placeholders are always emitted. The original
    /// file extension is appended unchanged.
    pub fn generate(&self, song: &Song, bypass: Option<&str>, refs: &ReferenceData) -> String {
        let resolved = Resolved::new(self, song, bypass, refs);
        let mut path = String::new();

        for group in &self.groups {
            let mut buffer = String::new();
            let mut has_placeholder = false;
            let mut valid = false;

            for segment in &group.segments {
                match segment {
                    Segment::Literal(text) => buffer.push_str(text),
                    Segment::Placeholder(p) => {
                        has_placeholder = true;
                        let raw = resolved.value(p.field);
                        let value = match p.field.conversion() {
                            Conversion::Text => self.sanitizer.sanitize(&raw),
                            _ => raw,
                        };
                        if !value.is_empty() {
                            valid = true;
                        }
                        buffer.push_str(&value);
                    }
                }
            }

            if valid || !has_placeholder {
                path.push_str(&buffer);
            }
        }

        if let Some(ext) = song.extension() {
            path.push('.');
            path.push_str(ext);
        }
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::organizer::sanitize::{Platform, Sanitizer};

    fn org(template: &str) -> OrgPath {
        OrgPath::compile_with(template, Sanitizer::new(Platform::Linux)).unwrap()
    }

    fn song(uri: &str, fields: &[(TagKey, &str)]) -> Song {
        let mut song = Song::new(uri);
        for (k, v) in fields {
            song.set(*k, *v);
        }
        song
    }

    #[test]
    fn test_generates_basic_path_with_source_extension() {
        let s = song(
            "incoming/x.mp3",
            &[
                (TagKey::Artist, "Santana"),
                (TagKey::Album, "Supernatural"),
                (TagKey::TrackNumber, "3"),
                (TagKey::Title, "Smooth"),
            ],
        );
        let path = org("%ARTIST%/%ALBUM%/%TRACKNUMBER% %TITLE%").generate(
            &s,
            None,
            &ReferenceData::default(),
        );
        assert_eq!(path, "Santana/Supernatural/3 Smooth.mp3");
    }

    #[test]
    fn test_empty_groups_are_suppressed() {
        let s = song("a.flac", &[(TagKey::Album, "Album"), (TagKey::Title, "Song")]);
        let path = org("{%DANCE%/}{%ALBUM%/}{%TRACKNUMBER0% - }{%TITLE%}").generate(
            &s,
            None,
            &ReferenceData::default(),
        );
        assert_eq!(path, "Album/Song.flac");
    }

    #[test]
    fn test_zero_padded_track_and_disc_rules() {
        let org = org("{%DISC%-}{%TRACKNUMBER0% }{%TITLE%}");
        let refs = ReferenceData::default();

        let single = song(
            "a.mp3",
            &[
                (TagKey::DiscNumber, "1"),
                (TagKey::DiscTotal, "1"),
                (TagKey::TrackNumber, "7"),
                (TagKey::Title, "T"),
            ],
        );
        assert_eq!(org.generate(&single, None, &refs), "07 T.mp3");

        let multi = song(
            "a.mp3",
            &[
                (TagKey::DiscNumber, "2"),
                (TagKey::DiscTotal, "3"),
                (TagKey::TrackNumber, "0"),
                (TagKey::Title, "T"),
            ],
        );
        assert_eq!(org.generate(&multi, None, &refs), "2-T.mp3");
    }

    #[test]
    fn test_album_artist_falls_back_to_artist_and_dedupes() {
        let org = org("{%ALBUMARTIST%/}{%ARTIST% - }{%TITLE%}");
        let refs = ReferenceData::default();

        let only_artist = song("a.mp3", &[(TagKey::Artist, "Queen"), (TagKey::Title, "Bicycle")]);
        assert_eq!(org.generate(&only_artist, None, &refs), "Queen/Bicycle.mp3");

        let both = song(
            "a.mp3",
            &[
                (TagKey::AlbumArtist, "Various"),
                (TagKey::Artist, "Queen"),
                (TagKey::Title, "Bicycle"),
            ],
        );
        assert_eq!(org.generate(&both, None, &refs), "Various/Queen - Bicycle.mp3");
    }

    #[test]
    fn test_artist_kept_when_template_has_no_album_artist() {
        let org = org("{%ARTIST%/}{%TITLE%}");
        let s = song(
            "a.mp3",
            &[
                (TagKey::AlbumArtist, "Queen"),
                (TagKey::Artist, "Queen"),
                (TagKey::Title, "Bicycle"),
            ],
        );
        assert_eq!(
            org.generate(&s, None, &ReferenceData::default()),
            "Queen/Bicycle.mp3"
        );
    }

    #[test]
    fn test_composer_only_for_classical_genres() {
        let org = org("{%COMPOSER%/}{%CONDUCTOR%/}{%TITLE%}");
        let refs = ReferenceData::default();
        let mut s = song(
            "a.ogg",
            &[
                (TagKey::Composer, "Mozart"),
                (TagKey::Conductor, "Karajan"),
                (TagKey::Title, "Requiem"),
                (TagKey::Genre, "Rock"),
            ],
        );
        assert_eq!(org.generate(&s, None, &refs), "Requiem.ogg");

        s.set(TagKey::Genre, "Classical");
        assert_eq!(org.generate(&s, None, &refs), "Mozart/Karajan/Requiem.ogg");
    }

    #[test]
    fn test_composer_cleared_when_equal_to_artist() {
        let org = org("{%ALBUMARTIST%/}{%COMPOSER%/}{%TITLE%}");
        let s = song(
            "a.mp3",
            &[
                (TagKey::Artist, "Bach"),
                (TagKey::Composer, "Bach"),
                (TagKey::Genre, "Classical"),
                (TagKey::Title, "Toccata"),
            ],
        );
        assert_eq!(
            org.generate(&s, None, &ReferenceData::default()),
            "Bach/Toccata.mp3"
        );
    }

    #[test]
    fn test_bypass_is_inserted_verbatim() {
        let org = org("{%BYPASS%/}{%TITLE%}");
        let s = song("a.mp3", &[(TagKey::Title, "Song")]);
        let refs = ReferenceData::default();
        assert_eq!(org.generate(&s, Some("My: Stuff"), &refs), "My: Stuff/Song.mp3");
        assert_eq!(org.generate(&s, None, &refs), "Song.mp3");
    }

    #[test]
    fn test_text_fields_are_sanitized_literals_are_not() {
        let org = org("{%ARTIST%/}{%TITLE%}");
        let s = song("a.mp3", &[(TagKey::Artist, "AC/DC"), (TagKey::Title, "What?")]);
        assert_eq!(
            org.generate(&s, None, &ReferenceData::default()),
            "ACDC/What?.mp3"
        );
    }
}
