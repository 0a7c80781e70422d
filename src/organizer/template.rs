//! Organization path templates.
//!
//! A template such as `{%DANCE%/}{%ALBUMARTIST%/}{%ALBUM%/}{%TRACKNUMBER0% - }{%TITLE%}`
//! is compiled once into an [`OrgPath`]: an ordered list of groups, each a
//! sequence of literal and placeholder segments, plus one regular expression
//! with a capture per placeholder for reading fields back out of a path.
//!
//! Syntax:
//! - `{ ... }` delimits a group. Text outside braces forms plain groups.
//! - `%NAME%` is a placeholder. Unknown names, and any stray `%`, stay literal.
//!
//! Optional groups compile to non-capturing `(?:...)?` wrappers, so every
//! placeholder's capture index is fixed at compile time and an absent group
//! never shifts the captures that follow it.

use regex::Regex;

use super::parse::MatchCache;
use super::sanitize::Sanitizer;
use crate::error::Result;
use crate::model::TagKey;

/// Placeholder names recognised in templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrgField {
    Album,
    AlbumArtist,
    Artist,
    Bpm,
    /// Replaced by an externally supplied path fragment.
    Bypass,
    Composer,
    Conductor,
    Dance,
    Disc,
    Genre,
    Rating,
    Status,
    Title,
    TrackNumber,
    /// Track number padded to two digits.
    TrackNumber0,
}

/// How a placeholder's value is rendered into a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    Text,
    Number,
    ZeroPadded,
    Verbatim,
}

impl OrgField {
    const LOOKUP: [(&'static str, OrgField); 15] = [
        ("ALBUM", OrgField::Album),
        ("ALBUMARTIST", OrgField::AlbumArtist),
        ("ARTIST", OrgField::Artist),
        ("BPM", OrgField::Bpm),
        ("BYPASS", OrgField::Bypass),
        ("COMPOSER", OrgField::Composer),
        ("CONDUCTOR", OrgField::Conductor),
        ("DANCE", OrgField::Dance),
        ("DISC", OrgField::Disc),
        ("GENRE", OrgField::Genre),
        ("RATING", OrgField::Rating),
        ("STATUS", OrgField::Status),
        ("TITLE", OrgField::Title),
        ("TRACKNUMBER", OrgField::TrackNumber),
        ("TRACKNUMBER0", OrgField::TrackNumber0),
    ];

    /// Resolve a placeholder name.
    pub fn lookup(name: &str) -> Option<Self> {
        Self::LOOKUP
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, f)| *f)
    }

    pub fn name(&self) -> &'static str {
        Self::LOOKUP
            .iter()
            .find(|(_, f)| f == self)
            .map(|(n, _)| *n)
            .unwrap_or_default()
    }

    /// The song field this placeholder renders. `None` for [`OrgField::Bypass`].
    pub fn tag_key(&self) -> Option<TagKey> {
        Some(match self {
            OrgField::Album => TagKey::Album,
            OrgField::AlbumArtist => TagKey::AlbumArtist,
            OrgField::Artist => TagKey::Artist,
            OrgField::Bpm => TagKey::Bpm,
            OrgField::Bypass => return None,
            OrgField::Composer => TagKey::Composer,
            OrgField::Conductor => TagKey::Conductor,
            OrgField::Dance => TagKey::Dance,
            OrgField::Disc => TagKey::DiscNumber,
            OrgField::Genre => TagKey::Genre,
            OrgField::Rating => TagKey::DanceRating,
            OrgField::Status => TagKey::Status,
            OrgField::Title => TagKey::Title,
            OrgField::TrackNumber | OrgField::TrackNumber0 => TagKey::TrackNumber,
        })
    }

    pub fn conversion(&self) -> Conversion {
        match self {
            OrgField::Bpm | OrgField::Disc | OrgField::TrackNumber => Conversion::Number,
            OrgField::TrackNumber0 => Conversion::ZeroPadded,
            OrgField::Bypass => Conversion::Verbatim,
            _ => Conversion::Text,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self.conversion(),
            Conversion::Number | Conversion::ZeroPadded
        )
    }
}

/// A placeholder bound to its regex capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub field: OrgField,
    /// May be missing from a matching path.
    pub optional: bool,
    /// Capture group index in the compiled regex (1-based).
    pub capture: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Placeholder(Placeholder),
}

/// A unit of the template that is emitted or matched as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub segments: Vec<Segment>,
    /// Written with `{}` delimiters.
    pub braced: bool,
    /// Wrapped as `(?:...)?` in the regex.
    pub optional: bool,
}

impl Group {
    pub fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(p) => Some(p),
            Segment::Literal(_) => None,
        })
    }

    fn has_field(&self, field: OrgField) -> bool {
        self.placeholders().any(|p| p.field == field)
    }
}

/// A compiled organization template.
#[derive(Debug, Clone)]
pub struct OrgPath {
    pub(super) groups: Vec<Group>,
    pub(super) regex: Regex,
    pub(super) sanitizer: Sanitizer,
    pub(super) cache: MatchCache,
    pub(super) has_album_artist: bool,
    pub(super) has_bypass: bool,
}

impl OrgPath {
    /// Compile a template using the host platform's sanitizer.
    pub fn compile(template: &str) -> Result<Self> {
        Self::compile_with(template, Sanitizer::default())
    }

    /// Compile a template; generated components are cleaned with `sanitizer`.
    pub fn compile_with(template: &str, sanitizer: Sanitizer) -> Result<Self> {
        let mut groups = Vec::new();
        let mut capture = 0;
        for (index, (text, braced)) in split_groups(template).into_iter().enumerate() {
            let segments = split_segments(&text);
            let mut group = Group {
                segments,
                braced,
                optional: false,
            };
            group.optional = braced && is_optional_group(&group, index == 0);
            for segment in &mut group.segments {
                if let Segment::Placeholder(p) = segment {
                    capture += 1;
                    p.capture = capture;
                    p.optional = group.optional || p.field.is_numeric();
                }
            }
            groups.push(group);
        }

        let regex = Regex::new(&build_pattern(&groups))?;
        let has = |field| groups.iter().any(|g| g.has_field(field));

        tracing::debug!(target: "organizer", template, pattern = regex.as_str(), "Compiled template");

        Ok(Self {
            has_album_artist: has(OrgField::AlbumArtist),
            has_bypass: has(OrgField::Bypass),
            groups,
            regex,
            sanitizer,
            cache: MatchCache::default(),
        })
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        self.groups.iter().flat_map(Group::placeholders)
    }

    /// Song fields this template can render or extract, in template order.
    pub fn tag_keys(&self) -> Vec<TagKey> {
        let mut keys = Vec::new();
        for key in self.placeholders().filter_map(|p| p.field.tag_key()) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    pub fn has_album_artist(&self) -> bool {
        self.has_album_artist
    }

    /// Whether the template contains `%BYPASS%`.
    pub fn has_bypass(&self) -> bool {
        self.has_bypass
    }
}

/// First-position dance/genre groups and purely numeric groups may be absent.
fn is_optional_group(group: &Group, first: bool) -> bool {
    let mut placeholders = group.placeholders().peekable();
    if placeholders.peek().is_none() {
        return false;
    }
    if first && (group.has_field(OrgField::Dance) || group.has_field(OrgField::Genre)) {
        return true;
    }
    group.placeholders().all(|p| p.field.is_numeric())
}

/// Split a template into `(text, braced)` groups.
fn split_groups(template: &str) -> Vec<(String, bool)> {
    let mut groups = Vec::new();
    let mut current = String::new();
    let mut braced = false;

    for c in template.chars() {
        match c {
            '{' | '}' => {
                if !current.is_empty() {
                    groups.push((std::mem::take(&mut current), braced));
                }
                braced = c == '{';
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        groups.push((current, braced));
    }
    groups
}

/// Split group text into literal and placeholder segments. Only `%NAME%`
/// with a known name becomes a placeholder; any other `%` is literal.
fn split_segments(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = text;

    while let Some(start) = rest.find('%') {
        literal.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let field = after
            .find('%')
            .and_then(|end| OrgField::lookup(&after[..end]).map(|f| (end, f)));
        match field {
            Some((end, field)) => {
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Placeholder(Placeholder {
                    field,
                    optional: false,
                    capture: 0,
                }));
                rest = &after[end + 1..];
            }
            None => {
                literal.push('%');
                rest = after;
            }
        }
    }
    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    segments
}

fn build_pattern(groups: &[Group]) -> String {
    let mut pattern = String::new();
    for group in groups {
        if group.optional {
            pattern.push_str("(?:");
        }
        for segment in &group.segments {
            match segment {
                Segment::Literal(text) => pattern.push_str(&regex::escape(text)),
                Segment::Placeholder(p) if p.field.is_numeric() => pattern.push_str(r"(\d+)?"),
                Segment::Placeholder(_) => pattern.push_str("([^/]+)"),
            }
        }
        if group.optional {
            pattern.push_str(")?");
        }
    }
    pattern.push_str(r"\.[[:alnum:]]+$");
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placeholder_fields(group: &Group) -> Vec<OrgField> {
        group.placeholders().map(|p| p.field).collect()
    }

    #[test]
    fn test_compiles_plain_template_as_one_group() {
        let org = OrgPath::compile("%ARTIST%/%ALBUM%/%TRACKNUMBER% %TITLE%").unwrap();
        assert_eq!(org.groups().len(), 1);
        assert_eq!(
            placeholder_fields(&org.groups()[0]),
            vec![
                OrgField::Artist,
                OrgField::Album,
                OrgField::TrackNumber,
                OrgField::Title
            ]
        );
        assert_eq!(
            org.pattern(),
            r"([^/]+)/([^/]+)/(\d+)? ([^/]+)\.[[:alnum:]]+$"
        );
    }

    #[test]
    fn test_first_group_dance_is_optional_later_groups_are_not() {
        let org = OrgPath::compile("{%DANCE%/}{%ARTIST%/}{%GENRE%/}{%TITLE%}").unwrap();
        let optional: Vec<bool> = org.groups().iter().map(|g| g.optional).collect();
        assert_eq!(optional, vec![true, false, false, false]);
        assert!(org.pattern().starts_with("(?:([^/]+)/)?([^/]+)/"));
    }

    #[test]
    fn test_first_group_genre_is_optional() {
        let org = OrgPath::compile("{%GENRE%/}{%TITLE%}").unwrap();
        assert!(org.groups()[0].optional);
    }

    #[test]
    fn test_numeric_groups_are_optional_anywhere() {
        let org = OrgPath::compile("{%ALBUM%/}{%DISC%-}{%TRACKNUMBER0% - }{%TITLE%}").unwrap();
        let optional: Vec<bool> = org.groups().iter().map(|g| g.optional).collect();
        assert_eq!(optional, vec![false, true, true, false]);
        assert_eq!(
            org.pattern(),
            r"([^/]+)/(?:(\d+)?\-)?(?:(\d+)? \- )?([^/]+)\.[[:alnum:]]+$"
        );
    }

    #[test]
    fn test_capture_indices_are_sequential() {
        let org = OrgPath::compile("{%DANCE%/}{%ALBUMARTIST%/}{%TITLE%}").unwrap();
        let captures: Vec<usize> = org.placeholders().map(|p| p.capture).collect();
        assert_eq!(captures, vec![1, 2, 3]);
        assert_eq!(org.regex.captures_len(), 4);
    }

    #[test]
    fn test_unknown_names_stay_literal() {
        let org = OrgPath::compile("{%FOO%/}{%TITLE%}").unwrap();
        assert_eq!(
            org.groups()[0].segments,
            vec![Segment::Literal("%FOO%/".to_string())]
        );
        assert!(!org.groups()[0].optional);
    }

    #[test]
    fn test_stray_percent_signs_are_literal() {
        let org = OrgPath::compile("100%pure %TITLE%").unwrap();
        let group = &org.groups()[0];
        assert_eq!(group.segments[0], Segment::Literal("100%pure ".to_string()));
        assert_eq!(placeholder_fields(group), vec![OrgField::Title]);

        let org = OrgPath::compile("%TITLE% at 50%").unwrap();
        assert_eq!(
            org.groups()[0].segments.last(),
            Some(&Segment::Literal(" at 50%".to_string()))
        );

        // An unknown name keeps its opening `%`; the closing one may start the next placeholder.
        let org = OrgPath::compile("%FOO%TITLE%").unwrap();
        let group = &org.groups()[0];
        assert_eq!(group.segments[0], Segment::Literal("%FOO".to_string()));
        assert_eq!(placeholder_fields(group), vec![OrgField::Title]);
        assert_eq!(group.segments.len(), 2);
    }

    #[test]
    fn test_regex_metacharacters_in_literals_are_escaped() {
        let org = OrgPath::compile("{%ARTIST% (live)/}{%TITLE%}").unwrap();
        assert!(org.pattern().contains(r"\(live\)/"));
    }

    #[test]
    fn test_field_flags() {
        let org = OrgPath::compile("{%BYPASS%/}{%ALBUMARTIST%/}{%TITLE%}").unwrap();
        assert!(org.has_bypass());
        assert!(org.has_album_artist());
        assert_eq!(org.tag_keys(), vec![TagKey::AlbumArtist, TagKey::Title]);
    }

    #[test]
    fn test_lookup_and_names_agree() {
        for name in ["ALBUM", "TRACKNUMBER0", "BYPASS", "RATING"] {
            assert_eq!(OrgField::lookup(name).unwrap().name(), name);
        }
        assert_eq!(OrgField::lookup("title"), None);
    }
}
