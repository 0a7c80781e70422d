//! Reference data lookups: genres, dances and the default dance level.
//!
//! These are small tables loaded from the `[reference]` config section. Every
//! lookup is a pure function over them.

use serde::{Deserialize, Serialize};

/// A genre and whether it is classical (classical genres organize by
/// composer and conductor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    pub name: String,
    #[serde(default)]
    pub classical: bool,
}

impl Genre {
    fn new(name: &str, classical: bool) -> Self {
        Self {
            name: name.to_string(),
            classical,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceData {
    pub genres: Vec<Genre>,
    pub dances: Vec<String>,
    /// Level assigned to songs that have none.
    pub default_dance_level: String,
}

impl Default for ReferenceData {
    fn default() -> Self {
        Self {
            genres: vec![
                Genre::new("Ballroom Dance", false),
                Genre::new("Blues", false),
                Genre::new("Classical", true),
                Genre::new("Jazz", false),
                Genre::new("Latin", false),
                Genre::new("Opera", true),
                Genre::new("Pop", false),
                Genre::new("Rock", false),
                Genre::new("Tango", false),
                Genre::new("Waltz", false),
            ],
            dances: [
                "Cha Cha",
                "Foxtrot",
                "Jive",
                "Paso Doble",
                "Quickstep",
                "Rumba",
                "Salsa",
                "Samba",
                "Swing",
                "Tango",
                "Viennese Waltz",
                "Waltz",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            default_dance_level: "Normal".to_string(),
        }
    }
}

impl ReferenceData {
    /// Whether `genre` is flagged classical. Unknown genres are not.
    pub fn is_classical(&self, genre: &str) -> bool {
        self.genres
            .iter()
            .any(|g| g.classical && g.name.eq_ignore_ascii_case(genre))
    }

    /// The dance a genre implies, when the genre names a known dance.
    pub fn genre_to_dance(&self, genre: &str) -> Option<&str> {
        let genre = genre.trim();
        if genre.is_empty() {
            return None;
        }
        self.dances
            .iter()
            .find(|d| d.eq_ignore_ascii_case(genre))
            .map(String::as_str)
    }

    pub fn default_dance_level(&self) -> &str {
        &self.default_dance_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classical_lookup_is_case_insensitive() {
        let refs = ReferenceData::default();
        assert!(refs.is_classical("classical"));
        assert!(refs.is_classical("Opera"));
        assert!(!refs.is_classical("Rock"));
        assert!(!refs.is_classical("Unknown"));
    }

    #[test]
    fn test_genre_to_dance_only_for_dance_genres() {
        let refs = ReferenceData::default();
        assert_eq!(refs.genre_to_dance("waltz"), Some("Waltz"));
        assert_eq!(refs.genre_to_dance("Tango "), Some("Tango"));
        assert_eq!(refs.genre_to_dance("Rock"), None);
        assert_eq!(refs.genre_to_dance(""), None);
    }

    #[test]
    fn test_default_level() {
        let refs = ReferenceData::default();
        assert_eq!(refs.default_dance_level(), "Normal");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let refs: ReferenceData = toml::from_str(
            r#"
[[genres]]
name = "Baroque"
classical = true
"#,
        )
        .unwrap();
        assert!(refs.is_classical("Baroque"));
        assert!(!refs.is_classical("Classical"));
        assert_eq!(refs.default_dance_level(), "Normal");
        assert!(!refs.dances.is_empty());
    }
}
