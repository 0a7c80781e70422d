//! Reading field values back out of an organized path.

use super::template::{OrgField, OrgPath};
use crate::model::TagKey;

/// Captures of the most recently matched path.
#[derive(Debug, Clone, Default)]
pub struct MatchCache {
    path: Option<String>,
    /// `None` when the path did not match.
    captures: Option<Vec<Option<String>>>,
}

impl MatchCache {
    fn is_for(&self, path: &str) -> bool {
        self.path.as_deref() == Some(path)
    }
}

impl OrgPath {
    /// Extract the value of `key` from `path`.
    ///
    /// Returns `None` when the path does not match the template, the template
    /// has no placeholder for `key`, or the placeholder's optional group is
    /// absent. Track and disc numbers default to `"1"` when absent from an
    /// otherwise matching path.
    pub fn extract(&mut self, path: &str, key: TagKey) -> Option<String> {
        self.refresh(path);
        let captures = self.cache.captures.as_ref()?;

        let mut found = false;
        for p in self.placeholders() {
            if p.field.tag_key() != Some(key) {
                continue;
            }
            found = true;
            if let Some(Some(value)) = captures.get(p.capture)
                && !value.is_empty()
            {
                return Some(value.clone());
            }
        }

        match key {
            TagKey::TrackNumber | TagKey::DiscNumber if found => Some("1".to_string()),
            _ => None,
        }
    }

    /// Extract the `%BYPASS%` fragment from `path`.
    pub fn extract_bypass(&mut self, path: &str) -> Option<String> {
        self.refresh(path);
        let captures = self.cache.captures.as_ref()?;
        self.placeholders()
            .filter(|p| p.field == OrgField::Bypass)
            .find_map(|p| captures.get(p.capture).cloned().flatten())
            .filter(|v| !v.is_empty())
    }

    fn refresh(&mut self, path: &str) {
        if self.cache.is_for(path) {
            return;
        }
        let captures = self.regex.captures(path).map(|caps| {
            caps.iter()
                .map(|m| m.map(|m| m.as_str().to_string()))
                .collect()
        });
        self.cache = MatchCache {
            path: Some(path.to_string()),
            captures,
        };
    }
}
