//! Filename sanitizing for generated path components.
//!
//! Works on characters, never bytes, so multi-byte sequences are kept whole.
//! Invalid UTF-8 handed to [`Sanitizer::sanitize_bytes`] is dropped a sequence
//! at a time.

/// Target operating system family. Selects the extra forbidden characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    /// The platform this binary was built for.
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }

    /// Whether `\` separates path components on this platform.
    pub fn uses_backslash_separator(&self) -> bool {
        matches!(self, Platform::Windows)
    }

    fn forbids(&self, c: char) -> bool {
        matches!(self, Platform::Windows) && c == '^'
    }

    fn strips_trailing_dots(&self) -> bool {
        matches!(self, Platform::Windows)
    }
}

/// Characters removed on every platform.
pub const FORBIDDEN: [char; 9] = [':', '/', '\\', '&', '|', '<', '>', '\'', '"'];

/// Default byte capacity of a single path component.
pub const MAX_COMPONENT_BYTES: usize = 255;

/// Strips filesystem-unsafe characters from a single path component.
#[derive(Debug, Clone, Copy)]
pub struct Sanitizer {
    platform: Platform,
    capacity: usize,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(Platform::current())
    }
}

impl Sanitizer {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            capacity: MAX_COMPONENT_BYTES,
        }
    }

    /// Limit the output to `capacity` bytes.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn sanitize(&self, input: &str) -> String {
        let mut out = String::with_capacity(input.len().min(self.capacity));
        self.push_valid(&mut out, input);
        self.finish(out)
    }

    /// Sanitize raw bytes, skipping any invalid UTF-8.
    pub fn sanitize_bytes(&self, input: &[u8]) -> String {
        let mut out = String::with_capacity(input.len().min(self.capacity));
        for chunk in input.utf8_chunks() {
            self.push_valid(&mut out, chunk.valid());
        }
        self.finish(out)
    }

    fn push_valid(&self, out: &mut String, input: &str) {
        for c in input.chars() {
            if FORBIDDEN.contains(&c) || self.platform.forbids(c) {
                continue;
            }
            if out.len() + c.len_utf8() > self.capacity {
                break;
            }
            out.push(c);
        }
    }

    fn finish(&self, mut out: String) -> String {
        if self.platform.strips_trailing_dots() {
            let trimmed = out.trim_end_matches('.').len();
            out.truncate(trimmed);
        }
        out
    }
}

/// Sanitize with the host platform's rules.
pub fn sanitize(input: &str) -> String {
    Sanitizer::default().sanitize(input)
}


/// Property-based tests using proptest
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn platform() -> impl Strategy<Value = Platform> {
        prop::sample::select(vec![Platform::Windows, Platform::MacOs, Platform::Linux])
    }

    proptest! {
        #[test]
        fn sanitize_is_idempotent(input in "\\PC{0,60}", platform in platform(), cap in 1usize..80) {
            let s = Sanitizer::new(platform).with_capacity(cap);
            let once = s.sanitize(&input);
            prop_assert_eq!(s.sanitize(&once), once.clone());
        }

        #[test]
        fn sanitize_never_emits_forbidden(input in "\\PC{0,60}", platform in platform()) {
            let out = Sanitizer::new(platform).sanitize(&input);
            for c in FORBIDDEN {
                prop_assert!(!out.contains(c), "found {:?} in {:?}", c, out);
            }
            if platform == Platform::Windows {
                prop_assert!(!out.contains('^'));
                prop_assert!(!out.ends_with('.'));
            }
        }

        #[test]
        fn sanitize_respects_capacity(input in "\\PC{0,60}", cap in 0usize..40) {
            let out = Sanitizer::new(Platform::Linux).with_capacity(cap).sanitize(&input);
            prop_assert!(out.len() <= cap);
        }

        #[test]
        fn sanitize_bytes_matches_str_on_valid_input(input in "\\PC{0,40}") {
            let s = Sanitizer::new(Platform::MacOs);
            prop_assert_eq!(s.sanitize_bytes(input.as_bytes()), s.sanitize(&input));
        }
    }
}
