//! Domain matcher interface (§4.2).
//!
//! Only the trait plus two straightforward concrete matchers are implemented here —
//! suffix-tree / regex-list / mix-list variants are out of scope; selecting one of their names
//! falls back to `FullSetMatcher` with a warning, mirroring
//! `original_source/core/config/config.go`'s `getDomainMatcher`.

use std::collections::HashSet;

use crate::error::ForwarderError;

pub trait Matcher: Send + Sync {
    fn insert(&mut self, pattern: &str) -> Result<(), ForwarderError>;
    fn has(&self, name: &str) -> bool;
    fn name(&self) -> &str;
}

/// Exact-match set, case-insensitive, trailing dot ignored.
#[derive(Debug, Default)]
pub struct FullSetMatcher {
    entries: HashSet<String>,
}

impl FullSetMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn normalize(name: &str) -> String {
        name.trim_end_matches('.').to_ascii_lowercase()
    }
}

impl Matcher for FullSetMatcher {
    fn insert(&mut self, pattern: &str) -> Result<(), ForwarderError> {
        self.entries.insert(Self::normalize(pattern));
        Ok(())
    }

    fn has(&self, name: &str) -> bool {
        self.entries.contains(&Self::normalize(name))
    }

    fn name(&self) -> &str {
        "full-map"
    }
}

/// The catch-all sentinel: always matches, never actually loads its backing file (§4.2).
#[derive(Debug, Default)]
pub struct FinalMatcher;

impl Matcher for FinalMatcher {
    fn insert(&mut self, _pattern: &str) -> Result<(), ForwarderError> {
        Ok(())
    }

    fn has(&self, _name: &str) -> bool {
        true
    }

    fn name(&self) -> &str {
        "final"
    }
}

/// Builds a matcher by config-file name, warning and falling back to `FullSetMatcher` for any
/// name this crate doesn't implement a real structure for.
pub fn matcher_by_name(name: &str) -> Box<dyn Matcher> {
    match name {
        "final" => Box::new(FinalMatcher),
        "full-map" | "full-list" => Box::new(FullSetMatcher::new()),
        other => {
            tracing::warn!(matcher = other, "unknown matcher, falling back to full-map");
            Box::new(FullSetMatcher::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_set_matcher_is_case_and_dot_insensitive() {
        let mut m = FullSetMatcher::new();
        m.insert("Example.COM.").unwrap();
        assert!(m.has("example.com"));
        assert!(m.has("example.com."));
        assert!(!m.has("other.com"));
    }

    #[test]
    fn final_matcher_always_matches() {
        let m = FinalMatcher;
        assert!(m.has("anything.at.all"));
    }

    #[test]
    fn unknown_matcher_name_falls_back() {
        let m = matcher_by_name("suffix-tree");
        assert_eq!(m.name(), "full-map");
    }
}
