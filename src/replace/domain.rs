//! Domain-replace table (§4.10 step 3, §6.7), grounded on `original_source/replace/domain.go`'s
//! file-parsing rules: `#`-comment stripping, whitespace collapsing, first-match-wins.

use std::fs;
use std::path::Path;

/// `<pattern> <replacement>` pairs, matched in file order (first match wins).
#[derive(Debug, Default, Clone)]
pub struct DomainReplace {
    rules: Vec<(String, String)>,
}

impl DomainReplace {
    pub fn empty() -> DomainReplace {
        DomainReplace::default()
    }

    pub fn load(path: &Path) -> DomainReplace {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to load domain-replace file, continuing without it");
                return DomainReplace::default();
            }
        };
        let mut rules = Vec::new();
        for line in raw.lines() {
            let line = strip_comment(line).trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split_whitespace();
            let (Some(pattern), Some(replacement)) = (parts.next(), parts.next()) else {
                continue;
            };
            rules.push((
                pattern.trim_end_matches('.').to_ascii_lowercase(),
                replacement.to_string(),
            ));
        }
        DomainReplace { rules }
    }

    /// First matching rule wins; returns the replacement with a trailing dot (§4.10 step 3).
    pub fn replacement_for(&self, qname: &str) -> Option<String> {
        let qname = qname.trim_end_matches('.').to_ascii_lowercase();
        self.rules.iter().find_map(|(pattern, replacement)| {
            if *pattern == qname {
                let mut r = replacement.clone();
                if !r.ends_with('.') {
                    r.push('.');
                }
                Some(r)
            } else {
                None
            }
        })
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_match_wins() {
        let rules = DomainReplace {
            rules: vec![
                ("old.test".to_string(), "new-one.test".to_string()),
                ("old.test".to_string(), "new-two.test".to_string()),
            ],
        };
        assert_eq!(
            rules.replacement_for("old.test"),
            Some("new-one.test.".to_string())
        );
    }

    #[test]
    fn no_match_returns_none() {
        let rules = DomainReplace::empty();
        assert_eq!(rules.replacement_for("anything.test"), None);
    }
}
