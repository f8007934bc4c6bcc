//! Domain-TTL override file (§6.6): `<domain-regex> <ttl-seconds>` per line, invalid TTLs skipped
//! with a warning. §9 leaves map-iteration order unspecified for overlapping patterns; this crate
//! resolves that open question as an ordered `Vec<(Regex, u32)>` in file order, first match wins
//! (recorded in DESIGN.md).

use std::fs;
use std::path::Path;

use regex::Regex;

pub fn load(path: &Path) -> Vec<(Regex, u32)> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to load domain-TTL file, continuing without it");
            return Vec::new();
        }
    };
    let mut entries = Vec::new();
    for (lineno, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let (Some(pattern), Some(ttl_str)) = (parts.next(), parts.next()) else {
            continue;
        };
        let Ok(ttl) = ttl_str.parse::<u32>() else {
            tracing::warn!(line = lineno + 1, ttl = ttl_str, "invalid TTL in domain-TTL file, skipping");
            continue;
        };
        match Regex::new(pattern) {
            Ok(re) => entries.push((re, ttl)),
            Err(e) => tracing::warn!(line = lineno + 1, pattern, error = %e, "invalid regex in domain-TTL file, skipping"),
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn first_match_wins_on_overlap() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "example\\.com 60").unwrap();
        writeln!(file, ".* 120").unwrap();
        let entries = load(file.path());
        assert_eq!(entries.len(), 2);
        let matched = entries.iter().find(|(re, _)| re.is_match("example.com"));
        assert_eq!(matched.unwrap().1, 60);
    }

    #[test]
    fn invalid_ttl_is_skipped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "example\\.com notanumber").unwrap();
        let entries = load(file.path());
        assert!(entries.is_empty());
    }

    #[test]
    fn missing_file_warns_and_returns_empty() {
        let entries = load(Path::new("/nonexistent/domain_ttl.txt"));
        assert!(entries.is_empty());
    }
}
