//! IP-replace table (§4.10 step 8, §6.7), grounded on
//! `original_source/core/replace/ip.go` for the file format (CIDR-or-single-IP pattern →
//! replacement IP, `#`-comment stripping, first-match-wins).

use std::fs;
use std::net::IpAddr;
use std::path::Path;

use crate::ipset::Cidr;

struct Rule {
    pattern: Cidr,
    replacement: IpAddr,
}

#[derive(Default)]
pub struct IpReplace {
    rules: Vec<Rule>,
}

impl IpReplace {
    pub fn empty() -> IpReplace {
        IpReplace::default()
    }

    pub fn load(path: &Path) -> IpReplace {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to load IP-replace file, continuing without it");
                return IpReplace::default();
            }
        };
        let mut rules = Vec::new();
        for line in raw.lines() {
            let line = match line.find('#') {
                Some(idx) => &line[..idx],
                None => line,
            }
            .trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split_whitespace();
            let (Some(pattern_str), Some(replacement_str)) = (parts.next(), parts.next()) else {
                continue;
            };
            let (Some(pattern), Ok(replacement)) =
                (Cidr::parse(pattern_str), replacement_str.parse::<IpAddr>())
            else {
                continue;
            };
            rules.push(Rule {
                pattern,
                replacement,
            });
        }
        IpReplace { rules }
    }

    /// First matching rule wins (§4.10 step 8). Returns `None` if no rule matches `ip`.
    pub fn replacement_for(&self, ip: IpAddr) -> Option<IpAddr> {
        self.rules
            .iter()
            .find(|r| r.pattern.contains_ip(ip))
            .map(|r| r.replacement)
    }
}

/// IP-block set (§4.10 step 6): a plain IPSet with CIDRs loaded from `IPBlockFile`.
pub mod block {
    use std::net::IpAddr;
    use std::path::Path;

    use crate::ipset::IpSet;

    pub fn load(path: &Path) -> IpSet {
        match std::fs::read_to_string(path) {
            Ok(raw) => IpSet::from_strs(raw.lines().filter(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'))),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to load IP-block file, continuing without it");
                IpSet::default()
            }
        }
    }

    pub fn is_blocked(set: &IpSet, ip: IpAddr) -> bool {
        set.contains(ip, false, "block")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_matching_ip_with_configured_target() {
        let rules = IpReplace {
            rules: vec![Rule {
                pattern: Cidr::parse("1.2.3.0/24").unwrap(),
                replacement: "9.9.9.9".parse().unwrap(),
            }],
        };
        assert_eq!(
            rules.replacement_for("1.2.3.4".parse().unwrap()),
            Some("9.9.9.9".parse().unwrap())
        );
    }

    #[test]
    fn non_matching_ip_left_unchanged() {
        let rules = IpReplace::empty();
        assert_eq!(rules.replacement_for("8.8.8.8".parse().unwrap()), None);
    }
}
