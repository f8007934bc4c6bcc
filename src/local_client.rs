//! Local (hosts-file) client: answer synthesis ahead of the dispatch ladder (§4.9 step 1).
//!
//! Grounded on `original_source/core/inbound/server.go`'s use of a hosts-backed local client; the
//! hosts-file parser itself is out of deep scope per SPEC_FULL §1 — only the lookup interface and
//! a minimal whitespace-separated loader are implemented here.

use std::collections::HashMap;
use std::fs;
use std::net::IpAddr;
use std::path::Path;

use crate::dns::{Message, Name, RData, Record, RecordClass, RecordType};

#[derive(Debug, Default, Clone)]
pub struct LocalClient {
    entries: HashMap<String, Vec<IpAddr>>,
}

impl LocalClient {
    pub fn empty() -> LocalClient {
        LocalClient::default()
    }

    /// Loads a hosts file: `<ip> <name...>` per line, `#` starts a comment. Missing or
    /// unreadable files are a warn-and-continue per §7 (optional list load failure).
    pub fn load(path: &Path) -> LocalClient {
        let mut entries: HashMap<String, Vec<IpAddr>> = HashMap::new();
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to load hosts file, continuing without it");
                return LocalClient::default();
            }
        };
        for line in raw.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split_whitespace();
            let Some(ip_str) = parts.next() else {
                continue;
            };
            let Ok(ip) = ip_str.parse::<IpAddr>() else {
                continue;
            };
            for name in parts {
                entries
                    .entry(name.trim_end_matches('.').to_ascii_lowercase())
                    .or_default()
                    .push(ip);
            }
        }
        LocalClient { entries }
    }

    /// Synthesises a response from the hosts table, or `None` if the query's name isn't present
    /// or no entry matches the query's address family.
    pub fn lookup(&self, query: &Message) -> Option<Message> {
        let question = query.question()?;
        let name_key = question.qname.to_string_no_trailing_dot().to_ascii_lowercase();
        let ips = self.entries.get(&name_key)?;

        let wants_v4 = question.qtype == RecordType::A;
        let wants_v6 = question.qtype == RecordType::AAAA;
        if !wants_v4 && !wants_v6 {
            return None;
        }
        let matching: Vec<IpAddr> = ips
            .iter()
            .copied()
            .filter(|ip| ip.is_ipv4() == wants_v4)
            .collect();
        if matching.is_empty() {
            return None;
        }

        let mut response = query.clone();
        response.qr = true;
        response.ra = true;
        response.answers = matching
            .into_iter()
            .map(|ip| Record {
                name: question.qname.clone(),
                rtype: question.qtype,
                rclass: RecordClass::IN,
                ttl: 3600,
                rdata: match ip {
                    IpAddr::V4(v4) => RData::A(v4),
                    IpAddr::V6(v6) => RData::Aaaa(v6),
                },
            })
            .collect();
        Some(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{Question, RecordClass};

    fn query(qtype: RecordType) -> Message {
        Message::query(
            1,
            Question {
                qname: Name::from_str_lossy("router.lan"),
                qtype,
                qclass: RecordClass::IN,
            },
        )
    }

    #[test]
    fn lookup_returns_synthesised_a_record() {
        let mut entries = HashMap::new();
        entries.insert("router.lan".to_string(), vec!["192.168.1.1".parse().unwrap()]);
        let client = LocalClient { entries };
        let resp = client.lookup(&query(RecordType::A)).unwrap();
        assert_eq!(resp.answers.len(), 1);
        assert_eq!(resp.answers[0].ip(), Some("192.168.1.1".parse().unwrap()));
    }

    #[test]
    fn lookup_misses_unknown_name() {
        let client = LocalClient::empty();
        assert!(client.lookup(&query(RecordType::A)).is_none());
    }

    #[test]
    fn lookup_respects_address_family() {
        let mut entries = HashMap::new();
        entries.insert("router.lan".to_string(), vec!["192.168.1.1".parse().unwrap()]);
        let client = LocalClient { entries };
        assert!(client.lookup(&query(RecordType::AAAA)).is_none());
    }
}
