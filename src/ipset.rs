//! Fast IPv4/IPv6 CIDR-list membership (§4.1).
//!
//! No repository in the retrieval pack depends on a CIDR/ipnet crate, so this is implemented
//! directly over `std::net` rather than borrowing an ecosystem idiom that doesn't exist here.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

#[derive(Debug, Clone, Copy)]
struct V4Net {
    base: u32,
    prefix: u8,
}

impl V4Net {
    fn contains(&self, ip: Ipv4Addr) -> bool {
        if self.prefix == 0 {
            return true;
        }
        let mask = u32::MAX << (32 - self.prefix);
        (u32::from(ip) & mask) == (self.base & mask)
    }
}

#[derive(Debug, Clone, Copy)]
struct V6Net {
    base: u128,
    prefix: u8,
}

impl V6Net {
    fn contains(&self, ip: Ipv6Addr) -> bool {
        if self.prefix == 0 {
            return true;
        }
        let mask = u128::MAX << (128 - self.prefix);
        (u128::from(ip) & mask) == (self.base & mask)
    }
}

/// A parsed CIDR: `"10.0.0.0/8"`, `"::1/128"`, etc.
#[derive(Debug, Clone, Copy)]
pub enum Cidr {
    V4(V4Net),
    V6(V6Net),
}

impl Cidr {
    pub fn parse(s: &str) -> Option<Cidr> {
        let (addr, prefix) = match s.split_once('/') {
            Some((a, p)) => (a, p.parse::<u8>().ok()?),
            None => (s, if s.contains(':') { 128 } else { 32 }),
        };
        match addr.parse::<IpAddr>().ok()? {
            IpAddr::V4(v4) if prefix <= 32 => Some(Cidr::V4(V4Net {
                base: u32::from(v4),
                prefix,
            })),
            IpAddr::V6(v6) if prefix <= 128 => Some(Cidr::V6(V6Net {
                base: u128::from(v6),
                prefix,
            })),
            _ => None,
        }
    }

    fn contains(&self, ip: IpAddr) -> bool {
        match (self, ip) {
            (Cidr::V4(net), IpAddr::V4(ip)) => net.contains(ip),
            (Cidr::V6(net), IpAddr::V6(ip)) => net.contains(ip),
            _ => false,
        }
    }

    /// Public form of `contains`, used by single-rule matchers like `replace::ip` that don't
    /// need a whole `IpSet`.
    pub fn contains_ip(&self, ip: IpAddr) -> bool {
        self.contains(ip)
    }
}

/// A named collection of CIDRs supporting membership queries with the `match_zero` semantics
/// from §4.1/§9: an empty set behaves as "matches everything" when the caller opts in via
/// `match_zero=true` — inverted from what most readers expect, so this is covered by an explicit
/// test below rather than left implicit.
#[derive(Debug, Clone, Default)]
pub struct IpSet {
    nets: Vec<Cidr>,
}

impl IpSet {
    pub fn new(cidrs: impl IntoIterator<Item = Cidr>) -> Self {
        IpSet {
            nets: cidrs.into_iter().collect(),
        }
    }

    pub fn from_strs<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        IpSet {
            nets: lines.into_iter().filter_map(Cidr::parse).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nets.is_empty()
    }

    /// `match_zero=true`: an empty set matches everything. `label` is purely diagnostic.
    pub fn contains(&self, ip: IpAddr, match_zero: bool, label: &str) -> bool {
        if self.nets.is_empty() {
            tracing::trace!(label, match_zero, "IPSet empty, match_zero governs result");
            return match_zero;
        }
        self.nets.iter().any(|n| n.contains(ip))
    }

    /// The reserved/private/loopback/CGNAT ranges excluded from ECS auto-use (§3).
    pub fn reserved() -> IpSet {
        IpSet::from_strs([
            "127.0.0.0/8",
            "10.0.0.0/8",
            "172.16.0.0/12",
            "192.168.0.0/16",
            "100.64.0.0/10",
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_match_zero_true_matches_everything() {
        let set = IpSet::default();
        assert!(set.contains("8.8.8.8".parse().unwrap(), true, "test"));
        assert!(set.contains("::1".parse().unwrap(), true, "test"));
    }

    #[test]
    fn empty_set_match_zero_false_matches_nothing() {
        let set = IpSet::default();
        assert!(!set.contains("8.8.8.8".parse().unwrap(), false, "test"));
    }

    #[test]
    fn reserved_excludes_private_ranges() {
        let reserved = IpSet::reserved();
        assert!(reserved.contains("10.1.2.3".parse().unwrap(), false, "reserved"));
        assert!(reserved.contains("192.168.1.1".parse().unwrap(), false, "reserved"));
        assert!(reserved.contains("100.64.0.1".parse().unwrap(), false, "reserved"));
        assert!(!reserved.contains("8.8.8.8".parse().unwrap(), false, "reserved"));
    }

    #[test]
    fn cidr_boundary() {
        let set = IpSet::from_strs(["203.0.113.0/24"]);
        assert!(set.contains("203.0.113.255".parse().unwrap(), false, "x"));
        assert!(!set.contains("203.0.114.0".parse().unwrap(), false, "x"));
    }
}
