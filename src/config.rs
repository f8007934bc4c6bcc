//! JSON configuration (§6.4), grounded on `src/config.rs`'s struct + `Default` +
//! `validate()` + `#[cfg(test)]` shape, and `original_source/core/config/config.go`'s
//! `NewConfig()` derivation order (domain-TTL map, then domain matchers, then IP-network sets,
//! then cache, then hosts — warn-and-continue on optional file load failures).

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ForwarderError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Udp,
    Tcp,
    #[serde(rename = "tcp-tls")]
    TcpTls,
    Https,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EcsPolicy {
    #[default]
    Auto,
    Manual,
    Disable,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct EdnsClientSubnetConfig {
    #[serde(default)]
    pub policy: EcsPolicy,
    #[serde(default, rename = "ExternalIP")]
    pub external_ip: Option<String>,
    #[serde(default, rename = "NoCookie")]
    pub no_cookie: bool,
}

/// One upstream resolver (§3 `DNSUpstream`), immutable once loaded.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DnsUpstream {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Address")]
    pub address: String,
    #[serde(rename = "Protocol")]
    pub protocol: Protocol,
    #[serde(rename = "SOCKS5Address", default)]
    pub socks5_address: Option<String>,
    #[serde(rename = "TimeoutMs", default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(rename = "EDNSClientSubnet", default)]
    pub edns_client_subnet: EdnsClientSubnetConfig,
}

fn default_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PrimaryNoneFallback {
    #[serde(rename = "PrimaryDNS")]
    PrimaryDns,
    #[serde(rename = "AlternativeDNS")]
    AlternativeDns,
}

impl Default for PrimaryNoneFallback {
    fn default() -> Self {
        PrimaryNoneFallback::PrimaryDns
    }
}

fn default_cache_size() -> usize {
    4096
}

/// Top-level configuration, loaded once from a JSON file at startup (§6.4).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(rename = "BindAddress")]
    pub bind_address: Vec<String>,

    #[serde(rename = "DebugHTTPAddress", default)]
    pub debug_http_address: Option<String>,

    #[serde(rename = "PrimaryDNS", default)]
    pub primary_dns: Vec<DnsUpstream>,
    #[serde(rename = "AlternativeDNS", default)]
    pub alternative_dns: Vec<DnsUpstream>,

    #[serde(rename = "OnlyPrimaryDNS", default)]
    pub only_primary_dns: bool,
    #[serde(rename = "IPv6UseAlternativeDNS", default)]
    pub ipv6_use_alternative_dns: bool,
    #[serde(rename = "RedirectIPv6Record", default)]
    pub redirect_ipv6_record: bool,
    #[serde(rename = "AlternativeDNSConcurrent", default)]
    pub alternative_dns_concurrent: bool,
    #[serde(rename = "AlternativeFirst", default)]
    pub alternative_first: bool,
    #[serde(rename = "WhenPrimaryDNSAnswerNoneUse", default)]
    pub when_primary_dns_answer_none_use: PrimaryNoneFallback,

    #[serde(rename = "IPNetworkFile", default)]
    pub ip_network_file: IpNetworkFileConfig,
    #[serde(rename = "DomainFile", default)]
    pub domain_file: DomainFileConfig,
    #[serde(rename = "HostsFile", default)]
    pub hosts_file: HostsFileConfig,

    #[serde(rename = "MinimumTTL", default)]
    pub minimum_ttl: u32,
    #[serde(rename = "CacheSize", default = "default_cache_size")]
    pub cache_size: usize,
    #[serde(rename = "RejectQType", default)]
    pub reject_qtype: Vec<String>,
    #[serde(rename = "DomainTTLFile", default)]
    pub domain_ttl_file: Option<String>,

    #[serde(rename = "DomainReplaceFile", default)]
    pub domain_replace_file: Option<String>,
    #[serde(rename = "IPReplaceFile", default)]
    pub ip_replace_file: Option<String>,
    #[serde(rename = "IPBlockFile", default)]
    pub ip_block_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct IpNetworkFileConfig {
    #[serde(rename = "Primary", default)]
    pub primary: Option<String>,
    #[serde(rename = "Alternative", default)]
    pub alternative: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct DomainFileConfig {
    #[serde(rename = "Primary", default)]
    pub primary: Option<String>,
    #[serde(rename = "Alternative", default)]
    pub alternative: Option<String>,
    #[serde(rename = "Block", default)]
    pub block: Option<String>,
    #[serde(rename = "Matcher", default)]
    pub matcher: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct HostsFileConfig {
    #[serde(rename = "HostsFile", default)]
    pub hosts_file: Option<String>,
    #[serde(rename = "Finder", default)]
    pub finder: Option<String>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config> {
        let raw = fs::read_to_string(path)
            .map_err(|e| ForwarderError::Config(format!("reading {}: {e}", path.display())))?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bind_address.is_empty() {
            return Err(ForwarderError::Config(
                "BindAddress must list at least one address".into(),
            ));
        }
        if self.primary_dns.is_empty() {
            return Err(ForwarderError::Config(
                "PrimaryDNS must list at least one upstream".into(),
            ));
        }
        for up in self.primary_dns.iter().chain(&self.alternative_dns) {
            if up.address.is_empty() {
                return Err(ForwarderError::Config(format!(
                    "upstream {} has an empty Address",
                    up.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses() {
        let json = r#"{
            "BindAddress": ["0.0.0.0:53"],
            "PrimaryDNS": [
                {"Name": "primary-1", "Address": "1.1.1.1:53", "Protocol": "udp"}
            ]
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache_size, 4096);
        assert_eq!(config.primary_dns[0].timeout_ms, 5000);
        assert_eq!(config.primary_dns[0].edns_client_subnet.policy, EcsPolicy::Auto);
    }

    #[test]
    fn missing_bind_address_fails_validation() {
        let json = r#"{
            "BindAddress": [],
            "PrimaryDNS": [{"Name": "p", "Address": "1.1.1.1:53", "Protocol": "udp"}]
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_primary_dns_fails_validation() {
        let json = r#"{"BindAddress": ["0.0.0.0:53"]}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }
}
