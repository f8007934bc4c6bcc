//! Remote client: one (question, upstream) pair (§4.7).
//!
//! Grounded on `original_source/core/outbound/clients/remote.go` — ECS-policy resolution,
//! coalescing-key construction, and the memoize-on-first-exchange flow.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::OnceLock;

use crate::cache::{Cache, CacheKey};
use crate::coalesce::{CoalesceKey, Coalescer};
use crate::config::{DnsUpstream, EcsPolicy};
use crate::dns::{EdnsOption, Message, ECS_V4_NETMASK, ECS_V6_NETMASK};
use crate::ipset::IpSet;
use crate::resolver::Resolver;

/// One upstream's client for a single question. Constructed fresh per inbound query.
pub struct RemoteClient {
    upstream: Arc<DnsUpstream>,
    resolver: Arc<dyn Resolver>,
    question_qname: String,
    question_qtype: u16,
    ecs_ip: Option<IpAddr>,
    memoized: OnceLock<Option<Message>>,
}

impl RemoteClient {
    pub fn new(
        upstream: Arc<DnsUpstream>,
        resolver: Arc<dyn Resolver>,
        question_qname: &str,
        question_qtype: u16,
        client_ip: IpAddr,
        reserved: &IpSet,
    ) -> RemoteClient {
        let ecs_ip = resolve_ecs_ip(&upstream.edns_client_subnet, client_ip, reserved);
        RemoteClient {
            upstream,
            resolver,
            question_qname: question_qname.to_string(),
            question_qtype,
            ecs_ip,
            memoized: OnceLock::new(),
        }
    }

    fn ecs_ip_string(&self) -> String {
        self.ecs_ip.map(|ip| ip.to_string()).unwrap_or_default()
    }

    /// The ECS IP component of this client's cache key, exposed so a bundle can build a matching
    /// key when caching the winning client's response (§4.5/§4.8 — the write-path key must agree
    /// with `exchange_from_cache`'s per-client read-path key).
    pub fn cache_ecs_label(&self) -> String {
        self.ecs_ip_string()
    }

    pub fn cache_key(&self, qclass: u16) -> CacheKey {
        CacheKey::build(
            &self.question_qname,
            self.question_qtype.into(),
            qclass,
            &self.ecs_ip_string(),
        )
    }

    fn coalesce_key(&self) -> CoalesceKey {
        CoalesceKey::build(
            &self.question_qname,
            self.question_qtype,
            &self.ecs_ip_string(),
            &self.upstream.name,
        )
    }

    pub fn exchange_from_cache(&self, cache: &Cache, qclass: u16) -> Option<Message> {
        cache.get(&self.cache_key(qclass)).map(|hit| hit.message)
    }

    /// §4.7: coalesce, stamp ECS, exchange, memoize.
    pub async fn exchange(
        &self,
        coalescer: &Coalescer,
        mut query: Message,
        log_answers: bool,
    ) -> Option<Message> {
        if let Some(cached) = self.memoized.get() {
            return cached.clone();
        }
        stamp_ecs(&mut query, self.ecs_ip, &self.upstream.edns_client_subnet);

        let resolver = self.resolver.clone();
        let upstream_name = self.upstream.name.clone();
        let result = coalescer
            .coalesce(self.coalesce_key(), move || async move {
                match resolver.exchange(&query).await {
                    Ok(response) => {
                        if log_answers {
                            tracing::debug!(upstream = %upstream_name, answers = response.answers.len(), "upstream exchange succeeded");
                        }
                        Some(response)
                    }
                    Err(e) => {
                        tracing::debug!(upstream = %upstream_name, error = %e, "upstream exchange failed");
                        None
                    }
                }
            })
            .await;
        let _ = self.memoized.set(result.clone());
        result
    }

    pub fn upstream_name(&self) -> &str {
        &self.upstream.name
    }
}

/// ECS IP resolution per policy (§4.7 step 1).
fn resolve_ecs_ip(
    policy: &crate::config::EdnsClientSubnetConfig,
    client_ip: IpAddr,
    reserved: &IpSet,
) -> Option<IpAddr> {
    match policy.policy {
        EcsPolicy::Auto => {
            if !reserved.contains(client_ip, false, "reserved") {
                Some(client_ip)
            } else {
                external_ip_if_usable(policy, reserved)
            }
        }
        EcsPolicy::Manual => external_ip_if_usable(policy, reserved),
        EcsPolicy::Disable => None,
    }
}

fn external_ip_if_usable(
    policy: &crate::config::EdnsClientSubnetConfig,
    reserved: &IpSet,
) -> Option<IpAddr> {
    let ip: IpAddr = policy.external_ip.as_deref()?.parse().ok()?;
    if reserved.contains(ip, false, "reserved") {
        None
    } else {
        Some(ip)
    }
}

/// EDNS-client-subnet stamping (§4.7.1). Idempotent: if a SUBNET option is already present,
/// leave it untouched rather than overwrite it.
pub fn stamp_ecs(
    query: &mut Message,
    ecs_ip: Option<IpAddr>,
    policy: &crate::config::EdnsClientSubnetConfig,
) {
    let Some(ip) = ecs_ip else {
        return;
    };
    let opts = query.ensure_opt_mut(4096);
    if policy.no_cookie {
        opts.retain(|o| !matches!(o, EdnsOption::Cookie(_)));
    }
    if opts
        .iter()
        .any(|o| matches!(o, EdnsOption::Subnet { .. }))
    {
        return;
    }
    let (family, prefix, addr) = match ip {
        IpAddr::V4(v4) => (1u16, ECS_V4_NETMASK, v4.octets().to_vec()),
        IpAddr::V6(v6) => (2u16, ECS_V6_NETMASK, v6.octets().to_vec()),
    };
    opts.push(EdnsOption::Subnet {
        family,
        source_prefix: prefix,
        scope_prefix: 0,
        addr,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EdnsClientSubnetConfig;
    use crate::dns::{Name, Question, RecordClass, RecordType};

    fn query() -> Message {
        Message::query(
            1,
            Question {
                qname: Name::from_str_lossy("example.com"),
                qtype: RecordType::A,
                qclass: RecordClass::IN,
            },
        )
    }

    #[test]
    fn auto_policy_uses_non_reserved_client_ip() {
        let reserved = IpSet::reserved();
        let ip = resolve_ecs_ip(
            &EdnsClientSubnetConfig {
                policy: EcsPolicy::Auto,
                external_ip: None,
                no_cookie: false,
            },
            "8.8.8.8".parse().unwrap(),
            &reserved,
        );
        assert_eq!(ip, Some("8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn auto_policy_falls_back_to_external_ip_for_reserved_client() {
        let reserved = IpSet::reserved();
        let ip = resolve_ecs_ip(
            &EdnsClientSubnetConfig {
                policy: EcsPolicy::Auto,
                external_ip: Some("203.0.113.1".to_string()),
                no_cookie: false,
            },
            "192.168.1.5".parse().unwrap(),
            &reserved,
        );
        assert_eq!(ip, Some("203.0.113.1".parse().unwrap()));
    }

    #[test]
    fn disable_policy_never_stamps() {
        let reserved = IpSet::reserved();
        let ip = resolve_ecs_ip(
            &EdnsClientSubnetConfig {
                policy: EcsPolicy::Disable,
                external_ip: Some("203.0.113.1".to_string()),
                no_cookie: false,
            },
            "8.8.8.8".parse().unwrap(),
            &reserved,
        );
        assert_eq!(ip, None);
    }

    #[test]
    fn stamping_is_idempotent() {
        let mut q = query();
        let policy = EdnsClientSubnetConfig::default();
        stamp_ecs(&mut q, Some("8.8.8.8".parse().unwrap()), &policy);
        stamp_ecs(&mut q, Some("8.8.8.8".parse().unwrap()), &policy);
        let subnet_opts: Vec<_> = q
            .edns_options()
            .into_iter()
            .filter(|o| matches!(o, EdnsOption::Subnet { .. }))
            .collect();
        assert_eq!(subnet_opts.len(), 1);
    }

    #[test]
    fn empty_ecs_ip_leaves_question_untouched() {
        let mut q = query();
        stamp_ecs(&mut q, None, &EdnsClientSubnetConfig::default());
        assert!(q.opt_index().is_none());
    }
}
