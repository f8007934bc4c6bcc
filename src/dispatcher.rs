//! The dispatch ladder (§4.9): hosts → cache → domain policy pins → IPv6 redirect → IP-network
//! race. Grounded directly on `original_source/core/outbound/dispatcher.go` (`Exchange`,
//! `selectByIPNetwork`, `selectByIPNetwork_alterFirst`) — the most literal translation in this
//! crate, since the ladder order, log tags, and the "defaults to Alternative on no IP match" bias
//! are exact contractual behaviour (§9).

use std::net::IpAddr;
use std::sync::Arc;

use regex::Regex;

use crate::bundle::{BundleResult, RemoteClientBundle};
use crate::cache::Cache;
use crate::coalesce::Coalescer;
use crate::config::{Config, DnsUpstream, PrimaryNoneFallback};
use crate::dns::{Message, RecordType};
use crate::ipset::IpSet;
use crate::local_client::LocalClient;
use crate::matcher::Matcher;
use crate::resolver::{self, Resolver};

pub struct Dispatcher {
    primary_upstreams: Vec<Arc<DnsUpstream>>,
    primary_resolvers: Vec<Arc<dyn Resolver>>,
    alternative_upstreams: Vec<Arc<DnsUpstream>>,
    alternative_resolvers: Vec<Arc<dyn Resolver>>,

    cache: Arc<Cache>,
    coalescer: Arc<Coalescer>,
    local: LocalClient,
    reserved: IpSet,

    ip_network_primary: IpSet,
    ip_network_alternative: IpSet,
    domain_primary: Box<dyn Matcher>,
    domain_alternative: Box<dyn Matcher>,

    minimum_ttl: u32,
    domain_ttl_map: Vec<(Regex, u32)>,

    only_primary_dns: bool,
    redirect_ipv6_record: bool,
    alternative_dns_concurrent: bool,
    alternative_first: bool,
    when_primary_none: PrimaryNoneFallback,
}

/// The ladder's outcome tag, used for query logging (§9, out of scope for formatting itself).
pub type LadderTag = &'static str;

impl Dispatcher {
    pub fn new(
        config: &Config,
        local: LocalClient,
        ip_network_primary: IpSet,
        ip_network_alternative: IpSet,
        domain_primary: Box<dyn Matcher>,
        domain_alternative: Box<dyn Matcher>,
        domain_ttl_map: Vec<(Regex, u32)>,
        cache: Arc<Cache>,
        coalescer: Arc<Coalescer>,
    ) -> crate::error::Result<Dispatcher> {
        let primary_upstreams: Vec<Arc<DnsUpstream>> =
            config.primary_dns.iter().cloned().map(Arc::new).collect();
        let alternative_upstreams: Vec<Arc<DnsUpstream>> = config
            .alternative_dns
            .iter()
            .cloned()
            .map(Arc::new)
            .collect();

        let primary_resolvers = primary_upstreams
            .iter()
            .map(|u| resolver::build_resolver(u).map(Arc::from))
            .collect::<crate::error::Result<Vec<Arc<dyn Resolver>>>>()?;
        let alternative_resolvers = alternative_upstreams
            .iter()
            .map(|u| resolver::build_resolver(u).map(Arc::from))
            .collect::<crate::error::Result<Vec<Arc<dyn Resolver>>>>()?;

        Ok(Dispatcher {
            primary_upstreams,
            primary_resolvers,
            alternative_upstreams,
            alternative_resolvers,
            cache,
            coalescer,
            local,
            reserved: IpSet::reserved(),
            ip_network_primary,
            ip_network_alternative,
            domain_primary,
            domain_alternative,
            minimum_ttl: config.minimum_ttl,
            domain_ttl_map,
            only_primary_dns: config.only_primary_dns,
            redirect_ipv6_record: config.redirect_ipv6_record,
            alternative_dns_concurrent: config.alternative_dns_concurrent,
            alternative_first: config.alternative_first,
            when_primary_none: config.when_primary_dns_answer_none_use,
        })
    }

    fn build_bundle(
        &self,
        upstreams: &[Arc<DnsUpstream>],
        resolvers: &[Arc<dyn Resolver>],
        query: &Message,
        client_ip: IpAddr,
    ) -> Option<RemoteClientBundle> {
        let question = query.question()?;
        Some(RemoteClientBundle::new(
            upstreams,
            resolvers,
            &question.qname.to_lower_fqdn(),
            question.qtype,
            question.qclass.0,
            client_ip,
            &self.reserved,
        ))
    }

    /// Runs the full ladder (§4.9) for one already domain-rewritten query. Returns `None` to
    /// signal SERVFAIL upstream.
    pub async fn dispatch(
        &self,
        query: &Message,
        client_ip: IpAddr,
    ) -> Option<(Message, LadderTag)> {
        let question = query.question()?;
        let qname = question.qname.to_string_no_trailing_dot();
        let qtype = question.qtype;

        // 1. Hosts.
        if let Some(resp) = self.local.lookup(query) {
            return Some((resp, "Hosts"));
        }

        let primary_bundle =
            self.build_bundle(&self.primary_upstreams, &self.primary_resolvers, query, client_ip)?;
        let alternative_bundle = self.build_bundle(
            &self.alternative_upstreams,
            &self.alternative_resolvers,
            query,
            client_ip,
        )?;

        // 2. Cache.
        if let Some(hit) = primary_bundle.exchange_from_cache(&self.cache) {
            return Some((hit, "Cache"));
        }
        if let Some(hit) = alternative_bundle.exchange_from_cache(&self.cache) {
            return Some((hit, "Cache"));
        }

        // 3. Policy pin — Primary.
        if self.only_primary_dns || self.domain_primary.has(&qname) {
            let result = primary_bundle
                .exchange(
                    &self.coalescer,
                    &self.cache,
                    query,
                    true,
                    true,
                    self.minimum_ttl,
                    &self.domain_ttl_map,
                )
                .await?;
            return Some((result.message, "Primary"));
        }

        // 4. Policy pin — Alternative.
        if (qtype == RecordType::AAAA && self.redirect_ipv6_record)
            || self.domain_alternative.has(&qname)
        {
            let result = alternative_bundle
                .exchange(
                    &self.coalescer,
                    &self.cache,
                    query,
                    true,
                    true,
                    self.minimum_ttl,
                    &self.domain_ttl_map,
                )
                .await?;
            return Some((result.message, "Alternative"));
        }

        // 5. IP-network race.
        let (message, tag) = if self.alternative_first {
            self.race_alternative_first(primary_bundle, alternative_bundle, query)
                .await?
        } else {
            self.race_primary_first(primary_bundle, alternative_bundle, query)
                .await?
        };
        Some((message, tag))
    }

    /// §4.9.1.
    async fn race_primary_first(
        &self,
        primary: RemoteClientBundle,
        alternative: RemoteClientBundle,
        query: &Message,
    ) -> Option<(Message, LadderTag)> {
        // Both pools' exchanges cache on success (§4.9.3's `CacheResultIfNeeded` on the winner
        // is equivalently achieved here since caching a losing pool's cacheable answer is
        // harmless and idempotent with any later lookup of that pool).
        let primary_fut = primary.exchange(
            &self.coalescer,
            &self.cache,
            query,
            true,
            true,
            self.minimum_ttl,
            &self.domain_ttl_map,
        );
        let alt_fut = alternative.exchange(
            &self.coalescer,
            &self.cache,
            query,
            true,
            true,
            self.minimum_ttl,
            &self.domain_ttl_map,
        );

        if self.alternative_dns_concurrent {
            let (primary_result, alt_result) = tokio::join!(primary_fut, alt_fut);
            self.select_primary_first(primary_result, Some(alt_result))
                .await
        } else {
            let primary_result = primary_fut.await;
            match self.quick_select_primary_first(&primary_result) {
                QuickDecision::Primary => {
                    primary_result.map(|r| (r.message, "Primary" as LadderTag))
                }
                QuickDecision::NeedAlternative => {
                    let alt_result = alt_fut.await;
                    alt_result.map(|r| (r.message, "Alternative" as LadderTag))
                }
            }
        }
    }

    fn quick_select_primary_first(&self, primary_result: &Option<BundleResult>) -> QuickDecision {
        match primary_result {
            None => self.none_decision(),
            Some(r) if r.message.answers.is_empty() => self.none_decision(),
            Some(r) => match self.ip_decision(&r.message, true) {
                QuickDecision::Primary => QuickDecision::Primary,
                other => other,
            },
        }
    }

    fn none_decision(&self) -> QuickDecision {
        if self.when_primary_none == PrimaryNoneFallback::AlternativeDns {
            QuickDecision::NeedAlternative
        } else {
            QuickDecision::Primary
        }
    }

    /// Checks each A/AAAA record of `message` against the network sets, in order, per §4.9.1/
    /// §9 (`matchZero=true`: an empty set matches everything).
    fn ip_decision(&self, message: &Message, primary_is_first: bool) -> QuickDecision {
        let (own_set, other_set) = if primary_is_first {
            (&self.ip_network_primary, &self.ip_network_alternative)
        } else {
            (&self.ip_network_alternative, &self.ip_network_primary)
        };
        for rr in &message.answers {
            let Some(ip) = rr.ip() else { continue };
            if own_set.contains(ip, true, "own") {
                return QuickDecision::Primary;
            }
            if other_set.contains(ip, true, "other") {
                return QuickDecision::NeedAlternative;
            }
        }
        QuickDecision::NeedAlternative
    }

    async fn select_primary_first(
        &self,
        primary_result: Option<BundleResult>,
        alt_result: Option<Option<BundleResult>>,
    ) -> Option<(Message, LadderTag)> {
        let decision = self.quick_select_primary_first(&primary_result);
        match decision {
            QuickDecision::Primary => primary_result.map(|r| (r.message, "Primary" as LadderTag)),
            QuickDecision::NeedAlternative => {
                let alt = match alt_result {
                    Some(r) => r,
                    None => None,
                };
                alt.map(|r| (r.message, "Alternative" as LadderTag))
            }
        }
    }

    /// §4.9.2: symmetric to §4.9.1 with roles swapped, except the no-match default still favours
    /// Alternative (§9) and the "none answer" fallback check still governs whichever pool plays
    /// the first-read role.
    async fn race_alternative_first(
        &self,
        primary: RemoteClientBundle,
        alternative: RemoteClientBundle,
        query: &Message,
    ) -> Option<(Message, LadderTag)> {
        // See the matching note in `race_primary_first`: both pools cache on success so the
        // winner — whichever it turns out to be — is always cached.
        let alt_fut = alternative.exchange(
            &self.coalescer,
            &self.cache,
            query,
            true,
            true,
            self.minimum_ttl,
            &self.domain_ttl_map,
        );
        let primary_fut = primary.exchange(
            &self.coalescer,
            &self.cache,
            query,
            true,
            true,
            self.minimum_ttl,
            &self.domain_ttl_map,
        );

        if self.alternative_dns_concurrent {
            let (alt_result, primary_result) = tokio::join!(alt_fut, primary_fut);
            return self.finish_alternative_first(alt_result, primary_result);
        }

        let alt_result = alt_fut.await;
        let none_branch = match &alt_result {
            None => true,
            Some(r) => r.message.answers.is_empty(),
        };

        if none_branch {
            if self.when_primary_none != PrimaryNoneFallback::AlternativeDns {
                return alt_result.map(|r| (r.message, "Alternative" as LadderTag));
            }
            let primary_result = primary_fut.await;
            return primary_result.map(|r| (r.message, "AlternativeThenPrimary" as LadderTag));
        }

        let ips: Vec<IpAddr> = alt_result
            .as_ref()
            .unwrap()
            .message
            .answers
            .iter()
            .filter_map(|rr| rr.ip())
            .collect();
        for ip in ips {
            if self.ip_network_alternative.contains(ip, true, "alt") {
                return alt_result.map(|r| (r.message, "Alternative" as LadderTag));
            }
            if self.ip_network_primary.contains(ip, true, "primary") {
                let primary_result = primary_fut.await;
                return primary_result.map(|r| (r.message, "AlternativeThenPrimary" as LadderTag));
            }
        }
        // No match: bias preserved toward Alternative (§9).
        alt_result.map(|r| (r.message, "Alternative" as LadderTag))
    }

    fn finish_alternative_first(
        &self,
        alt_result: Option<BundleResult>,
        primary_result: Option<BundleResult>,
    ) -> Option<(Message, LadderTag)> {
        let none_branch = match &alt_result {
            None => true,
            Some(r) => r.message.answers.is_empty(),
        };
        if none_branch {
            if self.when_primary_none != PrimaryNoneFallback::AlternativeDns {
                return alt_result.map(|r| (r.message, "Alternative" as LadderTag));
            }
            return primary_result.map(|r| (r.message, "AlternativeThenPrimary" as LadderTag));
        }
        for rr in &alt_result.as_ref().unwrap().message.answers {
            let Some(ip) = rr.ip() else { continue };
            if self.ip_network_alternative.contains(ip, true, "alt") {
                return alt_result.map(|r| (r.message, "Alternative" as LadderTag));
            }
            if self.ip_network_primary.contains(ip, true, "primary") {
                return primary_result.map(|r| (r.message, "AlternativeThenPrimary" as LadderTag));
            }
        }
        alt_result.map(|r| (r.message, "Alternative" as LadderTag))
    }
}

enum QuickDecision {
    Primary,
    NeedAlternative,
}
