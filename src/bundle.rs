//! Remote client bundle: parallel fan-out across one pool's resolvers (§4.8).
//!
//! Grounded on `original_source/core/outbound/clients/remote_bundle.go` — the three-tier grading
//! loop, fallback precedence, post-selection TTL policy, and caching.

use std::net::IpAddr;
use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use regex::Regex;

use crate::cache::{Cache, CacheKey};
use crate::client::RemoteClient;
use crate::coalesce::Coalescer;
use crate::config::DnsUpstream;
use crate::dns::{Message, RecordType};
use crate::ipset::IpSet;
use crate::resolver::Resolver;

enum Graded {
    Elected(Message),
    Tier1(Message),
    Tier2(Message),
    None,
}

fn grade(response: Option<Message>, qtype: RecordType) -> Graded {
    let Some(message) = response else {
        return Graded::None;
    };
    if message.has_answer_of_type(qtype) {
        Graded::Elected(message)
    } else if message.has_answers() || message.has_soa_in_authority() {
        Graded::Tier1(message)
    } else {
        Graded::Tier2(message)
    }
}

/// Result of a bundle exchange: the chosen response plus metadata needed by the dispatcher.
pub struct BundleResult {
    pub message: Message,
    pub is_type: bool,
    pub first_question_domain: String,
}

pub struct RemoteClientBundle {
    clients: Vec<RemoteClient>,
    qtype: RecordType,
    qclass: u16,
    qname: String,
}

impl RemoteClientBundle {
    pub fn new(
        upstreams: &[Arc<DnsUpstream>],
        resolvers: &[Arc<dyn Resolver>],
        qname: &str,
        qtype: RecordType,
        qclass: u16,
        client_ip: IpAddr,
        reserved: &IpSet,
    ) -> RemoteClientBundle {
        let clients = upstreams
            .iter()
            .zip(resolvers.iter())
            .map(|(up, res)| {
                RemoteClient::new(
                    up.clone(),
                    res.clone(),
                    qname,
                    qtype.value(),
                    client_ip,
                    reserved,
                )
            })
            .collect();
        RemoteClientBundle {
            clients,
            qtype,
            qclass,
            qname: qname.to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// §4.8 `exchangeFromCache`: first cache hit across the pool's clients wins.
    pub fn exchange_from_cache(&self, cache: &Cache) -> Option<Message> {
        self.clients
            .iter()
            .find_map(|c| c.exchange_from_cache(cache, self.qclass))
    }

    /// §4.8 full parallel exchange: fan out across every client in the pool concurrently (via
    /// `FuturesUnordered`, so the first "elected" answer to arrive short-circuits selection while
    /// the remaining clients keep running to completion in the background and are discarded),
    /// grade, select, apply TTL policy, and cache.
    pub async fn exchange(
        &self,
        coalescer: &Coalescer,
        cache: &Cache,
        query: &Message,
        cache_on_success: bool,
        log: bool,
        minimum_ttl: u32,
        domain_ttl_map: &[(Regex, u32)],
    ) -> Option<BundleResult> {
        if self.clients.is_empty() {
            return None;
        }

        let mut inflight: FuturesUnordered<_> = self
            .clients
            .iter()
            .map(|client| {
                let query = query.clone();
                let ecs_label = client.cache_ecs_label();
                async move {
                    (
                        ecs_label,
                        grade(client.exchange(coalescer, query, log).await, self.qtype),
                    )
                }
            })
            .collect();

        let mut tier1 = None;
        let mut tier2 = None;
        while let Some((ecs_label, graded)) = inflight.next().await {
            match graded {
                Graded::Elected(m) => {
                    // Remaining futures in `inflight` are dropped here, per §4.8/§5: they were
                    // polled to this point and are allowed to finish naturally if already
                    // spawned by their resolver, but their results are discarded.
                    return Some(self.post_process(
                        m,
                        &ecs_label,
                        cache,
                        cache_on_success,
                        minimum_ttl,
                        domain_ttl_map,
                        true,
                    ));
                }
                Graded::Tier1(m) if tier1.is_none() => tier1 = Some((ecs_label, m)),
                Graded::Tier2(m) if tier2.is_none() => tier2 = Some((ecs_label, m)),
                _ => {}
            }
        }

        let (ecs_label, message, is_type) = match (tier1, tier2) {
            (Some((label, m)), _) => (label, m, false),
            (None, Some((label, m))) => (label, m, false),
            (None, None) => return None,
        };
        Some(self.post_process(
            message,
            &ecs_label,
            cache,
            cache_on_success,
            minimum_ttl,
            domain_ttl_map,
            is_type,
        ))
    }

    fn post_process(
        &self,
        mut message: Message,
        ecs_label: &str,
        cache: &Cache,
        cache_on_success: bool,
        minimum_ttl: u32,
        domain_ttl_map: &[(Regex, u32)],
        is_type: bool,
    ) -> BundleResult {
        for rr in message.answers.iter_mut() {
            if rr.ttl < minimum_ttl {
                rr.ttl = minimum_ttl;
            }
            let name = rr.name.to_string_no_trailing_dot();
            for (pattern, ttl) in domain_ttl_map {
                if pattern.is_match(&name) {
                    rr.ttl = *ttl;
                }
            }
        }
        if cache_on_success && Cache::is_cacheable(&message) {
            let key = CacheKey::build(&self.qname, self.qtype, self.qclass, ecs_label);
            cache.insert(key, message.clone(), minimum_ttl);
        }
        BundleResult {
            message,
            is_type,
            first_question_domain: self.qname.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_picks_elected_over_tier1() {
        use crate::dns::{Name, Question, RData, Record, RecordClass};
        let mut m = Message::query(
            1,
            Question {
                qname: Name::from_str_lossy("x.test"),
                qtype: RecordType::A,
                qclass: RecordClass::IN,
            },
        );
        m.answers.push(Record {
            name: Name::from_str_lossy("x.test"),
            rtype: RecordType::A,
            rclass: RecordClass::IN,
            ttl: 60,
            rdata: RData::A("1.2.3.4".parse().unwrap()),
        });
        assert!(matches!(grade(Some(m), RecordType::A), Graded::Elected(_)));
    }

    #[test]
    fn grade_picks_tier2_for_bare_noerror() {
        use crate::dns::{Name, Question, RecordClass};
        let m = Message::query(
            1,
            Question {
                qname: Name::from_str_lossy("x.test"),
                qtype: RecordType::A,
                qclass: RecordClass::IN,
            },
        );
        assert!(matches!(grade(Some(m), RecordType::A), Graded::Tier2(_)));
    }

    #[test]
    fn grade_none_on_resolver_failure() {
        assert!(matches!(grade(None, RecordType::A), Graded::None));
    }
}
