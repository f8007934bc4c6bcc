//! ECS-aware, TTL-bounded answer cache (§4.5).
//!
//! Grounded on `src/cache/unified.rs`'s `DashMap<Key, Arc<Entry>>` hot-cache shape with a
//! `parking_lot`-guarded LRU order list, and `original_source/core/common/common.go`'s
//! `IsEmptyAndNoSOA` non-cacheability rule plus `SetMinimumTTL`/`SetTTLByMap` semantics.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::dns::{Message, RecordType};

/// Canonical cache key: qname (lowercase, trailing dot) | qtype | qclass | ECS IP (§3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn build(qname: &str, qtype: RecordType, qclass: u16, ecs_ip: &str) -> CacheKey {
        CacheKey(format!(
            "{}|{}|{}|{}",
            qname.trim_end_matches('.').to_ascii_lowercase(),
            qtype.value(),
            qclass,
            ecs_ip
        ))
    }
}

struct Entry {
    message: Message,
    stored_at: Instant,
    /// The minimum of all Answer-record TTLs at insertion time, post minimum-TTL/TTL-map
    /// processing — used to compute remaining TTL on read.
    ttl: u32,
}

/// Bounded-capacity, LRU-evicted answer cache. Capacity 0 disables caching entirely (§4.5).
pub struct Cache {
    capacity: usize,
    entries: DashMap<CacheKey, Entry>,
    lru_order: Mutex<VecDeque<CacheKey>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// A cache hit, with TTLs already decremented by elapsed wall-clock time.
pub struct CacheHit {
    pub message: Message,
}

impl Cache {
    pub fn new(capacity: usize) -> Cache {
        Cache {
            capacity,
            entries: DashMap::new(),
            lru_order: Mutex::new(VecDeque::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.capacity == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// §4.5: a response with no Answer records and no SOA in Authority is a non-authoritative
    /// "no data" answer and must never be cached.
    pub fn is_cacheable(message: &Message) -> bool {
        message.has_answers() || message.has_soa_in_authority()
    }

    pub fn get(&self, key: &CacheKey) -> Option<CacheHit> {
        if self.is_disabled() {
            return None;
        }
        let Some(entry) = self.entries.get(key) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        let elapsed = entry.stored_at.elapsed().as_secs() as u32;
        if elapsed >= entry.ttl {
            drop(entry);
            self.entries.remove(key);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        let remaining = entry.ttl - elapsed;
        let mut message = entry.message.clone();
        for rr in message
            .answers
            .iter_mut()
            .chain(message.authorities.iter_mut())
        {
            rr.ttl = rr.ttl.saturating_sub(elapsed).min(remaining);
        }
        drop(entry);
        self.touch(key);
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(CacheHit { message })
    }

    /// Inserts `message` under `key`, clamping every Answer TTL below `minimum_ttl` up to the
    /// floor first. No-op if the cache is disabled or the message is non-cacheable (§4.5).
    pub fn insert(&self, key: CacheKey, mut message: Message, minimum_ttl: u32) {
        if self.is_disabled() || !Self::is_cacheable(&message) {
            return;
        }
        for rr in message.answers.iter_mut() {
            if rr.ttl < minimum_ttl {
                rr.ttl = minimum_ttl;
            }
        }
        let ttl = message
            .answers
            .iter()
            .map(|r| r.ttl)
            .min()
            .unwrap_or(minimum_ttl.max(1));
        self.entries.insert(
            key.clone(),
            Entry {
                message,
                stored_at: Instant::now(),
                ttl: ttl.max(1),
            },
        );
        self.evict_if_needed(key);
    }

    fn touch(&self, key: &CacheKey) {
        let mut order = self.lru_order.lock();
        if let Some(pos) = order.iter().position(|k| k == key) {
            order.remove(pos);
        }
        order.push_back(key.clone());
    }

    fn evict_if_needed(&self, inserted: CacheKey) {
        let mut order = self.lru_order.lock();
        if let Some(pos) = order.iter().position(|k| *k == inserted) {
            order.remove(pos);
        }
        order.push_back(inserted);
        while order.len() > self.capacity {
            if let Some(oldest) = order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Diagnostic snapshot for the `/cache` debug endpoint (§6.5).
    pub fn dump(&self, include_bodies: bool) -> (serde_json::Value, usize) {
        let mut body = serde_json::Map::new();
        if include_bodies {
            for entry in self.entries.iter() {
                let records: Vec<serde_json::Value> = entry
                    .message
                    .answers
                    .iter()
                    .map(|r| {
                        serde_json::json!({
                            "name": r.name.to_lower_fqdn(),
                            "ttl": r.ttl,
                            "type": r.rtype.value(),
                            "rdata": format!("{:?}", r.rdata),
                        })
                    })
                    .collect();
                body.insert(entry.key().0.clone(), serde_json::Value::Array(records));
            }
        }
        (serde_json::Value::Object(body), self.entries.len())
    }

    pub fn uptime_since(start: Instant) -> Duration {
        start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{Name, RData, RecordClass, Record};

    fn noerror_message(ttl: u32) -> Message {
        let mut m = Message::query(
            1,
            crate::dns::Question {
                qname: Name::from_str_lossy("example.com"),
                qtype: RecordType::A,
                qclass: RecordClass::IN,
            },
        );
        m.qr = true;
        m.answers.push(Record {
            name: Name::from_str_lossy("example.com"),
            rtype: RecordType::A,
            rclass: RecordClass::IN,
            ttl,
            rdata: RData::A("1.2.3.4".parse().unwrap()),
        });
        m
    }

    #[test]
    fn disabled_cache_is_noop() {
        let cache = Cache::new(0);
        let key = CacheKey::build("example.com", RecordType::A, 1, "");
        cache.insert(key.clone(), noerror_message(300), 0);
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn insert_then_get_within_ttl_hits() {
        let cache = Cache::new(10);
        let key = CacheKey::build("example.com", RecordType::A, 1, "");
        cache.insert(key.clone(), noerror_message(300), 0);
        let hit = cache.get(&key).expect("expected cache hit");
        assert_eq!(hit.message.answers.len(), 1);
    }

    #[test]
    fn empty_noerror_without_soa_is_not_cached() {
        let cache = Cache::new(10);
        let key = CacheKey::build("empty.test", RecordType::A, 1, "");
        let mut m = Message::query(
            1,
            crate::dns::Question {
                qname: Name::from_str_lossy("empty.test"),
                qtype: RecordType::A,
                qclass: RecordClass::IN,
            },
        );
        m.qr = true;
        cache.insert(key.clone(), m, 0);
        assert!(cache.get(&key).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn minimum_ttl_raises_low_ttl_answers() {
        let cache = Cache::new(10);
        let key = CacheKey::build("example.com", RecordType::A, 1, "");
        cache.insert(key.clone(), noerror_message(5), 60);
        let hit = cache.get(&key).unwrap();
        assert!(hit.message.answers[0].ttl >= 59);
    }

    #[test]
    fn lru_eviction_drops_oldest_at_capacity() {
        let cache = Cache::new(1);
        let k1 = CacheKey::build("a.test", RecordType::A, 1, "");
        let k2 = CacheKey::build("b.test", RecordType::A, 1, "");
        cache.insert(k1.clone(), noerror_message(300), 0);
        cache.insert(k2.clone(), noerror_message(300), 0);
        assert!(cache.get(&k1).is_none());
        assert!(cache.get(&k2).is_some());
    }
}
