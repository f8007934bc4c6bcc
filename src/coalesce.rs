//! Request coalescer (§4.6): at most one outbound exchange in flight per coalescing key, with
//! every concurrent caller observing the same result.
//!
//! Grounded on `original_source/core/outbound/clients/remote.go`'s `sync.Map.LoadOrStore` +
//! per-client-mutex single-flight pattern, re-expressed per §9's design note as a
//! `DashMap<Key, Arc<OnceCell<Option<Message>>>>` — a functionally equivalent single-flight
//! primitive, idiomatic for a tokio codebase the way `src/graceful_shutdown.rs` leans on
//! `tokio::sync` primitives rather than hand-rolled locking.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;

use crate::dns::Message;

/// (qname, qtype, ECS IP, upstream name) — §3/§4.6.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CoalesceKey(String);

impl CoalesceKey {
    pub fn build(qname: &str, qtype: u16, ecs_ip: &str, upstream_name: &str) -> CoalesceKey {
        CoalesceKey(format!(
            "{}|{}|{}|{}",
            qname.trim_end_matches('.').to_ascii_lowercase(),
            qtype,
            ecs_ip,
            upstream_name
        ))
    }
}

type Slot = Arc<OnceCell<Option<Message>>>;

/// Process-wide in-flight registry. An entry exists only for the duration of one exchange.
#[derive(Default)]
pub struct Coalescer {
    inflight: DashMap<CoalesceKey, Slot>,
}

impl Coalescer {
    pub fn new() -> Coalescer {
        Coalescer::default()
    }

    /// Returns `(slot, is_owner)`. The owner must call `exchange_fn` and then `Coalescer::settle`
    /// with the result; waiters (`is_owner == false`) must instead `.wait(&slot).await`.
    fn register(&self, key: CoalesceKey) -> (Slot, bool) {
        match self.inflight.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(e) => (e.get().clone(), false),
            dashmap::mapref::entry::Entry::Vacant(e) => {
                let slot: Slot = Arc::new(OnceCell::new());
                e.insert(slot.clone());
                (slot, true)
            }
        }
    }

    /// Runs `exchange_fn` exactly once per key among all concurrent callers; every caller
    /// (owner and waiters alike) receives the same `Option<Message>`.
    ///
    /// Every caller for a given key — not just the one that happens to win the DashMap
    /// insert race — passes its own real `exchange_fn`. This matters: `OnceCell::get_or_init`
    /// only guarantees that *one* caller's closure runs while the rest wait for it, not that
    /// the first caller's closure is the one chosen. Handing the owner a dummy "return None"
    /// closure and only the registering caller the real one would let a waiter's dummy closure
    /// win that race and poison the slot before the real exchange ever runs. Since every caller
    /// here builds an equivalent real closure against the same upstream, it never matters which
    /// one actually executes.
    pub async fn coalesce<F, Fut>(&self, key: CoalesceKey, exchange_fn: F) -> Option<Message>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Option<Message>>,
    {
        let (slot, is_owner) = self.register(key.clone());
        let result = slot.get_or_init(exchange_fn).await.clone();
        if is_owner {
            self.inflight.remove(&key);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_identical_keys_exchange_once() {
        let coalescer = Arc::new(Coalescer::new());
        let exchanges = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let coalescer = coalescer.clone();
            let exchanges = exchanges.clone();
            handles.push(tokio::spawn(async move {
                coalescer
                    .coalesce(
                        CoalesceKey::build("a.test", 1, "", "primary-1"),
                        || async move {
                            exchanges.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            None
                        },
                    )
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(exchanges.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_keys_each_exchange() {
        let coalescer = Coalescer::new();
        let exchanges = AtomicUsize::new(0);
        coalescer
            .coalesce(CoalesceKey::build("a.test", 1, "", "p"), || async {
                exchanges.fetch_add(1, Ordering::SeqCst);
                None
            })
            .await;
        coalescer
            .coalesce(CoalesceKey::build("b.test", 1, "", "p"), || async {
                exchanges.fetch_add(1, Ordering::SeqCst);
                None
            })
            .await;
        assert_eq!(exchanges.load(Ordering::SeqCst), 2);
    }
}
