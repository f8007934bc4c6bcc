//! Prometheus metrics, pruned from `src/metrics.rs`'s `Registry` + typed-collector-fields
//! pattern down to the counters/histograms the ambient-stack section of SPEC_FULL.md calls for:
//! queries by ladder tag, per-upstream resolve latency, and cache occupancy.

use prometheus::{opts, CounterVec, Encoder, HistogramVec, IntGauge, Registry, TextEncoder};

pub struct ForwarderMetrics {
    registry: Registry,

    /// Queries by inbound protocol (udp/tcp) and ladder outcome tag (Hosts/Cache/Primary/...).
    queries_total: CounterVec,
    query_duration: HistogramVec,

    /// Per-upstream exchange outcomes and latency (§4.7/§4.8).
    upstream_exchanges: CounterVec,
    upstream_duration: HistogramVec,

    cache_size: IntGauge,
    cache_hits: CounterVec,

    blocked_queries: CounterVec,
}

impl ForwarderMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let queries_total = CounterVec::new(
            opts!("forwarder_queries_total", "Inbound queries by protocol and ladder tag"),
            &["protocol", "tag"],
        )?;
        let query_duration = HistogramVec::new(
            prometheus::histogram_opts!(
                "forwarder_query_duration_seconds",
                "End-to-end inbound query latency"
            ),
            &["protocol"],
        )?;
        let upstream_exchanges = CounterVec::new(
            opts!("forwarder_upstream_exchanges_total", "Upstream exchanges by outcome"),
            &["upstream", "outcome"],
        )?;
        let upstream_duration = HistogramVec::new(
            prometheus::histogram_opts!(
                "forwarder_upstream_duration_seconds",
                "Per-upstream exchange latency"
            ),
            &["upstream"],
        )?;
        let cache_size = IntGauge::new("forwarder_cache_size", "Current cache entry count")?;
        let cache_hits = CounterVec::new(
            opts!("forwarder_cache_lookups_total", "Cache lookups by result"),
            &["result"],
        )?;
        let blocked_queries = CounterVec::new(
            opts!("forwarder_blocked_queries_total", "Queries blocked by reason"),
            &["reason"],
        )?;

        registry.register(Box::new(queries_total.clone()))?;
        registry.register(Box::new(query_duration.clone()))?;
        registry.register(Box::new(upstream_exchanges.clone()))?;
        registry.register(Box::new(upstream_duration.clone()))?;
        registry.register(Box::new(cache_size.clone()))?;
        registry.register(Box::new(cache_hits.clone()))?;
        registry.register(Box::new(blocked_queries.clone()))?;

        Ok(ForwarderMetrics {
            registry,
            queries_total,
            query_duration,
            upstream_exchanges,
            upstream_duration,
            cache_size,
            cache_hits,
            blocked_queries,
        })
    }

    pub fn record_query(&self, protocol: &str, tag: &str, duration_secs: f64) {
        self.queries_total.with_label_values(&[protocol, tag]).inc();
        self.query_duration.with_label_values(&[protocol]).observe(duration_secs);
    }

    pub fn record_upstream_exchange(&self, upstream: &str, outcome: &str, duration_secs: f64) {
        self.upstream_exchanges
            .with_label_values(&[upstream, outcome])
            .inc();
        self.upstream_duration
            .with_label_values(&[upstream])
            .observe(duration_secs);
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.cache_hits.with_label_values(&[result]).inc();
    }

    pub fn set_cache_size(&self, size: i64) {
        self.cache_size.set(size);
    }

    pub fn record_blocked(&self, reason: &str) {
        self.blocked_queries.with_label_values(&[reason]).inc();
    }

    pub fn encode(&self) -> Result<Vec<u8>, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_encodes_without_error() {
        let metrics = ForwarderMetrics::new().unwrap();
        metrics.record_query("udp", "Cache", 0.001);
        metrics.record_upstream_exchange("primary-1", "ok", 0.01);
        metrics.record_cache_lookup(true);
        metrics.set_cache_size(5);
        metrics.record_blocked("domain");
        let encoded = metrics.encode().unwrap();
        assert!(!encoded.is_empty());
    }
}
