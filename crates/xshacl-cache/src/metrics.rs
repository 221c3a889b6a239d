//! Prometheus metrics for the explanation cache
//!
//! - `xshacl_cache_lookups_total` (counter) - lookups by result (hit, miss, coalesced)
//! - `xshacl_cache_generations_total` (counter) - generator calls by result
//! - `xshacl_cache_generation_duration_seconds` (histogram) - generator latency
//! - `xshacl_cache_store_errors_total` (counter) - store failures by operation
//! - `xshacl_cache_inflight_generations` (gauge) - generator calls in progress

use prometheus::{CounterVec, Gauge, Histogram, HistogramOpts, Opts, Registry};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

const NAMESPACE: &str = "xshacl_cache";

/// Metrics setup errors
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Metrics error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("Metrics encoding error: {0}")]
    Encoding(String),
}

/// Cache metrics
#[derive(Clone)]
pub struct CacheMetrics {
    lookups_total: CounterVec,
    generations_total: CounterVec,
    generation_duration_seconds: Histogram,
    store_errors_total: CounterVec,
    inflight_generations: Gauge,
}

impl CacheMetrics {
    /// Create the metrics and register them with `registry`
    pub fn new(registry: &Registry) -> Result<Self, MetricsError> {
        let lookups_total = CounterVec::new(
            Opts::new("lookups_total", "Explanation lookups by result").namespace(NAMESPACE),
            &["result"],
        )?;

        let generations_total = CounterVec::new(
            Opts::new("generations_total", "Generator invocations by result").namespace(NAMESPACE),
            &["result"],
        )?;

        let generation_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "generation_duration_seconds",
                "Generator call duration in seconds",
            )
            .namespace(NAMESPACE)
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        )?;

        let store_errors_total = CounterVec::new(
            Opts::new("store_errors_total", "Store failures by operation").namespace(NAMESPACE),
            &["operation"],
        )?;

        let inflight_generations = Gauge::with_opts(
            Opts::new("inflight_generations", "Generator calls currently in progress")
                .namespace(NAMESPACE),
        )?;

        registry.register(Box::new(lookups_total.clone()))?;
        registry.register(Box::new(generations_total.clone()))?;
        registry.register(Box::new(generation_duration_seconds.clone()))?;
        registry.register(Box::new(store_errors_total.clone()))?;
        registry.register(Box::new(inflight_generations.clone()))?;

        Ok(Self {
            lookups_total,
            generations_total,
            generation_duration_seconds,
            store_errors_total,
            inflight_generations,
        })
    }

    pub fn record_hit(&self) {
        self.lookups_total.with_label_values(&["hit"]).inc();
    }

    pub fn record_miss(&self) {
        self.lookups_total.with_label_values(&["miss"]).inc();
    }

    pub fn record_coalesced(&self) {
        self.lookups_total.with_label_values(&["coalesced"]).inc();
    }

    pub fn record_generation(&self, success: bool) {
        let result = if success { "success" } else { "failure" };
        self.generations_total.with_label_values(&[result]).inc();
    }

    /// Record a store failure for `read`, `write` or `relation`
    pub fn record_store_error(&self, operation: &str) {
        self.store_errors_total.with_label_values(&[operation]).inc();
    }

    pub fn lookups(&self, result: &str) -> u64 {
        self.lookups_total.with_label_values(&[result]).get() as u64
    }

    pub fn generations(&self, result: &str) -> u64 {
        self.generations_total.with_label_values(&[result]).get() as u64
    }

    pub fn store_errors(&self, operation: &str) -> u64 {
        self.store_errors_total.with_label_values(&[operation]).get() as u64
    }

    /// Start a generation timer (records duration and in-flight count on drop)
    pub fn start_generation(&self) -> GenerationTimer<'_> {
        self.inflight_generations.inc();
        GenerationTimer {
            start: Instant::now(),
            metrics: self,
        }
    }
}

/// RAII guard for timing generator calls
pub struct GenerationTimer<'a> {
    start: Instant,
    metrics: &'a CacheMetrics,
}

impl GenerationTimer<'_> {
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Drop for GenerationTimer<'_> {
    fn drop(&mut self) {
        self.metrics
            .generation_duration_seconds
            .observe(self.start.elapsed().as_secs_f64());
        self.metrics.inflight_generations.dec();
    }
}

/// Registry owning the cache metrics
pub struct CacheMetricsRegistry {
    registry: Arc<Registry>,
    cache: CacheMetrics,
}

impl CacheMetricsRegistry {
    /// Create a new metrics registry
    pub fn new() -> Result<Self, MetricsError> {
        Self::with_registry(Arc::new(Registry::new()))
    }

    /// Create with an existing Prometheus registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self, MetricsError> {
        let cache = CacheMetrics::new(&registry)?;
        Ok(Self { registry, cache })
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    pub fn cache(&self) -> &CacheMetrics {
        &self.cache
    }

    /// Gather all metrics in Prometheus format
    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// Encode metrics as text for scraping
    pub fn encode_text(&self) -> Result<String, MetricsError> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.gather(), &mut buffer)
            .map_err(|e| MetricsError::Encoding(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Encoding(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_counters() {
        let registry = CacheMetricsRegistry::new().unwrap();
        let metrics = registry.cache();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_miss();
        metrics.record_coalesced();

        assert_eq!(metrics.lookups("hit"), 2);
        assert_eq!(metrics.lookups("miss"), 1);
        assert_eq!(metrics.lookups("coalesced"), 1);
    }

    #[test]
    fn test_generation_timer_tracks_inflight() {
        let registry = CacheMetricsRegistry::new().unwrap();
        let metrics = registry.cache();
        {
            let _timer = metrics.start_generation();
            assert_eq!(metrics.inflight_generations.get(), 1.0);
        }
        assert_eq!(metrics.inflight_generations.get(), 0.0);
        assert_eq!(metrics.generation_duration_seconds.get_sample_count(), 1);
    }

    #[test]
    fn test_encode_text() {
        let registry = CacheMetricsRegistry::new().unwrap();
        registry.cache().record_generation(true);
        registry.cache().record_store_error("write");

        let text = registry.encode_text().unwrap();
        assert!(text.contains("xshacl_cache_generations_total{result=\"success\"} 1"));
        assert!(text.contains("xshacl_cache_store_errors_total{operation=\"write\"} 1"));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = Registry::new();
        CacheMetrics::new(&registry).unwrap();
        assert!(CacheMetrics::new(&registry).is_err());
    }
}
