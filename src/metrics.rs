//! Prometheus metrics for the sovereignty filtering pipeline.
//!
//! Every instance owns its own registry, so components receive an injected
//! `Arc<SovereigntyMetrics>` rather than touching process-global state. The
//! binary wires one process-wide instance through [`SovereigntyMetrics::shared`];
//! tests either construct their own instance or reset the shared slot and
//! let it rebuild.

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{Arc, Mutex};

use anyhow::Result;

/// Construct-once slot for the process-wide instance
static SHARED: Lazy<Mutex<Option<Arc<SovereigntyMetrics>>>> = Lazy::new(|| Mutex::new(None));

pub struct SovereigntyMetrics {
    registry: Registry,
    /// Events seen by the sovereign filter, labelled by (result, country)
    pub events_processed: IntCounterVec,
    /// Filtering decision latency, labelled by filter type
    pub filter_latency: HistogramVec,
    /// Live feed connections, labelled by endpoint
    pub active_connections: IntGaugeVec,
    /// Events forwarded on the sovereign feed
    pub included_events: IntCounter,
    /// Events withheld from the sovereign feed
    pub filtered_events: IntCounter,
}

impl SovereigntyMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let events_processed = IntCounterVec::new(
            Opts::new(
                "sovereignty_events_processed_total",
                "Total number of events processed by the sovereignty filter",
            ),
            &["result", "country"],
        )?;
        let filter_latency = HistogramVec::new(
            HistogramOpts::new(
                "sovereignty_filter_latency_seconds",
                "Latency of geographic filtering in seconds",
            ),
            &["filter_type"],
        )?;
        let active_connections = IntGaugeVec::new(
            Opts::new(
                "sovereignty_active_connections",
                "Number of active feed WebSocket connections",
            ),
            &["endpoint"],
        )?;
        let included_events = IntCounter::new(
            "sovereignty_included_events_total",
            "Total number of events sent via the sovereign firehose",
        )?;
        let filtered_events = IntCounter::new(
            "sovereignty_filtered_events_total",
            "Total number of events filtered out by the geographic filter",
        )?;

        registry.register(Box::new(events_processed.clone()))?;
        registry.register(Box::new(filter_latency.clone()))?;
        registry.register(Box::new(active_connections.clone()))?;
        registry.register(Box::new(included_events.clone()))?;
        registry.register(Box::new(filtered_events.clone()))?;

        Ok(Self {
            registry,
            events_processed,
            filter_latency,
            active_connections,
            included_events,
            filtered_events,
        })
    }

    /// The process-wide instance. First call constructs it; every later call
    /// returns the identical instance.
    pub fn shared() -> Arc<SovereigntyMetrics> {
        let mut slot = SHARED.lock().expect("sovereignty metrics lock poisoned");
        slot.get_or_insert_with(|| {
            Arc::new(Self::new().expect("Failed to register sovereignty metrics"))
        })
        .clone()
    }

    /// Discards the shared instance so the next [`shared`](Self::shared) call
    /// builds a fresh one. Each instance owns its registry, so rebuilding
    /// never trips duplicate-registration errors across test runs.
    pub fn reset_shared_for_testing() {
        let mut slot = SHARED.lock().expect("sovereignty metrics lock poisoned");
        *slot = None;
    }

    /// Gather this instance's metrics in Prometheus text format
    pub fn gather(&self) -> Result<String> {
        let mut buffer = vec![];
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode(&metric_families, &mut buffer)?;

        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn shared_returns_the_same_instance() {
        SovereigntyMetrics::reset_shared_for_testing();

        let first = SovereigntyMetrics::shared();
        let second = SovereigntyMetrics::shared();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    #[serial]
    fn reset_allows_reconstruction() {
        SovereigntyMetrics::reset_shared_for_testing();
        let first = SovereigntyMetrics::shared();

        SovereigntyMetrics::reset_shared_for_testing();
        let second = SovereigntyMetrics::shared();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn gather_includes_registered_metrics() {
        let metrics = SovereigntyMetrics::new().unwrap();
        metrics
            .events_processed
            .with_label_values(&["included", "CA"])
            .inc();
        metrics.included_events.inc();

        let text = metrics.gather().unwrap();
        assert!(text.contains("sovereignty_events_processed_total"));
        assert!(text.contains("sovereignty_included_events_total"));
    }

    #[test]
    fn independent_instances_do_not_share_counters() {
        let a = SovereigntyMetrics::new().unwrap();
        let b = SovereigntyMetrics::new().unwrap();

        a.filtered_events.inc();
        assert_eq!(a.filtered_events.get(), 1);
        assert_eq!(b.filtered_events.get(), 0);
    }
}
