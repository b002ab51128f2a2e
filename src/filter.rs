use std::sync::Arc;
use std::time::Instant;

use crate::classifier::GeographicClassifier;
use crate::event::{FilterResult, StreamEvent};
use crate::metrics::SovereigntyMetrics;

/// Per-event decision adapter for the sovereign feed.
///
/// This is the single fail-safe boundary of the system: without a working
/// classifier attached, every event is excluded. Absence of sovereignty
/// wiring must never read as "include everything".
pub struct SovereignEventFilter {
    classifier: Option<Arc<GeographicClassifier>>,
    metrics: Arc<SovereigntyMetrics>,
    jurisdiction: String,
}

impl SovereignEventFilter {
    pub fn new(
        classifier: Arc<GeographicClassifier>,
        metrics: Arc<SovereigntyMetrics>,
        jurisdiction: impl Into<String>,
    ) -> Self {
        Self {
            classifier: Some(classifier),
            metrics,
            jurisdiction: jurisdiction.into(),
        }
    }

    /// A filter with no classifier attached, as wired when sovereignty is
    /// disabled or its startup failed. Decides `false` unconditionally.
    pub fn unwired(metrics: Arc<SovereigntyMetrics>) -> Self {
        Self {
            classifier: None,
            metrics,
            jurisdiction: "none".to_string(),
        }
    }

    pub fn decide(&self, event: Option<&StreamEvent>) -> bool {
        self.explain(event).pass
    }

    /// Reason-carrying variant of [`decide`](Self::decide)
    pub fn explain(&self, event: Option<&StreamEvent>) -> FilterResult {
        let started = Instant::now();

        let result = match &self.classifier {
            None => FilterResult::filtered("filter_unavailable"),
            Some(classifier) => match event.and_then(StreamEvent::subject) {
                None => FilterResult::filtered("no_subject"),
                Some(_) => {
                    if classifier.should_include(event) {
                        FilterResult::pass("jurisdiction_match")
                    } else {
                        FilterResult::filtered("jurisdiction_mismatch")
                    }
                }
            },
        };

        self.record(&result, started);
        result
    }

    fn record(&self, result: &FilterResult, started: Instant) {
        let outcome = if result.pass { "included" } else { "filtered" };
        self.metrics
            .events_processed
            .with_label_values(&[outcome, &self.jurisdiction])
            .inc();
        self.metrics
            .filter_latency
            .with_label_values(&["geographic"])
            .observe(started.elapsed().as_secs_f64());

        if result.pass {
            self.metrics.included_events.inc();
        } else {
            self.metrics.filtered_events.inc();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SovereignConfig;
    use crate::event::EventKind;

    fn metrics() -> Arc<SovereigntyMetrics> {
        Arc::new(SovereigntyMetrics::new().unwrap())
    }

    fn ca_filter(metrics: Arc<SovereigntyMetrics>) -> SovereignEventFilter {
        let sovereign = SovereignConfig {
            enabled: true,
            country_code: "CA".to_string(),
            ..Default::default()
        };
        SovereignEventFilter::new(
            Arc::new(GeographicClassifier::new(&sovereign)),
            metrics,
            sovereign.jurisdiction(),
        )
    }

    #[test]
    fn unwired_filter_excludes_everything() {
        let filter = SovereignEventFilter::unwired(metrics());
        let event = StreamEvent::new("did:plc:toronto-user", EventKind::Commit, 1);

        assert!(!filter.decide(Some(&event)));
        assert_eq!(filter.explain(Some(&event)).reason, "filter_unavailable");
    }

    #[test]
    fn missing_event_is_excluded_without_error() {
        let filter = ca_filter(metrics());

        assert!(!filter.decide(None));
        assert_eq!(filter.explain(None).reason, "no_subject");
    }

    #[test]
    fn jurisdiction_match_passes_and_is_counted() {
        let m = metrics();
        let filter = ca_filter(m.clone());
        let event = StreamEvent::new("did:plc:toronto-user-123", EventKind::Commit, 1);

        assert!(filter.decide(Some(&event)));
        assert_eq!(m.included_events.get(), 1);
        assert_eq!(
            m.events_processed
                .with_label_values(&["included", "CA"])
                .get(),
            1
        );
    }

    #[test]
    fn jurisdiction_mismatch_is_filtered_and_counted() {
        let m = metrics();
        let filter = ca_filter(m.clone());
        let event = StreamEvent::new("did:plc:american-user", EventKind::Commit, 1);

        assert!(!filter.decide(Some(&event)));
        assert_eq!(m.filtered_events.get(), 1);
        assert_eq!(
            m.events_processed
                .with_label_values(&["filtered", "CA"])
                .get(),
            1
        );
        assert_eq!(filter.explain(Some(&event)).reason, "jurisdiction_mismatch");
    }

    #[test]
    fn latency_histogram_observes_every_decision() {
        let m = metrics();
        let filter = ca_filter(m.clone());
        let event = StreamEvent::new("did:plc:unknown789", EventKind::Identity, 1);

        filter.decide(Some(&event));
        filter.decide(None);

        let sample_count = m
            .filter_latency
            .with_label_values(&["geographic"])
            .get_sample_count();
        assert_eq!(sample_count, 2);
    }
}
