use std::sync::Arc;
use tokio::sync::broadcast;

use crate::auth::FeedAuthenticator;
use crate::config::Config;
use crate::event::StreamEvent;
use crate::feeds::RouteTable;
use crate::filter::SovereignEventFilter;
use crate::metrics::SovereigntyMetrics;

/// Events buffered per subscriber before a slow consumer starts lagging.
/// Lag drops only that subscriber's backlog; other connections are
/// unaffected.
const FEED_CHANNEL_CAPACITY: usize = 1024;

/// Shared dependencies handed to every connection task
#[derive(Clone)]
pub struct RelayContext {
    pub config: Arc<Config>,
    pub filter: Arc<SovereignEventFilter>,
    pub authenticator: Arc<FeedAuthenticator>,
    pub metrics: Arc<SovereigntyMetrics>,
    pub routes: Arc<RouteTable>,
    feed_tx: broadcast::Sender<Arc<StreamEvent>>,
}

impl RelayContext {
    pub fn new(
        config: Arc<Config>,
        filter: Arc<SovereignEventFilter>,
        authenticator: Arc<FeedAuthenticator>,
        metrics: Arc<SovereigntyMetrics>,
        routes: Arc<RouteTable>,
    ) -> Self {
        let (feed_tx, _) = broadcast::channel(FEED_CHANNEL_CAPACITY);
        Self {
            config,
            filter,
            authenticator,
            metrics,
            routes,
            feed_tx,
        }
    }

    /// Ingestion point for the upstream event sequence. Returns the number
    /// of subscribers the event was fanned out to; publishing with no
    /// subscribers is not an error.
    pub fn publish(&self, event: StreamEvent) -> usize {
        self.feed_tx.send(Arc::new(event)).unwrap_or(0)
    }

    /// An isolated per-connection receiver over the shared event source
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<StreamEvent>> {
        self.feed_tx.subscribe()
    }
}
