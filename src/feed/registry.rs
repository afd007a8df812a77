//! Health registry for multi-feed dashboards.
//!
//! A dashboard that watches several endpoints needs one health value per
//! feed, not one shared global. The registry keys each feed's status and
//! latency signals by an identifier chosen by the caller, so the UI can
//! render every connection independently.

use std::time::Duration;

use bon::Builder;
use dashmap::DashMap;
use tokio::sync::watch;

use super::client::Client;
use crate::ws::connection::ConnectionState;

/// Observable signals for one registered feed.
struct FeedEntry {
    status_rx: watch::Receiver<ConnectionState>,
    latency_rx: watch::Receiver<Option<Duration>>,
}

/// Point-in-time health of a registered feed.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct FeedHealth {
    /// Caller-chosen feed identifier
    pub id: String,
    /// Connection state at snapshot time
    pub state: ConnectionState,
    /// Last measured heartbeat round trip, if any
    pub latency: Option<Duration>,
}

/// Registry mapping feed identifiers to their health signals.
#[derive(Default)]
pub struct FeedRegistry {
    feeds: DashMap<String, FeedEntry>,
}

impl FeedRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a feed client under the given identifier.
    ///
    /// Re-registering an identifier replaces the previous entry.
    pub fn register(&self, id: String, client: &Client) {
        self.feeds.insert(
            id,
            FeedEntry {
                status_rx: client.status_receiver(),
                latency_rx: client.latency_receiver(),
            },
        );
    }

    /// Remove a feed from the registry. Returns whether it was present.
    pub fn remove(&self, id: &str) -> bool {
        self.feeds.remove(id).is_some()
    }

    /// Current connection state of a registered feed.
    #[must_use]
    pub fn status(&self, id: &str) -> Option<ConnectionState> {
        self.feeds.get(id).map(|entry| *entry.status_rx.borrow())
    }

    /// Last measured heartbeat round trip of a registered feed.
    #[must_use]
    pub fn latency(&self, id: &str) -> Option<Duration> {
        self.feeds
            .get(id)
            .and_then(|entry| *entry.latency_rx.borrow())
    }

    /// Snapshot the health of every registered feed, sorted by identifier
    /// for stable rendering.
    #[must_use]
    pub fn snapshot(&self) -> Vec<FeedHealth> {
        let mut healths: Vec<FeedHealth> = self
            .feeds
            .iter()
            .map(|entry| FeedHealth {
                id: entry.key().clone(),
                state: *entry.value().status_rx.borrow(),
                latency: *entry.value().latency_rx.borrow(),
            })
            .collect();
        healths.sort_by(|a, b| a.id.cmp(&b.id));
        healths
    }

    /// Number of registered feeds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    /// Whether no feeds are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }
}
