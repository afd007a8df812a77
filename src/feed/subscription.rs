#![expect(
    clippy::module_name_repetitions,
    reason = "Subscription types deliberately include the module name for clarity"
)]

use std::collections::HashSet;
use std::sync::Arc;

use async_stream::try_stream;
use dashmap::{DashMap, Entry};
use futures::Stream;
use tokio::sync::broadcast::error::RecvError;

use super::types::request::FeedRequest;
use super::types::response::{FeedMessage, parse_messages};
use crate::Result;
use crate::ws::ConnectionManager;
use crate::ws::connection::ConnectionState;
use crate::ws::error::WsError;

/// Parser for combined-stream feed frames.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct FeedParser;

impl crate::ws::traits::MessageParser<FeedMessage> for FeedParser {
    fn parse(&self, bytes: &[u8]) -> Result<Vec<FeedMessage>> {
        parse_messages(bytes)
    }
}

/// Manages active stream subscriptions and routes messages to subscribers.
#[derive(Debug)]
pub struct SubscriptionManager {
    connection: ConnectionManager<FeedMessage, FeedParser>,
    /// Subscribed stream names with reference counts (for multiplexing)
    subscribed_streams: DashMap<String, usize>,
}

impl SubscriptionManager {
    /// Create a new subscription manager.
    #[must_use]
    pub fn new(connection: ConnectionManager<FeedMessage, FeedParser>) -> Self {
        Self {
            connection,
            subscribed_streams: DashMap::new(),
        }
    }

    /// Start the handler that (re-)sends subscription requests whenever the
    /// connection reaches the connected state.
    ///
    /// This covers both recovery after a reconnect and streams requested
    /// while the socket was still connecting, whose initial requests were
    /// dropped by the send-only-when-open rule.
    pub fn start_reconnection_handler(self: &Arc<Self>) {
        let this = Arc::clone(self);

        tokio::spawn(async move {
            let mut state_rx = this.connection.state_receiver();

            loop {
                // Wait for next state change
                if state_rx.changed().await.is_err() {
                    // Channel closed, connection manager is gone
                    break;
                }

                let state = *state_rx.borrow_and_update();

                match state {
                    ConnectionState::Connected { .. } => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!("feed connected, establishing subscriptions");
                        this.resubscribe_all();
                    }
                    ConnectionState::Disconnected => {
                        // Connection permanently closed
                        break;
                    }
                    _ => {
                        // Other states are no-op
                    }
                }
            }
        });
    }

    /// Re-send subscription requests for all tracked streams.
    fn resubscribe_all(&self) {
        let streams: Vec<String> = self
            .subscribed_streams
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        if streams.is_empty() {
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(count = streams.len(), "subscribing to feed streams");

        let request = FeedRequest::subscribe(streams);
        if let Err(e) = self.connection.send(&request) {
            #[cfg(feature = "tracing")]
            tracing::warn!(%e, "failed to subscribe to feed streams");
            #[cfg(not(feature = "tracing"))]
            let _: &crate::error::Error = &e;
        }
    }

    /// Subscribe to the given stream names.
    ///
    /// Streams already held by another subscriber are multiplexed: no new
    /// request goes to the server, only the reference count grows.
    pub fn subscribe(
        &self,
        streams: Vec<String>,
    ) -> Result<impl Stream<Item = Result<FeedMessage>>> {
        if streams.is_empty() {
            return Err(WsError::SubscriptionFailed(
                "at least one stream name is required".to_owned(),
            )
            .into());
        }

        for stream in &streams {
            // Using the Entry API to atomically check and update, with the
            // send inside the guard to prevent a TOCTOU race between the
            // refcount check and the network send
            match self.subscribed_streams.entry(stream.clone()) {
                Entry::Occupied(mut entry) => {
                    *entry.get_mut() += 1;
                    #[cfg(feature = "tracing")]
                    tracing::debug!(%stream, "stream already subscribed, multiplexing");
                }
                Entry::Vacant(entry) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(%stream, "subscribing to stream");

                    let request = FeedRequest::subscribe(vec![stream.clone()]);
                    self.connection.send(&request)?;
                    // Only insert after a successful send
                    entry.insert(1);
                }
            }
        }

        // Create a filtered stream with its own receiver
        let mut rx = self.connection.subscribe();
        let targets: HashSet<String> = streams.into_iter().collect();

        Ok(try_stream! {
            loop {
                match rx.recv().await {
                    Ok(msg) => {
                        if targets.contains(&msg.stream) {
                            yield msg;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!("feed subscription lagged, missed {n} messages");
                        Err(WsError::Lagged { count: n })?;
                    }
                    Err(RecvError::Closed) => {
                        break;
                    }
                }
            }
        })
    }

    /// Unsubscribe from streams.
    ///
    /// This decrements the reference count for each stream. Only sends an
    /// unsubscribe request to the server when the reference count reaches
    /// zero (no other subscribers are using that stream).
    pub fn unsubscribe(&self, streams: &[String]) -> Result<()> {
        if streams.is_empty() {
            return Err(WsError::SubscriptionFailed(
                "at least one stream name is required for unsubscription".to_owned(),
            )
            .into());
        }

        for stream in streams {
            if let Entry::Occupied(mut entry) = self.subscribed_streams.entry(stream.clone()) {
                let refcount = entry.get_mut();
                *refcount = refcount.saturating_sub(1);
                if *refcount == 0 {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(%stream, "unsubscribing from stream");

                    // Send while holding the entry lock to prevent a
                    // concurrent subscribe from racing with us
                    let request = FeedRequest::unsubscribe(vec![stream.clone()]);
                    self.connection.send(&request)?;
                    entry.remove();
                }
            }
        }

        Ok(())
    }

    /// Number of distinct streams currently subscribed.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscribed_streams.len()
    }
}
