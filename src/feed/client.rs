use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt as _};
use tokio::sync::{broadcast, watch};
use url::Url;

use super::subscription::{FeedParser, SubscriptionManager};
use super::types::request::ticker_stream;
use super::types::response::{FeedMessage, TickerUpdate};
use crate::Result;
use crate::error::Error;
use crate::ws::ConnectionManager;
use crate::ws::config::Config;
use crate::ws::connection::{ConnectionEvent, ConnectionState};

/// Public combined-stream endpoint the dashboard ships with.
const DEFAULT_ENDPOINT: &str = "wss://stream.binance.us:9443/stream";

/// Market-data feed client for streaming dashboard data.
///
/// Wraps one managed connection per client: subscriptions are
/// reference-counted, survive reconnects, and deliver through independent
/// streams. Connection health and heartbeat latency are observable at any
/// time for UI rendering.
///
/// # Examples
///
/// ```rust, no_run
/// use feedlink::feed::Client;
/// use futures::StreamExt;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let client = Client::default();
///
///     // Stream BTC and ETH tickers
///     let symbols = vec!["BTCUSDT".to_owned(), "ETHUSDT".to_owned()];
///     let stream = client.subscribe_tickers(symbols)?;
///     let mut stream = Box::pin(stream);
///
///     while let Some(update) = stream.next().await {
///         println!("Ticker: {:?}", update?);
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Clone, Debug)]
pub struct Client {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    /// Base endpoint for the WebSocket
    endpoint: String,
    /// Configuration the connection was built with
    config: Config,
    /// Connection manager for the WebSocket
    connection: ConnectionManager<FeedMessage, FeedParser>,
    /// Subscription manager for handling subscriptions
    subscriptions: Arc<SubscriptionManager>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT, Config::default())
            .expect("feed client with default endpoint should succeed")
    }
}

impl Client {
    /// Create a new feed client with the specified endpoint and
    /// configuration. Connecting begins immediately.
    pub fn new(endpoint: &str, config: Config) -> Result<Self> {
        let parsed = Url::parse(endpoint)?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(Error::validation(format!(
                "feed endpoint must use a ws or wss scheme, got {}",
                parsed.scheme()
            )));
        }

        let connection = ConnectionManager::new(endpoint.to_owned(), config.clone(), FeedParser)?;
        let subscriptions = Arc::new(SubscriptionManager::new(connection.clone()));

        // Establish subscriptions on (re)connection
        subscriptions.start_reconnection_handler();

        Ok(Self {
            inner: Arc::new(ClientInner {
                endpoint: endpoint.to_owned(),
                config,
                connection,
                subscriptions,
            }),
        })
    }

    /// Subscribe to rolling ticker updates for the given symbols.
    ///
    /// Returns a stream of ticker updates. Frames for other streams on the
    /// same connection are filtered out.
    pub fn subscribe_tickers(
        &self,
        symbols: Vec<String>,
    ) -> Result<impl Stream<Item = Result<TickerUpdate>>> {
        let streams = symbols.iter().map(|s| ticker_stream(s)).collect();
        let stream = self.inner.subscriptions.subscribe(streams)?;

        Ok(stream.filter_map(|msg_result| async move {
            match msg_result {
                Ok(msg) => msg.as_ticker().map(Ok),
                Err(e) => Some(Err(e)),
            }
        }))
    }

    /// Unsubscribe from ticker updates for the given symbols.
    ///
    /// This decrements the reference count for each ticker stream. Only
    /// sends an unsubscribe request to the server when no other subscribers
    /// are using a stream.
    pub fn unsubscribe_tickers(&self, symbols: &[String]) -> Result<()> {
        let streams: Vec<String> = symbols.iter().map(|s| ticker_stream(s)).collect();
        self.inner.subscriptions.unsubscribe(&streams)
    }

    /// Subscribe to raw feed messages for custom stream names.
    pub fn subscribe_raw(
        &self,
        streams: Vec<String>,
    ) -> Result<impl Stream<Item = Result<FeedMessage>>> {
        self.inner.subscriptions.subscribe(streams)
    }

    /// Get the current connection state.
    #[must_use]
    pub fn status(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn status_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection.state_receiver()
    }

    /// Last measured heartbeat round trip, if any probe has been answered.
    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        self.inner.connection.latency()
    }

    /// Subscribe to heartbeat latency updates.
    #[must_use]
    pub fn latency_receiver(&self) -> watch::Receiver<Option<Duration>> {
        self.inner.connection.latency_receiver()
    }

    /// Subscribe to connection lifecycle events (open, close, transport
    /// error).
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.connection.events()
    }

    /// The endpoint this client connects to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    /// The configuration this client was built with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the number of distinct streams currently subscribed.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.subscription_count()
    }

    /// Close the connection and disable reconnection. Terminal and
    /// idempotent; recovery means constructing a new client.
    pub fn close(&self) {
        self.inner.connection.close();
    }
}
