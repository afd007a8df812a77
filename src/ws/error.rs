#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;

/// WebSocket error variants.
///
/// Transport failures never surface here: the connection loop reports them
/// as [`ConnectionEvent::TransportError`](super::connection::ConnectionEvent)
/// and recovers on its own.
#[non_exhaustive]
#[derive(Debug)]
pub enum WsError {
    /// Subscription request failed
    SubscriptionFailed(String),
    /// WebSocket connection was closed
    ConnectionClosed,
    /// Subscription stream lagged and missed messages
    Lagged {
        /// Number of messages that were missed
        count: u64,
    },
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SubscriptionFailed(reason) => write!(f, "Subscription failed: {reason}"),
            Self::ConnectionClosed => write!(f, "WebSocket connection closed"),
            Self::Lagged { count } => write!(f, "Subscription lagged, missed {count} messages"),
        }
    }
}

impl StdError for WsError {}

// Integration with main Error type
impl From<WsError> for crate::error::Error {
    fn from(e: WsError) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, e)
    }
}
