use std::sync::atomic::{AtomicU64, Ordering};

use bon::Builder;
use serde::Serialize;

/// Monotonic identifier for feed requests; the server echoes it in its
/// acknowledgement frame.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Feed control request message.
#[non_exhaustive]
#[derive(Clone, Debug, Serialize, Builder)]
pub struct FeedRequest {
    /// Requested operation
    pub method: FeedMethod,
    /// Stream names the operation applies to (e.g. `btcusdt@ticker`)
    pub params: Vec<String>,
    /// Request identifier echoed back by the server
    pub id: u64,
}

impl FeedRequest {
    /// Create a subscribe request for the given stream names.
    #[must_use]
    pub fn subscribe(streams: Vec<String>) -> Self {
        Self {
            method: FeedMethod::Subscribe,
            params: streams,
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Create an unsubscribe request for the given stream names.
    #[must_use]
    pub fn unsubscribe(streams: Vec<String>) -> Self {
        Self {
            method: FeedMethod::Unsubscribe,
            params: streams,
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
        }
    }
}

/// Feed request operation.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FeedMethod {
    /// Start delivery for the named streams
    Subscribe,
    /// Stop delivery for the named streams
    Unsubscribe,
}

/// Stream name for a symbol's rolling ticker, e.g. `btcusdt@ticker`.
#[must_use]
pub fn ticker_stream(symbol: &str) -> String {
    format!("{}@ticker", symbol.to_lowercase())
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    #[test]
    fn subscribe_request_wire_format() {
        let request = FeedRequest::subscribe(vec![ticker_stream("BTCUSDT")]);
        let json = serde_json::to_string(&request).expect("request serializes");
        let value: Value = serde_json::from_str(&json).expect("round trip");

        assert_eq!(value["method"], "SUBSCRIBE");
        assert_eq!(value["params"][0], "btcusdt@ticker");
        assert!(value["id"].as_u64().is_some(), "id must be an integer");
    }

    #[test]
    fn unsubscribe_request_wire_format() {
        let request = FeedRequest::unsubscribe(vec!["ethusdt@ticker".to_owned()]);
        let json = serde_json::to_string(&request).expect("request serializes");

        assert!(json.contains(r#""method":"UNSUBSCRIBE""#));
        assert!(json.contains("ethusdt@ticker"));
    }

    #[test]
    fn request_ids_are_monotonic() {
        let first = FeedRequest::subscribe(vec![]);
        let second = FeedRequest::subscribe(vec![]);

        assert!(second.id > first.id, "ids must increase");
    }

    #[test]
    fn ticker_stream_lowercases_symbol() {
        assert_eq!(ticker_stream("BTCUSDT"), "btcusdt@ticker");
        assert_eq!(ticker_stream("ethusdt"), "ethusdt@ticker");
    }
}
