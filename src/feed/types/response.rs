use bon::Builder;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{DisplayFromStr, serde_as};

/// Top-level feed message wrapper.
///
/// Data frames from the combined stream arrive as
/// `{"stream":"btcusdt@ticker","data":{...}}` and are deserialized into
/// this struct.
#[non_exhaustive]
#[derive(Debug, Clone, Deserialize, Builder)]
pub struct FeedMessage {
    /// Source stream name (e.g. `btcusdt@ticker`)
    pub stream: String,
    /// Event-specific data object
    pub data: Value,
}

impl FeedMessage {
    /// Try to extract the payload as a rolling ticker update.
    #[must_use]
    pub fn as_ticker(&self) -> Option<TickerUpdate> {
        if self.stream.ends_with("@ticker") {
            serde_json::from_value(self.data.clone()).ok()
        } else {
            None
        }
    }
}

/// Rolling ticker payload.
#[serde_as]
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Builder)]
pub struct TickerUpdate {
    /// Trading pair symbol (uppercase concatenated, e.g. "BTCUSDT")
    #[serde(rename = "s")]
    pub symbol: String,
    /// Event timestamp in Unix milliseconds
    #[serde(rename = "E")]
    pub event_time: i64,
    /// Last traded price (sent by the feed as a decimal string)
    #[serde_as(as = "DisplayFromStr")]
    #[serde(rename = "c")]
    pub last_price: Decimal,
}

/// Deserialize messages from the byte slice.
///
/// Handles both single objects and arrays of messages. Returns an empty
/// vector for empty or whitespace-only input (server keepalives) and for
/// control-frame acknowledgements, which carry no stream data.
pub fn parse_messages(bytes: &[u8]) -> crate::Result<Vec<FeedMessage>> {
    let trimmed = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .map_or(&[][..], |start| &bytes[start..]);

    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    // Try parsing as array first, fall back to single object
    if trimmed.first() == Some(&b'[') {
        Ok(serde_json::from_slice(trimmed)?)
    } else {
        let value: Value = serde_json::from_slice(trimmed)?;
        // Request acknowledgements (`{"result":null,"id":n}`) have no
        // stream envelope and nothing for subscribers
        if value.get("stream").is_none() {
            return Ok(Vec::new());
        }
        let msg: FeedMessage = serde_json::from_value(value)?;
        Ok(vec![msg])
    }
}
