//! Core traits for generic WebSocket infrastructure.

use serde::de::DeserializeOwned;

/// Message parser trait for converting raw frames to messages.
///
/// The connection manager forwards every non-heartbeat text frame through
/// the parser before broadcasting, so consumers decide what an inbound
/// frame means without the core knowing the protocol.
///
/// # Example
///
/// ```ignore
/// pub struct FeedParser;
///
/// impl MessageParser<FeedMessage> for FeedParser {
///     fn parse(&self, bytes: &[u8]) -> crate::Result<Vec<FeedMessage>> {
///         let msg: FeedMessage = serde_json::from_slice(bytes)?;
///         Ok(vec![msg])
///     }
/// }
/// ```
pub trait MessageParser<M: DeserializeOwned>: Send + Sync + 'static {
    /// Parse incoming bytes into messages.
    ///
    /// May return an empty vec if the frame carries nothing for consumers
    /// (keepalives, acknowledgements). Handles both single objects and
    /// arrays of messages.
    fn parse(&self, bytes: &[u8]) -> crate::Result<Vec<M>>;
}
