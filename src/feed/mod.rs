//! Market-data feed client built on the [`crate::ws`] core.
//!
//! This module provides the dashboard-facing side of the crate: a
//! WebSocket client for live market-data streams with reference-counted
//! subscriptions, plus a registry that tracks the health of several feeds
//! at once.
//!
//! # Example
//!
//! ```rust, no_run
//! use feedlink::feed::Client;
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Client::default();
//!
//!     let stream = client.subscribe_tickers(vec!["BTCUSDT".to_owned()])?;
//!     let mut stream = Box::pin(stream);
//!
//!     while let Some(update) = stream.next().await {
//!         println!("BTC: {:?}", update?);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod registry;
pub mod subscription;
pub mod types;

// Re-export commonly used types
pub use client::Client;
pub use registry::{FeedHealth, FeedRegistry};
pub use subscription::SubscriptionManager;
pub use types::request::{FeedMethod, FeedRequest};
pub use types::response::{FeedMessage, TickerUpdate};
