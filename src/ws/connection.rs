#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::fmt::Debug;
use std::marker::PhantomData;
use std::time::Duration;

use futures::{SinkExt as _, StreamExt as _};
use serde::Serialize;
use serde::de::DeserializeOwned;
use strum_macros::Display;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use super::backoff::BackoffPolicy;
use super::config::Config;
use super::error::WsError;
use super::heartbeat::{self, ProbeFrame, ProbeReply, Verdict};
use super::traits::MessageParser;
use crate::Result;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Broadcast channel capacity for incoming messages.
const BROADCAST_CAPACITY: usize = 1024;

/// Broadcast channel capacity for lifecycle events.
const EVENT_CAPACITY: usize = 64;

/// Close code 1000, "normal closure".
const CLOSE_NORMAL: u16 = 1000;

/// Close code 1005, "no status received".
const CLOSE_NO_STATUS: u16 = 1005;

/// Connection state tracking.
///
/// The `Display` impl renders the lowercase status string
/// (`initializing`, `connected`, `reconnecting`, `disconnected`) that
/// dashboards show directly.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionState {
    /// A connection attempt is in flight
    Initializing,
    /// Successfully connected
    Connected {
        /// When the connection was established
        since: Instant,
    },
    /// Waiting out the backoff delay before the next attempt
    Reconnecting {
        /// Current reconnection attempt number
        attempt: u32,
    },
    /// Closed by the caller or retries exhausted; terminal
    Disconnected,
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected { .. })
    }
}

/// Lifecycle notifications delivered to event observers.
///
/// Transport errors are reported here for observability only; reconnection
/// is driven exclusively by the connection teardown that follows, so a
/// single failure never schedules two recovery timers.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The socket opened
    Opened,
    /// The socket closed
    Closed {
        /// Close code from the peer's close frame, if it sent one
        code: Option<u16>,
    },
    /// A transport-level failure was observed
    TransportError {
        /// Human-readable failure description
        message: String,
    },
}

/// How an active connection ended.
enum Teardown {
    /// Caller-intended or benign close; no reconnection.
    Intentional { code: Option<u16> },
    /// Abnormal closure; reconnection is scheduled.
    Abnormal { code: Option<u16> },
}

impl Teardown {
    const fn code(&self) -> Option<u16> {
        match self {
            Self::Intentional { code } | Self::Abnormal { code } => *code,
        }
    }
}

/// Close codes 1000 "normal" and 1005 "no status" (or a close frame with no
/// payload at all) signal an intended shutdown; everything else schedules a
/// reconnect.
const fn close_is_benign(code: Option<u16>) -> bool {
    matches!(code, None | Some(CLOSE_NORMAL) | Some(CLOSE_NO_STATUS))
}

/// Manages WebSocket connection lifecycle, reconnection, and heartbeat.
///
/// This generic connection manager handles all WebSocket connection
/// concerns:
/// - Establishing and maintaining a single connection to one endpoint
/// - Automatic reconnection with exponential backoff and jitter
/// - Application-level heartbeat probing with round-trip latency reporting
/// - Broadcasting messages and lifecycle events to multiple subscribers
///
/// At most one live socket and one heartbeat task exist per manager at any
/// time; both are owned by a single background task, replaced (never
/// shared) on each reconnect.
///
/// # Type Parameters
///
/// - `M`: Message type that implements [`DeserializeOwned`] among other "helper" types
/// - `P`: Parser type that implements [`MessageParser<M>`]
///
/// # Example
///
/// ```ignore
/// let connection = ConnectionManager::new(
///     "wss://example.com".to_owned(),
///     Config::default(),
///     FeedParser,
/// )?;
///
/// // Subscribe to messages
/// let mut rx = connection.subscribe();
/// while let Ok(msg) = rx.recv().await {
///     println!("Received: {:?}", msg);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionManager<M, P>
where
    M: DeserializeOwned + Debug + Clone + Send + 'static,
    P: MessageParser<M>,
{
    /// Watch channel sender for state changes (enables reconnection detection)
    state_tx: watch::Sender<ConnectionState>,
    /// Watch channel receiver for state changes (for use in checking the current state)
    state_rx: watch::Receiver<ConnectionState>,
    /// Sender channel for outgoing messages
    sender_tx: mpsc::UnboundedSender<String>,
    /// Broadcast sender for incoming messages
    broadcast_tx: broadcast::Sender<M>,
    /// Broadcast sender for lifecycle events
    events_tx: broadcast::Sender<ConnectionEvent>,
    /// Last measured heartbeat round trip
    latency_rx: watch::Receiver<Option<Duration>>,
    /// Cancelled exactly once, by [`Self::close`]
    shutdown: CancellationToken,
    /// Phantom data for unused type parameters
    _phantom: PhantomData<P>,
}

impl<M, P> ConnectionManager<M, P>
where
    M: DeserializeOwned + Debug + Clone + Send + 'static,
    P: MessageParser<M>,
{
    /// Create a new connection manager and start the connection loop.
    ///
    /// The `parser` is used to deserialize incoming WebSocket messages.
    /// The connection loop runs in a background task, begins connecting
    /// immediately, and handles reconnection according to the config's
    /// [`ReconnectConfig`](super::config::ReconnectConfig).
    pub fn new(endpoint: String, config: Config, parser: P) -> Result<Self> {
        let (sender_tx, sender_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Initializing);
        let (latency_tx, latency_rx) = watch::channel(None);
        let shutdown = CancellationToken::new();

        // Spawn connection task
        let connection_endpoint = endpoint;
        let connection_config = config;
        let broadcast_tx_clone = broadcast_tx.clone();
        let events_tx_clone = events_tx.clone();
        let state_tx_clone = state_tx.clone();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            Self::connection_loop(
                connection_endpoint,
                connection_config,
                sender_rx,
                broadcast_tx_clone,
                events_tx_clone,
                parser,
                state_tx_clone,
                latency_tx,
                shutdown_clone,
            )
            .await;
        });

        Ok(Self {
            state_tx,
            state_rx,
            sender_tx,
            broadcast_tx,
            events_tx,
            latency_rx,
            shutdown,
            _phantom: PhantomData,
        })
    }

    /// Main connection loop with automatic reconnection.
    #[expect(
        clippy::too_many_arguments,
        reason = "The loop owns every channel endpoint for the manager's lifetime"
    )]
    async fn connection_loop(
        endpoint: String,
        config: Config,
        mut sender_rx: mpsc::UnboundedReceiver<String>,
        broadcast_tx: broadcast::Sender<M>,
        events_tx: broadcast::Sender<ConnectionEvent>,
        parser: P,
        state_tx: watch::Sender<ConnectionState>,
        latency_tx: watch::Sender<Option<Duration>>,
        shutdown: CancellationToken,
    ) {
        let policy = BackoffPolicy::new(&config.reconnect);
        let mut attempt = 0_u32;

        loop {
            if shutdown.is_cancelled() {
                _ = state_tx.send(ConnectionState::Disconnected);
                break;
            }

            _ = state_tx.send(ConnectionState::Initializing);

            let connected = tokio::select! {
                result = connect_async(&endpoint) => result,
                () = shutdown.cancelled() => {
                    _ = state_tx.send(ConnectionState::Disconnected);
                    break;
                }
            };

            match connected {
                Ok((ws_stream, _)) => {
                    attempt = 0;
                    _ = state_tx.send(ConnectionState::Connected {
                        since: Instant::now(),
                    });
                    _ = events_tx.send(ConnectionEvent::Opened);
                    #[cfg(feature = "tracing")]
                    tracing::debug!(%endpoint, "connection established");

                    let teardown = Self::handle_connection(
                        ws_stream,
                        &mut sender_rx,
                        &broadcast_tx,
                        &events_tx,
                        &config,
                        &parser,
                        &latency_tx,
                        &shutdown,
                    )
                    .await;

                    // The heartbeat task is already gone by the time the
                    // handler returns, so no stale probe can race the
                    // close notification.
                    _ = events_tx.send(ConnectionEvent::Closed {
                        code: teardown.code(),
                    });

                    match teardown {
                        Teardown::Intentional { code } => {
                            #[cfg(feature = "tracing")]
                            tracing::debug!(?code, "connection closed, not reconnecting");
                            #[cfg(not(feature = "tracing"))]
                            let _: Option<u16> = code;
                            _ = state_tx.send(ConnectionState::Disconnected);
                            break;
                        }
                        Teardown::Abnormal { code } => {
                            #[cfg(feature = "tracing")]
                            tracing::warn!(?code, "connection lost");
                            #[cfg(not(feature = "tracing"))]
                            let _: Option<u16> = code;
                        }
                    }
                }
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %e, "unable to connect");
                    _ = events_tx.send(ConnectionEvent::TransportError {
                        message: e.to_string(),
                    });
                }
            }

            if policy.is_exhausted(attempt) {
                #[cfg(feature = "tracing")]
                tracing::error!(attempt, "reconnect attempts exhausted, giving up");
                _ = state_tx.send(ConnectionState::Disconnected);
                break;
            }

            _ = state_tx.send(ConnectionState::Reconnecting { attempt });
            let delay = policy.jittered_delay(attempt);
            attempt = attempt.saturating_add(1);

            tokio::select! {
                () = sleep(delay) => {}
                () = shutdown.cancelled() => {
                    _ = state_tx.send(ConnectionState::Disconnected);
                    break;
                }
            }
        }
    }

    /// Handle an active WebSocket connection until it ends.
    #[expect(
        clippy::too_many_arguments,
        reason = "The handler borrows the loop's channel endpoints rather than owning copies"
    )]
    async fn handle_connection(
        ws_stream: WsStream,
        sender_rx: &mut mpsc::UnboundedReceiver<String>,
        broadcast_tx: &broadcast::Sender<M>,
        events_tx: &broadcast::Sender<ConnectionEvent>,
        config: &Config,
        parser: &P,
        latency_tx: &watch::Sender<Option<Duration>>,
        shutdown: &CancellationToken,
    ) -> Teardown {
        let (mut write, mut read) = ws_stream.split();

        // Channels wiring the heartbeat monitor to this connection's writer
        // (outbound probes) and reader (reply identifiers)
        let (probe_tx, mut probe_rx) = mpsc::unbounded_channel::<ProbeFrame>();
        let (reply_tx, reply_rx) = watch::channel(0_i64);

        let mut monitor: Option<JoinHandle<Verdict>> = if config.heartbeat.enabled {
            Some(tokio::spawn(heartbeat::monitor(
                config.heartbeat.clone(),
                probe_tx,
                reply_rx,
                latency_tx.clone(),
            )))
        } else {
            None
        };

        // Identifier of the most recently written probe. Replies are matched
        // against it before any message reaches application subscribers.
        let mut outstanding_probe: Option<i64> = None;

        let teardown = loop {
            tokio::select! {
                // Handle incoming frames
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            Self::dispatch_text(
                                text.as_str(),
                                &mut outstanding_probe,
                                &reply_tx,
                                broadcast_tx,
                                parser,
                            );
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let code = frame.as_ref().map(|f| u16::from(f.code));
                            if close_is_benign(code) {
                                break Teardown::Intentional { code };
                            }
                            break Teardown::Abnormal { code };
                        }
                        Some(Ok(_)) => {
                            // Binary frames and transport-level ping/pong are
                            // not part of the feed protocol.
                        }
                        Some(Err(e)) => {
                            #[cfg(feature = "tracing")]
                            tracing::warn!(error = %e, "transport error, tearing down connection");
                            _ = events_tx.send(ConnectionEvent::TransportError {
                                message: e.to_string(),
                            });
                            break Teardown::Abnormal { code: None };
                        }
                        None => break Teardown::Abnormal { code: None },
                    }
                }

                // Handle outgoing messages from subscriptions
                Some(text) = sender_rx.recv() => {
                    if write.send(Message::Text(text.into())).await.is_err() {
                        break Teardown::Abnormal { code: None };
                    }
                }

                // Handle probe frames from the heartbeat monitor
                Some(frame) = probe_rx.recv() => {
                    match serde_json::to_string(&frame) {
                        Ok(json) => {
                            outstanding_probe = Some(frame.id);
                            if write.send(Message::Text(json.into())).await.is_err() {
                                break Teardown::Abnormal { code: None };
                            }
                        }
                        Err(e) => {
                            #[cfg(feature = "tracing")]
                            tracing::error!(error = %e, "failed to encode heartbeat probe");
                            #[cfg(not(feature = "tracing"))]
                            let _: &serde_json::Error = &e;
                        }
                    }
                }

                // The monitor returns only when the peer stopped answering
                // or the connection is already terminating
                verdict = monitor_finished(monitor.as_mut()) => {
                    monitor = None;
                    if verdict == Verdict::Dead {
                        // Force-close the unresponsive socket; the teardown
                        // cascades into the normal reconnection path.
                        _ = write.send(Message::Close(None)).await;
                        break Teardown::Abnormal { code: None };
                    }
                }

                // Caller requested shutdown
                () = shutdown.cancelled() => {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "".into(),
                    };
                    _ = write.send(Message::Close(Some(frame))).await;
                    break Teardown::Intentional { code: Some(CLOSE_NORMAL) };
                }
            }
        };

        // Cancel any pending probe before close observers hear about the
        // teardown
        if let Some(handle) = &monitor {
            handle.abort();
        }

        teardown
    }

    /// Route one inbound text frame: heartbeat-reply inspection first, then
    /// parsing and broadcast.
    ///
    /// A frame echoing the outstanding probe identifier is consumed here and
    /// never reaches message subscribers. Frames the parser rejects are
    /// logged and dropped; a malformed frame must never escalate into an
    /// error or a state change.
    fn dispatch_text(
        text: &str,
        outstanding_probe: &mut Option<i64>,
        reply_tx: &watch::Sender<i64>,
        broadcast_tx: &broadcast::Sender<M>,
        parser: &P,
    ) {
        if let Some(expected) = *outstanding_probe
            && let Ok(reply) = serde_json::from_str::<ProbeReply>(text)
            && reply.id == expected
        {
            *outstanding_probe = None;
            _ = reply_tx.send(reply.id);
            return;
        }

        match parser.parse(text.as_bytes()) {
            Ok(messages) => {
                for message in messages {
                    _ = broadcast_tx.send(message);
                }
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(%text, error = %e, "dropping unparseable frame");
                #[cfg(not(feature = "tracing"))]
                let _ = (&text, &e);
            }
        }
    }

    /// Send a request to the WebSocket server.
    ///
    /// Transmits only while the connection is open; otherwise the frame is
    /// silently dropped. Callers must tolerate drops during reconnection;
    /// delivery is not guaranteed.
    pub fn send<R: Serialize>(&self, request: &R) -> Result<()> {
        let json = serde_json::to_string(request)?;

        if !self.state_rx.borrow().is_connected() {
            #[cfg(feature = "tracing")]
            tracing::debug!("not connected, dropping outbound frame");
            return Ok(());
        }

        self.sender_tx
            .send(json)
            .map_err(|_e| WsError::ConnectionClosed)?;
        Ok(())
    }

    /// Close the connection and disable reconnection.
    ///
    /// The active socket (if any) is closed with code 1000, pending
    /// heartbeat timers are cancelled, and the state settles at
    /// [`ConnectionState::Disconnected`]. Terminal: no further automatic
    /// activity follows, and repeated calls are no-ops. Recovery means
    /// constructing a new manager.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Subscribe to connection state changes.
    ///
    /// Returns a receiver that notifies when the connection state changes.
    /// This is useful for detecting reconnections and re-establishing
    /// subscriptions.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Last measured heartbeat round trip, if any probe has been answered.
    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        *self.latency_rx.borrow()
    }

    /// Subscribe to heartbeat latency updates.
    #[must_use]
    pub fn latency_receiver(&self) -> watch::Receiver<Option<Duration>> {
        self.latency_rx.clone()
    }

    /// Subscribe to incoming messages.
    ///
    /// Each call returns a new independent receiver. Multiple subscribers
    /// can receive messages concurrently without blocking each other, in
    /// subscription order for a given frame.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<M> {
        self.broadcast_tx.subscribe()
    }

    /// Subscribe to lifecycle events (open, close, transport error).
    ///
    /// Dropping the receiver unregisters the observer.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events_tx.subscribe()
    }
}

/// Resolve when the heartbeat monitor finishes; pend forever when no
/// monitor is running.
async fn monitor_finished(handle: Option<&mut JoinHandle<Verdict>>) -> Verdict {
    match handle {
        Some(handle) => handle.await.unwrap_or(Verdict::Stopped),
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_renders_dashboard_strings() {
        assert_eq!(ConnectionState::Initializing.to_string(), "initializing");
        assert_eq!(
            ConnectionState::Connected {
                since: Instant::now()
            }
            .to_string(),
            "connected"
        );
        assert_eq!(
            ConnectionState::Reconnecting { attempt: 3 }.to_string(),
            "reconnecting"
        );
        assert_eq!(ConnectionState::Disconnected.to_string(), "disconnected");
    }

    #[test]
    fn only_connected_counts_as_connected() {
        assert!(
            ConnectionState::Connected {
                since: Instant::now()
            }
            .is_connected()
        );
        assert!(!ConnectionState::Initializing.is_connected());
        assert!(!ConnectionState::Reconnecting { attempt: 0 }.is_connected());
        assert!(!ConnectionState::Disconnected.is_connected());
    }

    #[test]
    fn benign_close_code_table() {
        assert!(close_is_benign(None));
        assert!(close_is_benign(Some(1000)));
        assert!(close_is_benign(Some(1005)));

        assert!(!close_is_benign(Some(1001)), "going away reconnects");
        assert!(!close_is_benign(Some(1002)), "protocol error reconnects");
        assert!(
            !close_is_benign(Some(1006)),
            "abnormal termination reconnects"
        );
    }
}
