//! Application-level liveness probing.
//!
//! A peer can stop responding without ever sending a close frame, leaving
//! the transport "open" indefinitely. The monitor sends a structured probe
//! frame at a fixed interval and expects the remote service to echo the
//! probe identifier; a missed echo is a death sentence for the connection.
//!
//! One monitor task exists per live connection. It is spawned by the
//! connection handler on open and aborted on teardown, so no probe state
//! ever survives a reconnect.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};

use super::config::HeartbeatConfig;

/// Outbound probe frame: `{"method":"ping","id":<millisecond timestamp>}`.
#[derive(Debug, Clone, Copy, Serialize)]
pub(crate) struct ProbeFrame {
    method: &'static str,
    pub(crate) id: i64,
}

impl ProbeFrame {
    pub(crate) fn new(id: i64) -> Self {
        Self { method: "ping", id }
    }
}

/// Inbound frame carrying a probe identifier echo. Whatever else the
/// server includes in the reply is ignored.
#[derive(Debug, Clone, Copy, Deserialize)]
pub(crate) struct ProbeReply {
    pub(crate) id: i64,
}

/// Why the monitor stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    /// No matching reply arrived within the timeout; the peer is
    /// unresponsive and the connection must be force-closed.
    Dead,
    /// The connection is being torn down; nothing to act on.
    Stopped,
}

/// Probe the connection until it dies or is torn down.
///
/// Each cycle sends a probe stamped with the current millisecond timestamp
/// through `probe_tx` and waits for the reader to report a matching echo on
/// `reply_rx`. A reply in time publishes the observed round trip to
/// `latency_tx`.
pub(crate) async fn monitor(
    config: HeartbeatConfig,
    probe_tx: mpsc::UnboundedSender<ProbeFrame>,
    mut reply_rx: watch::Receiver<i64>,
    latency_tx: watch::Sender<Option<Duration>>,
) -> Verdict {
    // The first probe goes out one full interval after the socket opens.
    let mut ticks = interval_at(Instant::now() + config.interval, config.interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticks.tick().await;

        // Mark the current reply state as seen before sending the probe so
        // a stale echo cannot satisfy changed() immediately.
        drop(reply_rx.borrow_and_update());

        let id = Utc::now().timestamp_millis();
        let sent = Instant::now();
        if probe_tx.send(ProbeFrame::new(id)).is_err() {
            // Writer is gone, connection is terminating
            return Verdict::Stopped;
        }

        match timeout(config.timeout, matching_reply(&mut reply_rx, id)).await {
            Ok(true) => {
                #[cfg(feature = "tracing")]
                tracing::trace!(id, round_trip = ?sent.elapsed(), "heartbeat reply received");
                _ = latency_tx.send(Some(sent.elapsed()));
            }
            Ok(false) => {
                // Reader is gone, connection is terminating
                return Verdict::Stopped;
            }
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    id,
                    timeout = ?config.timeout,
                    "no heartbeat reply, treating connection as dead"
                );
                return Verdict::Dead;
            }
        }
    }
}

/// Wait until the reader reports a reply matching `id`. Identifiers from
/// earlier probes are skipped.
async fn matching_reply(reply_rx: &mut watch::Receiver<i64>, id: i64) -> bool {
    loop {
        if reply_rx.changed().await.is_err() {
            return false;
        }
        if *reply_rx.borrow_and_update() == id {
            return true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> HeartbeatConfig {
        HeartbeatConfig {
            enabled: true,
            interval: Duration::from_millis(50),
            timeout: Duration::from_millis(100),
        }
    }

    #[test]
    fn probe_frame_wire_format() {
        let frame = ProbeFrame::new(1_753_314_064_237);
        let json = serde_json::to_string(&frame).expect("probe serializes");

        assert_eq!(json, r#"{"method":"ping","id":1753314064237}"#);
    }

    #[test]
    fn probe_reply_tolerates_extra_fields() {
        let reply: ProbeReply =
            serde_json::from_str(r#"{"id":1753314064237,"status":200,"result":{}}"#)
                .expect("reply parses");

        assert_eq!(reply.id, 1_753_314_064_237);
    }

    #[tokio::test(start_paused = true)]
    async fn silence_returns_dead() {
        let (probe_tx, mut probe_rx) = mpsc::unbounded_channel();
        let (_reply_tx, reply_rx) = watch::channel(0_i64);
        let (latency_tx, latency_rx) = watch::channel(None);

        let verdict = monitor(fast_config(), probe_tx, reply_rx, latency_tx).await;

        assert_eq!(verdict, Verdict::Dead);
        assert!(probe_rx.recv().await.is_some(), "a probe was sent");
        assert!(latency_rx.borrow().is_none(), "no latency without a reply");
    }

    #[tokio::test(start_paused = true)]
    async fn matching_echo_publishes_latency() {
        let (probe_tx, mut probe_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = watch::channel(0_i64);
        let (latency_tx, mut latency_rx) = watch::channel(None);

        let handle = tokio::spawn(monitor(fast_config(), probe_tx, reply_rx, latency_tx));

        let frame = probe_rx.recv().await.expect("probe was sent");
        reply_tx.send(frame.id).expect("monitor is listening");

        latency_rx.changed().await.expect("latency was published");
        assert!(latency_rx.borrow().is_some());

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn stale_echo_does_not_cancel_timeout() {
        let (probe_tx, mut probe_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = watch::channel(0_i64);
        let (latency_tx, latency_rx) = watch::channel(None);

        let handle = tokio::spawn(monitor(fast_config(), probe_tx, reply_rx, latency_tx));

        let frame = probe_rx.recv().await.expect("probe was sent");
        // Echo an identifier from some earlier probe
        reply_tx.send(frame.id - 1).expect("monitor is listening");

        let verdict = handle.await.expect("monitor task completes");
        assert_eq!(verdict, Verdict::Dead);
        assert!(latency_rx.borrow().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_writer_stops_monitor() {
        let (probe_tx, probe_rx) = mpsc::unbounded_channel();
        let (_reply_tx, reply_rx) = watch::channel(0_i64);
        let (latency_tx, _latency_rx) = watch::channel(None);

        drop(probe_rx);
        let verdict = monitor(fast_config(), probe_tx, reply_rx, latency_tx).await;

        assert_eq!(verdict, Verdict::Stopped);
    }
}
