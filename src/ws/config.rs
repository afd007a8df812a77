#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use bon::Builder;

const DEFAULT_HEARTBEAT_INTERVAL_DURATION: Duration = Duration::from_millis(2000);
const DEFAULT_HEARTBEAT_TIMEOUT_DURATION: Duration = Duration::from_millis(2000);
const DEFAULT_BACKOFF_BASE_DURATION: Duration = Duration::from_millis(1000);
const DEFAULT_MAX_BACKOFF_DURATION: Duration = Duration::from_millis(30_000);
const DEFAULT_JITTER_MAX_DURATION: Duration = Duration::from_millis(1000);

/// Configuration for WebSocket client behavior.
#[non_exhaustive]
#[derive(Debug, Clone, Default, Builder)]
pub struct Config {
    /// Application-level liveness probing configuration
    #[builder(default)]
    pub heartbeat: HeartbeatConfig,
    /// Reconnection strategy configuration
    #[builder(default)]
    pub reconnect: ReconnectConfig,
}

/// Configuration for automatic reconnection behavior.
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct ReconnectConfig {
    /// Maximum number of reconnection attempts before giving up.
    /// `None` means infinite retries.
    pub max_attempts: Option<u32>,
    /// Delay before the first reconnection attempt; doubles each attempt
    #[builder(default = DEFAULT_BACKOFF_BASE_DURATION)]
    pub backoff_base: Duration,
    /// Ceiling for the computed backoff delay
    #[builder(default = DEFAULT_MAX_BACKOFF_DURATION)]
    pub max_backoff: Duration,
    /// Upper bound of the random jitter added to each delay.
    /// Zero disables jitter entirely.
    #[builder(default = DEFAULT_JITTER_MAX_DURATION)]
    pub jitter_max: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: None, // Infinite reconnection by default
            backoff_base: DEFAULT_BACKOFF_BASE_DURATION,
            max_backoff: DEFAULT_MAX_BACKOFF_DURATION,
            jitter_max: DEFAULT_JITTER_MAX_DURATION,
        }
    }
}

/// Configuration for the application-level heartbeat.
///
/// A transport-level close can be delayed indefinitely by a half-open
/// connection; the round-trip probe bounds failure detection to one
/// interval plus one timeout.
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct HeartbeatConfig {
    /// Whether to probe the connection at all
    #[builder(default = true)]
    pub enabled: bool,
    /// Interval between probe frames on an open connection
    #[builder(default = DEFAULT_HEARTBEAT_INTERVAL_DURATION)]
    pub interval: Duration,
    /// Maximum time to wait for a matching reply before the connection is
    /// considered dead and force-closed
    #[builder(default = DEFAULT_HEARTBEAT_TIMEOUT_DURATION)]
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: DEFAULT_HEARTBEAT_INTERVAL_DURATION,
            timeout: DEFAULT_HEARTBEAT_TIMEOUT_DURATION,
        }
    }
}
