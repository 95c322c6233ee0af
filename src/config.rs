//! # Agent configuration.
//!
//! Provides [`Config`], centralized settings for the IPC link and the restore
//! pipeline.
//!
//! Config is used in two ways:
//! 1. **Coordinator creation**: `Coordinator::new(config, ...)`
//! 2. **Transport construction**: `SignalSubscriber::connect(&config)` and
//!    `Querier::from_config(&config)`
//!
//! The defaults mirror the backup daemon's expectations: loopback endpoints
//! on ports 6372 (subscribe) and 6376 (query), the `0x00000020` application
//! id, and the daemon's stock restore timings. Loading and persisting these
//! values from disk is the embedding server's concern, not this crate's.

use std::path::PathBuf;
use std::time::Duration;

use crate::restart::RestartMethod;

/// Configuration for the link transport and the restore state machine.
///
/// ## Field semantics
/// - Link endpoints address the backup daemon on loopback; the wire protocol
///   trusts the peer and carries no authentication.
/// - `require_confirm = false` skips the operator confirmation window and
///   goes straight to the countdown.
/// - `remote_countdown = false` makes peer-initiated restores execute
///   immediately, with no countdown at all.
/// - `frame_capacity` bounds the subscriber→dispatcher channel; a full
///   channel drops broadcast frames rather than blocking the reader.
#[derive(Clone, Debug)]
pub struct Config {
    /// Host the backup daemon listens on. Loopback in any real deployment.
    pub peer_host: String,

    /// Port of the daemon's persistent broadcast endpoint.
    pub subscribe_port: u16,

    /// Port of the daemon's ephemeral query endpoint.
    pub query_port: u16,

    /// Application id shared by both endpoints.
    pub app_id: String,

    /// Signal id of the broadcast subscription.
    pub signal_id: String,

    /// Socket id of the query endpoint.
    pub query_socket_id: String,

    /// Deadline for one query exchange (connect + write + read).
    pub query_timeout: Duration,

    /// Delay before the first heartbeat on the subscription connection.
    pub heartbeat_initial: Duration,

    /// Interval between subsequent heartbeats.
    pub heartbeat_period: Duration,

    /// Capacity of the subscriber frame channel (min 1, clamped).
    pub frame_capacity: usize,

    /// Capacity of the event bus broadcast ring buffer (min 1, clamped).
    pub bus_capacity: usize,

    /// Whether operator-initiated restores wait for an explicit confirm.
    pub require_confirm: bool,

    /// Seconds before an unconfirmed restore is cancelled automatically.
    pub confirm_timeout_secs: u32,

    /// Countdown length for operator-initiated restores, in seconds.
    pub countdown_secs: u32,

    /// Whether peer-initiated restores run a countdown before executing.
    pub remote_countdown: bool,

    /// Countdown length for peer-initiated restores, in seconds.
    pub remote_countdown_secs: u32,

    /// Whether any restart preparation happens at all during shutdown.
    pub restart_enabled: bool,

    /// How to signal the process supervisor that a restart is desired.
    pub restart_method: RestartMethod,

    /// Path of the external restart script (informational; the script is run
    /// by an external watcher, never by this crate).
    pub restart_script_path: String,

    /// Location of the restart marker file.
    pub restart_marker_path: PathBuf,
}

impl Config {
    /// Address of the persistent broadcast endpoint (`host:port`).
    #[inline]
    pub fn subscribe_addr(&self) -> String {
        format!("{}:{}", self.peer_host, self.subscribe_port)
    }

    /// Address of the ephemeral query endpoint (`host:port`).
    #[inline]
    pub fn query_addr(&self) -> String {
        format!("{}:{}", self.peer_host, self.query_port)
    }

    /// Routing key for the broadcast subscription (`app_id-signal_id`).
    #[inline]
    pub fn broadcast_key(&self) -> String {
        crate::link::wire::routing_key(&self.app_id, &self.signal_id)
    }

    /// Routing key for query commands (`app_id-query_socket_id`).
    #[inline]
    pub fn query_key(&self) -> String {
        crate::link::wire::routing_key(&self.app_id, &self.query_socket_id)
    }

    /// Confirmation window as a [`Duration`].
    #[inline]
    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.confirm_timeout_secs))
    }

    /// Frame channel capacity clamped to a minimum of 1.
    #[inline]
    pub fn frame_capacity_clamped(&self) -> usize {
        self.frame_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration matching the stock backup daemon:
    ///
    /// - loopback endpoints on ports 6372/6376, app id `0x00000020`
    /// - 5s query deadline; heartbeat after 1 minute, then every 3 minutes
    /// - confirmation required, 60s confirm window, 10s countdowns
    /// - restart preparation enabled, in-process method
    fn default() -> Self {
        Self {
            peer_host: "127.0.0.1".to_string(),
            subscribe_port: 6372,
            query_port: 6376,
            app_id: "0x00000020".to_string(),
            signal_id: "0x00000020".to_string(),
            query_socket_id: "0x00000010".to_string(),
            query_timeout: Duration::from_secs(5),
            heartbeat_initial: Duration::from_secs(60),
            heartbeat_period: Duration::from_secs(180),
            frame_capacity: 64,
            bus_capacity: 1024,
            require_confirm: true,
            confirm_timeout_secs: 60,
            countdown_secs: 10,
            remote_countdown: true,
            remote_countdown_secs: 10,
            restart_enabled: true,
            restart_method: RestartMethod::InProcess,
            restart_script_path: "./start.sh".to_string(),
            restart_marker_path: PathBuf::from(".vaultlink-restart"),
        }
    }
}
