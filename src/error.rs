//! Error types used by the vaultlink transport and host collaborators.
//!
//! This module defines two main error types:
//!
//! - [`LinkError`] — failures on the IPC link to the backup daemon.
//! - [`HostError`] — failures reported by host collaborators (world saves,
//!   session eviction, in-process restart).
//!
//! Transport callers treat the peer as untrusted and frequently offline, so
//! [`LinkError`] never escapes the public query seam: the querier degrades it
//! to the sentinel reply strings from [`wire`](crate::link::wire) instead.
//! Both types provide `as_label()` for stable log/metric labels.

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by the IPC link.
///
/// These represent failures talking to the backup daemon over loopback TCP.
/// All of them are expected operational conditions, not faults: the daemon
/// may be down, slow, or mid-restart at any time.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LinkError {
    /// Command text was empty after trimming; nothing was sent.
    #[error("command is empty after trimming")]
    EmptyCommand,

    /// Could not connect to the peer endpoint.
    #[error("connect to {addr} failed: {source}")]
    Connect {
        /// Peer address the connection was attempted against.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// An established connection failed mid-exchange.
    #[error("socket i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// The exchange did not complete within the deadline.
    #[error("no reply within {deadline:?}")]
    Timeout {
        /// The deadline that was exceeded.
        deadline: Duration,
    },

    /// The peer closed the connection without sending any data.
    #[error("peer closed the connection without a reply")]
    EmptyReply,
}

impl LinkError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            LinkError::EmptyCommand => "link_empty_command",
            LinkError::Connect { .. } => "link_connect_failed",
            LinkError::Io(_) => "link_io_failed",
            LinkError::Timeout { .. } => "link_timeout",
            LinkError::EmptyReply => "link_empty_reply",
        }
    }
}

/// # Errors reported by host collaborators.
///
/// The host engine's save/evict/restart primitives are outside this crate;
/// their failures arrive as opaque messages. Per-target failures during the
/// shutdown sequence are logged and never halt the sequence.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct HostError {
    /// Human-readable failure description from the host.
    pub message: String,
}

impl HostError {
    /// Creates a new host error from any displayable value.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<&str> for HostError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for HostError {
    fn from(message: String) -> Self {
        Self { message }
    }
}
