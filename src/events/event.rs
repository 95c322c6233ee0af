//! # Restore lifecycle events.
//!
//! The [`EventKind`] enum classifies everything observers may care about:
//! restore phase transitions, countdown progress, shutdown milestones, and
//! peer broadcasts passed through for display. The [`Event`] struct carries
//! optional metadata (phase, remaining seconds, initiator, reason, target).
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore order when events are observed from
//! independent queues.
//!
//! ## Example
//! ```rust
//! use vaultlink::{Event, EventKind, Phase};
//!
//! let ev = Event::new(EventKind::Aborted)
//!     .with_phase(Phase::Countdown)
//!     .with_reason("remote_override");
//!
//! assert_eq!(ev.kind, EventKind::Aborted);
//! assert_eq!(ev.phase, Some(Phase::Countdown));
//! assert_eq!(ev.reason.as_deref(), Some("remote_override"));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::SystemTime;

use crate::restore::Phase;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of restore lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Handshake ===
    /// Handshake with the daemon completed; version info cached.
    ///
    /// Sets: `reason` (peer version), `seq`, `at`.
    HandshakeCompleted,

    /// The daemon requires a newer agent version than this one.
    ///
    /// Sets: `reason` (required minimum version), `seq`, `at`.
    VersionIncompatible,

    // === Peer-driven world saves ===
    /// The daemon requested an immediate world save.
    RemoteSaveRequested,

    /// The remote save finished. `reason` is set to `"partial"` when some
    /// worlds failed to save.
    RemoteSaveCompleted,

    /// The daemon is about to take a hot backup and asked for a save.
    HotBackupRequested,

    /// All worlds were saved for the hot backup; the daemon was notified.
    HotBackupCompleted,

    // === Restore pipeline ===
    /// A peer-initiated restore was accepted.
    ///
    /// Sets: `initiator`, `seq`, `at`.
    RemoteInitiated,

    /// An operator-initiated restore is waiting for confirmation.
    ///
    /// Sets: `initiator`, `remaining` (confirm window in seconds).
    ConfirmAwaited,

    /// The pending restore was confirmed; countdown begins.
    Confirmed,

    /// No confirmation arrived within the window; the restore was cancelled.
    ConfirmTimedOut,

    /// Countdown started.
    ///
    /// Sets: `remaining` (initial seconds), `initiator`.
    CountdownStarted,

    /// Countdown announcement.
    ///
    /// Announced when remaining ≤ 5 or divisible by 5. Sets: `remaining`.
    CountdownTick,

    /// The restore was cancelled before execution.
    ///
    /// Sets: `phase` (phase at abort time), `reason`.
    Aborted,

    /// The restore passed the point of confirmation/countdown and is being
    /// carried out. For operator-initiated restores this also means the
    /// restore command was sent to the daemon.
    Executing,

    // === Shutdown sequence ===
    /// The irreversible save → evict → notify → restart sequence began.
    ///
    /// Sets: `initiator`.
    ShutdownStarted,

    /// One world failed to save; the sequence continues regardless.
    ///
    /// Sets: `target` (world), `reason`.
    WorldSaveFailed,

    /// One session could not be evicted; the sequence continues regardless.
    ///
    /// Sets: `target` (session), `reason`.
    SessionEvictFailed,

    /// The save-and-exit-complete notification was handed to the peer.
    PeerNotified,

    // === Peer status ===
    /// The daemon reported the restore finished.
    ///
    /// Sets: `reason` (status, `"success"` unless reported otherwise).
    RestoreFinished,

    /// A game session started on a restored world.
    ///
    /// Sets: `target` (world).
    SessionStarted,

    /// Any other peer event, passed through verbatim for display.
    ///
    /// Sets: `peer_event` (event name), `reason` (raw record), and
    /// `target` (world, when present).
    PeerBroadcast,
}

/// Restore lifecycle event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Restore phase, where relevant (e.g. the phase an abort hit).
    pub phase: Option<Phase>,
    /// Seconds remaining (countdown) or window length (confirm).
    pub remaining: Option<u32>,
    /// Who initiated the restore (operator name or the peer sentinel).
    pub initiator: Option<Arc<str>>,
    /// Human-readable reason, status, or raw payload for passthroughs.
    pub reason: Option<Arc<str>>,
    /// World or session the event refers to.
    pub target: Option<Arc<str>>,
    /// Peer event name for [`EventKind::PeerBroadcast`].
    pub peer_event: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp and
    /// next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            phase: None,
            remaining: None,
            initiator: None,
            reason: None,
            target: None,
            peer_event: None,
        }
    }

    /// Attaches the restore phase.
    #[inline]
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Attaches a seconds count (countdown remaining or window length).
    #[inline]
    pub fn with_remaining(mut self, seconds: u32) -> Self {
        self.remaining = Some(seconds);
        self
    }

    /// Attaches the initiator identity.
    #[inline]
    pub fn with_initiator(mut self, initiator: impl Into<Arc<str>>) -> Self {
        self.initiator = Some(initiator.into());
        self
    }

    /// Attaches a human-readable reason or status.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches the world or session this event refers to.
    #[inline]
    pub fn with_target(mut self, target: impl Into<Arc<str>>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Attaches the peer event name for passthrough broadcasts.
    #[inline]
    pub fn with_peer_event(mut self, name: impl Into<Arc<str>>) -> Self {
        self.peer_event = Some(name.into());
        self
    }
}
