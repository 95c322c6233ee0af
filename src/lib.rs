//! # vaultlink
//!
//! **Vaultlink** is the server-side agent that lets a game server coordinate
//! destructive world restores with an external backup daemon over loopback
//! TCP.
//!
//! It solves two problems: a minimal IPC transport (a persistent
//! subscription channel with heartbeating plus an ephemeral querier), and a
//! restore state machine that guarantees at most one restore is ever in
//! flight, survives out-of-order peer acknowledgments, and performs the
//! irreversible save → evict → notify → restart shutdown exactly once.
//!
//! ## Architecture
//! ```text
//!            backup daemon (loopback TCP)
//!          ▲ 6376 queries          │ 6372 broadcasts
//!          │                       ▼
//!   ┌──────┴───────┐      ┌───────────────────┐
//!   │   Querier    │      │ SignalSubscriber  │  reader + heartbeat tasks
//!   │ (per-command │      │  (one long-lived  │
//!   │  connection) │      │   connection)     │
//!   └──────▲───────┘      └─────────┬─────────┘
//!          │                        │ bounded frame channel
//!          │                        ▼
//! ┌────────┴────────────────────────────────────────────────┐
//! │  Coordinator (single serialized dispatcher)             │
//! │  - TaskSlot (at most one RestoreTask system-wide)       │
//! │  - SharedState (restoring flags, handshake cache)       │
//! │  - RestoreTask phase machine:                           │
//! │      NONE → WAITING_CONFIRM → COUNTDOWN → EXECUTING     │
//! │  - shutdown sequence (save → evict → notify → restart)  │
//! └───────┬────────────────────────────────┬────────────────┘
//!         ▼                                ▼
//!   Bus (broadcast events)          host collaborators
//!         │                         (WorldStore, SessionGate,
//!         ▼                          HostControl, RestartStrategy)
//!   ObserverSet ─► chat / audit / metrics observers
//! ```
//!
//! ## Lifecycle
//! ```text
//! operator ──► Coordinator::start_local(command, who)
//!   ├─► WAITING_CONFIRM ─ confirm() ─► COUNTDOWN ─► EXECUTING
//!   │        └─ timeout/abort ─► NONE                  │
//!   │                                                  │ sends command,
//!   │                                                  ▼ awaits peer ack
//! daemon ──► pre_hot_restore ──► Coordinator dispatcher
//!   ├─ local task EXECUTING → run the shutdown sequence
//!   ├─ other task active    → abort it, start a remote task
//!   └─ idle                 → start a remote task
//! ```
//!
//! ## Features
//! | Area           | Description                                         | Key types                            |
//! |----------------|-----------------------------------------------------|--------------------------------------|
//! | **Transport**  | Query and subscribe to the daemon over raw TCP.     | [`Querier`], [`SignalSubscriber`]    |
//! | **Restore**    | Single-flight restore pipeline with timers.         | [`Coordinator`], [`Phase`]           |
//! | **State**      | Process-wide flags and handshake cache.             | [`SharedState`]                      |
//! | **Observers**  | Hook into restore lifecycle events.                 | [`Observe`], [`Event`], [`Bus`]      |
//! | **Host seams** | Implemented by the embedding server.                | [`WorldStore`], [`SessionGate`], [`HostControl`] |
//! | **Restart**    | Supervisor hand-off after the shutdown sequence.    | [`RestartStrategy`], [`RestartMethod`] |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] observer
//!   _(demo/reference only)_.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use vaultlink::{Config, Coordinator, SignalSubscriber};
//! # use vaultlink::{HostControl, HostError, SessionGate, TargetReport, WorldStore};
//! # struct Engine;
//! # #[async_trait::async_trait]
//! # impl WorldStore for Engine {
//! #     async fn save_all(&self) -> Vec<TargetReport> { Vec::new() }
//! # }
//! # #[async_trait::async_trait]
//! # impl SessionGate for Engine {
//! #     async fn evict_all(&self, _reason: &str) -> Vec<TargetReport> { Vec::new() }
//! # }
//! # #[async_trait::async_trait]
//! # impl HostControl for Engine {
//! #     fn terminate(&self) {}
//! #     async fn restart_in_process(&self) -> Result<(), HostError> { Ok(()) }
//! # }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config::default();
//!     let engine = Arc::new(Engine);
//!     let coordinator = Coordinator::new(
//!         cfg.clone(),
//!         engine.clone(),
//!         engine.clone(),
//!         engine,
//!     );
//!
//!     // Detect a post-restore boot and clear stale state.
//!     if coordinator.restart().is_post_restore_start() {
//!         coordinator.restart().cleanup_marker();
//!         coordinator.shared().reset();
//!     }
//!
//!     // Subscribe to the daemon's broadcasts and run the dispatcher.
//!     let handle = SignalSubscriber::from_config(&cfg).connect().await?;
//!     coordinator.run(handle).await;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod events;
mod host;
mod observers;
mod restart;
mod restore;

pub mod link;

// ---- Public re-exports ----

pub use config::Config;
pub use error::{HostError, LinkError};
pub use events::{Bus, Event, EventKind};
pub use host::{HostControl, SessionGate, TargetReport, WorldStore};
pub use link::{Querier, SignalSubscriber, SubscriberHandle};
pub use observers::{Observe, ObserverSet};
pub use restart::{RestartMethod, RestartStrategy};
pub use restore::{version_compatible, Coordinator, HandshakeInfo, Phase, SharedState};

// Optional: expose a simple built-in log observer (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use observers::LogWriter;

/// Version this agent reports during the handshake exchange.
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");
