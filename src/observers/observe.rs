//! # Event observer trait.
//!
//! [`Observe`] is the extension point for plugging custom event handlers
//! into the agent: chat broadcasters, audit loggers, metrics exporters.
//!
//! Each observer gets:
//! - **Dedicated worker task** (runs independently)
//! - **Per-observer bounded queue** (capacity via [`Observe::queue_capacity`])
//! - **Panic isolation** (panics are caught and logged)
//!
//! ## Rules
//! - A slow observer only affects its own queue.
//! - Queue overflow drops the event **for this observer only**; others are
//!   unaffected.
//! - Events are processed sequentially (FIFO) per observer.
//! - Observers never block publishers or each other.

use async_trait::async_trait;

use crate::events::Event;

/// Event observer for restore lifecycle observability.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Handle errors internally; do not panic.
/// - Translate [`Event`]s into user-facing text on the host side — this
///   crate publishes facts, not messages.
#[async_trait]
pub trait Observe: Send + Sync + 'static {
    /// Processes a single event.
    ///
    /// Called from a dedicated worker task, never from the publisher
    /// context. Events arrive in FIFO order per observer.
    async fn on_event(&self, event: &Event);

    /// Returns the observer name used in logs.
    ///
    /// Prefer short, descriptive names (e.g. "chat", "audit", "metrics").
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Returns the preferred queue capacity for this observer.
    ///
    /// The runtime clamps capacity to a minimum of 1. Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
