//! Simple built-in log observer (demo/reference only).
//!
//! Real deployments translate events into player-facing chat and audit files
//! on the host side; [`LogWriter`] just prints a compact line per event and
//! exists so the crate is observable out of the box.

use async_trait::async_trait;

use crate::events::{Event, EventKind};

use super::Observe;

/// Prints one line per event to stdout.
#[derive(Debug, Default)]
pub struct LogWriter;

impl LogWriter {
    /// Creates a new log writer.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Observe for LogWriter {
    async fn on_event(&self, e: &Event) {
        match e.kind {
            EventKind::ConfirmAwaited => {
                println!(
                    "[restore] awaiting confirmation (window={:?}s, initiator={:?})",
                    e.remaining, e.initiator
                );
            }
            EventKind::CountdownStarted => {
                println!("[restore] countdown started: {:?}s", e.remaining);
            }
            EventKind::CountdownTick => {
                println!("[restore] {} ...", e.remaining.unwrap_or_default());
            }
            EventKind::Aborted => {
                println!(
                    "[restore] aborted in {:?} (reason={:?})",
                    e.phase, e.reason
                );
            }
            EventKind::Executing => println!("[restore] executing"),
            EventKind::ShutdownStarted => println!("[restore] shutdown sequence started"),
            EventKind::WorldSaveFailed => {
                println!(
                    "[restore] world save failed: {:?} ({:?})",
                    e.target, e.reason
                );
            }
            EventKind::RestoreFinished => {
                println!("[restore] finished, status={:?}", e.reason);
            }
            EventKind::PeerBroadcast => {
                println!("[peer] {:?}: {:?}", e.peer_event, e.reason);
            }
            kind => println!("[event] {kind:?}"),
        }
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
