//! # The irreversible shutdown sequence.
//!
//! Save every world, evict every session, notify the daemon, hand off to the
//! restart strategy, stop the host. Four steps, best-effort throughout: a
//! world that fails to save or a session that resists eviction is logged and
//! the sequence continues — a restore already underway gains nothing from a
//! blocked shutdown.
//!
//! ```text
//! 1. mark shared state: restoring + awaiting stop ack
//! 2. worlds.save_all()          (per-world failures logged, not fatal)
//! 3. sessions.evict_all()       (per-session failures logged, not fatal)
//! 4. after ~500ms flush delay: fire-and-forget WORLD_SAVE_AND_EXIT_COMPLETE
//! 5. clear the slot, restart strategy hand-off, host terminate
//! ```
//!
//! Step 5 is the point of no return. The 500ms delay lets the eviction
//! notifications flush before the daemon is told the server is gone; the
//! notify is spawned and never awaited, mirroring the daemon's expectation
//! that the server may die at any moment afterwards.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{info, warn};

use crate::events::{Event, EventKind};
use crate::link::wire;

use super::task::{RestoreTask, TaskDeps};

/// Machine token handed to the session gate; the host maps it to translated
/// user-facing text.
const EVICT_REASON: &str = "world_restore";

/// Delay before notifying the daemon, so eviction notifications can flush.
const NOTIFY_FLUSH_DELAY: Duration = Duration::from_millis(500);

/// Runs the four-step sequence. `task` is the owning restore task when one
/// exists; the dispatcher's last-resort direct path passes `None`.
pub(crate) async fn run_sequence(deps: &TaskDeps, task: Option<&Arc<RestoreTask>>) {
    let initiator: Arc<str> = task
        .map(|t| Arc::from(t.initiator()))
        .unwrap_or_else(|| Arc::from("direct"));

    // ---- 1. Mark process-wide state ----
    deps.shared.set_restoring(true);
    deps.shared.set_awaiting_stop_ack(true);
    deps.bus
        .publish(Event::new(EventKind::ShutdownStarted).with_initiator(Arc::clone(&initiator)));

    // ---- 2. Save all worlds ----
    info!("saving all worlds");
    let save_start = Instant::now();
    let reports = deps.worlds.save_all().await;
    let mut failures = 0usize;
    for report in &reports {
        if let Err(e) = &report.outcome {
            failures += 1;
            warn!(world = %report.target, error = %e, "world save failed");
            deps.bus.publish(
                Event::new(EventKind::WorldSaveFailed)
                    .with_target(report.target.clone())
                    .with_reason(e.message.clone()),
            );
        }
    }
    info!(
        worlds = reports.len(),
        failures,
        elapsed_ms = save_start.elapsed().as_millis() as u64,
        "world save pass finished"
    );

    // ---- 3. Evict all sessions ----
    let reports = deps.sessions.evict_all(EVICT_REASON).await;
    info!(sessions = reports.len(), "evicting sessions");
    for report in &reports {
        if let Err(e) = &report.outcome {
            warn!(session = %report.target, error = %e, "session eviction failed");
            deps.bus.publish(
                Event::new(EventKind::SessionEvictFailed)
                    .with_target(report.target.clone())
                    .with_reason(e.message.clone()),
            );
        }
    }

    // ---- 4. Notify the daemon, fire-and-forget ----
    {
        let querier = deps.querier.clone();
        let bus = deps.bus.clone();
        tokio::spawn(async move {
            time::sleep(NOTIFY_FLUSH_DELAY).await;
            let _ = querier.query(wire::CMD_SAVE_AND_EXIT_COMPLETE).await;
            info!("save-and-exit-complete signal sent");
            bus.publish(Event::new(EventKind::PeerNotified));
        });
    }

    // ---- 5. Point of no return ----
    if let Some(task) = task {
        info!(
            initiator = %initiator,
            remote = task.is_remote(),
            total_ms = task.elapsed().as_millis() as u64,
            "restore pipeline complete, stopping host"
        );
        deps.slot.clear_if(task);
    } else {
        info!("direct restore shutdown, stopping host");
    }
    deps.restart.prepare(&deps.control).await;
    deps.control.terminate();
}
