//! # Coordinator: the restore context object.
//!
//! [`Coordinator`] owns everything the restore pipeline shares: the global
//! single-task slot, the process-wide [`SharedState`], the event bus, the
//! querier, the host collaborator handles, and the restart strategy. It is
//! the entry point for both sides of the system:
//!
//! - **operators** call [`Coordinator::start_local`] /
//!   [`Coordinator::confirm`] / [`Coordinator::abort`];
//! - **the daemon** reaches it through [`Coordinator::handle_frame`], fed by
//!   the subscriber's frame channel via [`Coordinator::run`].
//!
//! ## Serialized dispatch
//! [`Coordinator::run`] is the single consumer of the frame channel; every
//! peer-driven mutation of restore state happens inside that one loop.
//! Operator calls funnel through the same mutex-protected task transitions,
//! so no transition ever races another.
//!
//! ## Peer event classification
//! ```text
//! "minebackup save"          → save all worlds now
//! event=handshake            → cache versions, reply HANDSHAKE_RESPONSE
//! event=pre_hot_backup       → save all worlds, notify WORLD_SAVED
//! event=pre_hot_restore      → ack a local EXECUTING restore,
//!                              or preempt whatever else is running
//!                              and start a peer-driven restore
//! event=restore_finished     → publish status, reset shared flags
//! event=restore_success      → same, status forced to success
//! event=game_session_start   → informational
//! anything else with event=  → passthrough broadcast for observers
//! no event key               → ignored (never an error)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::events::{Bus, Event, EventKind};
use crate::host::{HostControl, SessionGate, TargetReport, WorldStore};
use crate::link::{wire, Querier, SubscriberHandle};
use crate::observers::{Observe, ObserverSet};
use crate::restart::RestartStrategy;
use crate::AGENT_VERSION;

use super::shutdown;
use super::slot::TaskSlot;
use super::state::{version_compatible, SharedState};
use super::task::{Phase, RestoreTask, TaskDeps};

/// Owns the restore pipeline and dispatches peer events into it.
pub struct Coordinator {
    pub(crate) deps: Arc<TaskDeps>,
}

impl Coordinator {
    /// Creates a coordinator wired to the given host collaborators.
    pub fn new(
        cfg: Config,
        worlds: Arc<dyn WorldStore>,
        sessions: Arc<dyn SessionGate>,
        control: Arc<dyn HostControl>,
    ) -> Self {
        let bus = Bus::new(cfg.bus_capacity);
        let querier = Querier::from_config(&cfg);
        let restart = RestartStrategy::from_config(&cfg);
        Self {
            deps: Arc::new(TaskDeps {
                cfg,
                bus,
                querier,
                shared: Arc::new(SharedState::new()),
                slot: Arc::new(TaskSlot::new()),
                worlds,
                sessions,
                control,
                restart,
            }),
        }
    }

    /// The event bus; subscribe for restore lifecycle events.
    pub fn bus(&self) -> &Bus {
        &self.deps.bus
    }

    /// The process-wide restore state.
    pub fn shared(&self) -> &Arc<SharedState> {
        &self.deps.shared
    }

    /// The restart strategy (for boot-time marker checks).
    pub fn restart(&self) -> &RestartStrategy {
        &self.deps.restart
    }

    /// Spawns a listener forwarding bus events to the given observers.
    ///
    /// Fan-out is non-blocking with per-observer queues; see
    /// [`ObserverSet`].
    pub fn attach_observers(&self, observers: Vec<Arc<dyn Observe>>) {
        let set = ObserverSet::new(observers);
        let mut rx = self.deps.bus.subscribe();
        tokio::spawn(async move {
            while let Ok(ev) = rx.recv().await {
                set.emit(&ev);
            }
        });
    }

    // ---- Operator surface ----

    /// Starts an operator-initiated restore carrying the command to send to
    /// the daemon when the countdown completes.
    ///
    /// Returns `false` when a restore is already running or the command is
    /// empty.
    pub async fn start_local(&self, command: impl Into<String>, initiator: &str) -> bool {
        let command = command.into();
        if command.trim().is_empty() {
            warn!("refusing restore with an empty command");
            return false;
        }
        let task = RestoreTask::local(Arc::clone(&self.deps), command, initiator);
        task.start().await
    }

    /// Starts a peer-initiated restore.
    pub async fn start_remote(&self) -> bool {
        let task = RestoreTask::remote(Arc::clone(&self.deps));
        task.start().await
    }

    /// Confirms the pending restore. Fails unless one is waiting for
    /// confirmation.
    pub fn confirm(&self) -> bool {
        match self.deps.slot.current() {
            Some(task) => task.confirm(),
            None => false,
        }
    }

    /// Aborts the running restore. Fails when there is nothing to abort or
    /// the restore is already executing.
    pub fn abort(&self, reason: &str) -> bool {
        match self.deps.slot.current() {
            Some(task) => task.abort(reason),
            None => false,
        }
    }

    /// Phase of the current restore, [`Phase::None`] when idle.
    pub fn phase(&self) -> Phase {
        self.deps
            .slot
            .current()
            .map(|task| task.phase())
            .unwrap_or(Phase::None)
    }

    /// True while a restore task is in a non-terminal phase.
    pub fn has_active_task(&self) -> bool {
        self.deps.slot.has_active()
    }

    // ---- Peer surface ----

    /// Consumes the subscriber's frame channel until the connection is gone.
    ///
    /// This loop is the single serialized consumer of peer input; run it
    /// from exactly one task.
    pub async fn run(&self, mut handle: SubscriberHandle) {
        while let Some(frame) = handle.recv().await {
            self.handle_frame(&frame).await;
        }
        info!("broadcast channel closed, dispatcher stopped");
    }

    /// Classifies one broadcast frame and routes it into the pipeline.
    ///
    /// Malformed frames are logged and dropped; this never fails.
    pub async fn handle_frame(&self, payload: &str) {
        debug!(payload, "broadcast frame received");

        // The remote-save trigger is a bare control string, not a record.
        if payload == wire::REMOTE_SAVE_TRIGGER {
            self.handle_remote_save().await;
            return;
        }

        let record = wire::parse_record(payload);
        let Some(event) = record.get(wire::EVENT_KEY) else {
            debug!(payload, "ignoring broadcast without an event key");
            return;
        };

        info!(event, "peer event received");
        match event.as_str() {
            "handshake" => self.handle_handshake(&record),
            "pre_hot_backup" => self.handle_pre_hot_backup().await,
            "pre_hot_restore" => self.handle_pre_hot_restore().await,
            "restore_finished" | "restore_success" => {
                self.handle_restore_finished(event, &record);
            }
            "game_session_start" => {
                let world = record.get("world").cloned().unwrap_or_default();
                info!(world, "game session started");
                let mut ev = Event::new(EventKind::SessionStarted);
                if !world.is_empty() {
                    ev = ev.with_target(world);
                }
                self.deps.bus.publish(ev);
            }
            other => {
                // Unknown to the pipeline; observers may still display it.
                let mut ev = Event::new(EventKind::PeerBroadcast)
                    .with_peer_event(other.to_string())
                    .with_reason(payload.to_string());
                if let Some(world) = record.get("world") {
                    ev = ev.with_target(world.clone());
                }
                self.deps.bus.publish(ev);
            }
        }
    }

    /// `"minebackup save"`: the daemon wants the worlds flushed now.
    async fn handle_remote_save(&self) {
        info!("remote save requested");
        self.deps.bus.publish(Event::new(EventKind::RemoteSaveRequested));

        let failures = self.save_worlds_reporting().await;
        let mut ev = Event::new(EventKind::RemoteSaveCompleted);
        if failures > 0 {
            ev = ev.with_reason("partial");
        }
        self.deps.bus.publish(ev);
    }

    /// `handshake`: cache the daemon's version info and identify ourselves.
    fn handle_handshake(&self, record: &HashMap<String, String>) {
        let peer_version = record.get("version").cloned();
        let required = record.get("min_mod_version").cloned();
        let compatible = version_compatible(AGENT_VERSION, required.as_deref());

        info!(
            peer_version = peer_version.as_deref(),
            required = required.as_deref(),
            compatible,
            "handshake received"
        );
        self.deps
            .shared
            .record_handshake(peer_version.clone(), required.clone(), compatible);

        let querier = self.deps.querier.clone();
        tokio::spawn(async move {
            let reply = querier
                .query(&format!("{} {}", wire::CMD_HANDSHAKE_RESPONSE, AGENT_VERSION))
                .await;
            debug!(reply, "handshake response sent");
        });

        if compatible {
            let mut ev = Event::new(EventKind::HandshakeCompleted);
            if let Some(v) = peer_version {
                ev = ev.with_reason(v);
            }
            self.deps.bus.publish(ev);
        } else {
            warn!(
                agent = AGENT_VERSION,
                required = required.as_deref(),
                "agent version below the daemon's minimum"
            );
            let mut ev = Event::new(EventKind::VersionIncompatible);
            if let Some(r) = required {
                ev = ev.with_reason(r);
            }
            self.deps.bus.publish(ev);
        }
    }

    /// `pre_hot_backup`: flush worlds, then tell the daemon to proceed.
    async fn handle_pre_hot_backup(&self) {
        self.deps.bus.publish(Event::new(EventKind::HotBackupRequested));
        let failures = self.save_worlds_reporting().await;
        if failures > 0 {
            warn!(failures, "hot backup proceeding with partial world save");
        }
        self.deps.bus.publish(Event::new(EventKind::HotBackupCompleted));

        let querier = self.deps.querier.clone();
        tokio::spawn(async move {
            let reply = querier.query(wire::CMD_WORLD_SAVED).await;
            debug!(reply, "world-saved notification sent");
        });
    }

    /// `pre_hot_restore`: the daemon is about to restore. Three cases:
    ///
    /// 1. a local task already sent its restore command and is EXECUTING —
    ///    this frame is its acknowledgment; run the shutdown sequence;
    /// 2. any other task is active — the peer is authoritative: abort it and
    ///    start a fresh peer-driven task;
    /// 3. nothing is running — start a peer-driven task.
    async fn handle_pre_hot_restore(&self) {
        let current = self.deps.slot.current();

        if let Some(task) = &current {
            if task.phase() == Phase::Executing && !task.is_remote() {
                info!("daemon acknowledged local restore, running shutdown sequence");
                task.perform_shutdown().await;
                return;
            }
            if task.phase() != Phase::None {
                warn!(
                    phase = %task.phase(),
                    "peer restore preempts the task in progress"
                );
                task.abort("remote_override");
            }
        }
        self.start_remote_or_fallback().await;
    }

    /// Starts a peer-driven task; the last-resort direct shutdown covers the
    /// case where the slot cannot be won (stale occupant that never cleared).
    async fn start_remote_or_fallback(&self) {
        if !self.start_remote().await {
            error!("could not install peer restore task, shutting down directly");
            shutdown::run_sequence(&self.deps, None).await;
        }
    }

    /// `restore_finished` / `restore_success`: the daemon's final word.
    fn handle_restore_finished(&self, event: &str, record: &HashMap<String, String>) {
        let status = if event == "restore_success" {
            "success".to_string()
        } else {
            record
                .get("status")
                .cloned()
                .unwrap_or_else(|| "success".to_string())
        };
        info!(event, status, "restore completion reported");
        if status != "success" {
            warn!(status, "daemon reported a failed restore");
        }
        self.deps
            .bus
            .publish(Event::new(EventKind::RestoreFinished).with_reason(status));
        self.deps.shared.reset();
    }

    /// Saves all worlds, publishing one event per failed world. Returns the
    /// failure count.
    async fn save_worlds_reporting(&self) -> usize {
        let reports: Vec<TargetReport> = self.deps.worlds.save_all().await;
        let mut failures = 0;
        for report in &reports {
            if let Err(e) = &report.outcome {
                failures += 1;
                warn!(world = %report.target, error = %e, "world save failed");
                self.deps.bus.publish(
                    Event::new(EventKind::WorldSaveFailed)
                        .with_target(report.target.clone())
                        .with_reason(e.message.clone()),
                );
            }
        }
        debug!(worlds = reports.len(), failures, "world save pass finished");
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::restore::testutil::{test_config, Harness};
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::broadcast;

    /// Receives events until one of `kind` arrives, collecting everything on
    /// the way. Panics if the bus closes first.
    async fn events_until(
        rx: &mut broadcast::Receiver<Event>,
        kind: EventKind,
    ) -> Vec<Event> {
        let mut seen = Vec::new();
        loop {
            let ev = rx.recv().await.expect("bus closed while waiting");
            let done = ev.kind == kind;
            seen.push(ev);
            if done {
                return seen;
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_starts_yield_exactly_one_success() {
        let h = Harness::new();
        let coordinator = Arc::new(h.coordinator());

        let mut handles = Vec::new();
        for i in 0..8 {
            let c = Arc::clone(&coordinator);
            handles.push(tokio::spawn(async move {
                c.start_local(format!("RESTORE 1 0 b{i}.zip"), "operator").await
            }));
        }
        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1, "exactly one concurrent start may succeed");
        assert!(coordinator.has_active_task());
        assert_eq!(coordinator.phase(), Phase::WaitingConfirm);
    }

    #[tokio::test]
    async fn test_confirm_without_pending_task_fails() {
        let h = Harness::new();
        let coordinator = h.coordinator();
        assert!(!coordinator.confirm());
        assert_eq!(coordinator.phase(), Phase::None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirm_outside_waiting_never_mutates_phase() {
        let mut cfg = test_config();
        cfg.require_confirm = false;
        cfg.countdown_secs = 30;
        let h = Harness::with_config(cfg);
        let coordinator = h.coordinator();

        assert!(coordinator.start_local("RESTORE 1 0 b.zip", "operator").await);
        assert_eq!(coordinator.phase(), Phase::Countdown);
        assert!(!coordinator.confirm(), "confirm is only valid while waiting");
        assert_eq!(coordinator.phase(), Phase::Countdown);
    }

    #[tokio::test]
    async fn test_abort_succeeds_exactly_once() {
        let h = Harness::new();
        let coordinator = h.coordinator();

        assert!(coordinator.start_local("RESTORE 1 0 b.zip", "operator").await);
        let task = h.deps.slot.current().unwrap();
        assert!(task.abort("operator_request"));
        assert!(!task.abort("second_caller"), "second abort must lose");
        assert!(!coordinator.has_active_task());
        assert!(!coordinator.abort("third"), "slot is already empty");
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirm_timeout_frees_the_slot() {
        let mut cfg = test_config();
        cfg.confirm_timeout_secs = 10;
        let h = Harness::with_config(cfg);
        let coordinator = h.coordinator();
        let mut rx = coordinator.bus().subscribe();

        assert!(coordinator.start_local("RESTORE 1 0 b.zip", "operator").await);
        assert_eq!(coordinator.phase(), Phase::WaitingConfirm);

        let seen = events_until(&mut rx, EventKind::ConfirmTimedOut).await;
        assert_eq!(
            seen.iter()
                .filter(|e| e.kind == EventKind::ConfirmTimedOut)
                .count(),
            1,
            "the timeout fires exactly once"
        );
        assert!(!coordinator.has_active_task());
        // A fresh start succeeds against the now-empty slot.
        assert!(coordinator.start_local("RESTORE 1 0 b.zip", "operator").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_announcement_sequence_for_twelve_seconds() {
        let mut cfg = test_config();
        cfg.require_confirm = false;
        cfg.countdown_secs = 12;
        let h = Harness::with_config(cfg);
        let coordinator = h.coordinator();
        let mut rx = coordinator.bus().subscribe();

        assert!(coordinator.start_local("RESTORE 1 0 b.zip", "operator").await);
        let seen = events_until(&mut rx, EventKind::Executing).await;

        let announced: Vec<u32> = seen
            .iter()
            .filter(|e| {
                matches!(e.kind, EventKind::CountdownStarted | EventKind::CountdownTick)
            })
            .filter_map(|e| e.remaining)
            .collect();
        assert_eq!(announced, vec![12, 10, 5, 4, 3, 2, 1]);

        // Local completion does not shut the server down by itself.
        assert_eq!(coordinator.phase(), Phase::Executing);
        assert!(h.deps.shared.is_restoring());
        assert_eq!(h.control.terminations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmed_restore_proceeds_to_countdown() {
        let mut cfg = test_config();
        cfg.countdown_secs = 3;
        let h = Harness::with_config(cfg);
        let coordinator = h.coordinator();
        let mut rx = coordinator.bus().subscribe();

        assert!(coordinator.start_local("RESTORE 1 0 b.zip", "operator").await);
        assert!(coordinator.confirm());
        assert!(!coordinator.confirm(), "confirm is one-shot");

        let seen = events_until(&mut rx, EventKind::Executing).await;
        assert!(seen.iter().any(|e| e.kind == EventKind::Confirmed));
        assert!(seen
            .iter()
            .any(|e| e.kind == EventKind::CountdownStarted && e.remaining == Some(3)));
    }

    #[tokio::test]
    async fn test_remote_without_countdown_runs_shutdown_exactly_once() {
        let mut cfg = test_config();
        cfg.remote_countdown = false;
        let h = Harness::with_config(cfg);
        let coordinator = h.coordinator();

        assert!(coordinator.start_remote().await);

        assert_eq!(h.worlds.save_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.sessions.evict_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.control.terminations.load(Ordering::SeqCst), 1);
        assert!(h.deps.shared.is_restoring());
        assert!(h.deps.shared.is_awaiting_stop_ack());
        assert!(!coordinator.has_active_task(), "slot cleared after shutdown");
    }

    #[tokio::test]
    async fn test_repeated_perform_shutdown_is_rejected() {
        let mut cfg = test_config();
        cfg.remote_countdown = false;
        let h = Harness::with_config(cfg);

        let task = RestoreTask::remote(Arc::clone(&h.deps));
        assert!(task.start().await);
        assert_eq!(h.control.terminations.load(Ordering::SeqCst), 1);

        assert!(!task.perform_shutdown().await, "second run must be rejected");
        assert_eq!(h.control.terminations.load(Ordering::SeqCst), 1);
        assert_eq!(h.worlds.save_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_countdown_then_shutdown() {
        let mut cfg = test_config();
        cfg.remote_countdown = true;
        cfg.remote_countdown_secs = 3;
        let h = Harness::with_config(cfg);
        let coordinator = h.coordinator();
        let mut rx = coordinator.bus().subscribe();

        assert!(coordinator.start_remote().await);
        let seen = events_until(&mut rx, EventKind::ShutdownStarted).await;

        assert!(seen.iter().any(|e| e.kind == EventKind::RemoteInitiated));
        let announced: Vec<u32> = seen
            .iter()
            .filter(|e| {
                matches!(e.kind, EventKind::CountdownStarted | EventKind::CountdownTick)
            })
            .filter_map(|e| e.remaining)
            .collect();
        assert_eq!(announced, vec![3, 3, 2, 1]);
        assert_eq!(h.control.terminations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pre_hot_restore_acknowledges_executing_local_task() {
        let mut cfg = test_config();
        cfg.require_confirm = false;
        cfg.countdown_secs = 0;
        let h = Harness::with_config(cfg);
        let coordinator = h.coordinator();
        let mut rx = coordinator.bus().subscribe();

        assert!(coordinator.start_local("RESTORE 1 0 b.zip", "operator").await);
        events_until(&mut rx, EventKind::Executing).await;
        assert_eq!(coordinator.phase(), Phase::Executing);
        assert_eq!(h.control.terminations.load(Ordering::SeqCst), 0);

        coordinator.handle_frame("event=pre_hot_restore").await;

        assert_eq!(h.control.terminations.load(Ordering::SeqCst), 1);
        assert_eq!(h.worlds.save_calls.load(Ordering::SeqCst), 1);
        assert!(!coordinator.has_active_task());
    }

    #[tokio::test]
    async fn test_pre_hot_restore_preempts_a_waiting_task() {
        let mut cfg = test_config();
        cfg.remote_countdown = false;
        let h = Harness::with_config(cfg);
        let coordinator = h.coordinator();
        let mut rx = coordinator.bus().subscribe();

        assert!(coordinator.start_local("RESTORE 1 0 b.zip", "operator").await);
        assert_eq!(coordinator.phase(), Phase::WaitingConfirm);

        coordinator.handle_frame("event=pre_hot_restore").await;

        let seen = events_until(&mut rx, EventKind::ShutdownStarted).await;
        let aborted = seen
            .iter()
            .find(|e| e.kind == EventKind::Aborted)
            .expect("stale local task must be aborted");
        assert_eq!(aborted.reason.as_deref(), Some("remote_override"));
        assert_eq!(aborted.phase, Some(Phase::WaitingConfirm));
        assert_eq!(h.control.terminations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pre_hot_restore_with_idle_slot_starts_remote_task() {
        let mut cfg = test_config();
        cfg.remote_countdown = false;
        let h = Harness::with_config(cfg);
        let coordinator = h.coordinator();

        coordinator.handle_frame("event=pre_hot_restore").await;
        assert_eq!(h.control.terminations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handshake_caches_state_and_replies() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            let mut buf = [0u8; 4096];
            let n = sock.read(&mut buf).await.unwrap();
            sock.write_all(b"OK:").await.unwrap();
            String::from_utf8_lossy(&buf[..n]).into_owned()
        });

        let mut cfg = test_config();
        cfg.query_port = port;
        let h = Harness::with_config(cfg);
        let coordinator = h.coordinator();

        coordinator
            .handle_frame("event=handshake;version=2.3.0;min_mod_version=1.0.0")
            .await;

        let request = server.await.unwrap();
        assert_eq!(
            request,
            format!("0x00000020-0x00000010&*&HANDSHAKE_RESPONSE {AGENT_VERSION}")
        );
        let hs = h.deps.shared.handshake();
        assert!(hs.completed);
        assert_eq!(hs.peer_version.as_deref(), Some("2.3.0"));
        assert_eq!(hs.required_min_version.as_deref(), Some("1.0.0"));
        assert!(hs.compatible);
    }

    #[tokio::test]
    async fn test_handshake_flags_incompatible_agent() {
        let h = Harness::new();
        let coordinator = h.coordinator();
        let mut rx = coordinator.bus().subscribe();

        coordinator
            .handle_frame("event=handshake;version=9.0.0;min_mod_version=9.0.0")
            .await;

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::VersionIncompatible);
        assert_eq!(ev.reason.as_deref(), Some("9.0.0"));
        assert!(!h.deps.shared.handshake().compatible);
    }

    #[tokio::test]
    async fn test_restore_finished_resets_shared_flags() {
        let h = Harness::new();
        let coordinator = h.coordinator();
        let mut rx = coordinator.bus().subscribe();
        h.deps.shared.set_restoring(true);
        h.deps.shared.set_awaiting_stop_ack(true);

        coordinator
            .handle_frame("event=restore_finished;status=success")
            .await;

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::RestoreFinished);
        assert_eq!(ev.reason.as_deref(), Some("success"));
        assert!(!h.deps.shared.is_restoring());
        assert!(!h.deps.shared.is_awaiting_stop_ack());
    }

    #[tokio::test]
    async fn test_restore_success_event_forces_success_status() {
        let h = Harness::new();
        let coordinator = h.coordinator();
        let mut rx = coordinator.bus().subscribe();
        h.deps.shared.set_restoring(true);

        coordinator.handle_frame("event=restore_success").await;

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.reason.as_deref(), Some("success"));
        assert!(!h.deps.shared.is_restoring());
    }

    #[tokio::test]
    async fn test_remote_save_trigger_saves_worlds() {
        let h = Harness::new();
        let coordinator = h.coordinator();
        let mut rx = coordinator.bus().subscribe();

        coordinator.handle_frame(wire::REMOTE_SAVE_TRIGGER).await;

        assert_eq!(h.worlds.save_calls.load(Ordering::SeqCst), 1);
        let seen = events_until(&mut rx, EventKind::RemoteSaveCompleted).await;
        assert!(seen.iter().any(|e| e.kind == EventKind::RemoteSaveRequested));
        assert!(seen.last().unwrap().reason.is_none(), "full save, no partial flag");
    }

    #[tokio::test]
    async fn test_remote_save_reports_partial_failures() {
        let h = Harness::new();
        h.worlds.fail_world("beta");
        let coordinator = h.coordinator();
        let mut rx = coordinator.bus().subscribe();

        coordinator.handle_frame(wire::REMOTE_SAVE_TRIGGER).await;

        let seen = events_until(&mut rx, EventKind::RemoteSaveCompleted).await;
        let failed = seen
            .iter()
            .find(|e| e.kind == EventKind::WorldSaveFailed)
            .expect("the failing world must be reported");
        assert_eq!(failed.target.as_deref(), Some("beta"));
        assert_eq!(seen.last().unwrap().reason.as_deref(), Some("partial"));
    }

    #[tokio::test]
    async fn test_pre_hot_backup_saves_and_notifies() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            let mut buf = [0u8; 4096];
            let n = sock.read(&mut buf).await.unwrap();
            sock.write_all(b"OK:").await.unwrap();
            String::from_utf8_lossy(&buf[..n]).into_owned()
        });

        let mut cfg = test_config();
        cfg.query_port = port;
        let h = Harness::with_config(cfg);
        let coordinator = h.coordinator();

        coordinator.handle_frame("event=pre_hot_backup").await;

        assert_eq!(h.worlds.save_calls.load(Ordering::SeqCst), 1);
        let request = server.await.unwrap();
        assert!(request.ends_with("&*&WORLD_SAVED"));
    }

    #[tokio::test]
    async fn test_frame_without_event_key_is_ignored() {
        let h = Harness::new();
        let coordinator = h.coordinator();
        let mut rx = coordinator.bus().subscribe();

        coordinator.handle_frame("status=ok;world=alpha").await;
        coordinator.handle_frame("").await;

        assert_eq!(h.worlds.save_calls.load(Ordering::SeqCst), 0);
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_unknown_event_passes_through_to_observers() {
        let h = Harness::new();
        let coordinator = h.coordinator();
        let mut rx = coordinator.bus().subscribe();

        coordinator
            .handle_frame("event=backup_success;world=alpha;file=a.zip")
            .await;

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::PeerBroadcast);
        assert_eq!(ev.peer_event.as_deref(), Some("backup_success"));
        assert_eq!(ev.target.as_deref(), Some("alpha"));
    }

    #[tokio::test]
    async fn test_empty_restore_command_is_refused() {
        let h = Harness::new();
        let coordinator = h.coordinator();
        assert!(!coordinator.start_local("   ", "operator").await);
        assert!(!coordinator.has_active_task());
    }

    #[tokio::test]
    async fn test_run_pumps_frames_from_a_live_subscription() {
        use crate::link::SignalSubscriber;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            let mut buf = [0u8; 1024];
            let _ = sock.read(&mut buf).await.unwrap(); // subscription key
            sock.write_all(wire::REMOTE_SAVE_TRIGGER.as_bytes())
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            // Drop: the dispatcher loop ends on EOF.
        });

        let h = Harness::new();
        let coordinator = h.coordinator();
        let handle = SignalSubscriber::to(&addr, "0x00000020-0x00000020")
            .connect()
            .await
            .unwrap();

        coordinator.run(handle).await;
        assert_eq!(h.worlds.save_calls.load(Ordering::SeqCst), 1);
    }
}
