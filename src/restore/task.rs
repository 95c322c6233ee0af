//! # Restore task: the confirm → countdown → execute pipeline.
//!
//! One [`RestoreTask`] coordinates a single restore attempt end to end.
//! Operator-initiated ("local") and peer-initiated ("remote") tasks share
//! the machine but follow different tables:
//!
//! ```text
//! NONE ──start(remote)──► COUNTDOWN (remote countdown enabled)
//!                       | EXECUTING (else: shutdown runs directly)
//! NONE ──start(local)──► WAITING_CONFIRM (confirm required)
//!                      | COUNTDOWN       (confirm skipped)
//! WAITING_CONFIRM ──confirm()──► COUNTDOWN
//! WAITING_CONFIRM ──timeout───► NONE
//! WAITING_CONFIRM ──abort()───► NONE
//! COUNTDOWN ──tick, remaining>0──► COUNTDOWN  (announce near the end)
//! COUNTDOWN ──tick, remaining==0─► EXECUTING
//! COUNTDOWN ──abort()──► NONE
//! EXECUTING ──(terminal)──► NONE  (after the shutdown sequence)
//! ```
//!
//! A **local** task completing its countdown does not shut the server down:
//! it marks the shared restoring flag, sends the stored restore command to
//! the daemon, and waits for the daemon's `pre_hot_restore` acknowledgment
//! (routed back by the dispatcher) to run [`RestoreTask::perform_shutdown`].
//! A **remote** task runs the shutdown sequence as soon as its countdown
//! ends — the daemon already asked for it.
//!
//! ## Rules
//! - The task installs itself into the global [`TaskSlot`](super::TaskSlot)
//!   before anything else; a occupied slot fails the start.
//! - `abort()` is idempotent through a one-shot flag: the first caller wins,
//!   later callers (and in-flight ticks) observe it and stop.
//! - The shutdown sequence runs at most once per task, guarded separately,
//!   so an out-of-order duplicate acknowledgment cannot replay it.
//! - Countdown ticks announce the remaining time only when it is ≤ 5 or a
//!   multiple of 5.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::events::{Bus, Event, EventKind};
use crate::host::{HostControl, SessionGate, WorldStore};
use crate::link::Querier;
use crate::restart::RestartStrategy;
use crate::restore::shutdown;
use crate::restore::slot::TaskSlot;
use crate::restore::state::SharedState;

/// Initiator identity reported for peer-initiated tasks.
pub const PEER_INITIATOR: &str = "backup-daemon";

/// Phase of a restore task. `None` is both initial and terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No activity; the task is finished or never started.
    None,
    /// Waiting for an operator confirmation.
    WaitingConfirm,
    /// Counting down to execution; still cancellable.
    Countdown,
    /// Carrying out the restore; no longer cancellable.
    Executing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::None => "none",
            Phase::WaitingConfirm => "waiting-confirm",
            Phase::Countdown => "countdown",
            Phase::Executing => "executing",
        };
        f.write_str(s)
    }
}

/// Everything a task (and the shutdown sequence) needs from its owner.
///
/// Built once by the [`Coordinator`](super::Coordinator) and shared with
/// every task it creates.
pub(crate) struct TaskDeps {
    pub cfg: Config,
    pub bus: Bus,
    pub querier: Querier,
    pub shared: Arc<SharedState>,
    pub slot: Arc<TaskSlot>,
    pub worlds: Arc<dyn WorldStore>,
    pub sessions: Arc<dyn SessionGate>,
    pub control: Arc<dyn HostControl>,
    pub restart: RestartStrategy,
}

/// Mutable task state; every transition happens under this lock.
struct Inner {
    phase: Phase,
    remaining: u32,
    confirm_timer: Option<CancellationToken>,
    countdown_timer: Option<CancellationToken>,
}

/// What a countdown tick decided while holding the state lock.
enum TickStep {
    /// Keep ticking.
    Continue,
    /// Countdown reached zero; run the completion path.
    Finished,
    /// The task left the countdown phase; stop silently.
    Stopped,
}

/// A single restore attempt.
pub struct RestoreTask {
    deps: Arc<TaskDeps>,
    /// Restore command to send when the countdown completes. Present only
    /// for operator-initiated tasks.
    command: Option<String>,
    initiator: Arc<str>,
    is_remote: bool,
    started_at: Instant,
    aborted: AtomicBool,
    shutdown_started: AtomicBool,
    inner: Mutex<Inner>,
}

impl RestoreTask {
    /// Creates an operator-initiated task carrying the restore command.
    pub(crate) fn local(
        deps: Arc<TaskDeps>,
        command: String,
        initiator: impl Into<Arc<str>>,
    ) -> Arc<Self> {
        Self::new(deps, Some(command), initiator.into(), false)
    }

    /// Creates a peer-initiated task. No command: the daemon already knows.
    pub(crate) fn remote(deps: Arc<TaskDeps>) -> Arc<Self> {
        Self::new(deps, None, Arc::from(PEER_INITIATOR), true)
    }

    fn new(
        deps: Arc<TaskDeps>,
        command: Option<String>,
        initiator: Arc<str>,
        is_remote: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            deps,
            command,
            initiator,
            is_remote,
            started_at: Instant::now(),
            aborted: AtomicBool::new(false),
            shutdown_started: AtomicBool::new(false),
            inner: Mutex::new(Inner {
                phase: Phase::None,
                remaining: 0,
                confirm_timer: None,
                countdown_timer: None,
            }),
        })
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// Who started this restore.
    pub fn initiator(&self) -> &str {
        &self.initiator
    }

    /// True for peer-initiated tasks.
    pub fn is_remote(&self) -> bool {
        self.is_remote
    }

    /// Starts the pipeline. Returns `false` when another restore already
    /// occupies the global slot.
    pub(crate) async fn start(self: &Arc<Self>) -> bool {
        if !self.deps.slot.install(self) {
            return false;
        }
        let cfg = &self.deps.cfg;

        if self.is_remote {
            self.publish(
                Event::new(EventKind::RemoteInitiated).with_initiator(Arc::clone(&self.initiator)),
            );
            if cfg.remote_countdown {
                info!(
                    seconds = cfg.remote_countdown_secs,
                    "remote restore triggered, starting countdown"
                );
                self.start_countdown(cfg.remote_countdown_secs);
            } else {
                info!("remote restore triggered, executing immediately");
                self.perform_shutdown().await;
            }
        } else if cfg.require_confirm {
            let window = cfg.confirm_timeout();
            let token = CancellationToken::new();
            {
                let mut inner = self.lock();
                inner.phase = Phase::WaitingConfirm;
                inner.confirm_timer = Some(token.clone());
            }
            info!(
                initiator = %self.initiator,
                window_secs = cfg.confirm_timeout_secs,
                command = self.command.as_deref(),
                "restore awaiting confirmation"
            );
            self.publish(
                Event::new(EventKind::ConfirmAwaited)
                    .with_initiator(Arc::clone(&self.initiator))
                    .with_remaining(cfg.confirm_timeout_secs),
            );

            let task = Arc::clone(self);
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = time::sleep(window) => task.on_confirm_timeout(),
                }
            });
        } else {
            info!(
                initiator = %self.initiator,
                command = self.command.as_deref(),
                "restore started, confirmation skipped"
            );
            self.start_countdown(cfg.countdown_secs);
        }
        true
    }

    /// Confirms a pending restore. Fails unless the phase is exactly
    /// `WAITING_CONFIRM`; never mutates state otherwise.
    pub(crate) fn confirm(self: &Arc<Self>) -> bool {
        {
            let mut inner = self.lock();
            if inner.phase != Phase::WaitingConfirm {
                return false;
            }
            if let Some(timer) = inner.confirm_timer.take() {
                timer.cancel();
            }
        }
        info!("restore confirmed");
        self.publish(Event::new(EventKind::Confirmed));
        self.start_countdown(self.deps.cfg.countdown_secs);
        true
    }

    /// Cancels the restore. Valid only in `WAITING_CONFIRM` or `COUNTDOWN`;
    /// idempotent — of two racing callers, exactly one succeeds.
    pub(crate) fn abort(self: &Arc<Self>, reason: &str) -> bool {
        let old_phase;
        {
            let mut inner = self.lock();
            if matches!(inner.phase, Phase::None | Phase::Executing) {
                return false;
            }
            if self
                .aborted
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                return false;
            }
            if let Some(timer) = inner.countdown_timer.take() {
                timer.cancel();
            }
            if let Some(timer) = inner.confirm_timer.take() {
                timer.cancel();
            }
            old_phase = inner.phase;
            inner.phase = Phase::None;
        }
        info!(phase = %old_phase, reason, "restore aborted");
        self.publish(
            Event::new(EventKind::Aborted)
                .with_phase(old_phase)
                .with_reason(reason.to_string()),
        );
        self.deps.slot.clear_if(self);
        true
    }

    /// Runs the irreversible shutdown sequence (save → evict → notify →
    /// restart), at most once per task. Returns `false` when it already ran.
    ///
    /// Called from the countdown completion of remote tasks, or from the
    /// dispatcher when the daemon acknowledges a local restore.
    pub(crate) async fn perform_shutdown(self: &Arc<Self>) -> bool {
        if self.aborted.load(Ordering::SeqCst) {
            debug!("task was aborted, refusing shutdown sequence");
            return false;
        }
        if self
            .shutdown_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("shutdown sequence already ran for this task, ignoring");
            return false;
        }
        self.lock().phase = Phase::Executing;
        shutdown::run_sequence(&self.deps, Some(self)).await;
        true
    }

    /// Enters the countdown phase and spawns the tick loop.
    fn start_countdown(self: &Arc<Self>, seconds: u32) {
        let token = CancellationToken::new();
        {
            let mut inner = self.lock();
            inner.phase = Phase::Countdown;
            inner.remaining = seconds;
            inner.countdown_timer = Some(token.clone());
        }
        info!(seconds, "restore countdown started");
        self.publish(
            Event::new(EventKind::CountdownStarted)
                .with_remaining(seconds)
                .with_initiator(Arc::clone(&self.initiator)),
        );

        let task = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = time::sleep(Duration::from_secs(1)) => {}
                }
                if task.aborted.load(Ordering::SeqCst) {
                    return;
                }
                match task.tick() {
                    TickStep::Continue => {}
                    TickStep::Stopped => return,
                    TickStep::Finished => {
                        task.on_countdown_complete().await;
                        return;
                    }
                }
            }
        });
    }

    /// One countdown tick. Announces the remaining time on the sparse
    /// schedule and decrements; the decision happens under the state lock so
    /// it is atomic with respect to `abort()`.
    fn tick(&self) -> TickStep {
        let mut inner = self.lock();
        if inner.phase != Phase::Countdown {
            return TickStep::Stopped;
        }
        if inner.remaining == 0 {
            return TickStep::Finished;
        }
        if announces(inner.remaining) {
            self.publish(Event::new(EventKind::CountdownTick).with_remaining(inner.remaining));
        }
        inner.remaining -= 1;
        TickStep::Continue
    }

    /// Countdown reached zero.
    async fn on_countdown_complete(self: &Arc<Self>) {
        if self.aborted.load(Ordering::SeqCst) {
            return;
        }
        if self.is_remote {
            // The daemon asked for this restore; no round-trip needed.
            self.perform_shutdown().await;
            return;
        }

        // Operator-initiated: hand the command to the daemon and wait for
        // its pre_hot_restore acknowledgment to run the shutdown sequence.
        self.lock().phase = Phase::Executing;
        self.deps.shared.set_restoring(true);
        info!(
            command = self.command.as_deref(),
            elapsed_ms = self.started_at.elapsed().as_millis() as u64,
            "countdown finished, sending restore command"
        );
        self.publish(
            Event::new(EventKind::Executing).with_initiator(Arc::clone(&self.initiator)),
        );

        if let Some(command) = self.command.clone() {
            let querier = self.deps.querier.clone();
            tokio::spawn(async move {
                let reply = querier.query(&command).await;
                debug!(reply, "restore command reply");
            });
        } else {
            warn!("local restore task has no command to send");
        }
    }

    /// The confirmation window elapsed without a confirm.
    fn on_confirm_timeout(self: &Arc<Self>) {
        {
            let mut inner = self.lock();
            if inner.phase != Phase::WaitingConfirm {
                return;
            }
            inner.phase = Phase::None;
            inner.confirm_timer = None;
        }
        warn!(
            window_secs = self.deps.cfg.confirm_timeout_secs,
            "restore confirmation timed out, cancelled"
        );
        self.publish(Event::new(EventKind::ConfirmTimedOut));
        self.deps.slot.clear_if(self);
    }

    /// How long this task has existed.
    pub(crate) fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    fn publish(&self, event: Event) {
        self.deps.bus.publish(event);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("restore task lock poisoned")
    }
}

/// Sparse announcement schedule: every second in the last five, otherwise
/// only multiples of five.
fn announces(remaining: u32) -> bool {
    remaining <= 5 || remaining % 5 == 0
}
