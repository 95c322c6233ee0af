//! Shared fixtures for restore tests: mock host collaborators and a wired
//! coordinator harness.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::Config;
use crate::events::Bus;
use crate::host::{HostControl, SessionGate, TargetReport, WorldStore};
use crate::link::Querier;
use crate::restart::{RestartMethod, RestartStrategy};

use super::coordinator::Coordinator;
use super::slot::TaskSlot;
use super::state::SharedState;
use super::task::{RestoreTask, TaskDeps};

/// Two worlds; individual ones can be told to fail.
pub(crate) struct MockWorlds {
    pub save_calls: AtomicUsize,
    failing: Mutex<Vec<String>>,
}

impl MockWorlds {
    pub fn fail_world(&self, name: &str) {
        self.failing.lock().unwrap().push(name.to_string());
    }
}

#[async_trait]
impl WorldStore for MockWorlds {
    async fn save_all(&self) -> Vec<TargetReport> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing.lock().unwrap().clone();
        ["alpha", "beta"]
            .into_iter()
            .map(|world| {
                if failing.iter().any(|f| f == world) {
                    TargetReport::failed(world, "disk full")
                } else {
                    TargetReport::ok(world)
                }
            })
            .collect()
    }
}

/// Two sessions; records the eviction reason it was handed.
pub(crate) struct MockSessions {
    pub evict_calls: AtomicUsize,
    pub last_reason: Mutex<Option<String>>,
    failing: Mutex<Vec<String>>,
}

impl MockSessions {
    pub fn fail_session(&self, name: &str) {
        self.failing.lock().unwrap().push(name.to_string());
    }
}

#[async_trait]
impl SessionGate for MockSessions {
    async fn evict_all(&self, reason: &str) -> Vec<TargetReport> {
        self.evict_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_reason.lock().unwrap() = Some(reason.to_string());
        let failing = self.failing.lock().unwrap().clone();
        ["alice", "bob"]
            .into_iter()
            .map(|session| {
                if failing.iter().any(|f| f == session) {
                    TargetReport::failed(session, "channel already closed")
                } else {
                    TargetReport::ok(session)
                }
            })
            .collect()
    }
}

/// Counts lifecycle calls instead of ending the process.
pub(crate) struct MockControl {
    pub terminations: AtomicUsize,
    pub restarts: AtomicUsize,
}

#[async_trait]
impl HostControl for MockControl {
    fn terminate(&self) {
        self.terminations.fetch_add(1, Ordering::SeqCst);
    }
    async fn restart_in_process(&self) -> Result<(), crate::error::HostError> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Test configuration: unreachable loopback peer (instant refusals for
/// fire-and-forget queries), restart preparation disabled so no marker files
/// land in the working directory.
pub(crate) fn test_config() -> Config {
    Config {
        subscribe_port: 1,
        query_port: 1,
        restart_enabled: false,
        restart_method: RestartMethod::None,
        ..Config::default()
    }
}

/// Mock collaborators plus fully wired [`TaskDeps`].
pub(crate) struct Harness {
    pub deps: Arc<TaskDeps>,
    pub worlds: Arc<MockWorlds>,
    pub sessions: Arc<MockSessions>,
    pub control: Arc<MockControl>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(cfg: Config) -> Self {
        let worlds = Arc::new(MockWorlds {
            save_calls: AtomicUsize::new(0),
            failing: Mutex::new(Vec::new()),
        });
        let sessions = Arc::new(MockSessions {
            evict_calls: AtomicUsize::new(0),
            last_reason: Mutex::new(None),
            failing: Mutex::new(Vec::new()),
        });
        let control = Arc::new(MockControl {
            terminations: AtomicUsize::new(0),
            restarts: AtomicUsize::new(0),
        });
        let deps = Arc::new(TaskDeps {
            bus: Bus::new(cfg.bus_capacity),
            querier: Querier::from_config(&cfg),
            shared: Arc::new(SharedState::new()),
            slot: Arc::new(TaskSlot::new()),
            worlds: worlds.clone(),
            sessions: sessions.clone(),
            control: control.clone(),
            restart: RestartStrategy::from_config(&cfg),
            cfg,
        });
        Self {
            deps,
            worlds,
            sessions,
            control,
        }
    }

    pub fn coordinator(&self) -> Coordinator {
        Coordinator {
            deps: Arc::clone(&self.deps),
        }
    }
}

/// A detached operator-initiated task with its own harness, for slot tests.
pub(crate) fn local_task() -> Arc<RestoreTask> {
    let h = Harness::new();
    RestoreTask::local(h.deps, "RESTORE 1 0 backup.zip".to_string(), "operator")
}
