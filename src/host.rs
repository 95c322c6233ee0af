//! Collaborator interfaces implemented by the embedding game server.
//!
//! The restore pipeline never touches world files, player sessions, or the
//! process lifecycle directly; it drives these narrow seams instead. All of
//! them report per-target outcomes — the shutdown sequence is best-effort
//! and a failed target never halts it.

use async_trait::async_trait;

use crate::error::HostError;

/// Outcome of one save or eviction attempt.
#[derive(Debug, Clone)]
pub struct TargetReport {
    /// World or session identifier.
    pub target: String,
    /// `Ok(())` or the host's failure description.
    pub outcome: Result<(), HostError>,
}

impl TargetReport {
    /// A successful outcome for `target`.
    pub fn ok(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            outcome: Ok(()),
        }
    }

    /// A failed outcome for `target`.
    pub fn failed(target: impl Into<String>, error: impl Into<HostError>) -> Self {
        Self {
            target: target.into(),
            outcome: Err(error.into()),
        }
    }
}

/// World persistence seam.
#[async_trait]
pub trait WorldStore: Send + Sync + 'static {
    /// Saves every live world, returning one report per world.
    async fn save_all(&self) -> Vec<TargetReport>;
}

/// Player session seam.
#[async_trait]
pub trait SessionGate: Send + Sync + 'static {
    /// Evicts every connected session, returning one report per session.
    ///
    /// `reason` is a stable machine token (e.g. `"world_restore"`); the host
    /// maps it to translated user-facing text.
    async fn evict_all(&self, reason: &str) -> Vec<TargetReport>;
}

/// Process lifecycle seam.
#[async_trait]
pub trait HostControl: Send + Sync + 'static {
    /// Begins irreversible host shutdown. Called exactly once, at the end of
    /// the shutdown sequence; nothing in this crate runs after it takes
    /// effect.
    fn terminate(&self);

    /// Triggers the host's built-in supervisor-integrated restart.
    ///
    /// On success this call does not return (the host is restarting). An
    /// `Err` means the mechanism is unavailable or misconfigured; the caller
    /// falls back to a plain [`HostControl::terminate`].
    async fn restart_in_process(&self) -> Result<(), HostError>;
}
