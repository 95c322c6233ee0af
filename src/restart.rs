//! # Restart strategy selector.
//!
//! After the shutdown sequence the process exits; whether anything starts it
//! again is the supervisor's business. [`RestartStrategy`] prepares that
//! hand-off according to the configured [`RestartMethod`]:
//!
//! - **InProcess** — delegate to the host's built-in restart mechanism
//!   (which does not return on success), falling back to a plain exit when
//!   it fails.
//! - **Script** — write a marker file; an external watcher script notices it
//!   after the process exits and starts a new instance.
//! - **None** — no preparation; an external supervisor (panel, systemd,
//!   container runtime) is expected to restart the process on its own.
//!
//! The marker file doubles as a boot-time signal: when it exists at startup,
//! the previous shutdown was a restore, and the embedding server should
//! clear stale restore state ([`crate::restore::SharedState::reset`]) and
//! delete the marker via [`RestartStrategy::cleanup_marker`].

use std::fs;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::host::HostControl;

/// How to signal the process supervisor that a restart is desired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartMethod {
    /// Use the host's built-in restart call.
    InProcess,
    /// Write a marker file for an external watcher script.
    Script,
    /// Do nothing beyond process exit.
    None,
}

/// Prepares the supervisor hand-off during the shutdown sequence.
#[derive(Clone, Debug)]
pub struct RestartStrategy {
    enabled: bool,
    method: RestartMethod,
    script_path: String,
    marker_path: PathBuf,
}

impl RestartStrategy {
    /// Builds the strategy from configuration.
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            enabled: cfg.restart_enabled,
            method: cfg.restart_method,
            script_path: cfg.restart_script_path.clone(),
            marker_path: cfg.restart_marker_path.clone(),
        }
    }

    /// The configured method.
    pub fn method(&self) -> RestartMethod {
        self.method
    }

    /// Performs restart preparation. Called once, right before the host is
    /// told to terminate.
    ///
    /// With `InProcess`, a successful `restart_in_process()` does not return;
    /// when it fails the error is logged and the caller proceeds to a plain
    /// terminate.
    pub async fn prepare(&self, control: &Arc<dyn HostControl>) {
        if !self.enabled {
            info!("automatic restart disabled, process will only exit");
            return;
        }

        match self.method {
            RestartMethod::InProcess => {
                self.write_marker();
                info!("invoking in-process restart");
                if let Err(e) = control.restart_in_process().await {
                    warn!(error = %e, "in-process restart failed, falling back to plain exit");
                }
            }
            RestartMethod::Script => {
                self.write_marker();
                info!(
                    script = %self.script_path,
                    marker = %self.marker_path.display(),
                    "restart marker written for external watcher"
                );
            }
            RestartMethod::None => {
                info!("restart method is none, process will only exit");
            }
        }
    }

    /// True when the previous shutdown was a restore (marker exists).
    ///
    /// Checked by the embedding server at boot.
    pub fn is_post_restore_start(&self) -> bool {
        self.marker_path.exists()
    }

    /// Deletes the marker file. Called by the embedding server at boot once
    /// the post-restore state has been handled.
    pub fn cleanup_marker(&self) {
        if self.marker_path.exists() {
            match fs::remove_file(&self.marker_path) {
                Ok(()) => info!(marker = %self.marker_path.display(), "restart marker cleaned up"),
                Err(e) => warn!(error = %e, "failed to remove restart marker"),
            }
        }
    }

    /// Writes the marker file. Failures are logged; the shutdown sequence
    /// proceeds regardless.
    fn write_marker(&self) {
        let write = || -> std::io::Result<()> {
            let mut f = fs::File::create(&self.marker_path)?;
            writeln!(f, "# vaultlink restart marker")?;
            writeln!(f, "reason=restore")?;
            let now_ms = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or_default();
            writeln!(f, "requested_at_ms={now_ms}")?;
            Ok(())
        };
        match write() {
            Ok(()) => debug!(marker = %self.marker_path.display(), "restart marker written"),
            Err(e) => warn!(error = %e, "failed to write restart marker"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HostError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingControl {
        restarts: AtomicUsize,
    }

    #[async_trait]
    impl HostControl for FailingControl {
        fn terminate(&self) {}
        async fn restart_in_process(&self) -> Result<(), HostError> {
            self.restarts.fetch_add(1, Ordering::SeqCst);
            Err(HostError::new("restart script not configured"))
        }
    }

    fn strategy_in(dir: &std::path::Path, method: RestartMethod, enabled: bool) -> RestartStrategy {
        RestartStrategy {
            enabled,
            method,
            script_path: "./start.sh".to_string(),
            marker_path: dir.join(".vaultlink-restart"),
        }
    }

    #[tokio::test]
    async fn test_script_method_writes_and_detects_marker() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = strategy_in(dir.path(), RestartMethod::Script, true);
        let control: Arc<dyn HostControl> = Arc::new(FailingControl {
            restarts: AtomicUsize::new(0),
        });

        assert!(!strategy.is_post_restore_start());
        strategy.prepare(&control).await;
        assert!(strategy.is_post_restore_start());

        let content = fs::read_to_string(dir.path().join(".vaultlink-restart")).unwrap();
        assert!(content.contains("reason=restore"));

        strategy.cleanup_marker();
        assert!(!strategy.is_post_restore_start());
    }

    #[tokio::test]
    async fn test_in_process_failure_falls_back_quietly() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = strategy_in(dir.path(), RestartMethod::InProcess, true);
        let control = Arc::new(FailingControl {
            restarts: AtomicUsize::new(0),
        });
        let dyn_control: Arc<dyn HostControl> = control.clone();

        strategy.prepare(&dyn_control).await;
        assert_eq!(control.restarts.load(Ordering::SeqCst), 1);
        // Marker is still written so the next boot sees the restore.
        assert!(strategy.is_post_restore_start());
    }

    #[tokio::test]
    async fn test_disabled_and_none_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let control: Arc<dyn HostControl> = Arc::new(FailingControl {
            restarts: AtomicUsize::new(0),
        });

        let disabled = strategy_in(dir.path(), RestartMethod::Script, false);
        disabled.prepare(&control).await;
        assert!(!disabled.is_post_restore_start());

        let none = strategy_in(dir.path(), RestartMethod::None, true);
        none.prepare(&control).await;
        assert!(!none.is_post_restore_start());
    }
}
