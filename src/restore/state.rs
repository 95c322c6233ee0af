//! # Process-wide restore state.
//!
//! [`SharedState`] outlives any single restore task. It tracks whether a
//! restore is underway and whether the process is waiting for the daemon to
//! acknowledge the stop, plus the version info cached from the last
//! handshake. It is reset explicitly: at process start (after a post-restore
//! boot) and when the daemon confirms restore completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// Version info cached from the last handshake exchange.
#[derive(Debug, Clone)]
pub struct HandshakeInfo {
    /// Whether a handshake has completed since the last reset.
    pub completed: bool,
    /// The daemon's reported version.
    pub peer_version: Option<String>,
    /// Whether this agent satisfies the daemon's minimum version.
    pub compatible: bool,
    /// The minimum agent version the daemon requires.
    pub required_min_version: Option<String>,
}

impl Default for HandshakeInfo {
    /// No handshake yet; compatibility is assumed until told otherwise.
    fn default() -> Self {
        Self {
            completed: false,
            peer_version: None,
            compatible: true,
            required_min_version: None,
        }
    }
}

/// Process-wide restore flags and handshake cache.
#[derive(Debug, Default)]
pub struct SharedState {
    restoring: AtomicBool,
    awaiting_stop_ack: AtomicBool,
    handshake: RwLock<HandshakeInfo>,
}

impl SharedState {
    /// Creates a fresh state with no restore underway.
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a restore is underway (set inside the shutdown sequence).
    pub fn is_restoring(&self) -> bool {
        self.restoring.load(Ordering::SeqCst)
    }

    pub(crate) fn set_restoring(&self, value: bool) {
        self.restoring.store(value, Ordering::SeqCst);
    }

    /// True while the process waits for the daemon's stop acknowledgment.
    pub fn is_awaiting_stop_ack(&self) -> bool {
        self.awaiting_stop_ack.load(Ordering::SeqCst)
    }

    pub(crate) fn set_awaiting_stop_ack(&self, value: bool) {
        self.awaiting_stop_ack.store(value, Ordering::SeqCst);
    }

    /// Clears the restore flags. Called at process start and when the daemon
    /// confirms restore completion.
    pub fn reset(&self) {
        self.restoring.store(false, Ordering::SeqCst);
        self.awaiting_stop_ack.store(false, Ordering::SeqCst);
    }

    /// Records a completed handshake exchange.
    pub(crate) fn record_handshake(
        &self,
        peer_version: Option<String>,
        required_min_version: Option<String>,
        compatible: bool,
    ) {
        let mut hs = self.handshake.write().expect("handshake lock poisoned");
        *hs = HandshakeInfo {
            completed: true,
            peer_version,
            compatible,
            required_min_version,
        };
    }

    /// Snapshot of the cached handshake info.
    pub fn handshake(&self) -> HandshakeInfo {
        self.handshake
            .read()
            .expect("handshake lock poisoned")
            .clone()
    }

    /// Forgets the cached handshake.
    pub fn reset_handshake(&self) {
        let mut hs = self.handshake.write().expect("handshake lock poisoned");
        *hs = HandshakeInfo::default();
    }
}

/// Checks whether `current` satisfies the `required` minimum version.
///
/// Versions are `major.minor.patch`; missing components count as zero. An
/// absent or blank requirement passes; an unparseable version fails closed.
pub fn version_compatible(current: &str, required: Option<&str>) -> bool {
    let required = match required {
        Some(r) if !r.trim().is_empty() => r,
        _ => return true,
    };
    if current.trim().is_empty() {
        return false;
    }
    match (parse_version(current), parse_version(required)) {
        (Some(c), Some(r)) => c >= r,
        _ => false,
    }
}

/// Parses up to three dot-separated numeric components.
fn parse_version(version: &str) -> Option<[u64; 3]> {
    let mut parts = [0u64; 3];
    for (i, raw) in version.split('.').take(3).enumerate() {
        parts[i] = raw.trim().parse().ok()?;
    }
    Some(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_compatible_ordering() {
        assert!(version_compatible("1.1.0", Some("1.0.0")));
        assert!(version_compatible("1.0.0", Some("1.0.0")));
        assert!(version_compatible("2.0.0", Some("1.9.9")));
        assert!(!version_compatible("1.0.0", Some("1.0.1")));
        assert!(!version_compatible("0.9.0", Some("1.0.0")));
    }

    #[test]
    fn test_version_compatible_short_and_blank_forms() {
        // Missing components count as zero.
        assert!(version_compatible("1.1", Some("1.0.5")));
        assert!(version_compatible("1", Some("1")));
        // No requirement always passes.
        assert!(version_compatible("1.0.0", None));
        assert!(version_compatible("1.0.0", Some("  ")));
        // Garbage fails closed.
        assert!(!version_compatible("abc", Some("1.0.0")));
        assert!(!version_compatible("1.0.0", Some("one.two")));
        assert!(!version_compatible("", Some("1.0.0")));
    }

    #[test]
    fn test_reset_clears_only_restore_flags() {
        let state = SharedState::new();
        state.set_restoring(true);
        state.set_awaiting_stop_ack(true);
        state.record_handshake(Some("2.3.0".into()), Some("1.0.0".into()), true);

        state.reset();
        assert!(!state.is_restoring());
        assert!(!state.is_awaiting_stop_ack());
        assert!(
            state.handshake().completed,
            "reset must not forget the handshake"
        );

        state.reset_handshake();
        assert!(!state.handshake().completed);
        assert!(state.handshake().compatible, "default is compatible");
    }
}
