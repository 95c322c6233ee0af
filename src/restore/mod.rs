//! Restore orchestration: the single-task slot, process-wide state, the
//! phase machine, the shutdown sequence, and the coordinator that ties them
//! to the transport and the host.

mod coordinator;
mod shutdown;
mod slot;
mod state;
mod task;

pub use coordinator::Coordinator;
pub use slot::TaskSlot;
pub use state::{version_compatible, HandshakeInfo, SharedState};
pub use task::{Phase, RestoreTask, PEER_INITIATOR};

#[cfg(test)]
pub(crate) mod testutil;
