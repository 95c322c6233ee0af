//! Global single-task slot.
//!
//! At most one restore may be in flight, system-wide. The slot is the only
//! resource with test-and-set semantics: a task may be installed only while
//! the slot is empty, so N concurrent starts yield exactly one winner.

use std::sync::{Arc, Mutex};

use super::task::{Phase, RestoreTask};

/// Holder for the single in-flight restore task.
#[derive(Default)]
pub struct TaskSlot {
    current: Mutex<Option<Arc<RestoreTask>>>,
}

impl TaskSlot {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `task` if the slot is empty. Returns `false` when another
    /// task already occupies it.
    pub fn install(&self, task: &Arc<RestoreTask>) -> bool {
        let mut current = self.current.lock().expect("slot lock poisoned");
        if current.is_some() {
            return false;
        }
        *current = Some(Arc::clone(task));
        true
    }

    /// The current occupant, if any.
    pub fn current(&self) -> Option<Arc<RestoreTask>> {
        self.current.lock().expect("slot lock poisoned").clone()
    }

    /// Clears the slot, but only if `task` is the occupant. A stale task
    /// finishing late must not evict its successor.
    pub fn clear_if(&self, task: &Arc<RestoreTask>) {
        let mut current = self.current.lock().expect("slot lock poisoned");
        if current.as_ref().is_some_and(|t| Arc::ptr_eq(t, task)) {
            *current = None;
        }
    }

    /// True when an occupant exists and has not reached its terminal phase.
    pub fn has_active(&self) -> bool {
        self.current()
            .is_some_and(|task| task.phase() != Phase::None)
    }
}
