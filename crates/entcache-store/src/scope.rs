use std::cell::RefCell;
use std::sync::Arc;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use tokio::sync::broadcast;
use tracing::trace;

use crate::event::{ChangeBatch, ChangeEvent};

#[derive(Debug, Default)]
pub(crate) struct ScopeState {
    depth: usize,
    pending: Vec<ChangeEvent>,
}

pub(crate) type ScopeLock = ReentrantMutex<RefCell<ScopeState>>;

/// Write permission for the entity graph.
///
/// Obtained from [`RootStore::begin_mutation`](crate::RootStore::begin_mutation).
/// Scopes are reentrant on the owning thread and exclusive across threads,
/// so a merge or GC pass either completes or has not started from the
/// point of view of any other writer. Events recorded while any scope is
/// open are broadcast as one [`ChangeBatch`] when the outermost scope drops.
pub struct MutationScope<'a> {
    guard: ReentrantMutexGuard<'a, RefCell<ScopeState>>,
    events: &'a broadcast::Sender<ChangeBatch>,
}

impl<'a> MutationScope<'a> {
    pub(crate) fn enter(lock: &'a ScopeLock, events: &'a broadcast::Sender<ChangeBatch>) -> Self {
        let guard = lock.lock();
        guard.borrow_mut().depth += 1;
        Self { guard, events }
    }

    /// Record a change for the batch flushed by the outermost scope.
    pub fn record(&self, event: ChangeEvent) {
        self.guard.borrow_mut().pending.push(event);
    }

    /// Nesting depth, 1 for the outermost scope.
    pub fn depth(&self) -> usize {
        self.guard.borrow().depth
    }

    /// Number of events waiting for the outermost scope to end.
    pub fn pending(&self) -> usize {
        self.guard.borrow().pending.len()
    }
}

impl Drop for MutationScope<'_> {
    fn drop(&mut self) {
        let batch = {
            let mut state = self.guard.borrow_mut();
            state.depth -= 1;
            if state.depth > 0 || state.pending.is_empty() {
                return;
            }
            std::mem::take(&mut state.pending)
        };
        trace!(events = batch.len(), "flushing change batch");
        // No receivers is fine: nobody is observing.
        let _ = self.events.send(Arc::new(batch));
    }
}
