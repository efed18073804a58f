use crate::sync::{Arc, AtomicBool, Condvar, Mutex, Ordering};
use derive_more::Debug;

/// Shared state behind every clone of one [`TaskPromise`].
#[derive(Debug)]
struct PromiseState {
    #[debug(skip)]
    completed: AtomicBool,
    #[debug(skip)]
    lock: Mutex<()>,
    #[debug(skip)]
    cond: Condvar,
}

/// Completion handle for a task submitted via
/// [`crate::Runtime::issue_task`].
///
/// Clones share one underlying state and the state is freed when the last
/// clone drops. The default-constructed promise is empty and reports
/// completion immediately.
#[must_use]
#[derive(Debug, Clone, Default)]
pub struct TaskPromise {
    state: Option<Arc<PromiseState>>,
}

impl TaskPromise {
    /// Fresh, incomplete promise for a newly issued task.
    pub(crate) fn issued() -> Self {
        Self {
            state: Some(Arc::new(PromiseState {
                completed: AtomicBool::new(false),
                lock: Mutex::new(()),
                cond: Condvar::new(),
            })),
        }
    }

    /// Whether the task has finished executing. Empty promises report
    /// `true`.
    #[must_use]
    pub fn completed(&self) -> bool {
        match &self.state {
            None => true,
            Some(state) => state.completed.load(Ordering::Acquire),
        }
    }

    /// Block until the task has finished executing.
    ///
    /// Returns immediately for empty or already-completed promises. Must not
    /// be called from the task itself: a worker blocking on its own task
    /// never wakes.
    pub fn join(&self) {
        let Some(state) = &self.state else { return };
        if state.completed.load(Ordering::Acquire) {
            return;
        }
        let mut guard = state.lock.lock().expect("TaskPromise::join: poisoned");
        while !state.completed.load(Ordering::Acquire) {
            guard = state
                .cond
                .wait(guard)
                .expect("TaskPromise::join: poisoned");
        }
    }

    /// Mark the task as finished and wake all joiners. Called by the worker
    /// that executed the task, after its function returned.
    pub(crate) fn fulfil(&self) {
        let state = self
            .state
            .as_ref()
            .expect("TaskPromise::fulfil: empty promise");
        let _guard = state.lock.lock().expect("TaskPromise::fulfil: poisoned");
        state.completed.store(true, Ordering::Release);
        state.cond.notify_all();
    }
}
