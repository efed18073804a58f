use crate::{
    registry::Plan,
    runtime::Inner,
    sched::QueuedTask,
    sync::{spawn_worker, thread, Arc, Ordering},
};
use std::{
    cell::Cell,
    panic::{self, AssertUnwindSafe},
    process,
};
use tracing::{error, trace};

thread_local! {
    /// Pool index of the current thread; set once at worker startup.
    static WORKER_ID: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Stable index of the calling worker thread, in `[0, thread_count)`.
///
/// Backs per-worker storage such as [`crate::Batch`].
///
/// # Panics
/// When called from a thread that is not part of the worker pool.
#[must_use]
pub fn thread_id() -> usize {
    WORKER_ID
        .get()
        .expect("vine::thread_id() called outside a worker thread")
}

/// The fixed set of worker threads servicing the ready queues.
pub(crate) struct WorkerPool {
    handles: Vec<thread::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers over the shared runtime state.
    pub(crate) fn spawn(size: usize, inner: &Arc<Inner>, plan: &Arc<Plan>) -> Self {
        let handles = (0..size)
            .map(|id| {
                let inner = Arc::clone(inner);
                let plan = Arc::clone(plan);
                spawn_worker(format!("vine-worker-{id}"), move || {
                    WORKER_ID.set(Some(id));
                    trace!(worker = id, "worker started");
                    worker_loop(&inner, &plan);
                    trace!(worker = id, "worker exiting");
                })
            })
            .collect();
        Self { handles }
    }

    /// Set the termination flag, wake every worker, and join them.
    pub(crate) fn shutdown(self, inner: &Inner) {
        inner
            .queues
            .lock()
            .expect("WorkerPool::shutdown: poisoned")
            .terminate = true;
        inner.work_cv.notify_all();
        for handle in self.handles {
            handle
                .join()
                .expect("WorkerPool::shutdown: worker panicked");
        }
    }
}

/// Per-worker loop: prefer function work, fall back to tasks, otherwise
/// report quiescence and sleep on the work condvar.
///
/// User code always runs with the queue mutex released; the lock is
/// reacquired afterwards for the dependency release.
fn worker_loop(inner: &Inner, plan: &Plan) {
    let mut queues = inner.queues.lock().expect("worker_loop: poisoned");
    loop {
        if queues.terminate {
            return;
        }
        if let Some(loc) = queues.func_queue.pop_front() {
            let machine = queues.machine;
            drop(queues);

            let stage = plan.stage_of(machine, loc.stage_node);
            trace!(stage = %stage.label, func = loc.func, "executing function");
            run_user(|| (stage.graph.nodes[loc.func as usize].payload)());

            queues = inner.queues.lock().expect("worker_loop: poisoned");
            queues.release_completed(plan, loc, &inner.inflight_total, &inner.work_cv);
        } else if let Some(task) = queues.task_queue.pop_front() {
            drop(queues);
            run_task(task);
            queues = inner.queues.lock().expect("worker_loop: poisoned");
        } else {
            if inner.inflight_total.load(Ordering::Relaxed) == 0 {
                inner.done_cv.notify_all();
            }
            queues = inner
                .work_cv
                .wait(queues)
                .expect("worker_loop: poisoned");
        }
    }
}

/// Run one queued task, then signal its promise.
fn run_task(task: QueuedTask) {
    let QueuedTask { promise, func, arg } = task;
    trace!("executing task");
    run_user(move || func(arg));
    promise.fulfil();
}

/// Execute user code. A panic escaping it terminates the process: the
/// unwound function would otherwise stay accounted as in flight and the
/// machine could never quiesce.
fn run_user(f: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!("user function panicked; aborting");
        process::abort();
    }
}
