use crate::{
    config,
    pool::WorkerPool,
    registry::{Plan, Registry},
    sched::{ExecQueues, QueuedTask},
    sync::{Arc, AtomicBool, AtomicUsize, Condvar, Mutex, MutexGuard, Ordering},
    task::TaskPromise,
    types::{FuncId, MachineId, StageId, StageNodeId, TaskArg},
};
use thiserror::Error;
use tracing::{debug, info, trace};

/// Error returned by [`Runtime::run`] when the execution loop cannot be
/// entered.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RunError {
    /// No machine was designated before `run` (see
    /// [`Runtime::set_machine`]).
    #[error("no machine designated to run")]
    NoMachine,
    /// A machine references a stage with no functions. Such a stage can
    /// never drain, so everything downstream of it would be silently
    /// skipped.
    #[error("machine `{machine}` references stage `{stage}`, which has no functions")]
    EmptyStage {
        /// Label of the function-less stage.
        stage: String,
        /// Label of the referencing machine.
        machine: String,
    },
    /// The execution loop was already entered; it is single-entry.
    #[error("the runtime is already running or has already run")]
    AlreadyRunning,
}

enum RegistryState {
    Building(Registry),
    Frozen(Arc<Plan>),
}

#[derive(Debug, Default)]
struct ControlState {
    current: Option<u32>,
    queued: Option<u32>,
    shutdown: bool,
}

pub(crate) struct Inner {
    registry: Mutex<RegistryState>,
    pub(crate) queues: Mutex<ExecQueues>,
    pub(crate) work_cv: Condvar,
    pub(crate) done_cv: Condvar,
    /// Sum of the per-stage-node inflight counters. Mutated only under the
    /// queue mutex; read under the same mutex for the quiescence predicate.
    pub(crate) inflight_total: AtomicUsize,
    control: Mutex<ControlState>,
    workers: usize,
    entered: AtomicBool,
}

/// Cheaply cloneable handle to the whole runtime.
///
/// Construct one at program start, register stages, machines, and their
/// nodes, designate the initial machine with [`Runtime::set_machine`], then
/// enter [`Runtime::run`]. Stage functions and tasks reach the control
/// surface (machine swaps, shutdown, task submission) through clones of the
/// handle captured at registration time.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<Inner>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// Runtime with the default pool size:
    /// `min(available_parallelism, VINE_MAX_THREADS)`, at least 1.
    pub fn new() -> Self {
        Self::with_worker_threads(config::default_pool_size())
    }

    /// Runtime with an explicit worker-pool size, clamped to at least 1.
    pub fn with_worker_threads(workers: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(RegistryState::Building(Registry::default())),
                queues: Mutex::new(ExecQueues::new()),
                work_cv: Condvar::new(),
                done_cv: Condvar::new(),
                inflight_total: AtomicUsize::new(0),
                control: Mutex::new(ControlState::default()),
                workers: workers.max(1),
                entered: AtomicBool::new(false),
            }),
        }
    }

    /// Number of worker threads the pool runs with.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.inner.workers
    }

    /// Create a stage. The label only shows up in logs and errors.
    pub fn add_stage(&self, label: impl Into<String>) -> StageId {
        let label = label.into();
        self.with_registry(|registry| registry.add_stage(label))
    }

    /// Create a machine. The label only shows up in logs and errors.
    pub fn add_machine(&self, label: impl Into<String>) -> MachineId {
        let label = label.into();
        self.with_registry(|registry| registry.add_machine(label))
    }

    /// Register a function node into `stage`.
    ///
    /// `deps` are function nodes of the same stage that must all complete
    /// before this one becomes eligible; duplicates are collapsed.
    ///
    /// # Panics
    /// If a dependency belongs to a different stage, or registration is
    /// already frozen.
    pub fn add_function(
        &self,
        stage: StageId,
        deps: &[FuncId],
        func: impl Fn() + Send + Sync + 'static,
    ) -> FuncId {
        self.with_registry(|registry| registry.add_function(stage, deps, Box::new(func)))
    }

    /// Register a stage node into `machine`, referencing `stage`.
    ///
    /// `deps` are stage nodes of the same machine that must all drain before
    /// any function of this node runs; duplicates are collapsed.
    ///
    /// # Panics
    /// If a dependency belongs to a different machine, or registration is
    /// already frozen.
    pub fn add_stage_node(
        &self,
        machine: MachineId,
        stage: StageId,
        deps: &[StageNodeId],
    ) -> StageNodeId {
        self.with_registry(|registry| registry.add_stage_node(machine, stage, deps))
    }

    /// Queue `machine` to run next; applied between machine executions, so a
    /// swap never disturbs the execution in progress. Calling this before
    /// [`Runtime::run`] designates the initial machine.
    pub fn set_machine(&self, machine: MachineId) {
        self.lock_control().queued = Some(machine.0);
    }

    /// Request termination. The current machine execution always completes;
    /// the loop exits before the next one would begin.
    pub fn request_shutdown(&self) {
        info!("shutdown requested");
        self.lock_control().shutdown = true;
    }

    /// Push an asynchronous task. Idle workers execute it whenever no
    /// function work is ready; the enqueue itself never waits on function
    /// work.
    ///
    /// Tasks still queued when the runtime shuts down are dropped without
    /// running and their promises never complete.
    pub fn issue_task(
        &self,
        func: impl FnOnce(TaskArg) + Send + 'static,
        arg: TaskArg,
    ) -> TaskPromise {
        let promise = TaskPromise::issued();
        let task = QueuedTask {
            promise: promise.clone(),
            func: Box::new(func),
            arg,
        };
        let mut queues = self.lock_queues();
        queues.task_queue.push_back(task);
        self.inner.work_cv.notify_one();
        drop(queues);
        trace!("task issued");
        promise
    }

    /// Enter the execution loop: freeze the registry, spawn the worker pool,
    /// and repeatedly execute the current machine until shutdown is
    /// requested, applying queued machine swaps between executions. Blocks
    /// the calling thread until shutdown.
    ///
    /// # Errors
    /// [`RunError::NoMachine`] if no machine was designated,
    /// [`RunError::EmptyStage`] if a machine references a function-less
    /// stage, [`RunError::AlreadyRunning`] on re-entry.
    pub fn run(&self) -> Result<(), RunError> {
        if self.inner.entered.swap(true, Ordering::AcqRel) {
            return Err(RunError::AlreadyRunning);
        }
        let plan = self.freeze()?;
        let Some(mut current) = self.apply_machine(&plan) else {
            // The registry stays frozen, but the plan is intact: the caller
            // may designate a machine and enter again.
            self.inner.entered.store(false, Ordering::Release);
            return Err(RunError::NoMachine);
        };

        info!(workers = self.inner.workers, "runtime started");
        let pool = WorkerPool::spawn(self.inner.workers, &self.inner, &plan);

        loop {
            if self.lock_control().shutdown {
                break;
            }
            self.run_once(&plan, current);
            current = self
                .apply_machine(&plan)
                .expect("Runtime::run: current machine lost");
        }

        pool.shutdown(&self.inner);
        info!("runtime stopped");
        Ok(())
    }

    /// Execute the current machine once: seed the ready queue, wake the
    /// pool, and block until the machine quiesces.
    fn run_once(&self, plan: &Plan, machine: u32) {
        let label = &plan.machines[machine as usize].label;
        debug!(machine = %label, "machine execution started");

        let mut queues = self.lock_queues();
        queues.seed(plan, machine, &self.inner.inflight_total);
        self.inner.work_cv.notify_all();
        while !(queues.func_queue.is_empty()
            && self.inner.inflight_total.load(Ordering::Relaxed) == 0)
        {
            queues = self
                .inner
                .done_cv
                .wait(queues)
                .expect("Runtime::run_once: poisoned");
        }
        drop(queues);

        debug!(machine = %label, "machine execution finished");
    }

    /// Apply a queued machine swap. Only called between machine executions,
    /// so the current machine never changes mid-execution.
    fn apply_machine(&self, plan: &Plan) -> Option<u32> {
        let mut control = self.lock_control();
        if control.queued != control.current {
            control.current = control.queued;
            if let Some(machine) = control.current {
                info!(machine = %plan.machines[machine as usize].label, "machine swap applied");
            }
        }
        control.current
    }

    /// Convert the registry into the immutable plan shared with the pool.
    /// Idempotent: a second call hands back the existing plan.
    fn freeze(&self) -> Result<Arc<Plan>, RunError> {
        let mut state = self
            .inner
            .registry
            .lock()
            .expect("Runtime::freeze: poisoned");
        if let RegistryState::Frozen(plan) = &*state {
            return Ok(Arc::clone(plan));
        }
        let RegistryState::Building(registry) =
            std::mem::replace(&mut *state, RegistryState::Frozen(Arc::new(Plan::empty())))
        else {
            unreachable!("Runtime::freeze: [1]")
        };
        let plan = Arc::new(registry.finalize()?);
        *state = RegistryState::Frozen(Arc::clone(&plan));
        Ok(plan)
    }

    fn with_registry<R>(&self, f: impl FnOnce(&mut Registry) -> R) -> R {
        let mut state = self
            .inner
            .registry
            .lock()
            .expect("Runtime: registry poisoned");
        match &mut *state {
            RegistryState::Building(registry) => f(registry),
            RegistryState::Frozen(_) => {
                panic!("the graph registry is frozen once the runtime has started")
            }
        }
    }

    fn lock_control(&self) -> MutexGuard<'_, ControlState> {
        self.inner
            .control
            .lock()
            .expect("Runtime: control poisoned")
    }

    fn lock_queues(&self) -> MutexGuard<'_, ExecQueues> {
        self.inner.queues.lock().expect("Runtime: queues poisoned")
    }
}
