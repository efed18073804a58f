use crate::{
    registry::Plan,
    sync::{AtomicUsize, Condvar, Ordering},
    task::TaskPromise,
    types::{TaskArg, TaskFn},
};
use derive_more::Debug;
use std::collections::VecDeque;
use tracing::debug;
use unzip3::Unzip3;

/// Position of one ready function: which stage node of the current machine,
/// and which function inside that stage node's stage.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct FuncLoc {
    pub(crate) stage_node: u32,
    pub(crate) func: u32,
}

/// One queued asynchronous task.
#[derive(Debug)]
pub(crate) struct QueuedTask {
    pub(crate) promise: TaskPromise,
    #[debug(skip)]
    pub(crate) func: TaskFn,
    #[debug(skip)]
    pub(crate) arg: TaskArg,
}

/// Everything guarded by the queue mutex: both ready queues and every
/// per-execution counter.
///
/// `funcs_inflight_total` lives next to this struct as an atomic (see
/// [`crate::runtime`]); it is only ever mutated while the queue mutex is
/// held, and the quiescence predicate reads it under the same mutex, so
/// pushes can never race completion detection.
#[derive(Debug)]
pub(crate) struct ExecQueues {
    /// Machine the counters below describe (index into the plan's machine
    /// table). Only valid while that machine is being executed.
    pub(crate) machine: u32,
    pub(crate) func_queue: VecDeque<FuncLoc>,
    pub(crate) task_queue: VecDeque<QueuedTask>,
    /// Remaining stage-level dependencies per stage node.
    stage_remaining: Vec<usize>,
    /// Remaining function-level dependencies, per stage node, per function.
    func_remaining: Vec<Vec<usize>>,
    /// Functions of each stage node currently enqueued or executing.
    funcs_inflight: Vec<usize>,
    /// Tells the workers to exit; set once at shutdown.
    pub(crate) terminate: bool,
}

impl ExecQueues {
    pub(crate) fn new() -> Self {
        Self {
            machine: 0,
            func_queue: VecDeque::new(),
            task_queue: VecDeque::new(),
            stage_remaining: Vec::new(),
            func_remaining: Vec::new(),
            funcs_inflight: Vec::new(),
            terminate: false,
        }
    }

    /// Rebuild every counter for a fresh execution of `machine` and enqueue
    /// each function that starts unblocked.
    ///
    /// Counters are reconstructed from the static dependency counts on every
    /// seed, so nothing can leak from the previous execution. Every push
    /// pairs with an inflight increment; the caller broadcasts the work
    /// condvar after seeding.
    pub(crate) fn seed(&mut self, plan: &Plan, machine: u32, inflight_total: &AtomicUsize) {
        debug_assert_eq!(
            inflight_total.load(Ordering::Relaxed),
            0,
            "ExecQueues::seed: [1]"
        );
        debug_assert!(self.func_queue.is_empty(), "ExecQueues::seed: [2]");

        self.machine = machine;
        let graph = &plan.machines[machine as usize].graph;

        let (stage_remaining, func_remaining, funcs_inflight) = graph
            .nodes
            .iter()
            .map(|node| {
                let stage = &plan.stages[node.payload as usize].graph;
                let per_func: Vec<usize> =
                    stage.nodes.iter().map(|func| func.dependencies).collect();
                (node.dependencies, per_func, 0_usize)
            })
            .unzip3();
        self.stage_remaining = stage_remaining;
        self.func_remaining = func_remaining;
        self.funcs_inflight = funcs_inflight;

        for &stage_node in &graph.independents {
            let stage = &plan.stages[graph.nodes[stage_node as usize].payload as usize].graph;
            for &func in &stage.independents {
                self.func_queue.push_back(FuncLoc { stage_node, func });
                self.funcs_inflight[stage_node as usize] += 1;
                inflight_total.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Dependency release, run by a worker right after function `loc`
    /// finished executing, with the queue mutex held.
    ///
    /// Mirrors the enqueue discipline of [`ExecQueues::seed`]: whenever a
    /// function becomes ready it is pushed exactly once, its stage node's
    /// inflight count grows, and the work condvar is signaled once per push.
    pub(crate) fn release_completed(
        &mut self,
        plan: &Plan,
        loc: FuncLoc,
        inflight_total: &AtomicUsize,
        work_cv: &Condvar,
    ) {
        let machine = &plan.machines[self.machine as usize].graph;
        let stage_node = &machine.nodes[loc.stage_node as usize];
        let stage = &plan.stages[stage_node.payload as usize];
        let func_node = &stage.graph.nodes[loc.func as usize];

        let sn = loc.stage_node as usize;
        self.funcs_inflight[sn] -= 1;
        inflight_total.fetch_sub(1, Ordering::Relaxed);

        if !func_node.dependants.is_empty() {
            for &dep in &func_node.dependants {
                let remaining = &mut self.func_remaining[sn][dep as usize];
                *remaining -= 1;
                if *remaining != 0 {
                    continue;
                }
                self.func_queue.push_back(FuncLoc {
                    stage_node: loc.stage_node,
                    func: dep,
                });
                self.funcs_inflight[sn] += 1;
                inflight_total.fetch_add(1, Ordering::Relaxed);
                work_cv.notify_one();
            }
        } else if self.funcs_inflight[sn] == 0 {
            // The stage node's last function just finished; release its
            // dependant stage nodes.
            for &dep_node in &stage_node.dependants {
                let remaining = &mut self.stage_remaining[dep_node as usize];
                *remaining -= 1;
                if *remaining != 0 {
                    continue;
                }
                let dep_stage = plan.stage_of(self.machine, dep_node);
                debug!(stage = %dep_stage.label, "stage released");
                for &func in &dep_stage.graph.independents {
                    self.func_queue.push_back(FuncLoc {
                        stage_node: dep_node,
                        func,
                    });
                    self.funcs_inflight[dep_node as usize] += 1;
                    inflight_total.fetch_add(1, Ordering::Relaxed);
                    work_cv.notify_one();
                }
            }
        }
    }
}
