use core::cell::UnsafeCell;
use derive_more::{Deref, DerefMut};
use indexmap::IndexSet as _IndexSet;
use rustc_hash::FxBuildHasher;
use std::any::Any;

/// Opaque handle to a stage, returned by [`crate::Runtime::add_stage`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct StageId(pub(crate) u32);

/// Opaque handle to a machine, returned by [`crate::Runtime::add_machine`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct MachineId(pub(crate) u32);

/// Handle to a function node inside one stage's graph.
///
/// Records the owning stage so that a dependency reference into a different
/// stage can be rejected at registration time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct FuncId {
    pub(crate) stage: StageId,
    pub(crate) index: u32,
}

/// Handle to a stage node inside one machine's graph.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct StageNodeId {
    pub(crate) machine: MachineId,
    pub(crate) index: u32,
}

/// A parameterless unit of work owned by a stage. Re-invoked on every
/// execution of a machine containing that stage.
pub(crate) type StageFn = Box<dyn Fn() + Send + Sync>;

/// Type-erased argument handed to a task when it executes; the task function
/// is responsible for downcasting it.
pub type TaskArg = Box<dyn Any + Send>;

/// A one-shot task function consuming its type-erased argument.
pub(crate) type TaskFn = Box<dyn FnOnce(TaskArg) + Send>;

pub(crate) type IndexSet<T> = _IndexSet<T, FxBuildHasher>;

/// A minimal `UnsafeCell` wrapper that can be shared across threads.
///
/// Used by [`crate::Batch`] to give each worker mutable access to its own
/// slot; correctness is ensured by scheduling (worker indices are unique),
/// not by the type system.
#[derive(Debug, Deref, DerefMut)]
#[repr(transparent)]
pub(crate) struct SyncUnsafeCell<T>(UnsafeCell<T>);

impl<T> SyncUnsafeCell<T> {
    pub(crate) fn new(val: T) -> Self {
        Self(UnsafeCell::new(val))
    }

    pub(crate) fn into_inner(self) -> T {
        self.0.into_inner()
    }
}
