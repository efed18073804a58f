use crate::{pool, runtime::Runtime, types::SyncUnsafeCell};

/// One container per worker thread.
///
/// Stage functions and tasks running on the pool reach their own slot
/// through [`Batch::with_local`] without any synchronization, keyed by
/// [`crate::thread_id`]. Results are collected once the pool has stopped,
/// either by ownership ([`Batch::iter_mut`], [`Batch::into_inner`]) or via
/// the unsafe shared iterator when the batch is still behind an `Arc`.
#[must_use]
pub struct Batch<C> {
    slots: Vec<SyncUnsafeCell<C>>,
}

// SAFETY: each slot is only ever accessed mutably by the worker whose pool
// index selects it (worker indices are unique), or once no workers are
// running. `C: Send` because slots are populated on worker threads and
// consumed wherever the batch ends up.
unsafe impl<C: Send> Sync for Batch<C> {}

impl<C: Default> Batch<C> {
    /// One default-constructed container per worker of `runtime`'s pool.
    pub fn new(runtime: &Runtime) -> Self {
        Self {
            slots: (0..runtime.thread_count())
                .map(|_| SyncUnsafeCell::new(C::default()))
                .collect(),
        }
    }
}

impl<C: Send> Batch<C> {
    /// Mutable access to the calling worker's own container.
    ///
    /// # Panics
    /// When called from a thread outside the worker pool.
    pub fn with_local<R>(&self, f: impl FnOnce(&mut C) -> R) -> R {
        let slot = &self.slots[pool::thread_id()];
        // SAFETY: `thread_id()` is unique per live worker, so no other
        // thread can reach this slot, and the reference does not outlive
        // `f`.
        f(unsafe { &mut *slot.get() })
    }

    /// Iterate over every worker's container.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut C> {
        self.slots.iter_mut().map(|slot| slot.get_mut())
    }

    /// Consume the batch, yielding every worker's container in pool order.
    #[must_use]
    pub fn into_inner(self) -> Vec<C> {
        self.slots
            .into_iter()
            .map(SyncUnsafeCell::into_inner)
            .collect()
    }

    /// Iterate over every worker's container through a shared reference.
    ///
    /// # Safety
    /// No worker may access the batch concurrently: either the runtime has
    /// shut down, or the caller's own scheduling guarantees exclusivity.
    pub unsafe fn iter_all(&self) -> impl Iterator<Item = &C> {
        // SAFETY: exclusivity is the caller's obligation, per above.
        self.slots.iter().map(|slot| unsafe { &*slot.get() })
    }
}
