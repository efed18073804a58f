#[cfg(feature = "loom")]
mod imp {
    pub(crate) use loom::{
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            Arc, Condvar, Mutex, MutexGuard,
        },
        thread,
    };

    pub(crate) fn spawn_worker(
        _name: String,
        f: impl FnOnce() + Send + 'static,
    ) -> thread::JoinHandle<()> {
        thread::spawn(f)
    }
}

#[cfg(not(feature = "loom"))]
mod imp {
    pub(crate) use std::{
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            Arc, Condvar, Mutex, MutexGuard,
        },
        thread,
    };

    pub(crate) fn spawn_worker(
        name: String,
        f: impl FnOnce() + Send + 'static,
    ) -> thread::JoinHandle<()> {
        thread::Builder::new()
            .name(name)
            .spawn(f)
            .expect("failed to spawn worker thread")
    }
}

pub(crate) use imp::*;
