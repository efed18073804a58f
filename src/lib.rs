//! Two-level dependency-graph executor for structuring applications as
//! graphs of short functions instead of thread-synchronized code.
//!
//! A program declares:
//! - **stages**: directed acyclic graphs of parameterless functions,
//! - **machines**: directed acyclic graphs of stages,
//! - an **initial machine**.
//!
//! The runtime then executes the current machine in a loop on a fixed-size
//! worker pool, honoring intra-stage and inter-stage dependencies, while
//! also draining a queue of user-submitted asynchronous tasks on
//! otherwise-idle workers. Execution continues until the machine is swapped
//! ([`Runtime::set_machine`]) or shutdown is requested
//! ([`Runtime::request_shutdown`]); both take effect between machine
//! executions, so an execution in progress always runs to completion.
//!
//! Key modules:
//! - `runtime`: the [`Runtime`] handle with the registration surface, control
//!   state, and the machine execution loop.
//! - `task`: [`TaskPromise`], the completion handle for asynchronous tasks.
//! - `batch`: [`Batch`], per-worker containers addressed by [`thread_id`].
//! - `types`: the opaque identity handles returned by registration.
//!
//! Quick start:
//! 1. Build a [`Runtime`], create stages and machines, and register
//!    function and stage nodes; dependencies are expressed as previously
//!    returned handles, so a dependency always precedes its dependants.
//! 2. Designate the initial machine with [`Runtime::set_machine`].
//! 3. Call [`Runtime::run`]; it returns when shutdown is requested.
//!
//! ```
//! use vine::Runtime;
//!
//! let rt = Runtime::with_worker_threads(2);
//!
//! let stage = rt.add_stage("greet");
//! let hello = rt.add_function(stage, &[], || print!("Hello "));
//! let shutdown = rt.clone();
//! rt.add_function(stage, &[hello], move || {
//!     println!("World!");
//!     shutdown.request_shutdown();
//! });
//!
//! let machine = rt.add_machine("main");
//! rt.add_stage_node(machine, stage, &[]);
//! rt.set_machine(machine);
//!
//! rt.run().expect("a machine was designated");
//! ```
//!
//! Functions are parameterless and exchange data only through shared state
//! the user manages; the only ordering guarantee between them is the
//! transitive dependency relation. There is no error channel: a function or
//! task that panics terminates the process.

/// Per-worker containers for lock-free accumulation from stage functions
/// and tasks.
pub mod batch;
mod config;
mod graph;
mod pool;
mod registry;
/// The runtime handle: registration surface, control state, and the machine
/// execution loop.
pub mod runtime;
mod sched;
mod sync;
/// Task promises: completion handles for asynchronous tasks.
pub mod task;
/// Identity handles returned by registration, plus common type aliases.
pub mod types;

pub use crate::{
    batch::Batch,
    pool::thread_id,
    runtime::{RunError, Runtime},
    task::TaskPromise,
    types::{FuncId, MachineId, StageId, StageNodeId, TaskArg},
};
