use std::{num::NonZeroUsize, thread};

/// Build-environment override for the pool-size ceiling.
///
/// Compile with `VINE_MAX_THREADS=<n>` in the environment to bound the
/// default worker count; the host's available parallelism bounds it
/// otherwise.
const MAX_THREADS: Option<&str> = option_env!("VINE_MAX_THREADS");

/// Default worker count: hardware parallelism capped by `VINE_MAX_THREADS`,
/// never less than 1.
pub(crate) fn default_pool_size() -> usize {
    let hardware = thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1);
    let ceiling = MAX_THREADS.map(|raw| {
        raw.parse::<usize>()
            .expect("VINE_MAX_THREADS must be a positive integer")
    });
    clamp_pool_size(hardware, ceiling)
}

fn clamp_pool_size(hardware: usize, ceiling: Option<usize>) -> usize {
    match ceiling {
        Some(ceiling) => hardware.min(ceiling),
        None => hardware,
    }
    .max(1)
}
