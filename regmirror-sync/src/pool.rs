//! Bounded worker pool for the blocking registry calls.
//!
//! Each call gets its own rayon pool sized to the configured worker count so
//! the bound is exact regardless of the global pool. Results come back in
//! input order whatever the completion order.

use rayon::prelude::*;

/// Apply `f` to every item using at most `workers` threads.
pub(crate) fn map_bounded<T, R, F>(items: &[T], workers: usize, f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    let workers = workers.min(items.len());
    if workers <= 1 {
        return items.iter().map(f).collect();
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|idx| format!("regmirror-worker-{idx}"))
        .build();
    match pool {
        Ok(pool) => pool.install(|| items.par_iter().map(&f).collect()),
        Err(err) => {
            tracing::warn!("cannot start {workers} workers ({err}); running sequentially");
            items.iter().map(f).collect()
        }
    }
}
