//! Sample-parallel execution over the batch dimension.
//!
//! Kernels express their work as a per-sample computation that returns an
//! owned result struct; [`map_samples`] runs it either serially or across
//! the rayon pool, depending on an advisory flag and a minimum-grain
//! threshold. Because every sample's read footprint is shared-immutable and
//! its write footprint is its own result value, no synchronization is
//! needed inside the parallel body and the output order is the sample order
//! either way: serial and parallel execution produce bit-identical results.

use rayon::prelude::*;

/// Batches smaller than this run serially even when parallelism is allowed;
/// thread fan-out costs more than it saves at this size.
pub const MIN_PARALLEL_BATCH: usize = 8;

/// Runs `f` for each sample index in `0..batch`, collecting results in
/// sample order.
///
/// `parallel` is advisory: the batch is only partitioned across threads
/// when it is large enough to cross [`MIN_PARALLEL_BATCH`].
pub fn map_samples<T, F>(parallel: bool, batch: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Send + Sync,
{
    if parallel && batch >= MIN_PARALLEL_BATCH {
        (0..batch).into_par_iter().map(f).collect()
    } else {
        (0..batch).map(f).collect()
    }
}
