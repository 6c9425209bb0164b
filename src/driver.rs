// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Parallel and sequential summation drivers.

use crate::error::{OverflowSite, SumError};
#[cfg(feature = "log_parallelism")]
use crate::macros::log_trace;
use crate::macros::{log_debug, log_error};
use crate::partition::ChunkPlan;
use crate::pool::SumPool;
use crate::threads::{Dispatch, ThreadCount};
use crate::worker::{reduce, sum_partition, wrapping_sum, OverflowPolicy, Overflowed, Summand};
use crossbeam_utils::CachePadded;
use std::io;
use std::thread::Builder;
use std::time::{Duration, Instant};

/// Result of a timed summation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timed<T> {
    /// The computed sum.
    pub value: T,
    /// Wall-clock time of the summation.
    pub elapsed: Duration,
    /// Number of partitions that were summed, one per worker. This is 1 for a
    /// sequential sum.
    pub num_partitions: usize,
}

impl<T> Timed<T> {
    /// Elapsed time in seconds.
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

/// Parameters of a summation.
///
/// ```rust
/// # use chunksum::{Dispatch, OverflowPolicy, Summer, ThreadCount};
/// let summer = Summer {
///     num_threads: ThreadCount::try_from(3).unwrap(),
///     overflow: OverflowPolicy::Wrapping,
///     dispatch: Dispatch::Spawn,
/// };
///
/// let input = [1, 2, 3, 4, 5, 6, 7];
/// let parallel = summer.parallel_sum(&input).unwrap();
/// let sequential = summer.sequential_sum(&input).unwrap();
/// assert_eq!(parallel.value, 28);
/// assert_eq!(parallel.num_partitions, 3);
/// assert_eq!(sequential.value, 28);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Summer {
    /// Number of worker threads to request. The actual number of workers is
    /// the number of partitions, which may be lower.
    pub num_threads: ThreadCount,
    /// Behavior on integer overflow.
    pub overflow: OverflowPolicy,
    /// How the workers are run.
    pub dispatch: Dispatch,
}

impl Summer {
    /// Splits the input into contiguous partitions, sums each one on its own
    /// thread and reduces the partial sums.
    ///
    /// With [`Dispatch::Spawn`] the elapsed time covers partitioning, spawning,
    /// joining and reduction. With [`Dispatch::Pool`] a pool is built for this
    /// call only, and the elapsed time covers one round on it.
    pub fn parallel_sum<T: Summand>(&self, input: &[T]) -> Result<Timed<T>, SumError> {
        match self.dispatch {
            Dispatch::Spawn => {
                let start = Instant::now();
                let num_threads = self.num_threads.count();
                let plan = ChunkPlan::new(input.len(), num_threads);
                log_debug!(
                    "[main thread] Summing {} items with {num_threads} requested thread(s): {} partition(s) of up to {} items",
                    input.len(),
                    plan.num_partitions(),
                    plan.chunk_size()
                );
                let overflow = self.overflow;
                let partials = spawn_partitions(
                    &plan,
                    input,
                    |partition| sum_partition(partition, overflow),
                    worker_thread_builder,
                )?;
                let value = reduce_partials(partials, overflow)?;
                Ok(Timed {
                    value,
                    elapsed: start.elapsed(),
                    num_partitions: plan.num_partitions(),
                })
            }
            Dispatch::Pool => self.with_pool(input, |pool| pool.sum())?,
        }
    }

    /// Sums the input with a single pass on the calling thread.
    pub fn sequential_sum<T: Summand>(&self, input: &[T]) -> Result<Timed<T>, SumError> {
        let start = Instant::now();
        let value = sum_partition(input, self.overflow)
            .map_err(|Overflowed| SumError::Overflow(OverflowSite::Sequential))?;
        Ok(Timed {
            value,
            elapsed: start.elapsed(),
            num_partitions: 1,
        })
    }

    /// Spawns a scoped pool of workers over the given input, and calls the
    /// given function with it. The pool is shut down when the function
    /// returns.
    ///
    /// ```rust
    /// # use chunksum::{Dispatch, OverflowPolicy, Summer, ThreadCount};
    /// let summer = Summer {
    ///     num_threads: ThreadCount::try_from(4).unwrap(),
    ///     overflow: OverflowPolicy::Wrapping,
    ///     dispatch: Dispatch::Pool,
    /// };
    ///
    /// let input = (1..=100).collect::<Vec<i64>>();
    /// let (first, second) = summer
    ///     .with_pool(&input, |pool| (pool.sum(), pool.sum()))
    ///     .unwrap();
    /// assert_eq!(first.unwrap().value, 5050);
    /// assert_eq!(second.unwrap().value, 5050);
    /// ```
    pub fn with_pool<T: Summand, R>(
        &self,
        input: &[T],
        f: impl FnOnce(&SumPool<'_, T>) -> R,
    ) -> Result<R, SumError> {
        std::thread::scope(|scope| {
            let pool = SumPool::new(scope, input, self.num_threads.count(), self.overflow)?;
            Ok(f(&pool))
        })
    }
}

/// Sums the input on `num_threads` freshly spawned threads, with wrapping
/// arithmetic.
///
/// Fails if `num_threads` is zero, if a thread can't be spawned, or if a
/// worker panics.
pub fn parallel_sum<T: Summand>(input: &[T], num_threads: usize) -> Result<Timed<T>, SumError> {
    Summer {
        num_threads: ThreadCount::try_from(num_threads)?,
        overflow: OverflowPolicy::Wrapping,
        dispatch: Dispatch::Spawn,
    }
    .parallel_sum(input)
}

/// Sums the input on the calling thread, with wrapping arithmetic.
pub fn sequential_sum<T: Summand>(input: &[T]) -> Timed<T> {
    let start = Instant::now();
    let value = wrapping_sum(input);
    Timed {
        value,
        elapsed: start.elapsed(),
        num_partitions: 1,
    }
}

/// Reduces the partial sums of all partitions, in partition order.
pub(crate) fn reduce_partials<T: Summand>(
    partials: impl IntoIterator<Item = Result<T, Overflowed>>,
    overflow: OverflowPolicy,
) -> Result<T, SumError> {
    let partials = partials
        .into_iter()
        .enumerate()
        .map(|(index, partial)| {
            partial.map_err(|Overflowed| SumError::Overflow(OverflowSite::Partition(index)))
        })
        .collect::<Result<Vec<T>, SumError>>()?;
    reduce(partials, overflow).map_err(|Overflowed| SumError::Overflow(OverflowSite::Reduction))
}

/// Builder for the worker thread of the given partition.
fn worker_thread_builder(index: usize) -> io::Result<Builder> {
    Ok(Builder::new().name(format!("chunksum-worker-{index}")))
}

/// Spawns one scoped thread per partition of the plan, each configured by
/// `builder`, waits for all of them and returns their outputs in partition
/// order.
///
/// Each worker writes its output into its own cache-padded slot. The slots are
/// only read once every spawned thread has been joined. If a thread can't be
/// spawned, no further thread is spawned and the ones already running are
/// joined before returning the error.
fn spawn_partitions<'a, T, Output, Kernel>(
    plan: &ChunkPlan,
    input: &'a [T],
    kernel: Kernel,
    builder: impl Fn(usize) -> io::Result<Builder>,
) -> Result<Vec<Output>, SumError>
where
    T: Sync,
    Output: Send,
    Kernel: Fn(&'a [T]) -> Output + Sync,
{
    let mut slots = (0..plan.num_partitions())
        .map(|_| CachePadded::new(None))
        .collect::<Vec<CachePadded<Option<Output>>>>();
    let work = plan.split(input).zip(slots.iter_mut()).enumerate();
    let kernel = &kernel;

    let mut spawn_error = None;
    let mut first_panic = None;
    std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(plan.num_partitions());
        for (index, (partition, slot)) in work {
            let spawned = builder(index).and_then(|builder| {
                builder.spawn_scoped(scope, move || {
                    #[cfg(feature = "log_parallelism")]
                    let start = Instant::now();
                    **slot = Some(kernel(partition));
                    #[cfg(feature = "log_parallelism")]
                    log_trace!(
                        "[thread {index}] Summed {} items in {:?}",
                        partition.len(),
                        start.elapsed()
                    );
                })
            });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    log_error!("[main thread] Failed to spawn worker thread #{index}: {source}");
                    spawn_error = Some(SumError::Spawn { index, source });
                    break;
                }
            }
        }
        log_debug!("[main thread] Spawned {} worker thread(s)", handles.len());

        for (index, handle) in handles.into_iter().enumerate() {
            if handle.join().is_err() {
                log_error!("[main thread] Worker thread #{index} panicked!");
                if first_panic.is_none() {
                    first_panic = Some(index);
                }
            }
        }
        log_debug!("[main thread] Joined worker threads");
    });

    if let Some(error) = spawn_error {
        return Err(error);
    }
    if let Some(index) = first_panic {
        return Err(SumError::WorkerPanicked { index });
    }
    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            CachePadded::into_inner(slot).ok_or(SumError::WorkerPanicked { index })
        })
        .collect()
}
