// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A scoped pool of worker threads, one per partition, that can sum the same
//! input over several rounds without re-spawning threads.

use crate::driver::{reduce_partials, Timed};
use crate::error::SumError;
#[cfg(feature = "log_parallelism")]
use crate::macros::log_trace;
use crate::macros::{log_debug, log_error};
use crate::partition::ChunkPlan;
use crate::worker::{sum_partition, OverflowPolicy, Overflowed, Summand};
use crossbeam_utils::CachePadded;
use std::cell::Cell;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::io;
use std::thread::{Builder, Scope, ScopedJoinHandle};
use std::time::Instant;

/// A pool of worker threads tied to a scope, each owning one partition of the
/// input.
///
/// Obtained via [`Summer::with_pool()`](crate::Summer::with_pool).
pub struct SumPool<'scope, T: Summand> {
    /// Worker threads.
    workers: WorkerPool<'scope, Result<T, Overflowed>>,
    /// How the input was split.
    plan: ChunkPlan,
    /// Number of threads that were requested.
    num_threads: NonZeroUsize,
    /// Overflow policy for the reduction of partial sums.
    overflow: OverflowPolicy,
}

impl<'scope, T: Summand> SumPool<'scope, T> {
    /// Splits the input and spawns one worker per partition.
    pub(crate) fn new<'env>(
        thread_scope: &'scope Scope<'scope, 'env>,
        input: &'env [T],
        num_threads: NonZeroUsize,
        overflow: OverflowPolicy,
    ) -> Result<Self, SumError> {
        let plan = ChunkPlan::new(input.len(), num_threads);
        let workers = WorkerPool::new(
            thread_scope,
            plan.split(input),
            move |partition| sum_partition(partition, overflow),
            pool_thread_builder,
        )?;
        Ok(Self {
            workers,
            plan,
            num_threads,
            overflow,
        })
    }

    /// Number of threads that were requested for this pool.
    pub fn num_threads(&self) -> NonZeroUsize {
        self.num_threads
    }

    /// Number of partitions, which is also the number of worker threads.
    pub fn num_partitions(&self) -> usize {
        self.plan.num_partitions()
    }

    /// Runs a summation round on the pool's workers and reduces their partial
    /// sums. The elapsed time covers dispatch, join and reduction, but not the
    /// initial spawning of the pool.
    pub fn sum(&self) -> Result<Timed<T>, SumError> {
        let start = Instant::now();
        let partials = self.workers.process_round()?;
        let value = reduce_partials(partials, self.overflow)?;
        Ok(Timed {
            value,
            elapsed: start.elapsed(),
            num_partitions: self.num_partitions(),
        })
    }
}

/// Status of the main thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MainStatus {
    /// The main thread is waiting for the worker threads to finish a round.
    Waiting,
    /// The main thread is ready to prepare the next round.
    Ready,
    /// The worker thread of the given partition panicked.
    WorkerPanic(usize),
}

/// Status sent to the worker threads.
#[derive(Clone, Copy, PartialEq, Eq)]
enum WorkerStatus {
    /// The threads need to compute a round of the given color.
    Round(RoundColor),
    /// There is nothing more to do and the threads must exit.
    Finished,
}

/// An 2-element enumeration to distinguish successive rounds. The "colors" are
/// only illustrative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoundColor {
    Blue,
    Red,
}

impl RoundColor {
    /// Flips to the other color.
    fn toggle(&mut self) {
        *self = match self {
            RoundColor::Blue => RoundColor::Red,
            RoundColor::Red => RoundColor::Blue,
        }
    }
}

/// An ergonomic wrapper around a [`Mutex`]-[`Condvar`] pair.
///
/// A poisoned mutex is recovered, as the protected status is always left in a
/// consistent state.
struct Status<T> {
    mutex: Mutex<T>,
    condvar: Condvar,
}

impl<T> Status<T> {
    /// Creates a new status initialized with the given value.
    fn new(t: T) -> Self {
        Self {
            mutex: Mutex::new(t),
            condvar: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, T> {
        self.mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the status to the given value and notifies one waiting thread.
    fn notify_one(&self, t: T) {
        *self.lock() = t;
        self.condvar.notify_one();
    }

    /// If the predicate is true on this status, sets the status to the given
    /// value and notifies one waiting thread.
    fn notify_one_if(&self, predicate: impl Fn(&T) -> bool, t: T) {
        let mut locked = self.lock();
        if predicate(&*locked) {
            *locked = t;
            self.condvar.notify_one();
        }
    }

    /// Sets the status to the given value and notifies all waiting threads.
    fn notify_all(&self, t: T) {
        *self.lock() = t;
        self.condvar.notify_all();
    }

    /// Waits until the predicate is false on this status.
    ///
    /// This returns a [`MutexGuard`], allowing to further inspect or modify the
    /// status.
    fn wait_while(&self, predicate: impl FnMut(&mut T) -> bool) -> MutexGuard<'_, T> {
        self.condvar
            .wait_while(self.lock(), predicate)
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Builder for the pool thread of the given partition.
fn pool_thread_builder(id: usize) -> io::Result<Builder> {
    Ok(Builder::new().name(format!("chunksum-pool-{id}")))
}

/// Storage for one worker's output, written by that worker only.
type Slot<Output> = Arc<CachePadded<Mutex<Option<Output>>>>;

fn take_slot<Output>(slot: &Slot<Output>) -> Option<Output> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

/// A pool of threads, each mapping its own partition to an output on every
/// round.
pub(crate) struct WorkerPool<'scope, Output> {
    /// Handles to all the worker threads in the pool, in partition order.
    threads: Vec<WorkerThreadHandle<'scope, Output>>,
    /// Number of worker threads active in the current round.
    num_active_threads: Arc<AtomicUsize>,
    /// Color of the current round.
    round: Cell<RoundColor>,
    /// Whether a worker panicked in a previous round.
    poisoned: Cell<bool>,
    /// Status of the worker threads.
    worker_status: Arc<Status<WorkerStatus>>,
    /// Status of the main thread.
    main_status: Arc<Status<MainStatus>>,
}

/// Handle to a worker thread in the pool.
struct WorkerThreadHandle<'scope, Output> {
    /// Thread handle object.
    handle: ScopedJoinHandle<'scope, ()>,
    /// Storage for this thread's computation output.
    slot: Slot<Output>,
}

impl<'scope, Output: Send + 'scope> WorkerPool<'scope, Output> {
    /// Spawns one thread per partition, each configured by `builder`. If a
    /// thread can't be spawned, the threads spawned so far are shut down and
    /// joined.
    pub(crate) fn new<'env, T, Kernel>(
        thread_scope: &'scope Scope<'scope, 'env>,
        partitions: impl Iterator<Item = &'env [T]>,
        kernel: Kernel,
        builder: impl Fn(usize) -> io::Result<Builder>,
    ) -> Result<Self, SumError>
    where
        T: Sync + 'env,
        Kernel: Fn(&'env [T]) -> Output + Clone + Send + 'scope,
    {
        let color = RoundColor::Blue;
        let mut pool = Self {
            threads: Vec::new(),
            num_active_threads: Arc::new(AtomicUsize::new(0)),
            round: Cell::new(color),
            poisoned: Cell::new(false),
            worker_status: Arc::new(Status::new(WorkerStatus::Round(color))),
            main_status: Arc::new(Status::new(MainStatus::Waiting)),
        };

        for (id, partition) in partitions.enumerate() {
            let slot = Arc::new(CachePadded::new(Mutex::new(None)));
            let context = WorkerContext {
                id,
                num_active_threads: pool.num_active_threads.clone(),
                worker_status: pool.worker_status.clone(),
                main_status: pool.main_status.clone(),
                partition,
                slot: slot.clone(),
                kernel: kernel.clone(),
            };
            let handle = builder(id)
                .and_then(|builder| builder.spawn_scoped(thread_scope, move || context.run()))
                .map_err(|source| {
                    log_error!("[main thread] Failed to spawn pool thread #{id}: {source}");
                    SumError::Spawn { index: id, source }
                })?;
            pool.threads.push(WorkerThreadHandle { handle, slot });
        }
        log_debug!("[main thread] Spawned {} pool threads", pool.threads.len());

        Ok(pool)
    }

    /// Performs a round, in which every worker maps its partition, and returns
    /// the outputs in partition order.
    pub(crate) fn process_round(&self) -> Result<Vec<Output>, SumError> {
        if self.poisoned.get() {
            return Err(SumError::PoolPoisoned);
        }
        let num_threads = self.threads.len();
        if num_threads == 0 {
            return Ok(Vec::new());
        }
        self.num_active_threads.store(num_threads, Ordering::SeqCst);

        let mut round = self.round.get();
        round.toggle();
        self.round.set(round);

        log_debug!("[main thread, round {round:?}] Ready to compute a round.");
        self.worker_status.notify_all(WorkerStatus::Round(round));

        log_debug!("[main thread, round {round:?}] Waiting for all threads to finish this round.");
        let mut guard = self
            .main_status
            .wait_while(|status| *status == MainStatus::Waiting);
        let status = *guard;
        *guard = MainStatus::Waiting;
        drop(guard);

        if let MainStatus::WorkerPanic(index) = status {
            log_error!("[main thread, round {round:?}] Worker thread #{index} panicked!");
            self.poisoned.set(true);
            return Err(SumError::WorkerPanicked { index });
        }
        log_debug!("[main thread, round {round:?}] All threads have now finished this round.");

        self.threads
            .iter()
            .enumerate()
            .map(|(index, t)| take_slot(&t.slot).ok_or(SumError::WorkerPanicked { index }))
            .collect()
    }
}

impl<Output> Drop for WorkerPool<'_, Output> {
    /// Joins all the threads in the pool.
    fn drop(&mut self) {
        log_debug!("[main thread] Notifying pool threads to finish...");
        self.worker_status.notify_all(WorkerStatus::Finished);

        for (_i, t) in self.threads.drain(..).enumerate() {
            match t.handle.join() {
                Ok(()) => log_debug!("[main thread] Pool thread {_i} joined."),
                Err(_) => log_error!("[main thread] Pool thread {_i} joined after a panic."),
            }
        }
        log_debug!("[main thread] Joined pool threads.");
    }
}

/// Context object owned by a worker thread.
struct WorkerContext<'env, T, Output, Kernel> {
    /// Index of the partition of this thread.
    id: usize,
    /// Number of worker threads active in the current round.
    num_active_threads: Arc<AtomicUsize>,
    /// Status of the worker threads.
    worker_status: Arc<Status<WorkerStatus>>,
    /// Status of the main thread.
    main_status: Arc<Status<MainStatus>>,
    /// Items that this worker thread processes.
    partition: &'env [T],
    /// Output that this thread writes to.
    slot: Slot<Output>,
    /// Function mapping the partition to the output.
    kernel: Kernel,
}

impl<'env, T, Output, Kernel> WorkerContext<'env, T, Output, Kernel>
where
    Kernel: Fn(&'env [T]) -> Output,
{
    /// Main function run by this thread.
    fn run(&self) {
        let id = self.id;
        let mut round = RoundColor::Blue;
        loop {
            round.toggle();
            log_debug!("[thread {id}, round {round:?}] Waiting for start signal");

            let worker_status: WorkerStatus =
                *self.worker_status.wait_while(|status| match status {
                    WorkerStatus::Finished => false,
                    WorkerStatus::Round(r) => *r != round,
                });
            match worker_status {
                WorkerStatus::Finished => {
                    log_debug!("[thread {id}, round {round:?}] Received finish signal");
                    break;
                }
                WorkerStatus::Round(r) => {
                    debug_assert_eq!(round, r);

                    // The kernel may panic, in which case the main thread must be
                    // notified to avoid a deadlock.
                    let panic_notifier = PanicNotifier {
                        id,
                        main_status: &self.main_status,
                    };
                    #[cfg(feature = "log_parallelism")]
                    let start = Instant::now();
                    let output = (self.kernel)(self.partition);
                    #[cfg(feature = "log_parallelism")]
                    log_trace!(
                        "[thread {id}, round {round:?}] Summed {} items in {:?}",
                        self.partition.len(),
                        start.elapsed()
                    );
                    *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(output);
                    std::mem::forget(panic_notifier);

                    let thread_count = self.num_active_threads.fetch_sub(1, Ordering::SeqCst);
                    debug_assert!(thread_count > 0);
                    if thread_count == 1 {
                        log_debug!(
                            "[thread {id}, round {round:?}] Last thread. Notifying the main thread."
                        );
                        self.main_status.notify_one_if(
                            |&status| status == MainStatus::Waiting,
                            MainStatus::Ready,
                        );
                    }
                }
            }
        }
    }
}

/// Object whose destructor notifies the main thread that a panic happened.
///
/// Create an instance before a section that may panic, and
/// [`std::mem::forget()`] it at the end of the section: the destructor only
/// runs when unwinding.
struct PanicNotifier<'a> {
    /// Index of the partition of this thread.
    id: usize,
    /// Status of the main thread.
    main_status: &'a Status<MainStatus>,
}

impl Drop for PanicNotifier<'_> {
    fn drop(&mut self) {
        log_error!(
            "[thread {}] Detected panic in this thread, notifying the main thread",
            self.id
        );
        self.main_status.notify_one(MainStatus::WorkerPanic(self.id));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::partition::split;
    use crate::{Dispatch, Summer, ThreadCount};

    fn summer(num_threads: usize) -> Summer {
        Summer {
            num_threads: ThreadCount::try_from(num_threads).unwrap(),
            overflow: OverflowPolicy::Wrapping,
            dispatch: Dispatch::Pool,
        }
    }

    #[test]
    fn test_pool_sum_concrete() {
        let input = [1, 2, 3, 4, 5, 6, 7];
        let sum = summer(3)
            .with_pool(&input, |pool| {
                assert_eq!(pool.num_threads().get(), 3);
                assert_eq!(pool.num_partitions(), 3);
                pool.sum()
            })
            .unwrap()
            .unwrap();
        assert_eq!(sum.value, 28);
        assert_eq!(sum.num_partitions, 3);
    }

    #[test]
    fn test_pool_sum_many_rounds() {
        let input = (0..=10_000).collect::<Vec<i64>>();
        let sums = summer(4)
            .with_pool(&input, |pool| {
                (0..100)
                    .map(|_| pool.sum().map(|timed| timed.value))
                    .collect::<Result<Vec<_>, _>>()
            })
            .unwrap()
            .unwrap();
        assert_eq!(sums.len(), 100);
        assert!(sums.iter().all(|&sum| sum == 5_000 * 10_001));
    }

    #[test]
    fn test_pool_empty_input() {
        let input: [i32; 0] = [];
        let sum = summer(4)
            .with_pool(&input, |pool| {
                assert_eq!(pool.num_partitions(), 0);
                pool.sum()
            })
            .unwrap()
            .unwrap();
        assert_eq!(sum.value, 0);
        assert_eq!(sum.num_partitions, 0);
    }

    #[test]
    fn test_pool_checked_overflow() {
        let input = [i32::MAX, 1, 2, 3];
        let result = Summer {
            overflow: OverflowPolicy::Checked,
            ..summer(2)
        }
        .with_pool(&input, |pool| pool.sum())
        .unwrap();
        assert!(matches!(
            result,
            Err(SumError::Overflow(crate::OverflowSite::Partition(0)))
        ));
    }

    #[test]
    fn test_worker_pool_panic() {
        let input = (0..100).collect::<Vec<u64>>();
        std::thread::scope(|scope| {
            let partitions = split(&input, NonZeroUsize::try_from(4).unwrap());
            let pool = WorkerPool::new(
                scope,
                partitions.into_iter(),
                |partition: &[u64]| {
                    if partition.contains(&60) {
                        panic!("arithmetic panic");
                    }
                    partition.iter().sum::<u64>()
                },
                pool_thread_builder,
            )
            .unwrap();
            assert_eq!(pool.threads.len(), 4);
            assert!(matches!(
                pool.process_round(),
                Err(SumError::WorkerPanicked { index: 2 })
            ));
            assert!(matches!(pool.process_round(), Err(SumError::PoolPoisoned)));
        });
    }

    #[test]
    fn test_worker_pool_outputs_in_order() {
        let input = (0..10).collect::<Vec<u64>>();
        std::thread::scope(|scope| {
            let pool = WorkerPool::new(
                scope,
                split(&input, NonZeroUsize::try_from(4).unwrap()).into_iter(),
                |partition: &[u64]| partition.to_vec(),
                pool_thread_builder,
            )
            .unwrap();
            let outputs = pool.process_round().unwrap();
            assert_eq!(outputs, [vec![0, 1, 2], vec![3, 4, 5], vec![6, 7, 8], vec![9]]);
        });
    }

    #[test]
    fn test_worker_pool_spawn_failure() {
        let input = (0..100).collect::<Vec<u64>>();
        // Each worker thread holds a clone of the kernel until it exits.
        let kernel_token = Arc::new(());
        let kernel = {
            let token = kernel_token.clone();
            move |partition: &[u64]| {
                let _ = &token;
                partition.iter().sum::<u64>()
            }
        };
        std::thread::scope(|scope| {
            let result = WorkerPool::new(
                scope,
                split(&input, NonZeroUsize::try_from(4).unwrap()).into_iter(),
                kernel,
                |id| {
                    if id == 2 {
                        Err(io::Error::other("thread limit reached"))
                    } else {
                        pool_thread_builder(id)
                    }
                },
            );
            assert!(matches!(result, Err(SumError::Spawn { index: 2, .. })));
            // Threads #0 and #1 were shut down and joined before returning.
            assert_eq!(Arc::strong_count(&kernel_token), 1);
        });
    }

    #[cfg(feature = "log_parallelism")]
    #[test]
    fn test_pool_traces_partitions() {
        use log::{Level, Log, Metadata, Record};

        struct Recorder(Mutex<Vec<String>>);

        impl Log for Recorder {
            fn enabled(&self, metadata: &Metadata) -> bool {
                metadata.level() <= Level::Trace
            }

            fn log(&self, record: &Record) {
                if record.level() == Level::Trace {
                    let message = record.args().to_string();
                    self.0
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(message);
                }
            }

            fn flush(&self) {}
        }

        static RECORDER: Recorder = Recorder(Mutex::new(Vec::new()));
        log::set_logger(&RECORDER).unwrap();
        log::set_max_level(log::LevelFilter::Trace);

        // 3 partitions of 4115 items, a size that no other test uses.
        let input = vec![1i64; 12_345];
        let sum = summer(3)
            .with_pool(&input, |pool| pool.sum())
            .unwrap()
            .unwrap();
        assert_eq!(sum.value, 12_345);

        let messages = RECORDER.0.lock().unwrap();
        let traced = messages
            .iter()
            .filter(|message| message.contains("Summed 4115 items in"))
            .count();
        assert_eq!(traced, 3);
    }
}
