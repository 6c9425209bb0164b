// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Benchmark harness: generates an input array, then times the parallel sum
//! for each configured thread count and the sequential sum.

use crate::config::{BenchConfig, IntegerWidth};
use crate::driver::{Summer, Timed};
use crate::error::SumError;
use crate::macros::{log_error, log_info};
use crate::threads::{available_parallelism, Dispatch, ThreadCount};
use crate::worker::Summand;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;
use std::fmt;
use std::io::Write;
use std::time::Duration;

/// Kind of a benchmark run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunKind {
    /// A parallel sum.
    Parallel {
        /// How the workers were run.
        dispatch: Dispatch,
        /// Number of threads that were requested.
        threads: ThreadCount,
        /// Index of the measurement for this thread count.
        round: usize,
    },
    /// The sequential baseline.
    Sequential,
}

/// Measurement of one benchmark run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Report {
    /// What was run.
    pub kind: RunKind,
    /// Number of partitions, i.e. of worker threads actually used.
    pub num_partitions: usize,
    /// Wall-clock time.
    pub elapsed: Duration,
    /// Computed sum, widened to 64 bits.
    pub sum: i64,
}

impl Report {
    fn new<T: Summand>(kind: RunKind, timed: Timed<T>) -> Self {
        Self {
            kind,
            num_partitions: timed.num_partitions,
            elapsed: timed.elapsed,
            sum: timed.value.into(),
        }
    }

    /// Elapsed time in seconds.
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            RunKind::Parallel {
                dispatch,
                threads,
                round,
            } => write!(
                f,
                "[{dispatch}] {threads} thread(s), {} partition(s), round {round}: {:.6} s, sum = {}",
                self.num_partitions,
                self.elapsed_secs(),
                self.sum
            ),
            RunKind::Sequential => write!(
                f,
                "[sequential] 1 thread: {:.6} s, sum = {}",
                self.elapsed_secs(),
                self.sum
            ),
        }
    }
}

/// Generates `len` uniformly distributed values in `min..=max`, with the
/// given seed if any.
pub fn generate_input<T: Summand>(len: usize, min: i32, max: i32, seed: Option<u64>) -> Vec<T> {
    let mut rng = match seed {
        Some(seed) => ChaCha12Rng::seed_from_u64(seed),
        None => ChaCha12Rng::from_rng(&mut rand::rng()),
    };
    (0..len)
        .map(|_| T::from_i32(rng.random_range(min..=max)))
        .collect()
}

/// Runs the benchmark described by the configuration, writing one line per
/// run to `out`, and returns the measurements (sequential last).
///
/// Every parallel sum is checked against the sequential sum.
pub fn run(config: &BenchConfig, out: &mut impl Write) -> Result<Vec<Report>, SumError> {
    config.validate()?;
    match config.width {
        IntegerWidth::I32 => run_with::<i32>(config, out),
        IntegerWidth::I64 => run_with::<i64>(config, out),
    }
}

fn run_with<T: Summand>(
    config: &BenchConfig,
    out: &mut impl Write,
) -> Result<Vec<Report>, SumError> {
    let input = generate_input::<T>(
        config.array_size,
        config.min_value,
        config.max_value,
        config.seed,
    );
    log_info!(
        "Generated {} {} values in [{}, {}]",
        input.len(),
        T::NAME,
        config.min_value,
        config.max_value
    );

    match available_parallelism() {
        Some(count) => writeln!(out, "Hardware concurrency: {count}")?,
        None => writeln!(out, "Hardware concurrency: unknown")?,
    }

    let mut reports = Vec::with_capacity(config.thread_counts.len() * config.rounds + 1);
    for &threads in &config.thread_counts {
        let summer = Summer {
            num_threads: threads,
            overflow: config.overflow,
            dispatch: config.dispatch,
        };
        let timings = match config.dispatch {
            Dispatch::Spawn => (0..config.rounds)
                .map(|_| summer.parallel_sum(&input))
                .collect::<Result<Vec<_>, _>>()?,
            Dispatch::Pool => summer.with_pool(&input, |pool| {
                (0..config.rounds)
                    .map(|_| pool.sum())
                    .collect::<Result<Vec<_>, _>>()
            })??,
        };
        for (round, timed) in timings.into_iter().enumerate() {
            let report = Report::new(
                RunKind::Parallel {
                    dispatch: config.dispatch,
                    threads,
                    round,
                },
                timed,
            );
            writeln!(out, "{report}")?;
            reports.push(report);
        }
    }

    let sequential = Summer {
        num_threads: ThreadCount::Count(std::num::NonZeroUsize::MIN),
        overflow: config.overflow,
        dispatch: config.dispatch,
    }
    .sequential_sum(&input)?;
    let sequential = Report::new(RunKind::Sequential, sequential);
    writeln!(out, "{sequential}")?;

    check_sums(&reports, &sequential)?;
    reports.push(sequential);
    Ok(reports)
}

/// Checks that every parallel run agrees with the sequential baseline.
fn check_sums(parallel: &[Report], sequential: &Report) -> Result<(), SumError> {
    for report in parallel {
        if report.sum != sequential.sum {
            let num_threads = match report.kind {
                RunKind::Parallel { threads, .. } => threads.count().get(),
                RunKind::Sequential => 1,
            };
            log_error!("Mismatch: {report} vs. {sequential}");
            return Err(SumError::Mismatch {
                num_threads,
                parallel: report.sum,
                sequential: sequential.sum,
            });
        }
    }
    log_info!("All {} parallel sum(s) match the sequential sum", parallel.len());
    Ok(())
}
