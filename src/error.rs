// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Error types.

use std::fmt;

/// Errors that can happen while computing or benchmarking a sum.
#[derive(Debug, thiserror::Error)]
pub enum SumError {
    /// The requested configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The operating system refused to create a worker thread.
    #[error("failed to spawn worker thread #{index}: {source}")]
    Spawn {
        /// Index of the partition whose worker couldn't be spawned.
        index: usize,
        /// Underlying error returned by the OS.
        #[source]
        source: std::io::Error,
    },

    /// A worker thread panicked before producing its partial sum.
    #[error("worker thread #{index} panicked")]
    WorkerPanicked {
        /// Index of the partition whose worker panicked.
        index: usize,
    },

    /// A worker of the pool panicked in an earlier round, so the pool can't
    /// process any more rounds.
    #[error("the worker pool is unusable after a worker panicked")]
    PoolPoisoned,

    /// The accumulation overflowed under [`OverflowPolicy::Checked`](crate::OverflowPolicy::Checked).
    #[error("integer overflow while summing {0}")]
    Overflow(OverflowSite),

    /// A parallel sum disagreed with the sequential baseline.
    #[error(
        "parallel sum with {num_threads} thread(s) is {parallel}, but the sequential sum is {sequential}"
    )]
    Mismatch {
        /// Number of threads requested for the parallel run.
        num_threads: usize,
        /// Parallel result.
        parallel: i64,
        /// Sequential result.
        sequential: i64,
    },

    /// The benchmark report couldn't be written.
    #[error("failed to write the report: {0}")]
    Report(#[from] std::io::Error),
}

/// Errors in a benchmark or summation configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A thread count of zero was requested.
    #[error("thread count must be at least 1")]
    ZeroThreads,

    /// A thread count couldn't be parsed.
    #[error("invalid thread count {0:?}, expected a positive integer or \"auto\"")]
    InvalidThreadCount(String),

    /// The list of thread counts to benchmark is empty.
    #[error("at least one thread count is required")]
    NoThreadCounts,

    /// The range of random values is empty.
    #[error("value range is empty: min {min} > max {max}")]
    EmptyValueRange {
        /// Lower bound.
        min: i32,
        /// Upper bound.
        max: i32,
    },

    /// Each thread count must be measured at least once.
    #[error("number of rounds must be at least 1")]
    ZeroRounds,
}

/// Where an overflow was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowSite {
    /// While a worker summed the given partition.
    Partition(usize),
    /// While reducing the partial sums.
    Reduction,
    /// While summing sequentially.
    Sequential,
}

impl fmt::Display for OverflowSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverflowSite::Partition(index) => write!(f, "partition #{index}"),
            OverflowSite::Reduction => f.write_str("the partial sums"),
            OverflowSite::Sequential => f.write_str("sequentially"),
        }
    }
}
