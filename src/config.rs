// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Benchmark configuration.

use crate::error::ConfigError;
use crate::threads::{Dispatch, ThreadCount};
use crate::worker::OverflowPolicy;
use std::num::NonZeroUsize;

/// Integer type of the generated array.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IntegerWidth {
    /// 32-bit signed integers.
    #[default]
    I32,
    /// 64-bit signed integers.
    I64,
}

/// Configuration of a benchmark run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BenchConfig {
    /// Number of elements to generate.
    pub array_size: usize,
    /// Smallest generated value.
    pub min_value: i32,
    /// Largest generated value.
    pub max_value: i32,
    /// Thread counts to benchmark, in order.
    pub thread_counts: Vec<ThreadCount>,
    /// How the workers are run.
    pub dispatch: Dispatch,
    /// Behavior on integer overflow.
    pub overflow: OverflowPolicy,
    /// Integer type of the array.
    pub width: IntegerWidth,
    /// Number of measurements for each thread count.
    pub rounds: usize,
    /// Seed of the random generator. A random seed is used if [`None`].
    pub seed: Option<u64>,
}

/// Thread counts benchmarked by default.
pub const DEFAULT_THREAD_COUNTS: [usize; 4] = [1, 4, 8, 10];

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            array_size: 10_000_000,
            min_value: 1,
            max_value: 100,
            thread_counts: DEFAULT_THREAD_COUNTS
                .iter()
                .filter_map(|&count| NonZeroUsize::new(count))
                .map(ThreadCount::Count)
                .collect(),
            dispatch: Dispatch::Spawn,
            overflow: OverflowPolicy::Wrapping,
            width: IntegerWidth::I32,
            rounds: 1,
            seed: None,
        }
    }
}

impl BenchConfig {
    /// Checks that the configuration describes at least one measurement over a
    /// non-empty value range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_value > self.max_value {
            return Err(ConfigError::EmptyValueRange {
                min: self.min_value,
                max: self.max_value,
            });
        }
        if self.thread_counts.is_empty() {
            return Err(ConfigError::NoThreadCounts);
        }
        if self.rounds == 0 {
            return Err(ConfigError::ZeroRounds);
        }
        Ok(())
    }
}
