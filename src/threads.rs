// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Number of worker threads and how they are dispatched.

use crate::error::ConfigError;
use crate::macros::log_warn;
use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;

/// Number of worker threads to request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadCount {
    /// Request the number of threads returned by
    /// [`std::thread::available_parallelism()`].
    AvailableParallelism,
    /// Request the given number of threads.
    Count(NonZeroUsize),
}

impl ThreadCount {
    /// Resolves the number of threads to request. Falls back to a single
    /// thread if the available parallelism can't be determined.
    pub fn count(self) -> NonZeroUsize {
        match self {
            ThreadCount::AvailableParallelism => {
                available_parallelism().unwrap_or(NonZeroUsize::MIN)
            }
            ThreadCount::Count(count) => count,
        }
    }
}

/// Returns the detected hardware concurrency, or [`None`] if it can't be
/// determined on this platform.
pub fn available_parallelism() -> Option<NonZeroUsize> {
    match std::thread::available_parallelism() {
        Ok(count) => Some(count),
        Err(_e) => {
            log_warn!("Getting the available parallelism failed: {_e}");
            None
        }
    }
}

impl TryFrom<usize> for ThreadCount {
    type Error = ConfigError;

    fn try_from(thread_count: usize) -> Result<Self, Self::Error> {
        let count = NonZeroUsize::try_from(thread_count).map_err(|_| ConfigError::ZeroThreads)?;
        Ok(ThreadCount::Count(count))
    }
}

impl FromStr for ThreadCount {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(ThreadCount::AvailableParallelism);
        }
        let count = s
            .parse::<usize>()
            .map_err(|_| ConfigError::InvalidThreadCount(s.to_owned()))?;
        ThreadCount::try_from(count)
    }
}

impl fmt::Display for ThreadCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadCount::AvailableParallelism => f.write_str("auto"),
            ThreadCount::Count(count) => write!(f, "{count}"),
        }
    }
}

/// Strategy to run the workers of a parallel sum.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Dispatch {
    /// Spawn fresh threads for every sum, and join them before returning.
    #[default]
    Spawn,
    /// Spawn the threads once into a pool, and dispatch every sum to them.
    Pool,
}

impl fmt::Display for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Dispatch::Spawn => "spawn",
            Dispatch::Pool => "pool",
        })
    }
}
