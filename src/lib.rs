// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

#![doc = include_str!("../README.md")]
#![forbid(missing_docs, unsafe_code)]

mod config;
mod driver;
mod error;
pub mod harness;
mod macros;
mod partition;
mod pool;
mod threads;
mod worker;

pub use config::{BenchConfig, IntegerWidth, DEFAULT_THREAD_COUNTS};
pub use driver::{parallel_sum, sequential_sum, Summer, Timed};
pub use error::{ConfigError, OverflowSite, SumError};
pub use partition::{split, ChunkPlan};
pub use pool::SumPool;
pub use threads::{available_parallelism, Dispatch, ThreadCount};
pub use worker::{sum_partition, wrapping_sum, OverflowPolicy, Overflowed, Summand};
