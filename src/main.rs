// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! CLI tool to benchmark parallel versus sequential summation of a random
//! array.

use chunksum::{harness, BenchConfig, Dispatch, IntegerWidth, OverflowPolicy, ThreadCount};
use clap::{Parser, ValueEnum};

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let config = BenchConfig {
        array_size: cli.array_size,
        min_value: cli.min_value,
        max_value: cli.max_value,
        thread_counts: cli.threads,
        dispatch: match cli.dispatch {
            DispatchCli::Spawn => Dispatch::Spawn,
            DispatchCli::Pool => Dispatch::Pool,
        },
        overflow: match cli.overflow {
            OverflowCli::Wrapping => OverflowPolicy::Wrapping,
            OverflowCli::Checked => OverflowPolicy::Checked,
        },
        width: match cli.width {
            WidthCli::I32 => IntegerWidth::I32,
            WidthCli::I64 => IntegerWidth::I64,
        },
        rounds: cli.rounds,
        seed: cli.seed,
    };

    if let Err(e) = harness::run(&config, &mut std::io::stdout().lock()) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

/// CLI tool to benchmark parallel versus sequential summation of a random
/// array.
#[derive(Parser, Debug, PartialEq, Eq)]
#[command(version)]
struct Cli {
    /// Number of items in the array.
    #[arg(long, default_value_t = 10_000_000)]
    array_size: usize,

    /// Smallest random value.
    #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
    min_value: i32,

    /// Largest random value.
    #[arg(long, default_value_t = 100, allow_negative_numbers = true)]
    max_value: i32,

    /// Comma-separated thread counts to benchmark, in order. "auto" stands for
    /// the available parallelism.
    #[arg(long, value_delimiter = ',', default_values = ["1", "4", "8", "10"])]
    threads: Vec<ThreadCount>,

    /// How worker threads are run.
    #[arg(long, value_enum, default_value_t = DispatchCli::Spawn)]
    dispatch: DispatchCli,

    /// Behavior on integer overflow.
    #[arg(long, value_enum, default_value_t = OverflowCli::Wrapping)]
    overflow: OverflowCli,

    /// Integer type of the array.
    #[arg(long, value_enum, default_value_t = WidthCli::I32)]
    width: WidthCli,

    /// Number of measurements for each thread count.
    #[arg(long, default_value_t = 1)]
    rounds: usize,

    /// Seed for the random array, for reproducible runs.
    #[arg(long)]
    seed: Option<u64>,
}

/// How worker threads are run.
#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
enum DispatchCli {
    /// Spawn fresh threads for every sum.
    Spawn,
    /// Spawn a pool once per thread count, and reuse it for every round.
    Pool,
}

/// Behavior on integer overflow.
#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
enum OverflowCli {
    /// Two's complement wraparound.
    Wrapping,
    /// Fail on overflow.
    Checked,
}

/// Integer type of the array.
#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
enum WidthCli {
    /// 32-bit signed integers.
    I32,
    /// 64-bit signed integers.
    I64,
}
