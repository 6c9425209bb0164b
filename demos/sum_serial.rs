// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Simple program that computes the sum of a slice on the calling thread.

use std::hint::black_box;

fn main() {
    let input_size = 10_000_000;

    let input = (0..input_size).collect::<Vec<i64>>();
    let sum = chunksum::sequential_sum(black_box(&input));
    println!("sum = {} ({:.6} s)", sum.value, sum.elapsed_secs());
}
