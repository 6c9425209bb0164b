// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Splitting of an input slice into contiguous partitions.

use std::num::NonZeroUsize;

/// A plan to split `len` items into contiguous chunks of `ceil(len / parts)`
/// items each.
///
/// The split is purely size-based: every partition but the last one has
/// exactly [`chunk_size()`](Self::chunk_size) items, and the last one holds
/// the remainder. Consequently the number of partitions may be lower than the
/// number requested.
///
/// ```rust
/// # use chunksum::ChunkPlan;
/// # use std::num::NonZeroUsize;
/// let plan = ChunkPlan::new(9, NonZeroUsize::try_from(4).unwrap());
/// assert_eq!(plan.chunk_size(), 3);
/// assert_eq!(plan.num_partitions(), 3);
/// assert_eq!(plan.ranges().collect::<Vec<_>>(), [0..3, 3..6, 6..9]);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkPlan {
    /// Total number of items.
    len: usize,
    /// Number of items in each partition except the last one.
    chunk_size: usize,
}

impl ChunkPlan {
    /// Plans the split of `len` items into (at most) `parts` partitions.
    pub fn new(len: usize, parts: NonZeroUsize) -> Self {
        Self {
            len,
            chunk_size: len.div_ceil(parts.get()),
        }
    }

    /// Total number of items covered by this plan.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether there are no items to split.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of items in every partition except the last one.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Actual number of partitions, which is at most the number of requested
    /// parts and zero for an empty input.
    pub fn num_partitions(&self) -> usize {
        if self.chunk_size == 0 {
            0
        } else {
            self.len.div_ceil(self.chunk_size)
        }
    }

    /// Returns the range of indices covered by the given partition.
    ///
    /// # Panics
    ///
    /// Panics if `index` isn't lower than [`num_partitions()`](Self::num_partitions).
    pub fn range(&self, index: usize) -> std::ops::Range<usize> {
        assert!(
            index < self.num_partitions(),
            "partition index {index} out of bounds ({} partitions)",
            self.num_partitions()
        );
        let start = index * self.chunk_size;
        let end = std::cmp::min(start + self.chunk_size, self.len);
        start..end
    }

    /// Returns an iterator over the ranges of all partitions, in order.
    pub fn ranges(&self) -> impl ExactSizeIterator<Item = std::ops::Range<usize>> + '_ {
        (0..self.num_partitions()).map(move |index| self.range(index))
    }

    /// Splits the given input according to this plan.
    ///
    /// # Panics
    ///
    /// Panics if the input length differs from the planned length.
    pub fn split<'a, T>(&self, input: &'a [T]) -> impl ExactSizeIterator<Item = &'a [T]> + 'a {
        assert_eq!(
            input.len(),
            self.len,
            "input length doesn't match the partition plan"
        );
        let plan = *self;
        (0..plan.num_partitions()).map(move |index| &input[plan.range(index)])
    }
}

/// Splits the input into at most `parts` contiguous partitions of
/// `ceil(input.len() / parts)` items (the last one may be shorter).
pub fn split<T>(input: &[T], parts: NonZeroUsize) -> Vec<&[T]> {
    ChunkPlan::new(input.len(), parts).split(input).collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha12Rng;

    fn parts(n: usize) -> NonZeroUsize {
        NonZeroUsize::try_from(n).unwrap()
    }

    #[test]
    fn test_split_concrete() {
        let input = [1, 2, 3, 4, 5, 6, 7];
        let partitions = split(&input, parts(3));
        assert_eq!(partitions, [&[1, 2, 3][..], &[4, 5, 6], &[7]]);
    }

    #[test]
    fn test_split_one_part() {
        let input = (0..100).collect::<Vec<i32>>();
        let partitions = split(&input, parts(1));
        assert_eq!(partitions, [input.as_slice()]);
    }

    #[test]
    fn test_split_more_parts_than_items() {
        let input = [10, 20, 30];
        for p in [3, 4, 7, 100] {
            let plan = ChunkPlan::new(input.len(), parts(p));
            assert_eq!(plan.chunk_size(), 1);
            assert_eq!(plan.num_partitions(), 3);
            assert_eq!(split(&input, parts(p)), [&[10][..], &[20], &[30]]);
        }
    }

    #[test]
    fn test_split_fewer_partitions_than_requested() {
        // ceil(9 / 4) = 3, so only 3 partitions are needed.
        let plan = ChunkPlan::new(9, parts(4));
        assert_eq!(plan.num_partitions(), 3);
        // ceil(10 / 4) = 3, last partition holds a single item.
        let plan = ChunkPlan::new(10, parts(4));
        assert_eq!(plan.ranges().collect::<Vec<_>>(), [0..3, 3..6, 6..9, 9..10]);
        // ceil(5 / 4) = 2, so 3 partitions.
        let plan = ChunkPlan::new(5, parts(4));
        assert_eq!(plan.ranges().collect::<Vec<_>>(), [0..2, 2..4, 4..5]);
    }

    #[test]
    fn test_split_empty() {
        let input: [i32; 0] = [];
        for p in [1, 4, 16] {
            let plan = ChunkPlan::new(0, parts(p));
            assert!(plan.is_empty());
            assert_eq!(plan.chunk_size(), 0);
            assert_eq!(plan.num_partitions(), 0);
            assert!(split(&input, parts(p)).is_empty());
        }
    }

    #[test]
    fn test_split_outlives_plan() {
        let input = [1, 2, 3, 4, 5, 6, 7];
        let mut partitions = {
            let plan = ChunkPlan::new(input.len(), parts(3));
            plan.split(&input)
        };
        assert_eq!(partitions.len(), 3);
        assert_eq!(partitions.next(), Some(&[1, 2, 3][..]));
        assert_eq!(partitions.collect::<Vec<_>>(), [&[4, 5, 6][..], &[7]]);
    }

    #[test]
    #[should_panic(expected = "partition index 3 out of bounds (3 partitions)")]
    fn test_range_out_of_bounds() {
        ChunkPlan::new(9, parts(4)).range(3);
    }

    #[test]
    #[should_panic(expected = "input length doesn't match the partition plan")]
    fn test_split_wrong_length() {
        let plan = ChunkPlan::new(5, parts(2));
        let _ = plan.split(&[1, 2, 3]);
    }

    #[test]
    fn test_split_random_round_trip() {
        let mut rng = ChaCha12Rng::seed_from_u64(42);
        for _ in 0..500 {
            let len = rng.random_range(0..300);
            let p = rng.random_range(1..40);
            let input = (0..len).map(|_| rng.random::<i32>()).collect::<Vec<_>>();

            let plan = ChunkPlan::new(len, parts(p));
            let partitions = plan.split(&input).collect::<Vec<_>>();

            assert_eq!(partitions.concat(), input);
            assert!(partitions.len() <= p);
            assert!(partitions.len() <= len);
            assert_eq!(partitions.len(), plan.num_partitions());
            if let Some((last, rest)) = partitions.split_last() {
                assert!(!last.is_empty());
                assert!(last.len() <= len.div_ceil(p));
                for partition in rest {
                    assert_eq!(partition.len(), len.div_ceil(p));
                }
            }
        }
    }
}
