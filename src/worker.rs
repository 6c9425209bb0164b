// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Summation of a single partition.

use std::fmt::{Debug, Display};

/// Behavior of the accumulation when the sum doesn't fit in the integer type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Two's complement wraparound. Parallel and sequential sums always agree
    /// under this policy.
    #[default]
    Wrapping,
    /// Stops at the first overflow and reports it.
    Checked,
}

/// Marker error returned when an addition overflowed under
/// [`OverflowPolicy::Checked`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Overflowed;

/// Fixed-width signed integer that can be summed.
pub trait Summand: Copy + Send + Sync + Debug + Display + Into<i64> + 'static {
    /// Name of the type, for reporting.
    const NAME: &'static str;

    /// The additive identity.
    const ZERO: Self;

    /// Converts a generated value into this type.
    fn from_i32(value: i32) -> Self;

    /// Adds two values with two's complement wraparound.
    fn add_wrapping(self, other: Self) -> Self;

    /// Adds two values, returning [`None`] on overflow.
    fn add_checked(self, other: Self) -> Option<Self>;

    /// Adds two values according to the given overflow policy.
    #[inline(always)]
    fn combine(self, other: Self, overflow: OverflowPolicy) -> Result<Self, Overflowed> {
        match overflow {
            OverflowPolicy::Wrapping => Ok(self.add_wrapping(other)),
            OverflowPolicy::Checked => self.add_checked(other).ok_or(Overflowed),
        }
    }
}

macro_rules! impl_summand {
    ( $($ty:ident),* ) => {
        $(
            impl Summand for $ty {
                const NAME: &'static str = stringify!($ty);
                const ZERO: Self = 0;

                fn from_i32(value: i32) -> Self {
                    value.into()
                }

                #[inline(always)]
                fn add_wrapping(self, other: Self) -> Self {
                    self.wrapping_add(other)
                }

                #[inline(always)]
                fn add_checked(self, other: Self) -> Option<Self> {
                    self.checked_add(other)
                }
            }
        )*
    };
}

impl_summand!(i32, i64);

/// Sums the items of a partition with a linear accumulation. An empty
/// partition sums to zero.
pub fn sum_partition<T: Summand>(
    partition: &[T],
    overflow: OverflowPolicy,
) -> Result<T, Overflowed> {
    match overflow {
        OverflowPolicy::Wrapping => Ok(wrapping_sum(partition)),
        OverflowPolicy::Checked => partition
            .iter()
            .try_fold(T::ZERO, |acc, &x| acc.combine(x, OverflowPolicy::Checked)),
    }
}

/// Sums the items with two's complement wraparound.
pub fn wrapping_sum<T: Summand>(items: &[T]) -> T {
    // Branch-free loop, so that it vectorizes.
    items.iter().fold(T::ZERO, |acc, &x| acc.add_wrapping(x))
}

/// Reduces partial sums with a linear pass.
pub(crate) fn reduce<T: Summand>(
    partials: impl IntoIterator<Item = T>,
    overflow: OverflowPolicy,
) -> Result<T, Overflowed> {
    partials
        .into_iter()
        .try_fold(T::ZERO, |acc, x| acc.combine(x, overflow))
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha12Rng;

    #[test]
    fn test_sum_empty() {
        assert_eq!(sum_partition::<i32>(&[], OverflowPolicy::Wrapping), Ok(0));
        assert_eq!(sum_partition::<i64>(&[], OverflowPolicy::Checked), Ok(0));
    }

    #[test]
    fn test_sum_small() {
        let input = [1, 2, 3, 4, 5, 6, 7];
        assert_eq!(sum_partition::<i32>(&input, OverflowPolicy::Wrapping), Ok(28));
        assert_eq!(sum_partition::<i32>(&input, OverflowPolicy::Checked), Ok(28));
    }

    #[test]
    fn test_sum_wraps() {
        let input = [i32::MAX, 1];
        assert_eq!(
            sum_partition(&input, OverflowPolicy::Wrapping),
            Ok(i32::MIN)
        );
        assert_eq!(sum_partition(&input, OverflowPolicy::Checked), Err(Overflowed));
    }

    #[test]
    fn test_sum_checked_transient_overflow() {
        // The final sum fits, but an intermediate one doesn't.
        let input = [i32::MAX, 1, -1];
        assert_eq!(sum_partition(&input, OverflowPolicy::Wrapping), Ok(i32::MAX));
        assert_eq!(sum_partition(&input, OverflowPolicy::Checked), Err(Overflowed));
    }

    #[test]
    fn test_sum_i64_doesnt_wrap_on_i32_range() {
        let input = [i64::from(i32::MAX), 1];
        assert_eq!(
            sum_partition(&input, OverflowPolicy::Checked),
            Ok(i64::from(i32::MAX) + 1)
        );
    }

    #[test]
    fn test_sum_matches_reference() {
        let mut rng = ChaCha12Rng::seed_from_u64(42);
        for _ in 0..200 {
            let len = rng.random_range(0..1000);
            let input = (0..len).map(|_| rng.random::<i32>()).collect::<Vec<_>>();
            let reference = input.iter().map(|&x| i128::from(x)).sum::<i128>();
            assert_eq!(
                sum_partition(&input, OverflowPolicy::Wrapping),
                Ok(reference as i32)
            );
        }
    }

    #[test]
    fn test_reduce() {
        assert_eq!(reduce::<i32>([6, 15, 7], OverflowPolicy::Checked), Ok(28));
        assert_eq!(reduce::<i64>([], OverflowPolicy::Checked), Ok(0));
        assert_eq!(
            reduce([i64::MAX, 1], OverflowPolicy::Wrapping),
            Ok(i64::MIN)
        );
        assert_eq!(reduce([i64::MAX, 1], OverflowPolicy::Checked), Err(Overflowed));
    }

    #[test]
    fn test_names() {
        assert_eq!(<i32 as Summand>::NAME, "i32");
        assert_eq!(<i64 as Summand>::NAME, "i64");
    }
}
