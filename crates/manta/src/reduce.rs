//! Order-stable parallel reductions.
//!
//! Rayon's `sum` splits work adaptively, so floating-point totals can change between runs.
//! These helpers sum fixed-size chunks in parallel and combine the partials in chunk order,
//! which keeps every run bit-identical for the same input.

use rayon::prelude::*;

const CHUNK: usize = 4096;

/// Sum of `f(x)` over `values`.
pub(crate) fn sum_by<T, F>(values: &[T], f: F) -> f64
where
    T: Sync,
    F: Fn(&T) -> f64 + Sync,
{
    let partials: Vec<f64> = values
        .par_chunks(CHUNK)
        .map(|chunk| chunk.iter().map(&f).sum::<f64>())
        .collect();
    partials.iter().sum()
}

/// Sum of `f(i)` for `i` in `0..len`.
pub(crate) fn sum_indexed<F>(len: usize, f: F) -> f64
where
    F: Fn(usize) -> f64 + Sync,
{
    let partials: Vec<f64> = (0..len.div_ceil(CHUNK))
        .into_par_iter()
        .map(|c| (c * CHUNK..((c + 1) * CHUNK).min(len)).map(&f).sum::<f64>())
        .collect();
    partials.iter().sum()
}

pub(crate) fn sum(values: &[f64]) -> f64 {
    sum_by(values, |v| *v)
}

/// Minimum and maximum of `values`, or `None` if the slice is empty or holds a non-finite value.
pub(crate) fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    let (lo, hi, finite) = values
        .par_iter()
        .fold(
            || (f64::INFINITY, f64::NEG_INFINITY, true),
            |(lo, hi, ok), &v| (lo.min(v), hi.max(v), ok && v.is_finite()),
        )
        .reduce(
            || (f64::INFINITY, f64::NEG_INFINITY, true),
            |(a, b, x), (c, d, y)| (a.min(c), b.max(d), x && y),
        );
    (finite && lo <= hi).then_some((lo, hi))
}

#[cfg(test)]
mod tests {
    use super::{min_max, sum, sum_by, sum_indexed};

    #[test]
    fn chunked_sum_matches_sequential_order() {
        let values: Vec<f64> = (0..10_000).map(|i| (i as f64).sin()).collect();
        let a = sum(&values);
        let b = sum(&values);
        assert_eq!(a.to_bits(), b.to_bits());
        let seq: f64 = values.iter().sum();
        assert!((a - seq).abs() < 1e-9);
    }

    #[test]
    fn sum_by_applies_map() {
        let values = [1.0, 2.0, 3.0];
        assert_eq!(sum_by(&values, |v| v * v), 14.0);
    }

    #[test]
    fn indexed_sum_covers_partial_last_chunk() {
        let total = sum_indexed(10_001, |i| i as f64);
        assert_eq!(total, 10_000.0 * 10_001.0 / 2.0);
        assert_eq!(sum_indexed(0, |_| 1.0), 0.0);
    }

    #[test]
    fn min_max_of_empty_is_none() {
        assert_eq!(min_max(&[]), None);
        assert_eq!(min_max(&[3.0, -1.0, 2.0]), Some((-1.0, 3.0)));
        assert_eq!(min_max(&[0.0, f64::NAN]), None);
    }
}
