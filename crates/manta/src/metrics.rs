//! Embedding quality.

use crate::error::{Error, Result};
use rayon::prelude::*;

/// Trustworthiness of a 2-D embedding with respect to the input data.
///
/// `data` is row-major with `n_cols` features per point; `embedding` uses the engine's 2×N
/// layout. A score of 1 means every embedding neighborhood of size `n_neighbors` consists of
/// true input-space neighbors; intruders are penalized by how far down the input-space ranking
/// they sit.
pub fn trustworthiness(
    data: &[f64],
    n_cols: usize,
    embedding: &[f64],
    n_neighbors: usize,
) -> Result<f64> {
    if n_cols == 0 || data.len() % n_cols != 0 {
        return Err(Error::InvalidParameter {
            name: "n_cols",
            reason: format!("{} values do not split into rows of {n_cols}", data.len()),
        });
    }
    let n = data.len() / n_cols;
    if embedding.len() != 2 * n {
        return Err(Error::PositionBufferLength {
            expected: 2 * n,
            actual: embedding.len(),
        });
    }
    if n_neighbors == 0 || 2 * n_neighbors >= n {
        return Err(Error::NeighborhoodTooLarge { n, n_neighbors });
    }

    let row = |i: usize| &data[i * n_cols..(i + 1) * n_cols];
    let (xs, ys) = embedding.split_at(n);

    let penalty: u64 = (0..n)
        .into_par_iter()
        .map(|i| {
            let input_order = ranked(n, i, |j| sq_dist(row(i), row(j)));
            let mut rank = vec![0usize; n];
            for (r, &j) in input_order.iter().enumerate() {
                rank[j] = r + 1;
            }
            let embedded = ranked(n, i, |j| {
                let dx = xs[i] - xs[j];
                let dy = ys[i] - ys[j];
                dx * dx + dy * dy
            });
            embedded[..n_neighbors]
                .iter()
                .map(|&j| rank[j].saturating_sub(n_neighbors) as u64)
                .sum::<u64>()
        })
        .sum();

    let (n_f, k) = (n as f64, n_neighbors as f64);
    let scale = 2.0 / (n_f * k * (2.0 * n_f - 3.0 * k - 1.0));
    Ok(1.0 - scale * penalty as f64)
}

/// Every index except `i`, nearest first; ties broken by index.
fn ranked(n: usize, i: usize, dist: impl Fn(usize) -> f64) -> Vec<usize> {
    let mut keyed: Vec<(f64, usize)> = (0..n).filter(|&j| j != i).map(|j| (dist(j), j)).collect();
    keyed.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    keyed.into_iter().map(|(_, j)| j).collect()
}

fn sq_dist(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
