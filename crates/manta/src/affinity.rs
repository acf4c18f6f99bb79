//! Sparse high-dimensional affinity graph (COO triplets plus a row index).

use crate::alloc;
use crate::error::{Error, Result};
use rayon::prelude::*;

/// Affinity edges `(row, col, weight)` over `n` points.
///
/// The triplets are kept in the order they were supplied. A row index built once at
/// construction lets the attraction phase walk each point's edges without atomics.
#[derive(Debug, Clone)]
pub struct AffinityGraph {
    n: usize,
    vals: Vec<f64>,
    cols: Vec<u32>,
    rows: Vec<u32>,
    /// `row_edges[row_start[i]..row_start[i + 1]]` are the edge ids whose row is `i`.
    row_start: Vec<usize>,
    row_edges: Vec<u32>,
}

impl AffinityGraph {
    /// Builds a graph from three parallel arrays holding `nnz` entries each.
    pub fn from_coo(
        n: usize,
        vals: Vec<f64>,
        cols: Vec<u32>,
        rows: Vec<u32>,
        nnz: usize,
    ) -> Result<Self> {
        if vals.len() != nnz || cols.len() != nnz || rows.len() != nnz {
            return Err(Error::InvalidGraph {
                reason: format!(
                    "nnz = {nnz} but vals/cols/rows have {}/{}/{} entries",
                    vals.len(),
                    cols.len(),
                    rows.len()
                ),
            });
        }
        if nnz > u32::MAX as usize {
            return Err(Error::InvalidGraph {
                reason: format!("{nnz} edges exceed the 32-bit edge index"),
            });
        }
        for (e, ((&r, &c), &w)) in rows.iter().zip(&cols).zip(&vals).enumerate() {
            if r as usize >= n || c as usize >= n {
                return Err(Error::InvalidGraph {
                    reason: format!("edge {e} ({r}, {c}) is out of bounds for {n} points"),
                });
            }
            if !(w.is_finite() && w >= 0.0) {
                return Err(Error::InvalidGraph {
                    reason: format!("edge {e} has weight {w}; weights must be finite and >= 0"),
                });
            }
        }

        // Stable counting sort of edge ids by row.
        let mut row_start = alloc::filled(n + 1, 0usize, "affinity row index")?;
        for &r in &rows {
            row_start[r as usize + 1] += 1;
        }
        for i in 0..n {
            row_start[i + 1] += row_start[i];
        }
        let mut cursor = row_start.clone();
        let mut row_edges = alloc::filled(nnz, 0u32, "affinity row index")?;
        for (e, &r) in rows.iter().enumerate() {
            let slot = &mut cursor[r as usize];
            row_edges[*slot] = e as u32;
            *slot += 1;
        }

        Ok(Self {
            n,
            vals,
            cols,
            rows,
            row_start,
            row_edges,
        })
    }

    /// Symmetrizes directed affinities into `(P + Pᵀ) / 2`, normalized so the weights sum to 1.
    ///
    /// Duplicate `(row, col)` entries are merged by summing. Self loops are dropped.
    pub fn symmetrize(n: usize, triplets: &[(u32, u32, f64)]) -> Result<Self> {
        let mut merged: std::collections::BTreeMap<(u32, u32), f64> =
            std::collections::BTreeMap::new();
        for &(r, c, w) in triplets {
            if r == c {
                continue;
            }
            *merged.entry((r, c)).or_insert(0.0) += w;
            *merged.entry((c, r)).or_insert(0.0) += w;
        }
        let total: f64 = merged.values().sum();
        let scale = if total > 0.0 { 1.0 / total } else { 0.0 };

        let nnz = merged.len();
        let mut rows = Vec::with_capacity(nnz);
        let mut cols = Vec::with_capacity(nnz);
        let mut vals = Vec::with_capacity(nnz);
        for ((r, c), w) in merged {
            rows.push(r);
            cols.push(c);
            vals.push(w * scale);
        }
        Self::from_coo(n, vals, cols, rows, nnz)
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn nnz(&self) -> usize {
        self.vals.len()
    }

    pub fn vals(&self) -> &[f64] {
        &self.vals
    }

    pub fn cols(&self) -> &[u32] {
        &self.cols
    }

    pub fn rows(&self) -> &[u32] {
        &self.rows
    }

    /// `(col, weight)` pairs of every edge whose row is `i`, in supply order.
    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.row_edges[self.row_start[i]..self.row_start[i + 1]]
            .iter()
            .map(move |&e| (self.cols[e as usize] as usize, self.vals[e as usize]))
    }

    /// Multiplies every weight by `factor`.
    pub fn scale(&mut self, factor: f64) {
        self.vals.par_iter_mut().for_each(|w| *w *= factor);
    }

    pub fn weight_sum(&self) -> f64 {
        crate::reduce::sum(&self.vals)
    }

    /// Returns `(vals, cols, rows)`.
    pub fn into_parts(self) -> (Vec<f64>, Vec<u32>, Vec<u32>) {
        (self.vals, self.cols, self.rows)
    }
}
