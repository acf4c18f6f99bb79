//! Per-point optimizer state.
//!
//! All arrays use the same 2×N layout as the caller's position buffer: the first N entries are
//! the x axis, the next N the y axis.

use crate::alloc;
use crate::error::Result;

#[derive(Debug)]
pub struct Embedding {
    n: usize,
    pub(crate) positions: Vec<f64>,
    pub(crate) attraction: Vec<f64>,
    pub(crate) repulsion: Vec<f64>,
    /// Previous update step.
    pub(crate) velocity: Vec<f64>,
    pub(crate) gains: Vec<f64>,
}

impl Embedding {
    pub(crate) fn allocate(n: usize) -> Result<Self> {
        Ok(Self {
            n,
            positions: alloc::filled(2 * n, 0.0, "positions")?,
            attraction: alloc::filled(2 * n, 0.0, "attractive forces")?,
            repulsion: alloc::filled(2 * n, 0.0, "repulsive forces")?,
            velocity: alloc::filled(2 * n, 0.0, "velocities")?,
            gains: alloc::filled(2 * n, 1.0, "gains")?,
        })
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn positions(&self) -> &[f64] {
        &self.positions
    }

    pub fn xs(&self) -> &[f64] {
        &self.positions[..self.n]
    }

    pub fn ys(&self) -> &[f64] {
        &self.positions[self.n..]
    }

    pub fn point(&self, i: usize) -> (f64, f64) {
        (self.positions[i], self.positions[self.n + i])
    }

    pub fn attraction(&self) -> &[f64] {
        &self.attraction
    }

    /// Unnormalized repulsive forces from the last step (divide by Z for the gradient term).
    pub fn repulsion(&self) -> &[f64] {
        &self.repulsion
    }

    pub fn velocity(&self) -> &[f64] {
        &self.velocity
    }

    pub fn gains(&self) -> &[f64] {
        &self.gains
    }

    /// Mean position `(x̄, ȳ)`.
    pub fn mean(&self) -> (f64, f64) {
        let inv = 1.0 / self.n as f64;
        (
            crate::reduce::sum(self.xs()) * inv,
            crate::reduce::sum(self.ys()) * inv,
        )
    }
}
