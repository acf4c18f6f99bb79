use crate::alloc;
use crate::error::{Error, Result};
use crate::reduce;
use crate::tree::{BoundingSquare, LEVELS, QuadTree, Slot};
use rayon::prelude::*;

/// Barnes-Hut repulsion with scratch buffers reserved once per run.
#[derive(Debug)]
pub struct Repulsion {
    /// `[fx, fy, z]` per traversal-order position.
    per_order: Vec<[f64; 3]>,
    /// Per-point contribution to Z, indexed by point id so the total does not depend on the
    /// traversal order.
    z_terms: Vec<f64>,
}

impl Repulsion {
    pub fn new(n: usize) -> Result<Self> {
        Ok(Self {
            per_order: alloc::filled(n, [0.0; 3], "repulsion scratch")?,
            z_terms: alloc::filled(n, 0.0, "normalization terms")?,
        })
    }

    /// Writes the unnormalized repulsive force of every point into `out` (2×N layout) and
    /// returns the normalization constant `Z = Σ q_ij - N`.
    ///
    /// Each point walks the tree from the root. A cell whose width over distance falls below
    /// `theta` is treated as a single point of its mass at its center of mass; anything else is
    /// opened. `theta = 0` opens every cell.
    pub fn compute(
        &mut self,
        tree: &QuadTree,
        positions: &[f64],
        theta: f64,
        epssq: f64,
        out: &mut [f64],
    ) -> Result<f64> {
        let n = tree.len();
        let (xs, ys) = positions.split_at(n);
        let kernel = Kernel::new(tree.square(), theta, epssq);

        self.per_order
            .par_iter_mut()
            .enumerate()
            .try_for_each_init(
                || Vec::with_capacity(4 * LEVELS),
                |stack, (k, acc)| {
                    *acc = kernel.repel(tree, tree.order_at(k), xs, ys, stack)?;
                    Ok::<(), Error>(())
                },
            )?;

        let (fx, fy) = out.split_at_mut(n);
        for (k, acc) in self.per_order.iter().enumerate() {
            let i = tree.order_at(k);
            fx[i] = acc[0];
            fy[i] = acc[1];
            self.z_terms[i] = acc[2];
        }
        Ok(reduce::sum(&self.z_terms) - n as f64)
    }
}

struct Kernel {
    theta_sq: f64,
    epssq: f64,
    /// Squared cell width per depth.
    width_sq: [f64; LEVELS + 1],
}

impl Kernel {
    fn new(square: BoundingSquare, theta: f64, epssq: f64) -> Self {
        let mut width_sq = [0.0; LEVELS + 1];
        let mut w = square.width();
        for v in &mut width_sq {
            *v = w * w;
            w *= 0.5;
        }
        Self {
            theta_sq: theta * theta,
            epssq,
            width_sq,
        }
    }

    #[inline]
    fn accumulate(&self, acc: &mut [f64; 3], dx: f64, dy: f64, mass: f64) {
        let q = 1.0 / (1.0 + dx * dx + dy * dy + self.epssq);
        let mq = mass * q;
        acc[0] += mq * q * dx;
        acc[1] += mq * q * dy;
        acc[2] += mq;
    }

    fn repel(
        &self,
        tree: &QuadTree,
        i: usize,
        xs: &[f64],
        ys: &[f64],
        stack: &mut Vec<(usize, usize)>,
    ) -> Result<[f64; 3]> {
        let (px, py) = (xs[i], ys[i]);
        let mut acc = [0.0; 3];
        stack.clear();
        stack.push((tree.root(), 0));

        while let Some((cell, depth)) = stack.pop() {
            for q in 0..4 {
                match tree.child(cell, q) {
                    Slot::Empty => {}
                    Slot::Point(head) => {
                        for j in tree.leaf(head) {
                            self.accumulate(&mut acc, px - xs[j], py - ys[j], 1.0);
                        }
                    }
                    Slot::Cell(c) => {
                        let mass = tree.mass(c).ok_or_else(|| Error::CorruptTree {
                            reason: format!("cell {c} has no summary during repulsion"),
                        })?;
                        let (cx, cy) = tree.center_of_mass(c);
                        let (dx, dy) = (px - cx, py - cy);
                        if self.width_sq[depth + 1] < self.theta_sq * (dx * dx + dy * dy) {
                            self.accumulate(&mut acc, dx, dy, f64::from(mass));
                        } else {
                            stack.push((c, depth + 1));
                        }
                    }
                    Slot::Locked => {
                        return Err(Error::CorruptTree {
                            reason: format!("cell {cell} has a locked slot during repulsion"),
                        });
                    }
                }
            }
        }
        Ok(acc)
    }
}

/// Exact O(N²) repulsion with the same kernel, self-interaction and `-N` correction as the tree
/// walk. Returns the 2×N forces and Z.
pub fn brute_force_repulsion(positions: &[f64], epssq: f64) -> (Vec<f64>, f64) {
    let n = positions.len() / 2;
    let (xs, ys) = positions.split_at(n);
    let kernel = Kernel {
        theta_sq: 0.0,
        epssq,
        width_sq: [0.0; LEVELS + 1],
    };
    let per_point: Vec<[f64; 3]> = (0..n)
        .into_par_iter()
        .map(|i| {
            let mut acc = [0.0; 3];
            for j in 0..n {
                kernel.accumulate(&mut acc, xs[i] - xs[j], ys[i] - ys[j], 1.0);
            }
            acc
        })
        .collect();

    let mut forces = vec![0.0; 2 * n];
    for (i, acc) in per_point.iter().enumerate() {
        forces[i] = acc[0];
        forces[n + i] = acc[1];
    }
    let z = per_point.iter().map(|acc| acc[2]).sum::<f64>() - n as f64;
    (forces, z)
}

#[cfg(test)]
mod tests {
    use super::{Repulsion, brute_force_repulsion};
    use crate::tree::QuadTree;

    fn spiral(n: usize) -> Vec<f64> {
        let mut p = vec![0.0; 2 * n];
        for i in 0..n {
            let t = i as f64 * 0.31;
            p[i] = t.cos() * (1.0 + 0.05 * t);
            p[n + i] = t.sin() * (1.0 + 0.05 * t);
        }
        p
    }

    fn tree_repulsion(positions: &[f64], theta: f64) -> (Vec<f64>, f64) {
        let n = positions.len() / 2;
        let mut tree = QuadTree::new(n, 8 * n).unwrap();
        tree.rebuild(&positions[..n], &positions[n..]).unwrap();
        let mut rep = Repulsion::new(n).unwrap();
        let mut out = vec![0.0; 2 * n];
        let z = rep.compute(&tree, positions, theta, 0.0025, &mut out).unwrap();
        (out, z)
    }

    #[test]
    fn zero_theta_matches_brute_force() {
        let positions = spiral(200);
        let (approx, z) = tree_repulsion(&positions, 0.0);
        let (exact, z_exact) = brute_force_repulsion(&positions, 0.0025);
        assert!((z - z_exact).abs() <= 1e-9 * z_exact.abs(), "{z} vs {z_exact}");
        for (a, e) in approx.iter().zip(&exact) {
            assert!((a - e).abs() < 1e-9, "{a} vs {e}");
        }
    }

    #[test]
    fn approximation_stays_close_for_typical_theta() {
        let positions = spiral(400);
        let (approx, z) = tree_repulsion(&positions, 0.5);
        let (exact, z_exact) = brute_force_repulsion(&positions, 0.0025);
        assert!((z - z_exact).abs() / z_exact < 0.02, "{z} vs {z_exact}");

        let err: f64 = approx.iter().zip(&exact).map(|(a, e)| (a - e).powi(2)).sum();
        let norm: f64 = exact.iter().map(|e| e * e).sum();
        assert!((err / norm).sqrt() < 0.05, "relative error {}", (err / norm).sqrt());
    }

    #[test]
    fn duplicated_points_match_brute_force() {
        let mut positions = spiral(60);
        // Points 40..60 repeat points 0..20.
        for i in 40..60 {
            positions[i] = positions[i - 40];
            positions[60 + i] = positions[60 + i - 40];
        }
        let (approx, z) = tree_repulsion(&positions, 0.0);
        let (exact, z_exact) = brute_force_repulsion(&positions, 0.0025);
        assert!((z - z_exact).abs() <= 1e-9 * z_exact.abs(), "{z} vs {z_exact}");
        for (a, e) in approx.iter().zip(&exact) {
            assert!((a - e).abs() < 1e-9, "{a} vs {e}");
        }
    }

    #[test]
    fn larger_theta_visits_fewer_cells_but_keeps_z_positive() {
        let positions = spiral(300);
        let (_, z) = tree_repulsion(&positions, 1.5);
        assert!(z > 0.0);
    }
}
