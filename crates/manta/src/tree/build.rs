use super::{EMPTY, LOCKED, MAX_DEPTH, QuadTree, Slot, child_center, quadrant};
use crate::error::{Error, Result};
use rayon::prelude::*;
use std::sync::atomic::Ordering;

/// Contended attempts an inserter may make before the build is abandoned.
const MAX_INSERT_RETRIES: u32 = 1 << 22;
const YIELD_EVERY: u32 = 64;

impl QuadTree {
    /// Inserts every point concurrently. Must follow [`QuadTree::reset`].
    pub fn build(&self, xs: &[f64], ys: &[f64]) -> Result<()> {
        (0..self.n)
            .into_par_iter()
            .try_for_each(|i| self.insert(i, xs, ys))
    }

    fn insert(&self, i: usize, xs: &[f64], ys: &[f64]) -> Result<()> {
        let (px, py) = (xs[i], ys[i]);
        let mut cell = self.root();
        let sq = self.square;
        let (mut cx, mut cy, mut r) = (sq.center_x, sq.center_y, sq.radius);
        let mut depth = 0;
        let mut retries = 0;
        self.next[i].store(EMPTY, Ordering::Relaxed);

        loop {
            let q = quadrant(px, py, cx, cy);
            let slot = self.slot(cell, q);
            match Slot::decode(slot.load(Ordering::Acquire), self.n) {
                Slot::Cell(next) => {
                    (cx, cy) = child_center(cx, cy, r, q);
                    r *= 0.5;
                    depth += 1;
                    cell = next;
                }
                Slot::Empty => {
                    if slot
                        .compare_exchange(EMPTY, i as i32, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return Ok(());
                    }
                    backoff(i, &mut retries)?;
                }
                Slot::Locked => backoff(i, &mut retries)?,
                Slot::Point(j) if depth == MAX_DEPTH || (xs[j] == px && ys[j] == py) => {
                    // Nothing to split on: push onto the leaf's stack of coincident points.
                    self.next[i].store(j as i32, Ordering::Relaxed);
                    if slot
                        .compare_exchange(j as i32, i as i32, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        self.stacked.store(true, Ordering::Relaxed);
                        return Ok(());
                    }
                    backoff(i, &mut retries)?;
                }
                Slot::Point(j) => {
                    if slot
                        .compare_exchange(j as i32, LOCKED, Ordering::Acquire, Ordering::Relaxed)
                        .is_err()
                    {
                        backoff(i, &mut retries)?;
                        continue;
                    }
                    // The slot is ours until we store into it again.
                    let (ccx, ccy) = child_center(cx, cy, r, q);
                    match self.split(i, j, xs, ys, (ccx, ccy, 0.5 * r), depth + 1) {
                        Ok(sub) => {
                            slot.store(sub as i32, Ordering::Release);
                            return Ok(());
                        }
                        Err(err) => {
                            slot.store(j as i32, Ordering::Release);
                            return Err(err);
                        }
                    }
                }
            }
        }
    }

    /// Builds the private chain of cells that separates points `i` and `j`, starting with a cell
    /// at `depth` covering `(cx, cy, r)`. Returns the top of the chain, ready to publish. If the
    /// chain reaches [`MAX_DEPTH`] first, both points share the last slot as a stacked leaf.
    fn split(
        &self,
        i: usize,
        j: usize,
        xs: &[f64],
        ys: &[f64],
        (mut cx, mut cy, mut r): (f64, f64, f64),
        mut depth: u32,
    ) -> Result<usize> {
        let top = self.claim_cell(depth)?;
        let mut cell = top;
        loop {
            let qi = quadrant(xs[i], ys[i], cx, cy);
            let qj = quadrant(xs[j], ys[j], cx, cy);
            if qi != qj {
                self.slot(cell, qj).store(j as i32, Ordering::Relaxed);
                self.slot(cell, qi).store(i as i32, Ordering::Relaxed);
                break;
            }
            if depth == MAX_DEPTH {
                self.next[i].store(j as i32, Ordering::Relaxed);
                self.slot(cell, qj).store(i as i32, Ordering::Relaxed);
                self.stacked.store(true, Ordering::Relaxed);
                break;
            }
            let next = self.claim_cell(depth + 1)?;
            self.slot(cell, qj).store(next as i32, Ordering::Relaxed);
            (cx, cy) = child_center(cx, cy, r, qj);
            r *= 0.5;
            depth += 1;
            cell = next;
        }
        self.max_depth.fetch_max(depth, Ordering::AcqRel);
        Ok(top)
    }

    fn claim_cell(&self, depth: u32) -> Result<usize> {
        debug_assert!(depth <= MAX_DEPTH);
        let prev = self
            .bottom
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |b| {
                (b > self.n).then(|| b - 1)
            })
            .map_err(|_| Error::NodeCapacityExceeded {
                capacity: self.capacity,
            })?;
        let cell = prev - 1;
        self.depth[self.record(cell)].store(depth, Ordering::Relaxed);
        Ok(cell)
    }
}

fn backoff(point: usize, retries: &mut u32) -> Result<()> {
    *retries += 1;
    if *retries > MAX_INSERT_RETRIES {
        return Err(Error::InsertionContention {
            point,
            retries: *retries,
        });
    }
    if *retries % YIELD_EVERY == 0 {
        std::thread::yield_now();
    } else {
        std::hint::spin_loop();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::tree::{MAX_DEPTH, QuadTree, Slot, bounding_square};

    fn built(xs: &[f64], ys: &[f64], capacity: usize) -> crate::error::Result<QuadTree> {
        let mut tree = QuadTree::new(xs.len(), capacity)?;
        let sq = bounding_square(xs, ys)?;
        tree.reset(sq);
        tree.build(xs, ys)?;
        Ok(tree)
    }

    fn leaf_points(tree: &QuadTree) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack = vec![tree.root()];
        while let Some(cell) = stack.pop() {
            for q in 0..4 {
                match tree.child(cell, q) {
                    Slot::Point(p) => out.extend(tree.leaf(p)),
                    Slot::Cell(c) => {
                        assert!(c < cell, "child {c} not below parent {cell}");
                        stack.push(c);
                    }
                    Slot::Empty => {}
                    Slot::Locked => panic!("locked slot after build"),
                }
            }
        }
        out.sort_unstable();
        out
    }

    #[test]
    fn corner_points_fill_root_quadrants() {
        let xs = [0.0, 1.0, 0.0, 1.0];
        let ys = [0.0, 0.0, 1.0, 1.0];
        let tree = built(&xs, &ys, 32).unwrap();
        assert_eq!(tree.cell_count(), 1);
        assert_eq!(tree.child(tree.root(), 0), Slot::Point(0));
        assert_eq!(tree.child(tree.root(), 1), Slot::Point(1));
        assert_eq!(tree.child(tree.root(), 2), Slot::Point(2));
        assert_eq!(tree.child(tree.root(), 3), Slot::Point(3));
    }

    #[test]
    fn close_pair_is_split_into_a_chain() {
        let xs = [0.0, 0.001, 10.0];
        let ys = [0.0, 0.001, 10.0];
        let tree = built(&xs, &ys, 64).unwrap();
        assert!(tree.max_depth() > 5);
        assert_eq!(leaf_points(&tree), vec![0, 1, 2]);
    }

    #[test]
    fn every_point_lands_in_exactly_one_leaf() {
        let n = 2000;
        let xs: Vec<f64> = (0..n).map(|i| ((i * 7919) % 1000) as f64 * 0.013).collect();
        let ys: Vec<f64> = (0..n).map(|i| ((i * 104_729) % 997) as f64 * 0.021).collect();
        let tree = built(&xs, &ys, 4 * n).unwrap();
        assert_eq!(leaf_points(&tree), (0..n).collect::<Vec<_>>());
        assert!(tree.cell_count() <= tree.capacity());
    }

    #[test]
    fn duplicates_share_a_leaf_without_new_cells() {
        let xs = [0.5, 0.5, 1.0, 0.5];
        let ys = [0.5, 0.5, 1.0, 0.5];
        let tree = built(&xs, &ys, 32).unwrap();
        assert_eq!(tree.cell_count(), 1);
        assert_eq!(leaf_points(&tree), vec![0, 1, 2, 3]);
    }

    #[test]
    fn near_coincident_points_stack_at_max_depth() {
        let xs = [0.0, 1e-300, 1.0];
        let ys = [0.0, 1e-300, 1.0];
        let tree = built(&xs, &ys, 1024).unwrap();
        assert_eq!(tree.max_depth(), MAX_DEPTH);
        assert_eq!(tree.cell_count(), MAX_DEPTH as usize + 1);
        assert_eq!(leaf_points(&tree), vec![0, 1, 2]);
    }

    #[test]
    fn fully_coincident_input_builds() {
        let n = 500;
        let xs = vec![-2.0; n];
        let ys = vec![3.0; n];
        let tree = built(&xs, &ys, 4 * n).unwrap();
        assert_eq!(leaf_points(&tree), (0..n).collect::<Vec<_>>());
    }

    #[test]
    fn running_out_of_cells_is_fatal() {
        let xs: Vec<f64> = (0..64).map(|i| i as f64).collect();
        let ys: Vec<f64> = (0..64).map(|i| (i * i) as f64).collect();
        let err = built(&xs, &ys, 2).unwrap_err();
        assert!(matches!(err, Error::NodeCapacityExceeded { capacity: 2 }), "{err:?}");
    }
}
