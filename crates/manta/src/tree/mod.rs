//! Pointer-free quadtree rebuilt from scratch every iteration.
//!
//! Points and internal cells share one integer index space: ids `0..n` are points, ids
//! `n..n + capacity` are cells, and the root is the highest id. Each cell owns four child slots
//! holding a raw `i32` (see [`Slot`]), so the whole structure is a handful of flat arrays that can
//! be reset in place instead of reallocated.
//!
//! Cells are handed out downward from the root, so a child always has a lower id than its
//! parent. A rebuild runs in four bulk-parallel phases:
//!
//! 1. [`bounding_square`] + [`QuadTree::reset`]
//! 2. [`QuadTree::build`]: lock-free insertion
//! 3. [`QuadTree::summarize`]: mass and center of mass, deepest level first
//! 4. [`QuadTree::sort`]: depth-first point order

use crate::alloc;
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, AtomicUsize, Ordering};

mod bounds;
mod build;
mod order;
mod summarize;

pub use bounds::{BoundingSquare, bounding_square};

/// Deepest cell level the builder will create. Points that still share a quadrant at this depth
/// are coincident for all practical purposes and are stacked into one leaf (see
/// [`QuadTree::leaf`]), as are points at identical coordinates at any depth.
pub const MAX_DEPTH: u32 = 50;

/// Number of distinct cell levels, root included.
pub(crate) const LEVELS: usize = MAX_DEPTH as usize + 1;

const EMPTY: i32 = -1;
const LOCKED: i32 = -2;
/// Mass of a cell whose summary has not been published yet.
const UNSUMMARIZED: i32 = -1;

/// Decoded contents of a child slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Empty,
    /// Claimed by an inserter that is installing a new cell in its place.
    Locked,
    Point(usize),
    Cell(usize),
}

impl Slot {
    fn decode(raw: i32, n: usize) -> Self {
        match raw {
            EMPTY => Slot::Empty,
            v if v < 0 => Slot::Locked,
            v if (v as usize) < n => Slot::Point(v as usize),
            v => Slot::Cell(v as usize),
        }
    }
}

#[derive(Debug)]
pub struct QuadTree {
    n: usize,
    capacity: usize,
    children: Vec<AtomicI32>,
    mass: Vec<AtomicI32>,
    com_x: Vec<AtomicU64>,
    com_y: Vec<AtomicU64>,
    depth: Vec<AtomicU32>,
    /// Per-point link to the next point stacked in the same leaf.
    next: Vec<AtomicI32>,
    /// Set once the current build stacks any leaf.
    stacked: AtomicBool,
    /// Lowest cell id handed out so far.
    bottom: AtomicUsize,
    max_depth: AtomicU32,
    square: BoundingSquare,
    /// Cell ids grouped by depth; `level_cells[level_start[d]..level_start[d + 1]]`.
    level_start: Vec<usize>,
    level_cells: Vec<u32>,
    /// First traversal-order slot of each cell's points.
    start: Vec<AtomicUsize>,
    order: Vec<AtomicU32>,
}

impl QuadTree {
    /// Reserves a tree for `n` points with room for `capacity` internal cells.
    pub fn new(n: usize, capacity: usize) -> Result<Self> {
        let required = n.saturating_add(capacity);
        if capacity == 0 || required > i32::MAX as usize {
            return Err(Error::IndexSpaceExceeded { required });
        }
        let slots = capacity
            .checked_mul(4)
            .ok_or(Error::IndexSpaceExceeded { required })?;

        let tree = Self {
            n,
            capacity,
            children: alloc::filled_with(slots, "quadtree child slots", || AtomicI32::new(EMPTY))?,
            mass: alloc::filled_with(capacity, "quadtree masses", || {
                AtomicI32::new(UNSUMMARIZED)
            })?,
            com_x: alloc::filled_with(capacity, "quadtree centers of mass", || AtomicU64::new(0))?,
            com_y: alloc::filled_with(capacity, "quadtree centers of mass", || AtomicU64::new(0))?,
            depth: alloc::filled_with(capacity, "quadtree depths", || AtomicU32::new(0))?,
            next: alloc::filled_with(n, "coincident point links", || AtomicI32::new(EMPTY))?,
            stacked: AtomicBool::new(false),
            bottom: AtomicUsize::new(n + capacity - 1),
            max_depth: AtomicU32::new(0),
            square: BoundingSquare::default(),
            level_start: alloc::filled(LEVELS + 1, 0, "quadtree level index")?,
            level_cells: alloc::filled(capacity, 0, "quadtree level index")?,
            start: alloc::filled_with(capacity, "traversal offsets", || AtomicUsize::new(0))?,
            order: alloc::filled_with(n, "traversal order", || AtomicU32::new(0))?,
        };
        Ok(tree)
    }

    /// Runs every construction phase for the given positions.
    pub fn rebuild(&mut self, xs: &[f64], ys: &[f64]) -> Result<()> {
        let square = bounding_square(xs, ys)?;
        self.reset(square);
        self.build(xs, ys)?;
        self.summarize(xs, ys)?;
        self.sort()
    }

    /// Clears the cells used by the previous build and re-roots the tree at `square`.
    pub fn reset(&mut self, square: BoundingSquare) {
        use rayon::prelude::*;

        let bottom = *self.bottom.get_mut();
        let first = self.record(bottom);
        self.children[first * 4..]
            .par_iter_mut()
            .for_each(|slot| *slot.get_mut() = EMPTY);
        self.mass[first..]
            .par_iter_mut()
            .for_each(|m| *m.get_mut() = UNSUMMARIZED);

        let root = self.root();
        let r = self.record(root);
        *self.depth[r].get_mut() = 0;
        *self.bottom.get_mut() = root;
        *self.max_depth.get_mut() = 0;
        *self.stacked.get_mut() = false;
        self.square = square;
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Number of internal cells the arena can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn root(&self) -> usize {
        self.n + self.capacity - 1
    }

    /// Cells in use by the current build, root included.
    pub fn cell_count(&self) -> usize {
        self.root() + 1 - self.bottom.load(Ordering::Acquire)
    }

    /// Ids of the cells in use, lowest (deepest-created) first.
    pub fn cells(&self) -> std::ops::RangeInclusive<usize> {
        self.bottom.load(Ordering::Acquire)..=self.root()
    }

    /// Deepest cell level reached by the current build (the root is level 0).
    pub fn max_depth(&self) -> u32 {
        self.max_depth.load(Ordering::Acquire)
    }

    pub fn square(&self) -> BoundingSquare {
        self.square
    }

    pub fn child(&self, cell: usize, quadrant: usize) -> Slot {
        Slot::decode(self.slot(cell, quadrant).load(Ordering::Acquire), self.n)
    }

    /// Number of points below `cell`, or `None` while the summary is unpublished.
    pub fn mass(&self, cell: usize) -> Option<u32> {
        let m = self.mass[self.record(cell)].load(Ordering::Acquire);
        u32::try_from(m).ok()
    }

    pub fn center_of_mass(&self, cell: usize) -> (f64, f64) {
        let r = self.record(cell);
        (
            f64::from_bits(self.com_x[r].load(Ordering::Relaxed)),
            f64::from_bits(self.com_y[r].load(Ordering::Relaxed)),
        )
    }

    pub fn depth(&self, cell: usize) -> u32 {
        self.depth[self.record(cell)].load(Ordering::Relaxed)
    }

    /// Points stored in the leaf whose slot holds `head`, head first.
    ///
    /// A leaf holds more than one point only for duplicated coordinates or for points that could
    /// not be separated by [`MAX_DEPTH`].
    pub fn leaf(&self, head: usize) -> Leaf<'_> {
        Leaf {
            next: &self.next,
            at: Some(head),
        }
    }

    /// Point at position `k` of the depth-first order.
    pub fn order_at(&self, k: usize) -> usize {
        self.order[k].load(Ordering::Relaxed) as usize
    }

    pub fn traversal_order(&self) -> Vec<usize> {
        (0..self.n).map(|k| self.order_at(k)).collect()
    }

    fn record(&self, cell: usize) -> usize {
        cell - self.n
    }

    fn slot(&self, cell: usize, quadrant: usize) -> &AtomicI32 {
        &self.children[self.record(cell) * 4 + quadrant]
    }

    /// Cell ids at depth `d`; valid after [`QuadTree::summarize`] has bucketed the levels.
    fn level(&self, d: usize) -> &[u32] {
        &self.level_cells[self.level_start[d]..self.level_start[d + 1]]
    }
}

/// Iterator over the points of one leaf. See [`QuadTree::leaf`].
#[derive(Debug, Clone)]
pub struct Leaf<'a> {
    next: &'a [AtomicI32],
    at: Option<usize>,
}

impl Iterator for Leaf<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let p = self.at?;
        let link = self.next[p].load(Ordering::Relaxed);
        self.at = usize::try_from(link).ok();
        Some(p)
    }
}

/// Quadrant of `(x, y)` relative to a cell centered at `(cx, cy)`: bit 0 is east, bit 1 north.
#[inline]
pub(crate) fn quadrant(x: f64, y: f64, cx: f64, cy: f64) -> usize {
    usize::from(x > cx) | (usize::from(y > cy) << 1)
}

/// Center of quadrant `q` of a cell with half-width `r`.
#[inline]
pub(crate) fn child_center(cx: f64, cy: f64, r: f64, q: usize) -> (f64, f64) {
    let h = 0.5 * r;
    (
        if q & 1 != 0 { cx + h } else { cx - h },
        if q & 2 != 0 { cy + h } else { cy - h },
    )
}

#[cfg(test)]
mod tests {
    use super::{QuadTree, Slot, child_center, quadrant};

    #[test]
    fn quadrant_bits() {
        assert_eq!(quadrant(-1.0, -1.0, 0.0, 0.0), 0);
        assert_eq!(quadrant(1.0, -1.0, 0.0, 0.0), 1);
        assert_eq!(quadrant(-1.0, 1.0, 0.0, 0.0), 2);
        assert_eq!(quadrant(1.0, 1.0, 0.0, 0.0), 3);
        assert_eq!(child_center(0.0, 0.0, 2.0, 3), (1.0, 1.0));
        assert_eq!(child_center(0.0, 0.0, 2.0, 0), (-1.0, -1.0));
    }

    #[test]
    fn slot_decoding() {
        assert_eq!(Slot::decode(-1, 4), Slot::Empty);
        assert_eq!(Slot::decode(-2, 4), Slot::Locked);
        assert_eq!(Slot::decode(3, 4), Slot::Point(3));
        assert_eq!(Slot::decode(4, 4), Slot::Cell(4));
    }

    #[test]
    fn index_space_must_fit_i32() {
        assert!(QuadTree::new(i32::MAX as usize, 2).is_err());
        assert!(QuadTree::new(4, 0).is_err());
    }

    #[test]
    fn reset_clears_previous_build() {
        let xs = [0.0, 1.0, 0.0, 1.0];
        let ys = [0.0, 0.0, 1.0, 1.0];
        let mut tree = QuadTree::new(4, 32).unwrap();
        tree.rebuild(&xs, &ys).unwrap();
        assert!(tree.cell_count() >= 1);

        let square = tree.square();
        tree.reset(square);
        assert_eq!(tree.cell_count(), 1);
        for q in 0..4 {
            assert_eq!(tree.child(tree.root(), q), Slot::Empty);
        }
        assert_eq!(tree.mass(tree.root()), None);
    }
}
