use super::{EMPTY, LEVELS, QuadTree, Slot};
use crate::error::{Error, Result};
use rayon::prelude::*;
use std::sync::atomic::Ordering;

/// Polls of an unpublished child summary before the build is declared stuck.
const MAX_SUMMARY_WAIT: u32 = 1 << 20;
const YIELD_EVERY: u32 = 64;

impl QuadTree {
    /// Computes mass and center of mass for every cell, deepest level first.
    ///
    /// A cell's mass stays at the unsummarized marker until its center of mass is stored, and
    /// readers wait on that marker. Processing whole levels bottom-up means the wait is only ever
    /// hit if the build left the tree inconsistent.
    pub fn summarize(&mut self, xs: &[f64], ys: &[f64]) -> Result<()> {
        self.bucket_levels();
        self.sort_stacked_leaves();
        let deepest = self.max_depth() as usize;
        for d in (0..=deepest).rev() {
            self.level(d)
                .par_iter()
                .try_for_each(|&cell| self.summarize_cell(cell as usize, xs, ys))?;
        }
        Ok(())
    }

    /// Counting sort of the live cells by depth into `level_cells`.
    fn bucket_levels(&mut self) {
        let live = self.cell_count();
        let first = self.bottom.load(Ordering::Acquire);
        let root = self.root();

        let mut counts = [0usize; LEVELS + 1];
        for cell in first..=root {
            counts[self.depth(cell) as usize + 1] += 1;
        }
        for d in 0..LEVELS {
            counts[d + 1] += counts[d];
        }
        self.level_start.copy_from_slice(&counts);

        let mut cursor = counts;
        for cell in first..=root {
            let d = self.depth(cell) as usize;
            self.level_cells[cursor[d]] = cell as u32;
            cursor[d] += 1;
        }
        debug_assert_eq!(self.level_start[LEVELS], live);
    }

    /// Relinks every stacked leaf in ascending point order. Push order depends on thread timing,
    /// and the sums over a leaf must not.
    fn sort_stacked_leaves(&self) {
        if !self.stacked.load(Ordering::Relaxed) {
            return;
        }
        let first = self.bottom.load(Ordering::Acquire);
        (first..=self.root()).into_par_iter().for_each_init(Vec::new, |stacked, cell| {
            for q in 0..4 {
                let Slot::Point(head) = self.child(cell, q) else {
                    continue;
                };
                stacked.clear();
                stacked.extend(self.leaf(head));
                if stacked.len() < 2 {
                    continue;
                }
                stacked.sort_unstable();
                for pair in stacked.windows(2) {
                    self.next[pair[0]].store(pair[1] as i32, Ordering::Relaxed);
                }
                if let Some(&last) = stacked.last() {
                    self.next[last].store(EMPTY, Ordering::Relaxed);
                }
                self.slot(cell, q).store(stacked[0] as i32, Ordering::Relaxed);
            }
        });
    }

    fn summarize_cell(&self, cell: usize, xs: &[f64], ys: &[f64]) -> Result<()> {
        let mut mass = 0i32;
        let (mut sx, mut sy) = (0.0, 0.0);
        for q in 0..4 {
            match self.child(cell, q) {
                Slot::Empty => {}
                Slot::Point(head) => {
                    for p in self.leaf(head) {
                        mass += 1;
                        sx += xs[p];
                        sy += ys[p];
                    }
                }
                Slot::Cell(c) => {
                    let m = self.wait_for_mass(c)?;
                    let (cx, cy) = self.center_of_mass(c);
                    mass += m;
                    sx += cx * f64::from(m);
                    sy += cy * f64::from(m);
                }
                Slot::Locked => {
                    return Err(Error::CorruptTree {
                        reason: format!("cell {cell} has a slot still locked after the build"),
                    });
                }
            }
        }
        if mass == 0 {
            return Err(Error::CorruptTree {
                reason: format!("cell {cell} holds no points"),
            });
        }

        let inv = 1.0 / f64::from(mass);
        let r = self.record(cell);
        self.com_x[r].store((sx * inv).to_bits(), Ordering::Relaxed);
        self.com_y[r].store((sy * inv).to_bits(), Ordering::Relaxed);
        self.mass[r].store(mass, Ordering::Release);
        Ok(())
    }

    fn wait_for_mass(&self, cell: usize) -> Result<i32> {
        let m = &self.mass[self.record(cell)];
        for attempt in 1..=MAX_SUMMARY_WAIT {
            let v = m.load(Ordering::Acquire);
            if v >= 0 {
                return Ok(v);
            }
            if attempt % YIELD_EVERY == 0 {
                std::thread::yield_now();
            } else {
                std::hint::spin_loop();
            }
        }
        Err(Error::SummaryUnavailable { cell })
    }
}
