use super::{QuadTree, Slot};
use crate::error::{Error, Result};
use rayon::prelude::*;
use std::sync::atomic::Ordering;

impl QuadTree {
    /// Lays the points out in depth-first order (quadrants in ascending order).
    ///
    /// Works top-down one level at a time: each cell knows where its run of points begins and
    /// hands consecutive sub-ranges to its children, sized by their mass. Requires
    /// [`QuadTree::summarize`].
    pub fn sort(&self) -> Result<()> {
        let root = self.root();
        self.start[self.record(root)].store(0, Ordering::Relaxed);
        for d in 0..=self.max_depth() as usize {
            self.level(d)
                .par_iter()
                .try_for_each(|&cell| self.sort_cell(cell as usize))?;
        }
        Ok(())
    }

    fn sort_cell(&self, cell: usize) -> Result<()> {
        let mut at = self.start[self.record(cell)].load(Ordering::Relaxed);
        for q in 0..4 {
            match self.child(cell, q) {
                Slot::Empty => {}
                Slot::Point(head) => {
                    for p in self.leaf(head) {
                        if at >= self.n {
                            return Err(Error::CorruptTree {
                                reason: format!("cell {cell} overflows the traversal order"),
                            });
                        }
                        self.order[at].store(p as u32, Ordering::Relaxed);
                        at += 1;
                    }
                }
                Slot::Cell(c) => {
                    let m = self.mass(c).ok_or_else(|| Error::CorruptTree {
                        reason: format!("cell {c} was not summarized before sorting"),
                    })?;
                    self.start[self.record(c)].store(at, Ordering::Relaxed);
                    at += m as usize;
                }
                Slot::Locked => {
                    return Err(Error::CorruptTree {
                        reason: format!("cell {cell} has a locked slot"),
                    });
                }
            }
        }
        Ok(())
    }
}
