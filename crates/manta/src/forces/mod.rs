//! Gradient terms: approximate repulsion over the quadtree and exact sparse attraction.

mod attraction;
mod repulsion;

pub use attraction::attractive_forces;
pub use repulsion::{Repulsion, brute_force_repulsion};
