#![forbid(unsafe_code)]

//! Dense principal component analysis.
//!
//! Covariance of mean-centered rows, a symmetric eigendecomposition, and the usual fit /
//! transform / inverse transform surface. `initial_embedding` produces the 2×N seed layout
//! accepted by `manta` with `Initialization::Provided`.

pub mod eigh;
pub mod error;
mod pca;

pub use eigh::{Eigh, eigh};
pub use error::{Error, Result};
pub use pca::{Pca, PcaParams, initial_embedding};

pub use nalgebra;
