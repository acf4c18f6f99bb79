#![forbid(unsafe_code)]

//! Barnes-Hut t-SNE embedding engine.
//!
//! Given a sparse, symmetrized affinity graph over `N` points, `manta` iteratively places the
//! points in the plane so that the Student-t similarities of the embedding match the affinities.
//! Each iteration rebuilds a lock-free quadtree over the current embedding, uses it to
//! approximate the O(N²) repulsive forces in O(N log N), computes the attractive forces exactly
//! over the graph's nonzeros, and takes a momentum/gain step.
//!
//! Affinity construction (perplexity calibration, nearest neighbors) happens upstream; PCA
//! seeding lives in `manta-pca`.

pub mod affinity;
mod alloc;
pub mod embedding;
pub mod error;
pub mod forces;
pub mod integrate;
pub mod metrics;
pub mod optimizer;
pub mod params;
mod reduce;
pub mod rng;
pub mod tree;

pub use affinity::AffinityGraph;
pub use embedding::Embedding;
pub use error::{Error, Result};
pub use optimizer::{Optimizer, PhaseMillis, PhaseTimings, RunSummary, StepReport};
pub use params::{Initialization, Params};

/// Embeds the points of `graph` in two dimensions.
///
/// `positions` is a 2×N buffer (x coordinates, then y coordinates). With
/// [`Initialization::Provided`] it must hold the seed embedding; with
/// [`Initialization::Random`] its contents are ignored. On success it holds the final embedding.
///
/// The graph's weights are expected to arrive multiplied by `params.early_exaggeration`; they are
/// divided by it once, at iteration `params.exaggeration_iter`. The run always performs
/// `params.max_iter` iterations.
pub fn embed(
    graph: &mut AffinityGraph,
    positions: &mut [f64],
    params: &Params,
) -> Result<RunSummary> {
    let mut optimizer = Optimizer::new(graph, positions, params)?;
    let summary = optimizer.run()?;
    positions.copy_from_slice(optimizer.embedding().positions());
    Ok(summary)
}
