//! Iteration driver: initialization, the per-iteration phase pipeline, and the exaggeration
//! schedule.

use crate::affinity::AffinityGraph;
use crate::embedding::Embedding;
use crate::error::{Error, Result};
use crate::forces::{Repulsion, attractive_forces};
use crate::integrate::{self, GROWTH_BOUND_START, GROWTH_BOUND_STEP, StepRule};
use crate::params::{INIT_SPREAD, Initialization, Params};
use crate::rng::XorShift64Star;
use crate::tree::{QuadTree, bounding_square};
use serde::Serialize;
use std::time::{Duration, Instant};

const PROGRESS_EVERY: usize = 50;

/// Wall time spent in each phase, summed over all iterations.
#[derive(Debug, Default, Clone, Serialize)]
pub struct PhaseTimings {
    pub bounding_box: Duration,
    pub clear: Duration,
    pub tree_build: Duration,
    pub summarization: Duration,
    pub sort: Duration,
    pub repulsion: Duration,
    pub attraction: Duration,
    pub integration: Duration,
}

impl PhaseTimings {
    pub fn total(&self) -> Duration {
        self.bounding_box
            + self.clear
            + self.tree_build
            + self.summarization
            + self.sort
            + self.repulsion
            + self.attraction
            + self.integration
    }

    /// The same timings as fractional milliseconds, for reports.
    pub fn millis(&self) -> PhaseMillis {
        let ms = |d: Duration| d.as_secs_f64() * 1e3;
        PhaseMillis {
            bounding_box: ms(self.bounding_box),
            clear: ms(self.clear),
            tree_build: ms(self.tree_build),
            summarization: ms(self.summarization),
            sort: ms(self.sort),
            repulsion: ms(self.repulsion),
            attraction: ms(self.attraction),
            integration: ms(self.integration),
            total: ms(self.total()),
        }
    }
}

/// [`PhaseTimings`] in milliseconds, with the total alongside.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct PhaseMillis {
    pub bounding_box: f64,
    pub clear: f64,
    pub tree_build: f64,
    pub summarization: f64,
    pub sort: f64,
    pub repulsion: f64,
    pub attraction: f64,
    pub integration: f64,
    pub total: f64,
}

/// What one iteration observed.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StepReport {
    pub iteration: usize,
    /// Normalization constant `Σ q_ij - N`.
    pub z: f64,
    pub grad_norm: f64,
    /// Clamp radius applied during this iteration.
    pub growth_bound: f64,
    pub max_depth: u32,
    pub cells: usize,
    /// Mean position subtracted by re-centering.
    pub removed_mean: (f64, f64),
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub iterations: usize,
    pub last_step: Option<StepReport>,
    pub timings: PhaseTimings,
}

/// Owns every per-run buffer; dropping it releases them.
#[derive(Debug)]
pub struct Optimizer<'g> {
    graph: &'g mut AffinityGraph,
    params: Params,
    embedding: Embedding,
    tree: QuadTree,
    repulsion: Repulsion,
    iteration: usize,
    momentum: f64,
    learning_rate: f64,
    growth_bound: f64,
    exaggeration_removed: bool,
    timings: PhaseTimings,
}

impl<'g> Optimizer<'g> {
    /// Validates the inputs, reserves scratch space and seeds the embedding.
    ///
    /// `positions` is the caller's 2×N buffer; it is only read, and only when
    /// `params.init` is [`Initialization::Provided`].
    pub fn new(graph: &'g mut AffinityGraph, positions: &[f64], params: &Params) -> Result<Self> {
        params.validate()?;
        let n = graph.n();
        if n < 2 {
            return Err(Error::TooFewPoints { n });
        }
        if positions.len() != 2 * n {
            return Err(Error::PositionBufferLength {
                expected: 2 * n,
                actual: positions.len(),
            });
        }

        let capacity = params.node_capacity_for(n);
        let mut embedding = Embedding::allocate(n)?;
        let tree = QuadTree::new(n, capacity)?;
        let repulsion = Repulsion::new(n)?;

        match params.init {
            Initialization::Random => {
                let seed = params.seed();
                XorShift64Star::new(seed).fill_uniform(
                    &mut embedding.positions,
                    -INIT_SPREAD,
                    INIT_SPREAD,
                );
                tracing::debug!(seed, "random initialization");
            }
            Initialization::Provided => embedding.positions.copy_from_slice(positions),
        }

        if params.verbose {
            tracing::info!(n, nnz = graph.nnz(), cells = capacity, "allocated workspace");
        }

        Ok(Self {
            graph,
            params: params.clone(),
            embedding,
            tree,
            repulsion,
            iteration: 0,
            momentum: params.pre_momentum,
            learning_rate: params.pre_learning_rate,
            growth_bound: GROWTH_BOUND_START,
            exaggeration_removed: false,
            timings: PhaseTimings::default(),
        })
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn embedding(&self) -> &Embedding {
        &self.embedding
    }

    pub fn tree(&self) -> &QuadTree {
        &self.tree
    }

    pub fn graph(&self) -> &AffinityGraph {
        &*self.graph
    }

    /// Clamp radius the next iteration will use.
    pub fn growth_bound(&self) -> f64 {
        self.growth_bound
    }

    pub fn timings(&self) -> &PhaseTimings {
        &self.timings
    }

    /// Runs one full iteration: bounding box, clear, build, summarize, sort, repulsion,
    /// attraction, integration and re-centering.
    pub fn step(&mut self) -> Result<StepReport> {
        let it = self.iteration;
        if it == self.params.exaggeration_iter && !self.exaggeration_removed {
            self.remove_exaggeration();
        }

        let n = self.embedding.len();
        let (xs, ys) = self.embedding.positions.split_at(n);

        let t = Instant::now();
        let square = bounding_square(xs, ys)?;
        self.timings.bounding_box += t.elapsed();

        let t = Instant::now();
        self.tree.reset(square);
        self.timings.clear += t.elapsed();

        let t = Instant::now();
        self.tree.build(xs, ys)?;
        self.timings.tree_build += t.elapsed();

        let t = Instant::now();
        self.tree.summarize(xs, ys)?;
        self.timings.summarization += t.elapsed();

        let t = Instant::now();
        self.tree.sort()?;
        self.timings.sort += t.elapsed();

        let t = Instant::now();
        let z = self.repulsion.compute(
            &self.tree,
            &self.embedding.positions,
            self.params.theta,
            self.params.epssq,
            &mut self.embedding.repulsion,
        )?;
        self.timings.repulsion += t.elapsed();
        // The -N correction can leave Z slightly negative for sparse layouts; only a Z that
        // cannot be inverted stops the run.
        let z_norm = 1.0 / z;
        if !(z.is_finite() && z_norm.is_finite()) {
            return Err(Error::DegenerateNormalization { z });
        }

        let t = Instant::now();
        attractive_forces(
            &*self.graph,
            &self.embedding.positions,
            &mut self.embedding.attraction,
        );
        self.timings.attraction += t.elapsed();

        let t = Instant::now();
        let rule = StepRule {
            learning_rate: self.learning_rate,
            momentum: self.momentum,
            min_gain: self.params.min_gain,
            z_norm,
            bound: self.growth_bound,
        };
        integrate::integrate(&mut self.embedding, &rule);
        let grad_norm = integrate::gradient_norm(&self.embedding, rule.z_norm);
        let removed_mean = integrate::recenter(&mut self.embedding);
        self.timings.integration += t.elapsed();

        let report = StepReport {
            iteration: it,
            z,
            grad_norm,
            growth_bound: self.growth_bound,
            max_depth: self.tree.max_depth(),
            cells: self.tree.cell_count(),
            removed_mean,
        };
        tracing::trace!(?report, "iteration complete");
        if self.params.verbose && it % PROGRESS_EVERY == 0 {
            tracing::info!(
                iteration = it,
                z,
                grad_norm,
                growth_bound = self.growth_bound,
                cells = report.cells,
                max_depth = report.max_depth,
                "gradient update"
            );
        }

        self.growth_bound += GROWTH_BOUND_STEP;
        self.iteration += 1;
        Ok(report)
    }

    /// Runs the remaining iterations up to `max_iter`.
    pub fn run(&mut self) -> Result<RunSummary> {
        if self.params.verbose {
            tracing::info!(max_iter = self.params.max_iter, "start gradient updates");
        }
        let mut last_step = None;
        while self.iteration < self.params.max_iter {
            last_step = Some(self.step()?);
        }
        if self.params.verbose {
            let t = &self.timings;
            tracing::info!(
                total = ?t.total(),
                bounding_box = ?t.bounding_box,
                clear = ?t.clear,
                tree_build = ?t.tree_build,
                summarization = ?t.summarization,
                sort = ?t.sort,
                repulsion = ?t.repulsion,
                attraction = ?t.attraction,
                integration = ?t.integration,
                "phase timings"
            );
        }
        Ok(RunSummary {
            iterations: self.iteration,
            last_step,
            timings: self.timings.clone(),
        })
    }

    /// Restores the affinity weights and switches to the post-exaggeration step rule.
    fn remove_exaggeration(&mut self) {
        self.graph.scale(1.0 / self.params.early_exaggeration);
        self.momentum = self.params.post_momentum;
        self.learning_rate = self.params.post_learning_rate;
        self.exaggeration_removed = true;
        if self.params.verbose {
            tracing::info!(iteration = self.iteration, "exaggeration phase finished");
        } else {
            tracing::debug!(iteration = self.iteration, "exaggeration phase finished");
        }
    }
}
