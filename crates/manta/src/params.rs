use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// How the embedding is seeded before the first iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Initialization {
    /// Uniform fill in `[-INIT_SPREAD, INIT_SPREAD]` from the run's seed.
    #[default]
    Random,
    /// The positions buffer already holds a seed embedding (typically PCA output).
    #[serde(alias = "pca")]
    Provided,
}

/// Half-width of the uniform random initialization.
pub const INIT_SPREAD: f64 = 0.001;

/// Run parameters for [`crate::embed`].
///
/// Defaults follow the usual Barnes-Hut t-SNE settings. Any subset of fields can be supplied
/// from JSON; missing fields take their default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Opening-angle threshold. `0` forces a full descent (exact repulsion).
    pub theta: f64,
    /// Jitter added to squared distances in the repulsion kernel.
    pub epssq: f64,
    /// Factor the affinity weights were multiplied by before the run.
    pub early_exaggeration: f64,
    /// Iteration at which the exaggeration is removed.
    pub exaggeration_iter: usize,
    pub min_gain: f64,
    pub pre_learning_rate: f64,
    pub post_learning_rate: f64,
    pub max_iter: usize,
    /// Reported alongside progress; the loop never stops early on it.
    pub min_grad_norm: f64,
    pub pre_momentum: f64,
    pub post_momentum: f64,
    /// Negative values draw a fresh seed per run.
    pub random_state: i64,
    pub verbose: bool,
    pub init: Initialization,
    /// Number of internal quadtree cells to reserve. Defaults to `max(2N, 1024)`, 32-aligned.
    pub node_capacity: Option<usize>,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            theta: 0.5,
            epssq: 0.0025,
            early_exaggeration: 12.0,
            exaggeration_iter: 250,
            min_gain: 0.01,
            pre_learning_rate: 200.0,
            post_learning_rate: 500.0,
            max_iter: 1000,
            min_grad_norm: 1e-7,
            pre_momentum: 0.5,
            post_momentum: 0.8,
            random_state: -1,
            verbose: false,
            init: Initialization::Random,
            node_capacity: None,
        }
    }
}

const MIN_NODE_CAPACITY: usize = 1024;

impl Params {
    pub fn validate(&self) -> Result<()> {
        non_negative("theta", self.theta)?;
        non_negative("epssq", self.epssq)?;
        positive("early_exaggeration", self.early_exaggeration)?;
        positive("min_gain", self.min_gain)?;
        positive("pre_learning_rate", self.pre_learning_rate)?;
        positive("post_learning_rate", self.post_learning_rate)?;
        non_negative("min_grad_norm", self.min_grad_norm)?;
        momentum("pre_momentum", self.pre_momentum)?;
        momentum("post_momentum", self.post_momentum)?;
        if self.node_capacity == Some(0) {
            return Err(Error::InvalidParameter {
                name: "node_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Internal cell capacity for `n` points.
    pub fn node_capacity_for(&self, n: usize) -> usize {
        self.node_capacity
            .unwrap_or_else(|| (2 * n).max(MIN_NODE_CAPACITY).next_multiple_of(32))
    }

    /// Resolves `random_state` into a concrete seed.
    pub fn seed(&self) -> u64 {
        if self.random_state >= 0 {
            return self.random_state as u64;
        }
        rand::random()
    }
}

fn non_negative(name: &'static str, v: f64) -> Result<()> {
    if v.is_finite() && v >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidParameter {
            name,
            reason: format!("expected a finite value >= 0, got {v}"),
        })
    }
}

fn positive(name: &'static str, v: f64) -> Result<()> {
    if v.is_finite() && v > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidParameter {
            name,
            reason: format!("expected a finite value > 0, got {v}"),
        })
    }
}

fn momentum(name: &'static str, v: f64) -> Result<()> {
    if v.is_finite() && (0.0..1.0).contains(&v) {
        Ok(())
    } else {
        Err(Error::InvalidParameter {
            name,
            reason: format!("expected a value in [0, 1), got {v}"),
        })
    }
}
