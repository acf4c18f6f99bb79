//! Momentum/gain position update and re-centering.

use crate::embedding::Embedding;
use crate::reduce;
use rayon::prelude::*;

/// Position clamp radius for the first iteration.
pub const GROWTH_BOUND_START: f64 = 100.0;
/// Amount the clamp radius widens after every iteration.
pub const GROWTH_BOUND_STEP: f64 = 0.01;

const GAIN_INCREMENT: f64 = 0.2;
const GAIN_DECAY: f64 = 0.8;

/// Scalars shared by every coordinate update in one iteration.
#[derive(Debug, Clone, Copy)]
pub struct StepRule {
    pub learning_rate: f64,
    pub momentum: f64,
    pub min_gain: f64,
    /// `1 / Z`.
    pub z_norm: f64,
    /// Current growth bound; positions are clamped to `[-bound, bound]`.
    pub bound: f64,
}

/// Adapts a per-coordinate gain.
///
/// The velocity points against the gradient, so a gradient whose sign differs from the previous
/// velocity means the descent direction held steady and the gain grows additively. Otherwise it
/// shrinks multiplicatively. The result never drops below `min_gain`.
#[inline]
pub fn update_gain(gain: f64, grad: f64, velocity: f64, min_gain: f64) -> f64 {
    let next = if grad.is_sign_negative() != velocity.is_sign_negative() {
        gain + GAIN_INCREMENT
    } else {
        gain * GAIN_DECAY
    };
    next.max(min_gain)
}

#[inline]
fn gradient(attraction: f64, repulsion: f64, z_norm: f64) -> f64 {
    attraction - z_norm * repulsion
}

/// Applies one update to every coordinate of `embedding`.
pub fn integrate(embedding: &mut Embedding, rule: &StepRule) {
    let Embedding {
        positions,
        attraction,
        repulsion,
        velocity,
        gains,
        ..
    } = embedding;

    positions
        .par_iter_mut()
        .zip(velocity.par_iter_mut())
        .zip(gains.par_iter_mut())
        .zip(attraction.par_iter().zip(repulsion.par_iter()))
        .for_each(|(((y, v), g), (&a, &r))| {
            let grad = gradient(a, r, rule.z_norm);
            *g = update_gain(*g, grad, *v, rule.min_gain);
            *v = rule.momentum * *v - rule.learning_rate * *g * grad;
            *y = (*y + *v).clamp(-rule.bound, rule.bound);
        });
}

/// Euclidean norm of the gradient the last [`integrate`] call used.
pub fn gradient_norm(embedding: &Embedding, z_norm: f64) -> f64 {
    let attraction = embedding.attraction();
    let repulsion = embedding.repulsion();
    reduce::sum_indexed(attraction.len(), |i| {
        let g = gradient(attraction[i], repulsion[i], z_norm);
        g * g
    })
    .sqrt()
}

/// Subtracts the mean position from every point. Returns the mean that was removed.
pub fn recenter(embedding: &mut Embedding) -> (f64, f64) {
    let (mx, my) = embedding.mean();
    let n = embedding.len();
    let (xs, ys) = embedding.positions.split_at_mut(n);
    xs.par_iter_mut().for_each(|x| *x -= mx);
    ys.par_iter_mut().for_each(|y| *y -= my);
    (mx, my)
}
