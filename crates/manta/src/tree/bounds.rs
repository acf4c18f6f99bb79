use crate::error::{Error, Result};
use crate::reduce;

/// Slack added to the half-width so boundary points and fully coincident inputs still yield a
/// square of positive size.
const MARGIN: f64 = 1e-5;

/// Axis-aligned square given by its center and half-width.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingSquare {
    pub center_x: f64,
    pub center_y: f64,
    pub radius: f64,
}

impl BoundingSquare {
    pub fn width(&self) -> f64 {
        2.0 * self.radius
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        (x - self.center_x).abs() <= self.radius && (y - self.center_y).abs() <= self.radius
    }
}

/// Smallest square (plus margin) enclosing every `(xs[i], ys[i])`.
pub fn bounding_square(xs: &[f64], ys: &[f64]) -> Result<BoundingSquare> {
    let (min_x, max_x) = reduce::min_max(xs).ok_or(Error::DegenerateBoundingBox)?;
    let (min_y, max_y) = reduce::min_max(ys).ok_or(Error::DegenerateBoundingBox)?;

    let radius = 0.5 * (max_x - min_x).max(max_y - min_y) + MARGIN;
    if !(radius.is_finite() && radius > 0.0) {
        return Err(Error::DegenerateBoundingBox);
    }
    Ok(BoundingSquare {
        center_x: 0.5 * (min_x + max_x),
        center_y: 0.5 * (min_y + max_y),
        radius,
    })
}
