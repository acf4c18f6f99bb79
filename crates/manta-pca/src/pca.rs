use crate::eigh::eigh;
use crate::error::{Error, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PcaParams {
    /// Clamped to the number of input columns.
    pub n_components: usize,
    /// Scale projected columns to unit variance.
    pub whiten: bool,
}

impl Default for PcaParams {
    fn default() -> Self {
        Self {
            n_components: 2,
            whiten: false,
        }
    }
}

/// A fitted principal component model.
#[derive(Debug, Clone)]
pub struct Pca {
    /// `n_components × n_cols`; row `k` is the `k`-th principal axis.
    pub components: DMatrix<f64>,
    pub explained_variance: DVector<f64>,
    pub explained_variance_ratio: DVector<f64>,
    pub singular_values: DVector<f64>,
    pub mean: DVector<f64>,
    /// Mean variance of the discarded components; zero when every component is kept.
    pub noise_variance: f64,
    pub whiten: bool,
}

fn check_shape(data: &[f64], n_rows: usize, n_cols: usize) -> Result<()> {
    if n_rows < 2 {
        return Err(Error::InvalidParameter {
            name: "n_rows",
            reason: format!("need at least two rows, got {n_rows}"),
        });
    }
    if n_cols < 2 {
        return Err(Error::InvalidParameter {
            name: "n_cols",
            reason: format!("need at least two columns, got {n_cols}"),
        });
    }
    if data.len() != n_rows * n_cols {
        return Err(Error::InvalidParameter {
            name: "data",
            reason: format!("expected {n_rows}x{n_cols} values, got {}", data.len()),
        });
    }
    if data.iter().any(|v| !v.is_finite()) {
        return Err(Error::EigenDecomposition {
            reason: "input contains non-finite values".to_string(),
        });
    }
    Ok(())
}

impl Pca {
    /// Fits the model to `data`, a row-major `n_rows × n_cols` matrix.
    pub fn fit(data: &[f64], n_rows: usize, n_cols: usize, params: &PcaParams) -> Result<Self> {
        check_shape(data, n_rows, n_cols)?;
        if params.n_components < 1 {
            return Err(Error::InvalidParameter {
                name: "n_components",
                reason: "need at least one component".to_string(),
            });
        }
        let k = params.n_components.min(n_cols);
        if k < params.n_components {
            tracing::debug!(requested = params.n_components, k, "clamped n_components");
        }

        let x = DMatrix::from_row_slice(n_rows, n_cols, data);
        let mean = x.row_mean().transpose();
        let centered = center(&x, &mean);
        let covariance = centered.transpose() * &centered / (n_rows - 1) as f64;

        let decomposition = eigh(&covariance)?;
        let total: f64 = decomposition.values.sum();

        let explained_variance = decomposition.values.rows(0, k).into_owned();
        let explained_variance_ratio = if total > 0.0 {
            &explained_variance / total
        } else {
            DVector::zeros(k)
        };
        let singular_values =
            explained_variance.map(|v| (v.max(0.0) * (n_rows - 1) as f64).sqrt());
        let noise_variance = if k < n_cols {
            decomposition.values.rows(k, n_cols - k).mean()
        } else {
            0.0
        };
        let components = decomposition.vectors.columns(0, k).transpose();

        tracing::debug!(n_rows, n_cols, k, total_variance = total, "fitted pca");
        Ok(Self {
            components,
            explained_variance,
            explained_variance_ratio,
            singular_values,
            mean,
            noise_variance,
            whiten: params.whiten,
        })
    }

    pub fn n_components(&self) -> usize {
        self.components.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.components.ncols()
    }

    /// Projects row-major `data` onto the principal axes. Returns `n_rows × n_components`.
    pub fn transform(&self, data: &[f64], n_rows: usize) -> Result<DMatrix<f64>> {
        check_shape(data, n_rows, self.n_features())?;
        let x = DMatrix::from_row_slice(n_rows, self.n_features(), data);
        let mut projected = center(&x, &self.mean) * self.components.transpose();
        if self.whiten {
            let variance = self.explained_variance.iter();
            for (mut column, var) in projected.column_iter_mut().zip(variance) {
                if *var > 0.0 {
                    column /= var.sqrt();
                }
            }
        }
        Ok(projected)
    }

    /// Maps projected points back to the input space.
    pub fn inverse_transform(&self, projected: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        if projected.ncols() != self.n_components() {
            return Err(Error::InvalidParameter {
                name: "projected",
                reason: format!(
                    "expected {} columns, got {}",
                    self.n_components(),
                    projected.ncols()
                ),
            });
        }
        let mut scaled = projected.clone();
        if self.whiten {
            let variance = self.explained_variance.iter();
            for (mut column, var) in scaled.column_iter_mut().zip(variance) {
                if *var > 0.0 {
                    column *= var.sqrt();
                }
            }
        }
        let mut restored = scaled * &self.components;
        for mut row in restored.row_iter_mut() {
            row += self.mean.transpose();
        }
        Ok(restored)
    }

    /// Fits and projects in one pass, flipping each axis so that the projected value of largest
    /// magnitude is positive. The flip is applied to the stored components as well.
    pub fn fit_transform(
        data: &[f64],
        n_rows: usize,
        n_cols: usize,
        params: &PcaParams,
    ) -> Result<(Self, DMatrix<f64>)> {
        let mut pca = Self::fit(data, n_rows, n_cols, params)?;
        let mut projected = pca.transform(data, n_rows)?;
        for k in 0..projected.ncols() {
            let pivot = projected
                .column(k)
                .iter()
                .copied()
                .fold(0.0_f64, |best, v| if v.abs() > best.abs() { v } else { best });
            if pivot < 0.0 {
                projected.column_mut(k).neg_mut();
                pca.components.row_mut(k).neg_mut();
            }
        }
        Ok((pca, projected))
    }
}

fn center(x: &DMatrix<f64>, mean: &DVector<f64>) -> DMatrix<f64> {
    let mut centered = x.clone();
    for mut row in centered.row_iter_mut() {
        row -= mean.transpose();
    }
    centered
}

/// Two-component projection of `data` in the engine's 2×N layout (x block, then y block).
pub fn initial_embedding(data: &[f64], n_rows: usize, n_cols: usize) -> Result<Vec<f64>> {
    let params = PcaParams {
        n_components: 2,
        whiten: false,
    };
    let (_, projected) = Pca::fit_transform(data, n_rows, n_cols, &params)?;
    // Column-major storage already lays out column 0 then column 1.
    Ok(projected.as_slice().to_vec())
}
