use crate::error::{Error, Result};
use nalgebra::{DMatrix, DVector, SymmetricEigen};

/// Eigenpairs of a symmetric matrix, largest eigenvalue first.
#[derive(Debug, Clone)]
pub struct Eigh {
    pub values: DVector<f64>,
    /// Column `k` is the unit eigenvector of `values[k]`.
    pub vectors: DMatrix<f64>,
}

/// Symmetric eigendecomposition of `matrix`, sorted by descending eigenvalue.
/// The input is averaged with its transpose before decomposition.
pub fn eigh(matrix: &DMatrix<f64>) -> Result<Eigh> {
    if !matrix.is_square() {
        return Err(Error::InvalidParameter {
            name: "matrix",
            reason: format!(
                "expected a square matrix, got {}x{}",
                matrix.nrows(),
                matrix.ncols()
            ),
        });
    }
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(Error::EigenDecomposition {
            reason: "matrix contains non-finite entries".to_string(),
        });
    }

    let symmetric = (matrix + matrix.transpose()) * 0.5;
    let decomposition = SymmetricEigen::new(symmetric);

    let mut order: Vec<usize> = (0..decomposition.eigenvalues.len()).collect();
    order.sort_by(|&a, &b| {
        decomposition.eigenvalues[b]
            .total_cmp(&decomposition.eigenvalues[a])
            .then(a.cmp(&b))
    });

    let values = DVector::from_iterator(
        order.len(),
        order.iter().map(|&k| decomposition.eigenvalues[k]),
    );
    let vectors = decomposition.eigenvectors.select_columns(order.iter());
    if values.iter().chain(vectors.iter()).any(|v| !v.is_finite()) {
        return Err(Error::EigenDecomposition {
            reason: "solver produced non-finite eigenpairs".to_string(),
        });
    }
    Ok(Eigh { values, vectors })
}

#[cfg(test)]
mod tests {
    use super::eigh;
    use nalgebra::DMatrix;

    #[test]
    fn diagonal_is_sorted_descending() {
        let m = DMatrix::from_diagonal(&nalgebra::DVector::from_vec(vec![1.0, 5.0, 3.0]));
        let e = eigh(&m).unwrap();
        assert_eq!(e.values.as_slice(), &[5.0, 3.0, 1.0]);
        assert!((e.vectors[(1, 0)].abs() - 1.0).abs() < 1e-12);
        assert!((e.vectors[(2, 1)].abs() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn reconstructs_the_input() {
        let m = DMatrix::from_row_slice(3, 3, &[4.0, 1.0, 0.5, 1.0, 3.0, 0.2, 0.5, 0.2, 2.0]);
        let e = eigh(&m).unwrap();
        let back = &e.vectors * DMatrix::from_diagonal(&e.values) * e.vectors.transpose();
        assert!((back - m).abs().max() < 1e-10);
    }

    #[test]
    fn rejects_nan() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, f64::NAN, f64::NAN, 1.0]);
        assert!(eigh(&m).is_err());
    }
}
