//! Weighted cross-spectral density eigendecomposition at one frequency.

use crate::error::SpodError;
use itertools::Itertools;
use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use num_complex::Complex64;

/// Weighted Gram matrix `Q^H diag(w) Q / n_blocks` (`n_blocks x n_blocks`).
pub(crate) fn gram_matrix(
    q: ArrayView2<'_, Complex64>,
    weights: ArrayView1<'_, f64>,
) -> Array2<Complex64> {
    let n_blocks = q.ncols();
    let mut qw = q.to_owned();
    for (mut row, w) in qw.rows_mut().into_iter().zip(weights.iter()) {
        row.mapv_inplace(|c| c * *w);
    }
    let qh = q.t().mapv(|c| c.conj());
    qh.dot(&qw) / Complex64::new(n_blocks as f64, 0.0)
}

/// Hermitian eigendecomposition sorted by descending eigenvalue.
///
/// Returns the real eigenvalues and the matching eigenvector columns.
pub(crate) fn eigen_descending(
    m: &Array2<Complex64>,
) -> Result<(Vec<f64>, Array2<Complex64>), SpodError> {
    let n = m.nrows();
    if m.iter().any(|c| !c.re.is_finite() || !c.im.is_finite()) {
        return Err(SpodError::Numerical {
            stage: "eigendecomposition",
            reason: "cross-spectral density matrix holds non-finite entries".into(),
        });
    }
    // nalgebra is column-major; feed it the transpose's row-major walk.
    let dm = DMatrix::from_iterator(n, n, m.t().iter().copied());
    let eig = SymmetricEigen::try_new(dm, f64::EPSILON, 0).ok_or_else(|| {
        SpodError::Numerical {
            stage: "eigendecomposition",
            reason: "eigensolver did not converge".into(),
        }
    })?;

    let order: Vec<usize> = (0..n)
        .sorted_by(|a, b| {
            eig.eigenvalues[*b]
                .partial_cmp(&eig.eigenvalues[*a])
                .unwrap_or(core::cmp::Ordering::Equal)
        })
        .collect();

    let eigenvalues: Vec<f64> = order.iter().map(|i| eig.eigenvalues[*i]).collect();
    let eigenvectors =
        Array2::from_shape_fn((n, n), |(i, j)| eig.eigenvectors[(i, order[j])]);
    Ok((eigenvalues, eigenvectors))
}

/// Spatial modes `Q V diag(1 / sqrt(lambda * n_blocks))`, truncated to the
/// leading `n_keep` columns.
pub(crate) fn spatial_modes(
    q: ArrayView2<'_, Complex64>,
    eigenvectors: &Array2<Complex64>,
    eigenvalues: &[f64],
    n_keep: usize,
) -> Array2<Complex64> {
    let n_blocks = q.ncols();
    let n_keep = n_keep.min(n_blocks);
    let mut scaled = eigenvectors.slice(ndarray::s![.., ..n_keep]).to_owned();
    for (j, mut col) in scaled.columns_mut().into_iter().enumerate() {
        let lambda = eigenvalues[j].abs().max(f64::MIN_POSITIVE);
        let s = 1.0 / (lambda * n_blocks as f64).sqrt();
        col.mapv_inplace(|c| c * s);
    }
    q.dot(&scaled)
}

/// Descending magnitudes of the eigenvalues, as reported to callers.
pub(crate) fn eigenvalue_energies(eigenvalues: &[f64]) -> Array1<f64> {
    eigenvalues.iter().map(|l| l.abs()).collect()
}
