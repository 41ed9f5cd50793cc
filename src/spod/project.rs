//! Projection of snapshot data onto persisted spatial modes, and the inverse
//! reconstruction.
//!
//! Both directions use the mean captured at fit time; recomputing a mean from
//! held-out data would silently change the expansion.

use crate::error::SpodError;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use num_complex::Complex64;

/// Expansion coefficients `Phi^H (X - mean)` of `data` (`nt x n_space`) on
/// the mode columns of `phi` (`n_space x n_modes`). Returns an
/// `n_modes x nt` coefficient matrix.
pub fn project(
    data: ArrayView2<'_, f64>,
    phi: ArrayView2<'_, Complex64>,
    mean: ArrayView1<'_, f64>,
) -> Result<Array2<Complex64>, SpodError> {
    let n_space = phi.nrows();
    if data.ncols() != n_space {
        return Err(SpodError::Configuration {
            arg: "data",
            reason: format!(
                "snapshots have {} spatial values, modes expect {n_space}",
                data.ncols()
            ),
        });
    }
    if mean.len() != n_space {
        return Err(SpodError::Configuration {
            arg: "mean",
            reason: format!(
                "mean holds {} values, modes expect {n_space}",
                mean.len()
            ),
        });
    }
    let centered = Array2::from_shape_fn((n_space, data.nrows()), |(j, t)| {
        Complex64::new(data[[t, j]] - mean[j], 0.0)
    });
    let phi_h = phi.t().mapv(|c| c.conj());
    Ok(phi_h.dot(&centered))
}

/// Reconstruct real snapshots `Phi coeffs + mean` from expansion
/// coefficients (`n_modes x nt`). Returns an `nt x n_space` matrix.
pub fn reconstruct(
    coeffs: ArrayView2<'_, Complex64>,
    phi: ArrayView2<'_, Complex64>,
    mean: ArrayView1<'_, f64>,
) -> Result<Array2<f64>, SpodError> {
    let n_space = phi.nrows();
    if phi.ncols() != coeffs.nrows() {
        return Err(SpodError::Configuration {
            arg: "coeffs",
            reason: format!(
                "{} coefficient rows do not match {} mode columns",
                coeffs.nrows(),
                phi.ncols()
            ),
        });
    }
    if mean.len() != n_space {
        return Err(SpodError::Configuration {
            arg: "mean",
            reason: format!(
                "mean holds {} values, modes expect {n_space}",
                mean.len()
            ),
        });
    }
    let fields = phi.dot(&coeffs);
    let nt = coeffs.ncols();
    Ok(Array2::from_shape_fn((nt, n_space), |(t, j)| {
        fields[[j, t]].re + mean[j]
    }))
}

/// Captured mean carried as a real vector; loads from the complex persisted
/// artifact written at fit time.
pub fn mean_from_complex(mean: ArrayView1<'_, Complex64>) -> Array1<f64> {
    mean.iter().map(|c| c.re).collect()
}
