//! Snapshot access contract: the engine's only path to raw data.

use crate::error::SpodError;
use ndarray::{s, Array2};

/// Read-only access to an ordered time series of flattened spatial snapshots.
///
/// Implementors expose `nt` snapshots of `n_space` values each (spatial
/// points times variables, flattened). The engine never touches raw data
/// except through [`SnapshotSource::fetch`], which lets callers stream from
/// any backing store; in-memory arrays get the trivial implementation below.
pub trait SnapshotSource {
    /// Number of snapshots available.
    fn n_snapshots(&self) -> usize;

    /// Flattened spatial extent of one snapshot.
    fn n_space(&self) -> usize;

    /// Fetch snapshots for the time range `t_start..t_end` as rows of a
    /// time-major matrix. Equal bounds return the single snapshot `t_start`.
    ///
    /// The contract requires `t_start <= t_end` and `t_start < nt`; anything
    /// else is a `Configuration` error.
    fn fetch(&self, t_start: usize, t_end: usize) -> Result<Array2<f64>, SpodError>;
}

pub(crate) fn validate_range(
    t_start: usize,
    t_end: usize,
    nt: usize,
) -> Result<(usize, usize), SpodError> {
    if t_start > t_end {
        return Err(SpodError::Configuration {
            arg: "t_start",
            reason: format!("t_start {t_start} cannot be greater than t_end {t_end}"),
        });
    }
    if t_start >= nt {
        return Err(SpodError::Configuration {
            arg: "t_start",
            reason: format!("t_start {t_start} is beyond the {nt}-snapshot time dimension"),
        });
    }
    let t_end = if t_start == t_end { t_end + 1 } else { t_end };
    if t_end > nt {
        return Err(SpodError::Configuration {
            arg: "t_end",
            reason: format!("t_end {t_end} is beyond the {nt}-snapshot time dimension"),
        });
    }
    Ok((t_start, t_end))
}

impl SnapshotSource for Array2<f64> {
    fn n_snapshots(&self) -> usize {
        self.nrows()
    }

    fn n_space(&self) -> usize {
        self.ncols()
    }

    fn fetch(&self, t_start: usize, t_end: usize) -> Result<Array2<f64>, SpodError> {
        let (t_start, t_end) = validate_range(t_start, t_end, self.nrows())?;
        Ok(self.slice(s![t_start..t_end, ..]).to_owned())
    }
}
