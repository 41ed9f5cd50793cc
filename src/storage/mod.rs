//! Named dense-array persistence.
//!
//! Modes, cached blocks, and captured means are stored as opaque binary blobs
//! keyed by a file path: a serialized `{shape, data}` record. Writes go
//! through a temporary sibling file renamed into place, so a persisted
//! artifact is always all-or-nothing.

use crate::error::SpodError;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

#[derive(Debug, Serialize, Deserialize)]
struct DenseBlob {
    shape: Vec<usize>,
    data: Vec<Complex64>,
}

fn write_blob(path: &Path, blob: &DenseBlob) -> Result<(), SpodError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| SpodError::storage(path, err))?;
    }
    let tmp = path.with_extension("blob.tmp");
    {
        let file = File::create(&tmp).map_err(|err| SpodError::storage(&tmp, err))?;
        let writer = BufWriter::new(file);
        bincode::serialize_into(writer, blob).map_err(|err| SpodError::storage(&tmp, err))?;
    }
    fs::rename(&tmp, path).map_err(|err| SpodError::storage(path, err))
}

fn read_blob(path: &Path) -> Result<DenseBlob, SpodError> {
    let file = File::open(path).map_err(|err| SpodError::storage(path, err))?;
    let reader = BufReader::new(file);
    let blob: DenseBlob =
        bincode::deserialize_from(reader).map_err(|err| SpodError::storage(path, err))?;
    if blob.shape.iter().product::<usize>() != blob.data.len() {
        return Err(SpodError::storage(
            path,
            format!(
                "corrupt blob: shape {:?} does not match {} stored elements",
                blob.shape,
                blob.data.len()
            ),
        ));
    }
    Ok(blob)
}

/// Persist a complex matrix under `path` (row-major).
pub fn save_matrix(path: &Path, array: ArrayView2<'_, Complex64>) -> Result<(), SpodError> {
    save_matrix_shaped(path, array, &[array.nrows()])
}

/// Persist a complex matrix whose rows carry a multi-dimensional layout.
///
/// `row_shape` must multiply out to the row count; it is stored in the blob
/// header with the column count appended, so the layout is recoverable from
/// the artifact alone via [`artifact_shape`].
pub fn save_matrix_shaped(
    path: &Path,
    array: ArrayView2<'_, Complex64>,
    row_shape: &[usize],
) -> Result<(), SpodError> {
    if row_shape.iter().product::<usize>() != array.nrows() {
        return Err(SpodError::storage(
            path,
            format!(
                "row shape {:?} does not flatten to {} rows",
                row_shape,
                array.nrows()
            ),
        ));
    }
    let mut shape = row_shape.to_vec();
    shape.push(array.ncols());
    let blob = DenseBlob {
        shape,
        data: array.iter().copied().collect(),
    };
    write_blob(path, &blob)
}

/// Load a complex matrix previously written by [`save_matrix`] or
/// [`save_matrix_shaped`], flattening any leading row dimensions.
pub fn load_matrix(path: &Path) -> Result<Array2<Complex64>, SpodError> {
    let blob = read_blob(path)?;
    if blob.shape.len() < 2 {
        return Err(SpodError::storage(
            path,
            format!("expected a rank-2 blob, found rank {}", blob.shape.len()),
        ));
    }
    let cols = blob.shape[blob.shape.len() - 1];
    let rows = blob.shape[..blob.shape.len() - 1].iter().product();
    Array2::from_shape_vec((rows, cols), blob.data)
        .map_err(|err| SpodError::storage(path, err))
}

/// Stored shape of a persisted artifact.
pub fn artifact_shape(path: &Path) -> Result<Vec<usize>, SpodError> {
    read_blob(path).map(|blob| blob.shape)
}

/// Persist a complex vector under `path`.
pub fn save_vector(path: &Path, array: ArrayView1<'_, Complex64>) -> Result<(), SpodError> {
    let blob = DenseBlob {
        shape: vec![array.len()],
        data: array.iter().copied().collect(),
    };
    write_blob(path, &blob)
}

/// Load a complex vector previously written by [`save_vector`].
pub fn load_vector(path: &Path) -> Result<Array1<Complex64>, SpodError> {
    let blob = read_blob(path)?;
    if blob.shape.len() != 1 {
        return Err(SpodError::storage(
            path,
            format!("expected a rank-1 blob, found rank {}", blob.shape.len()),
        ));
    }
    Ok(Array1::from_vec(blob.data))
}
