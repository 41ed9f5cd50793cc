//! On-disk cache of per-block Fourier coefficients.
//!
//! Each cached entry holds one block's coefficients at one frequency, so a
//! low-memory run only ever loads `n_blocks` spatial vectors at a time. A
//! complete cache also lets a rerun over the same data skip the DFT phase.

use crate::error::SpodError;
use crate::storage;
use ndarray::{Array1, ArrayView1};
use num_complex::Complex64;
use std::path::{Path, PathBuf};

/// Addressable store of block coefficients under a cache directory.
#[derive(Debug, Clone)]
pub struct BlockCache {
    dir: PathBuf,
    n_blocks: usize,
    n_freq: usize,
}

impl BlockCache {
    /// Cache rooted at `dir` for an `n_blocks x n_freq` coefficient table.
    pub fn new(dir: impl Into<PathBuf>, n_blocks: usize, n_freq: usize) -> Self {
        Self {
            dir: dir.into(),
            n_blocks,
            n_freq,
        }
    }

    /// Cache directory root.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of blocks addressed by this cache.
    pub fn n_blocks(&self) -> usize {
        self.n_blocks
    }

    /// Number of frequency bins addressed by this cache.
    pub fn n_freq(&self) -> usize {
        self.n_freq
    }

    /// Path of the entry for `(i_blk, i_freq)` as seen by `rank`.
    pub fn entry_path(&self, i_blk: usize, i_freq: usize, rank: usize) -> PathBuf {
        self.dir.join(format!(
            "fft_block{i_blk:08}_freq{i_freq:08}_rank{rank:04}.blob"
        ))
    }

    /// Whether every entry a rerun would need is already present.
    ///
    /// A miss is not an error: the caller recomputes and overwrites.
    pub fn is_complete(&self, rank: usize) -> bool {
        for i_blk in 0..self.n_blocks {
            for i_freq in 0..self.n_freq {
                if !self.entry_path(i_blk, i_freq, rank).is_file() {
                    return false;
                }
            }
        }
        self.n_blocks > 0 && self.n_freq > 0
    }

    /// Persist one block's coefficients at one frequency.
    pub fn store(
        &self,
        i_blk: usize,
        i_freq: usize,
        rank: usize,
        coeffs: ArrayView1<Complex64>,
    ) -> Result<(), SpodError> {
        storage::save_vector(&self.entry_path(i_blk, i_freq, rank), coeffs)
    }

    /// Load one block's coefficients at one frequency.
    pub fn load(
        &self,
        i_blk: usize,
        i_freq: usize,
        rank: usize,
    ) -> Result<Array1<Complex64>, SpodError> {
        storage::load_vector(&self.entry_path(i_blk, i_freq, rank))
    }
}
