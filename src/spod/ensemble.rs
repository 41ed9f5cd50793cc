//! Per-frequency block ensembles.
//!
//! The eigendecomposition stage consumes one `n_space x n_blocks` ensemble
//! per frequency. Where that ensemble comes from is a memory-budget choice:
//! [`ResidentEnsemble`] keeps every frequency in memory for the duration of
//! the DFT phase, [`CachedEnsemble`] reloads block vectors from a
//! [`BlockCache`] one frequency at a time.

use crate::error::SpodError;
use crate::spod::cache::BlockCache;
use ndarray::{Array2, ArrayView2};
use num_complex::Complex64;

/// Supplier of per-frequency block ensembles.
pub trait EnsembleSource {
    /// Number of frequency bins this source can produce.
    fn n_freq(&self) -> usize;

    /// Produce the `n_space x n_blocks` ensemble for frequency `i_freq`.
    ///
    /// Frequencies are consumed in order, each exactly once.
    fn produce(&mut self, i_freq: usize) -> Result<Array2<Complex64>, SpodError>;
}

/// In-memory ensemble store filled during the DFT phase.
pub struct ResidentEnsemble {
    slots: Vec<Option<Array2<Complex64>>>,
    inserted: Vec<bool>,
}

impl ResidentEnsemble {
    /// Empty store for `n_freq` ensembles of `n_space x n_blocks` each.
    pub fn new(n_freq: usize, n_space: usize, n_blocks: usize) -> Self {
        Self {
            slots: (0..n_freq)
                .map(|_| Some(Array2::zeros((n_space, n_blocks))))
                .collect(),
            inserted: vec![false; n_blocks],
        }
    }

    /// Scatter one block's coefficient matrix (`n_freq x n_space`) into the
    /// per-frequency slots as column `i_blk`.
    pub fn insert_block(
        &mut self,
        i_blk: usize,
        coeffs: ArrayView2<'_, Complex64>,
    ) -> Result<(), SpodError> {
        if i_blk >= self.inserted.len() {
            return Err(SpodError::Configuration {
                arg: "i_blk",
                reason: format!(
                    "block index {i_blk} is out of range for {} blocks",
                    self.inserted.len()
                ),
            });
        }
        if coeffs.nrows() != self.slots.len() {
            return Err(SpodError::Configuration {
                arg: "coeffs",
                reason: format!(
                    "expected {} frequency rows, got {}",
                    self.slots.len(),
                    coeffs.nrows()
                ),
            });
        }
        for (i_freq, row) in coeffs.rows().into_iter().enumerate() {
            if let Some(slot) = self.slots[i_freq].as_mut() {
                slot.column_mut(i_blk).assign(&row);
            }
        }
        self.inserted[i_blk] = true;
        Ok(())
    }
}

impl EnsembleSource for ResidentEnsemble {
    fn n_freq(&self) -> usize {
        self.slots.len()
    }

    fn produce(&mut self, i_freq: usize) -> Result<Array2<Complex64>, SpodError> {
        if !self.inserted.iter().all(|b| *b) {
            let filled = self.inserted.iter().filter(|b| **b).count();
            return Err(SpodError::Numerical {
                stage: "ensemble",
                reason: format!(
                    "only {} of {} blocks inserted before consumption",
                    filled,
                    self.inserted.len()
                ),
            });
        }
        self.slots
            .get_mut(i_freq)
            .and_then(Option::take)
            .ok_or_else(|| SpodError::Numerical {
                stage: "ensemble",
                reason: format!("frequency {i_freq} already consumed or out of range"),
            })
    }
}

/// Ensemble source backed by an on-disk [`BlockCache`].
pub struct CachedEnsemble {
    cache: BlockCache,
    rank: usize,
    n_space: usize,
}

impl CachedEnsemble {
    /// Reload ensembles from `cache` as written by `rank`.
    pub fn new(cache: BlockCache, rank: usize, n_space: usize) -> Self {
        Self {
            cache,
            rank,
            n_space,
        }
    }
}

impl EnsembleSource for CachedEnsemble {
    fn n_freq(&self) -> usize {
        self.cache.n_freq()
    }

    fn produce(&mut self, i_freq: usize) -> Result<Array2<Complex64>, SpodError> {
        let n_blocks = self.cache.n_blocks();
        let mut q = Array2::zeros((self.n_space, n_blocks));
        for i_blk in 0..n_blocks {
            let v = self.cache.load(i_blk, i_freq, self.rank)?;
            if v.len() != self.n_space {
                return Err(SpodError::Numerical {
                    stage: "ensemble",
                    reason: format!(
                        "cached block {i_blk} at frequency {i_freq} holds {} values, expected {}",
                        v.len(),
                        self.n_space
                    ),
                });
            }
            q.column_mut(i_blk).assign(&v);
        }
        Ok(q)
    }
}
