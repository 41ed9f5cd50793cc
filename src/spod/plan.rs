//! Block planning: segmentation of `nt` snapshots into overlapping blocks.

use crate::error::SpodError;

/// Welch-style segmentation of a time axis into overlapping blocks of length
/// `n_dft`.
///
/// Blocks are laid out with stride `n_dft - n_overlap`; offsets are clamped
/// so no block runs past the final snapshot, and every block has exactly
/// `n_dft` samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockPlan {
    nt: usize,
    n_dft: usize,
    n_overlap: usize,
    n_blocks: usize,
}

impl BlockPlan {
    /// Derive the block layout for `nt` snapshots with `overlap_pct` percent
    /// overlap between consecutive blocks.
    pub fn try_new(nt: usize, n_dft: usize, overlap_pct: f64) -> Result<Self, SpodError> {
        if n_dft < 4 {
            return Err(SpodError::Configuration {
                arg: "n_dft",
                reason: format!("block length must be at least 4 snapshots, got {n_dft}"),
            });
        }
        if n_dft > nt {
            return Err(SpodError::Configuration {
                arg: "n_dft",
                reason: format!("block length {n_dft} exceeds {nt} available snapshots"),
            });
        }
        if !overlap_pct.is_finite() || !(0.0..100.0).contains(&overlap_pct) {
            return Err(SpodError::Configuration {
                arg: "overlap",
                reason: format!("overlap must lie in [0, 100) percent, got {overlap_pct}"),
            });
        }
        let n_overlap = (overlap_pct / 100.0 * n_dft as f64).ceil() as usize;
        if n_overlap >= n_dft {
            return Err(SpodError::Configuration {
                arg: "overlap",
                reason: format!("overlap of {n_overlap} snapshots must be smaller than n_dft {n_dft}"),
            });
        }
        let n_blocks = ((nt - n_overlap) / (n_dft - n_overlap)).max(1);
        Ok(Self {
            nt,
            n_dft,
            n_overlap,
            n_blocks,
        })
    }

    /// Total number of snapshots covered by the plan.
    pub fn nt(&self) -> usize {
        self.nt
    }

    /// Block length in snapshots.
    pub fn n_dft(&self) -> usize {
        self.n_dft
    }

    /// Overlap between consecutive blocks, in snapshots.
    pub fn n_overlap(&self) -> usize {
        self.n_overlap
    }

    /// Number of blocks in the plan.
    pub fn n_blocks(&self) -> usize {
        self.n_blocks
    }

    /// Start offset of block `i_blk`.
    pub fn offset(&self, i_blk: usize) -> usize {
        (i_blk * (self.n_dft - self.n_overlap) + self.n_dft).min(self.nt) - self.n_dft
    }

    /// Number of retained non-negative frequency bins.
    pub fn n_freq_onesided(&self) -> usize {
        self.n_dft / 2 + 1
    }

    /// Frequency axis in physical units for sampling interval `dt`.
    ///
    /// One-sided by default; with `fullspectrum` all `n_dft` bins are kept
    /// and bins above Nyquist hold the wrapped negative frequencies.
    pub fn freq_axis(&self, dt: f64, fullspectrum: bool) -> Vec<f64> {
        let bins = if fullspectrum {
            self.n_dft
        } else {
            self.n_freq_onesided()
        };
        (0..bins)
            .map(|k| k as f64 / dt / self.n_dft as f64)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::BlockPlan;
    use crate::error::SpodError;

    #[test]
    fn blocks_cover_the_series_end_to_end() {
        for (nt, n_dft, overlap) in [(1000usize, 64usize, 50.0), (256, 64, 50.0), (100, 100, 0.0), (257, 32, 25.0)] {
            let plan = BlockPlan::try_new(nt, n_dft, overlap).expect("valid plan");
            assert!(plan.n_blocks() >= 1);
            assert_eq!(plan.offset(0), 0, "first block starts at 0");
            for i in 1..plan.n_blocks() {
                assert!(plan.offset(i) > plan.offset(i - 1));
                assert!(plan.offset(i) + n_dft <= nt, "no block overruns nt");
            }
            // Uncovered tail, if any, is shorter than one stride.
            let last_end = plan.offset(plan.n_blocks() - 1) + n_dft;
            assert!(nt - last_end < n_dft - plan.n_overlap());
        }
    }

    #[test]
    fn block_count_matches_welch_formula() {
        let plan = BlockPlan::try_new(1000, 64, 50.0).expect("valid plan");
        assert_eq!(plan.n_overlap(), 32);
        assert_eq!(plan.n_blocks(), (1000 - 32) / (64 - 32));
    }

    #[test]
    fn oversized_block_is_rejected() {
        let err = BlockPlan::try_new(32, 64, 0.0).expect_err("n_dft > nt");
        assert!(matches!(err, SpodError::Configuration { arg: "n_dft", .. }));
    }

    #[test]
    fn full_overlap_is_rejected() {
        let err = BlockPlan::try_new(256, 64, 100.0).expect_err("overlap >= n_dft");
        assert!(matches!(err, SpodError::Configuration { arg: "overlap", .. }));
    }

    #[test]
    fn frequency_axis_spacing_is_bin_width() {
        let plan = BlockPlan::try_new(256, 64, 50.0).expect("valid plan");
        let freq = plan.freq_axis(0.5, false);
        assert_eq!(freq.len(), 33);
        assert_eq!(freq[0], 0.0);
        assert!((freq[1] - 1.0 / 0.5 / 64.0).abs() < 1e-15);

        let full = plan.freq_axis(0.5, true);
        assert_eq!(full.len(), 64);
    }
}
