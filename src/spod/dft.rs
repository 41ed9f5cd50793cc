//! Windowed block DFT: one Fourier-coefficient column per block.
//!
//! Mirrors Welch-style spectral estimation: slice a block out of the time
//! series, remove a mean, optionally normalize by the pointwise temporal
//! variance, window, transform along time, and keep the non-negative
//! frequency bins with a one-sided energy correction.

use crate::error::SpodError;
use crate::kernel::KernelLifecycle;
use crate::spod::plan::BlockPlan;
use crate::spod::source::SnapshotSource;
use crate::spod::window::{window_weight, WindowShape};
use log::debug;
use ndarray::{Array1, Array2, Axis};
use num_complex::Complex64;
use num_traits::Zero;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Mean-removal policy applied before windowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeanType {
    /// Subtract the mean over all `nt` snapshots, computed once before
    /// blocking.
    #[default]
    Longtime,
    /// Subtract each block's own temporal mean.
    Blockwise,
    /// Subtract nothing.
    Zero,
}

/// Constructor config for [`BlockDftKernel`].
#[derive(Debug, Clone)]
pub struct BlockDftConfig {
    /// Block layout over the time axis.
    pub plan: BlockPlan,
    /// Analysis window family.
    pub window: WindowShape,
    /// Mean-removal policy.
    pub mean_type: MeanType,
    /// Divide each block by its pointwise temporal variance.
    pub normalize_data: bool,
    /// Retain all `n_dft` bins without one-sided correction.
    pub fullspectrum: bool,
    /// Whether the underlying data is real-valued (enables the one-sided
    /// energy correction).
    pub is_real: bool,
}

/// Windowed DFT stage for one fit run.
pub struct BlockDftKernel {
    plan: BlockPlan,
    window: Vec<f64>,
    scale: f64,
    mean_type: MeanType,
    normalize_data: bool,
    fullspectrum: bool,
    is_real: bool,
    fft: Arc<dyn Fft<f64>>,
}

impl KernelLifecycle for BlockDftKernel {
    type Config = BlockDftConfig;

    fn try_new(config: Self::Config) -> Result<Self, SpodError> {
        let n_dft = config.plan.n_dft();
        let window = config.window.samples(n_dft);
        let scale = window_weight(&window) / n_dft as f64;
        let fft = FftPlanner::new().plan_fft_forward(n_dft);
        Ok(Self {
            plan: config.plan,
            window,
            scale,
            mean_type: config.mean_type,
            normalize_data: config.normalize_data,
            fullspectrum: config.fullspectrum,
            is_real: config.is_real,
            fft,
        })
    }
}

impl BlockDftKernel {
    /// Block layout this kernel was built for.
    pub fn plan(&self) -> &BlockPlan {
        &self.plan
    }

    /// Number of retained frequency bins.
    pub fn n_freq(&self) -> usize {
        if self.fullspectrum {
            self.plan.n_dft()
        } else {
            self.plan.n_freq_onesided()
        }
    }

    /// Long-time mean over all snapshots, fetched in block-sized strides so
    /// the full series never has to be resident.
    pub fn longtime_mean<S>(&self, source: &S) -> Result<Array1<f64>, SpodError>
    where
        S: SnapshotSource + ?Sized,
    {
        let nt = source.n_snapshots();
        let mut mean = Array1::<f64>::zeros(source.n_space());
        let stride = self.plan.n_dft();
        let mut t = 0;
        while t < nt {
            let t_end = (t + stride).min(nt);
            let chunk = source.fetch(t, t_end)?;
            mean += &chunk.sum_axis(Axis(0));
            t = t_end;
        }
        mean /= nt as f64;
        Ok(mean)
    }

    /// Per-frequency coefficient matrix (`n_freq x n_space`) for block
    /// `i_blk`. `t_mean` is the captured long-time mean (ignored unless the
    /// policy is [`MeanType::Longtime`]).
    pub fn compute_block<S>(
        &self,
        source: &S,
        i_blk: usize,
        t_mean: &Array1<f64>,
    ) -> Result<Array2<Complex64>, SpodError>
    where
        S: SnapshotSource + ?Sized,
    {
        let n_dft = self.plan.n_dft();
        let offset = self.plan.offset(i_blk);
        let mut block = source.fetch(offset, offset + n_dft)?;
        debug!(
            "block {}/{} ({}:{})",
            i_blk + 1,
            self.plan.n_blocks(),
            offset,
            offset + n_dft
        );

        match self.mean_type {
            MeanType::Longtime => block -= t_mean,
            MeanType::Blockwise => {
                let mean = block.sum_axis(Axis(0)) / n_dft as f64;
                block -= &mean;
            }
            MeanType::Zero => {}
        }

        if self.normalize_data {
            let mean = block.sum_axis(Axis(0)) / n_dft as f64;
            let centered = &block - &mean;
            let mut var =
                centered.mapv(|v| v * v).sum_axis(Axis(0)) / (n_dft as f64 - 1.0);
            // Degenerate variance is substituted, never surfaced.
            var.mapv_inplace(|v| if v < 4.0 * f64::EPSILON { 1.0 } else { v });
            block /= &var;
        }

        for (t, mut row) in block.outer_iter_mut().enumerate() {
            row *= self.window[t] * self.scale;
        }

        let n_keep = self.n_freq();
        let n_space = block.ncols();
        let mut coeffs = Array2::<Complex64>::zeros((n_keep, n_space));
        let mut buf = vec![Complex64::zero(); n_dft];
        for (j, col) in block.axis_iter(Axis(1)).enumerate() {
            for (slot, v) in buf.iter_mut().zip(col.iter()) {
                *slot = Complex64::new(*v, 0.0);
            }
            self.fft.process(&mut buf);
            for k in 0..n_keep {
                coeffs[[k, j]] = buf[k];
            }
        }

        if self.is_real && !self.fullspectrum {
            // Fold the negative-frequency half into the retained bins: every
            // bin doubles except DC and, for even n_dft, Nyquist.
            let nyquist = if n_dft % 2 == 0 { Some(n_keep - 1) } else { None };
            for k in 1..n_keep {
                if Some(k) == nyquist {
                    continue;
                }
                for j in 0..n_space {
                    coeffs[[k, j]] *= 2.0;
                }
            }
        }

        Ok(coeffs)
    }
}
