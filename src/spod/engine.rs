//! End-to-end SPOD fit orchestration.

use crate::comm::{Communicator, SerialComm};
use crate::error::SpodError;
use crate::kernel::KernelLifecycle;
use crate::spod::cache::BlockCache;
use crate::spod::csd;
use crate::spod::dft::{BlockDftConfig, BlockDftKernel, MeanType};
use crate::spod::ensemble::{CachedEnsemble, EnsembleSource, ResidentEnsemble};
use crate::spod::plan::BlockPlan;
use crate::spod::source::SnapshotSource;
use crate::spod::window::WindowShape;
use crate::{stats, storage};
use log::info;
use ndarray::{Array1, Array2, Axis};
use num_complex::Complex64;
use std::path::{Path, PathBuf};

/// Where per-frequency block ensembles live between the DFT and CSD phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnsembleStrategy {
    /// Keep every frequency's ensemble in memory.
    #[default]
    Resident,
    /// Stream ensembles from the on-disk block cache, one frequency at a
    /// time.
    Cached,
}

/// Fit configuration.
#[derive(Debug, Clone)]
pub struct SpodConfig {
    /// Sampling interval between consecutive snapshots.
    pub time_step: f64,
    /// Block length in snapshots.
    pub n_dft: usize,
    /// Overlap between consecutive blocks, in percent of `n_dft`.
    pub overlap: f64,
    /// Mean-removal policy.
    pub mean_type: MeanType,
    /// Analysis window family.
    pub window: WindowShape,
    /// Divide each block by its pointwise temporal variance.
    pub normalize_data: bool,
    /// Divide each variable's weights by that variable's long-time variance.
    pub normalize_weights: bool,
    /// Number of interleaved variables per spatial point.
    pub n_variables: usize,
    /// Leading modes persisted per frequency.
    pub n_modes_save: usize,
    /// Confidence level for the eigenvalue bounds.
    pub conf_level: f64,
    /// Retain all `n_dft` bins instead of the one-sided half.
    pub fullspectrum: bool,
    /// Reuse a complete block cache from a previous fit over the same data.
    pub reuse_blocks: bool,
    /// Ensemble residency between the DFT and CSD phases.
    pub ensemble: EnsembleStrategy,
    /// Spatial dimensions of one snapshot, recorded in the persisted mode
    /// artifacts. Empty means the layout is flat; when set, its product times
    /// `n_variables` is checked against the flattened extent in single-rank
    /// fits.
    pub spatial_shape: Vec<usize>,
    /// Output directory for modes and cached blocks.
    pub savedir: PathBuf,
}

impl Default for SpodConfig {
    fn default() -> Self {
        Self {
            time_step: 1.0,
            n_dft: 256,
            overlap: 50.0,
            mean_type: MeanType::default(),
            window: WindowShape::default(),
            normalize_data: false,
            normalize_weights: false,
            n_variables: 1,
            n_modes_save: 8,
            conf_level: 0.95,
            fullspectrum: false,
            reuse_blocks: false,
            ensemble: EnsembleStrategy::default(),
            spatial_shape: Vec::new(),
            savedir: PathBuf::from("spod_results"),
        }
    }
}

/// Validated SPOD fit kernel.
///
/// Constructed once per configuration; [`SpodKernel::fit`] may be called any
/// number of times against different sources.
#[derive(Debug, Clone)]
pub struct SpodKernel {
    config: SpodConfig,
}

impl KernelLifecycle for SpodKernel {
    type Config = SpodConfig;

    fn try_new(config: Self::Config) -> Result<Self, SpodError> {
        if !config.time_step.is_finite() || config.time_step <= 0.0 {
            return Err(SpodError::Configuration {
                arg: "time_step",
                reason: format!(
                    "sampling interval must be positive and finite, got {}",
                    config.time_step
                ),
            });
        }
        if config.n_variables == 0 {
            return Err(SpodError::Configuration {
                arg: "n_variables",
                reason: "at least one variable is required".into(),
            });
        }
        if config.n_modes_save == 0 {
            return Err(SpodError::Configuration {
                arg: "n_modes_save",
                reason: "at least one mode must be kept per frequency".into(),
            });
        }
        if !config.conf_level.is_finite()
            || config.conf_level <= 0.0
            || config.conf_level >= 1.0
        {
            return Err(SpodError::Configuration {
                arg: "conf_level",
                reason: format!(
                    "confidence level must lie in (0, 1), got {}",
                    config.conf_level
                ),
            });
        }
        Ok(Self { config })
    }
}

impl SpodKernel {
    /// The validated configuration.
    pub fn config(&self) -> &SpodConfig {
        &self.config
    }

    /// Fit on a single rank. `weights` defaults to uniform weights over the
    /// flattened spatial extent.
    ///
    /// Snapshots are real-valued; the one-sided spectrum correction relies on
    /// the conjugate symmetry of their transforms. Complex-valued series are
    /// not supported.
    pub fn fit<S>(
        &self,
        source: &S,
        weights: Option<Array1<f64>>,
    ) -> Result<SpodResult, SpodError>
    where
        S: SnapshotSource + ?Sized,
    {
        self.fit_with_comm(source, weights, &SerialComm)
    }

    /// Fit as one rank of a cooperating team.
    ///
    /// `source` and `weights` cover only this rank's contiguous slice of the
    /// flattened spatial extent (see [`crate::comm::partition`]); with more
    /// than one variable the slice boundaries must fall on variable
    /// boundaries. Every rank must use the same configuration. Modes are
    /// persisted per rank, and every rank returns the identical eigenvalue
    /// spectrum.
    ///
    /// A rank that fails locally aborts the whole team: its teammates'
    /// pending collectives return a `Distribution` error instead of waiting
    /// for a contribution that will never come.
    pub fn fit_with_comm<S, C>(
        &self,
        source: &S,
        weights: Option<Array1<f64>>,
        comm: &C,
    ) -> Result<SpodResult, SpodError>
    where
        S: SnapshotSource + ?Sized,
        C: Communicator,
    {
        let outcome = self.fit_inner(source, weights, comm);
        if let Err(err) = &outcome {
            comm.abort(&err.to_string());
        }
        outcome
    }

    fn fit_inner<S, C>(
        &self,
        source: &S,
        weights: Option<Array1<f64>>,
        comm: &C,
    ) -> Result<SpodResult, SpodError>
    where
        S: SnapshotSource + ?Sized,
        C: Communicator,
    {
        let cfg = &self.config;
        let nt = source.n_snapshots();
        let n_space = source.n_space();
        let rank = comm.rank();

        let plan = BlockPlan::try_new(nt, cfg.n_dft, cfg.overlap)?;

        if n_space % cfg.n_variables != 0 {
            return Err(SpodError::Configuration {
                arg: "n_variables",
                reason: format!(
                    "flattened spatial extent {n_space} is not divisible by {} variables",
                    cfg.n_variables
                ),
            });
        }
        if !cfg.spatial_shape.is_empty() && comm.size() == 1 {
            let points: usize = cfg.spatial_shape.iter().product();
            if points * cfg.n_variables != n_space {
                return Err(SpodError::Configuration {
                    arg: "spatial_shape",
                    reason: format!(
                        "shape {:?} with {} variables does not flatten to {n_space} values",
                        cfg.spatial_shape, cfg.n_variables
                    ),
                });
            }
        }
        let mut weights = match weights {
            Some(w) => {
                if w.len() != n_space {
                    return Err(SpodError::Configuration {
                        arg: "weights",
                        reason: format!(
                            "{} weights do not match the {n_space}-point flattened grid",
                            w.len()
                        ),
                    });
                }
                w
            }
            None => Array1::ones(n_space),
        };

        let dft = BlockDftKernel::try_new(BlockDftConfig {
            plan: plan.clone(),
            window: cfg.window,
            mean_type: cfg.mean_type,
            normalize_data: cfg.normalize_data,
            fullspectrum: cfg.fullspectrum,
            is_real: true,
        })?;
        let n_freq = dft.n_freq();
        let n_blocks = plan.n_blocks();

        info!(
            "fit: nt={nt} n_space={n_space} n_dft={} n_overlap={} n_blocks={n_blocks} \
             n_freq={n_freq} rank={rank}/{}",
            plan.n_dft(),
            plan.n_overlap(),
            comm.size()
        );

        let t_mean = match cfg.mean_type {
            MeanType::Longtime => dft.longtime_mean(source)?,
            MeanType::Blockwise | MeanType::Zero => Array1::zeros(n_space),
        };
        if cfg.normalize_weights {
            apply_weight_normalization(source, &mut weights, cfg.n_variables, plan.n_dft(), comm)?;
        }

        let cache = BlockCache::new(cfg.savedir.join("blocks"), n_blocks, n_freq);
        let write_cache =
            matches!(cfg.ensemble, EnsembleStrategy::Cached) || cfg.reuse_blocks;
        let resume = cfg.reuse_blocks && cache.is_complete(rank);

        let mut ensemble: Box<dyn EnsembleSource> = if resume {
            info!("fit: complete block cache found, skipping the DFT phase");
            Box::new(CachedEnsemble::new(cache.clone(), rank, n_space))
        } else {
            let mut resident = match cfg.ensemble {
                EnsembleStrategy::Resident => {
                    Some(ResidentEnsemble::new(n_freq, n_space, n_blocks))
                }
                EnsembleStrategy::Cached => None,
            };
            for i_blk in 0..n_blocks {
                let coeffs = dft.compute_block(source, i_blk, &t_mean)?;
                if write_cache {
                    for (i_freq, row) in coeffs.rows().into_iter().enumerate() {
                        cache.store(i_blk, i_freq, rank, row)?;
                    }
                }
                if let Some(resident) = resident.as_mut() {
                    resident.insert_block(i_blk, coeffs.view())?;
                }
            }
            match resident {
                Some(resident) => Box::new(resident),
                None => Box::new(CachedEnsemble::new(cache.clone(), rank, n_space)),
            }
        };

        comm.barrier()?;

        let modes_dir = cfg.savedir.join("modes");
        let row_shape: Vec<usize> = if !cfg.spatial_shape.is_empty() && comm.size() == 1 {
            let mut shape = cfg.spatial_shape.clone();
            if cfg.n_variables > 1 {
                shape.push(cfg.n_variables);
            }
            shape
        } else {
            vec![n_space]
        };
        let (lower_factor, upper_factor) = stats::confidence_factors(n_blocks, cfg.conf_level)?;
        let n_keep = cfg.n_modes_save.min(n_blocks);

        let mut eigenvalues = Array2::<f64>::zeros((n_freq, n_blocks));
        let mut eigs_lower = Array2::<f64>::zeros((n_freq, n_blocks));
        let mut eigs_upper = Array2::<f64>::zeros((n_freq, n_blocks));

        for i_freq in 0..n_freq {
            let q = ensemble.produce(i_freq)?;
            let mut m = csd::gram_matrix(q.view(), weights.view());
            let buf = m.as_slice_mut().ok_or_else(|| SpodError::Numerical {
                stage: "all-reduce",
                reason: "cross-spectral density matrix is not contiguous".into(),
            })?;
            comm.all_reduce_sum(buf)?;

            let (vals, vecs) = csd::eigen_descending(&m)?;
            let phi = csd::spatial_modes(q.view(), &vecs, &vals, n_keep);
            storage::save_matrix_shaped(
                &mode_path(&modes_dir, i_freq, rank),
                phi.view(),
                &row_shape,
            )?;

            let energy = csd::eigenvalue_energies(&vals);
            eigs_lower.row_mut(i_freq).assign(&(&energy * lower_factor));
            eigs_upper.row_mut(i_freq).assign(&(&energy * upper_factor));
            eigenvalues.row_mut(i_freq).assign(&energy);
        }

        let mean_complex = t_mean.mapv(|v| Complex64::new(v, 0.0));
        storage::save_vector(&mean_path(&cfg.savedir, rank), mean_complex.view())?;
        comm.barrier()?;
        info!("fit: done, modes under {}", modes_dir.display());

        Ok(SpodResult {
            freq: Array1::from_vec(plan.freq_axis(cfg.time_step, cfg.fullspectrum)),
            eigenvalues,
            eigs_lower,
            eigs_upper,
            time_mean: t_mean,
            modes_dir,
            rank,
            n_modes_save: n_keep,
            spatial_shape: cfg.spatial_shape.clone(),
        })
    }
}

fn mode_path(modes_dir: &Path, i_freq: usize, rank: usize) -> PathBuf {
    modes_dir.join(format!("freq_idx_{i_freq:08}_rank{rank:04}.blob"))
}

fn mean_path(savedir: &Path, rank: usize) -> PathBuf {
    savedir.join(format!("time_mean_rank{rank:04}.blob"))
}

/// Divide each variable's weights by that variable's long-time variance,
/// leaving near-constant variables untouched. In a team run the per-variable
/// moments are summed across ranks first, so every rank normalizes against
/// the global variance.
fn apply_weight_normalization<S, C>(
    source: &S,
    weights: &mut Array1<f64>,
    n_variables: usize,
    stride: usize,
    comm: &C,
) -> Result<(), SpodError>
where
    S: SnapshotSource + ?Sized,
    C: Communicator,
{
    let nt = source.n_snapshots();
    let n_space = source.n_space();

    let mut sum = vec![0.0f64; n_variables];
    let mut sum_sq = vec![0.0f64; n_variables];
    let mut t = 0;
    while t < nt {
        let t_end = (t + stride).min(nt);
        let chunk = source.fetch(t, t_end)?;
        for row in chunk.axis_iter(Axis(0)) {
            for (j, v) in row.iter().enumerate() {
                let var_idx = j % n_variables;
                sum[var_idx] += *v;
                sum_sq[var_idx] += *v * *v;
            }
        }
        t = t_end;
    }

    // One reduction carries (sum, sum_sq) per variable plus the sample count.
    let mut moments: Vec<Complex64> = sum
        .iter()
        .zip(sum_sq.iter())
        .map(|(s, sq)| Complex64::new(*s, *sq))
        .collect();
    moments.push(Complex64::new((nt * (n_space / n_variables)) as f64, 0.0));
    comm.all_reduce_sum(&mut moments)?;
    let count = moments[n_variables].re;

    for (j, w) in weights.iter_mut().enumerate() {
        let var_idx = j % n_variables;
        let mean = moments[var_idx].re / count;
        let variance = (moments[var_idx].im / count - mean * mean).max(0.0);
        if variance > 4.0 * f64::EPSILON {
            *w /= variance;
        }
    }
    Ok(())
}

/// Outcome of one fit: eigenvalue spectrum, confidence bounds, and handles to
/// the persisted per-frequency modes.
#[derive(Debug, Clone)]
pub struct SpodResult {
    freq: Array1<f64>,
    eigenvalues: Array2<f64>,
    eigs_lower: Array2<f64>,
    eigs_upper: Array2<f64>,
    time_mean: Array1<f64>,
    modes_dir: PathBuf,
    rank: usize,
    n_modes_save: usize,
    spatial_shape: Vec<usize>,
}

impl SpodResult {
    /// Frequency axis in physical units, one entry per retained bin.
    pub fn freq(&self) -> &Array1<f64> {
        &self.freq
    }

    /// Eigenvalue energies, `n_freq x n_blocks`, descending along each row.
    pub fn eigenvalues(&self) -> &Array2<f64> {
        &self.eigenvalues
    }

    /// Lower and upper chi-squared confidence bounds on [`Self::eigenvalues`].
    pub fn confidence_interval(&self) -> (&Array2<f64>, &Array2<f64>) {
        (&self.eigs_lower, &self.eigs_upper)
    }

    /// Long-time mean captured during the fit (this rank's spatial slice).
    pub fn time_mean(&self) -> &Array1<f64> {
        &self.time_mean
    }

    /// Directory holding the persisted mode artifacts.
    pub fn modes_dir(&self) -> &Path {
        &self.modes_dir
    }

    /// Number of modes persisted per frequency.
    pub fn n_modes_save(&self) -> usize {
        self.n_modes_save
    }

    /// Spatial dimensions recorded at fit time; empty when the layout is
    /// flat.
    pub fn spatial_shape(&self) -> &[usize] {
        &self.spatial_shape
    }

    /// Path of this rank's persisted mode artifact at frequency bin
    /// `freq_idx`. The artifact's stored shape carries the spatial layout
    /// (see [`crate::storage::artifact_shape`]).
    pub fn mode_artifact(&self, freq_idx: usize) -> PathBuf {
        mode_path(&self.modes_dir, freq_idx, self.rank)
    }

    /// Load this rank's persisted modes at frequency bin `freq_idx`
    /// (`n_space x n_modes_save`).
    pub fn modes_at_frequency(&self, freq_idx: usize) -> Result<Array2<Complex64>, SpodError> {
        if freq_idx >= self.freq.len() {
            return Err(SpodError::Configuration {
                arg: "freq_idx",
                reason: format!(
                    "frequency index {freq_idx} is out of range for {} bins",
                    self.freq.len()
                ),
            });
        }
        storage::load_matrix(&mode_path(&self.modes_dir, freq_idx, self.rank))
    }

    /// Index of the frequency bin closest to `target`.
    pub fn find_nearest_freq(&self, target: f64) -> usize {
        let mut best = 0;
        let mut best_dist = f64::INFINITY;
        for (k, f) in self.freq.iter().enumerate() {
            let dist = (f - target).abs();
            if dist < best_dist {
                best = k;
                best_dist = dist;
            }
        }
        best
    }
}
