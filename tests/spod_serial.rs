use ndarray::Array2;
use spod_rs::kernel::KernelLifecycle;
use spod_rs::spod::engine::{EnsembleStrategy, SpodConfig, SpodKernel};
use spod_rs::MeanType;

const F0: f64 = 0.05;

/// Rank-one oscillating field with a smooth spatial amplitude and a weak
/// secondary tone, deterministic across runs.
fn synthetic_field(nt: usize, n_space: usize) -> Array2<f64> {
    Array2::from_shape_fn((nt, n_space), |(t, x)| {
        let amp = 1.0 + (x as f64 / n_space as f64);
        let phase = 2.0 * std::f64::consts::PI * t as f64;
        amp * (phase * F0).sin() + 0.05 * (phase * 0.21 + x as f64).cos()
    })
}

fn base_config(savedir: &std::path::Path) -> SpodConfig {
    SpodConfig {
        n_dft: 64,
        overlap: 50.0,
        mean_type: MeanType::Longtime,
        n_modes_save: 3,
        savedir: savedir.to_path_buf(),
        ..SpodConfig::default()
    }
}

#[test]
fn eigenvalues_are_nonnegative_and_descending_per_frequency() {
    let dir = tempfile::tempdir().expect("tempdir");
    let spod = SpodKernel::try_new(base_config(dir.path())).expect("config");
    let data = synthetic_field(512, 12);
    let result = spod.fit(&data, None).expect("fit");

    assert_eq!(result.eigenvalues().nrows(), 33);
    for row in result.eigenvalues().rows() {
        for pair in row.as_slice().expect("contiguous row").windows(2) {
            assert!(pair[0] >= pair[1], "eigenvalues must be sorted descending");
        }
        for e in row {
            assert!(*e >= -1e-10);
        }
    }
}

#[test]
fn dominant_energy_sits_at_the_driving_frequency() {
    let dir = tempfile::tempdir().expect("tempdir");
    let spod = SpodKernel::try_new(base_config(dir.path())).expect("config");
    let data = synthetic_field(512, 12);
    let result = spod.fit(&data, None).expect("fit");

    let (peak, _) = result
        .eigenvalues()
        .rows()
        .into_iter()
        .map(|row| row[0])
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(&b.1).expect("finite eigenvalues"))
        .expect("non-empty spectrum");
    let bin_width = 1.0 / 64.0;
    assert!((result.freq()[peak] - F0).abs() <= bin_width);
    assert_eq!(result.find_nearest_freq(F0), peak);
}

#[test]
fn confidence_bounds_bracket_each_eigenvalue() {
    let dir = tempfile::tempdir().expect("tempdir");
    let spod = SpodKernel::try_new(base_config(dir.path())).expect("config");
    let data = synthetic_field(512, 8);
    let result = spod.fit(&data, None).expect("fit");

    let (lower, upper) = result.confidence_interval();
    for ((e, lo), hi) in result
        .eigenvalues()
        .iter()
        .zip(lower.iter())
        .zip(upper.iter())
    {
        assert!(*lo <= *e + 1e-12);
        assert!(*hi >= *e - 1e-12);
    }
}

#[test]
fn persisted_modes_have_the_configured_shape() {
    let dir = tempfile::tempdir().expect("tempdir");
    let spod = SpodKernel::try_new(base_config(dir.path())).expect("config");
    let data = synthetic_field(512, 12);
    let result = spod.fit(&data, None).expect("fit");

    for freq_idx in [0, 5, 32] {
        let phi = result.modes_at_frequency(freq_idx).expect("persisted modes");
        assert_eq!(phi.dim(), (12, 3));
        assert!(phi.iter().all(|c| c.re.is_finite() && c.im.is_finite()));
    }
    assert!(result.modes_at_frequency(33).is_err());
}

#[test]
fn resumed_fit_from_a_complete_cache_matches_the_fresh_fit() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data = synthetic_field(512, 6);

    let fresh = SpodKernel::try_new(SpodConfig {
        ensemble: EnsembleStrategy::Cached,
        ..base_config(dir.path())
    })
    .expect("config");
    let first = fresh.fit(&data, None).expect("fresh fit");

    let resumed = SpodKernel::try_new(SpodConfig {
        ensemble: EnsembleStrategy::Cached,
        reuse_blocks: true,
        ..base_config(dir.path())
    })
    .expect("config");
    let second = resumed.fit(&data, None).expect("resumed fit");

    let max_eig_diff = first
        .eigenvalues()
        .iter()
        .zip(second.eigenvalues().iter())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0f64, f64::max);
    assert!(max_eig_diff < 1e-10, "eigenvalues drifted by {max_eig_diff}");

    for freq_idx in 0..first.freq().len() {
        let a = first.modes_at_frequency(freq_idx).expect("fresh modes");
        let b = second.modes_at_frequency(freq_idx).expect("resumed modes");
        let max_diff = a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y).norm())
            .fold(0.0f64, f64::max);
        assert!(max_diff < 1e-10, "modes drifted by {max_diff} at bin {freq_idx}");
    }
}

#[test]
fn fullspectrum_keeps_every_bin() {
    let dir = tempfile::tempdir().expect("tempdir");
    let spod = SpodKernel::try_new(SpodConfig {
        fullspectrum: true,
        ..base_config(dir.path())
    })
    .expect("config");
    let data = synthetic_field(512, 4);
    let result = spod.fit(&data, None).expect("fit");
    assert_eq!(result.freq().len(), 64);
    assert_eq!(result.eigenvalues().nrows(), 64);
}

#[test]
fn zero_noise_tone_round_trips_through_fitted_modes() {
    use spod_rs::spod::project::{project, reconstruct};

    let dir = tempfile::tempdir().expect("tempdir");
    // Keep every available mode so the fitted basis spans the whole
    // ensemble.
    let spod = SpodKernel::try_new(SpodConfig {
        n_modes_save: 64,
        ..base_config(dir.path())
    })
    .expect("config");

    // Rank-one zero-noise field: one spatial profile times one tone.
    let nt = 256;
    let n_space = 12;
    let data = Array2::from_shape_fn((nt, n_space), |(t, x)| {
        (1.0 + x as f64 / n_space as f64)
            * (2.0 * std::f64::consts::PI * F0 * t as f64).sin()
    });
    let result = spod.fit(&data, None).expect("fit");
    assert_eq!(result.n_modes_save(), result.eigenvalues().ncols());

    let peak = result.find_nearest_freq(F0);
    let phi = result.modes_at_frequency(peak).expect("modes");
    let mean = result.time_mean();

    let coeffs = project(data.view(), phi.view(), mean.view()).expect("project");
    let rebuilt = reconstruct(coeffs.view(), phi.view(), mean.view()).expect("reconstruct");

    let num: f64 = (&rebuilt - &data).iter().map(|v| v * v).sum::<f64>().sqrt();
    let den: f64 = (&data - mean).iter().map(|v| v * v).sum::<f64>().sqrt();
    assert!(
        num / den < 1e-6,
        "mean-removed relative reconstruction error {} exceeds 1e-6",
        num / den
    );
}

#[test]
fn projection_of_the_training_data_reconstructs_it_at_the_mode_level() {
    use spod_rs::spod::project::{project, reconstruct};

    let dir = tempfile::tempdir().expect("tempdir");
    let spod = SpodKernel::try_new(base_config(dir.path())).expect("config");
    let data = synthetic_field(512, 12);
    let result = spod.fit(&data, None).expect("fit");

    let peak = result.find_nearest_freq(F0);
    let phi = result.modes_at_frequency(peak).expect("modes");
    let mean = result.time_mean();

    let coeffs = project(data.view(), phi.view(), mean.view()).expect("project");
    assert_eq!(coeffs.dim(), (3, 512));
    let rebuilt = reconstruct(coeffs.view(), phi.view(), mean.view()).expect("reconstruct");
    assert_eq!(rebuilt.dim(), data.dim());
}
