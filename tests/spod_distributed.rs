use ndarray::{s, Array2};
use spod_rs::comm::{partition, Communicator, ThreadComm};
use spod_rs::kernel::KernelLifecycle;
use spod_rs::spod::engine::{SpodConfig, SpodKernel};
use spod_rs::{MeanType, SpodError};

fn synthetic_field(nt: usize, n_space: usize) -> Array2<f64> {
    Array2::from_shape_fn((nt, n_space), |(t, x)| {
        let amp = 1.0 + (x as f64 / n_space as f64);
        let phase = 2.0 * std::f64::consts::PI * t as f64;
        amp * (phase * 0.05).sin() + 0.1 * (phase * 0.17 + 2.0 * x as f64).cos()
    })
}

fn config(savedir: &std::path::Path) -> SpodConfig {
    SpodConfig {
        n_dft: 64,
        overlap: 50.0,
        mean_type: MeanType::Longtime,
        n_modes_save: 2,
        savedir: savedir.to_path_buf(),
        ..SpodConfig::default()
    }
}

#[test]
fn partition_slices_tile_the_spatial_extent() {
    let n_space = 11;
    let size = 3;
    let mut total = 0;
    let mut next_start = 0;
    for rank in 0..size {
        let slice = partition(n_space, size, rank).expect("partition");
        assert_eq!(slice.start, next_start);
        next_start = slice.end;
        total += slice.len();
    }
    assert_eq!(total, n_space);
}

#[test]
fn three_rank_fit_reproduces_the_serial_spectrum() {
    let nt = 512;
    let n_space = 11;
    let data = synthetic_field(nt, n_space);

    let serial_dir = tempfile::tempdir().expect("tempdir");
    let serial = SpodKernel::try_new(config(serial_dir.path()))
        .expect("config")
        .fit(&data, None)
        .expect("serial fit");

    let team_dir = tempfile::tempdir().expect("tempdir");
    let team = ThreadComm::split(3);
    let spectra: Vec<Array2<f64>> = std::thread::scope(|scope| {
        let mut handles = Vec::new();
        for comm in team {
            let slice = partition(n_space, 3, comm.rank()).expect("partition");
            let local = data.slice(s![.., slice]).to_owned();
            let cfg = config(team_dir.path());
            handles.push(scope.spawn(move || {
                let spod = SpodKernel::try_new(cfg).expect("config");
                let result = spod
                    .fit_with_comm(&local, None, &comm)
                    .expect("distributed fit");
                result.eigenvalues().to_owned()
            }));
        }
        handles
            .into_iter()
            .map(|h| h.join().expect("rank thread"))
            .collect()
    });

    for spectrum in &spectra {
        assert_eq!(spectrum.dim(), serial.eigenvalues().dim());
        let max_diff = spectrum
            .iter()
            .zip(serial.eigenvalues().iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f64, f64::max);
        assert!(
            max_diff < 1e-8,
            "distributed spectrum drifted from serial by {max_diff}"
        );
    }
}

#[test]
fn rank_local_storage_failure_aborts_the_whole_team() {
    let nt = 256;
    let n_space = 6;
    let data = synthetic_field(nt, n_space);

    let dir = tempfile::tempdir().expect("tempdir");
    // Rank 1's savedir nests under a plain file, so its first mode write
    // fails with a Storage error.
    let blocked = dir.path().join("blocked");
    std::fs::write(&blocked, b"not a directory").expect("marker file");

    let team = ThreadComm::split(2);
    let errors: Vec<SpodError> = std::thread::scope(|scope| {
        let mut handles = Vec::new();
        for comm in team {
            let slice = partition(n_space, 2, comm.rank()).expect("partition");
            let local = data.slice(s![.., slice]).to_owned();
            let savedir = if comm.rank() == 0 {
                dir.path().join("healthy")
            } else {
                blocked.join("nested")
            };
            let cfg = config(&savedir);
            handles.push(scope.spawn(move || {
                let spod = SpodKernel::try_new(cfg).expect("config");
                spod.fit_with_comm(&local, None, &comm)
                    .expect_err("the whole team must abort")
            }));
        }
        handles
            .into_iter()
            .map(|h| h.join().expect("rank thread"))
            .collect()
    });

    assert!(
        errors.iter().any(|e| matches!(e, SpodError::Storage { .. })),
        "the failing rank reports the local storage error"
    );
    assert!(
        errors.iter().any(|e| matches!(e, SpodError::Distribution { .. })),
        "the healthy rank fails its next collective instead of hanging"
    );
}

#[test]
fn weight_normalization_matches_serial_in_a_team_run() {
    let nt = 512;
    let n_space = 11;
    let data = synthetic_field(nt, n_space);

    let serial_dir = tempfile::tempdir().expect("tempdir");
    let serial = SpodKernel::try_new(SpodConfig {
        normalize_weights: true,
        ..config(serial_dir.path())
    })
    .expect("config")
    .fit(&data, None)
    .expect("serial fit");

    let team_dir = tempfile::tempdir().expect("tempdir");
    let team = ThreadComm::split(3);
    let spectra: Vec<Array2<f64>> = std::thread::scope(|scope| {
        let mut handles = Vec::new();
        for comm in team {
            let slice = partition(n_space, 3, comm.rank()).expect("partition");
            let local = data.slice(s![.., slice]).to_owned();
            let cfg = SpodConfig {
                normalize_weights: true,
                ..config(team_dir.path())
            };
            handles.push(scope.spawn(move || {
                let spod = SpodKernel::try_new(cfg).expect("config");
                let result = spod
                    .fit_with_comm(&local, None, &comm)
                    .expect("distributed fit");
                result.eigenvalues().to_owned()
            }));
        }
        handles
            .into_iter()
            .map(|h| h.join().expect("rank thread"))
            .collect()
    });

    for spectrum in &spectra {
        let max_diff = spectrum
            .iter()
            .zip(serial.eigenvalues().iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f64, f64::max);
        assert!(
            max_diff < 1e-8,
            "normalized team spectrum drifted from serial by {max_diff}"
        );
    }
}

#[test]
fn every_rank_persists_its_own_mode_slice() {
    let nt = 256;
    let n_space = 9;
    let data = synthetic_field(nt, n_space);

    let dir = tempfile::tempdir().expect("tempdir");
    let team = ThreadComm::split(3);
    let dims: Vec<(usize, usize)> = std::thread::scope(|scope| {
        let mut handles = Vec::new();
        for comm in team {
            let slice = partition(n_space, 3, comm.rank()).expect("partition");
            let local = data.slice(s![.., slice]).to_owned();
            let cfg = config(dir.path());
            handles.push(scope.spawn(move || {
                let spod = SpodKernel::try_new(cfg).expect("config");
                let result = spod
                    .fit_with_comm(&local, None, &comm)
                    .expect("distributed fit");
                let phi = result.modes_at_frequency(3).expect("rank-local modes");
                phi.dim()
            }));
        }
        handles
            .into_iter()
            .map(|h| h.join().expect("rank thread"))
            .collect()
    });

    for (rank, dim) in dims.iter().enumerate() {
        let expected = partition(n_space, 3, rank).expect("partition").len();
        assert_eq!(*dim, (expected, 2));
    }
}
