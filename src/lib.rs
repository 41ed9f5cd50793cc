//! Spectral Proper Orthogonal Decomposition (SPOD) of long time series of
//! spatial snapshots.
//!
//! SPOD segments a time series into overlapping blocks (Welch-style), applies
//! a windowed DFT to each block, and for every frequency bin eigendecomposes
//! the weighted cross-spectral density matrix of the block ensemble. The
//! result is a set of energy-ranked spatial modes per frequency, persisted to
//! disk, together with an eigenvalue spectrum and chi-squared confidence
//! bounds.
//!
//! The engine is built for datasets too large to hold fully in memory:
//!
//! - an on-disk block cache lets repeated analyses skip the DFT stage
//!   ([`spod::cache::BlockCache`]),
//! - ensembles can be streamed from disk one frequency at a time
//!   ([`spod::ensemble::CachedEnsemble`]),
//! - the spatial domain can be partitioned across cooperating SPMD ranks
//!   that all-reduce the reduced CSD matrix ([`comm::Communicator`]).
//!
//! # Example
//!
//! ```no_run
//! use spod_rs::kernel::KernelLifecycle;
//! use spod_rs::spod::engine::{SpodConfig, SpodKernel};
//! use ndarray::Array2;
//!
//! // 1024 snapshots of a 64-point field, flattened time-major.
//! let data = Array2::<f64>::zeros((1024, 64));
//! let config = SpodConfig {
//!     n_dft: 128,
//!     overlap: 50.0,
//!     savedir: "spod_results".into(),
//!     ..SpodConfig::default()
//! };
//! let spod = SpodKernel::try_new(config).unwrap();
//! let result = spod.fit(&data, None).unwrap();
//! let modes = result.modes_at_frequency(result.find_nearest_freq(0.05)).unwrap();
//! # let _ = modes;
//! ```

#![warn(missing_docs)]

pub mod comm;
pub mod error;
pub mod kernel;
pub mod spod;
pub mod stats;
pub mod storage;

pub use crate::error::SpodError;
pub use crate::spod::dft::MeanType;
pub use crate::spod::engine::{EnsembleStrategy, SpodConfig, SpodKernel, SpodResult};
pub use crate::spod::window::WindowShape;
