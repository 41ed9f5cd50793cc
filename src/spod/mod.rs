//! The SPOD computation engine.
//!
//! Stages, leaf-first: [`plan`] segments the time axis into overlapping
//! blocks, [`dft`] turns each block into per-frequency Fourier coefficients,
//! [`cache`] persists those coefficients for out-of-core and resumed runs,
//! [`ensemble`] hands per-frequency block ensembles to the weighted CSD
//! eigendecomposition, and [`engine`] orchestrates a fit end to end.
//! [`project`] projects held-out data onto persisted modes and reconstructs
//! approximate data from coefficients.

pub mod cache;
mod csd;
pub mod dft;
pub mod engine;
pub mod ensemble;
pub mod plan;
pub mod project;
pub mod source;
pub mod window;
