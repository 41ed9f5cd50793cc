//! Shared trait-first kernel substrate.
//!
//! Kernels validate their configuration once, at construction, so that every
//! later `fit`/`run` entrypoint can assume a consistent setup.

use crate::error::SpodError;

/// Constructor validation lifecycle shared by kernel structs.
pub trait KernelLifecycle: Sized {
    /// Kernel config type.
    type Config;

    /// Construct a validated kernel from config.
    fn try_new(config: Self::Config) -> Result<Self, SpodError>;
}
