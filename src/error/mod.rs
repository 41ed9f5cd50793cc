//! Error taxonomy shared by every SPOD stage.

use core::fmt;
use std::path::{Path, PathBuf};

/// Errors raised while fitting or querying a SPOD decomposition.
#[derive(Debug)]
pub enum SpodError {
    /// Invalid configuration or input shape; raised before any computation
    /// proceeds and never retried.
    Configuration {
        /// Name of the offending argument.
        arg: &'static str,
        /// Human readable reason.
        reason: String,
    },
    /// Non-convergent eigendecomposition or non-finite numerical output.
    Numerical {
        /// Stage that produced the failure.
        stage: &'static str,
        /// Human readable reason.
        reason: String,
    },
    /// Cache or mode artifact unreadable or unwritable.
    Storage {
        /// Artifact path involved in the failure.
        path: PathBuf,
        /// Human readable reason.
        reason: String,
    },
    /// Rank/partition mismatch or failed collective; aborts the entire fit.
    Distribution {
        /// Human readable reason.
        reason: String,
    },
}

impl SpodError {
    pub(crate) fn storage(path: &Path, reason: impl fmt::Display) -> Self {
        SpodError::Storage {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for SpodError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpodError::Configuration { arg, reason } => {
                write!(f, "Invalid configuration `{arg}`: {reason}")
            }
            SpodError::Numerical { stage, reason } => {
                write!(f, "Numerical failure in {stage}: {reason}")
            }
            SpodError::Storage { path, reason } => {
                write!(f, "Storage failure at `{}`: {reason}", path.display())
            }
            SpodError::Distribution { reason } => {
                write!(f, "Distribution failure: {reason}")
            }
        }
    }
}

impl std::error::Error for SpodError {}
