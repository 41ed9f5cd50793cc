//! Chi-squared confidence bounds for block-averaged energy spectra.

use crate::error::SpodError;
use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Multiplicative (lower, upper) factors bounding a block-averaged energy
/// estimate at `conf_level`, for a chi-squared statistic with `2 * n_blocks`
/// degrees of freedom.
///
/// The lower bound of an eigenvalue `E` is `E * factors.0` and the upper
/// bound `E * factors.1`.
pub fn confidence_factors(n_blocks: usize, conf_level: f64) -> Result<(f64, f64), SpodError> {
    if n_blocks == 0 {
        return Err(SpodError::Configuration {
            arg: "n_blocks",
            reason: "at least one block is required".into(),
        });
    }
    if !conf_level.is_finite() || conf_level <= 0.0 || conf_level >= 1.0 {
        return Err(SpodError::Configuration {
            arg: "conf_level",
            reason: format!("confidence level must lie in (0, 1), got {conf_level}"),
        });
    }
    let dof = 2.0 * n_blocks as f64;
    let chi2 = ChiSquared::new(dof).map_err(|err| SpodError::Numerical {
        stage: "confidence bounds",
        reason: err.to_string(),
    })?;
    let xi2_lower = chi2.inverse_cdf(conf_level);
    let xi2_upper = chi2.inverse_cdf(1.0 - conf_level);
    Ok((dof / xi2_lower, dof / xi2_upper))
}
