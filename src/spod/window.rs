//! Analysis windows applied to each block before the DFT.

/// Window family applied to each block.
///
/// Windows are sampled symmetrically, matching `numpy`'s window generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowShape {
    /// Uniform (boxcar) window.
    #[default]
    Boxcar,
    /// Hamming window.
    Hamming,
    /// Hann window.
    Hann,
}

impl WindowShape {
    /// Sample the window at length `n`.
    pub fn samples(&self, n: usize) -> Vec<f64> {
        if n == 0 {
            return Vec::new();
        }
        if n == 1 {
            return vec![1.0];
        }
        let nm1 = (n - 1) as f64;
        match self {
            WindowShape::Boxcar => vec![1.0; n],
            WindowShape::Hamming => (0..n)
                .map(|i| {
                    0.54 - 0.46 * (2.0 * core::f64::consts::PI * i as f64 / nm1).cos()
                })
                .collect(),
            WindowShape::Hann => (0..n)
                .map(|i| 0.5 - 0.5 * (2.0 * core::f64::consts::PI * i as f64 / nm1).cos())
                .collect(),
        }
    }
}

/// Energy-correction weight `n / sum(window)` for a sampled window.
///
/// Applied to every Fourier coefficient so that windowed and unwindowed
/// spectra carry comparable energy.
pub fn window_weight(window: &[f64]) -> f64 {
    let sum: f64 = window.iter().sum();
    if sum > 0.0 {
        window.len() as f64 / sum
    } else {
        1.0
    }
}
