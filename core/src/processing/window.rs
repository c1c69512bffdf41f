use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Taper applied to each spectrogram segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowType {
    #[serde(alias = "hanning")]
    Hann,
    Hamming,
    Blackman,
    Bartlett,
    #[serde(alias = "rectangular")]
    Boxcar,
}

impl WindowType {
    /// Periodic (DFT-even) coefficients of length `size`.
    pub fn coefficients(self, size: usize) -> Vec<f64> {
        if size <= 1 {
            return vec![1.0; size];
        }
        let span = size as f64;
        (0..size)
            .map(|n| {
                let phase = 2.0 * PI * n as f64 / span;
                match self {
                    Self::Hann => 0.5 - 0.5 * phase.cos(),
                    Self::Hamming => 0.54 - 0.46 * phase.cos(),
                    Self::Blackman => 0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos(),
                    Self::Bartlett => 1.0 - (2.0 * n as f64 / span - 1.0).abs(),
                    Self::Boxcar => 1.0,
                }
            })
            .collect()
    }
}
