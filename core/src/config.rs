use crate::figure::ColorTable;
use crate::prelude::{StageError, StageResult};
use crate::processing::window::WindowType;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Butterworth bandpass applied to every trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub low_cut: f64,
    pub high_cut: f64,
    pub order: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            low_cut: 0.5,
            high_cut: 15.0,
            order: 2,
        }
    }
}

/// Short-time Fourier transform parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrogramConfig {
    pub window_type: WindowType,
    pub window_size: usize,
    pub overlap: usize,
    pub nfft: usize,
}

impl Default for SpectrogramConfig {
    fn default() -> Self {
        Self {
            window_type: WindowType::Hann,
            window_size: 256,
            overlap: 192,
            nfft: 1024,
        }
    }
}

impl SpectrogramConfig {
    pub fn validate(&self) -> StageResult<()> {
        if self.window_size < 2 {
            return Err(StageError::InvalidParameter(format!(
                "window size {} is too small",
                self.window_size
            )));
        }
        if self.overlap >= self.window_size {
            return Err(StageError::InvalidParameter(format!(
                "overlap {} must be smaller than window size {}",
                self.overlap, self.window_size
            )));
        }
        if self.nfft < self.window_size {
            return Err(StageError::InvalidParameter(format!(
                "FFT size {} is smaller than window size {}",
                self.nfft, self.window_size
            )));
        }
        Ok(())
    }
}

/// Frequency band shown on the spectrogram axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub min_freq: f64,
    pub max_freq: f64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            min_freq: 0.0,
            max_freq: 10.0,
        }
    }
}

impl DisplayConfig {
    pub fn validate(&self) -> StageResult<()> {
        if !(self.min_freq < self.max_freq) || self.min_freq < 0.0 {
            return Err(StageError::InvalidParameter(format!(
                "frequency range {}..{} is empty",
                self.min_freq, self.max_freq
            )));
        }
        Ok(())
    }
}

/// Immutable settings shared by every location pipeline in a run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub filter: FilterConfig,
    pub spectrogram: SpectrogramConfig,
    pub display: DisplayConfig,
    pub colors: ColorTable,
    pub csv_dir: PathBuf,
}

impl PipelineConfig {
    pub fn validate(&self) -> StageResult<()> {
        self.spectrogram.validate()?;
        self.display.validate()?;
        if self.filter.order == 0 {
            return Err(StageError::InvalidParameter("filter order must be positive".into()));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            filter: FilterConfig::default(),
            spectrogram: SpectrogramConfig::default(),
            display: DisplayConfig::default(),
            colors: ColorTable::default(),
            csv_dir: PathBuf::from("CSVFiles"),
        }
    }
}
