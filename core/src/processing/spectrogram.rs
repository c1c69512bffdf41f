use crate::config::SpectrogramConfig;
use crate::math::fft::FftHelper;
use crate::math::stats::StatsHelper;
use crate::prelude::{StageError, StageResult, WaveformTrace};
use ndarray::Array2;

/// Time/frequency power estimate of one trace.
#[derive(Debug, Clone)]
pub struct SpectrogramResult {
    /// Bin frequencies in Hz, ascending.
    pub frequencies: Vec<f64>,
    /// Segment centres in seconds from the trace start.
    pub offsets: Vec<f64>,
    /// Segment centres in epoch seconds.
    pub times: Vec<f64>,
    /// Linear power spectral density, `[frequency, time]`.
    pub power: Array2<f64>,
}

impl SpectrogramResult {
    /// `20·log10(|power|)`, the scale the figure colours are normalised on.
    pub fn to_decibels(&self) -> Array2<f64> {
        self.power.mapv(|value| 20.0 * value.abs().log10())
    }
}

/// Windowed short-time Fourier transform with per-segment mean removal and
/// one-sided density scaling.
pub struct SpectrogramEngine {
    config: SpectrogramConfig,
    window: Vec<f64>,
    fft: FftHelper,
}

impl SpectrogramEngine {
    pub fn new(config: &SpectrogramConfig) -> StageResult<Self> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
            window: config.window_type.coefficients(config.window_size),
            fft: FftHelper::new(config.nfft),
        })
    }

    pub fn window_size(&self) -> usize {
        self.config.window_size
    }

    pub fn compute(&mut self, trace: &WaveformTrace, sample_rate: f64) -> StageResult<SpectrogramResult> {
        if !(sample_rate > 0.0 && sample_rate.is_finite()) {
            return Err(StageError::InvalidParameter(format!(
                "sample rate {sample_rate} is not usable"
            )));
        }
        let segment = self.config.window_size;
        if trace.len() < segment {
            return Err(StageError::InvalidInput(format!(
                "{} samples on {} is shorter than the {} sample window",
                trace.len(),
                trace.channel,
                segment
            )));
        }

        let step = segment - self.config.overlap;
        let segments = (trace.len() - self.config.overlap) / step;
        let nfft = self.fft.len();
        let bins = nfft / 2 + 1;

        let window_power: f64 = self.window.iter().map(|w| w * w).sum();
        let scale = 1.0 / (sample_rate * window_power);

        let frequencies = (0..bins)
            .map(|k| k as f64 * sample_rate / nfft as f64)
            .collect();
        let offsets: Vec<f64> = (0..segments)
            .map(|s| (segment as f64 / 2.0 + (s * step) as f64) / sample_rate)
            .collect();
        let start = trace.start_seconds();
        let times = offsets.iter().map(|offset| start + offset).collect();

        let mut power = Array2::zeros((bins, segments));
        let mut tapered = vec![0.0; segment];
        for s in 0..segments {
            let chunk = &trace.samples[s * step..s * step + segment];
            let mean = StatsHelper::mean(chunk);
            for ((slot, &value), &weight) in tapered.iter_mut().zip(chunk).zip(&self.window) {
                *slot = (value - mean) * weight;
            }
            let spectrum = self.fft.forward(&tapered);
            for k in 0..bins {
                let mut density = spectrum[k].norm_sqr() * scale;
                let nyquist_bin = nfft % 2 == 0 && k == bins - 1;
                if k != 0 && !nyquist_bin {
                    density *= 2.0;
                }
                power[[k, s]] = density;
            }
        }

        Ok(SpectrogramResult {
            frequencies,
            offsets,
            times,
            power,
        })
    }
}
