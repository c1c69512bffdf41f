use crate::config::FilterConfig;
use crate::math::stats::StatsHelper;
use crate::prelude::{StageError, StageResult, WaveformTrace};
use crate::processing::filter::ButterworthFilter;

/// Turns raw counts into a filtered, amplitude-normalised, zero-mean trace.
///
/// Steps run in a fixed order: linear detrend, zero-phase bandpass, division
/// by the integer calibration scale, then mean removal so the filter
/// transient cannot leave a DC offset behind.
pub struct Preprocessor {
    filter: FilterConfig,
}

impl Preprocessor {
    pub fn new(filter: FilterConfig) -> Self {
        Self { filter }
    }

    pub fn apply(&self, trace: &mut WaveformTrace, scale: i64) -> StageResult<()> {
        if trace.is_empty() {
            return Err(StageError::InvalidInput(format!(
                "channel {} has no samples",
                trace.channel
            )));
        }
        if scale == 0 {
            return Err(StageError::InvalidInput(format!(
                "channel {} has a zero scale factor",
                trace.channel
            )));
        }

        detrend(&mut trace.samples);
        let filter = ButterworthFilter::design(&self.filter, trace.sample_rate)?;
        filter.filter_zero_phase(&mut trace.samples);
        rescale(&mut trace.samples, scale as f64);
        remove_mean(&mut trace.samples);
        Ok(())
    }
}

/// Subtracts the least-squares line.
pub fn detrend(samples: &mut [f64]) {
    let (slope, intercept) = StatsHelper::linear_fit(samples);
    for (index, sample) in samples.iter_mut().enumerate() {
        *sample -= intercept + slope * index as f64;
    }
}

pub fn rescale(samples: &mut [f64], scale: f64) {
    for sample in samples.iter_mut() {
        *sample /= scale;
    }
}

pub fn remove_mean(samples: &mut [f64]) {
    let mean = StatsHelper::mean(samples);
    for sample in samples.iter_mut() {
        *sample -= mean;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::f64::consts::PI;

    fn raw_trace() -> WaveformTrace {
        let samples = (0..3000)
            .map(|i| {
                let t = i as f64 / 50.0;
                4000.0 + 12.0 * t + 800.0 * (2.0 * PI * 2.0 * t).sin()
            })
            .collect();
        let start = Utc.with_ymd_and_hms(2021, 6, 3, 14, 39, 50).unwrap();
        WaveformTrace::new("BHZ", samples, 50.0, start)
    }

    #[test]
    fn detrend_removes_line() {
        let mut samples: Vec<f64> = (0..100).map(|i| 2.0 * i as f64 + 5.0).collect();
        detrend(&mut samples);
        assert!(samples.iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn output_is_zero_mean_and_scaled() {
        let preprocessor = Preprocessor::new(FilterConfig::default());
        let mut trace = raw_trace();
        preprocessor.apply(&mut trace, 400_000_000).unwrap();
        assert_eq!(trace.len(), 3000);
        assert!(StatsHelper::mean(&trace.samples).abs() < 1e-15);
        let rms = StatsHelper::rms(&trace.samples[500..2500]);
        let expected = 800.0 / 400_000_000.0 / 2.0_f64.sqrt();
        assert!((rms - expected).abs() / expected < 0.05, "rms {rms}");
    }

    #[test]
    fn scaling_is_linear_and_reversible() {
        let preprocessor = Preprocessor::new(FilterConfig::default());
        let mut unit = raw_trace();
        preprocessor.apply(&mut unit, 1).unwrap();
        let scale = 123_456_789_i64;
        let mut scaled = raw_trace();
        preprocessor.apply(&mut scaled, scale).unwrap();
        for (a, b) in unit.samples.iter().zip(&scaled.samples) {
            assert!((b * scale as f64 - a).abs() <= 1e-9 * a.abs().max(1.0));
        }
    }

    #[test]
    fn rescale_round_trips() {
        let original = vec![1.5, -2.25, 1e-3, 8e5];
        let mut samples = original.clone();
        rescale(&mut samples, 987_654.0);
        for (value, expected) in samples.iter().zip(&original) {
            assert!((value * 987_654.0 - expected).abs() <= 1e-12 * expected.abs().max(1.0));
        }
    }

    #[test]
    fn zero_scale_is_rejected() {
        let preprocessor = Preprocessor::new(FilterConfig::default());
        let mut trace = raw_trace();
        assert!(preprocessor.apply(&mut trace, 0).is_err());
    }
}
