use crate::config::FilterConfig;
use crate::prelude::{StageError, StageResult};
use log::warn;
use num_complex::Complex64;
use std::f64::consts::PI;

/// Second-order section `(b0 + b1 z^-1 + b2 z^-2) / (1 + a1 z^-1 + a2 z^-2)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    pub b: [f64; 3],
    pub a: [f64; 2],
}

impl Biquad {
    fn response(&self, z: Complex64) -> Complex64 {
        let zi = z.inv();
        let zi2 = zi * zi;
        (self.b[0] + zi * self.b[1] + zi2 * self.b[2]) / (1.0 + zi * self.a[0] + zi2 * self.a[1])
    }

    fn run(&self, samples: &mut [f64]) {
        let [b0, b1, b2] = self.b;
        let [a1, a2] = self.a;
        let (mut z1, mut z2) = (0.0, 0.0);
        for sample in samples.iter_mut() {
            let input = *sample;
            let output = b0 * input + z1;
            z1 = b1 * input - a1 * output + z2;
            z2 = b2 * input - a2 * output;
            *sample = output;
        }
    }
}

/// Digital Butterworth filter designed through the bilinear transform and
/// stored as cascaded second-order sections.
#[derive(Debug, Clone)]
pub struct ButterworthFilter {
    sections: Vec<Biquad>,
}

impl ButterworthFilter {
    /// Bandpass for the configured cutoffs, degrading to a high-pass when the
    /// upper corner reaches Nyquist.
    pub fn design(config: &FilterConfig, sample_rate: f64) -> StageResult<Self> {
        let nyquist = sample_rate / 2.0;
        if config.high_cut >= nyquist {
            warn!(
                "high corner {} Hz is at or above Nyquist ({} Hz), applying a high-pass instead",
                config.high_cut, nyquist
            );
            return Self::highpass(config.order, config.low_cut, sample_rate);
        }
        Self::bandpass(config.order, config.low_cut, config.high_cut, sample_rate)
    }

    pub fn bandpass(order: usize, low: f64, high: f64, sample_rate: f64) -> StageResult<Self> {
        check_rate(order, sample_rate)?;
        if !(low > 0.0 && low < high && high < sample_rate / 2.0) {
            return Err(StageError::InvalidParameter(format!(
                "bandpass corners {low}..{high} Hz invalid for {sample_rate} Hz sampling"
            )));
        }
        let fs2 = 2.0 * sample_rate;
        let w1 = prewarp(low, sample_rate);
        let w2 = prewarp(high, sample_rate);
        let centre = (w1 * w2).sqrt();
        let bandwidth = w2 - w1;

        let mut poles = Vec::with_capacity(2 * order);
        for prototype in prototype_poles(order) {
            let half = prototype * (bandwidth / 2.0);
            let offset = (half * half - centre * centre).sqrt();
            poles.push(bilinear(half + offset, fs2));
            poles.push(bilinear(half - offset, fs2));
        }

        // Each section carries one zero at DC and one at Nyquist.
        let mut filter = Self {
            sections: pair_poles(&poles, [1.0, 0.0, -1.0], [1.0, -1.0, 0.0]),
        };
        let centre_digital = 2.0 * (centre / fs2).atan();
        filter.normalize(Complex64::from_polar(1.0, centre_digital));
        Ok(filter)
    }

    pub fn highpass(order: usize, cutoff: f64, sample_rate: f64) -> StageResult<Self> {
        check_rate(order, sample_rate)?;
        if !(cutoff > 0.0 && cutoff < sample_rate / 2.0) {
            return Err(StageError::InvalidParameter(format!(
                "high-pass corner {cutoff} Hz invalid for {sample_rate} Hz sampling"
            )));
        }
        let fs2 = 2.0 * sample_rate;
        let corner = prewarp(cutoff, sample_rate);
        let poles: Vec<Complex64> = prototype_poles(order)
            .map(|prototype| bilinear(corner / prototype, fs2))
            .collect();

        let mut filter = Self {
            sections: pair_poles(&poles, [1.0, -2.0, 1.0], [1.0, -1.0, 0.0]),
        };
        filter.normalize(Complex64::new(-1.0, 0.0));
        Ok(filter)
    }

    pub fn sections(&self) -> &[Biquad] {
        &self.sections
    }

    /// Magnitude response at `frequency`.
    pub fn gain_at(&self, frequency: f64, sample_rate: f64) -> f64 {
        let z = Complex64::from_polar(1.0, 2.0 * PI * frequency / sample_rate);
        self.response(z).norm()
    }

    /// Single forward pass, zero initial state.
    pub fn filter(&self, samples: &mut [f64]) {
        for section in &self.sections {
            section.run(samples);
        }
    }

    /// Forward then backward pass; cancels the phase shift.
    pub fn filter_zero_phase(&self, samples: &mut [f64]) {
        self.filter(samples);
        samples.reverse();
        self.filter(samples);
        samples.reverse();
    }

    fn response(&self, z: Complex64) -> Complex64 {
        self.sections
            .iter()
            .fold(Complex64::new(1.0, 0.0), |acc, section| acc * section.response(z))
    }

    fn normalize(&mut self, z: Complex64) {
        let gain = self.response(z).norm();
        if gain > 0.0 && gain.is_finite() {
            if let Some(first) = self.sections.first_mut() {
                for coefficient in first.b.iter_mut() {
                    *coefficient /= gain;
                }
            }
        }
    }
}

fn check_rate(order: usize, sample_rate: f64) -> StageResult<()> {
    if order == 0 {
        return Err(StageError::InvalidParameter("filter order must be positive".into()));
    }
    if !(sample_rate > 0.0 && sample_rate.is_finite()) {
        return Err(StageError::InvalidParameter(format!(
            "sample rate {sample_rate} is not usable"
        )));
    }
    Ok(())
}

fn prewarp(frequency: f64, sample_rate: f64) -> f64 {
    2.0 * sample_rate * (PI * frequency / sample_rate).tan()
}

fn bilinear(pole: Complex64, fs2: f64) -> Complex64 {
    (fs2 + pole) / (fs2 - pole)
}

/// Left half-plane poles of the analog lowpass prototype.
fn prototype_poles(order: usize) -> impl Iterator<Item = Complex64> {
    (0..order).map(move |k| {
        let theta = PI * (2 * k + 1 + order) as f64 / (2 * order) as f64;
        Complex64::from_polar(1.0, theta)
    })
}

/// Groups conjugate pairs and leftover real poles into sections. `pair_b` is
/// the numerator of a two-pole section, `single_b` of a one-pole section.
fn pair_poles(poles: &[Complex64], pair_b: [f64; 3], single_b: [f64; 3]) -> Vec<Biquad> {
    const IMAG_TOLERANCE: f64 = 1e-10;
    let mut sections = Vec::new();
    let mut real = Vec::new();
    for pole in poles {
        if pole.im > IMAG_TOLERANCE {
            sections.push(Biquad {
                b: pair_b,
                a: [-2.0 * pole.re, pole.norm_sqr()],
            });
        } else if pole.im.abs() <= IMAG_TOLERANCE {
            real.push(pole.re);
        }
    }
    real.sort_by(|a, b| a.total_cmp(b));
    for chunk in real.chunks(2) {
        match chunk {
            [first, second] => sections.push(Biquad {
                b: pair_b,
                a: [-(first + second), first * second],
            }),
            [single] => sections.push(Biquad {
                b: single_b,
                a: [-single, 0.0],
            }),
            _ => {}
        }
    }
    sections
}
