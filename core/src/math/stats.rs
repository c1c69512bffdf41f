pub struct StatsHelper;

impl StatsHelper {
    pub fn rms(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = samples.iter().map(|&v| v * v).sum();
        (sum_sq / samples.len() as f64).sqrt()
    }

    pub fn mean(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<f64>() / samples.len() as f64
    }

    /// Least-squares `(slope, intercept)` of the samples against their index.
    pub fn linear_fit(samples: &[f64]) -> (f64, f64) {
        let n = samples.len();
        if n < 2 {
            return (0.0, Self::mean(samples));
        }
        let x_mean = (n - 1) as f64 / 2.0;
        let y_mean = Self::mean(samples);
        let (mut sxx, mut sxy) = (0.0, 0.0);
        for (index, &value) in samples.iter().enumerate() {
            let dx = index as f64 - x_mean;
            sxx += dx * dx;
            sxy += dx * (value - y_mean);
        }
        let slope = sxy / sxx;
        (slope, y_mean - slope * x_mean)
    }
}
