use num_complex::Complex64;
use rustfft::{num_traits::Zero, Fft, FftPlanner};
use std::sync::Arc;

/// Wraps a planned forward `rustfft` transform for repeated use on real segments.
pub struct FftHelper {
    fft: Arc<dyn Fft<f64>>,
    buffer: Vec<Complex64>,
    scratch: Vec<Complex64>,
}

impl FftHelper {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let scratch = vec![Complex64::zero(); fft.get_inplace_scratch_len()];
        Self {
            fft,
            buffer: vec![Complex64::zero(); size],
            scratch,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Transforms `input`, zero-padded or truncated to the planned size.
    pub fn forward(&mut self, input: &[f64]) -> &[Complex64] {
        let padded = input.iter().copied().chain(std::iter::repeat(0.0));
        for (slot, value) in self.buffer.iter_mut().zip(padded) {
            *slot = Complex64::new(value, 0.0);
        }
        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);
        &self.buffer
    }
}
