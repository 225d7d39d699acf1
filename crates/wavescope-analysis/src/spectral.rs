//! Fixed-window stereo spectral transform.

use std::sync::Arc;

use anyhow::{Result, ensure};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

/// Stereo real-to-complex FFT of a fixed window size.
///
/// Callers fill the two input channels through [`inputs_mut`], call
/// [`execute`], then read the non-redundant output bins (DC through Nyquist,
/// `N/2 + 1` values per channel). The transform is unnormalized, so bin
/// magnitudes match what an FFTW-style r2c transform reports.
///
/// [`inputs_mut`]: SpectralAnalyzer::inputs_mut
/// [`execute`]: SpectralAnalyzer::execute
pub struct SpectralAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    window_size: usize,
    input_left: Vec<f32>,
    input_right: Vec<f32>,
    work_left: Vec<Complex<f32>>,
    work_right: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl SpectralAnalyzer {
    /// Plan the transform for `window_size` input samples per channel.
    ///
    /// Power-of-two sizes plan fastest but are not required for correctness.
    pub fn new(window_size: usize) -> Result<Self> {
        ensure!(window_size != 0, "spectral window size must be non-zero");

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(window_size);
        let scratch = vec![Complex::default(); fft.get_inplace_scratch_len()];

        Ok(Self {
            fft,
            window_size,
            input_left: vec![0.0; window_size],
            input_right: vec![0.0; window_size],
            work_left: vec![Complex::default(); window_size],
            work_right: vec![Complex::default(); window_size],
            scratch,
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Mutable access to both input channels at once (de-interleave target).
    pub fn inputs_mut(&mut self) -> (&mut [f32], &mut [f32]) {
        (&mut self.input_left, &mut self.input_right)
    }

    pub fn input_left(&self) -> &[f32] {
        &self.input_left
    }

    pub fn input_right(&self) -> &[f32] {
        &self.input_right
    }

    /// Run the forward transform on whatever is currently in the inputs.
    ///
    /// Synchronous and deterministic; allocation-free after construction.
    pub fn execute(&mut self) {
        for (dst, &src) in self.work_left.iter_mut().zip(&self.input_left) {
            *dst = Complex::new(src, 0.0);
        }
        for (dst, &src) in self.work_right.iter_mut().zip(&self.input_right) {
            *dst = Complex::new(src, 0.0);
        }

        self.fft
            .process_with_scratch(&mut self.work_left, &mut self.scratch);
        self.fft
            .process_with_scratch(&mut self.work_right, &mut self.scratch);
    }

    /// Non-redundant left-channel bins (DC through Nyquist) from the last
    /// [`execute`](SpectralAnalyzer::execute).
    pub fn output_left(&self) -> &[Complex<f32>] {
        &self.work_left[..self.window_size / 2 + 1]
    }

    /// Non-redundant right-channel bins (DC through Nyquist).
    pub fn output_right(&self) -> &[Complex<f32>] {
        &self.work_right[..self.window_size / 2 + 1]
    }
}
