//! Windowed FFT producing a normalized magnitude spectrum

use super::frame::{AudioFrame, SpectrumBuffer};
use realfft::RealFftPlanner;
use rustfft::num_complex::Complex;
use std::collections::HashMap;
use thiserror::Error;

/// Spectral transform errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("Frame too short for a spectrum: {len} samples (need at least 2)")]
    FrameTooShort { len: usize },

    #[error("FFT failed: {0}")]
    Fft(String),
}

/// Converts one captured frame into one spectrum
pub trait Transformer {
    fn transform(&mut self, frame: &AudioFrame) -> Result<SpectrumBuffer, TransformError>;
}

/// Power-of-two transform size for a frame of `frame_count` samples.
///
/// Rounds `log2(frame_count)` to the nearest integer, so the size may land
/// below the frame length (surplus samples are ignored) or above it (the
/// tail is zero-padded).
pub fn fft_size_for(frame_count: usize) -> usize {
    let log2n = (frame_count as f64).log2().round() as u32;
    1usize << log2n
}

/// Periodic Hann window, `w[n] = 0.5 * (1 - cos(2πn / size))`
fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let phase = 2.0 * std::f64::consts::PI * i as f64 / size as f64;
            (0.5 * (1.0 - phase.cos())) as f32
        })
        .collect()
}

/// Hann-windowed real FFT with `2 / inputCount` magnitude normalization.
///
/// A sinusoid of amplitude `A` sitting exactly on bin `k` comes out as `A`
/// in bin `k`. The transformer keeps its plans, windows and scratch buffers
/// between calls; nothing it owns is shared with the returned spectrum.
/// Use one transformer per thread.
pub struct SpectralTransformer {
    planner: RealFftPlanner<f32>,
    windows: HashMap<usize, Vec<f32>>,
    transfer: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl SpectralTransformer {
    pub fn new() -> Self {
        Self {
            planner: RealFftPlanner::new(),
            windows: HashMap::new(),
            transfer: Vec::new(),
            spectrum: Vec::new(),
            scratch: Vec::new(),
        }
    }

    /// Transform raw mono samples. `sample_rate` is only recorded on the
    /// spectrum for bin-to-frequency mapping.
    pub fn transform_samples(
        &mut self,
        samples: &[f32],
        sample_rate: Option<u32>,
    ) -> Result<SpectrumBuffer, TransformError> {
        let frame_count = samples.len();
        if frame_count < 2 {
            return Err(TransformError::FrameTooShort { len: frame_count });
        }

        let size_pot = fft_size_for(frame_count);
        let input_count = size_pot / 2;

        let window = self
            .windows
            .entry(size_pot)
            .or_insert_with(|| hann_window(size_pot));

        // Window into the transfer buffer, zero past the end of the frame
        self.transfer.clear();
        self.transfer.extend(
            window
                .iter()
                .enumerate()
                .map(|(i, &w)| samples.get(i).copied().unwrap_or(0.0) * w),
        );

        let fft = self.planner.plan_fft_forward(size_pot);
        self.spectrum.resize(input_count + 1, Complex::default());
        self.scratch.resize(fft.get_scratch_len(), Complex::default());
        fft.process_with_scratch(&mut self.transfer, &mut self.spectrum, &mut self.scratch)
            .map_err(|e| TransformError::Fft(e.to_string()))?;

        let bins = pack_nyquist(&self.spectrum);

        let scale = 2.0 / input_count as f32;
        let magnitudes = bins
            .iter()
            .map(|bin| bin.norm_sqr().sqrt() * scale)
            .collect();

        Ok(SpectrumBuffer::new(magnitudes, bins, size_pot, sample_rate))
    }
}

impl Default for SpectralTransformer {
    fn default() -> Self {
        Self::new()
    }
}

impl Transformer for SpectralTransformer {
    fn transform(&mut self, frame: &AudioFrame) -> Result<SpectrumBuffer, TransformError> {
        let rate = Some(frame.sample_rate()).filter(|&r| r > 0);
        self.transform_samples(frame.samples(), rate)
    }
}

/// Fold the `M + 1` real-FFT outputs into `M` bins: the Nyquist term (always
/// real) moves into the imaginary part of bin 0 next to DC.
fn pack_nyquist(spectrum: &[Complex<f32>]) -> Vec<Complex<f32>> {
    let m = spectrum.len() - 1;
    let mut bins = Vec::with_capacity(m);
    bins.push(Complex::new(spectrum[0].re, spectrum[m].re));
    bins.extend_from_slice(&spectrum[1..m]);
    bins
}
