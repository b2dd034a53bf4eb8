//! Frame and spectrum data types shared by capture and analysis

use rustfft::num_complex::Complex;
use std::time::Duration;

/// Format of a live input stream, as reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Number of interleaved channels the device delivers
    pub channel_count: u16,
}

impl StreamFormat {
    pub fn new(sample_rate: u32, channel_count: u16) -> Self {
        Self {
            sample_rate,
            channel_count,
        }
    }

    /// A zero sample rate or zero channels means the device is unusable.
    pub fn is_degenerate(&self) -> bool {
        self.sample_rate == 0 || self.channel_count == 0
    }
}

/// Capture time of a block, passed through to the delegate untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timestamp {
    /// Index of the block's first frame since the stream started
    pub sample_time: u64,

    /// Platform capture instant relative to the first callback, if known
    pub host_time: Option<Duration>,
}

impl Timestamp {
    pub fn new(sample_time: u64, host_time: Option<Duration>) -> Self {
        Self {
            sample_time,
            host_time,
        }
    }
}

/// One captured block of mono samples
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Vec<f32>,
    format: StreamFormat,
    timestamp: Timestamp,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, format: StreamFormat, timestamp: Timestamp) -> Self {
        Self {
            samples,
            format,
            timestamp,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }

    pub fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    pub fn channel_count(&self) -> u16 {
        self.format.channel_count
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}

/// Normalized magnitude spectrum produced by the spectral transform.
///
/// Bin `k` covers `k * sample_rate / fft_size` Hz. Bin 0 is packed: its
/// complex value holds the DC term in the real part and the Nyquist term in
/// the imaginary part, so its magnitude mixes both.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumBuffer {
    magnitudes: Vec<f32>,
    complex_bins: Vec<Complex<f32>>,
    fft_size: usize,
    sample_rate: Option<u32>,
}

impl SpectrumBuffer {
    pub(crate) fn new(
        magnitudes: Vec<f32>,
        complex_bins: Vec<Complex<f32>>,
        fft_size: usize,
        sample_rate: Option<u32>,
    ) -> Self {
        Self {
            magnitudes,
            complex_bins,
            fft_size,
            sample_rate,
        }
    }

    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }

    /// Unnormalized transform output, one packed value per bin
    pub fn complex_bins(&self) -> &[Complex<f32>] {
        &self.complex_bins
    }

    pub fn len(&self) -> usize {
        self.magnitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }

    /// Power-of-two transform size the spectrum was computed at
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    /// Center frequency of bin `k` in Hz, when the sample rate is known
    pub fn bin_frequency(&self, k: usize) -> Option<f32> {
        self.sample_rate
            .map(|rate| k as f32 * rate as f32 / self.fft_size as f32)
    }

    /// Index and magnitude of the strongest bin, skipping the packed DC bin
    pub fn peak_bin(&self) -> Option<(usize, f32)> {
        self.magnitudes
            .iter()
            .copied()
            .enumerate()
            .skip(1)
            .fold(None, |best, (i, m)| match best {
                Some((_, b)) if b >= m => best,
                _ => Some((i, m)),
            })
    }

    pub fn into_magnitudes(self) -> Vec<f32> {
        self.magnitudes
    }
}
