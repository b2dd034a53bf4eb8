//! Audio capture and spectral analysis

mod backend;
mod block;
#[cfg(feature = "live-input")]
mod capture;
mod fft;
mod frame;
pub mod level;
#[cfg(test)]
pub(crate) mod mock;

pub use backend::{BackendError, CaptureBackend, CaptureSession, InputDevice, Tap};
pub use block::BlockAccumulator;
#[cfg(feature = "live-input")]
pub use capture::{CpalBackend, CpalInputDevice, CpalSession};
pub use fft::{fft_size_for, SpectralTransformer, TransformError, Transformer};
pub use frame::{AudioFrame, SpectrumBuffer, StreamFormat, Timestamp};
pub use level::{Levels, MeteringChannel};
