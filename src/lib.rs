//! Signal Tracker Library
//!
//! Captures a live audio input, gates each captured buffer by its average
//! level, and turns accepted buffers into normalized magnitude spectra for
//! pitch detection and tuning front ends.
//!
//! ```no_run
//! use signal_tracker::{
//!     AudioFrame, LiveInputTracker, SignalTracker, SignalTrackerDelegate, SpectralTransformer,
//!     Timestamp, TrackerConfig, TrackerHandle, Transformer,
//! };
//! use parking_lot::Mutex;
//! use std::sync::Arc;
//!
//! struct Tuner(Mutex<SpectralTransformer>);
//!
//! impl SignalTrackerDelegate for Tuner {
//!     fn did_receive_buffer(&self, _: &TrackerHandle, frame: AudioFrame, _: Timestamp) {
//!         if let Ok(spectrum) = self.0.lock().transform(&frame) {
//!             println!("{:?}", spectrum.peak_bin());
//!         }
//!     }
//!
//!     fn went_below_level_threshold(&self, _: &TrackerHandle) {}
//! }
//!
//! # #[cfg(feature = "live-input")]
//! # {
//! let mut tracker = LiveInputTracker::new(TrackerConfig::default())
//!     .with_delegate(Arc::new(Tuner(Mutex::new(SpectralTransformer::new()))));
//! tracker.set_level_threshold(Some(-50.0));
//! tracker.start()?;
//! # }
//! # Ok::<(), signal_tracker::TrackerError>(())
//! ```

pub mod audio;
pub mod tracker;

pub use audio::{
    AudioFrame, SpectralTransformer, SpectrumBuffer, StreamFormat, Timestamp, TransformError,
    Transformer,
};
pub use tracker::{
    LiveInputTracker, SignalTracker, SignalTrackerDelegate, SignalTrackerMode, TrackerConfig,
    TrackerError, TrackerHandle,
};
