//! Device and session provider seam
//!
//! A backend resolves the default input device, opens a capture session on
//! it and drives a per-block tap. The tracker only ever talks to these
//! traits; `CpalBackend` is the production implementation.

use super::frame::{StreamFormat, Timestamp};
use thiserror::Error;

/// Backend errors
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("No input device found")]
    NoInputDevice,

    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    #[error("Failed to build audio stream: {0}")]
    StreamError(String),

    #[error("Failed to start stream: {0}")]
    PlayError(String),

    #[error("Thread error: {0}")]
    ThreadError(String),
}

/// Per-block callback, invoked on the backend's capture thread with exactly
/// `buffer_size` mono samples.
pub type Tap = Box<dyn FnMut(&[f32], Timestamp) + Send + 'static>;

/// Platform audio provider
pub trait CaptureBackend {
    fn default_input_device(&self) -> Result<Box<dyn InputDevice>, BackendError>;
}

/// A resolved input device
pub trait InputDevice: Send {
    fn name(&self) -> String;

    /// Build an engine and capture session against the device. The session
    /// reports the format the device actually runs at.
    fn open_session(&self) -> Result<Box<dyn CaptureSession>, BackendError>;
}

/// An open connection to an input device.
///
/// Dropping a session must stop it and release its tap.
pub trait CaptureSession: Send {
    /// Live format of the device
    fn format(&self) -> StreamFormat;

    fn install_tap(&mut self, buffer_size: usize, tap: Tap) -> Result<(), BackendError>;

    /// Start capture and the engine
    fn start(&mut self) -> Result<(), BackendError>;

    fn is_running(&self) -> bool;

    /// Stop and reset. Safe to call more than once.
    fn stop(&mut self);
}
