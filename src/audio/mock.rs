//! Scripted capture backend for tests

use super::backend::{BackendError, CaptureBackend, CaptureSession, InputDevice, Tap};
use super::frame::{StreamFormat, Timestamp};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
struct MockState {
    tap: Option<(usize, Tap)>,
    running: bool,
    sample_time: u64,
    sessions_opened: u32,
    stop_calls: u32,
}

#[derive(Clone)]
struct Script {
    format: StreamFormat,
    reaches_running: bool,
    open_fails: bool,
}

/// Backend whose device format and start behaviour are chosen by the test
pub(crate) struct MockBackend {
    script: Script,
    has_device: bool,
    state: Arc<Mutex<MockState>>,
}

/// Test-side handle that plays the role of the capture thread
#[derive(Clone)]
pub(crate) struct MockFeed {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub(crate) fn new(sample_rate: u32, channel_count: u16) -> (Self, MockFeed) {
        let state = Arc::new(Mutex::new(MockState::default()));
        let backend = Self {
            script: Script {
                format: StreamFormat::new(sample_rate, channel_count),
                reaches_running: true,
                open_fails: false,
            },
            has_device: true,
            state: state.clone(),
        };
        (backend, MockFeed { state })
    }

    pub(crate) fn without_device() -> Self {
        let (mut backend, _) = Self::new(44100, 1);
        backend.has_device = false;
        backend
    }

    /// Sessions accept `start()` but never report running
    pub(crate) fn never_running(mut self) -> Self {
        self.script.reaches_running = false;
        self
    }

    pub(crate) fn failing_open(mut self) -> Self {
        self.script.open_fails = true;
        self
    }
}

impl CaptureBackend for MockBackend {
    fn default_input_device(&self) -> Result<Box<dyn InputDevice>, BackendError> {
        if !self.has_device {
            return Err(BackendError::NoInputDevice);
        }
        Ok(Box::new(MockDevice {
            script: self.script.clone(),
            state: self.state.clone(),
        }))
    }
}

struct MockDevice {
    script: Script,
    state: Arc<Mutex<MockState>>,
}

impl InputDevice for MockDevice {
    fn name(&self) -> String {
        "Mock Input".to_string()
    }

    fn open_session(&self) -> Result<Box<dyn CaptureSession>, BackendError> {
        if self.script.open_fails {
            return Err(BackendError::ConfigError("scripted open failure".to_string()));
        }
        self.state.lock().sessions_opened += 1;
        Ok(Box::new(MockSession {
            script: self.script.clone(),
            state: self.state.clone(),
        }))
    }
}

struct MockSession {
    script: Script,
    state: Arc<Mutex<MockState>>,
}

impl CaptureSession for MockSession {
    fn format(&self) -> StreamFormat {
        self.script.format
    }

    fn install_tap(&mut self, buffer_size: usize, tap: Tap) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.tap = Some((buffer_size, tap));
        state.sample_time = 0;
        Ok(())
    }

    fn start(&mut self) -> Result<(), BackendError> {
        self.state.lock().running = self.script.reaches_running;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.state.lock().running
    }

    fn stop(&mut self) {
        let mut state = self.state.lock();
        state.running = false;
        state.tap = None;
        state.stop_calls += 1;
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.running = false;
        state.tap = None;
    }
}

impl MockFeed {
    /// Run one block through the installed tap on the calling thread.
    /// Returns `false` when no running session has a tap.
    pub(crate) fn push(&self, samples: &[f32]) -> bool {
        let mut state = self.state.lock();
        if !state.running {
            return false;
        }
        let time = Timestamp::new(state.sample_time, None);
        state.sample_time += samples.len() as u64;
        match state.tap.as_mut() {
            Some((_, tap)) => {
                tap(samples, time);
                true
            }
            None => false,
        }
    }

    pub(crate) fn tap_buffer_size(&self) -> Option<usize> {
        self.state.lock().tap.as_ref().map(|(size, _)| *size)
    }

    pub(crate) fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub(crate) fn sessions_opened(&self) -> u32 {
        self.state.lock().sessions_opened
    }

    pub(crate) fn stop_calls(&self) -> u32 {
        self.state.lock().stop_calls
    }
}
