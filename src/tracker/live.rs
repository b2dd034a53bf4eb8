//! Tracker backed by a live input device

use super::dispatch::{DeliveryWorker, Dispatcher, Envelope, Notification};
use super::{
    SignalTracker, SignalTrackerDelegate, SignalTrackerMode, TrackerConfig, TrackerError,
    TrackerHandle, TrackerShared,
};
use crate::audio::level::{gate, GateDecision, Levels};
use crate::audio::{
    AudioFrame, CaptureBackend, CaptureSession, InputDevice, MeteringChannel, StreamFormat, Tap,
    Timestamp,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Live input tracker.
///
/// Construction never fails: if no input device can be resolved the tracker
/// is created anyway and every `start()` returns
/// [`TrackerError::InputNodeMissing`].
///
/// Each buffer captured while running is metered and gated against the
/// level threshold, then handed to the delegate on a dedicated delivery
/// thread. The capture thread never waits on the delegate.
pub struct LiveInputTracker {
    config: TrackerConfig,

    /// Resolved input device; `None` means the tracker cannot start
    input: Option<Box<dyn InputDevice>>,

    shared: Arc<TrackerShared>,

    /// Present while running
    session: Option<Box<dyn CaptureSession>>,

    delivery: Option<DeliveryWorker>,
}

impl LiveInputTracker {
    /// Create a tracker on `backend`'s default input device
    pub fn create(config: TrackerConfig, backend: &dyn CaptureBackend) -> Self {
        let config = config.sanitized();

        let input = match backend.default_input_device() {
            Ok(device) => Some(device),
            Err(e) => {
                log::warn!("No usable input device, tracker cannot start: {}", e);
                None
            }
        };
        let channel = input.as_ref().map(|_| MeteringChannel::new());
        let shared = Arc::new(TrackerShared::new(config.level_threshold, channel));

        Self {
            config,
            input,
            shared,
            session: None,
            delivery: None,
        }
    }

    /// Create a tracker on the system's default input device
    #[cfg(feature = "live-input")]
    pub fn new(config: TrackerConfig) -> Self {
        Self::create(config, &crate::audio::CpalBackend)
    }

    pub fn with_delegate(self, delegate: Arc<dyn SignalTrackerDelegate>) -> Self {
        self.set_delegate(Some(delegate));
        self
    }

    pub fn buffer_size(&self) -> usize {
        self.config.buffer_size
    }

    /// Whether an input device was resolved at construction
    pub fn can_start(&self) -> bool {
        self.input.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    pub fn handle(&self) -> TrackerHandle {
        TrackerHandle::new(self.shared.clone())
    }

    /// Notifications discarded because the delegate fell behind
    pub fn dropped_notifications(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Undo a partial start: nothing captured so far may be delivered
    fn abandon_start(&self, mut session: Box<dyn CaptureSession>, worker: DeliveryWorker) {
        self.shared.advance_epoch();
        session.stop();
        drop(session);
        worker.finish();
        if let Some(channel) = &self.shared.channel {
            channel.reset();
        }
    }
}

impl SignalTracker for LiveInputTracker {
    fn mode(&self) -> SignalTrackerMode {
        SignalTrackerMode::Record
    }

    fn peak_level(&self) -> Option<f32> {
        self.shared.channel.as_ref().and_then(|c| c.peak_level())
    }

    fn average_level(&self) -> Option<f32> {
        self.shared.channel.as_ref().and_then(|c| c.average_level())
    }

    fn level_threshold(&self) -> Option<f32> {
        self.shared.level_threshold.load()
    }

    fn set_level_threshold(&self, threshold: Option<f32>) {
        self.shared.level_threshold.store(threshold);
    }

    fn set_delegate(&self, delegate: Option<Arc<dyn SignalTrackerDelegate>>) {
        *self.shared.delegate.write() = delegate;
    }

    fn start(&mut self) -> Result<(), TrackerError> {
        if self.session.is_some() {
            log::debug!("Tracker already running");
            return Ok(());
        }

        let Some(device) = self.input.as_ref() else {
            log::warn!("Cannot start tracker: no input device");
            return Err(TrackerError::InputNodeMissing);
        };

        let mut session = device.open_session().map_err(|e| {
            log::warn!("Failed to open capture session on '{}': {}", device.name(), e);
            TrackerError::InputNodeMissing
        })?;

        // The format has to come from the live device, never from config
        let format = session.format();
        if format.is_degenerate() {
            log::warn!(
                "Input '{}' reports an unusable format ({} Hz, {} channels)",
                device.name(),
                format.sample_rate,
                format.channel_count
            );
            session.stop();
            return Err(TrackerError::InputNodeMissing);
        }

        let epoch = self.shared.advance_epoch();
        let (dispatcher, worker) =
            DeliveryWorker::spawn(self.shared.clone(), self.config.delivery_queue_capacity)
                .map_err(|e| {
                    log::warn!("Failed to spawn delivery thread: {}", e);
                    TrackerError::InputNodeMissing
                })?;

        let tap = capture_tap(self.shared.clone(), dispatcher, format, epoch);
        let started = session
            .install_tap(self.config.buffer_size, tap)
            .and_then(|()| session.start());

        let failure = match started {
            Err(e) => Some(e.to_string()),
            Ok(()) if !session.is_running() => {
                Some("session did not enter the running state".to_string())
            }
            Ok(()) => None,
        };
        if let Some(reason) = failure {
            log::warn!("Failed to start capture on '{}': {}", device.name(), reason);
            self.abandon_start(session, worker);
            return Err(TrackerError::InputNodeMissing);
        }

        log::info!(
            "Tracking '{}' at {} Hz, {} channels, {} frames per buffer",
            device.name(),
            format.sample_rate,
            format.channel_count,
            self.config.buffer_size
        );
        self.session = Some(session);
        self.delivery = Some(worker);
        Ok(())
    }

    fn stop(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        self.shared.advance_epoch();
        session.stop();
        drop(session);

        if let Some(channel) = &self.shared.channel {
            channel.reset();
        }
        if let Some(worker) = self.delivery.take() {
            worker.finish();
        }

        log::info!("Tracker stopped");
    }
}

impl Drop for LiveInputTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Build the per-buffer callback for one running epoch
fn capture_tap(
    shared: Arc<TrackerShared>,
    dispatcher: Dispatcher,
    format: StreamFormat,
    epoch: u64,
) -> Tap {
    Box::new(move |samples: &[f32], time: Timestamp| {
        on_buffer(&shared, &dispatcher, samples, time, format, epoch);
    })
}

/// Runs on the capture thread: no locks, no logging, one bounded copy
fn on_buffer(
    shared: &TrackerShared,
    dispatcher: &Dispatcher,
    samples: &[f32],
    time: Timestamp,
    format: StreamFormat,
    epoch: u64,
) {
    if shared.current_epoch() != epoch {
        return;
    }

    // Snapshot once so a concurrent reconfiguration can't change them mid-buffer
    let Some(channel) = shared.channel.as_ref() else {
        return;
    };
    let threshold = shared.level_threshold.load();

    let Some(levels) = Levels::measure(samples) else {
        return;
    };
    channel.publish(levels);

    let notification = match gate(levels.average, threshold) {
        GateDecision::Forward => Notification::Buffer {
            frame: AudioFrame::new(samples.to_vec(), format, time),
            time,
        },
        GateDecision::BelowThreshold => Notification::BelowThreshold,
    };

    if !dispatcher.post(Envelope {
        epoch,
        notification,
    }) {
        shared.dropped.fetch_add(1, Ordering::Relaxed);
    }
}
