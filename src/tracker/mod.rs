//! Signal trackers: capture lifecycle, level metering and gated delivery

mod dispatch;
mod live;

pub use live::LiveInputTracker;

use crate::audio::{AudioFrame, MeteringChannel, Timestamp};
use crate::audio::level::AtomicLevel;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Tracker errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerError {
    #[error("Input node missing: no usable audio input")]
    InputNodeMissing,
}

/// Where a tracker gets its signal from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalTrackerMode {
    /// Live input device
    Record,

    /// Local playback, handled outside this crate
    Playback,
}

/// Tracker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Frames per delivered buffer
    pub buffer_size: usize,

    /// Gate threshold in dB; `None` lets every buffer through
    pub level_threshold: Option<f32>,

    /// Notifications that may wait for the delegate before new ones are
    /// dropped
    pub delivery_queue_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            buffer_size: 2048,
            level_threshold: None,
            delivery_queue_capacity: 32,
        }
    }
}

impl TrackerConfig {
    fn sanitized(mut self) -> Self {
        self.buffer_size = self.buffer_size.max(1);
        self.delivery_queue_capacity = self.delivery_queue_capacity.max(1);
        self
    }
}

/// Receiver of tracker notifications.
///
/// Both calls arrive on the tracker's delivery thread, one at a time, in
/// capture order. A slow delegate makes the tracker drop new notifications
/// rather than stall capture.
pub trait SignalTrackerDelegate: Send + Sync {
    /// A buffer whose average level passed the threshold
    fn did_receive_buffer(&self, tracker: &TrackerHandle, frame: AudioFrame, time: Timestamp);

    /// A buffer whose average level was at or below the threshold
    fn went_below_level_threshold(&self, tracker: &TrackerHandle);
}

/// Common tracker interface
pub trait SignalTracker {
    fn mode(&self) -> SignalTrackerMode;

    /// Peak level of the latest buffer in dB
    fn peak_level(&self) -> Option<f32>;

    /// Average level of the latest buffer in dB
    fn average_level(&self) -> Option<f32>;

    fn level_threshold(&self) -> Option<f32>;

    fn set_level_threshold(&self, threshold: Option<f32>);

    fn set_delegate(&self, delegate: Option<Arc<dyn SignalTrackerDelegate>>);

    fn start(&mut self) -> Result<(), TrackerError>;

    fn stop(&mut self);
}

/// State shared between the tracker, its capture tap and its delivery
/// thread
pub(crate) struct TrackerShared {
    level_threshold: AtomicLevel,
    channel: Option<MeteringChannel>,
    epoch: AtomicU64,
    delegate: RwLock<Option<Arc<dyn SignalTrackerDelegate>>>,
    dropped: AtomicU64,
}

impl TrackerShared {
    fn new(level_threshold: Option<f32>, channel: Option<MeteringChannel>) -> Self {
        Self {
            level_threshold: AtomicLevel::new(level_threshold),
            channel,
            epoch: AtomicU64::new(0),
            delegate: RwLock::new(None),
            dropped: AtomicU64::new(0),
        }
    }

    fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Start a new epoch; work tagged with an older one is discarded
    fn advance_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn delegate(&self) -> Option<Arc<dyn SignalTrackerDelegate>> {
        self.delegate.read().clone()
    }
}

/// Cheap view of a tracker, handed to delegate callbacks
#[derive(Clone)]
pub struct TrackerHandle {
    shared: Arc<TrackerShared>,
}

impl TrackerHandle {
    pub(crate) fn new(shared: Arc<TrackerShared>) -> Self {
        Self { shared }
    }

    pub fn mode(&self) -> SignalTrackerMode {
        SignalTrackerMode::Record
    }

    pub fn peak_level(&self) -> Option<f32> {
        self.shared.channel.as_ref().and_then(|c| c.peak_level())
    }

    pub fn average_level(&self) -> Option<f32> {
        self.shared.channel.as_ref().and_then(|c| c.average_level())
    }

    pub fn level_threshold(&self) -> Option<f32> {
        self.shared.level_threshold.load()
    }

    pub fn set_level_threshold(&self, threshold: Option<f32>) {
        self.shared.level_threshold.store(threshold);
    }

    /// Notifications discarded because the delivery queue was full
    pub fn dropped_notifications(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for TrackerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerHandle")
            .field("peak_level", &self.peak_level())
            .field("average_level", &self.average_level())
            .field("level_threshold", &self.level_threshold())
            .finish()
    }
}
