//! Hand-off from the capture thread to the delivery thread

use super::{TrackerHandle, TrackerShared};
use crate::audio::{AudioFrame, Timestamp};
use std::io;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// What the delegate should be told about one buffer
pub(crate) enum Notification {
    Buffer { frame: AudioFrame, time: Timestamp },
    BelowThreshold,
}

/// A notification tagged with the epoch it was captured in
pub(crate) struct Envelope {
    pub(crate) epoch: u64,
    pub(crate) notification: Notification,
}

/// Capture-side end of the delivery queue.
///
/// Posting never blocks. When the queue is full the new notification is
/// dropped and the oldest ones keep their place.
pub(crate) struct Dispatcher {
    tx: SyncSender<Envelope>,
}

impl Dispatcher {
    /// Returns `false` if the notification was dropped
    pub(crate) fn post(&self, envelope: Envelope) -> bool {
        match self.tx.try_send(envelope) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

fn queue(capacity: usize) -> (Dispatcher, Receiver<Envelope>) {
    let (tx, rx) = mpsc::sync_channel(capacity.max(1));
    (Dispatcher { tx }, rx)
}

/// Thread that calls the delegate for each queued notification
pub(crate) struct DeliveryWorker {
    thread_handle: Option<JoinHandle<()>>,
}

impl DeliveryWorker {
    /// Spawn the delivery thread. It exits once every `Dispatcher` is gone
    /// and the queue is drained.
    pub(crate) fn spawn(
        shared: Arc<TrackerShared>,
        capacity: usize,
    ) -> io::Result<(Dispatcher, DeliveryWorker)> {
        let (dispatcher, rx) = queue(capacity);

        let thread_handle = thread::Builder::new()
            .name("signal-delivery".to_string())
            .spawn(move || run_delivery(shared, rx))?;

        Ok((
            dispatcher,
            DeliveryWorker {
                thread_handle: Some(thread_handle),
            },
        ))
    }

    /// Wait for the thread to exit. When called from the delivery thread
    /// itself (a delegate stopping its tracker) the thread is left to wind
    /// down on its own.
    pub(crate) fn finish(mut self) {
        if let Some(handle) = self.thread_handle.take() {
            if handle.thread().id() == thread::current().id() {
                log::debug!("Tracker stopped from its own delegate; not joining delivery thread");
                return;
            }
            let _ = handle.join();
        }
    }
}

fn run_delivery(shared: Arc<TrackerShared>, rx: Receiver<Envelope>) {
    let handle = TrackerHandle::new(shared.clone());
    let mut stale = 0u64;

    while let Ok(envelope) = rx.recv() {
        if envelope.epoch != shared.current_epoch() {
            stale += 1;
            continue;
        }

        let Some(delegate) = shared.delegate() else {
            continue;
        };

        match envelope.notification {
            Notification::Buffer { frame, time } => {
                delegate.did_receive_buffer(&handle, frame, time)
            }
            Notification::BelowThreshold => delegate.went_below_level_threshold(&handle),
        }
    }

    if stale > 0 {
        log::debug!("Discarded {} notifications captured before stop", stale);
    }
}
