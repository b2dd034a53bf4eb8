//! Live input capture through cpal on a dedicated thread

use super::backend::{BackendError, CaptureBackend, CaptureSession, InputDevice, Tap};
use super::block::BlockAccumulator;
use super::frame::{StreamFormat, Timestamp};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig, SupportedStreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Backend on the platform's default cpal host
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl CaptureBackend for CpalBackend {
    fn default_input_device(&self) -> Result<Box<dyn InputDevice>, BackendError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(BackendError::NoInputDevice)?;
        let name = device
            .name()
            .map_err(|e| BackendError::ConfigError(e.to_string()))?;

        log::info!("Default input device: {}", name);
        Ok(Box::new(CpalInputDevice { name }))
    }
}

/// Input device, resolved by name on the capture thread
pub struct CpalInputDevice {
    name: String,
}

impl InputDevice for CpalInputDevice {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn open_session(&self) -> Result<Box<dyn CaptureSession>, BackendError> {
        Ok(Box::new(CpalSession::open(self.name.clone())?))
    }
}

/// Commands sent to the capture thread
enum SessionCommand {
    InstallTap { buffer_size: usize, tap: Tap },
    Start {
        reply: mpsc::Sender<Result<(), BackendError>>,
    },
    Stop,
}

/// Capture session handle (Send)
///
/// The cpal stream is not `Send` on every platform, so it never leaves the
/// `audio-capture` thread. This handle only talks to that thread.
pub struct CpalSession {
    /// Command sender to control the capture thread
    command_tx: mpsc::Sender<SessionCommand>,

    /// Handle to the capture thread
    thread_handle: Option<JoinHandle<()>>,

    /// Format reported by the device when the session opened
    format: StreamFormat,

    /// Set once the stream plays, cleared on stop or stream error
    running: Arc<AtomicBool>,
}

impl CpalSession {
    /// Spawn the capture thread and wait for it to report the device format
    fn open(device_name: String) -> Result<Self, BackendError> {
        let (command_tx, command_rx) = mpsc::channel();
        let (format_tx, format_rx) = mpsc::channel();
        let running = Arc::new(AtomicBool::new(false));
        let running_clone = running.clone();

        let thread_handle = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || run_session_thread(device_name, format_tx, command_rx, running_clone))
            .map_err(|e| BackendError::ThreadError(e.to_string()))?;

        let format = match format_rx.recv() {
            Ok(Ok(format)) => format,
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread_handle.join();
                return Err(BackendError::ThreadError(
                    "capture thread exited before reporting a format".to_string(),
                ));
            }
        };

        Ok(Self {
            command_tx,
            thread_handle: Some(thread_handle),
            format,
            running,
        })
    }
}

impl CaptureSession for CpalSession {
    fn format(&self) -> StreamFormat {
        self.format
    }

    fn install_tap(&mut self, buffer_size: usize, tap: Tap) -> Result<(), BackendError> {
        self.command_tx
            .send(SessionCommand::InstallTap { buffer_size, tap })
            .map_err(|_| BackendError::ThreadError("capture thread is gone".to_string()))
    }

    fn start(&mut self) -> Result<(), BackendError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.command_tx
            .send(SessionCommand::Start { reply: reply_tx })
            .map_err(|_| BackendError::ThreadError("capture thread is gone".to_string()))?;

        reply_rx.recv().map_err(|_| {
            BackendError::ThreadError("capture thread exited during start".to_string())
        })?
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn stop(&mut self) {
        let _ = self.command_tx.send(SessionCommand::Stop);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CpalSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Run the capture session in a dedicated thread
fn run_session_thread(
    device_name: String,
    format_tx: mpsc::Sender<Result<StreamFormat, BackendError>>,
    command_rx: mpsc::Receiver<SessionCommand>,
    running: Arc<AtomicBool>,
) {
    let (device, config) = match open_device(&device_name) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = format_tx.send(Err(e));
            return;
        }
    };

    let format = StreamFormat::new(config.sample_rate().0, config.channels());
    log::info!(
        "Input '{}': {} Hz, {} channels",
        device_name,
        format.sample_rate,
        format.channel_count
    );
    if format_tx.send(Ok(format)).is_err() {
        return;
    }

    let mut pending_tap: Option<(usize, Tap)> = None;
    let mut stream: Option<cpal::Stream> = None;

    while let Ok(command) = command_rx.recv() {
        match command {
            SessionCommand::InstallTap { buffer_size, tap } => {
                pending_tap = Some((buffer_size, tap));
            }
            SessionCommand::Start { reply } => {
                let result = match pending_tap.take() {
                    Some((buffer_size, tap)) => {
                        start_stream(&device, &config, buffer_size, tap, &running)
                            .map(|s| stream = Some(s))
                    }
                    None => Err(BackendError::StreamError("no tap installed".to_string())),
                };
                let _ = reply.send(result);
            }
            SessionCommand::Stop => break,
        }
    }

    running.store(false, Ordering::Release);
    drop(stream);
    log::info!("Audio capture stopped");
}

fn open_device(name: &str) -> Result<(Device, SupportedStreamConfig), BackendError> {
    let host = cpal::default_host();

    let device = host
        .input_devices()
        .map_err(|e| BackendError::ConfigError(e.to_string()))?
        .find(|d| d.name().map(|n| n == name).unwrap_or(false))
        .or_else(|| {
            log::warn!("Input '{}' went away, using the current default", name);
            host.default_input_device()
        })
        .ok_or(BackendError::NoInputDevice)?;

    let config = device
        .default_input_config()
        .map_err(|e| BackendError::ConfigError(e.to_string()))?;

    Ok((device, config))
}

fn start_stream(
    device: &Device,
    supported: &SupportedStreamConfig,
    buffer_size: usize,
    tap: Tap,
    running: &Arc<AtomicBool>,
) -> Result<cpal::Stream, BackendError> {
    let channels = supported.channels() as usize;
    let config: StreamConfig = supported.config();

    let stream = match supported.sample_format() {
        SampleFormat::F32 => {
            build_stream::<f32>(device, &config, channels, buffer_size, tap, running.clone())
        }
        SampleFormat::I16 => {
            build_stream::<i16>(device, &config, channels, buffer_size, tap, running.clone())
        }
        SampleFormat::U16 => {
            build_stream::<u16>(device, &config, channels, buffer_size, tap, running.clone())
        }
        other => {
            return Err(BackendError::ConfigError(format!(
                "Unsupported sample format: {:?}",
                other
            )))
        }
    }
    .map_err(|e| BackendError::StreamError(e.to_string()))?;

    stream
        .play()
        .map_err(|e| BackendError::PlayError(e.to_string()))?;
    running.store(true, Ordering::Release);

    log::info!("Audio capture started ({} frames per tap)", buffer_size);
    Ok(stream)
}

/// Build an input stream that feeds channel 0 into the tap in fixed blocks
fn build_stream<T: cpal::Sample + cpal::SizedSample>(
    device: &Device,
    config: &StreamConfig,
    channels: usize,
    buffer_size: usize,
    mut tap: Tap,
    running: Arc<AtomicBool>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    f32: cpal::FromSample<T>,
{
    let channels = channels.max(1);
    let sample_rate = config.sample_rate.0;
    let mut accumulator = BlockAccumulator::new(buffer_size);
    let mut origin: Option<cpal::StreamInstant> = None;
    let mut frames_seen = 0u64;

    device.build_input_stream(
        config,
        move |data: &[T], info: &cpal::InputCallbackInfo| {
            let capture = info.timestamp().capture;
            let first = *origin.get_or_insert(capture);
            let callback_time = capture.duration_since(&first);
            let callback_start = frames_seen;
            frames_seen += data.len().div_ceil(channels) as u64;

            accumulator.push(
                data.chunks(channels)
                    .map(|frame| <f32 as cpal::Sample>::from_sample(frame[0])),
                |block, sample_time| {
                    let host_time = callback_time.and_then(|t| {
                        frame_host_time(t, callback_start, sample_time, sample_rate)
                    });
                    tap(block, Timestamp::new(sample_time, host_time))
                },
            );
        },
        move |err| {
            log::error!("Audio stream error: {}", err);
            running.store(false, Ordering::Release);
        },
        None,
    )
}

/// Capture time of frame `sample_time`, given that frame `callback_start`
/// arrived at `callback_time`. Blocks that began in an earlier callback are
/// dated back by the frames they already held.
fn frame_host_time(
    callback_time: Duration,
    callback_start: u64,
    sample_time: u64,
    sample_rate: u32,
) -> Option<Duration> {
    if sample_rate == 0 {
        return Some(callback_time);
    }
    let frames_to_duration =
        |frames: u64| Duration::try_from_secs_f64(frames as f64 / sample_rate as f64).ok();

    if sample_time >= callback_start {
        Some(callback_time + frames_to_duration(sample_time - callback_start)?)
    } else {
        Some(callback_time.saturating_sub(frames_to_duration(callback_start - sample_time)?))
    }
}
