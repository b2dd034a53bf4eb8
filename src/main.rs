//! Live spectrum monitor
//!
//! Usage: `signal-tracker [--level-threshold <DB>] [--seconds <N>]`
//!
//! Listens on the default input device and logs the strongest frequency bin
//! of every buffer that clears the threshold. Set `RUST_LOG=debug` to also
//! see buffers that were gated.

use clap::Parser;
use parking_lot::Mutex;
use signal_tracker::audio::level::MIN_LEVEL_DB;
use signal_tracker::{
    AudioFrame, LiveInputTracker, SignalTracker, SignalTrackerDelegate, SpectralTransformer,
    Timestamp, TrackerConfig, TrackerHandle, Transformer,
};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "signal-tracker", about = "Log the strongest frequency of the default input")]
struct Args {
    /// Gate threshold in dB; buffers at or below it are not analyzed
    #[arg(short = 't', long, allow_negative_numbers = true)]
    level_threshold: Option<f32>,

    /// How long to listen
    #[arg(short, long, default_value_t = 10)]
    seconds: u64,
}

struct SpectrumLogger {
    transformer: Mutex<SpectralTransformer>,
}

impl SignalTrackerDelegate for SpectrumLogger {
    fn did_receive_buffer(&self, tracker: &TrackerHandle, frame: AudioFrame, time: Timestamp) {
        let spectrum = match self.transformer.lock().transform(&frame) {
            Ok(spectrum) => spectrum,
            Err(e) => {
                log::warn!("Skipping buffer: {}", e);
                return;
            }
        };

        if let Some((bin, magnitude)) = spectrum.peak_bin() {
            log::info!(
                "{:>9.1} Hz  mag {:.4}  avg {:>6.1} dB  @{}",
                spectrum.bin_frequency(bin).unwrap_or(0.0),
                magnitude,
                tracker.average_level().unwrap_or(MIN_LEVEL_DB),
                time.sample_time
            );
        }
    }

    fn went_below_level_threshold(&self, tracker: &TrackerHandle) {
        log::debug!(
            "Below threshold ({:.1} dB)",
            tracker.average_level().unwrap_or(MIN_LEVEL_DB)
        );
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = TrackerConfig {
        level_threshold: args.level_threshold,
        ..Default::default()
    };
    let delegate = Arc::new(SpectrumLogger {
        transformer: Mutex::new(SpectralTransformer::new()),
    });
    let mut tracker = LiveInputTracker::new(config).with_delegate(delegate);

    if let Err(e) = tracker.start() {
        log::error!("Could not start tracking: {}", e);
        std::process::exit(1);
    }

    std::thread::sleep(Duration::from_secs(args.seconds));
    tracker.stop();

    let dropped = tracker.dropped_notifications();
    if dropped > 0 {
        log::warn!("{} notifications dropped while the logger was busy", dropped);
    }
}
