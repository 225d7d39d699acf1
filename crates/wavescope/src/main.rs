//! Wavescope — play an audio file and watch its spectral metrics live.
//!
//! ## Pipeline
//! 1. **Decode**: Symphonia pulls interleaved stereo `f32` from the file.
//! 2. **Playback**: a coordinator thread writes each chunk to the blocking
//!    CPAL sink (pacing the loop to real time) and mirrors it into the
//!    analysis ring without blocking.
//! 3. **Analysis**: a worker thread drains fixed windows from the ring, runs
//!    per-channel FFTs and publishes RMS, stereo correlation, bandwidth and
//!    magnitude spectra into a shared snapshot.
//! 4. **Display**: the main thread reads the snapshot at its own pace and
//!    logs the metrics with a coarse spectrum bar.

use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use anyhow::{Result, anyhow};
use clap::Parser;
use cpal::traits::DeviceTrait;
use tracing_subscriber::EnvFilter;

use wavescope::cli;
use wavescope::config::PlayerConfig;
use wavescope::decode::{PcmSource, SymphoniaSource};
use wavescope::device;
use wavescope::pipeline::PlaybackCoordinator;
use wavescope::playback::CpalSink;
use wavescope_analysis::snapshot::{AnalysisFrame, AnalysisSnapshot};
use wavescope_analysis::worker::AnalysisWorker;
use wavescope_analysis::BIN_COUNT;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let host = cpal::default_host();
    if args.list_devices {
        device::list_devices(&host)?;
        return Ok(());
    }

    let path = args
        .path
        .as_deref()
        .ok_or_else(|| anyhow!("no input file given"))?;

    let source = SymphoniaSource::open(path)?;
    let sample_rate = source.sample_rate();
    tracing::info!(path = %path.display(), rate = sample_rate, "input opened");

    let device = device::pick_device(&host, args.device.as_deref())?;
    tracing::info!(device = %device.description()?, "output device");

    let cfg = PlayerConfig {
        refill_max_frames: args.refill_max_frames,
        buffer_seconds: args.buffer_seconds,
    };
    let (_stream_guard, sink) = CpalSink::open(&device, sample_rate, &cfg)?;

    let snapshot = AnalysisSnapshot::shared();
    let (mut worker, producer) =
        AnalysisWorker::spawn(sample_rate, args.ring_capacity, snapshot.clone())?;

    let mut coordinator =
        PlaybackCoordinator::spawn(Box::new(source), Box::new(sink), producer)?;

    let running = coordinator.running_flag();
    let _ = ctrlc::set_handler(move || {
        running.store(false, Ordering::Release);
    });

    let refresh = Duration::from_millis(args.refresh_ms.max(16));
    while coordinator.is_running() {
        thread::sleep(refresh);
        let frame = snapshot.latest();
        tracing::info!(
            rms = %format!("{:.4}", frame.rms),
            correlation = %format!("{:+.4}", frame.correlation),
            bandwidth_hz = %format!("{:.0}", frame.bandwidth),
            spectrum = %spectrum_bar(&frame),
        );
    }

    coordinator.stop();
    worker.stop();
    tracing::info!("done");
    Ok(())
}

/// Render both channels' spectra as a coarse 32-column bar.
///
/// Each column takes the peak magnitude of its bin span across both channels
/// and maps it onto five glyphs through a log compression, so quiet content
/// still registers.
fn spectrum_bar(frame: &AnalysisFrame) -> String {
    const COLUMNS: usize = 32;
    const GLYPHS: [char; 5] = [' ', '.', ':', '|', '#'];

    let span = BIN_COUNT / COLUMNS;
    let mut out = String::with_capacity(COLUMNS);
    for col in 0..COLUMNS {
        let lo = col * span;
        let hi = lo + span;
        let mut peak = 0.0f32;
        for i in lo..hi {
            peak = peak.max(frame.spectrum_left[i]).max(frame.spectrum_right[i]);
        }
        let level = (peak.max(1e-6).log10() + 2.0) / 4.0;
        let idx = (level.clamp(0.0, 1.0) * (GLYPHS.len() - 1) as f32).round() as usize;
        out.push(GLYPHS[idx]);
    }
    out
}
