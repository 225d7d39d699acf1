//! Analysis worker: a dedicated thread draining the sample ring.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use anyhow::Result;

use crate::ring::{self, RingConsumer, RingProducer};
use crate::snapshot::{AnalysisFrame, AnalysisSnapshot};
use crate::spectral::SpectralAnalyzer;
use crate::{CHANNELS, WINDOW_SIZE, metrics};

/// Default ring capacity in interleaved samples.
///
/// Must hold at least one decoder chunk: FLAC blocks run up to 4608 frames
/// (9216 samples), so the default leaves headroom beyond that.
pub const DEFAULT_RING_CAPACITY: usize = 16_384;

/// Background analysis stage.
///
/// Owns the analysis thread; the producer half of its sample ring is handed
/// back at spawn time for the playback side to push into. The thread drains
/// whole windows (`WINDOW_SIZE` stereo frames), runs the spectral transform,
/// derives the metrics and publishes one [`AnalysisFrame`] per window into
/// the shared snapshot.
pub struct AnalysisWorker {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl AnalysisWorker {
    /// Build the ring and analyzer, then start the analysis thread.
    ///
    /// Fails when `ring_capacity` is invalid or the transform cannot be
    /// planned; nothing is spawned in that case. On success, returns the
    /// worker and the producer half of the ring.
    pub fn spawn(
        sample_rate: u32,
        ring_capacity: usize,
        snapshot: Arc<AnalysisSnapshot>,
    ) -> Result<(Self, RingProducer<f32>)> {
        let (producer, consumer) = ring::with_capacity(ring_capacity)?;
        let analyzer = SpectralAnalyzer::new(WINDOW_SIZE)?;

        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let handle = thread::Builder::new()
            .name("analysis".into())
            .spawn(move || run(consumer, analyzer, sample_rate as f32, snapshot, flag))?;

        Ok((
            Self {
                running,
                handle: Some(handle),
            },
            producer,
        ))
    }

    /// Signal the thread to exit and wait for it. Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AnalysisWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    mut samples: RingConsumer<f32>,
    mut analyzer: SpectralAnalyzer,
    sample_rate: f32,
    snapshot: Arc<AnalysisSnapshot>,
    running: Arc<AtomicBool>,
) {
    tracing::debug!(window = WINDOW_SIZE, "analysis thread started");

    let mut interleaved = vec![0.0f32; WINDOW_SIZE * CHANNELS];
    let mut frame = AnalysisFrame::default();

    while running.load(Ordering::Acquire) {
        // Whole window or nothing. A failed pop just means the producer is
        // behind; yield and retry rather than block.
        if !samples.pop(&mut interleaved) {
            thread::yield_now();
            continue;
        }

        let (left, right) = analyzer.inputs_mut();
        for (i, pair) in interleaved.chunks_exact(CHANNELS).enumerate() {
            left[i] = pair[0];
            right[i] = pair[1];
        }

        analyzer.execute();

        frame.rms = metrics::rms(analyzer.input_left(), analyzer.input_right());
        frame.correlation =
            metrics::stereo_correlation(analyzer.input_left(), analyzer.input_right());

        let bandwidth_left =
            metrics::channel_bandwidth(analyzer.output_left(), sample_rate, WINDOW_SIZE);
        let bandwidth_right =
            metrics::channel_bandwidth(analyzer.output_right(), sample_rate, WINDOW_SIZE);
        frame.bandwidth = (bandwidth_left + bandwidth_right) / CHANNELS as f32;

        metrics::write_magnitudes(analyzer.output_left(), &mut frame.spectrum_left);
        metrics::write_magnitudes(analyzer.output_right(), &mut frame.spectrum_right);

        snapshot.publish(&frame);
    }

    tracing::debug!("analysis thread stopped");
}
