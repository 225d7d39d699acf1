//! Playback coordinator: decode → device sink → analysis ring.
//!
//! One thread drives the whole playback path. Each iteration pulls a decoded
//! chunk, hands it to the blocking device sink (which paces the loop to real
//! time), then mirrors the same samples into the analysis ring without
//! blocking. A full analysis ring is treated as fatal so a stalled analysis
//! side cannot silently desynchronize what is heard from what is measured.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use wavescope_analysis::ring::RingProducer;

use crate::decode::PcmSource;
use crate::sink::OutputSink;

/// Owns the playback thread; stops on end-of-stream, sink failure, ring
/// overflow, or an external stop request.
pub struct PlaybackCoordinator {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PlaybackCoordinator {
    /// Spawn the playback thread over an already-opened source and sink.
    pub fn spawn(
        mut source: Box<dyn PcmSource>,
        mut sink: Box<dyn OutputSink>,
        mut samples: RingProducer<f32>,
    ) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let thread_flag = running.clone();

        let handle = thread::Builder::new()
            .name("playback".into())
            .spawn(move || {
                run(source.as_mut(), sink.as_mut(), &mut samples, &thread_flag);
                thread_flag.store(false, Ordering::Release);
            })
            .context("spawn playback thread")?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Whether the playback thread is still going.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Flag shared with the playback thread; clearing it requests a stop.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Request a stop and join the playback thread. Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("playback thread panicked");
            }
        }
    }
}

impl Drop for PlaybackCoordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    source: &mut dyn PcmSource,
    sink: &mut dyn OutputSink,
    samples: &mut RingProducer<f32>,
    running: &AtomicBool,
) {
    let mut end_of_stream = false;

    while running.load(Ordering::Acquire) {
        let chunk = match source.next_chunk() {
            Ok(Some(chunk)) => chunk,
            Ok(None) => {
                end_of_stream = true;
                break;
            }
            Err(err) => {
                tracing::error!("decode failed: {err:#}");
                break;
            }
        };

        // Mirror into the analysis ring before the sink write blocks; the
        // analysis worker gets the samples as early as possible.
        if !samples.push(chunk) {
            tracing::error!(
                chunk = chunk.len(),
                free = samples.capacity() - samples.len(),
                "analysis ring full; stopping playback"
            );
            break;
        }

        if let Err(err) = sink.write(chunk) {
            tracing::error!("sink write failed: {err:#}");
            break;
        }
    }

    if end_of_stream {
        tracing::info!("end of stream");
        if let Err(err) = sink.drain() {
            tracing::warn!("sink drain failed: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::TAU;
    use std::time::{Duration, Instant};
    use wavescope_analysis::snapshot::{AnalysisFrame, AnalysisSnapshot};
    use wavescope_analysis::worker::AnalysisWorker;
    use wavescope_analysis::{BIN_COUNT, WINDOW_SIZE};

    const RATE: u32 = 48_000;

    /// Fixed number of sine batches, then end-of-stream.
    struct StubSource {
        batches: usize,
        served: usize,
        chunk: Vec<f32>,
    }

    impl StubSource {
        fn sine(batches: usize, batch_frames: usize, bin: usize) -> Self {
            let mut chunk = Vec::with_capacity(batch_frames * 2);
            for i in 0..batch_frames {
                let phase = TAU * bin as f32 * (i % WINDOW_SIZE) as f32 / WINDOW_SIZE as f32;
                let s = 0.8 * phase.sin();
                chunk.push(s);
                chunk.push(s);
            }
            Self {
                batches,
                served: 0,
                chunk,
            }
        }
    }

    impl PcmSource for StubSource {
        fn sample_rate(&self) -> u32 {
            RATE
        }

        fn next_chunk(&mut self) -> Result<Option<&[f32]>> {
            if self.served == self.batches {
                return Ok(None);
            }
            self.served += 1;
            Ok(Some(&self.chunk))
        }
    }

    /// Counts writes and drains; never fails.
    #[derive(Default)]
    struct StubSink {
        written: usize,
        drained: bool,
    }

    impl OutputSink for StubSink {
        fn write(&mut self, samples: &[f32]) -> Result<()> {
            self.written += samples.len();
            Ok(())
        }

        fn drain(&mut self) -> Result<()> {
            self.drained = true;
            Ok(())
        }
    }

    fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
        let end = Instant::now() + deadline;
        while Instant::now() < end {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        done()
    }

    fn peak_bin(spectrum: &[f32; BIN_COUNT]) -> usize {
        spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    #[test]
    fn plays_to_end_and_feeds_analysis() {
        let snapshot = AnalysisSnapshot::shared();
        let (mut worker, producer) = AnalysisWorker::spawn(RATE, 8192, snapshot.clone()).unwrap();

        let source = Box::new(StubSource::sine(4, WINDOW_SIZE, 12));
        let sink = Box::new(StubSink::default());
        let mut coordinator = PlaybackCoordinator::spawn(source, sink, producer).unwrap();

        assert!(wait_until(Duration::from_secs(2), || !coordinator.is_running()));
        assert!(wait_until(Duration::from_secs(2), || {
            snapshot.latest().rms > 0.0
        }));

        let frame: AnalysisFrame = snapshot.latest();
        let peak = peak_bin(&frame.spectrum_left);
        assert!(peak.abs_diff(12) <= 1, "peak at bin {peak}");

        coordinator.stop();
        worker.stop();
    }

    #[test]
    fn full_ring_stops_playback() {
        let snapshot = AnalysisSnapshot::shared();
        // Ring far smaller than one batch so the first push overflows before
        // the worker can possibly drain it.
        let (mut worker, producer) = AnalysisWorker::spawn(RATE, 1024, snapshot).unwrap();
        worker.stop();

        let source = Box::new(StubSource::sine(64, 2048, 12));
        let sink = Box::new(StubSink::default());
        let mut coordinator = PlaybackCoordinator::spawn(source, sink, producer).unwrap();

        assert!(wait_until(Duration::from_secs(2), || !coordinator.is_running()));
        coordinator.stop();
    }

    #[test]
    fn stop_is_idempotent() {
        let snapshot = AnalysisSnapshot::shared();
        let (mut worker, producer) = AnalysisWorker::spawn(RATE, 8192, snapshot).unwrap();

        let source = Box::new(StubSource::sine(1, WINDOW_SIZE, 4));
        let sink = Box::new(StubSink::default());
        let mut coordinator = PlaybackCoordinator::spawn(source, sink, producer).unwrap();

        coordinator.stop();
        coordinator.stop();
        worker.stop();
    }
}
