//! Latest-wins publication of analysis results.

use std::sync::{Arc, Mutex};

use crate::BIN_COUNT;

/// One complete bundle of per-window analysis results.
#[derive(Clone, Copy, Debug)]
pub struct AnalysisFrame {
    /// Averaged stereo root-mean-square level.
    pub rms: f32,
    /// Normalized cross-covariance of the channels (signed).
    pub correlation: f32,
    /// Averaged occupied bandwidth in Hz; negative when unset (silence).
    pub bandwidth: f32,
    /// Left-channel magnitude spectrum over the analysis bins.
    pub spectrum_left: [f32; BIN_COUNT],
    /// Right-channel magnitude spectrum over the analysis bins.
    pub spectrum_right: [f32; BIN_COUNT],
}

impl Default for AnalysisFrame {
    fn default() -> Self {
        Self {
            rms: 0.0,
            correlation: 0.0,
            bandwidth: 0.0,
            spectrum_left: [0.0; BIN_COUNT],
            spectrum_right: [0.0; BIN_COUNT],
        }
    }
}

/// Shared slot holding the most recently published [`AnalysisFrame`].
///
/// A publish replaces every field inside one critical section, so a reader
/// never observes a mix of two frames. No history is kept; a slow reader
/// simply skips frames, which is fine for display purposes.
#[derive(Default)]
pub struct AnalysisSnapshot {
    latest: Mutex<AnalysisFrame>,
}

impl AnalysisSnapshot {
    /// Create a shared snapshot handle.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Replace the published frame.
    pub fn publish(&self, frame: &AnalysisFrame) {
        *self.latest.lock().unwrap() = *frame;
    }

    /// Copy out the latest frame.
    pub fn latest(&self) -> AnalysisFrame {
        *self.latest.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn publish_then_latest_roundtrips() {
        let snapshot = AnalysisSnapshot::shared();
        let mut frame = AnalysisFrame::default();
        frame.rms = 0.25;
        frame.bandwidth = -1.0;
        frame.spectrum_left[3] = 7.0;

        snapshot.publish(&frame);
        let read = snapshot.latest();
        assert_eq!(read.rms, 0.25);
        assert_eq!(read.bandwidth, -1.0);
        assert_eq!(read.spectrum_left[3], 7.0);
    }

    #[test]
    fn readers_never_observe_a_torn_frame() {
        let snapshot = AnalysisSnapshot::shared();
        let writer_snapshot = snapshot.clone();

        // Every field of a published frame carries the same marker value, so
        // any mixed read is detectable.
        let writer = thread::spawn(move || {
            for k in 0..5_000u32 {
                let marker = k as f32;
                let mut frame = AnalysisFrame {
                    rms: marker,
                    correlation: marker,
                    bandwidth: marker,
                    ..Default::default()
                };
                frame.spectrum_left.fill(marker);
                frame.spectrum_right.fill(marker);
                writer_snapshot.publish(&frame);
            }
        });

        for _ in 0..5_000 {
            let frame = snapshot.latest();
            assert_eq!(frame.rms, frame.correlation);
            assert_eq!(frame.rms, frame.bandwidth);
            assert_eq!(frame.rms, frame.spectrum_left[0]);
            assert_eq!(frame.rms, frame.spectrum_left[BIN_COUNT - 1]);
            assert_eq!(frame.rms, frame.spectrum_right[BIN_COUNT / 2]);
        }

        writer.join().unwrap();
    }
}
