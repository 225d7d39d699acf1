//! Per-window metric math used by the analysis worker.

use rustfft::num_complex::Complex;

/// Magnitude a bin must exceed to count toward the bandwidth bounds.
pub const ENERGY_THRESHOLD: f32 = 0.1;

/// Sentinel frequency meaning "no bin exceeded the threshold".
const UNSET_FREQ: f32 = -1.0;

/// Average of the two channels' root-mean-square levels.
pub fn rms(left: &[f32], right: &[f32]) -> f32 {
    debug_assert_eq!(left.len(), right.len());
    (channel_rms(left) + channel_rms(right)) / 2.0
}

fn channel_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|&x| x * x).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Normalized cross-covariance of the two channels over the window.
///
/// Deliberately not a correlation coefficient: the sum is divided by the
/// window length only, never by the channels' standard deviations. The sign
/// carries phase information (negative for out-of-phase material) and the
/// magnitude scales with signal level.
pub fn stereo_correlation(left: &[f32], right: &[f32]) -> f32 {
    debug_assert_eq!(left.len(), right.len());
    if left.is_empty() {
        return 0.0;
    }
    let sum: f32 = left.iter().zip(right).map(|(&l, &r)| l * r).sum();
    sum / left.len() as f32
}

/// Occupied bandwidth of one channel in Hz.
///
/// Scans the analysis bins below Nyquist and tracks the lowest and highest
/// bin frequency (`i * sample_rate / window_size`) whose magnitude exceeds
/// [`ENERGY_THRESHOLD`]. When no bin qualifies (silence), both bounds stay at
/// the unset sentinel and the result is negative; callers publish that
/// degenerate value as-is rather than clamping it.
pub fn channel_bandwidth(bins: &[Complex<f32>], sample_rate: f32, window_size: usize) -> f32 {
    let mut min_freq = UNSET_FREQ;
    let mut max_freq = UNSET_FREQ;

    for (i, bin) in bins.iter().take(window_size / 2).enumerate() {
        if bin.norm() > ENERGY_THRESHOLD {
            let freq = i as f32 * sample_rate / window_size as f32;
            if min_freq < 0.0 {
                min_freq = freq;
            }
            max_freq = freq;
        }
    }

    if max_freq < 0.0 {
        return UNSET_FREQ;
    }
    max_freq - min_freq
}

/// Per-bin magnitudes written into `out` (one slot per analysis bin).
pub fn write_magnitudes(bins: &[Complex<f32>], out: &mut [f32]) {
    for (dst, bin) in out.iter_mut().zip(bins) {
        *dst = bin.norm();
    }
}
