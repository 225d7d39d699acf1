//! Playback stage (CPAL output stream).
//!
//! Builds the CPAL output stream and provides the real-time audio callback.
//! The callback:
//! - refills a small local buffer from the stream buffer without blocking
//! - applies basic channel mapping (stereo source onto the device layout)
//! - converts `f32` samples to the device sample format

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use cpal::traits::{DeviceTrait, StreamTrait};

use crate::config::PlayerConfig;
use crate::device::pick_output_config;
use crate::sink::{OutputSink, StreamBuffer};

/// Keeps the CPAL stream alive on the thread that opened it.
///
/// `cpal::Stream` is not `Send`, so the stream handle stays with the caller
/// while the [`CpalSink`] half crosses into the playback thread. Dropping the
/// guard closes the shared buffer, failing any in-flight writes.
pub struct StreamGuard {
    _stream: cpal::Stream,
    buffer: Arc<StreamBuffer>,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.buffer.close();
    }
}

/// [`OutputSink`] backed by a CPAL output stream.
///
/// Writes block while the stream buffer is full, which paces decoding to
/// real time.
pub struct CpalSink {
    buffer: Arc<StreamBuffer>,
    drain_timeout: Duration,
}

impl CpalSink {
    /// Open an output stream on `device` at exactly `sample_rate` Hz.
    ///
    /// The guard must outlive playback; the sink is the writable half.
    pub fn open(
        device: &cpal::Device,
        sample_rate: u32,
        cfg: &PlayerConfig,
    ) -> Result<(StreamGuard, Self)> {
        let supported = pick_output_config(device, sample_rate)?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.config();

        let buffer = Arc::new(StreamBuffer::new(buffer_samples(
            sample_rate,
            cfg.buffer_seconds,
        )));

        let stream = build_output_stream(device, &config, sample_format, &buffer, cfg)?;
        stream.play()?;

        tracing::info!(
            device = %device.description()?,
            rate = sample_rate,
            channels = config.channels,
            format = ?sample_format,
            "output stream started"
        );

        let guard = StreamGuard {
            _stream: stream,
            buffer: buffer.clone(),
        };
        let sink = Self {
            buffer,
            drain_timeout: Duration::from_secs_f32(cfg.buffer_seconds.max(1.0) * 2.0),
        };
        Ok((guard, sink))
    }
}

impl OutputSink for CpalSink {
    fn write(&mut self, samples: &[f32]) -> Result<()> {
        if !self.buffer.push_blocking(samples) {
            bail!("output stream closed");
        }
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        if !self.buffer.wait_empty(self.drain_timeout) {
            tracing::warn!("output buffer did not drain before timeout");
        }
        self.buffer.close();
        Ok(())
    }
}

/// Stream buffer capacity in interleaved samples for `seconds` of stereo
/// audio at `rate`.
fn buffer_samples(rate: u32, seconds: f32) -> usize {
    let seconds = if seconds.is_finite() && seconds > 0.0 {
        seconds
    } else {
        2.0
    };
    ((rate as f32 * seconds) as usize).max(1) * 2
}

/// Build a CPAL output stream that plays interleaved stereo `f32` samples
/// from `buffer`.
///
/// ## Real-time constraints
/// The callback never blocks on a condition variable and only briefly locks
/// the stream buffer. Underruns are filled with zeros (silence).
fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    buffer: &Arc<StreamBuffer>,
    cfg: &PlayerConfig,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, buffer, cfg),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, buffer, cfg),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, buffer, cfg),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, buffer, cfg),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

/// Type-specialized stream builder for CPAL sample formats.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    buffer: &Arc<StreamBuffer>,
    cfg: &PlayerConfig,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels_out = config.channels as usize;
    let refill_max_samples = cfg.refill_max_frames.max(1) * 2;

    let state = Arc::new(Mutex::new(PlaybackState {
        pos: 0,
        src: Vec::new(),
    }));

    let buffer_cb = buffer.clone();
    let buffer_err = buffer.clone();
    let err_fn = move |err| {
        tracing::warn!("stream error: {err}");
        buffer_err.close();
    };

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            let mut st = state.lock().unwrap();

            let frames = data.len() / channels_out;
            for frame in 0..frames {
                if st.pos >= st.src.len() {
                    st.pos = 0;
                    st.src.clear();
                    match buffer_cb.pop_chunk(refill_max_samples) {
                        Some(v) => st.src = v,
                        None => {
                            // No more audio ready; fill the rest with silence.
                            for idx in (frame * channels_out)..data.len() {
                                data[idx] = <T as cpal::Sample>::from_sample::<f32>(0.0);
                            }
                            return;
                        }
                    }
                }
                for ch in 0..channels_out {
                    let sample_f32 = next_sample_mapped(&mut st, channels_out, ch);
                    data[frame * channels_out + ch] =
                        <T as cpal::Sample>::from_sample::<f32>(sample_f32);
                }
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Local playback buffer state for the CPAL callback.
///
/// A small Vec of interleaved stereo samples fetched from the stream buffer
/// so the callback can run quickly without locking on every sample.
struct PlaybackState {
    pos: usize,
    src: Vec<f32>,
}

/// Read one output sample for `dst_ch` from the stereo source frame.
///
/// Mapping rules:
/// - stereo → mono: average L/R
/// - stereo → stereo: pass-through
/// - wider layouts: L/R on the first two channels, silence on the rest
///
/// `st.pos` advances once per destination frame (after the last channel).
fn next_sample_mapped(st: &mut PlaybackState, dst_channels: usize, dst_ch: usize) -> f32 {
    if st.pos >= st.src.len() {
        return 0.0;
    }

    let frame_start = st.pos;
    let get_src = |ch: usize| -> f32 {
        if frame_start + ch < st.src.len() {
            st.src[frame_start + ch]
        } else {
            0.0
        }
    };

    let out = match dst_channels {
        1 => 0.5 * (get_src(0) + get_src(1)),
        _ if dst_ch < 2 => get_src(dst_ch),
        _ => 0.0,
    };

    if dst_ch + 1 == dst_channels {
        st.pos += 2;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(samples: &[f32]) -> PlaybackState {
        PlaybackState {
            pos: 0,
            src: samples.to_vec(),
        }
    }

    #[test]
    fn stereo_passes_through() {
        let mut st = state(&[0.1, 0.2, 0.3, 0.4]);
        assert_eq!(next_sample_mapped(&mut st, 2, 0), 0.1);
        assert_eq!(next_sample_mapped(&mut st, 2, 1), 0.2);
        assert_eq!(next_sample_mapped(&mut st, 2, 0), 0.3);
        assert_eq!(next_sample_mapped(&mut st, 2, 1), 0.4);
    }

    #[test]
    fn mono_output_averages_the_pair() {
        let mut st = state(&[0.2, 0.6]);
        assert!((next_sample_mapped(&mut st, 1, 0) - 0.4).abs() < 1e-6);
        assert_eq!(st.pos, 2);
    }

    #[test]
    fn wide_output_gets_silence_past_stereo() {
        let mut st = state(&[0.1, 0.2]);
        assert_eq!(next_sample_mapped(&mut st, 4, 0), 0.1);
        assert_eq!(next_sample_mapped(&mut st, 4, 1), 0.2);
        assert_eq!(next_sample_mapped(&mut st, 4, 2), 0.0);
        assert_eq!(next_sample_mapped(&mut st, 4, 3), 0.0);
        assert_eq!(st.pos, 2);
    }

    #[test]
    fn exhausted_source_yields_silence() {
        let mut st = state(&[]);
        assert_eq!(next_sample_mapped(&mut st, 2, 0), 0.0);
    }

    #[test]
    fn buffer_samples_sizes_by_rate_and_duration() {
        assert_eq!(buffer_samples(48_000, 2.0), 48_000 * 2 * 2);
        // Non-finite or non-positive durations fall back to two seconds.
        assert_eq!(buffer_samples(44_100, f32::NAN), 44_100 * 2 * 2);
        assert_eq!(buffer_samples(44_100, -1.0), 44_100 * 2 * 2);
    }
}
