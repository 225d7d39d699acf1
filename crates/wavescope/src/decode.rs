//! Decoder boundary and the Symphonia-backed implementation.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Pull-based source of interleaved stereo `f32` PCM.
///
/// One decoded chunk per call: `Ok(Some(_))` holds a whole number of stereo
/// frames, `Ok(None)` is end-of-stream, `Err` is an unrecoverable failure.
/// Chunk length varies with the source packet size.
pub trait PcmSource: Send {
    fn sample_rate(&self) -> u32;

    fn next_chunk(&mut self) -> Result<Option<&[f32]>>;
}

/// File-backed [`PcmSource`] using Symphonia: probe once, decode per packet
/// on demand.
pub struct SymphoniaSource {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    chunk: Vec<f32>,
}

impl SymphoniaSource {
    /// Probe `path` and prepare a decoder for its default audio track.
    ///
    /// Mono sources are accepted (duplicated onto both channels when read);
    /// anything with more than two channels is rejected up front since the
    /// analysis side is fixed to stereo.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("open {path:?}"))?;

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;

        let format = probed.format;
        let track = format
            .default_track()
            .ok_or_else(|| anyhow!("no default audio track"))?;

        let channels = track
            .codec_params
            .channels
            .ok_or_else(|| anyhow!("unknown channel layout"))?
            .count();
        if channels == 0 || channels > 2 {
            bail!("unsupported channel count {channels}; playback is stereo only");
        }

        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| anyhow!("unknown sample rate"))?;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())?;
        let track_id = track.id;

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
            chunk: Vec::new(),
        })
    }
}

impl PcmSource for SymphoniaSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn next_chunk(&mut self) -> Result<Option<&[f32]>> {
        loop {
            // A failed packet read is end-of-stream; a failed packet decode
            // is skipped and the next packet tried.
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(_) => return Ok(None),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                Err(_) => continue,
            };

            let mut buf = SampleBuffer::<f32>::new(decoded.frames() as u64, *decoded.spec());
            buf.copy_interleaved_ref(decoded);
            let samples = buf.samples();
            if samples.is_empty() {
                continue;
            }

            self.chunk.clear();
            if self.channels == 1 {
                // Mono becomes both halves of an already-split stereo pair.
                for &s in samples {
                    self.chunk.push(s);
                    self.chunk.push(s);
                }
            } else {
                self.chunk.extend_from_slice(samples);
            }

            return Ok(Some(&self.chunk));
        }
    }
}
