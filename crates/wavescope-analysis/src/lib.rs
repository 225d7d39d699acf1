//! Real-time stereo analysis core.
//!
//! The playback side pushes interleaved stereo samples into a lock-free SPSC
//! ring ([`ring`]); the analysis worker ([`worker`]) drains fixed windows from
//! it, runs a per-channel FFT ([`spectral`]), derives metrics ([`metrics`])
//! and publishes the latest bundle into a shared snapshot ([`snapshot`]) that
//! a display loop reads at its own pace.

pub mod metrics;
pub mod ring;
pub mod snapshot;
pub mod spectral;
pub mod worker;

/// Number of audio channels the pipeline is fixed to.
pub const CHANNELS: usize = 2;

/// Analysis window size in frames (samples per channel per batch).
pub const WINDOW_SIZE: usize = 512;

/// Spectrum bins published per channel: the analysis-relevant half of the
/// transform output (Nyquist excluded).
pub const BIN_COUNT: usize = WINDOW_SIZE / 2;
