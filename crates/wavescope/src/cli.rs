use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "wavescope", version)]
pub struct Args {
    /// Path to audio file (FLAC/MP3/WAV/OGG/AAC)
    #[arg(required_unless_present = "list_devices")]
    pub path: Option<PathBuf>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Output buffer target in seconds
    #[arg(long, default_value_t = 2.0)]
    pub buffer_seconds: f32,

    /// Playback callback refill cap (frames). Larger reduces lock churn but can add latency.
    #[arg(long, default_value_t = 4096)]
    pub refill_max_frames: usize,

    /// Analysis ring capacity in samples (power of two)
    #[arg(long, default_value_t = 16_384)]
    pub ring_capacity: usize,

    /// Metrics display refresh interval in milliseconds
    #[arg(long, default_value_t = 250)]
    pub refresh_ms: u64,
}
