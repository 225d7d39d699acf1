/// Playback tuning parameters shared by the output stages.
#[derive(Clone, Debug)]
pub struct PlayerConfig {
    /// Max frames pulled from the stream buffer per output callback refill.
    pub refill_max_frames: usize,
    /// Target output buffer duration used to size the stream buffer.
    pub buffer_seconds: f32,
}

impl Default for PlayerConfig {
    /// Defaults tuned for low-risk playback across common devices.
    fn default() -> Self {
        Self {
            refill_max_frames: 4096,
            buffer_seconds: 2.0,
        }
    }
}
