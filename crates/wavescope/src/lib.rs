//! Playback side of wavescope: decoding, device output and pipeline wiring.

pub mod cli;
pub mod config;
pub mod decode;
pub mod device;
pub mod pipeline;
pub mod playback;
pub mod sink;
