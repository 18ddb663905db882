pub mod converter;
pub mod remix;
pub mod resampler;

/// Number of interleaved channels the engine renders.
pub const OUTPUT_CHANNELS: usize = 2;

/// Fixed format the renderer produces: interleaved stereo `f32` at the
/// device sample rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSpec {
    pub sample_rate: u32,
}

impl OutputSpec {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("resampler setup failed ({from} Hz -> {to} Hz): {reason}")]
    Setup { from: u32, to: u32, reason: String },
    #[error("resampling failed: {0}")]
    Process(String),
    #[error("source has no channels")]
    NoChannels,
}
