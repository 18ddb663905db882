/// Engine tuning parameters shared by the decode, convert and render stages.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Resampler input chunk size in frames.
    pub chunk_frames: usize,
    /// Max decoder pulls per render tick before the tick gives up and pads
    /// with silence.
    pub max_decode_steps: usize,
    /// Capacity of the render-to-control queue of finished tracks.
    pub event_capacity: usize,
    /// Stereo scratch frames preallocated for the device callback.
    pub render_scratch_frames: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_frames: 1024,
            max_decode_steps: 32,
            event_capacity: 8,
            render_scratch_frames: 8192,
        }
    }
}
