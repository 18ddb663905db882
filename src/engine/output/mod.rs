pub mod cpal_backend;
pub mod device;

/// Failures of the output device. Reported to the caller, never retried.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("no default output device")]
    NoDefaultDevice,
    #[error("no output device matched: {0}")]
    NoMatch(String),
    #[error("cannot enumerate output devices: {0}")]
    Enumerate(#[from] cpal::DevicesError),
    #[error("cannot query output configs: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),
    #[error("cannot query default output config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),
    #[error("device offers no usable output config")]
    NoConfig,
    #[error("unsupported device sample format: {0:?}")]
    UnsupportedSampleFormat(cpal::SampleFormat),
    #[error("cannot build output stream: {0}")]
    Build(#[from] cpal::BuildStreamError),
    #[error("cannot start output stream: {0}")]
    Play(#[from] cpal::PlayStreamError),
    #[error("cannot pause output stream: {0}")]
    Pause(#[from] cpal::PauseStreamError),
}

pub trait AudioOutput {
    /// Starts pulling audio from the renderer.
    fn start(&mut self) -> Result<(), DeviceError>;

    /// Pauses the device stream; `start` resumes it.
    fn pause(&mut self) -> Result<(), DeviceError>;

    /// Stops the device stream. Idempotent.
    fn stop(&mut self) -> Result<(), DeviceError>;

    /// `false` once the backend has reported a stream error.
    fn is_healthy(&self) -> bool;
}
