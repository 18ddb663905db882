use std::path::PathBuf;

/// Why a track could not be opened. Each variant names the stage that failed.
#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("could not open file {path:?}: {source}")]
    NotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unrecognised media container in {path:?}")]
    UnsupportedFormat { path: PathBuf },
    #[error("no audio stream found in {path:?}")]
    NoAudioStream { path: PathBuf },
    #[error("unsupported codec in {path:?}")]
    UnsupportedCodec { path: PathBuf },
    #[error("could not initialise decoder for {path:?}: {reason}")]
    DecoderInitFailed { path: PathBuf, reason: String },
}

impl OpenError {
    /// Short label of the stage that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            OpenError::NotFound { .. } => "file",
            OpenError::UnsupportedFormat { .. } => "container",
            OpenError::NoAudioStream { .. } => "stream",
            OpenError::UnsupportedCodec { .. } => "codec",
            OpenError::DecoderInitFailed { .. } => "decoder",
        }
    }
}

/// Mid-stream failure. Ends the current track early; never fatal.
///
/// Kept `Copy` so the render path can report it without allocating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeFault {
    #[error("too many consecutive undecodable packets")]
    Corrupt,
    #[error("container read failed ({0:?})")]
    Read(std::io::ErrorKind),
    #[error("stream uses an unsupported feature")]
    Unsupported,
    #[error("decoder hit a resource limit")]
    Limit,
    #[error("sample conversion failed")]
    Convert,
}
