pub mod buffer;
pub mod clock;
pub mod decoder;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod metadata;
pub mod output;
pub mod session;

pub use clock::PlaybackState;
pub use dsp::OutputSpec;
pub use engine::{EndReason, PlaybackEngine, Renderer, TrackEnded};
pub use error::{DecodeFault, OpenError};
pub use metadata::TrackMetadata;
