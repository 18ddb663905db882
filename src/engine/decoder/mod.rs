pub mod symphonia_decoder;

use std::fmt;

use symphonia::core::audio::SignalSpec;

use crate::engine::error::DecodeFault;

/// Sample format the codec produced before conversion to `f32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeSampleFormat {
    U8,
    U16,
    U24,
    U32,
    S8,
    S16,
    S24,
    S32,
    F32,
    F64,
}

impl fmt::Display for NativeSampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NativeSampleFormat::U8 => "u8",
            NativeSampleFormat::U16 => "u16",
            NativeSampleFormat::U24 => "u24",
            NativeSampleFormat::U32 => "u32",
            NativeSampleFormat::S8 => "s8",
            NativeSampleFormat::S16 => "s16",
            NativeSampleFormat::S24 => "s24",
            NativeSampleFormat::S32 => "s32",
            NativeSampleFormat::F32 => "f32",
            NativeSampleFormat::F64 => "f64",
        };
        f.write_str(label)
    }
}

/// One decoded block in the source's native rate and channel layout.
/// Samples are interleaved and already widened to `f32`.
#[derive(Debug, Clone, Copy)]
pub struct DecodedFrame<'a> {
    pub samples: &'a [f32],
    pub frames: usize,
    pub spec: SignalSpec,
    pub format: NativeSampleFormat,
}

/// Outcome of a single pull from a decoder.
#[derive(Debug)]
pub enum FrameResult<'a> {
    Frame(DecodedFrame<'a>),
    /// Nothing ready yet; not an error, the caller retries.
    NeedsMoreInput,
    EndOfStream,
    DecodeError(DecodeFault),
}

pub trait AudioDecoder: Send {
    /// Pulls the next decoded block. A call does a bounded amount of work:
    /// it gives up with [`FrameResult::NeedsMoreInput`] rather than reading
    /// the container indefinitely.
    fn next_frame(&mut self) -> FrameResult<'_>;

    /// Native signal spec of the selected stream, if the container declared it.
    fn native_spec(&self) -> Option<SignalSpec>;

    /// Largest block `next_frame` can return, if the codec declares it.
    fn max_frames_per_block(&self) -> Option<usize>;
}
