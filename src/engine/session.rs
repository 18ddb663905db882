//! One open track: decoder, converter and the converted samples that did not
//! fit into the previous render tick.
//!
//! Dropping a [`MediaSession`] releases the container, codec and converter
//! state. The engine only drops sessions on the control thread.
//!
//! Construction decodes the first block on the calling thread. That settles
//! the native format and builds the resampler before the render path ever
//! sees the session, and the sample buffers are sized there too.

use std::path::{Path, PathBuf};

use crate::engine::decoder::{AudioDecoder, FrameResult, NativeSampleFormat};
use crate::engine::dsp::converter::FormatConverter;
use crate::engine::dsp::{ConvertError, OutputSpec, OUTPUT_CHANNELS};
use crate::engine::error::DecodeFault;

// Decoder pulls allowed while looking for the first block.
const PRIME_ATTEMPTS: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Convert(#[from] ConvertError),
    #[error("first block could not be decoded: {0}")]
    FirstBlock(DecodeFault),
}

/// How a fill request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    /// All requested frames are real audio.
    Filled,
    /// Decode budget ran out; the tail is silence but the stream goes on.
    Starved,
    EndOfStream,
    Fault(DecodeFault),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fill {
    pub frames: usize,
    pub outcome: FillOutcome,
}

pub struct MediaSession {
    path: PathBuf,
    decoder: Box<dyn AudioDecoder>,
    converter: FormatConverter,
    pending: Vec<f32>,
    cursor: usize,
    drained: bool,
    native_format: Option<NativeSampleFormat>,
}

impl MediaSession {
    pub fn new(
        path: impl AsRef<Path>,
        decoder: Box<dyn AudioDecoder>,
        output: OutputSpec,
        chunk_frames: usize,
    ) -> Result<Self, SessionError> {
        let converter = FormatConverter::new(output, decoder.native_spec(), chunk_frames)?;
        let mut session = Self {
            path: path.as_ref().to_path_buf(),
            decoder,
            converter,
            pending: Vec::new(),
            cursor: 0,
            drained: false,
            native_format: None,
        };
        let first_block = session.prime()?;

        // Refills only run once `pending` is drained, so one block's output
        // or the flush tail is the most it ever holds.
        let block = session
            .decoder
            .max_frames_per_block()
            .unwrap_or(first_block.max(chunk_frames));
        session.converter.reserve(block);
        let peak = session
            .converter
            .max_output_frames(block)
            .max(session.converter.max_flush_frames());
        session.pending.reserve(peak * OUTPUT_CHANNELS);

        tracing::debug!(
            path = %session.path.display(),
            format = ?session.native_format,
            block,
            resampling = session.converter.is_resampling(),
            "media session ready"
        );
        Ok(session)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sample format of the decoded stream, known once a block was decoded.
    pub fn native_format(&self) -> Option<NativeSampleFormat> {
        self.native_format
    }

    /// Pulls until the first block is converted or the stream ends. Returns
    /// the size of that block in native frames.
    fn prime(&mut self) -> Result<usize, SessionError> {
        for _ in 0..PRIME_ATTEMPTS {
            match self.refill().map_err(SessionError::FirstBlock)? {
                0 if !self.drained => continue,
                frames => return Ok(frames),
            }
        }
        Ok(0)
    }

    /// Writes up to `out.len() / 2` stereo frames scaled by `gain`, decoding
    /// at most `max_steps` times. Whatever is not real audio is zeroed.
    pub fn fill(&mut self, out: &mut [f32], gain: f32, max_steps: usize) -> Fill {
        let wanted = out.len() / OUTPUT_CHANNELS;
        let mut written = 0;
        let mut steps = 0;

        let outcome = loop {
            written += self.drain_pending(&mut out[written * OUTPUT_CHANNELS..], gain);
            if written == wanted {
                break FillOutcome::Filled;
            }
            if self.drained {
                break FillOutcome::EndOfStream;
            }
            if steps == max_steps {
                break FillOutcome::Starved;
            }
            steps += 1;
            if let Err(fault) = self.refill() {
                break FillOutcome::Fault(fault);
            }
        };

        out[written * OUTPUT_CHANNELS..].fill(0.0);
        Fill { frames: written, outcome }
    }

    /// Copies buffered samples into `out`, returning frames written.
    fn drain_pending(&mut self, out: &mut [f32], gain: f32) -> usize {
        let available = self.pending.len() - self.cursor;
        let take = available.min(out.len()) / OUTPUT_CHANNELS * OUTPUT_CHANNELS;
        let src = &self.pending[self.cursor..self.cursor + take];
        for (dst, s) in out[..take].iter_mut().zip(src) {
            *dst = s * gain;
        }
        self.cursor += take;
        if self.cursor == self.pending.len() {
            self.pending.clear();
            self.cursor = 0;
        }
        take / OUTPUT_CHANNELS
    }

    /// One decode step. Marks the session drained at end of stream after
    /// flushing the converter. Returns the native frames decoded.
    fn refill(&mut self) -> Result<usize, DecodeFault> {
        if self.cursor > 0 {
            self.pending.drain(..self.cursor);
            self.cursor = 0;
        }
        match self.decoder.next_frame() {
            FrameResult::Frame(frame) => {
                self.native_format = Some(frame.format);
                self.converter
                    .convert(&frame, &mut self.pending)
                    .map_err(|_| DecodeFault::Convert)?;
                Ok(frame.frames)
            }
            FrameResult::NeedsMoreInput => Ok(0),
            FrameResult::EndOfStream => {
                self.converter
                    .flush(&mut self.pending)
                    .map_err(|_| DecodeFault::Convert)?;
                self.drained = true;
                Ok(0)
            }
            FrameResult::DecodeError(fault) => Err(fault),
        }
    }
}

impl Drop for MediaSession {
    fn drop(&mut self) {
        tracing::debug!(path = %self.path.display(), "media session released");
    }
}
