use std::fs::File;
use std::path::Path;
use symphonia::core::audio::{AudioBufferRef, SampleBuffer, SignalSpec};
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use crate::engine::decoder::{AudioDecoder, DecodedFrame, FrameResult, NativeSampleFormat};
use crate::engine::error::{DecodeFault, OpenError};
use crate::engine::metadata::TrackMetadata;

// A corrupt packet is skipped; this many in a row ends the track.
const MAX_DECODE_RETRIES: usize = 3;
// Upper bound on packets read by a single `next_frame` call.
const MAX_PACKETS_PER_PULL: usize = 64;

pub struct SymphoniaDecoder {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    native_spec: Option<SignalSpec>,
    max_frames_per_packet: Option<usize>,
    sample_buf: Option<SampleBuffer<f32>>,
    buf_frames: usize,
    buf_spec: Option<SignalSpec>,
    decode_errors: usize,
}

impl SymphoniaDecoder {
    /// Opens `path`, probes the container, picks the first audio stream and
    /// builds its decoder. Also collects the track's tags.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<(Self, TrackMetadata), OpenError> {
        let path_ref = path.as_ref();
        let file = File::open(path_ref).map_err(|source| OpenError::NotFound {
            path: path_ref.to_path_buf(),
            source,
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path_ref.extension().and_then(|s| s.to_str()) {
            hint.with_extension(ext);
        }

        let meta_opts = MetadataOptions::default();
        let fmt_opts = FormatOptions::default();

        let mut probed = symphonia::default::get_probe()
            .format(&hint, mss, &fmt_opts, &meta_opts)
            .map_err(|err| {
                tracing::debug!(path = %path_ref.display(), "probe failed: {err}");
                OpenError::UnsupportedFormat { path: path_ref.to_path_buf() }
            })?;

        let mut metadata = TrackMetadata::placeholder(path_ref);
        if let Some(probe_meta) = probed.metadata.get() {
            if let Some(revision) = probe_meta.current() {
                metadata.apply_tags(revision.tags());
            }
        }

        let mut reader = probed.format;
        if let Some(revision) = reader.metadata().current() {
            metadata.apply_tags(revision.tags());
        }

        let tracks = reader.tracks();
        let track = tracks
            .iter()
            .find(|t| is_audio(&t.codec_params))
            .or_else(|| tracks.iter().find(|t| t.codec_params.codec != CODEC_TYPE_NULL))
            .ok_or_else(|| OpenError::NoAudioStream { path: path_ref.to_path_buf() })?;

        if track.codec_params.codec == CODEC_TYPE_NULL {
            return Err(OpenError::UnsupportedCodec { path: path_ref.to_path_buf() });
        }

        let track_id = track.id;
        let codec_params = track.codec_params.clone();
        metadata.apply_codec_params(&codec_params);

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|err| match err {
                Error::Unsupported(_) => OpenError::UnsupportedCodec {
                    path: path_ref.to_path_buf(),
                },
                other => OpenError::DecoderInitFailed {
                    path: path_ref.to_path_buf(),
                    reason: other.to_string(),
                },
            })?;

        let native_spec = codec_params
            .sample_rate
            .zip(codec_params.channels)
            .map(|(rate, channels)| SignalSpec::new(rate, channels));

        // Size the sample buffer now when the codec declares its packet
        // size; otherwise it is created by the first decoded packet.
        let max_frames_per_packet = codec_params.max_frames_per_packet;
        let sample_buf = max_frames_per_packet
            .zip(native_spec)
            .map(|(frames, spec)| SampleBuffer::<f32>::new(frames, spec));

        Ok((
            Self {
                reader,
                decoder,
                track_id,
                native_spec,
                max_frames_per_packet: max_frames_per_packet.map(|frames| frames as usize),
                buf_frames: sample_buf
                    .as_ref()
                    .and(max_frames_per_packet)
                    .map_or(0, |frames| frames as usize),
                buf_spec: sample_buf.as_ref().and(native_spec),
                sample_buf,
                decode_errors: 0,
            },
            metadata,
        ))
    }
}

impl SymphoniaDecoder {
    /// Maps a reader or decoder error that ends this pull.
    fn on_error(&mut self, err: Error) -> FrameResult<'static> {
        match err {
            Error::IoError(ref io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
                FrameResult::EndOfStream
            }
            Error::ResetRequired => {
                self.decoder.reset();
                FrameResult::NeedsMoreInput
            }
            other => FrameResult::DecodeError(fault_from(&other)),
        }
    }
}

impl AudioDecoder for SymphoniaDecoder {
    fn next_frame(&mut self) -> FrameResult<'_> {
        for _ in 0..MAX_PACKETS_PER_PULL {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(err) => return self.on_error(err),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let audio_buf = match self.decoder.decode(&packet) {
                Ok(audio_buf) => audio_buf,
                Err(Error::DecodeError(_)) => {
                    self.decode_errors += 1;
                    if self.decode_errors >= MAX_DECODE_RETRIES {
                        return FrameResult::DecodeError(DecodeFault::Corrupt);
                    }
                    continue;
                }
                Err(err) => return self.on_error(err),
            };

            self.decode_errors = 0;
            let frames = audio_buf.frames();
            if frames == 0 {
                continue;
            }
            let spec = *audio_buf.spec();
            let format = native_format(&audio_buf);
            let capacity = audio_buf.capacity();
            if self.buf_frames < capacity || self.buf_spec != Some(spec) {
                self.sample_buf = None;
                self.buf_frames = capacity;
                self.buf_spec = Some(spec);
            }
            let sample_buf = self
                .sample_buf
                .get_or_insert_with(|| SampleBuffer::<f32>::new(capacity as u64, spec));
            sample_buf.copy_interleaved_ref(audio_buf);
            return FrameResult::Frame(DecodedFrame {
                samples: sample_buf.samples(),
                frames,
                spec,
                format,
            });
        }
        FrameResult::NeedsMoreInput
    }

    fn native_spec(&self) -> Option<SignalSpec> {
        self.native_spec
    }

    fn max_frames_per_block(&self) -> Option<usize> {
        self.max_frames_per_packet
    }
}

// Only audio streams declare a rate or a channel layout.
fn is_audio(params: &CodecParameters) -> bool {
    params.sample_rate.is_some() || params.channels.is_some()
}

fn native_format(buf: &AudioBufferRef<'_>) -> NativeSampleFormat {
    match buf {
        AudioBufferRef::U8(_) => NativeSampleFormat::U8,
        AudioBufferRef::U16(_) => NativeSampleFormat::U16,
        AudioBufferRef::U24(_) => NativeSampleFormat::U24,
        AudioBufferRef::U32(_) => NativeSampleFormat::U32,
        AudioBufferRef::S8(_) => NativeSampleFormat::S8,
        AudioBufferRef::S16(_) => NativeSampleFormat::S16,
        AudioBufferRef::S24(_) => NativeSampleFormat::S24,
        AudioBufferRef::S32(_) => NativeSampleFormat::S32,
        AudioBufferRef::F32(_) => NativeSampleFormat::F32,
        AudioBufferRef::F64(_) => NativeSampleFormat::F64,
    }
}

fn fault_from(err: &Error) -> DecodeFault {
    match err {
        Error::IoError(io) => DecodeFault::Read(io.kind()),
        Error::Unsupported(_) => DecodeFault::Unsupported,
        Error::LimitError(_) => DecodeFault::Limit,
        _ => DecodeFault::Corrupt,
    }
}
