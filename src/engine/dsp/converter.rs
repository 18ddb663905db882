use symphonia::core::audio::SignalSpec;

use crate::engine::decoder::DecodedFrame;
use crate::engine::dsp::remix::StereoRemix;
use crate::engine::dsp::resampler::Resampler;
use crate::engine::dsp::{ConvertError, OutputSpec, OUTPUT_CHANNELS};

/// Turns native decoded frames into the fixed output format.
///
/// Channel mapping happens first, at the native rate, so the resampler only
/// ever sees two channels. The converter rebuilds itself when the native
/// spec changes mid-stream; that rebuild allocates, everything else runs in
/// buffers sized by [`reserve`](Self::reserve).
pub struct FormatConverter {
    output: OutputSpec,
    chunk_frames: usize,
    native: Option<SignalSpec>,
    remix: Option<StereoRemix>,
    resampler: Option<Resampler>,
    stereo: Vec<f32>,
}

impl FormatConverter {
    pub fn new(
        output: OutputSpec,
        native: Option<SignalSpec>,
        chunk_frames: usize,
    ) -> Result<Self, ConvertError> {
        let mut converter = Self {
            output,
            chunk_frames: chunk_frames.max(1),
            native: None,
            remix: None,
            resampler: None,
            stereo: Vec::with_capacity(chunk_frames * OUTPUT_CHANNELS),
        };
        if let Some(spec) = native {
            converter.reconfigure(spec)?;
        }
        Ok(converter)
    }

    /// Whether the sample rate is being converted.
    pub fn is_resampling(&self) -> bool {
        self.resampler.is_some()
    }

    /// Whether a native spec is known and the stages are built.
    pub fn is_configured(&self) -> bool {
        self.native.is_some()
    }

    /// Sizes the internal buffers for native blocks of up to `frames`.
    pub fn reserve(&mut self, frames: usize) {
        self.stereo.reserve(frames * OUTPUT_CHANNELS);
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reserve_input(frames);
        }
    }

    /// Upper bound on the frames one `convert` of `input_frames` appends.
    pub fn max_output_frames(&self, input_frames: usize) -> usize {
        match &self.resampler {
            Some(resampler) => resampler.max_output_frames(input_frames),
            None => input_frames,
        }
    }

    /// Upper bound on the frames `flush` appends.
    pub fn max_flush_frames(&self) -> usize {
        self.resampler.as_ref().map_or(0, Resampler::max_flush_frames)
    }

    /// Converts one native frame and appends interleaved stereo samples at
    /// the output rate to `out`. Returns the number of frames appended,
    /// which can be zero while the resampler collects a full chunk.
    pub fn convert(
        &mut self,
        frame: &DecodedFrame<'_>,
        out: &mut Vec<f32>,
    ) -> Result<usize, ConvertError> {
        if self.native != Some(frame.spec) {
            self.reconfigure(frame.spec)?;
        }
        let remix = self.remix.as_ref().ok_or(ConvertError::NoChannels)?;

        self.stereo.clear();
        remix.apply(frame.samples, frame.frames, &mut self.stereo);

        match self.resampler.as_mut() {
            Some(resampler) => resampler.process(&self.stereo, out),
            None => {
                out.extend_from_slice(&self.stereo);
                Ok(self.stereo.len() / OUTPUT_CHANNELS)
            }
        }
    }

    /// Drains whatever the resampler still holds. Call once at end of stream.
    pub fn flush(&mut self, out: &mut Vec<f32>) -> Result<usize, ConvertError> {
        match self.resampler.as_mut() {
            Some(resampler) => resampler.flush(out),
            None => Ok(0),
        }
    }

    fn reconfigure(&mut self, spec: SignalSpec) -> Result<(), ConvertError> {
        if spec.channels.count() == 0 {
            return Err(ConvertError::NoChannels);
        }
        self.resampler = if spec.rate != self.output.sample_rate {
            Some(Resampler::new(
                spec.rate,
                self.output.sample_rate,
                OUTPUT_CHANNELS,
                self.chunk_frames,
            )?)
        } else {
            None
        };
        self.remix = Some(StereoRemix::for_layout(spec.channels));
        self.native = Some(spec);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::decoder::NativeSampleFormat;
    use symphonia::core::audio::Channels;

    fn stereo() -> Channels {
        Channels::FRONT_LEFT | Channels::FRONT_RIGHT
    }

    fn frame<'a>(samples: &'a [f32], rate: u32, channels: Channels) -> DecodedFrame<'a> {
        let spec = SignalSpec::new(rate, channels);
        DecodedFrame {
            samples,
            frames: samples.len() / spec.channels.count(),
            spec,
            format: NativeSampleFormat::S16,
        }
    }

    #[test]
    fn identity_rate_keeps_frame_count() {
        let stereo = stereo();
        let mut conv = FormatConverter::new(OutputSpec::new(48_000), None, 1024).unwrap();
        let input = vec![0.25f32; 2 * 300];
        let mut out = Vec::new();
        assert_eq!(conv.convert(&frame(&input, 48_000, stereo), &mut out).unwrap(), 300);
        assert!(!conv.is_resampling());
        assert_eq!(out.len(), 600);
        assert_eq!(conv.flush(&mut out).unwrap(), 0);
    }

    #[test]
    fn three_channel_source_becomes_stereo() {
        let layout = Channels::FRONT_LEFT | Channels::FRONT_RIGHT | Channels::FRONT_CENTRE;
        let native = SignalSpec::new(48_000, layout);
        let mut conv = FormatConverter::new(OutputSpec::new(48_000), Some(native), 1024).unwrap();
        let input = vec![1.0f32; 3 * 128];
        let mut out = Vec::new();
        assert_eq!(conv.convert(&frame(&input, 48_000, layout), &mut out).unwrap(), 128);
        assert_eq!(out.len(), 256);
        assert!(out.iter().all(|s| s.is_finite() && s.abs() <= 1.0 + 1e-6));
    }

    #[test]
    fn rate_change_mid_stream_switches_to_resampling() {
        let stereo = stereo();
        let mut conv = FormatConverter::new(OutputSpec::new(48_000), None, 1024).unwrap();
        let input = vec![0.0f32; 2 * 256];
        let mut out = Vec::new();
        conv.convert(&frame(&input, 48_000, stereo), &mut out).unwrap();
        assert!(!conv.is_resampling());

        let long = vec![0.0f32; 2 * 8192];
        let produced = conv.convert(&frame(&long, 44_100, stereo), &mut out).unwrap();
        assert!(conv.is_resampling());
        assert!(produced > 0);
    }

    #[test]
    fn unknown_native_spec_is_learned_from_the_first_frame() {
        let mut conv = FormatConverter::new(OutputSpec::new(48_000), None, 1024).unwrap();
        assert!(!conv.is_configured());
        assert_eq!(conv.max_output_frames(100), 100);
        assert_eq!(conv.max_flush_frames(), 0);

        let input = vec![0.5f32; 2 * 100];
        conv.convert(&frame(&input, 44_100, stereo()), &mut Vec::new()).unwrap();
        assert!(conv.is_configured());
        assert!(conv.max_output_frames(100) > 100);
        assert!(conv.max_flush_frames() > 0);
    }
}
