use rubato::{Resampler as RubatoResampler, Fft, FixedSync};
use audioadapter_buffers::direct::InterleavedSlice;

use crate::engine::dsp::ConvertError;

// Zero chunks pushed at most by one `flush` to get the delayed tail out.
const MAX_FLUSH_ROUNDS: usize = 16;

/// Streaming sample-rate converter for interleaved audio.
///
/// Rubato works on fixed input chunks, so partial input is carried over to
/// the next call; the carry is what keeps consecutive decoded blocks
/// continuous. The filter delay is trimmed from the front and pushed out at
/// [`flush`](Self::flush), so the output lines up with the input and has
/// exactly the length the rate ratio gives.
pub struct Resampler {
    resampler: Fft<f32>,
    channels: usize,
    chunk_size: usize,
    ratio: f64,
    delay: usize,
    /// Leading output frames still to drop.
    skip: usize,
    frames_in: u64,
    frames_out: u64,
    carry: Vec<f32>,
    scratch: Vec<f32>,
}

impl Resampler {
    pub fn new(
        source_sample_rate: u32,
        target_sample_rate: u32,
        channels: usize,
        chunk_size: usize,
    ) -> Result<Self, ConvertError> {
        let resampler = Fft::<f32>::new(
            source_sample_rate as usize,
            target_sample_rate as usize,
            chunk_size,
            2,
            channels,
            FixedSync::Input,
        )
        .map_err(|e| ConvertError::Setup {
            from: source_sample_rate,
            to: target_sample_rate,
            reason: e.to_string(),
        })?;

        // Rubato may round the requested chunk to what the FFT sizes allow.
        let chunk_size = resampler.input_frames_next();
        let delay = resampler.output_delay();
        let scratch = vec![0.0; resampler.output_frames_max() * channels];

        Ok(Self {
            resampler,
            channels,
            chunk_size,
            ratio: target_sample_rate as f64 / source_sample_rate as f64,
            delay,
            skip: delay,
            frames_in: 0,
            frames_out: 0,
            carry: Vec::with_capacity(chunk_size * channels * 2),
            scratch,
        })
    }

    /// Makes room for blocks of up to `frames` input frames so that
    /// [`process`](Self::process) does not grow the carry.
    pub fn reserve_input(&mut self, frames: usize) {
        self.carry.reserve((frames + self.chunk_size) * self.channels);
    }

    /// Upper bound on the frames one `process` call with `input_frames`
    /// frames can append.
    pub fn max_output_frames(&self, input_frames: usize) -> usize {
        let chunks = input_frames.div_ceil(self.chunk_size) + 1;
        chunks * self.resampler.output_frames_max()
    }

    /// Upper bound on the frames `flush` appends before trimming.
    pub fn max_flush_frames(&self) -> usize {
        self.delay + 3 * self.resampler.output_frames_max()
    }

    /// Feeds interleaved `input` and appends every completed output chunk to
    /// `out`. Returns the number of output frames appended.
    pub fn process(&mut self, input: &[f32], out: &mut Vec<f32>) -> Result<usize, ConvertError> {
        self.carry.extend_from_slice(input);
        self.frames_in += (input.len() / self.channels) as u64;
        self.run_chunks(out)
    }

    /// Pads the carried partial chunk with silence and keeps pushing silent
    /// chunks until the delayed tail is out. The total output is cut to
    /// the input length at the rate ratio.
    pub fn flush(&mut self, out: &mut Vec<f32>) -> Result<usize, ConvertError> {
        let expected = (self.frames_in as f64 * self.ratio).round() as u64;
        let chunk_len = self.chunk_size * self.channels;
        let mut appended = 0;

        let mut rounds = 0;
        while self.frames_out < expected && rounds < MAX_FLUSH_ROUNDS {
            self.carry.resize(chunk_len, 0.0);
            appended += self.run_chunks(out)?;
            rounds += 1;
        }
        self.carry.clear();

        let excess = (self.frames_out.saturating_sub(expected) as usize).min(appended);
        out.truncate(out.len() - excess * self.channels);
        self.frames_out -= excess as u64;
        Ok(appended - excess)
    }

    fn run_chunks(&mut self, out: &mut Vec<f32>) -> Result<usize, ConvertError> {
        let chunk_len = self.chunk_size * self.channels;
        let mut consumed = 0;
        let mut produced = 0;

        while self.carry.len() - consumed >= chunk_len {
            let out_frames = self.resampler.output_frames_next();

            let chunk = &self.carry[consumed..consumed + chunk_len];
            let input_adapter = InterleavedSlice::new(chunk, self.channels, self.chunk_size)
                .map_err(|e| ConvertError::Process(e.to_string()))?;
            let mut output_adapter = InterleavedSlice::new_mut(
                &mut self.scratch[..out_frames * self.channels],
                self.channels,
                out_frames,
            )
            .map_err(|e| ConvertError::Process(e.to_string()))?;

            let (_nbr_in, nbr_out) = self
                .resampler
                .process_into_buffer(&input_adapter, &mut output_adapter, None)
                .map_err(|e| ConvertError::Process(e.to_string()))?;

            let skip = self.skip.min(nbr_out);
            self.skip -= skip;
            out.extend_from_slice(&self.scratch[skip * self.channels..nbr_out * self.channels]);
            consumed += chunk_len;
            produced += nbr_out - skip;
        }

        self.carry.drain(..consumed);
        self.frames_out += produced as u64;
        Ok(produced)
    }
}
