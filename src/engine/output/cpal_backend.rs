use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};

use crate::config::EngineConfig;
use crate::engine::dsp::OUTPUT_CHANNELS;
use crate::engine::engine::Renderer;
use crate::engine::output::device::device_name;
use crate::engine::output::{AudioOutput, DeviceError};

/// Device stream driving a [`Renderer`] from the cpal callback.
pub struct CpalBackend {
    stream: Stream,
    device_name: String,
    is_healthy: Arc<AtomicBool>,
}

impl CpalBackend {
    /// Builds the stream. It stays silent until the engine is `Playing`;
    /// call [`AudioOutput::start`] to make the device pull.
    pub fn new(
        device: &cpal::Device,
        supported: cpal::SupportedStreamConfig,
        renderer: Renderer,
        config: &EngineConfig,
    ) -> Result<Self, DeviceError> {
        let device_name = device_name(device);
        let sample_format = supported.sample_format();
        let stream_config: StreamConfig = supported.into();

        let is_healthy = Arc::new(AtomicBool::new(true));
        let scratch_frames = config.render_scratch_frames.max(1);

        let stream = match sample_format {
            SampleFormat::F32 => {
                build_stream::<f32>(device, &stream_config, renderer, scratch_frames, &is_healthy)?
            }
            SampleFormat::I16 => {
                build_stream::<i16>(device, &stream_config, renderer, scratch_frames, &is_healthy)?
            }
            SampleFormat::I32 => {
                build_stream::<i32>(device, &stream_config, renderer, scratch_frames, &is_healthy)?
            }
            SampleFormat::U16 => {
                build_stream::<u16>(device, &stream_config, renderer, scratch_frames, &is_healthy)?
            }
            other => return Err(DeviceError::UnsupportedSampleFormat(other)),
        };

        tracing::info!(
            device = %device_name,
            sample_rate = stream_config.sample_rate,
            channels = stream_config.channels,
            format = ?sample_format,
            "output stream ready"
        );

        Ok(Self {
            stream,
            device_name,
            is_healthy,
        })
    }
}

impl AudioOutput for CpalBackend {
    fn start(&mut self) -> Result<(), DeviceError> {
        self.stream.play()?;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), DeviceError> {
        self.stream.pause()?;
        tracing::debug!(device = %self.device_name, "output stream paused");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        if let Err(err) = self.stream.pause() {
            tracing::debug!(device = %self.device_name, "pause on stop failed: {err}");
        }
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.is_healthy.load(Ordering::SeqCst)
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut renderer: Renderer,
    scratch_frames: usize,
    is_healthy: &Arc<AtomicBool>,
) -> Result<Stream, DeviceError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut scratch = vec![0.0f32; scratch_frames * OUTPUT_CHANNELS];

    let is_healthy_err = is_healthy.clone();
    let err_fn = move |err| {
        is_healthy_err.store(false, Ordering::SeqCst);
        tracing::warn!("output stream error: {err}");
    };

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            process_audio(data, channels, &mut renderer, &mut scratch);
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}

/// Renders into the stereo scratch buffer in slices and writes the device
/// buffer from it.
fn process_audio<T: Sample + FromSample<f32>>(
    data: &mut [T],
    channels: usize,
    renderer: &mut Renderer,
    scratch: &mut [f32],
) {
    if channels == 0 {
        return;
    }
    let scratch_frames = scratch.len() / OUTPUT_CHANNELS;
    for block in data.chunks_mut(scratch_frames * channels) {
        let frames = block.len() / channels;
        let stereo = &mut scratch[..frames * OUTPUT_CHANNELS];
        renderer.render_into(stereo, frames);
        write_frames(stereo, block, channels);
    }
}

/// Maps interleaved stereo onto `channels` device channels: mono gets the
/// average, extra channels get silence.
fn write_frames<T: Sample + FromSample<f32>>(stereo: &[f32], out: &mut [T], channels: usize) {
    let frames = out.chunks_exact_mut(channels);
    for (frame, lr) in frames.zip(stereo.chunks_exact(OUTPUT_CHANNELS)) {
        if channels == 1 {
            frame[0] = T::from_sample(0.5 * (lr[0] + lr[1]));
            continue;
        }
        frame[0] = T::from_sample(lr[0]);
        frame[1] = T::from_sample(lr[1]);
        for extra in &mut frame[2..] {
            *extra = T::from_sample(0.0f32);
        }
    }
}
