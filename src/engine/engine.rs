use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use crate::config::EngineConfig;
use crate::engine::buffer::{create_ring, RingConsumer, RingProducer};
use crate::engine::clock::{Clock, PlaybackState};
use crate::engine::decoder::{AudioDecoder, symphonia_decoder::SymphoniaDecoder};
use crate::engine::dsp::{OutputSpec, OUTPUT_CHANNELS};
use crate::engine::error::{DecodeFault, OpenError};
use crate::engine::metadata::TrackMetadata;
use crate::engine::session::{FillOutcome, MediaSession};

/// Why a track stopped on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Finished,
    Fault(DecodeFault),
}

/// Notification handed to the control side once a track ended on the
/// render path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackEnded {
    pub path: PathBuf,
    pub reason: EndReason,
}

/// A session the render path gave up. It travels back to the control
/// thread so that releasing it never happens inside the callback.
struct Retired {
    session: Box<MediaSession>,
    reason: EndReason,
}

struct Shared {
    clock: Clock,
    /// Mirrors whether `slot` holds a session. The control side reads this
    /// instead of taking the lock; only installing and releasing a session
    /// lock the slot.
    loaded: AtomicBool,
    slot: Mutex<Option<Box<MediaSession>>>,
}

/// Control half of the engine. Owns track lifecycle, state changes and
/// volume; never blocks the render half for longer than one tick.
pub struct PlaybackEngine {
    shared: Arc<Shared>,
    output: OutputSpec,
    chunk_frames: usize,
    retired: RingConsumer<Retired>,
    ended: Vec<TrackEnded>,
    track: Option<TrackMetadata>,
}

/// Render half of the engine. Moved into the output device callback.
pub struct Renderer {
    shared: Arc<Shared>,
    retired: RingProducer<Retired>,
    max_decode_steps: usize,
}

impl PlaybackEngine {
    pub fn new(output: OutputSpec, config: &EngineConfig) -> (Self, Renderer) {
        let shared = Arc::new(Shared {
            clock: Clock::new(output.sample_rate),
            loaded: AtomicBool::new(false),
            slot: Mutex::new(None),
        });
        let (producer, consumer) = create_ring(config.event_capacity);

        let engine = Self {
            shared: shared.clone(),
            output,
            chunk_frames: config.chunk_frames,
            retired: consumer,
            ended: Vec::new(),
            track: None,
        };
        let renderer = Renderer {
            shared,
            retired: producer,
            max_decode_steps: config.max_decode_steps.max(1),
        };
        (engine, renderer)
    }

    /// Releases the current track, then opens `path`. The engine is left
    /// `Stopped`; on failure nothing of the new track is retained.
    pub fn open<P: AsRef<Path>>(&mut self, path: P) -> Result<TrackMetadata, OpenError> {
        self.release_session();
        self.track = None;

        let (decoder, metadata) = SymphoniaDecoder::open(path.as_ref())?;
        self.open_decoder(Box::new(decoder), metadata)
    }

    /// Installs an already opened decoder as the current track.
    pub fn open_decoder(
        &mut self,
        decoder: Box<dyn AudioDecoder>,
        mut metadata: TrackMetadata,
    ) -> Result<TrackMetadata, OpenError> {
        self.release_session();
        self.track = None;
        // Notifications about the replaced track are moot now.
        self.reap();
        self.ended.clear();

        let session = MediaSession::new(&metadata.path, decoder, self.output, self.chunk_frames)
            .map_err(|err| OpenError::DecoderInitFailed {
                path: metadata.path.clone(),
                reason: err.to_string(),
            })?;
        metadata.sample_format = session.native_format();

        self.shared.clock.reset_position();
        *self.lock_slot() = Some(Box::new(session));
        self.shared.loaded.store(true, Ordering::Release);

        tracing::info!(
            path = %metadata.path.display(),
            title = %metadata.title,
            artist = %metadata.artist,
            "track opened"
        );
        self.track = Some(metadata.clone());
        Ok(metadata)
    }

    /// `Stopped|Paused -> Playing`. Returns `false` when there is no track
    /// to play.
    pub fn start(&mut self) -> bool {
        self.reap();
        let clock = &self.shared.clock;
        match clock.state() {
            PlaybackState::Playing => true,
            PlaybackState::Paused | PlaybackState::Stopped => {
                if !self.has_track() {
                    return false;
                }
                clock.set_state(PlaybackState::Playing);
                true
            }
        }
    }

    /// `Playing -> Paused`; keeps the decode position. Returns whether the
    /// state changed.
    pub fn pause(&mut self) -> bool {
        self.reap();
        self.shared
            .clock
            .transition(PlaybackState::Playing, PlaybackState::Paused)
    }

    /// Any state `-> Stopped`, releasing the track. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.reap();
        if let Some(session) = self.release_session() {
            tracing::info!(path = %session.path().display(), "playback stopped");
        }
    }

    pub fn set_volume(&self, volume: f32) -> f32 {
        self.shared.clock.set_volume(volume)
    }

    pub fn volume(&self) -> f32 {
        self.shared.clock.volume()
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.clock.state()
    }

    /// Seconds of the current track already rendered.
    pub fn position_secs(&self) -> f64 {
        self.shared.clock.position_secs()
    }

    pub fn current_track_info(&self) -> Option<&TrackMetadata> {
        self.track.as_ref()
    }

    /// Whether a track is installed. Never touches the session lock.
    pub fn has_track(&self) -> bool {
        self.shared.loaded.load(Ordering::Acquire)
    }

    /// Returns the tracks that ended on their own since the last call.
    pub fn poll_events(&mut self) -> Vec<TrackEnded> {
        self.reap();
        std::mem::take(&mut self.ended)
    }

    /// Releases the sessions the render path handed back and records why
    /// they ended.
    fn reap(&mut self) {
        while let Some(Retired { session, reason }) = self.retired.pop() {
            let path = session.path().to_path_buf();
            match reason {
                EndReason::Finished => tracing::info!(path = %path.display(), "track finished"),
                EndReason::Fault(fault) => {
                    tracing::warn!(path = %path.display(), "track ended early: {fault}")
                }
            }
            drop(session);
            self.ended.push(TrackEnded { path, reason });
        }
    }

    /// Publishes `Stopped`, then swaps the session out. The slot lock is held
    /// by the render path for at most one tick, so this waits no longer.
    fn release_session(&mut self) -> Option<Box<MediaSession>> {
        self.shared.clock.set_state(PlaybackState::Stopped);
        let session = self.lock_slot().take();
        self.shared.loaded.store(false, Ordering::Release);
        self.shared.clock.reset_position();
        session
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<Box<MediaSession>>> {
        self.shared.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Renderer {
    /// Writes `frame_count` interleaved stereo frames into `out`.
    ///
    /// Only audio while `Playing`; silence otherwise. Never waits on the
    /// control side: if the session slot is busy the tick is silent.
    pub fn render_into(&mut self, out: &mut [f32], frame_count: usize) {
        let len = (frame_count * OUTPUT_CHANNELS).min(out.len());
        let out = &mut out[..len];
        let clock = &self.shared.clock;

        if clock.state() != PlaybackState::Playing {
            out.fill(0.0);
            return;
        }

        let mut slot = match self.shared.slot.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                out.fill(0.0);
                return;
            }
        };

        // The control side may have stopped playback after the first check.
        if clock.state() != PlaybackState::Playing {
            out.fill(0.0);
            return;
        }
        let Some(session) = slot.as_mut() else {
            out.fill(0.0);
            return;
        };

        let gain = clock.volume();
        let fill = session.fill(out, gain, self.max_decode_steps);
        clock.advance(fill.frames as u64);

        let reason = match fill.outcome {
            FillOutcome::Filled | FillOutcome::Starved => return,
            FillOutcome::EndOfStream => EndReason::Finished,
            FillOutcome::Fault(fault) => EndReason::Fault(fault),
        };

        if !clock.transition(PlaybackState::Playing, PlaybackState::Stopped) {
            return;
        }
        if let Some(session) = slot.take() {
            match self.retired.push(Retired { session, reason }) {
                Ok(()) => self.shared.loaded.store(false, Ordering::Release),
                // Queue full: leave it parked, the next stop/open frees it.
                Err(rejected) => *slot = Some(rejected.session),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::decoder::test_support::RampDecoder;
    use symphonia::core::audio::Channels;

    fn engine() -> (PlaybackEngine, Renderer) {
        PlaybackEngine::new(OutputSpec::new(48_000), &EngineConfig::default())
    }

    fn open_ramp(engine: &mut PlaybackEngine, name: &str, decoder: RampDecoder) {
        engine
            .open_decoder(Box::new(decoder), TrackMetadata::placeholder(name))
            .unwrap();
    }

    #[test]
    fn open_missing_path_stays_stopped() {
        let (mut engine, mut renderer) = engine();
        let err = engine.open("/no/such/track.mp3").unwrap_err();
        assert!(matches!(err, OpenError::NotFound { .. }));
        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert!(!engine.has_track());
        assert!(engine.current_track_info().is_none());
        assert!(!engine.start());

        let mut out = vec![1.0f32; 1024];
        renderer.render_into(&mut out, 512);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn failed_open_releases_previous_track() {
        let (mut engine, _renderer) = engine();
        open_ramp(&mut engine, "a", RampDecoder::stereo(48_000, 48_000));
        assert!(engine.has_track());
        assert!(engine.open("/no/such/track.mp3").is_err());
        assert!(!engine.has_track());
        assert!(engine.current_track_info().is_none());
    }

    #[test]
    fn stopped_and_opened_engine_renders_silence_until_started() {
        let (mut engine, mut renderer) = engine();
        open_ramp(&mut engine, "a", RampDecoder::stereo(48_000, 48_000));
        assert_eq!(engine.state(), PlaybackState::Stopped);

        let mut out = vec![1.0f32; 256];
        renderer.render_into(&mut out, 128);
        assert!(out.iter().all(|s| *s == 0.0));

        assert!(engine.start());
        renderer.render_into(&mut out, 128);
        assert_eq!(out[2 * 5], RampDecoder::value_at(5));
    }

    #[test]
    fn pause_holds_position_and_resume_continues() {
        let (mut engine, mut renderer) = engine();
        open_ramp(&mut engine, "a", RampDecoder::stereo(48_000, 48_000).with_block(70));
        engine.start();

        let mut out = vec![0.0f32; 2 * 100];
        renderer.render_into(&mut out, 100);
        assert_eq!(out[2 * 99], RampDecoder::value_at(99));

        assert!(engine.pause());
        assert!(!engine.pause());
        for _ in 0..5 {
            let mut silent = vec![1.0f32; 2 * 100];
            renderer.render_into(&mut silent, 100);
            assert!(silent.iter().all(|s| *s == 0.0));
        }

        assert!(engine.start());
        renderer.render_into(&mut out, 100);
        assert_eq!(out[0], RampDecoder::value_at(100));
        assert_eq!(out[2 * 99], RampDecoder::value_at(199));
    }

    #[test]
    fn end_of_stream_stops_exactly_once() {
        let (mut engine, mut renderer) = engine();
        open_ramp(&mut engine, "short", RampDecoder::stereo(48_000, 300));
        engine.start();

        let mut out = vec![0.0f32; 2 * 512];
        renderer.render_into(&mut out, 512);
        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert!(out[2 * 300..].iter().all(|s| *s == 0.0));

        for _ in 0..3 {
            renderer.render_into(&mut out, 512);
        }
        let events = engine.poll_events();
        assert_eq!(
            events,
            vec![TrackEnded { path: PathBuf::from("short"), reason: EndReason::Finished }]
        );
        assert!(engine.poll_events().is_empty());
        assert!(!engine.has_track());
        assert_eq!(
            engine.current_track_info().map(|t| t.path.clone()),
            Some(PathBuf::from("short"))
        );
    }

    #[test]
    fn decode_fault_is_reported_as_fault() {
        let (mut engine, mut renderer) = engine();
        let decoder = RampDecoder::stereo(48_000, 10_000).failing_at(256);
        open_ramp(&mut engine, "bad", decoder);
        engine.start();
        let mut out = vec![0.0f32; 2 * 1024];
        renderer.render_into(&mut out, 1024);
        assert_eq!(engine.state(), PlaybackState::Stopped);
        let events = engine.poll_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reason, EndReason::Fault(DecodeFault::Corrupt));
    }

    #[test]
    fn second_open_discards_first_track_audio() {
        let (mut engine, mut renderer) = engine();
        open_ramp(&mut engine, "a", RampDecoder::stereo(48_000, 48_000));
        engine.start();
        let mut out = vec![0.0f32; 2 * 300];
        renderer.render_into(&mut out, 300);

        // "a" would continue at frame 300; "b" must start from its own frame 0.
        open_ramp(&mut engine, "b", RampDecoder::stereo(48_000, 48_000));
        assert_eq!(engine.state(), PlaybackState::Stopped);
        engine.start();
        renderer.render_into(&mut out, 300);
        for frame in 0..300 {
            assert_eq!(out[2 * frame], RampDecoder::value_at(frame));
        }
    }

    #[test]
    fn volume_is_clamped_and_applied_per_tick() {
        let (mut engine, mut renderer) = engine();
        assert_eq!(engine.set_volume(150.0), 1.0);
        assert_eq!(engine.volume(), 1.0);
        engine.set_volume(-10.0);
        assert_eq!(engine.volume(), 0.0);

        open_ramp(&mut engine, "a", RampDecoder::stereo(48_000, 48_000));
        engine.start();
        engine.set_volume(0.5);
        let mut out = vec![0.0f32; 2 * 64];
        renderer.render_into(&mut out, 64);
        assert_eq!(out[2 * 10], RampDecoder::value_at(10) * 0.5);
    }

    #[test]
    fn stop_is_idempotent() {
        let (mut engine, _renderer) = engine();
        engine.stop();
        assert_eq!(engine.state(), PlaybackState::Stopped);
        open_ramp(&mut engine, "a", RampDecoder::stereo(48_000, 48_000));
        engine.start();
        engine.stop();
        engine.stop();
        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert!(!engine.has_track());
        assert!(!engine.start());
    }

    #[test]
    fn three_channel_source_renders_clean_stereo() {
        let (mut engine, mut renderer) = engine();
        let layout = Channels::FRONT_LEFT | Channels::FRONT_RIGHT | Channels::FRONT_CENTRE;
        open_ramp(&mut engine, "surround", RampDecoder::new(48_000, layout, 48_000));
        engine.start();
        let mut out = vec![f32::NAN; 2 * 512];
        renderer.render_into(&mut out, 512);
        assert!(out.iter().all(|s| s.is_finite() && s.abs() <= 1.0));
        assert_eq!(engine.state(), PlaybackState::Playing);
    }

    #[test]
    fn stalling_decoder_still_fills_requested_frames() {
        let (mut engine, mut renderer) = engine();
        let decoder = RampDecoder::stereo(48_000, 48_000).stalling_every(2);
        open_ramp(&mut engine, "slow", decoder);
        engine.start();
        let mut out = vec![0.0f32; 2 * 512];
        renderer.render_into(&mut out, 512);
        assert_eq!(out[2 * 511], RampDecoder::value_at(511));
        assert!((engine.position_secs() - 512.0 / 48_000.0).abs() < 1e-9);
    }

    #[test]
    fn resampled_source_fills_whole_buffer() {
        let (mut engine, mut renderer) = engine();
        open_ramp(&mut engine, "cd", RampDecoder::stereo(44_100, 44_100).with_block(1152));
        engine.start();
        let mut out = vec![f32::NAN; 2 * 480];
        for _ in 0..10 {
            renderer.render_into(&mut out, 480);
            assert!(out.iter().all(|s| s.is_finite()));
        }
        assert_eq!(engine.state(), PlaybackState::Playing);
    }

    #[test]
    fn frame_count_is_honoured_per_call() {
        let (mut engine, mut renderer) = engine();
        open_ramp(&mut engine, "a", RampDecoder::stereo(48_000, 48_000));
        engine.start();
        let mut out = vec![5.0f32; 2 * 64];
        renderer.render_into(&mut out, 16);
        assert_eq!(out[2 * 15], RampDecoder::value_at(15));
        assert_eq!(out[2 * 16], 5.0);
        renderer.render_into(&mut out, 64);
        assert_eq!(out[0], RampDecoder::value_at(16));
    }

    #[test]
    fn control_queries_do_not_wait_for_the_render_lock() {
        let (mut engine, _renderer) = engine();
        open_ramp(&mut engine, "a", RampDecoder::stereo(48_000, 48_000));

        // Stand in for a render tick that is holding the session.
        let shared = engine.shared.clone();
        let _tick = shared.slot.try_lock().unwrap();
        assert!(engine.has_track());
        assert!(engine.start());
        assert!(engine.pause());
        assert!(engine.start());
        assert_eq!(engine.state(), PlaybackState::Playing);
    }

    #[test]
    fn track_flag_follows_the_session() {
        let (mut engine, mut renderer) = engine();
        assert!(!engine.has_track());
        open_ramp(&mut engine, "a", RampDecoder::stereo(48_000, 100));
        assert!(engine.has_track());
        assert_eq!(
            engine.current_track_info().and_then(|t| t.sample_format),
            Some(crate::engine::decoder::NativeSampleFormat::F32)
        );

        engine.start();
        let mut out = vec![0.0f32; 2 * 256];
        renderer.render_into(&mut out, 256);
        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert!(!engine.has_track());
        assert!(!engine.start());

        open_ramp(&mut engine, "b", RampDecoder::stereo(48_000, 100));
        engine.stop();
        assert!(!engine.has_track());
    }
}
