use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

/// Represents the current playback state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PlaybackState {
    Stopped = 0,
    Playing = 1,
    Paused = 2,
}

impl From<u8> for PlaybackState {
    fn from(value: u8) -> Self {
        match value {
            1 => PlaybackState::Playing,
            2 => PlaybackState::Paused,
            _ => PlaybackState::Stopped,
        }
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PlaybackState::Stopped => "stopped",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
        };
        f.write_str(label)
    }
}

/// The Clock is the timing and transport authority shared by the control
/// and render contexts. Everything in here is a single atomic so neither
/// side ever waits on the other to read or publish it.
pub struct Clock {
    /// Output frames rendered for the current track.
    frames_rendered: AtomicU64,
    /// Output device sample rate.
    sample_rate: AtomicU32,
    /// Current state of playback (stored as u8 for atomicity).
    state: AtomicU8,
    /// Volume scalar, stored as the bit pattern of an `f32`.
    volume: AtomicU32,
}

impl Clock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            frames_rendered: AtomicU64::new(0),
            sample_rate: AtomicU32::new(sample_rate),
            state: AtomicU8::new(PlaybackState::Stopped as u8),
            volume: AtomicU32::new(1.0f32.to_bits()),
        }
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Relaxed)
    }

    pub fn reset_position(&self) {
        self.frames_rendered.store(0, Ordering::SeqCst);
    }

    /// Called by the render path after a block of real audio was written.
    pub fn advance(&self, frames: u64) {
        self.frames_rendered.fetch_add(frames, Ordering::Relaxed);
    }

    /// Returns the current playback position in seconds.
    pub fn position_secs(&self) -> f64 {
        let rate = self.sample_rate() as f64;
        if rate > 0.0 {
            self.frames_rendered() as f64 / rate
        } else {
            0.0
        }
    }

    pub fn state(&self) -> PlaybackState {
        PlaybackState::from(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: PlaybackState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Moves from `from` to `to` only if the state still is `from`.
    /// Returns whether this call performed the transition.
    pub fn transition(&self, from: PlaybackState, to: PlaybackState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::Acquire)
            .is_ok()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    /// Stores the volume clamped to `[0, 1]`; NaN is treated as silence.
    pub fn set_volume(&self, volume: f32) -> f32 {
        let clamped = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        self.volume.store(clamped.to_bits(), Ordering::Relaxed);
        clamped
    }
}
