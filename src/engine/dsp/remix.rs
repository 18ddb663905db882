use symphonia::core::audio::Channels;

const CENTRE_GAIN: f32 = std::f32::consts::FRAC_1_SQRT_2;
const SURROUND_GAIN: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// Per-source-channel stereo gains derived from the source channel layout.
///
/// Mono is duplicated, left positions feed the left output, right positions
/// the right one, centre positions both at -3 dB. LFE is dropped. Each output
/// row is scaled so its gains sum to at most 1.0, which keeps a full-scale
/// source from overflowing.
#[derive(Debug, Clone, PartialEq)]
pub struct StereoRemix {
    gains: Vec<(f32, f32)>,
}

impl StereoRemix {
    pub fn for_layout(channels: Channels) -> Self {
        let count = channels.count();
        if count == 1 {
            return Self { gains: vec![(1.0, 1.0)] };
        }

        let mut gains: Vec<(f32, f32)> = (0..32)
            .map(|bit| Channels::from_bits_truncate(1u32 << bit))
            .filter(|position| !position.is_empty() && channels.contains(*position))
            .map(position_gains)
            .collect();

        let left_sum: f32 = gains.iter().map(|g| g.0).sum();
        let right_sum: f32 = gains.iter().map(|g| g.1).sum();
        for g in gains.iter_mut() {
            if left_sum > 1.0 {
                g.0 /= left_sum;
            }
            if right_sum > 1.0 {
                g.1 /= right_sum;
            }
        }
        Self { gains }
    }

    pub fn source_channels(&self) -> usize {
        self.gains.len()
    }

    /// Appends `frames` stereo frames built from interleaved `input`.
    /// Non-finite source samples count as silence.
    pub fn apply(&self, input: &[f32], frames: usize, out: &mut Vec<f32>) {
        let channels = self.gains.len();
        if channels == 0 {
            return;
        }
        let frames = frames.min(input.len() / channels);
        out.reserve(frames * 2);
        for frame in input[..frames * channels].chunks_exact(channels) {
            let mut left = 0.0f32;
            let mut right = 0.0f32;
            for (sample, (gl, gr)) in frame.iter().zip(self.gains.iter()) {
                let s = if sample.is_finite() { *sample } else { 0.0 };
                left += s * gl;
                right += s * gr;
            }
            out.push(left);
            out.push(right);
        }
    }
}

fn position_gains(position: Channels) -> (f32, f32) {
    let front_left = Channels::FRONT_LEFT | Channels::FRONT_LEFT_CENTRE | Channels::FRONT_LEFT_WIDE;
    let front_right =
        Channels::FRONT_RIGHT | Channels::FRONT_RIGHT_CENTRE | Channels::FRONT_RIGHT_WIDE;
    let other_left = Channels::SIDE_LEFT
        | Channels::REAR_LEFT
        | Channels::REAR_LEFT_CENTRE
        | Channels::FRONT_LEFT_HIGH
        | Channels::TOP_FRONT_LEFT
        | Channels::TOP_REAR_LEFT;
    let other_right = Channels::SIDE_RIGHT
        | Channels::REAR_RIGHT
        | Channels::REAR_RIGHT_CENTRE
        | Channels::FRONT_RIGHT_HIGH
        | Channels::TOP_FRONT_RIGHT
        | Channels::TOP_REAR_RIGHT;
    let lfe = Channels::LFE1 | Channels::LFE2;

    if front_left.contains(position) {
        (1.0, 0.0)
    } else if front_right.contains(position) {
        (0.0, 1.0)
    } else if other_left.contains(position) {
        (SURROUND_GAIN, 0.0)
    } else if other_right.contains(position) {
        (0.0, SURROUND_GAIN)
    } else if lfe.contains(position) {
        (0.0, 0.0)
    } else {
        (CENTRE_GAIN, CENTRE_GAIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo_passes_through() {
        let remix = StereoRemix::for_layout(Channels::FRONT_LEFT | Channels::FRONT_RIGHT);
        let mut out = Vec::new();
        remix.apply(&[0.5, -0.25, 1.0, -1.0], 2, &mut out);
        assert_eq!(out, vec![0.5, -0.25, 1.0, -1.0]);
    }

    #[test]
    fn mono_is_duplicated() {
        let remix = StereoRemix::for_layout(Channels::FRONT_LEFT);
        let mut out = Vec::new();
        remix.apply(&[0.3, -0.6], 2, &mut out);
        assert_eq!(out, vec![0.3, 0.3, -0.6, -0.6]);
    }

    #[test]
    fn three_channels_never_exceed_full_scale() {
        let layout = Channels::FRONT_LEFT | Channels::FRONT_RIGHT | Channels::FRONT_CENTRE;
        let remix = StereoRemix::for_layout(layout);
        assert_eq!(remix.source_channels(), 3);
        let mut out = Vec::new();
        remix.apply(&[1.0, 1.0, 1.0, -1.0, -1.0, -1.0], 2, &mut out);
        assert_eq!(out.len(), 4);
        for s in &out {
            assert!(s.abs() <= 1.0 + 1e-6, "sample {s} out of range");
        }
        assert!((out[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn lfe_is_dropped_and_nan_is_silenced() {
        let layout = Channels::FRONT_LEFT | Channels::FRONT_RIGHT | Channels::LFE1;
        let remix = StereoRemix::for_layout(layout);
        let mut out = Vec::new();
        remix.apply(&[f32::NAN, 0.5, 1.0], 1, &mut out);
        assert_eq!(out, vec![0.0, 0.5]);
    }

    #[test]
    fn short_input_is_truncated_to_whole_frames() {
        let remix = StereoRemix::for_layout(Channels::FRONT_LEFT | Channels::FRONT_RIGHT);
        let mut out = Vec::new();
        remix.apply(&[0.1, 0.2, 0.3], 4, &mut out);
        assert_eq!(out, vec![0.1, 0.2]);
    }
}
