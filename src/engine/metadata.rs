//! Descriptive information about the open track.
//!
//! Tags the container does not carry resolve to [`UNKNOWN_TAG`]; an unknown
//! duration is `None` and prints as `unknown`.

use std::fmt;
use std::path::{Path, PathBuf};

use symphonia::core::codecs::CodecParameters;
use symphonia::core::meta::{StandardTagKey, Tag};

use crate::engine::decoder::NativeSampleFormat;

/// Marker used for tags that are absent from the source.
pub const UNKNOWN_TAG: &str = "Unknown";

#[derive(Debug, Clone, PartialEq)]
pub struct TrackMetadata {
    pub path: PathBuf,
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Whole seconds, `None` when the container does not say.
    pub duration_secs: Option<u64>,
    pub codec: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<usize>,
    /// Sample format of the first decoded block.
    pub sample_format: Option<NativeSampleFormat>,
}

impl TrackMetadata {
    pub fn placeholder(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            title: UNKNOWN_TAG.to_string(),
            artist: UNKNOWN_TAG.to_string(),
            album: UNKNOWN_TAG.to_string(),
            duration_secs: None,
            codec: None,
            sample_rate: None,
            channels: None,
            sample_format: None,
        }
    }

    /// Fills title/artist/album from a tag list. Later calls win, so feed
    /// container-level tags after any tags found while probing.
    pub fn apply_tags(&mut self, tags: &[Tag]) {
        for tag in tags {
            let value = tag.value.to_string();
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match tag_field(tag) {
                Some(Field::Title) => self.title = value.to_string(),
                Some(Field::Artist) => self.artist = value.to_string(),
                Some(Field::Album) => self.album = value.to_string(),
                None => {}
            }
        }
    }

    /// Takes the stream facts (duration, codec, native format) from the
    /// selected track.
    pub fn apply_codec_params(&mut self, params: &CodecParameters) {
        self.duration_secs = duration_secs_from_codec_params(params);
        self.codec = codec_name_from_params(params);
        self.sample_rate = params.sample_rate;
        self.channels = params.channels.map(|c| c.count());
    }

    pub fn duration_label(&self) -> String {
        match self.duration_secs {
            Some(secs) => format!("{}:{:02}", secs / 60, secs % 60),
            None => "unknown".to_string(),
        }
    }
}

impl fmt::Display for TrackMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} ({})", self.artist, self.title, self.album)
    }
}

enum Field {
    Title,
    Artist,
    Album,
}

fn tag_field(tag: &Tag) -> Option<Field> {
    match tag.std_key {
        Some(StandardTagKey::TrackTitle) => return Some(Field::Title),
        Some(StandardTagKey::Artist) => return Some(Field::Artist),
        Some(StandardTagKey::Album) => return Some(Field::Album),
        Some(_) => return None,
        None => {}
    }
    match tag.key.to_ascii_lowercase().as_str() {
        "title" => Some(Field::Title),
        "artist" => Some(Field::Artist),
        "album" => Some(Field::Album),
        _ => None,
    }
}

/// Whole-second duration from codec metadata, `None` if unknown.
fn duration_secs_from_codec_params(params: &CodecParameters) -> Option<u64> {
    let frames = params.n_frames?;
    if let Some(time_base) = params.time_base {
        return Some(time_base.calc_time(frames).seconds);
    }
    let rate = params.sample_rate? as u64;
    if rate == 0 {
        return None;
    }
    Some(frames / rate)
}

fn codec_name_from_params(params: &CodecParameters) -> Option<String> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_AAC => "AAC",
        CODEC_TYPE_ALAC => "ALAC",
        CODEC_TYPE_VORBIS => "VORBIS",
        CODEC_TYPE_OPUS => "OPUS",
        CODEC_TYPE_PCM_U8 | CODEC_TYPE_PCM_S8 => "PCM_8",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM_S24",
        CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE => "PCM_S32",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM_F32",
        CODEC_TYPE_PCM_F64LE | CODEC_TYPE_PCM_F64BE => "PCM_F64",
        _ => return None,
    };
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use symphonia::core::codecs::CODEC_TYPE_FLAC;
    use symphonia::core::meta::Value;
    use symphonia::core::units::TimeBase;

    fn tag(key: &str, std_key: Option<StandardTagKey>, value: &str) -> Tag {
        Tag::new(std_key, key, Value::String(value.to_string()))
    }

    #[test]
    fn missing_tags_keep_placeholder() {
        let mut meta = TrackMetadata::placeholder("a.flac");
        meta.apply_tags(&[tag("TITLE", Some(StandardTagKey::TrackTitle), "Song")]);
        assert_eq!(meta.title, "Song");
        assert_eq!(meta.artist, UNKNOWN_TAG);
        assert_eq!(meta.album, UNKNOWN_TAG);
    }

    #[test]
    fn blank_tags_are_ignored_and_raw_keys_are_matched() {
        let mut meta = TrackMetadata::placeholder("a.wav");
        meta.apply_tags(&[
            tag("artist", None, "Someone"),
            tag("ALBUM", Some(StandardTagKey::Album), "   "),
            tag("comment", None, "ignored"),
        ]);
        assert_eq!(meta.artist, "Someone");
        assert_eq!(meta.album, UNKNOWN_TAG);
    }

    #[test]
    fn duration_uses_time_base_when_present() {
        let mut params = CodecParameters::new();
        params.n_frames = Some(44_100 * 181 + 100);
        params.time_base = Some(TimeBase::new(1, 44_100));
        assert_eq!(duration_secs_from_codec_params(&params), Some(181));
    }

    #[test]
    fn duration_falls_back_to_sample_rate_and_rejects_zero() {
        let mut params = CodecParameters::new();
        params.n_frames = Some(96_000);
        params.sample_rate = Some(48_000);
        assert_eq!(duration_secs_from_codec_params(&params), Some(2));
        params.sample_rate = Some(0);
        assert!(duration_secs_from_codec_params(&params).is_none());
    }

    #[test]
    fn codec_params_fill_stream_facts() {
        let mut params = CodecParameters::new();
        params.codec = CODEC_TYPE_FLAC;
        params.sample_rate = Some(48_000);
        let mut meta = TrackMetadata::placeholder("x.flac");
        meta.apply_codec_params(&params);
        assert_eq!(meta.codec.as_deref(), Some("FLAC"));
        assert_eq!(meta.sample_rate, Some(48_000));
        assert_eq!(meta.duration_label(), "unknown");
    }

    #[test]
    fn duration_label_formats_minutes() {
        let mut meta = TrackMetadata::placeholder("x.mp3");
        meta.duration_secs = Some(185);
        assert_eq!(meta.duration_label(), "3:05");
    }
}
