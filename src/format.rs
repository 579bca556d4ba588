//! Typed media format descriptions.
//!
//! [`MediaFormat`] describes one elementary stream: its mime type plus the
//! video or audio parameters a codec or muxer needs. Every field except the
//! mime type is optional because sources frequently omit metadata.
//!
//! # Example
//!
//! ```
//! use mediaflow::{MediaCategory, MediaFormat, mime};
//!
//! let format = MediaFormat::video(mime::VIDEO_AVC, 1280, 720)
//!     .with_bit_rate(5_000_000)
//!     .with_frame_rate(30.0)
//!     .with_key_frame_interval(5.0);
//!
//! assert_eq!(format.category(), MediaCategory::Video);
//! assert_eq!(format.bit_rate, Some(5_000_000));
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};

/// Well-known mime types.
pub mod mime {
    /// H.264 / AVC video.
    pub const VIDEO_AVC: &str = "video/avc";
    /// H.265 / HEVC video.
    pub const VIDEO_HEVC: &str = "video/hevc";
    /// VP8 video.
    pub const VIDEO_VP8: &str = "video/x-vnd.on2.vp8";
    /// VP9 video.
    pub const VIDEO_VP9: &str = "video/x-vnd.on2.vp9";
    /// AV1 video.
    pub const VIDEO_AV1: &str = "video/av01";
    /// Uncompressed video frames.
    pub const VIDEO_RAW: &str = "video/raw";
    /// AAC audio.
    pub const AUDIO_AAC: &str = "audio/mp4a-latm";
    /// Opus audio.
    pub const AUDIO_OPUS: &str = "audio/opus";
    /// MPEG layer III audio.
    pub const AUDIO_MPEG: &str = "audio/mpeg";
    /// Vorbis audio.
    pub const AUDIO_VORBIS: &str = "audio/vorbis";
    /// FLAC audio.
    pub const AUDIO_FLAC: &str = "audio/flac";
    /// Uncompressed PCM samples.
    pub const AUDIO_RAW: &str = "audio/raw";
}

/// Broad category of a track, derived from its mime type prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaCategory {
    /// `video/*`
    Video,
    /// `audio/*`
    Audio,
    /// Anything else (subtitles, data, timed metadata).
    Other,
}

impl MediaCategory {
    /// Classify a mime type string.
    pub fn of(mime: &str) -> Self {
        if mime.starts_with("video/") {
            MediaCategory::Video
        } else if mime.starts_with("audio/") {
            MediaCategory::Audio
        } else {
            MediaCategory::Other
        }
    }
}

/// Description of one elementary stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaFormat {
    /// Mime type, e.g. [`mime::VIDEO_AVC`]. `None` when the source did not
    /// report one.
    pub mime: Option<String>,
    /// Frame width in pixels.
    pub width: Option<u32>,
    /// Frame height in pixels.
    pub height: Option<u32>,
    /// Bit rate in bits per second.
    pub bit_rate: Option<u32>,
    /// Frames per second.
    pub frame_rate: Option<f32>,
    /// Seconds between key frames.
    pub key_frame_interval: Option<f32>,
    /// Audio samples per second.
    pub sample_rate: Option<u32>,
    /// Number of audio channels.
    pub channel_count: Option<u32>,
    /// Stream duration in microseconds.
    pub duration_us: Option<i64>,
    /// Largest compressed sample the stream contains, in bytes.
    pub max_input_size: Option<usize>,
    /// Codec configuration bytes (e.g. SPS/PPS or an AudioSpecificConfig).
    pub codec_specific_data: Option<Vec<u8>>,
}

impl MediaFormat {
    /// A format with only a mime type set.
    pub fn new(mime: impl Into<String>) -> Self {
        Self {
            mime: Some(mime.into()),
            ..Self::default()
        }
    }

    /// A video format with the given mime type and frame size.
    pub fn video(mime: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            ..Self::new(mime)
        }
    }

    /// An audio format with the given mime type, sample rate and channel count.
    pub fn audio(mime: impl Into<String>, sample_rate: u32, channel_count: u32) -> Self {
        Self {
            sample_rate: Some(sample_rate),
            channel_count: Some(channel_count),
            ..Self::new(mime)
        }
    }

    /// Set the bit rate in bits per second.
    #[must_use]
    pub fn with_bit_rate(mut self, bit_rate: u32) -> Self {
        self.bit_rate = Some(bit_rate);
        self
    }

    /// Set the frame rate in frames per second.
    #[must_use]
    pub fn with_frame_rate(mut self, frame_rate: f32) -> Self {
        self.frame_rate = Some(frame_rate);
        self
    }

    /// Set the key frame interval in seconds.
    #[must_use]
    pub fn with_key_frame_interval(mut self, seconds: f32) -> Self {
        self.key_frame_interval = Some(seconds);
        self
    }

    /// Set the stream duration in microseconds.
    #[must_use]
    pub fn with_duration_us(mut self, duration_us: i64) -> Self {
        self.duration_us = Some(duration_us);
        self
    }

    /// Set the largest expected compressed sample size.
    #[must_use]
    pub fn with_max_input_size(mut self, size: usize) -> Self {
        self.max_input_size = Some(size);
        self
    }

    /// Set the codec configuration bytes.
    #[must_use]
    pub fn with_codec_specific_data(mut self, data: Vec<u8>) -> Self {
        self.codec_specific_data = Some(data);
        self
    }

    /// The mime type, if any.
    pub fn mime(&self) -> Option<&str> {
        self.mime.as_deref()
    }

    /// The category implied by the mime type. Formats without a mime type
    /// are [`MediaCategory::Other`].
    pub fn category(&self) -> MediaCategory {
        self.mime().map_or(MediaCategory::Other, MediaCategory::of)
    }

    /// Width × height, when both are known.
    pub fn pixel_count(&self) -> Option<u64> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some(u64::from(w) * u64::from(h)),
            _ => None,
        }
    }
}

impl Display for MediaFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.mime().unwrap_or("unknown"))?;
        if let (Some(w), Some(h)) = (self.width, self.height) {
            write!(f, " {w}x{h}")?;
        }
        if let Some(fps) = self.frame_rate {
            write!(f, " @{fps}fps")?;
        }
        if let Some(rate) = self.sample_rate {
            write!(f, " {rate}Hz")?;
        }
        if let Some(channels) = self.channel_count {
            write!(f, " {channels}ch")?;
        }
        if let Some(bit_rate) = self.bit_rate {
            write!(f, " {bit_rate}bps")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_from_mime() {
        assert_eq!(MediaFormat::new(mime::VIDEO_HEVC).category(), MediaCategory::Video);
        assert_eq!(MediaFormat::new(mime::AUDIO_OPUS).category(), MediaCategory::Audio);
        assert_eq!(MediaFormat::new("text/vtt").category(), MediaCategory::Other);
        assert_eq!(MediaFormat::default().category(), MediaCategory::Other);
    }

    #[test]
    fn display_lists_known_fields() {
        let format = MediaFormat::audio(mime::AUDIO_AAC, 48_000, 2).with_bit_rate(128_000);
        assert_eq!(format.to_string(), "audio/mp4a-latm 48000Hz 2ch 128000bps");
    }
}
