//! Per-track statistics collected while a job runs.
//!
//! Statistics are handed to every terminal listener callback, so a failed or
//! cancelled job still reports what it managed to set up.

use std::time::Duration;

use crate::format::MediaFormat;

/// What happened to one track of a request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackTransformationInfo {
    /// Format of the source track.
    pub source_format: MediaFormat,
    /// Format the target track was registered with, if it got that far.
    pub target_format: Option<MediaFormat>,
    /// Name of the decoder, `"passthrough"` for copied tracks.
    pub decoder_codec: Option<String>,
    /// Name of the encoder, `"passthrough"` for copied tracks.
    pub encoder_codec: Option<String>,
    /// Wall-clock time spent in this track's transcoder.
    pub duration: Duration,
}

/// Accumulates [`TrackTransformationInfo`] for the tracks of one request,
/// indexed by the track's position in the request.
#[derive(Debug, Clone, Default)]
pub struct TransformationStatsCollector {
    tracks: Vec<TrackTransformationInfo>,
}

impl TransformationStatsCollector {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a track with its source format.
    pub fn add_source_track(&mut self, source_format: MediaFormat) {
        self.tracks.push(TrackTransformationInfo {
            source_format,
            ..TrackTransformationInfo::default()
        });
    }

    /// Record the codec names for `track`.
    pub fn set_track_codecs(&mut self, track: usize, decoder: impl Into<String>, encoder: impl Into<String>) {
        if let Some(info) = self.tracks.get_mut(track) {
            info.decoder_codec = Some(decoder.into());
            info.encoder_codec = Some(encoder.into());
        }
    }

    /// Record the negotiated target format for `track`.
    pub fn set_target_format(&mut self, track: usize, format: Option<MediaFormat>) {
        if let Some(info) = self.tracks.get_mut(track) {
            info.target_format = format;
        }
    }

    /// Add `elapsed` to the processing time of `track`.
    pub fn increase_track_processing_duration(&mut self, track: usize, elapsed: Duration) {
        if let Some(info) = self.tracks.get_mut(track) {
            info.duration += elapsed;
        }
    }

    /// The statistics collected so far.
    pub fn stats(&self) -> &[TrackTransformationInfo] {
        &self.tracks
    }

    /// Consume the collector.
    pub fn into_stats(self) -> Vec<TrackTransformationInfo> {
        self.tracks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::mime;

    #[test]
    fn updates_ignore_unknown_tracks() {
        let mut collector = TransformationStatsCollector::new();
        collector.add_source_track(MediaFormat::new(mime::VIDEO_AVC));
        collector.set_track_codecs(3, "dec", "enc");
        collector.increase_track_processing_duration(3, Duration::from_secs(1));

        assert_eq!(collector.stats().len(), 1);
        assert_eq!(collector.stats()[0].decoder_codec, None);
    }

    #[test]
    fn accumulates_processing_time() {
        let mut collector = TransformationStatsCollector::new();
        collector.add_source_track(MediaFormat::new(mime::AUDIO_AAC));
        collector.increase_track_processing_duration(0, Duration::from_millis(5));
        collector.increase_track_processing_duration(0, Duration::from_millis(7));
        collector.set_track_codecs(0, "passthrough", "passthrough");
        collector.set_target_format(0, Some(MediaFormat::new(mime::AUDIO_AAC)));

        let stats = collector.into_stats();
        assert_eq!(stats[0].duration, Duration::from_millis(12));
        assert_eq!(stats[0].encoder_codec.as_deref(), Some("passthrough"));
        assert!(stats[0].target_format.is_some());
    }
}
