//! Output size and bit rate estimation.
//!
//! Estimates are rough: a track's size is its bit rate times the duration of
//! its selected range. They exist so a job can refuse to start when the
//! output clearly will not fit on disk.
//!
//! # Example
//!
//! ```
//! use mediaflow::io::{self, MemoryMediaSource, MemoryMediaTarget};
//! use mediaflow::{MediaFormat, TrackTransform, estimate, mime};
//!
//! let audio = MediaFormat::audio(mime::AUDIO_AAC, 48_000, 2)
//!     .with_bit_rate(128_000)
//!     .with_duration_us(10_000_000);
//! let source = io::share_source(MemoryMediaSource::new(vec![audio]));
//! let target = io::share_target(MemoryMediaTarget::new(1));
//! let transforms = [TrackTransform::builder(source, 0, target).build()];
//!
//! // 128 kbps for 10 s is 160 kB.
//! let size = estimate::estimated_target_size(&transforms, estimate::COMMON_AUDIO_BITRATE)?;
//! assert_eq!(size, 160_000);
//! # Ok::<(), mediaflow::TransformError>(())
//! ```

use crate::error::TransformError;
use crate::format::{MediaCategory, MediaFormat};
use crate::io::{self, MediaRange, MediaSource};
use crate::track_transform::TrackTransform;

/// Bit rate assumed for audio tracks that do not declare one, in bits per second.
pub const COMMON_AUDIO_BITRATE: u32 = 320_000;

const BITS_IN_BYTE: f64 = 8.0;
const MICROS_IN_SECOND: f64 = 1_000_000.0;

/// What estimation needs to know about one track.
struct TrackEstimate {
    source_format: MediaFormat,
    selection: MediaRange,
    target_format: Option<MediaFormat>,
}

impl TrackEstimate {
    /// Duration of the selected part of the track, if the source knows the
    /// track's duration.
    fn duration_us(&self) -> Option<i64> {
        self.source_format
            .duration_us
            .map(|duration| duration.min(self.selection.end()) - self.selection.start().max(0))
    }

    fn bit_rate(&self, fallback_audio_bitrate: u32) -> u32 {
        let target_bit_rate = self.target_format.as_ref().and_then(|format| format.bit_rate);
        let bit_rate = target_bit_rate.or(self.source_format.bit_rate);
        match bit_rate {
            Some(bit_rate) => bit_rate,
            None if self.source_format.category() == MediaCategory::Audio => fallback_audio_bitrate,
            None => {
                log::debug!("Bit rate is not available, cannot use that track to estimate size");
                0
            }
        }
    }
}

fn estimate_size(tracks: &[TrackEstimate], fallback_audio_bitrate: u32) -> u64 {
    let max_duration_us = tracks
        .iter()
        .filter_map(TrackEstimate::duration_us)
        .max()
        .unwrap_or(0);

    let bits: f64 = tracks
        .iter()
        .map(|track| {
            let duration_us = match track.duration_us() {
                Some(duration) if duration >= 0 => duration,
                _ => {
                    log::debug!("Track duration is not available, using maximum duration");
                    max_duration_us
                }
            };
            f64::from(track.bit_rate(fallback_audio_bitrate)) * duration_us as f64 / MICROS_IN_SECOND
        })
        .sum();

    (bits / BITS_IN_BYTE) as u64
}

/// Estimate the combined output size of `transforms`, in bytes.
///
/// Each track contributes its target bit rate (or its source bit rate when
/// copied or when the target does not say) times the duration of the selected
/// range. Audio tracks without any bit rate use `fallback_audio_bitrate`.
/// Tracks of unknown duration are assumed to be as long as the longest track.
pub fn estimated_target_size(
    transforms: &[TrackTransform],
    fallback_audio_bitrate: u32,
) -> Result<u64, TransformError> {
    let tracks = transforms
        .iter()
        .map(|transform| {
            let source = io::lock(transform.source());
            Ok(TrackEstimate {
                source_format: source.track_format(transform.source_track())?,
                selection: source.selection(),
                target_format: transform.target_format().cloned(),
            })
        })
        .collect::<Result<Vec<_>, TransformError>>()?;
    Ok(estimate_size(&tracks, fallback_audio_bitrate))
}

/// Estimate the output size of converting every track of `source`: video
/// tracks to `target_video`, audio tracks to `target_audio`, other tracks
/// copied.
pub fn estimated_media_size(
    source: &dyn MediaSource,
    target_video: Option<&MediaFormat>,
    target_audio: Option<&MediaFormat>,
    fallback_audio_bitrate: u32,
) -> Result<u64, TransformError> {
    let tracks = (0..source.track_count())
        .map(|track| {
            let source_format = source.track_format(track)?;
            let target_format = match source_format.category() {
                MediaCategory::Video => target_video.cloned(),
                MediaCategory::Audio => target_audio.cloned(),
                MediaCategory::Other => None,
            };
            Ok(TrackEstimate {
                source_format,
                selection: source.selection(),
                target_format,
            })
        })
        .collect::<Result<Vec<_>, TransformError>>()?;
    Ok(estimate_size(&tracks, fallback_audio_bitrate))
}

/// Estimate the bit rate of video track `track` of `source`, in bits per second.
///
/// Uses the declared bit rate when there is one. Otherwise the container
/// size left after subtracting every track with a known bit rate is split
/// between the remaining video tracks in proportion to their pixel counts.
/// Returns 0 when the track's duration is unknown or zero.
pub fn estimate_video_track_bitrate(source: &dyn MediaSource, track: usize) -> Result<u32, TransformError> {
    let format = source.track_format(track)?;
    if let Some(bit_rate) = format.bit_rate {
        return Ok(bit_rate);
    }

    let duration_seconds = format.duration_us.unwrap_or(0) as f64 / MICROS_IN_SECOND;
    if duration_seconds <= 0.0 {
        return Ok(0);
    }

    let mut unallocated_bytes = source.size().unwrap_or(0) as f64;
    let mut total_pixels = 0.0;
    for index in 0..source.track_count() {
        let other = source.track_format(index)?;
        if other.mime().is_none() {
            continue;
        }
        match (other.bit_rate, other.duration_us) {
            (Some(bit_rate), Some(duration_us)) => {
                unallocated_bytes -= f64::from(bit_rate) * duration_us as f64 / MICROS_IN_SECOND / BITS_IN_BYTE;
            }
            _ if other.category() == MediaCategory::Video => {
                total_pixels += other.pixel_count().unwrap_or(0) as f64;
            }
            _ => {}
        }
    }

    let track_pixels = format.pixel_count().unwrap_or(0) as f64;
    let track_bytes = if total_pixels > 0.0 {
        unallocated_bytes * track_pixels / total_pixels
    } else {
        unallocated_bytes
    };
    Ok((track_bytes * BITS_IN_BYTE / duration_seconds).max(0.0) as u32)
}
