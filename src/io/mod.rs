//! Container ports: where samples come from and where they go.
//!
//! A [`MediaSource`] demultiplexes a container into interleaved samples and a
//! [`MediaTarget`] multiplexes encoded samples back into one. Several track
//! transcoders read from the same source and write to the same target, so
//! both are shared as `Arc<Mutex<dyn …>>` handles ([`SharedMediaSource`],
//! [`SharedMediaTarget`]).
//!
//! # Example
//!
//! ```
//! use mediaflow::io::{MediaRange, MediaSource, MemoryMediaSource, SharedMediaSource};
//! use mediaflow::{BufferFlags, MediaFormat, mime};
//!
//! let mut source = MemoryMediaSource::new(vec![MediaFormat::new(mime::AUDIO_AAC)])
//!     .with_selection(MediaRange::new(0, 1_000_000));
//! source.push_sample(0, vec![0xde, 0xad], 0, BufferFlags::KEY_FRAME);
//!
//! let shared: SharedMediaSource = mediaflow::io::share_source(source);
//! assert_eq!(shared.lock().unwrap().track_count(), 1);
//! ```

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
mod memory;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub use memory::{MemoryMediaSource, MemoryMediaTarget, MemorySample, WrittenSample};

use crate::error::TransformError;
use crate::format::MediaFormat;
use crate::frame::{BufferFlags, BufferInfo};

/// A `[start, end)` interval of source time, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MediaRange {
    start_us: i64,
    end_us: i64,
}

impl MediaRange {
    /// Create a range. `end_us` may be [`i64::MAX`] for "until the end".
    pub fn new(start_us: i64, end_us: i64) -> Self {
        Self { start_us, end_us }
    }

    /// Start of the range, inclusive.
    pub fn start(&self) -> i64 {
        self.start_us
    }

    /// End of the range, exclusive.
    pub fn end(&self) -> i64 {
        self.end_us
    }

    /// Whether `time_us` falls within the range.
    pub fn contains(&self, time_us: i64) -> bool {
        time_us >= self.start_us && time_us < self.end_us
    }

    /// Whether this is the unbounded default range.
    pub fn is_full(&self) -> bool {
        self.start_us <= 0 && self.end_us == i64::MAX
    }
}

impl Default for MediaRange {
    fn default() -> Self {
        Self::new(0, i64::MAX)
    }
}

/// How [`MediaSource::seek_to`] picks a sample near the requested position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeekMode {
    /// The last sync sample at or before the position.
    #[default]
    PreviousSync,
    /// The first sync sample at or after the position.
    NextSync,
    /// The sync sample closest to the position.
    ClosestSync,
}

/// A demultiplexer presenting a container as a cursor over interleaved
/// samples of its selected tracks.
pub trait MediaSource: Send {
    /// Clockwise rotation, in degrees, that players should apply to video.
    fn orientation_hint(&self) -> i32 {
        0
    }

    /// Number of tracks in the container.
    fn track_count(&self) -> usize;

    /// Format of track `track`.
    fn track_format(&self, track: usize) -> Result<MediaFormat, TransformError>;

    /// Include `track` in the samples the cursor visits.
    fn select_track(&mut self, track: usize);

    /// Move the cursor near `position_us` on all selected tracks.
    fn seek_to(&mut self, position_us: i64, mode: SeekMode);

    /// Track of the sample under the cursor, or `None` once the cursor is
    /// past the last sample (or nothing is selected).
    fn sample_track_index(&self) -> Option<usize>;

    /// Replace the contents of `buffer` with the sample under the cursor.
    ///
    /// Returns the number of bytes read, or `None` when no sample remains.
    fn read_sample_data(&mut self, buffer: &mut Vec<u8>) -> Option<usize>;

    /// Presentation time of the sample under the cursor, in microseconds;
    /// `-1` when no sample remains.
    fn sample_time(&self) -> i64;

    /// Flags of the sample under the cursor.
    fn sample_flags(&self) -> BufferFlags;

    /// Decode time of the sample under the cursor, in microseconds, when the
    /// container stores one apart from the presentation time.
    fn sample_decode_time(&self) -> Option<i64> {
        None
    }

    /// Move the cursor to the next sample of any selected track.
    fn advance(&mut self);

    /// Free all resources.
    fn release(&mut self);

    /// Size of the underlying container in bytes, when known.
    fn size(&self) -> Option<u64>;

    /// The part of the source that should be transformed.
    fn selection(&self) -> MediaRange {
        MediaRange::default()
    }
}

/// A multiplexer accepting encoded samples for one or more tracks.
pub trait MediaTarget: Send {
    /// Register a track with its final format.
    ///
    /// `target_track` is the caller's requested index; the returned index is
    /// what must be passed to [`write_sample_data`](MediaTarget::write_sample_data).
    fn add_track(&mut self, format: &MediaFormat, target_track: usize) -> Result<usize, TransformError>;

    /// Write one encoded sample. Targets may buffer samples until every
    /// expected track has been registered.
    fn write_sample_data(
        &mut self,
        track: usize,
        data: &[u8],
        info: &BufferInfo,
    ) -> Result<(), TransformError>;

    /// Finish writing and free all resources.
    fn release(&mut self) -> Result<(), TransformError>;

    /// The file this target writes to, for targets backed by a file.
    fn output_file_path(&self) -> Option<PathBuf>;
}

/// A source shared between the track transcoders of a job.
pub type SharedMediaSource = Arc<Mutex<dyn MediaSource>>;

/// A target shared between the track transcoders of a job.
pub type SharedMediaTarget = Arc<Mutex<dyn MediaTarget>>;

/// Wrap a source for sharing between tracks.
pub fn share_source(source: impl MediaSource + 'static) -> SharedMediaSource {
    Arc::new(Mutex::new(source))
}

/// Wrap a target for sharing between tracks.
pub fn share_target(target: impl MediaTarget + 'static) -> SharedMediaTarget {
    Arc::new(Mutex::new(target))
}

/// Lock a shared container, recovering the guard if another track panicked
/// while holding it.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
