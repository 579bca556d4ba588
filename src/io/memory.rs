//! In-memory containers.
//!
//! [`MemoryMediaSource`] serves samples from a `Vec` in container order and
//! [`MemoryMediaTarget`] records what a job writes. Both behave like real
//! containers as far as the pipeline can tell: track selection, seeking to
//! sync samples, and a selection range on the source; per-track registration
//! on the target.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::TransformError;
use crate::format::MediaFormat;
use crate::frame::{BufferFlags, BufferInfo};
use crate::io::{MediaRange, MediaSource, MediaTarget, SeekMode};

/// One compressed sample held by a [`MemoryMediaSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorySample {
    /// Track the sample belongs to.
    pub track: usize,
    /// Compressed payload.
    pub data: Vec<u8>,
    /// Presentation time in microseconds.
    pub presentation_time_us: i64,
    /// Decode time in microseconds, for reordered streams.
    pub decode_time_us: Option<i64>,
    /// Sample flags.
    pub flags: BufferFlags,
}

/// A container whose samples live in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryMediaSource {
    tracks: Vec<MediaFormat>,
    samples: Vec<MemorySample>,
    selected: BTreeSet<usize>,
    position: usize,
    selection: MediaRange,
    orientation: i32,
    released: bool,
}

impl MemoryMediaSource {
    /// Create an empty source with the given track formats.
    pub fn new(tracks: Vec<MediaFormat>) -> Self {
        Self {
            tracks,
            ..Self::default()
        }
    }

    /// Restrict the transformed part of the source.
    #[must_use]
    pub fn with_selection(mut self, selection: MediaRange) -> Self {
        self.selection = selection;
        self
    }

    /// Set the rotation reported by [`MediaSource::orientation_hint`].
    #[must_use]
    pub fn with_orientation_hint(mut self, degrees: i32) -> Self {
        self.orientation = degrees;
        self
    }

    /// Append a sample in container order.
    pub fn push_sample(
        &mut self,
        track: usize,
        data: Vec<u8>,
        presentation_time_us: i64,
        flags: BufferFlags,
    ) {
        self.samples.push(MemorySample {
            track,
            data,
            presentation_time_us,
            decode_time_us: None,
            flags,
        });
    }

    /// Append a sample whose decode time differs from its presentation time,
    /// as in streams with bidirectionally predicted frames.
    pub fn push_reordered_sample(
        &mut self,
        track: usize,
        data: Vec<u8>,
        presentation_time_us: i64,
        decode_time_us: i64,
        flags: BufferFlags,
    ) {
        self.samples.push(MemorySample {
            track,
            data,
            presentation_time_us,
            decode_time_us: Some(decode_time_us),
            flags,
        });
    }

    /// All samples, in container order.
    pub fn samples(&self) -> &[MemorySample] {
        &self.samples
    }

    /// Whether [`MediaSource::release`] has been called.
    pub fn is_released(&self) -> bool {
        self.released
    }

    fn current_index(&self) -> Option<usize> {
        if self.released {
            return None;
        }
        (self.position..self.samples.len()).find(|&i| self.selected.contains(&self.samples[i].track))
    }

    fn current(&self) -> Option<&MemorySample> {
        self.current_index().map(|i| &self.samples[i])
    }

    /// Index of the sync sample of `track` chosen for a seek to `position_us`.
    fn seek_index(&self, track: usize, position_us: i64, mode: SeekMode) -> Option<usize> {
        let mut syncs = self
            .samples
            .iter()
            .enumerate()
            .filter(|(_, s)| s.track == track && s.flags.contains(BufferFlags::KEY_FRAME));
        match mode {
            SeekMode::PreviousSync => syncs
                .filter(|(_, s)| s.presentation_time_us <= position_us)
                .last()
                .map(|(i, _)| i)
                .or_else(|| self.samples.iter().position(|s| s.track == track)),
            SeekMode::NextSync => syncs
                .find(|(_, s)| s.presentation_time_us >= position_us)
                .map(|(i, _)| i),
            SeekMode::ClosestSync => syncs
                .min_by_key(|(_, s)| (s.presentation_time_us - position_us).unsigned_abs())
                .map(|(i, _)| i),
        }
    }
}

impl MediaSource for MemoryMediaSource {
    fn orientation_hint(&self) -> i32 {
        self.orientation
    }

    fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn track_format(&self, track: usize) -> Result<MediaFormat, TransformError> {
        self.tracks
            .get(track)
            .cloned()
            .ok_or_else(|| TransformError::MediaSource {
                reason: format!("track {track} out of range, source has {} tracks", self.tracks.len()),
            })
    }

    fn select_track(&mut self, track: usize) {
        if track < self.tracks.len() {
            self.selected.insert(track);
        }
    }

    fn seek_to(&mut self, position_us: i64, mode: SeekMode) {
        self.position = self
            .selected
            .iter()
            .filter_map(|&track| self.seek_index(track, position_us, mode))
            .min()
            .unwrap_or(self.samples.len());
    }

    fn sample_track_index(&self) -> Option<usize> {
        self.current().map(|s| s.track)
    }

    fn read_sample_data(&mut self, buffer: &mut Vec<u8>) -> Option<usize> {
        let sample = self.current()?;
        buffer.clear();
        buffer.extend_from_slice(&sample.data);
        Some(sample.data.len())
    }

    fn sample_time(&self) -> i64 {
        self.current().map_or(-1, |s| s.presentation_time_us)
    }

    fn sample_flags(&self) -> BufferFlags {
        self.current().map_or(BufferFlags::empty(), |s| s.flags)
    }

    fn sample_decode_time(&self) -> Option<i64> {
        self.current().and_then(|s| s.decode_time_us)
    }

    fn advance(&mut self) {
        if let Some(index) = self.current_index() {
            self.position = index + 1;
        }
    }

    fn release(&mut self) {
        self.released = true;
    }

    fn size(&self) -> Option<u64> {
        Some(self.samples.iter().map(|s| s.data.len() as u64).sum())
    }

    fn selection(&self) -> MediaRange {
        self.selection
    }
}

/// A sample recorded by a [`MemoryMediaTarget`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenSample {
    /// Sample payload.
    pub data: Vec<u8>,
    /// Timing and flags as written.
    pub info: BufferInfo,
}

/// A target that records registered tracks and written samples.
///
/// When created with [`create_file`](MemoryMediaTarget::create_file), the
/// payloads of all samples are additionally dumped, in write order, to that
/// file on release.
#[derive(Debug, Default)]
pub struct MemoryMediaTarget {
    formats: Vec<Option<MediaFormat>>,
    samples: Vec<Vec<WrittenSample>>,
    write_order: Vec<(usize, usize)>,
    output: Option<(PathBuf, Option<File>)>,
    released: bool,
}

impl MemoryMediaTarget {
    /// Create a target expecting `track_count` tracks.
    pub fn new(track_count: usize) -> Self {
        Self {
            formats: vec![None; track_count],
            samples: vec![Vec::new(); track_count],
            ..Self::default()
        }
    }

    /// Create a target that also writes to a file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::MediaTarget`] if the file cannot be created.
    pub fn create_file<P: AsRef<Path>>(path: P, track_count: usize) -> Result<Self, TransformError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|error| TransformError::MediaTarget {
            path: Some(path.clone()),
            reason: error.to_string(),
        })?;
        Ok(Self {
            output: Some((path, Some(file))),
            ..Self::new(track_count)
        })
    }

    /// Format registered for `track`, if any.
    pub fn track_format(&self, track: usize) -> Option<&MediaFormat> {
        self.formats.get(track).and_then(Option::as_ref)
    }

    /// Samples written to `track`, in write order.
    pub fn samples(&self, track: usize) -> &[WrittenSample] {
        self.samples.get(track).map_or(&[], Vec::as_slice)
    }

    /// Number of tracks registered so far.
    pub fn registered_track_count(&self) -> usize {
        self.formats.iter().flatten().count()
    }

    /// Whether [`MediaTarget::release`] has been called.
    pub fn is_released(&self) -> bool {
        self.released
    }

    fn error(&self, reason: impl Into<String>) -> TransformError {
        TransformError::MediaTarget {
            path: self.output_file_path(),
            reason: reason.into(),
        }
    }
}

impl MediaTarget for MemoryMediaTarget {
    fn add_track(&mut self, format: &MediaFormat, target_track: usize) -> Result<usize, TransformError> {
        match self.formats.get(target_track) {
            None => {
                return Err(self.error(format!(
                    "target track {target_track} out of range, target has {} tracks",
                    self.formats.len()
                )));
            }
            Some(Some(_)) => {
                return Err(self.error(format!("target track {target_track} registered twice")));
            }
            Some(None) => {}
        }
        self.formats[target_track] = Some(format.clone());
        log::debug!("Registered target track {target_track}: {format}");
        Ok(target_track)
    }

    fn write_sample_data(
        &mut self,
        track: usize,
        data: &[u8],
        info: &BufferInfo,
    ) -> Result<(), TransformError> {
        if self.released {
            return Err(self.error("write after release"));
        }
        if self.track_format(track).is_none() {
            return Err(self.error(format!("write to unregistered track {track}")));
        }
        let written = &mut self.samples[track];
        written.push(WrittenSample {
            data: data.to_vec(),
            info: BufferInfo {
                offset: 0,
                size: data.len(),
                ..*info
            },
        });
        self.write_order.push((track, written.len() - 1));
        Ok(())
    }

    fn release(&mut self) -> Result<(), TransformError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let Some((path, file)) = self.output.as_mut() else {
            return Ok(());
        };
        let Some(file) = file.take() else {
            return Ok(());
        };
        let path = path.clone();
        let mut writer = BufWriter::new(file);
        for &(track, index) in &self.write_order {
            writer.write_all(&self.samples[track][index].data)?;
        }
        writer.flush()?;
        log::debug!("Wrote {} samples to {}", self.write_order.len(), path.display());
        Ok(())
    }

    fn output_file_path(&self) -> Option<PathBuf> {
        self.output.as_ref().map(|(path, _)| path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::mime;

    fn interleaved() -> MemoryMediaSource {
        let mut source = MemoryMediaSource::new(vec![
            MediaFormat::video(mime::VIDEO_AVC, 320, 240),
            MediaFormat::audio(mime::AUDIO_AAC, 48_000, 2),
        ]);
        for i in 0..6 {
            let video_flags = if i % 3 == 0 {
                BufferFlags::KEY_FRAME
            } else {
                BufferFlags::empty()
            };
            source.push_sample(0, vec![i as u8], i * 1_000, video_flags);
            source.push_sample(1, vec![0x80 | i as u8], i * 1_000 + 500, BufferFlags::KEY_FRAME);
        }
        source
    }

    #[test]
    fn visits_only_selected_tracks() {
        let mut source = interleaved();
        assert_eq!(source.sample_track_index(), None);

        source.select_track(1);
        let mut times = Vec::new();
        while source.sample_track_index().is_some() {
            times.push(source.sample_time());
            source.advance();
        }
        assert_eq!(times, [500, 1_500, 2_500, 3_500, 4_500, 5_500]);
        assert_eq!(source.sample_time(), -1);
    }

    #[test]
    fn previous_sync_seek_lands_on_video_key_frame() {
        let mut source = interleaved();
        source.select_track(0);
        source.select_track(1);

        source.seek_to(4_200, SeekMode::PreviousSync);
        assert_eq!(source.sample_track_index(), Some(0));
        assert_eq!(source.sample_time(), 3_000);

        source.seek_to(4_200, SeekMode::NextSync);
        assert_eq!(source.sample_track_index(), Some(1));
        assert_eq!(source.sample_time(), 4_500);
    }

    #[test]
    fn target_rejects_unregistered_writes() {
        let mut target = MemoryMediaTarget::new(2);
        let info = BufferInfo::default();
        assert!(target.write_sample_data(0, &[1], &info).is_err());

        let format = MediaFormat::new(mime::AUDIO_AAC);
        assert_eq!(target.add_track(&format, 1).unwrap(), 1);
        assert!(target.add_track(&format, 1).is_err());
        assert!(target.add_track(&format, 5).is_err());

        target.write_sample_data(1, &[1, 2], &info).unwrap();
        assert_eq!(target.samples(1)[0].info.size, 2);
        assert_eq!(target.registered_track_count(), 1);
    }

    #[test]
    fn file_target_dumps_payloads_on_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.bin");
        let mut target = MemoryMediaTarget::create_file(&path, 1).unwrap();
        target.add_track(&MediaFormat::new(mime::AUDIO_RAW), 0).unwrap();
        target.write_sample_data(0, &[1, 2], &BufferInfo::default()).unwrap();
        target.write_sample_data(0, &[3], &BufferInfo::default()).unwrap();
        target.release().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), [1, 2, 3]);
        assert_eq!(target.output_file_path(), Some(path));
    }
}
