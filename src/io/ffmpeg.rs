//! FFmpeg-backed containers.
//!
//! [`FfmpegMediaSource`] demultiplexes any container FFmpeg can open and
//! [`FfmpegMediaTarget`] multiplexes stream copies of a source's tracks into
//! a new file. Together they give a lossless trim/copy pipeline:
//!
//! ```no_run
//! use mediaflow::io::{self, MediaRange};
//! use mediaflow::io::ffmpeg::{FfmpegMediaSource, FfmpegMediaTarget};
//!
//! let source = FfmpegMediaSource::open("input.mp4")?
//!     .with_selection(MediaRange::new(2_000_000, 10_000_000));
//! let target = FfmpegMediaTarget::create("clip.mp4", &source, &[0, 1])?;
//! let (source, target) = (io::share_source(source), io::share_target(target));
//! # Ok::<(), mediaflow::TransformError>(())
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use ffmpeg_next::codec::context::Context as CodecContext;
use ffmpeg_next::codec::packet::Flags as PacketFlags;
use ffmpeg_next::format::context::{Input, Output};
use ffmpeg_next::{Packet, Rational, Rescale, codec::Id, media::Type};

use crate::error::TransformError;
use crate::format::{MediaFormat, mime};
use crate::frame::{BufferFlags, BufferInfo};
use crate::io::{MediaRange, MediaSource, MediaTarget, SeekMode};

const MICROSECONDS: (i32, i32) = (1, 1_000_000);

/// Mime type for an FFmpeg codec, if the pipeline knows it.
fn mime_for(id: Id, medium: Type) -> Option<String> {
    let known = match id {
        Id::H264 => mime::VIDEO_AVC,
        Id::HEVC => mime::VIDEO_HEVC,
        Id::VP8 => mime::VIDEO_VP8,
        Id::VP9 => mime::VIDEO_VP9,
        Id::AV1 => mime::VIDEO_AV1,
        Id::AAC => mime::AUDIO_AAC,
        Id::OPUS => mime::AUDIO_OPUS,
        Id::MP3 => mime::AUDIO_MPEG,
        Id::VORBIS => mime::AUDIO_VORBIS,
        Id::FLAC => mime::AUDIO_FLAC,
        _ => {
            return match medium {
                Type::Video => Some(format!("video/{}", id.name())),
                Type::Audio => Some(format!("audio/{}", id.name())),
                Type::Subtitle => Some(format!("text/{}", id.name())),
                _ => None,
            };
        }
    };
    Some(known.to_string())
}

fn target_error(path: &Path, reason: impl Into<String>) -> TransformError {
    TransformError::MediaTarget {
        path: Some(path.to_path_buf()),
        reason: reason.into(),
    }
}

fn rate_to_f32(rate: Rational) -> Option<f32> {
    (rate.denominator() != 0 && rate.numerator() > 0)
        .then(|| rate.numerator() as f32 / rate.denominator() as f32)
}

/// A demultiplexer over a file opened with FFmpeg.
///
/// Timestamps are converted to microseconds. The container is opened once;
/// [`select_track`](MediaSource::select_track) and
/// [`seek_to`](MediaSource::seek_to) reposition the demuxer.
pub struct FfmpegMediaSource {
    path: PathBuf,
    input: Option<Input>,
    formats: Vec<MediaFormat>,
    time_bases: Vec<Rational>,
    selected: BTreeSet<usize>,
    current: Option<Packet>,
    position_us: i64,
    selection: MediaRange,
    orientation: i32,
}

impl FfmpegMediaSource {
    /// Open `path` and read its track formats.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TransformError> {
        ffmpeg_next::init()?;
        let path = path.as_ref().to_path_buf();
        let input = ffmpeg_next::format::input(&path).map_err(|error| TransformError::MediaSource {
            reason: format!("Failed to open {}: {error}", path.display()),
        })?;

        let container_duration = input.duration();
        let mut formats = Vec::new();
        let mut time_bases = Vec::new();
        let mut orientation = 0;

        for stream in input.streams() {
            let parameters = stream.parameters();
            let medium = parameters.medium();
            let mut format = MediaFormat {
                mime: mime_for(parameters.id(), medium),
                ..MediaFormat::default()
            };

            let time_base = stream.time_base();
            let stream_duration = stream.duration();
            format.duration_us = if stream_duration > 0 {
                Some(stream_duration.rescale(time_base, MICROSECONDS))
            } else if container_duration > 0 {
                Some(container_duration)
            } else {
                None
            };

            let context = CodecContext::from_parameters(parameters)?;
            match medium {
                Type::Video => {
                    let decoder = context.decoder().video()?;
                    format.width = Some(decoder.width());
                    format.height = Some(decoder.height());
                    format.bit_rate = u32::try_from(decoder.bit_rate()).ok().filter(|&rate| rate > 0);
                    format.frame_rate = rate_to_f32(stream.avg_frame_rate()).or_else(|| rate_to_f32(stream.rate()));
                    if let Some(rotate) = stream.metadata().get("rotate").and_then(|value| value.parse().ok()) {
                        orientation = rotate;
                    }
                }
                Type::Audio => {
                    let decoder = context.decoder().audio()?;
                    format.sample_rate = Some(decoder.rate());
                    format.channel_count = Some(u32::from(decoder.channels()));
                    format.bit_rate = u32::try_from(decoder.bit_rate()).ok().filter(|&rate| rate > 0);
                }
                _ => {}
            }

            log::debug!("Track {}: {format}", stream.index());
            formats.push(format);
            time_bases.push(time_base);
        }

        Ok(Self {
            path,
            input: Some(input),
            formats,
            time_bases,
            selected: BTreeSet::new(),
            current: None,
            position_us: 0,
            selection: MediaRange::default(),
            orientation,
        })
    }

    /// Restrict the transformed part of the source.
    #[must_use]
    pub fn with_selection(mut self, selection: MediaRange) -> Self {
        self.selection = selection;
        self
    }

    /// Path the source was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn input(&self) -> Result<&Input, TransformError> {
        self.input.as_ref().ok_or_else(|| TransformError::MediaSource {
            reason: "Source has been released".to_string(),
        })
    }

    /// Read packets until one belongs to a selected track.
    fn load_next(&mut self) {
        self.current = None;
        let Some(input) = self.input.as_mut() else {
            return;
        };
        loop {
            let mut packet = Packet::empty();
            match packet.read(input) {
                Ok(()) if self.selected.contains(&packet.stream()) => {
                    self.current = Some(packet);
                    return;
                }
                Ok(()) => continue,
                Err(ffmpeg_next::Error::Eof) => return,
                Err(error) => {
                    log::warn!("Failed to read packet from {}: {error}", self.path.display());
                    return;
                }
            }
        }
    }

    fn reposition(&mut self, mode: SeekMode) {
        let position = self.position_us;
        if let Some(input) = self.input.as_mut() {
            let result = match mode {
                SeekMode::PreviousSync => input.seek(position, ..position),
                SeekMode::NextSync => input.seek(position, position..),
                SeekMode::ClosestSync => input.seek(position, ..),
            };
            if let Err(error) = result {
                log::warn!("Failed to seek {} to {position}us: {error}", self.path.display());
            }
        }
        self.load_next();
    }
}

impl MediaSource for FfmpegMediaSource {
    fn orientation_hint(&self) -> i32 {
        self.orientation
    }

    fn track_count(&self) -> usize {
        self.formats.len()
    }

    fn track_format(&self, track: usize) -> Result<MediaFormat, TransformError> {
        self.formats
            .get(track)
            .cloned()
            .ok_or_else(|| TransformError::MediaSource {
                reason: format!("No track {track} in {}", self.path.display()),
            })
    }

    fn select_track(&mut self, track: usize) {
        if self.selected.insert(track) {
            self.reposition(SeekMode::PreviousSync);
        }
    }

    fn seek_to(&mut self, position_us: i64, mode: SeekMode) {
        self.position_us = position_us.max(0);
        self.reposition(mode);
    }

    fn sample_track_index(&self) -> Option<usize> {
        self.current.as_ref().map(Packet::stream)
    }

    fn read_sample_data(&mut self, buffer: &mut Vec<u8>) -> Option<usize> {
        let data = self.current.as_ref()?.data()?;
        buffer.clear();
        buffer.extend_from_slice(data);
        Some(data.len())
    }

    fn sample_time(&self) -> i64 {
        let Some(packet) = self.current.as_ref() else {
            return -1;
        };
        let time_base = self.time_bases[packet.stream()];
        packet
            .pts()
            .or_else(|| packet.dts())
            .map_or(-1, |timestamp| timestamp.rescale(time_base, MICROSECONDS))
    }

    fn sample_decode_time(&self) -> Option<i64> {
        let packet = self.current.as_ref()?;
        let time_base = self.time_bases[packet.stream()];
        packet.dts().map(|timestamp| timestamp.rescale(time_base, MICROSECONDS))
    }

    fn sample_flags(&self) -> BufferFlags {
        match &self.current {
            Some(packet) if packet.is_key() => BufferFlags::KEY_FRAME,
            _ => BufferFlags::empty(),
        }
    }

    fn advance(&mut self) {
        self.load_next();
    }

    fn release(&mut self) {
        self.current = None;
        self.input = None;
    }

    fn size(&self) -> Option<u64> {
        std::fs::metadata(&self.path).ok().map(|metadata| metadata.len())
    }

    fn selection(&self) -> MediaRange {
        self.selection
    }
}

/// A stream-copy multiplexer writing with FFmpeg.
///
/// Output streams are created up front from the parameters of the chosen
/// source tracks, so compressed samples can be written without re-encoding.
/// Samples written before every track has been registered are held back
/// and flushed once the header can be written.
pub struct FfmpegMediaTarget {
    path: PathBuf,
    output: Option<Output>,
    registered: Vec<bool>,
    pending: Vec<(usize, Vec<u8>, BufferInfo)>,
    header_written: bool,
}

impl FfmpegMediaTarget {
    /// Create `path` with one output stream per entry of `source_tracks`.
    /// Target track `i` carries source track `source_tracks[i]`.
    pub fn create<P: AsRef<Path>>(
        path: P,
        source: &FfmpegMediaSource,
        source_tracks: &[usize],
    ) -> Result<Self, TransformError> {
        let path = path.as_ref().to_path_buf();
        let input = source.input()?;
        let mut output = ffmpeg_next::format::output(&path)
            .map_err(|error| target_error(&path, format!("Failed to create output: {error}")))?;

        for &track in source_tracks {
            let stream = input
                .stream(track)
                .ok_or_else(|| target_error(&path, format!("Source has no track {track}")))?;
            let mut out_stream = output.add_stream(ffmpeg_next::encoder::find(Id::None))?;
            out_stream.set_parameters(stream.parameters());
            // Let the muxer pick its own codec tag.
            unsafe {
                (*out_stream.parameters().as_mut_ptr()).codec_tag = 0;
            }
        }

        Ok(Self {
            path,
            output: Some(output),
            registered: vec![false; source_tracks.len()],
            pending: Vec::new(),
            header_written: false,
        })
    }

    fn error(&self, reason: impl Into<String>) -> TransformError {
        target_error(&self.path, reason)
    }

    fn write_packet(&mut self, track: usize, data: &[u8], info: &BufferInfo) -> Result<(), TransformError> {
        let Some(output) = self.output.as_mut() else {
            return Err(target_error(&self.path, "Target has been released"));
        };
        let Some(stream) = output.stream(track) else {
            return Err(target_error(&self.path, format!("No output stream {track}")));
        };
        let time_base = stream.time_base();
        let pts = info.presentation_time_us.rescale(MICROSECONDS, time_base);
        let dts = info
            .decode_time_us
            .map_or(pts, |decode_time| decode_time.rescale(MICROSECONDS, time_base));

        let mut packet = Packet::copy(data);
        packet.set_stream(track);
        packet.set_pts(Some(pts));
        packet.set_dts(Some(dts));
        if info.flags.contains(BufferFlags::KEY_FRAME) {
            packet.set_flags(PacketFlags::KEY);
        }
        packet.set_position(-1);
        packet.write_interleaved(output)?;
        Ok(())
    }

    fn write_header(&mut self) -> Result<(), TransformError> {
        let Some(output) = self.output.as_mut() else {
            return Err(target_error(&self.path, "Target has been released"));
        };
        output.write_header()?;
        self.header_written = true;
        log::debug!("Wrote header of {}", self.path.display());

        for (track, data, info) in std::mem::take(&mut self.pending) {
            self.write_packet(track, &data, &info)?;
        }
        Ok(())
    }
}

impl MediaTarget for FfmpegMediaTarget {
    fn add_track(&mut self, format: &MediaFormat, target_track: usize) -> Result<usize, TransformError> {
        match self.registered.get(target_track) {
            None => return Err(self.error(format!("No output stream {target_track}"))),
            Some(true) => return Err(self.error(format!("Track {target_track} is already registered"))),
            Some(false) => {}
        }
        self.registered[target_track] = true;
        log::debug!("Registered output track {target_track} as {format}");

        if self.registered.iter().all(|&registered| registered) {
            self.write_header()?;
        }
        Ok(target_track)
    }

    fn write_sample_data(&mut self, track: usize, data: &[u8], info: &BufferInfo) -> Result<(), TransformError> {
        if self.header_written {
            self.write_packet(track, data, info)
        } else {
            self.pending.push((track, data.to_vec(), *info));
            Ok(())
        }
    }

    fn release(&mut self) -> Result<(), TransformError> {
        let header_written = self.header_written;
        let Some(mut output) = self.output.take() else {
            return Ok(());
        };
        if !header_written {
            return Err(self.error("Released before every track was registered"));
        }
        output.write_trailer()?;
        log::debug!("Finalised {}", self.path.display());
        Ok(())
    }

    fn output_file_path(&self) -> Option<PathBuf> {
        Some(self.path.clone())
    }
}
