//! State and phases shared by the codec-backed strategies.

use std::time::Duration;

use crate::codec::{Decoder, DequeueStatus, Encoder};
use crate::error::{Phase, TransformError, TranscoderErrorKind};
use crate::format::MediaFormat;
use crate::frame::BufferFlags;
use crate::io::{self, MediaRange, MediaSource, SharedMediaSource, SharedMediaTarget};
use crate::render::Renderer;
use crate::transcoder::TranscodeResult;

/// Whether the target track has been registered with the target.
///
/// The transition happens exactly once, on the first format the encoder
/// reports (or the source format, for copies).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TargetRegistration {
    FormatPending,
    FormatRegistered,
}

/// Source/target plumbing, selection and progress of one track.
pub(crate) struct TrackContext {
    pub(crate) source: SharedMediaSource,
    pub(crate) target: SharedMediaTarget,
    pub(crate) source_track: usize,
    pub(crate) target_track: usize,
    pub(crate) source_format: MediaFormat,
    pub(crate) target_format: Option<MediaFormat>,
    pub(crate) selection: MediaRange,
    /// Length of the selected part of the track, when the source knows it.
    pub(crate) duration_us: Option<i64>,
    pub(crate) progress: f32,
    registration: TargetRegistration,
    /// Extraction ended at the selection end rather than the end of the source.
    trimmed: bool,
}

impl TrackContext {
    pub(crate) fn new(
        source: SharedMediaSource,
        source_track: usize,
        target: SharedMediaTarget,
        target_track: usize,
        target_format: Option<MediaFormat>,
    ) -> Result<Self, TransformError> {
        let (source_format, selection) = {
            let source = io::lock(&source);
            (source.track_format(source_track)?, source.selection())
        };

        if selection.end() < selection.start() {
            return Err(TransformError::MediaSource {
                reason: format!(
                    "selection end {} precedes selection start {}",
                    selection.end(),
                    selection.start()
                ),
            });
        }

        let mut target_format = target_format;
        if let (Some(duration), Some(format)) = (source_format.duration_us, target_format.as_mut()) {
            format.duration_us = Some(duration);
        }

        let duration_us = source_format
            .duration_us
            .map(|duration| duration.min(selection.end()) - selection.start().max(0))
            .filter(|duration| *duration > 0);

        Ok(Self {
            source,
            target,
            source_track,
            target_track,
            source_format,
            target_format,
            selection,
            duration_us,
            progress: 0.0,
            registration: TargetRegistration::FormatPending,
            trimmed: false,
        })
    }

    pub(crate) fn select_source_track(&self) {
        io::lock(&self.source).select_track(self.source_track);
    }

    pub(crate) fn is_target_registered(&self) -> bool {
        self.registration == TargetRegistration::FormatRegistered
    }

    /// Register the target track with `format`. Returns `false` when the
    /// track was already registered, in which case nothing changes.
    pub(crate) fn register_target(&mut self, format: MediaFormat) -> Result<bool, TransformError> {
        if self.is_target_registered() {
            return Ok(false);
        }
        self.target_track = io::lock(&self.target).add_track(&format, self.target_track)?;
        log::debug!(
            "Source track {} registered as target track {}: {format}",
            self.source_track,
            self.target_track
        );
        self.target_format = Some(format);
        self.registration = TargetRegistration::FormatRegistered;
        Ok(true)
    }

    /// Record that output up to `presentation_time_us` has been written.
    pub(crate) fn update_progress(&mut self, presentation_time_us: i64) {
        if let Some(duration) = self.duration_us {
            let progress = (presentation_time_us as f64 / duration as f64).clamp(0.0, 1.0) as f32;
            self.progress = self.progress.max(progress);
        }
    }

    pub(crate) fn finish_progress(&mut self) {
        self.progress = 1.0;
    }

    pub(crate) fn mark_trimmed(&mut self) {
        self.trimmed = true;
    }

    /// Skip the rest of this track's samples under the cursor so other
    /// tracks sharing the source can reach theirs.
    pub(crate) fn advance_to_next_track(&self, source: &mut dyn MediaSource) {
        while source.sample_track_index() == Some(self.source_track) {
            source.advance();
            if source.sample_flags().contains(BufferFlags::END_OF_STREAM) {
                return;
            }
        }
    }

    /// Once extraction has stopped at the selection end, samples of this
    /// track still surface between other tracks' samples. Nothing reads
    /// them any more, so step over them on every call.
    pub(crate) fn skip_trimmed_samples(&self) {
        if self.trimmed {
            let mut source = io::lock(&self.source);
            self.advance_to_next_track(&mut *source);
        }
    }

    /// Extract phase: move one sample of this track from the source into a
    /// decoder input slot.
    pub(crate) fn extract(&mut self, decoder: &mut dyn Decoder) -> Result<TranscodeResult, TransformError> {
        let source_handle = self.source.clone();
        let mut source = io::lock(&source_handle);
        if let Some(track) = source.sample_track_index() {
            if track != self.source_track {
                return Ok(TranscodeResult::FrameProcessed);
            }
        }

        let tag = match decoder.dequeue_input_frame(Duration::ZERO)? {
            DequeueStatus::Frame(tag) => tag,
            DequeueStatus::TryAgainLater => return Ok(TranscodeResult::FrameProcessed),
            DequeueStatus::OutputFormatChanged => {
                log::error!("Unexpected format change when dequeuing a decoder input frame");
                return Ok(TranscodeResult::FrameProcessed);
            }
        };

        let frame = decoder
            .input_frame(tag)
            .ok_or_else(|| no_frame(Phase::Extract, tag))?;
        let bytes_read = source.read_sample_data(&mut frame.buffer);
        let sample_time = source.sample_time();
        let sample_flags = source.sample_flags();

        let result = match bytes_read {
            Some(_) if sample_flags.contains(BufferFlags::END_OF_STREAM) => {
                frame.info.set(0, 0, -1, BufferFlags::END_OF_STREAM);
                log::debug!("EoS reached on the input stream of track {}", self.source_track);
                TranscodeResult::EosReached
            }
            None => {
                frame.info.set(0, 0, -1, BufferFlags::END_OF_STREAM);
                log::debug!("EoS reached on the input stream of track {}", self.source_track);
                TranscodeResult::EosReached
            }
            Some(_) if sample_time >= self.selection.end() => {
                frame.info.set(0, 0, -1, BufferFlags::END_OF_STREAM);
                self.advance_to_next_track(&mut *source);
                self.trimmed = true;
                log::debug!("Selection end reached on the input stream of track {}", self.source_track);
                TranscodeResult::EosReached
            }
            Some(size) => {
                frame.info.set(0, size, sample_time, sample_flags);
                source.advance();
                TranscodeResult::FrameProcessed
            }
        };
        drop(source);

        decoder.queue_input_frame(tag)?;
        Ok(result)
    }

    /// Encode phase: move one encoded sample from the encoder to the target,
    /// registering the target track on the first format report.
    pub(crate) fn write_encoded(
        &mut self,
        encoder: &mut dyn Encoder,
        renderer: &mut dyn Renderer,
    ) -> Result<TranscodeResult, TransformError> {
        match encoder.dequeue_output_frame(Duration::ZERO)? {
            DequeueStatus::Frame(tag) => {
                let frame = encoder
                    .output_frame(tag)
                    .ok_or_else(|| no_frame(Phase::Encode, tag))?;

                let result = if frame.info.is_end_of_stream() {
                    log::debug!("Encoder produced EoS on track {}, we are done", self.source_track);
                    self.finish_progress();
                    TranscodeResult::EosReached
                } else if frame.info.size > 0 && !frame.info.is_codec_config() {
                    if !self.is_target_registered() {
                        log::warn!(
                            "Encoder for track {} produced output before reporting its format",
                            self.source_track
                        );
                        let format = encoder
                            .output_format()
                            .or_else(|| self.target_format.clone())
                            .ok_or_else(|| {
                                TransformError::in_phase(
                                    TranscoderErrorKind::EncoderFormatNotFound,
                                    Phase::Encode,
                                )
                            })?;
                        self.register_target(format)?;
                    }
                    io::lock(&self.target).write_sample_data(
                        self.target_track,
                        frame.payload(),
                        &frame.info,
                    )?;
                    self.update_progress(frame.info.presentation_time_us);
                    TranscodeResult::FrameProcessed
                } else {
                    TranscodeResult::FrameProcessed
                };

                encoder.release_output_frame(tag)?;
                Ok(result)
            }
            DequeueStatus::TryAgainLater => Ok(TranscodeResult::FrameProcessed),
            DequeueStatus::OutputFormatChanged => {
                let format = encoder
                    .output_format()
                    .or_else(|| self.target_format.clone())
                    .ok_or_else(|| {
                        TransformError::in_phase(TranscoderErrorKind::EncoderFormatNotFound, Phase::Encode)
                    })?;
                log::debug!("Encoder output format received: {format}");
                if self.register_target(format)? {
                    renderer.on_media_format_changed(Some(&self.source_format), self.target_format.as_ref());
                }
                Ok(TranscodeResult::OutputFormatChanged)
            }
        }
    }

    /// Handle a decoder format change.
    pub(crate) fn on_decoder_format_changed(&mut self, decoder: &dyn Decoder, renderer: &mut dyn Renderer) {
        if let Some(format) = decoder.output_format() {
            log::debug!("Decoder output format changed: {format}");
            self.source_format = format;
            renderer.on_media_format_changed(Some(&self.source_format), self.target_format.as_ref());
        }
    }
}

/// A codec handed out a tag but had no frame for it.
pub(crate) fn no_frame(phase: Phase, tag: usize) -> TransformError {
    TransformError::in_phase(TranscoderErrorKind::NoFrameAvailable, phase).with_detail(format!("tag {tag}"))
}

/// Rebase a presentation time to the selection start, in nanoseconds.
pub(crate) fn rebased_nanos(presentation_time_us: i64, selection: &MediaRange) -> i64 {
    presentation_time_us
        .saturating_sub(selection.start())
        .saturating_mul(1_000)
}
