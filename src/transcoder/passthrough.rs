use crate::error::{Phase, TransformError, TranscoderErrorKind};
use crate::format::MediaFormat;
use crate::frame::{BufferFlags, BufferInfo};
use crate::io::{self, SharedMediaSource, SharedMediaTarget};
use crate::transcoder::context::TrackContext;
use crate::transcoder::{TrackTranscoder, TranscodeResult};

const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Copies a track's compressed samples from source to target unchanged.
///
/// The first call registers the target track with the source format and
/// reports [`TranscodeResult::OutputFormatChanged`]. Samples before the
/// selection start are skipped; the rest are written with timestamps rebased
/// to the selection start until the selection end or the end of the source.
pub struct PassthroughTranscoder {
    context: TrackContext,
    buffer: Vec<u8>,
    last_result: TranscodeResult,
    started: bool,
    stopped: bool,
}

impl PassthroughTranscoder {
    /// Build a passthrough transcoder for `source_track`.
    pub fn new(
        source: SharedMediaSource,
        source_track: usize,
        target: SharedMediaTarget,
        target_track: usize,
    ) -> Result<Self, TransformError> {
        let context = TrackContext::new(source, source_track, target, target_track, None)?;
        Ok(Self {
            context,
            buffer: Vec::new(),
            last_result: TranscodeResult::FrameProcessed,
            started: false,
            stopped: false,
        })
    }

    fn register_target(&mut self) -> Result<TranscodeResult, TransformError> {
        let mut format = self.context.source_format.clone();
        if let Some(duration) = self.context.duration_us {
            format.duration_us = Some(duration);
        }
        let buffer_size = format.max_input_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        self.buffer = Vec::with_capacity(buffer_size);
        self.context.register_target(format)?;
        Ok(TranscodeResult::OutputFormatChanged)
    }

    fn copy_sample(&mut self) -> Result<TranscodeResult, TransformError> {
        let source_handle = self.context.source.clone();
        let mut source = io::lock(&source_handle);

        if let Some(track) = source.sample_track_index() {
            if track != self.context.source_track {
                return Ok(TranscodeResult::FrameProcessed);
            }
        }

        let bytes_read = source.read_sample_data(&mut self.buffer);
        let sample_time = source.sample_time();
        let sample_flags = source.sample_flags();
        let sample_decode_time = source.sample_decode_time();
        let selection = self.context.selection;

        match bytes_read {
            None => {
                self.context.finish_progress();
                log::debug!("Reached EoS on input stream of track {}", self.context.source_track);
                Ok(TranscodeResult::EosReached)
            }
            Some(_) if sample_flags.contains(BufferFlags::END_OF_STREAM) => {
                self.context.finish_progress();
                log::debug!("Reached EoS on input stream of track {}", self.context.source_track);
                Ok(TranscodeResult::EosReached)
            }
            Some(_) if sample_time >= selection.end() => {
                self.context.finish_progress();
                self.context.advance_to_next_track(&mut *source);
                self.context.mark_trimmed();
                log::debug!("Reached selection end on input stream of track {}", self.context.source_track);
                Ok(TranscodeResult::EosReached)
            }
            Some(size) => {
                if sample_time >= selection.start() {
                    let mut flags = BufferFlags::empty();
                    if sample_flags.contains(BufferFlags::KEY_FRAME) {
                        flags |= BufferFlags::KEY_FRAME;
                    }
                    let presentation_time_us = sample_time - selection.start();
                    let info = BufferInfo {
                        offset: 0,
                        size,
                        presentation_time_us,
                        decode_time_us: sample_decode_time.map(|time| time - selection.start()),
                        flags,
                    };
                    io::lock(&self.context.target).write_sample_data(
                        self.context.target_track,
                        &self.buffer[..size],
                        &info,
                    )?;
                    self.context.update_progress(presentation_time_us);
                }
                source.advance();
                Ok(TranscodeResult::FrameProcessed)
            }
        }
    }
}

impl TrackTranscoder for PassthroughTranscoder {
    fn start(&mut self) -> Result<(), TransformError> {
        self.context.select_source_track();
        self.started = true;
        Ok(())
    }

    fn process_next_frame(&mut self) -> Result<TranscodeResult, TransformError> {
        if !self.started || self.stopped {
            return Err(TransformError::transcoder(TranscoderErrorKind::CodecInReleasedState));
        }

        if self.last_result == TranscodeResult::EosReached {
            self.context.skip_trimmed_samples();
            return Ok(self.last_result);
        }

        let result = if self.context.is_target_registered() {
            self.copy_sample()
        } else {
            self.register_target()
        };
        self.last_result = result.map_err(|e| e.during(Phase::Encode))?;
        Ok(self.last_result)
    }

    fn stop(&mut self) {
        self.stopped = true;
        self.buffer = Vec::new();
    }

    fn progress(&self) -> f32 {
        self.context.progress
    }

    fn source_track(&self) -> usize {
        self.context.source_track
    }

    fn target_track(&self) -> usize {
        self.context.target_track
    }

    fn source_format(&self) -> &MediaFormat {
        &self.context.source_format
    }

    fn target_format(&self) -> Option<&MediaFormat> {
        self.context.target_format.as_ref()
    }

    fn decoder_name(&self) -> String {
        "passthrough".to_string()
    }

    fn encoder_name(&self) -> String {
        "passthrough".to_string()
    }
}
