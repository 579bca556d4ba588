use std::time::Duration;

use crate::codec::{Decoder, DequeueStatus, Encoder};
use crate::error::{Phase, TransformError, TranscoderErrorKind};
use crate::format::MediaFormat;
use crate::io::{SharedMediaSource, SharedMediaTarget};
use crate::render::{RenderStatus, Renderer};
use crate::transcoder::context::{TrackContext, no_frame, rebased_nanos};
use crate::transcoder::{TrackTranscoder, TranscodeResult, combine};

/// Transcodes an audio track through a buffer renderer.
///
/// Decoded buffers are handed to the renderer, which writes them into
/// encoder input slots. The end-of-stream buffer travels the same way, so the
/// encoder learns about it in order with the data. A buffer the renderer
/// could not finish stays with the decoder and is rendered again on the next
/// call, after the encode phase has freed input slots.
pub struct AudioTrackTranscoder {
    context: TrackContext,
    decoder: Box<dyn Decoder>,
    encoder: Box<dyn Encoder>,
    renderer: Box<dyn Renderer>,
    blocked_frame: Option<usize>,
    last_extract: TranscodeResult,
    last_decode: TranscodeResult,
    last_encode: TranscodeResult,
    stopped: bool,
}

impl AudioTrackTranscoder {
    /// Build the transcoder and initialise its codecs and renderer.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: SharedMediaSource,
        source_track: usize,
        target: SharedMediaTarget,
        target_track: usize,
        target_format: MediaFormat,
        mut decoder: Box<dyn Decoder>,
        mut renderer: Box<dyn Renderer>,
        mut encoder: Box<dyn Encoder>,
    ) -> Result<Self, TransformError> {
        let context = TrackContext::new(source, source_track, target, target_track, Some(target_format))?;
        let target_format = context.target_format.as_ref().unwrap_or(&context.source_format);

        encoder.init(target_format).map_err(|e| e.during(Phase::Setup))?;
        decoder
            .init(&context.source_format, None)
            .map_err(|e| e.during(Phase::Setup))?;
        renderer
            .init(None, Some(&context.source_format), Some(target_format))
            .map_err(|e| e.during(Phase::Setup))?;

        Ok(Self {
            context,
            decoder,
            encoder,
            renderer,
            blocked_frame: None,
            last_extract: TranscodeResult::FrameProcessed,
            last_decode: TranscodeResult::FrameProcessed,
            last_encode: TranscodeResult::FrameProcessed,
            stopped: false,
        })
    }

    /// Decode phase: pass one decoded buffer through the renderer.
    ///
    /// Buffers before the selection start are released without rendering.
    /// A buffer is released back to the decoder only once fully rendered.
    fn queue_decoded_frame(&mut self) -> Result<TranscodeResult, TransformError> {
        let tag = match self.blocked_frame.take() {
            Some(tag) => tag,
            None => match self.decoder.dequeue_output_frame(Duration::ZERO)? {
                DequeueStatus::Frame(tag) => tag,
                DequeueStatus::TryAgainLater => return Ok(TranscodeResult::FrameProcessed),
                DequeueStatus::OutputFormatChanged => {
                    self.context
                        .on_decoder_format_changed(&*self.decoder, &mut *self.renderer);
                    return Ok(TranscodeResult::FrameProcessed);
                }
            },
        };

        let frame = self
            .decoder
            .output_frame(tag)
            .ok_or_else(|| no_frame(Phase::Decode, tag))?;
        let end_of_stream = frame.info.is_end_of_stream();

        if end_of_stream || frame.info.presentation_time_us >= self.context.selection.start() {
            let presentation_time_ns = rebased_nanos(frame.info.presentation_time_us, &self.context.selection);
            let status = self
                .renderer
                .render_frame(Some(frame), presentation_time_ns, &mut *self.encoder)?;
            if status == RenderStatus::Blocked {
                self.blocked_frame = Some(tag);
                return Ok(TranscodeResult::FrameProcessed);
            }
        }
        self.decoder.release_output_frame(tag, false)?;

        if end_of_stream {
            log::debug!("EoS on decoder output stream of track {}", self.context.source_track);
            Ok(TranscodeResult::EosReached)
        } else {
            Ok(TranscodeResult::FrameProcessed)
        }
    }
}

impl TrackTranscoder for AudioTrackTranscoder {
    fn start(&mut self) -> Result<(), TransformError> {
        self.context.select_source_track();
        self.encoder.start()?;
        self.decoder.start()?;
        Ok(())
    }

    fn process_next_frame(&mut self) -> Result<TranscodeResult, TransformError> {
        if self.stopped || !self.encoder.is_running() || !self.decoder.is_running() {
            return Err(TransformError::transcoder(TranscoderErrorKind::CodecInReleasedState));
        }

        if self.last_extract != TranscodeResult::EosReached {
            self.last_extract = self
                .context
                .extract(&mut *self.decoder)
                .map_err(|e| e.during(Phase::Extract))?;
        } else {
            self.context.skip_trimmed_samples();
        }

        if self.last_decode != TranscodeResult::EosReached {
            self.last_decode = self
                .queue_decoded_frame()
                .map_err(|e| e.during(Phase::Decode))?;
        }

        if self.last_encode != TranscodeResult::EosReached {
            self.last_encode = self
                .context
                .write_encoded(&mut *self.encoder, &mut *self.renderer)
                .map_err(|e| e.during(Phase::Encode))?;
        }

        Ok(combine(self.last_extract, self.last_decode, self.last_encode))
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        self.encoder.stop();
        self.encoder.release();

        self.decoder.stop();
        self.decoder.release();

        self.renderer.release();
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
        self.decoder.name()
    }

    fn encoder_name(&self) -> String {
        self.encoder.name()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::codec::{PassthroughBufferEncoder, PassthroughDecoder};
    use crate::format::mime;
    use crate::frame::BufferFlags;
    use crate::io::{MediaRange, MemoryMediaSource, MemoryMediaTarget};
    use crate::render::PassthroughSoftwareRenderer;

    fn run_to_end(transcoder: &mut AudioTrackTranscoder) -> usize {
        let mut cycles = 0;
        while transcoder.process_next_frame().unwrap() != TranscodeResult::EosReached {
            cycles += 1;
            assert!(cycles < 1_000, "transcoder did not terminate");
        }
        cycles
    }

    fn transcoder(
        source: MemoryMediaSource,
        target: Arc<Mutex<MemoryMediaTarget>>,
    ) -> AudioTrackTranscoder {
        let format = MediaFormat::audio(mime::AUDIO_RAW, 48_000, 2);
        let mut transcoder = AudioTrackTranscoder::new(
            Arc::new(Mutex::new(source)),
            0,
            target,
            0,
            format,
            Box::new(PassthroughDecoder::new(64)),
            Box::new(PassthroughSoftwareRenderer::new()),
            Box::new(PassthroughBufferEncoder::new(64)),
        )
        .unwrap();
        transcoder.start().unwrap();
        transcoder
    }

    #[test]
    fn copies_buffers_within_selection() {
        let mut format = MediaFormat::audio(mime::AUDIO_RAW, 48_000, 2);
        format.duration_us = Some(10_000);
        let mut source =
            MemoryMediaSource::new(vec![format]).with_selection(MediaRange::new(2_000, 6_000));
        for i in 0..10 {
            source.push_sample(0, vec![i as u8; 4], i * 1_000, BufferFlags::KEY_FRAME);
        }
        let target = Arc::new(Mutex::new(MemoryMediaTarget::new(1)));

        let mut transcoder = transcoder(source, target.clone());
        run_to_end(&mut transcoder);

        let target = target.lock().unwrap();
        let samples = target.samples(0);
        let times: Vec<i64> = samples.iter().map(|s| s.info.presentation_time_us).collect();
        assert_eq!(times, [0, 1_000, 2_000, 3_000]);
        assert_eq!(samples[0].data, [2; 4]);
        assert_eq!(transcoder.progress(), 1.0);
    }

    #[test]
    fn fails_after_stop() {
        let source = MemoryMediaSource::new(vec![MediaFormat::audio(mime::AUDIO_RAW, 8_000, 1)]);
        let target = Arc::new(Mutex::new(MemoryMediaTarget::new(1)));
        let mut transcoder = transcoder(source, target);
        transcoder.stop();
        transcoder.stop();

        let error = transcoder.process_next_frame().unwrap_err();
        assert_eq!(error.transcoder_kind(), Some(TranscoderErrorKind::CodecInReleasedState));
    }
}
