use std::time::Duration;

use crate::codec::{Decoder, DequeueStatus, Encoder};
use crate::error::{Phase, TransformError, TranscoderErrorKind};
use crate::format::MediaFormat;
use crate::io::{SharedMediaSource, SharedMediaTarget};
use crate::render::{DefaultFrameDropper, FrameDropper, RenderMode, RenderStatus, Renderer};
use crate::transcoder::context::{TrackContext, no_frame, rebased_nanos};
use crate::transcoder::{TrackTranscoder, TranscodeResult, combine};

/// Transcodes a video track through a surface renderer.
///
/// The decoder draws onto the renderer's input surface and the renderer
/// draws onto the encoder's input surface, so decoded frames never pass
/// through this type. When the target frame rate is lower than the source
/// frame rate, a [`DefaultFrameDropper`] decides which decoded frames are
/// drawn.
pub struct VideoTrackTranscoder {
    context: TrackContext,
    decoder: Box<dyn Decoder>,
    encoder: Box<dyn Encoder>,
    renderer: Box<dyn Renderer>,
    frame_dropper: Option<Box<dyn FrameDropper>>,
    last_extract: TranscodeResult,
    last_decode: TranscodeResult,
    last_encode: TranscodeResult,
    stopped: bool,
}

impl VideoTrackTranscoder {
    /// Build the transcoder and initialise encoder, renderer and decoder, in
    /// that order, so each can hand its surface to the next.
    ///
    /// # Errors
    ///
    /// Fails with [`TranscoderErrorKind::RendererNotSurfaceCapable`] when
    /// `renderer` does not render onto surfaces, or with the first codec
    /// initialisation error.
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
        if renderer.mode() != RenderMode::Surface {
            return Err(TransformError::with_format(
                TranscoderErrorKind::RendererNotSurfaceCapable,
                Some(&target_format),
            )
            .during(Phase::Setup));
        }

        let context = TrackContext::new(source, source_track, target, target_track, Some(target_format))?;
        let target_format = context.target_format.as_ref().unwrap_or(&context.source_format);

        let frame_dropper = DefaultFrameDropper::for_rates(
            context.source_format.frame_rate,
            target_format.frame_rate,
        )
        .map(|dropper| Box::new(dropper) as Box<dyn FrameDropper>);
        if frame_dropper.is_some() {
            log::debug!(
                "Dropping frames on track {source_track}: {:?} fps to {:?} fps",
                context.source_format.frame_rate,
                target_format.frame_rate
            );
        }

        encoder.init(target_format).map_err(|e| e.during(Phase::Setup))?;
        let output_surface = encoder.create_input_surface().map_err(|e| e.during(Phase::Setup))?;
        renderer
            .init(output_surface, Some(&context.source_format), Some(target_format))
            .map_err(|e| e.during(Phase::Setup))?;
        decoder
            .init(&context.source_format, renderer.input_surface())
            .map_err(|e| e.during(Phase::Setup))?;

        Ok(Self {
            context,
            decoder,
            encoder,
            renderer,
            frame_dropper,
            last_extract: TranscodeResult::FrameProcessed,
            last_decode: TranscodeResult::FrameProcessed,
            last_encode: TranscodeResult::FrameProcessed,
            stopped: false,
        })
    }

    /// Decode phase: release one decoded frame onto the renderer's surface
    /// and have the renderer draw it for the encoder.
    fn render_decoded_frame(&mut self) -> Result<TranscodeResult, TransformError> {
        let tag = match self.decoder.dequeue_output_frame(Duration::ZERO)? {
            DequeueStatus::Frame(tag) => tag,
            DequeueStatus::TryAgainLater => return Ok(TranscodeResult::FrameProcessed),
            DequeueStatus::OutputFormatChanged => {
                self.context
                    .on_decoder_format_changed(&*self.decoder, &mut *self.renderer);
                return Ok(TranscodeResult::FrameProcessed);
            }
        };

        let info = self
            .decoder
            .output_frame(tag)
            .ok_or_else(|| no_frame(Phase::Decode, tag))?
            .info;

        if info.is_end_of_stream() {
            log::debug!("EoS on decoder output stream of track {}", self.context.source_track);
            self.decoder.release_output_frame(tag, false)?;
            self.encoder.signal_end_of_input_stream()?;
            return Ok(TranscodeResult::EosReached);
        }

        let after_selection_start = info.presentation_time_us >= self.context.selection.start();
        let should_render = after_selection_start
            && self
                .frame_dropper
                .as_mut()
                .is_none_or(|dropper| dropper.should_render());

        self.decoder.release_output_frame(tag, should_render)?;

        if should_render {
            let presentation_time_ns = rebased_nanos(info.presentation_time_us, &self.context.selection);
            match self
                .renderer
                .render_frame(None, presentation_time_ns, &mut *self.encoder)?
            {
                RenderStatus::Rendered => Ok(TranscodeResult::FrameProcessed),
                // The decoder has already drawn and released this frame.
                RenderStatus::Blocked => Err(TransformError::in_phase(
                    TranscoderErrorKind::NoFrameAvailable,
                    Phase::Decode,
                )
                .with_detail("surface renderer deferred a frame it cannot render again")),
            }
        } else {
            Ok(TranscodeResult::FrameSkipped)
        }
    }
}

impl TrackTranscoder for VideoTrackTranscoder {
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
                .render_decoded_frame()
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
