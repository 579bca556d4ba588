//! The render stage between decoder and encoder.
//!
//! A [`Renderer`] consumes decoded frames and produces encoder input. Buffer
//! renderers receive the decoded [`Frame`] and write into encoder input slots.
//! Surface renderers are driven by the decoder drawing onto
//! [`Renderer::input_surface`]; they receive no frame, only a presentation
//! time, and draw onto the surface created by the encoder.
//!
//! This module also provides the frame-rate policy ([`FrameDropper`]) and the
//! bounded wait surface renderers use to synchronise with the decoder
//! ([`FrameSync`]).

mod frame_dropper;
mod frame_sync;
mod passthrough;

pub use frame_dropper::{DefaultFrameDropper, FrameDropper};
pub use frame_sync::{DEFAULT_FRAME_WAIT_TIMEOUT, FrameSync};
pub use passthrough::PassthroughSoftwareRenderer;

use crate::codec::Encoder;
use crate::error::TransformError;
use crate::format::MediaFormat;
use crate::frame::{Frame, Surface};

/// How a renderer receives decoded media.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Decoded frames are handed over as raw buffers.
    Buffer,
    /// Decoded frames arrive on the renderer's input surface.
    Surface,
}

/// Outcome of [`Renderer::render_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    /// The frame was fully handed to the encoder.
    Rendered,
    /// The encoder ran out of input slots part way through the frame.
    ///
    /// Whatever was written so far has been queued. The caller must keep the
    /// decoded frame and call again with it once the encoder has drained;
    /// rendering resumes where it stopped.
    Blocked,
}

/// A render stage, optionally running a filter chain.
pub trait Renderer: Send {
    /// Prepare the renderer. `output_surface` is the encoder's input surface
    /// for surface renderers and `None` otherwise.
    fn init(
        &mut self,
        output_surface: Option<Surface>,
        source_format: Option<&MediaFormat>,
        target_format: Option<&MediaFormat>,
    ) -> Result<(), TransformError>;

    /// Called when the decoder or encoder settles on a different format.
    fn on_media_format_changed(
        &mut self,
        _source_format: Option<&MediaFormat>,
        _target_format: Option<&MediaFormat>,
    ) {
    }

    /// The surface a decoder should draw onto, for surface renderers.
    fn input_surface(&self) -> Option<Surface>;

    /// Render one frame into `encoder`.
    ///
    /// `frame` is `None` for surface renderers. `presentation_time_ns` is
    /// already rebased to the start of the selected media range. Surface
    /// renderers draw synchronously and always report
    /// [`RenderStatus::Rendered`].
    fn render_frame(
        &mut self,
        frame: Option<&Frame>,
        presentation_time_ns: i64,
        encoder: &mut dyn Encoder,
    ) -> Result<RenderStatus, TransformError>;

    /// Free all resources.
    fn release(&mut self);

    /// Whether the renderer modifies the media it renders.
    fn has_filters(&self) -> bool {
        false
    }

    /// How this renderer receives decoded media.
    fn mode(&self) -> RenderMode;
}
