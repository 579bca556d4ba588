//! Queue-based codec ports.
//!
//! A codec owns a pool of [`Frame`] slots. Clients dequeue a slot by tag,
//! fill or read it through [`Decoder::input_frame`] / [`Decoder::output_frame`],
//! and hand it back by tag. Every dequeue is a poll bounded by a timeout; the
//! pipeline always polls with a zero timeout so a stalled codec never blocks
//! the round-robin loop.
//!
//! Hardware codecs are supplied by the embedding application. The crate ships
//! [`PassthroughDecoder`] and [`PassthroughBufferEncoder`], which move buffers
//! through unchanged and are useful for audio copies and tests.

mod passthrough;

use std::time::Duration;

pub use passthrough::{PassthroughBufferEncoder, PassthroughDecoder};

use crate::error::TransformError;
use crate::format::MediaFormat;
use crate::frame::{Frame, Surface};

/// Result of polling a codec queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DequeueStatus {
    /// A frame slot with the given tag is ready.
    Frame(usize),
    /// Nothing is available right now.
    TryAgainLater,
    /// The output format changed; query it with `output_format()`.
    OutputFormatChanged,
}

/// A decoder turning compressed samples into raw frames.
///
/// When initialised with a [`Surface`], releasing an output frame with
/// `render = true` pushes its contents onto that surface.
pub trait Decoder: Send {
    /// Configure the decoder for `format`, optionally rendering to `surface`.
    fn init(&mut self, format: &MediaFormat, surface: Option<Surface>) -> Result<(), TransformError>;

    /// Start decoding.
    fn start(&mut self) -> Result<(), TransformError>;

    /// Whether the decoder has been started and not yet stopped.
    fn is_running(&self) -> bool;

    /// Poll for a free input slot.
    fn dequeue_input_frame(&mut self, timeout: Duration) -> Result<DequeueStatus, TransformError>;

    /// Access an input slot previously returned by
    /// [`dequeue_input_frame`](Decoder::dequeue_input_frame).
    fn input_frame(&mut self, tag: usize) -> Option<&mut Frame>;

    /// Submit a filled input slot for decoding.
    fn queue_input_frame(&mut self, tag: usize) -> Result<(), TransformError>;

    /// Poll for a decoded frame.
    fn dequeue_output_frame(&mut self, timeout: Duration) -> Result<DequeueStatus, TransformError>;

    /// Access a decoded frame previously returned by
    /// [`dequeue_output_frame`](Decoder::dequeue_output_frame).
    fn output_frame(&self, tag: usize) -> Option<&Frame>;

    /// Return a decoded frame to the decoder, rendering it to the output
    /// surface first when `render` is set.
    fn release_output_frame(&mut self, tag: usize, render: bool) -> Result<(), TransformError>;

    /// The current output format, if known.
    fn output_format(&self) -> Option<MediaFormat>;

    /// Stop decoding. Slots handed out become invalid.
    fn stop(&mut self);

    /// Free all resources. The decoder cannot be restarted afterwards.
    fn release(&mut self);

    /// Human readable codec name, used in statistics.
    fn name(&self) -> String;
}

/// An encoder turning raw frames into compressed samples.
///
/// The first output poll of a correctly behaving encoder reports
/// [`DequeueStatus::OutputFormatChanged`], which is when the negotiated
/// target format becomes known.
pub trait Encoder: Send {
    /// Configure the encoder to produce `target_format`.
    fn init(&mut self, target_format: &MediaFormat) -> Result<(), TransformError>;

    /// Create a surface the encoder reads its input from, for encoders that
    /// support surface input. Call after [`init`](Encoder::init).
    fn create_input_surface(&mut self) -> Result<Option<Surface>, TransformError>;

    /// Start encoding.
    fn start(&mut self) -> Result<(), TransformError>;

    /// Whether the encoder has been started and not yet stopped.
    fn is_running(&self) -> bool;

    /// Signal that no more input will arrive through the input surface.
    fn signal_end_of_input_stream(&mut self) -> Result<(), TransformError>;

    /// Poll for a free input slot.
    fn dequeue_input_frame(&mut self, timeout: Duration) -> Result<DequeueStatus, TransformError>;

    /// Access an input slot previously returned by
    /// [`dequeue_input_frame`](Encoder::dequeue_input_frame).
    fn input_frame(&mut self, tag: usize) -> Option<&mut Frame>;

    /// Submit a filled input slot for encoding.
    fn queue_input_frame(&mut self, tag: usize) -> Result<(), TransformError>;

    /// Poll for an encoded sample.
    fn dequeue_output_frame(&mut self, timeout: Duration) -> Result<DequeueStatus, TransformError>;

    /// Access an encoded sample previously returned by
    /// [`dequeue_output_frame`](Encoder::dequeue_output_frame).
    fn output_frame(&self, tag: usize) -> Option<&Frame>;

    /// Return an encoded sample slot to the encoder.
    fn release_output_frame(&mut self, tag: usize) -> Result<(), TransformError>;

    /// The negotiated output format, if known.
    fn output_format(&self) -> Option<MediaFormat>;

    /// Stop encoding.
    fn stop(&mut self);

    /// Free all resources.
    fn release(&mut self);

    /// Human readable codec name, used in statistics.
    fn name(&self) -> String;
}
