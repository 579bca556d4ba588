//! Codecs that move buffers through without touching their contents.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::codec::{Decoder, DequeueStatus, Encoder};
use crate::error::{TransformError, TranscoderErrorKind};
use crate::format::MediaFormat;
use crate::frame::{BufferFlags, Frame, Surface};

const DEFAULT_BUFFER_POOL_SIZE: usize = 2;

/// Slot pool shared by both passthrough codecs.
///
/// A slot lives in exactly one place at a time: free, handed out for input,
/// or produced and waiting to be consumed.
#[derive(Debug)]
struct FramePool {
    available: VecDeque<Frame>,
    dequeued_input: HashMap<usize, Frame>,
    pending: VecDeque<usize>,
    produced: HashMap<usize, Frame>,
}

impl FramePool {
    fn new(capacity: usize) -> Self {
        Self {
            available: (0..DEFAULT_BUFFER_POOL_SIZE)
                .map(|tag| Frame::new(tag, capacity))
                .collect(),
            dequeued_input: HashMap::new(),
            pending: VecDeque::new(),
            produced: HashMap::new(),
        }
    }

    fn dequeue_input(&mut self) -> DequeueStatus {
        match self.available.pop_front() {
            Some(frame) => {
                let tag = frame.tag;
                self.dequeued_input.insert(tag, frame);
                DequeueStatus::Frame(tag)
            }
            None => DequeueStatus::TryAgainLater,
        }
    }

    fn queue_input(&mut self, tag: usize) -> Result<(), TransformError> {
        let frame = self.dequeued_input.remove(&tag).ok_or_else(|| {
            TransformError::transcoder(TranscoderErrorKind::NoFrameAvailable)
                .with_detail(format!("input tag {tag} was not dequeued"))
        })?;
        self.produced.insert(tag, frame);
        self.pending.push_back(tag);
        Ok(())
    }

    fn dequeue_output(&mut self) -> DequeueStatus {
        self.pending
            .pop_front()
            .map_or(DequeueStatus::TryAgainLater, DequeueStatus::Frame)
    }

    fn release_output(&mut self, tag: usize) {
        if let Some(mut frame) = self.produced.remove(&tag) {
            frame.info = Default::default();
            self.available.push_back(frame);
        }
    }

    fn clear(&mut self) {
        self.available.clear();
        self.dequeued_input.clear();
        self.pending.clear();
        self.produced.clear();
    }
}

/// A decoder that emits its input samples unchanged.
///
/// Suitable for uncompressed sources, or as the decoder half of a buffer
/// copy. Output frames released with `render = true` are discarded; there is
/// nothing to draw onto a surface.
#[derive(Debug)]
pub struct PassthroughDecoder {
    pool: FramePool,
    format: Option<MediaFormat>,
    surface: Option<Surface>,
    running: bool,
}

impl PassthroughDecoder {
    /// Create a decoder whose slots start with `input_buffer_capacity` bytes.
    pub fn new(input_buffer_capacity: usize) -> Self {
        Self {
            pool: FramePool::new(input_buffer_capacity),
            format: None,
            surface: None,
            running: false,
        }
    }
}

impl Decoder for PassthroughDecoder {
    fn init(&mut self, format: &MediaFormat, surface: Option<Surface>) -> Result<(), TransformError> {
        self.format = Some(format.clone());
        self.surface = surface;
        Ok(())
    }

    fn start(&mut self) -> Result<(), TransformError> {
        if self.format.is_none() {
            return Err(TransformError::transcoder(
                TranscoderErrorKind::DecoderConfigurationError,
            )
            .with_detail("decoder started before init"));
        }
        self.running = true;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn dequeue_input_frame(&mut self, _timeout: Duration) -> Result<DequeueStatus, TransformError> {
        Ok(self.pool.dequeue_input())
    }

    fn input_frame(&mut self, tag: usize) -> Option<&mut Frame> {
        self.pool.dequeued_input.get_mut(&tag)
    }

    fn queue_input_frame(&mut self, tag: usize) -> Result<(), TransformError> {
        self.pool.queue_input(tag)
    }

    fn dequeue_output_frame(&mut self, _timeout: Duration) -> Result<DequeueStatus, TransformError> {
        Ok(self.pool.dequeue_output())
    }

    fn output_frame(&self, tag: usize) -> Option<&Frame> {
        self.pool.produced.get(&tag)
    }

    fn release_output_frame(&mut self, tag: usize, render: bool) -> Result<(), TransformError> {
        if render && self.surface.is_some() {
            log::trace!("PassthroughDecoder has no pixels to draw for frame {tag}");
        }
        self.pool.release_output(tag);
        Ok(())
    }

    fn output_format(&self) -> Option<MediaFormat> {
        self.format.clone()
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn release(&mut self) {
        self.pool.clear();
    }

    fn name(&self) -> String {
        "PassthroughDecoder".to_string()
    }
}

/// An encoder that emits its input buffers unchanged.
///
/// The first output poll reports [`DequeueStatus::OutputFormatChanged`] with
/// the format given to [`init`](Encoder::init). Calling
/// [`signal_end_of_input_stream`](Encoder::signal_end_of_input_stream)
/// appends an empty end-of-stream sample once all queued input has drained.
#[derive(Debug)]
pub struct PassthroughBufferEncoder {
    pool: FramePool,
    format: Option<MediaFormat>,
    running: bool,
    format_reported: bool,
    end_of_input: bool,
    end_of_stream_sent: bool,
}

impl PassthroughBufferEncoder {
    /// Tag of the slot carrying the end-of-stream marker; never part of the pool.
    const END_OF_STREAM_TAG: usize = DEFAULT_BUFFER_POOL_SIZE;

    /// Create an encoder whose input slots hold `input_buffer_capacity` bytes.
    pub fn new(input_buffer_capacity: usize) -> Self {
        Self {
            pool: FramePool::new(input_buffer_capacity),
            format: None,
            running: false,
            format_reported: false,
            end_of_input: false,
            end_of_stream_sent: false,
        }
    }
}

impl Encoder for PassthroughBufferEncoder {
    fn init(&mut self, target_format: &MediaFormat) -> Result<(), TransformError> {
        self.format = Some(target_format.clone());
        Ok(())
    }

    fn create_input_surface(&mut self) -> Result<Option<Surface>, TransformError> {
        Ok(None)
    }

    fn start(&mut self) -> Result<(), TransformError> {
        if self.format.is_none() {
            return Err(TransformError::transcoder(
                TranscoderErrorKind::EncoderConfigurationError,
            )
            .with_detail("encoder started before init"));
        }
        self.running = true;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn signal_end_of_input_stream(&mut self) -> Result<(), TransformError> {
        self.end_of_input = true;
        Ok(())
    }

    fn dequeue_input_frame(&mut self, _timeout: Duration) -> Result<DequeueStatus, TransformError> {
        Ok(self.pool.dequeue_input())
    }

    fn input_frame(&mut self, tag: usize) -> Option<&mut Frame> {
        self.pool.dequeued_input.get_mut(&tag)
    }

    fn queue_input_frame(&mut self, tag: usize) -> Result<(), TransformError> {
        self.pool.queue_input(tag)
    }

    fn dequeue_output_frame(&mut self, _timeout: Duration) -> Result<DequeueStatus, TransformError> {
        if !self.format_reported {
            self.format_reported = true;
            return Ok(DequeueStatus::OutputFormatChanged);
        }
        let status = self.pool.dequeue_output();
        if status == DequeueStatus::TryAgainLater && self.end_of_input && !self.end_of_stream_sent {
            self.end_of_stream_sent = true;
            let mut marker = Frame::new(Self::END_OF_STREAM_TAG, 0);
            marker.info.flags = BufferFlags::END_OF_STREAM;
            self.pool.produced.insert(Self::END_OF_STREAM_TAG, marker);
            return Ok(DequeueStatus::Frame(Self::END_OF_STREAM_TAG));
        }
        Ok(status)
    }

    fn output_frame(&self, tag: usize) -> Option<&Frame> {
        self.pool.produced.get(&tag)
    }

    fn release_output_frame(&mut self, tag: usize) -> Result<(), TransformError> {
        if tag == Self::END_OF_STREAM_TAG {
            self.pool.produced.remove(&tag);
        } else {
            self.pool.release_output(tag);
        }
        Ok(())
    }

    fn output_format(&self) -> Option<MediaFormat> {
        self.format.clone()
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn release(&mut self) {
        self.pool.clear();
    }

    fn name(&self) -> String {
        "PassthroughEncoder".to_string()
    }
}
