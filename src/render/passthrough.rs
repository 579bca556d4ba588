use crate::codec::{DequeueStatus, Encoder};
use crate::error::{TransformError, TranscoderErrorKind};
use crate::format::MediaFormat;
use crate::frame::{BufferFlags, Frame, Surface};
use crate::render::{DEFAULT_FRAME_WAIT_TIMEOUT, RenderMode, RenderStatus, Renderer};

/// A buffer renderer that copies decoded data into encoder input slots as-is.
///
/// A decoded frame larger than one encoder slot is split across as many
/// slots as needed. When the encoder runs out of free slots part way through,
/// the slots filled so far are queued and [`RenderStatus::Blocked`] is
/// returned; the next call with the same frame continues from the first byte
/// not yet written.
#[derive(Debug, Default)]
pub struct PassthroughSoftwareRenderer {
    resume_offset: usize,
}

impl PassthroughSoftwareRenderer {
    /// Create a renderer.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Renderer for PassthroughSoftwareRenderer {
    fn init(
        &mut self,
        _output_surface: Option<Surface>,
        _source_format: Option<&MediaFormat>,
        _target_format: Option<&MediaFormat>,
    ) -> Result<(), TransformError> {
        self.resume_offset = 0;
        Ok(())
    }

    fn input_surface(&self) -> Option<Surface> {
        None
    }

    fn render_frame(
        &mut self,
        frame: Option<&Frame>,
        presentation_time_ns: i64,
        encoder: &mut dyn Encoder,
    ) -> Result<RenderStatus, TransformError> {
        let Some(frame) = frame else {
            log::error!("Null input frame provided to the software renderer");
            return Ok(RenderStatus::Rendered);
        };

        let input = frame.payload();
        let presentation_time_us = presentation_time_ns / 1_000;
        let mut filled = Vec::new();
        let mut offset = self.resume_offset.min(input.len());

        let status = loop {
            match encoder.dequeue_input_frame(DEFAULT_FRAME_WAIT_TIMEOUT)? {
                DequeueStatus::Frame(tag) => {
                    let Some(slot) = encoder.input_frame(tag) else {
                        return Err(TransformError::transcoder(
                            TranscoderErrorKind::NoFrameAvailable,
                        )
                        .with_detail(format!("encoder returned no input frame for tag {tag}")));
                    };
                    if slot.buffer.is_empty() {
                        slot.buffer.resize(input.len() - offset, 0);
                    }

                    let count = slot.buffer.len().min(input.len() - offset);
                    slot.buffer[..count].copy_from_slice(&input[offset..offset + count]);
                    offset += count;

                    let mut flags = frame.info.flags;
                    if offset < input.len() {
                        flags.remove(BufferFlags::END_OF_STREAM);
                    }
                    slot.info.set(0, count, presentation_time_us, flags);
                    filled.push(tag);

                    if offset >= input.len() {
                        break RenderStatus::Rendered;
                    }
                }
                DequeueStatus::TryAgainLater => break RenderStatus::Blocked,
                DequeueStatus::OutputFormatChanged => {
                    log::warn!("Unexpected format change while dequeuing encoder input");
                    break RenderStatus::Blocked;
                }
            }
        };

        for tag in filled {
            encoder.queue_input_frame(tag)?;
        }

        self.resume_offset = match status {
            RenderStatus::Rendered => 0,
            RenderStatus::Blocked => {
                log::trace!(
                    "Encoder input is full, {} of {} bytes rendered",
                    offset,
                    input.len()
                );
                offset
            }
        };
        Ok(status)
    }

    fn release(&mut self) {
        self.resume_offset = 0;
    }

    fn mode(&self) -> RenderMode {
        RenderMode::Buffer
    }
}
