//! Frames exchanged between codecs, renderers and containers.

use bitflags::bitflags;

bitflags! {
    /// Flags attached to a sample or frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferFlags: u32 {
        /// The buffer holds a sync (key) frame.
        const KEY_FRAME = 1;
        /// The buffer holds codec initialisation data, not media.
        const CODEC_CONFIG = 1 << 1;
        /// No buffers follow this one.
        const END_OF_STREAM = 1 << 2;
        /// The buffer holds only part of a frame.
        const PARTIAL_FRAME = 1 << 3;
    }
}

/// Timing and layout metadata for the payload of a [`Frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferInfo {
    /// Offset of the first payload byte within the buffer.
    pub offset: usize,
    /// Number of payload bytes.
    pub size: usize,
    /// Presentation timestamp in microseconds.
    pub presentation_time_us: i64,
    /// Decode timestamp in microseconds, for streams whose decode order
    /// differs from presentation order. `None` means decode time equals
    /// presentation time.
    pub decode_time_us: Option<i64>,
    /// Buffer flags.
    pub flags: BufferFlags,
}

impl BufferInfo {
    /// Replace all fields at once. The decode time is cleared.
    pub fn set(&mut self, offset: usize, size: usize, presentation_time_us: i64, flags: BufferFlags) {
        self.offset = offset;
        self.size = size;
        self.presentation_time_us = presentation_time_us;
        self.decode_time_us = None;
        self.flags = flags;
    }

    /// Whether the end-of-stream flag is set.
    pub fn is_end_of_stream(&self) -> bool {
        self.flags.contains(BufferFlags::END_OF_STREAM)
    }

    /// Whether the buffer holds codec configuration rather than media.
    pub fn is_codec_config(&self) -> bool {
        self.flags.contains(BufferFlags::CODEC_CONFIG)
    }
}

/// A buffer slot owned by a codec queue.
///
/// The `tag` identifies the slot within the codec that handed it out and is
/// what must be passed back when the frame is queued or released.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// Slot identifier within the owning codec.
    pub tag: usize,
    /// Backing storage.
    pub buffer: Vec<u8>,
    /// Payload metadata.
    pub info: BufferInfo,
}

impl Frame {
    /// Create an empty frame with `capacity` zeroed bytes of storage.
    pub fn new(tag: usize, capacity: usize) -> Self {
        Self {
            tag,
            buffer: vec![0; capacity],
            info: BufferInfo::default(),
        }
    }

    /// The payload bytes described by [`BufferInfo::offset`] and
    /// [`BufferInfo::size`], clamped to the buffer.
    pub fn payload(&self) -> &[u8] {
        let start = self.info.offset.min(self.buffer.len());
        let end = start.saturating_add(self.info.size).min(self.buffer.len());
        &self.buffer[start..end]
    }
}

/// Opaque handle to a rendering surface shared between a renderer and a
/// surface-capable codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Surface {
    id: u64,
}

impl Surface {
    /// Wrap a platform surface identifier.
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    /// The platform surface identifier.
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_clamped() {
        let mut frame = Frame::new(0, 4);
        frame.buffer.copy_from_slice(&[1, 2, 3, 4]);
        frame.info.set(1, 10, 0, BufferFlags::empty());
        assert_eq!(frame.payload(), &[2, 3, 4]);
        frame.info.offset = 9;
        assert!(frame.payload().is_empty());
    }
}
