//! Per-track transcoding state machines.
//!
//! A [`TrackTranscoder`] moves one track through three phases on every call
//! to [`process_next_frame`](TrackTranscoder::process_next_frame):
//!
//! 1. **extract**: read the next sample of the track from the source into a
//!    decoder input slot,
//! 2. **decode**: take a decoded frame and push it through the renderer into
//!    the encoder,
//! 3. **encode**: take an encoded sample and write it to the target.
//!
//! Each phase stalls independently: a codec with nothing to offer simply
//! ends that phase's work for the current call. A track is done once all
//! three phases have reached end of stream.
//!
//! Three strategies exist: [`VideoTrackTranscoder`] (surface rendering and
//! frame-rate conversion), [`AudioTrackTranscoder`] (buffer rendering) and
//! [`PassthroughTranscoder`] (sample copy, no codecs).
//! [`TrackTranscoderFactory`] picks one per [`TrackTransform`](crate::TrackTransform).

mod audio;
mod context;
mod factory;
mod passthrough;
mod video;

pub use audio::AudioTrackTranscoder;
pub use factory::{TrackTranscoderFactory, TranscoderFactory};
pub use passthrough::PassthroughTranscoder;
pub use video::VideoTrackTranscoder;

use crate::error::TransformError;
use crate::format::MediaFormat;

/// Outcome of one [`TrackTranscoder::process_next_frame`] call, and of each
/// of its phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TranscodeResult {
    /// Some work may have been done; the track is not finished.
    FrameProcessed,
    /// A decoded frame was consumed but intentionally not rendered.
    FrameSkipped,
    /// The encoder reported its negotiated output format.
    OutputFormatChanged,
    /// Every phase of the track has reached end of stream.
    EosReached,
}

/// The state machine driving one track from source to target.
pub trait TrackTranscoder: Send {
    /// Select the source track and start the codecs.
    fn start(&mut self) -> Result<(), TransformError>;

    /// Advance every phase that has not reached end of stream by at most one
    /// frame. Never blocks on a codec.
    ///
    /// # Errors
    ///
    /// Fails with [`TranscoderErrorKind::CodecInReleasedState`](crate::TranscoderErrorKind)
    /// when called before [`start`](TrackTranscoder::start) or after
    /// [`stop`](TrackTranscoder::stop), and with a codec or container error
    /// when a phase fails.
    fn process_next_frame(&mut self) -> Result<TranscodeResult, TransformError>;

    /// Stop and release the codecs and renderer. Safe to call more than once.
    fn stop(&mut self);

    /// Progress of this track in `[0, 1]`. Never decreases.
    fn progress(&self) -> f32;

    /// Index of the track in the source.
    fn source_track(&self) -> usize;

    /// Index of the track in the target, as returned by the target once the
    /// track is registered.
    fn target_track(&self) -> usize;

    /// Format of the source track, as last reported by the decoder.
    fn source_format(&self) -> &MediaFormat;

    /// The negotiated target format, once known.
    fn target_format(&self) -> Option<&MediaFormat>;

    /// Name of the decoder, `"passthrough"` when none is used.
    fn decoder_name(&self) -> String;

    /// Name of the encoder, `"passthrough"` when none is used.
    fn encoder_name(&self) -> String;
}

/// Fold the three phase results of one call into the call's result.
pub(crate) fn combine(
    extract: TranscodeResult,
    decode: TranscodeResult,
    encode: TranscodeResult,
) -> TranscodeResult {
    use TranscodeResult::*;

    if extract == EosReached && decode == EosReached && encode == EosReached {
        EosReached
    } else if encode == OutputFormatChanged {
        OutputFormatChanged
    } else if decode == FrameSkipped {
        FrameSkipped
    } else {
        FrameProcessed
    }
}
