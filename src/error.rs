//! Error types for the `mediaflow` crate.
//!
//! This module defines [`TransformError`], the unified error type returned by
//! all fallible operations in the crate. Errors carry enough context (track,
//! pipeline phase, media format) to diagnose a failed transformation without
//! reproducing it.

use std::{fmt, io::Error as IoError, path::PathBuf};

#[cfg(feature = "ffmpeg")]
use ffmpeg_next::Error as FfmpegError;
use thiserror::Error;

use crate::format::MediaFormat;

/// Pipeline phase in which a track transcoder failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Building the transcoder and initialising its codecs.
    Setup,
    /// Starting the underlying codecs.
    Start,
    /// Reading samples from the source into the decoder.
    Extract,
    /// Moving decoded frames through the render stage.
    Decode,
    /// Writing encoded frames to the target.
    Encode,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Setup => "setup",
            Phase::Start => "start",
            Phase::Extract => "extract",
            Phase::Decode => "decode",
            Phase::Encode => "encode",
        };
        f.write_str(name)
    }
}

/// The specific failure reported by a track transcoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum TranscoderErrorKind {
    /// No decoder supports the source format.
    DecoderFormatNotFound,
    /// The decoder rejected its configuration.
    DecoderConfigurationError,
    /// No encoder supports the target format.
    EncoderFormatNotFound,
    /// The encoder rejected its configuration.
    EncoderConfigurationError,
    /// No decoder is available at all.
    DecoderNotFound,
    /// No encoder is available at all.
    EncoderNotFound,
    /// A codec was used after it had been stopped or released.
    CodecInReleasedState,
    /// The track format does not carry a mime type.
    SourceTrackMimeTypeNotFound,
    /// The request contains no tracks.
    NoTracksFound,
    /// The codec implementation failed internally.
    InternalCodecError,
    /// A codec returned no frame for a tag it had just handed out.
    NoFrameAvailable,
    /// The track needs a decoder but none was supplied.
    DecoderNotProvided,
    /// The track needs an encoder but none was supplied.
    EncoderNotProvided,
    /// The track needs a renderer but none was supplied.
    RendererNotProvided,
    /// A video track was given a renderer that cannot draw onto surfaces.
    RendererNotSurfaceCapable,
}

impl TranscoderErrorKind {
    /// Human readable description of the failure.
    pub fn message(self) -> &'static str {
        match self {
            Self::DecoderFormatNotFound => "Failed to create decoder codec",
            Self::DecoderConfigurationError => "Failed to configure decoder codec",
            Self::EncoderFormatNotFound => "Failed to create encoder codec",
            Self::EncoderConfigurationError => "Failed to configure encoder codec",
            Self::DecoderNotFound => "No decoder found",
            Self::EncoderNotFound => "No encoder found",
            Self::CodecInReleasedState => "Codecs are in released state",
            Self::SourceTrackMimeTypeNotFound => "Mime type not found for the source track",
            Self::NoTracksFound => "No tracks found",
            Self::InternalCodecError => "Internal codec error occurred",
            Self::NoFrameAvailable => "No frame available for specified tag",
            Self::DecoderNotProvided => "Decoder is not provided",
            Self::EncoderNotProvided => "Encoder is not provided",
            Self::RendererNotProvided => "Renderer is not provided",
            Self::RendererNotSurfaceCapable => "Video renderer does not support surface rendering",
        }
    }

    /// Returns `true` for failures detected before any media is processed.
    pub fn is_configuration(self) -> bool {
        matches!(
            self,
            Self::SourceTrackMimeTypeNotFound
                | Self::NoTracksFound
                | Self::DecoderNotProvided
                | Self::EncoderNotProvided
                | Self::RendererNotProvided
                | Self::RendererNotSurfaceCapable
        )
    }
}

impl fmt::Display for TranscoderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Optional context attached to a [`TransformError::TrackTranscoder`] or a
/// [`TransformError::InTrack`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscoderContext {
    /// Index of the track within the request.
    pub track: Option<usize>,
    /// Phase of the pipeline that failed.
    pub phase: Option<Phase>,
    /// Media format involved in the failure.
    pub format: Option<MediaFormat>,
    /// Message from the underlying codec, if any.
    pub detail: Option<String>,
}

impl fmt::Display for TranscoderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(track) = self.track {
            write!(f, " [track {track}]")?;
        }
        if let Some(phase) = self.phase {
            write!(f, " [phase {phase}]")?;
        }
        if let Some(format) = &self.format {
            write!(f, " [format {format}]")?;
        }
        if let Some(detail) = &self.detail {
            write!(f, ": {detail}")?;
        }
        Ok(())
    }
}

/// The unified error type for all `mediaflow` operations.
///
/// Every public method that can fail returns `Result<T, TransformError>`.
/// Listener error callbacks receive the same type.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransformError {
    /// A track transcoder failed to configure, start, or process media.
    #[error("{kind}{context}")]
    TrackTranscoder {
        /// What went wrong.
        kind: TranscoderErrorKind,
        /// Where it went wrong.
        context: Box<TranscoderContext>,
    },

    /// A container, renderer or I/O failure raised while a track was being
    /// processed, tagged with the track and phase it interrupted.
    #[error("{source}{context}")]
    InTrack {
        /// Where it went wrong.
        context: Box<TranscoderContext>,
        /// What went wrong.
        source: Box<TransformError>,
    },

    /// The estimated output does not fit in the available disk space.
    #[error(
        "Insufficient disk space: estimated output needs {estimated} bytes, {available} bytes available"
    )]
    InsufficientDiskSpace {
        /// Estimated output size in bytes, padding included.
        estimated: u64,
        /// Bytes available on the output volume.
        available: u64,
    },

    /// The media source could not be opened or read.
    #[error("Media source error: {reason}")]
    MediaSource {
        /// Underlying reason.
        reason: String,
    },

    /// The media target could not be created or written.
    #[error("Media target error at {path:?}: {reason}")]
    MediaTarget {
        /// Output path of the target, when it has one.
        path: Option<PathBuf>,
        /// Underlying reason.
        reason: String,
    },

    /// A request with the same id is still in flight.
    #[error("Request with id {0} already exists")]
    DuplicateRequest(String),

    /// The transformer has been released and accepts no more work.
    #[error("Media transformer has been released")]
    Released,

    /// The operation was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,

    /// A surface renderer gave up waiting for a decoded frame.
    #[error("Timed out after {0:?} waiting for a decoded frame")]
    FrameWaitTimeout(std::time::Duration),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// An error originating from the FFmpeg libraries.
    #[cfg(feature = "ffmpeg")]
    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),
}

impl TransformError {
    /// Create a transcoder error without any context.
    pub fn transcoder(kind: TranscoderErrorKind) -> Self {
        TransformError::TrackTranscoder {
            kind,
            context: Box::default(),
        }
    }

    /// Create a transcoder error tagged with the phase it occurred in.
    pub fn in_phase(kind: TranscoderErrorKind, phase: Phase) -> Self {
        TransformError::TrackTranscoder {
            kind,
            context: Box::new(TranscoderContext {
                phase: Some(phase),
                ..TranscoderContext::default()
            }),
        }
    }

    /// Create a transcoder error that carries the offending media format.
    pub fn with_format(kind: TranscoderErrorKind, format: Option<&MediaFormat>) -> Self {
        TransformError::TrackTranscoder {
            kind,
            context: Box::new(TranscoderContext {
                format: format.cloned(),
                ..TranscoderContext::default()
            }),
        }
    }

    /// Attach a codec-provided message to a transcoder error.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        if let TransformError::TrackTranscoder { context, .. } = &mut self {
            context.detail = Some(detail.into());
        }
        self
    }

    /// Tag an error with the request-relative track index.
    ///
    /// Container, renderer and I/O errors are wrapped in
    /// [`TransformError::InTrack`] so the track survives. Errors that already
    /// carry a track are left untouched, as are lifecycle errors such as
    /// [`TransformError::Cancelled`].
    #[must_use]
    pub fn for_track(self, track: usize) -> Self {
        let mut error = self.located();
        if let Some(context) = error.context_mut() {
            context.track.get_or_insert(track);
        }
        error
    }

    /// Tag an error with a phase, unless it already has one.
    #[must_use]
    pub fn during(self, phase: Phase) -> Self {
        let mut error = self.located();
        if let Some(context) = error.context_mut() {
            context.phase.get_or_insert(phase);
        }
        error
    }

    /// Wrap errors raised by the media a track works on, so they can carry
    /// track context.
    fn located(self) -> Self {
        let track_local = match &self {
            TransformError::MediaSource { .. }
            | TransformError::MediaTarget { .. }
            | TransformError::FrameWaitTimeout(_)
            | TransformError::Io(_) => true,
            #[cfg(feature = "ffmpeg")]
            TransformError::Ffmpeg(_) => true,
            _ => false,
        };
        if track_local {
            TransformError::InTrack {
                context: Box::default(),
                source: Box::new(self),
            }
        } else {
            self
        }
    }

    fn context(&self) -> Option<&TranscoderContext> {
        match self {
            TransformError::TrackTranscoder { context, .. } | TransformError::InTrack { context, .. } => Some(context),
            _ => None,
        }
    }

    fn context_mut(&mut self) -> Option<&mut TranscoderContext> {
        match self {
            TransformError::TrackTranscoder { context, .. } | TransformError::InTrack { context, .. } => Some(context),
            _ => None,
        }
    }

    /// The error without its track context: the wrapped error of an
    /// [`TransformError::InTrack`], or `self` otherwise.
    pub fn underlying(&self) -> &TransformError {
        match self {
            TransformError::InTrack { source, .. } => source,
            other => other,
        }
    }

    /// The transcoder failure kind, if this is a transcoder error.
    pub fn transcoder_kind(&self) -> Option<TranscoderErrorKind> {
        match self {
            TransformError::TrackTranscoder { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// The track index the error was tagged with, if any.
    pub fn track(&self) -> Option<usize> {
        self.context().and_then(|context| context.track)
    }

    /// The pipeline phase the error was tagged with, if any.
    pub fn phase(&self) -> Option<Phase> {
        self.context().and_then(|context| context.phase)
    }

    /// Returns `true` for errors raised before the frame loop starts because
    /// the request itself is malformed.
    pub fn is_configuration(&self) -> bool {
        match self {
            TransformError::TrackTranscoder { kind, .. } => kind.is_configuration(),
            TransformError::InTrack { source, .. } => source.is_configuration(),
            TransformError::DuplicateRequest(_) => true,
            _ => false,
        }
    }

    /// Returns `true` for failures reported by codecs while processing.
    pub fn is_codec(&self) -> bool {
        match self {
            TransformError::TrackTranscoder { kind, .. } => !kind.is_configuration(),
            TransformError::InTrack { source, .. } => source.is_codec(),
            TransformError::FrameWaitTimeout(_) => true,
            _ => false,
        }
    }
}

impl Clone for TransformError {
    /// I/O errors are re-created from their kind and message, since
    /// [`std::io::Error`] cannot be cloned.
    fn clone(&self) -> Self {
        match self {
            TransformError::TrackTranscoder { kind, context } => TransformError::TrackTranscoder {
                kind: *kind,
                context: context.clone(),
            },
            TransformError::InTrack { context, source } => TransformError::InTrack {
                context: context.clone(),
                source: source.clone(),
            },
            TransformError::InsufficientDiskSpace { estimated, available } => {
                TransformError::InsufficientDiskSpace {
                    estimated: *estimated,
                    available: *available,
                }
            }
            TransformError::MediaSource { reason } => TransformError::MediaSource {
                reason: reason.clone(),
            },
            TransformError::MediaTarget { path, reason } => TransformError::MediaTarget {
                path: path.clone(),
                reason: reason.clone(),
            },
            TransformError::DuplicateRequest(id) => TransformError::DuplicateRequest(id.clone()),
            TransformError::Released => TransformError::Released,
            TransformError::Cancelled => TransformError::Cancelled,
            TransformError::FrameWaitTimeout(timeout) => TransformError::FrameWaitTimeout(*timeout),
            TransformError::Io(error) => TransformError::Io(IoError::new(error.kind(), error.to_string())),
            #[cfg(feature = "ffmpeg")]
            TransformError::Ffmpeg(message) => TransformError::Ffmpeg(message.clone()),
        }
    }
}

#[cfg(feature = "ffmpeg")]
impl From<FfmpegError> for TransformError {
    fn from(error: FfmpegError) -> Self {
        TransformError::Ffmpeg(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcoder_error_message_includes_context() {
        let error = TransformError::in_phase(TranscoderErrorKind::NoFrameAvailable, Phase::Decode)
            .for_track(2)
            .with_detail("tag 7");
        let message = error.to_string();
        assert!(message.starts_with("No frame available for specified tag"));
        assert!(message.contains("[track 2]"));
        assert!(message.contains("[phase decode]"));
        assert!(message.ends_with(": tag 7"));
    }

    #[test]
    fn for_track_keeps_first_track() {
        let error = TransformError::transcoder(TranscoderErrorKind::InternalCodecError)
            .for_track(0)
            .for_track(3);
        assert_eq!(error.track(), Some(0));
    }

    #[test]
    fn classification() {
        assert!(TransformError::transcoder(TranscoderErrorKind::DecoderNotProvided).is_configuration());
        assert!(TransformError::transcoder(TranscoderErrorKind::NoTracksFound).is_configuration());
        assert!(TransformError::transcoder(TranscoderErrorKind::CodecInReleasedState).is_codec());
        assert!(!TransformError::Cancelled.is_codec());
        assert!(
            !TransformError::InsufficientDiskSpace {
                estimated: 1,
                available: 0
            }
            .is_configuration()
        );
    }

    #[test]
    fn clone_keeps_context_and_io_kind() {
        let error = TransformError::in_phase(TranscoderErrorKind::EncoderConfigurationError, Phase::Setup).for_track(1);
        let copy = error.clone();
        assert_eq!(copy.track(), Some(1));
        assert_eq!(copy.phase(), Some(Phase::Setup));

        let io = TransformError::Io(IoError::new(std::io::ErrorKind::NotFound, "missing"));
        match io.clone() {
            TransformError::Io(error) => {
                assert_eq!(error.kind(), std::io::ErrorKind::NotFound);
                assert_eq!(error.to_string(), "missing");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn container_errors_gain_track_and_phase() {
        let error = TransformError::MediaTarget {
            path: None,
            reason: "disk full".to_string(),
        }
        .during(Phase::Encode)
        .for_track(1)
        .for_track(4);

        assert_eq!(error.track(), Some(1));
        assert_eq!(error.phase(), Some(Phase::Encode));
        assert!(matches!(error.underlying(), TransformError::MediaTarget { .. }));
        assert_eq!(
            error.to_string(),
            "Media target error at None: disk full [track 1] [phase encode]"
        );
        assert!(std::error::Error::source(&error).is_some());
        assert_eq!(error.clone().track(), Some(1));
    }

    #[test]
    fn lifecycle_errors_stay_unwrapped() {
        let error = TransformError::Cancelled.for_track(0).during(Phase::Decode);
        assert!(matches!(error, TransformError::Cancelled));
        assert_eq!(error.track(), None);

        let timeout = TransformError::FrameWaitTimeout(std::time::Duration::from_secs(1)).for_track(0);
        assert!(timeout.is_codec());
        assert_eq!(timeout.track(), Some(0));
    }
}
