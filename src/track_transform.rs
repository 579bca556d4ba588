//! Per-track transformation requests.
//!
//! A [`TrackTransform`] says where one track comes from, where it goes, and
//! how it is converted on the way. Omitting the target format copies the
//! track as-is.
//!
//! # Example
//!
//! ```
//! use mediaflow::io::{self, MemoryMediaSource, MemoryMediaTarget};
//! use mediaflow::{MediaFormat, TrackTransform, mime};
//!
//! let source = io::share_source(MemoryMediaSource::new(vec![
//!     MediaFormat::video(mime::VIDEO_AVC, 1920, 1080),
//! ]));
//! let target = io::share_target(MemoryMediaTarget::new(1));
//!
//! // Copy track 0 unchanged.
//! let transform = TrackTransform::builder(source, 0, target).build();
//! assert!(transform.target_format().is_none());
//! assert_eq!(transform.target_track(), 0);
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};

use crate::codec::{Decoder, Encoder};
use crate::format::MediaFormat;
use crate::io::{SharedMediaSource, SharedMediaTarget};
use crate::render::Renderer;

/// Description of how one source track becomes one target track.
///
/// Built once with [`TrackTransform::builder`] and consumed by the job that
/// runs it. The codecs and renderer are owned by the transform; the source
/// and target are shared handles, typically common to all tracks of a
/// request.
pub struct TrackTransform {
    pub(crate) source: SharedMediaSource,
    pub(crate) source_track: usize,
    pub(crate) target: SharedMediaTarget,
    pub(crate) target_track: usize,
    pub(crate) decoder: Option<Box<dyn Decoder>>,
    pub(crate) renderer: Option<Box<dyn Renderer>>,
    pub(crate) encoder: Option<Box<dyn Encoder>>,
    pub(crate) target_format: Option<MediaFormat>,
}

impl TrackTransform {
    /// Start building a transform of `source_track` of `source` into
    /// `target`. The target track index defaults to `source_track`.
    pub fn builder(
        source: SharedMediaSource,
        source_track: usize,
        target: SharedMediaTarget,
    ) -> TrackTransformBuilder {
        TrackTransformBuilder {
            transform: TrackTransform {
                source,
                source_track,
                target,
                target_track: source_track,
                decoder: None,
                renderer: None,
                encoder: None,
                target_format: None,
            },
        }
    }

    /// The source container.
    pub fn source(&self) -> &SharedMediaSource {
        &self.source
    }

    /// Index of the track in the source.
    pub fn source_track(&self) -> usize {
        self.source_track
    }

    /// The target container.
    pub fn target(&self) -> &SharedMediaTarget {
        &self.target
    }

    /// Requested index of the track in the target.
    pub fn target_track(&self) -> usize {
        self.target_track
    }

    /// The requested target format; `None` copies the track as-is.
    pub fn target_format(&self) -> Option<&MediaFormat> {
        self.target_format.as_ref()
    }

    /// The renderer, if one was supplied.
    pub fn renderer(&self) -> Option<&dyn Renderer> {
        self.renderer.as_deref()
    }

    /// Whether a decoder was supplied.
    pub fn has_decoder(&self) -> bool {
        self.decoder.is_some()
    }

    /// Whether an encoder was supplied.
    pub fn has_encoder(&self) -> bool {
        self.encoder.is_some()
    }
}

impl Debug for TrackTransform {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("TrackTransform")
            .field("source_track", &self.source_track)
            .field("target_track", &self.target_track)
            .field("decoder", &self.decoder.as_ref().map(|d| d.name()))
            .field("encoder", &self.encoder.as_ref().map(|e| e.name()))
            .field("renderer", &self.renderer.is_some())
            .field("target_format", &self.target_format)
            .finish()
    }
}

/// Builder for [`TrackTransform`].
pub struct TrackTransformBuilder {
    transform: TrackTransform,
}

impl TrackTransformBuilder {
    /// Write to `target_track` instead of the source track index.
    #[must_use]
    pub fn with_target_track(mut self, target_track: usize) -> Self {
        self.transform.target_track = target_track;
        self
    }

    /// Decode with `decoder`.
    #[must_use]
    pub fn with_decoder(mut self, decoder: Box<dyn Decoder>) -> Self {
        self.transform.decoder = Some(decoder);
        self
    }

    /// Render decoded frames with `renderer`.
    #[must_use]
    pub fn with_renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.transform.renderer = Some(renderer);
        self
    }

    /// Encode with `encoder`.
    #[must_use]
    pub fn with_encoder(mut self, encoder: Box<dyn Encoder>) -> Self {
        self.transform.encoder = Some(encoder);
        self
    }

    /// Convert the track to `format`.
    #[must_use]
    pub fn with_target_format(mut self, format: MediaFormat) -> Self {
        self.transform.target_format = Some(format);
        self
    }

    /// Finish building.
    pub fn build(self) -> TrackTransform {
        self.transform
    }
}
