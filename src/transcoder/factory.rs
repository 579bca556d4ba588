use crate::error::{Phase, TransformError, TranscoderErrorKind};
use crate::format::MediaCategory;
use crate::render::{PassthroughSoftwareRenderer, Renderer};
use crate::track_transform::TrackTransform;
use crate::transcoder::{AudioTrackTranscoder, PassthroughTranscoder, TrackTranscoder, VideoTrackTranscoder};

/// Builds the transcoder for one track.
pub trait TranscoderFactory: Send + Sync {
    /// Consume `transform` and build its transcoder.
    fn create(&self, transform: TrackTransform) -> Result<Box<dyn TrackTranscoder>, TransformError>;
}

/// Picks a strategy from the target format of a [`TrackTransform`].
///
/// - No target format: [`PassthroughTranscoder`].
/// - `video/*`: [`VideoTrackTranscoder`]; decoder, encoder and renderer are required.
/// - `audio/*`: [`AudioTrackTranscoder`]; decoder and encoder are required, the
///   renderer defaults to [`PassthroughSoftwareRenderer`].
/// - Anything else: [`PassthroughTranscoder`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackTranscoderFactory;

impl TranscoderFactory for TrackTranscoderFactory {
    fn create(&self, transform: TrackTransform) -> Result<Box<dyn TrackTranscoder>, TransformError> {
        let TrackTransform {
            source,
            source_track,
            target,
            target_track,
            decoder,
            renderer,
            encoder,
            target_format,
        } = transform;

        let Some(target_format) = target_format else {
            return Ok(Box::new(PassthroughTranscoder::new(
                source,
                source_track,
                target,
                target_track,
            )?));
        };

        let configuration_error = |kind| {
            TransformError::with_format(kind, Some(&target_format)).during(Phase::Setup)
        };

        let Some(mime) = target_format.mime() else {
            return Err(configuration_error(TranscoderErrorKind::SourceTrackMimeTypeNotFound));
        };
        let category = MediaCategory::of(mime);

        let (decoder, encoder) = match category {
            MediaCategory::Video | MediaCategory::Audio => {
                let Some(decoder) = decoder else {
                    return Err(configuration_error(TranscoderErrorKind::DecoderNotProvided));
                };
                let Some(encoder) = encoder else {
                    return Err(configuration_error(TranscoderErrorKind::EncoderNotProvided));
                };
                (decoder, encoder)
            }
            MediaCategory::Other => {
                log::info!("Unsupported track mime type: {mime}, will use passthrough transcoder");
                return Ok(Box::new(PassthroughTranscoder::new(
                    source,
                    source_track,
                    target,
                    target_track,
                )?));
            }
        };

        if category == MediaCategory::Video {
            let Some(renderer) = renderer else {
                return Err(configuration_error(TranscoderErrorKind::RendererNotProvided));
            };
            Ok(Box::new(VideoTrackTranscoder::new(
                source,
                source_track,
                target,
                target_track,
                target_format,
                decoder,
                renderer,
                encoder,
            )?))
        } else {
            let renderer: Box<dyn Renderer> =
                renderer.unwrap_or_else(|| Box::new(PassthroughSoftwareRenderer::new()));
            Ok(Box::new(AudioTrackTranscoder::new(
                source,
                source_track,
                target,
                target_track,
                target_format,
                decoder,
                renderer,
                encoder,
            )?))
        }
    }
}
