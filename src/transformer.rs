//! The public entry point.
//!
//! A [`MediaTransformer`] owns one worker thread that runs submitted
//! requests one at a time, in submission order. Requests are identified by
//! a caller-chosen id, which is also how they are cancelled.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::mpsc;
//!
//! use mediaflow::io::{self, MemoryMediaSource, MemoryMediaTarget};
//! use mediaflow::{
//!     BufferFlags, MediaFormat, MediaTransformer, TrackTransform, TrackTransformationInfo,
//!     TransformError, TransformationListener, mime,
//! };
//!
//! struct Done(mpsc::Sender<bool>);
//!
//! impl TransformationListener for Done {
//!     fn on_completed(&self, _id: &str, _stats: &[TrackTransformationInfo]) {
//!         let _ = self.0.send(true);
//!     }
//!     fn on_cancelled(&self, _id: &str, _stats: &[TrackTransformationInfo]) {
//!         let _ = self.0.send(false);
//!     }
//!     fn on_error(&self, _id: &str, _error: &TransformError, _stats: &[TrackTransformationInfo]) {
//!         let _ = self.0.send(false);
//!     }
//! }
//!
//! let mut source = MemoryMediaSource::new(vec![MediaFormat::new(mime::AUDIO_AAC)]);
//! source.push_sample(0, vec![1, 2, 3], 0, BufferFlags::KEY_FRAME);
//! let source = io::share_source(source);
//! let target = io::share_target(MemoryMediaTarget::new(1));
//!
//! let transformer = MediaTransformer::new()?;
//! let (sender, receiver) = mpsc::channel();
//! transformer.transform(
//!     "copy",
//!     vec![TrackTransform::builder(source, 0, target).build()],
//!     Arc::new(Done(sender)),
//!     mediaflow::GRANULARITY_DEFAULT,
//! )?;
//! assert!(receiver.recv().unwrap());
//! # Ok::<(), TransformError>(())
//! ```

use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::codec::{Decoder, Encoder};
use crate::configuration::{
    DEFAULT_AUDIO_BITRATE, DEFAULT_KEY_FRAME_INTERVAL, TransformationOptions, TransformerOptions,
};
use crate::error::TransformError;
use crate::estimate::{self, COMMON_AUDIO_BITRATE};
use crate::format::{MediaCategory, MediaFormat};
use crate::io::{self, SharedMediaSource, SharedMediaTarget};
use crate::job::TransformationJob;
use crate::listener::{CallbackDispatcher, JobNotifier, TransformationListener};
use crate::progress::CancellationToken;
use crate::render::Renderer;
use crate::track_transform::TrackTransform;
use crate::transcoder::TranscoderFactory;

/// Supplies codecs and renderers for [`MediaTransformer::transform_media`].
pub trait CodecProvider {
    /// A decoder for a source track in `format`.
    fn decoder(&self, format: &MediaFormat) -> Option<Box<dyn Decoder>>;

    /// An encoder producing `format`.
    fn encoder(&self, format: &MediaFormat) -> Option<Box<dyn Encoder>>;

    /// A renderer for a track converted to `format`. Audio tracks fall back
    /// to software rendering when this returns `None`.
    fn renderer(&self, _format: &MediaFormat) -> Option<Box<dyn Renderer>> {
        None
    }
}

/// In-flight requests by id.
#[derive(Clone, Default)]
struct JobRegistry {
    jobs: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl JobRegistry {
    fn register(&self, id: &str) -> Result<CancellationToken, TransformError> {
        let mut jobs = io::lock(&self.jobs);
        if jobs.contains_key(id) {
            return Err(TransformError::DuplicateRequest(id.to_string()));
        }
        let token = CancellationToken::new();
        jobs.insert(id.to_string(), token.clone());
        Ok(token)
    }

    fn remove(&self, id: &str) {
        io::lock(&self.jobs).remove(id);
    }

    fn cancel(&self, id: &str) -> bool {
        match io::lock(&self.jobs).get(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn cancel_all(&self) {
        for token in io::lock(&self.jobs).values() {
            token.cancel();
        }
    }

    fn contains(&self, id: &str) -> bool {
        io::lock(&self.jobs).contains_key(id)
    }
}

/// Runs transformation requests on a background worker thread.
///
/// Dropping the transformer [releases](MediaTransformer::release) it.
pub struct MediaTransformer {
    sender: Mutex<Option<Sender<TransformationJob>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    registry: JobRegistry,
    dispatcher: Arc<CallbackDispatcher>,
    factory: Arc<dyn TranscoderFactory>,
    released: AtomicBool,
}

impl Debug for MediaTransformer {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("MediaTransformer")
            .field("jobs", &io::lock(&self.registry.jobs).len())
            .field("released", &self.released.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl MediaTransformer {
    /// Create a transformer with default options.
    pub fn new() -> Result<Self, TransformError> {
        Self::with_options(TransformerOptions::default())
    }

    /// Create a transformer.
    ///
    /// Fails only if its threads cannot be spawned.
    pub fn with_options(options: TransformerOptions) -> Result<Self, TransformError> {
        let dispatcher = Arc::new(CallbackDispatcher::new(
            &options.callback_context,
            &options.worker_thread_name,
        )?);

        let (sender, receiver) = mpsc::channel::<TransformationJob>();
        let worker = thread::Builder::new()
            .name(options.worker_thread_name.clone())
            .spawn(move || {
                for job in receiver {
                    job.run();
                }
                log::debug!("Transformer worker exiting");
            })?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            registry: JobRegistry::default(),
            dispatcher,
            factory: options.transcoder_factory,
            released: AtomicBool::new(false),
        })
    }

    /// Submit a request with default options and the given progress
    /// granularity.
    ///
    /// Fails immediately with [`TransformError::DuplicateRequest`] if a
    /// request with the same id has not delivered its terminal callback yet.
    pub fn transform(
        &self,
        id: &str,
        transforms: Vec<TrackTransform>,
        listener: Arc<dyn TransformationListener>,
        granularity: u32,
    ) -> Result<(), TransformError> {
        let options = TransformationOptions::default().with_granularity(granularity);
        self.transform_with_options(id, transforms, listener, options)
    }

    /// Submit a request.
    ///
    /// Tracks that copy their format but carry a renderer with filters are
    /// converted to a target format derived from the source, so the filters
    /// can run.
    pub fn transform_with_options(
        &self,
        id: &str,
        mut transforms: Vec<TrackTransform>,
        listener: Arc<dyn TransformationListener>,
        options: TransformationOptions,
    ) -> Result<(), TransformError> {
        if self.released.load(Ordering::Acquire) {
            return Err(TransformError::Released);
        }
        if self.registry.contains(id) {
            return Err(TransformError::DuplicateRequest(id.to_string()));
        }

        for transform in &mut transforms {
            upgrade_filtered_passthrough(transform)?;
        }

        let token = self.registry.register(id)?;
        let notifier = JobNotifier::new(id, listener, self.dispatcher.clone());
        let registry = self.registry.clone();
        let finished_id = id.to_string();
        let job = TransformationJob::new(transforms, options, self.factory.clone(), token, notifier)
            .with_on_finish(Box::new(move || registry.remove(&finished_id)));

        let sent = io::lock(&self.sender)
            .as_ref()
            .is_some_and(|sender| sender.send(job).is_ok());
        if !sent {
            self.registry.remove(id);
            return Err(TransformError::Released);
        }
        log::debug!("Queued transformation {id}");
        Ok(())
    }

    /// Convert every track of `source` into `target`: video tracks to
    /// `target_video`, audio tracks to `target_audio`. Tracks whose target
    /// format is `None`, and tracks of other kinds, are copied. Tracks
    /// without a mime type are left out. Target track indices are assigned
    /// in source order over the tracks kept.
    #[allow(clippy::too_many_arguments)]
    pub fn transform_media(
        &self,
        id: &str,
        source: SharedMediaSource,
        target: SharedMediaTarget,
        target_video: Option<MediaFormat>,
        target_audio: Option<MediaFormat>,
        codecs: &dyn CodecProvider,
        listener: Arc<dyn TransformationListener>,
        options: TransformationOptions,
    ) -> Result<(), TransformError> {
        let formats = {
            let source = io::lock(&source);
            (0..source.track_count())
                .map(|track| source.track_format(track))
                .collect::<Result<Vec<_>, _>>()?
        };

        let mut transforms = Vec::new();
        for (track, format) in formats.iter().enumerate() {
            let Some(mime) = format.mime() else {
                log::warn!("Track {track} has no mime type, leaving it out");
                continue;
            };
            let target_format = match MediaCategory::of(mime) {
                MediaCategory::Video => target_video.as_ref(),
                MediaCategory::Audio => target_audio.as_ref(),
                MediaCategory::Other => None,
            };

            let mut builder = TrackTransform::builder(source.clone(), track, target.clone())
                .with_target_track(transforms.len());
            if let Some(target_format) = target_format {
                if let Some(decoder) = codecs.decoder(format) {
                    builder = builder.with_decoder(decoder);
                }
                if let Some(encoder) = codecs.encoder(target_format) {
                    builder = builder.with_encoder(encoder);
                }
                if let Some(renderer) = codecs.renderer(target_format) {
                    builder = builder.with_renderer(renderer);
                }
                builder = builder.with_target_format(target_format.clone());
            }
            transforms.push(builder.build());
        }

        self.transform_with_options(id, transforms, listener, options)
    }

    /// Request cancellation of `id`. Does nothing if no such request is in
    /// flight.
    pub fn cancel(&self, id: &str) {
        if self.registry.cancel(id) {
            log::debug!("Cancelling transformation {id}");
        }
    }

    /// Estimate the combined output size of `transforms`, in bytes.
    pub fn estimated_target_size(transforms: &[TrackTransform]) -> Result<u64, TransformError> {
        estimate::estimated_target_size(transforms, COMMON_AUDIO_BITRATE)
    }

    /// Cancel every request, stop delivering callbacks and shut the worker
    /// down. Further submissions fail with [`TransformError::Released`].
    ///
    /// Waits for the running request to wind down unless called from the
    /// worker thread itself.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        log::debug!("Releasing media transformer");
        self.registry.cancel_all();
        self.dispatcher.release();
        io::lock(&self.sender).take();

        let worker = io::lock(&self.worker).take();
        if let Some(worker) = worker {
            if worker.thread().id() != thread::current().id() && worker.join().is_err() {
                log::error!("Transformer worker panicked");
            }
        }
    }
}

impl Drop for MediaTransformer {
    fn drop(&mut self) {
        self.release();
    }
}

/// Give a copied track with filters a target format so it is decoded,
/// rendered and re-encoded.
fn upgrade_filtered_passthrough(transform: &mut TrackTransform) -> Result<(), TransformError> {
    let has_filters = transform.renderer().is_some_and(|renderer| renderer.has_filters());
    if transform.target_format.is_some() || !has_filters {
        return Ok(());
    }

    let source = io::lock(&transform.source);
    let source_format = source.track_format(transform.source_track)?;
    let mut format = MediaFormat {
        mime: source_format.mime.clone(),
        duration_us: source_format.duration_us,
        ..MediaFormat::default()
    };

    match source_format.category() {
        MediaCategory::Video => {
            format.width = source_format.width;
            format.height = source_format.height;
            format.frame_rate = source_format.frame_rate;
            format.key_frame_interval = Some(source_format.key_frame_interval.unwrap_or(DEFAULT_KEY_FRAME_INTERVAL));
            format.bit_rate = Some(estimate::estimate_video_track_bitrate(&*source, transform.source_track)?);
        }
        MediaCategory::Audio => {
            format.sample_rate = source_format.sample_rate;
            format.channel_count = source_format.channel_count;
            format.bit_rate = Some(source_format.bit_rate.unwrap_or(DEFAULT_AUDIO_BITRATE));
        }
        MediaCategory::Other => return Ok(()),
    }
    drop(source);

    log::debug!(
        "Track {} has filters, converting to {format}",
        transform.source_track
    );
    transform.target_format = Some(format);
    Ok(())
}
