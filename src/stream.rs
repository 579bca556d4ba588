//! Async adapters over a transformation request.
//!
//! [`MediaTransformer::transform_async`] submits a request like
//! [`transform_with_options`](MediaTransformer::transform_with_options) but
//! reports through Tokio channels instead of a listener: progress arrives on
//! a [`ProgressStream`] and the outcome resolves a [`TransformFuture`]. The
//! request still runs on the transformer's worker thread, so no runtime
//! thread is blocked by media work.
//!
//! # Example
//!
//! ```no_run
//! use tokio_stream::StreamExt;
//!
//! use mediaflow::io::{self, MemoryMediaSource, MemoryMediaTarget};
//! use mediaflow::{MediaFormat, MediaTransformer, TrackTransform, TransformError, TransformationOptions, mime};
//!
//! # async fn example() -> Result<(), TransformError> {
//! let source = io::share_source(MemoryMediaSource::new(vec![MediaFormat::new(mime::AUDIO_AAC)]));
//! let target = io::share_target(MemoryMediaTarget::new(1));
//! let transformer = MediaTransformer::new()?;
//!
//! let handle = transformer.transform_async(
//!     "copy",
//!     vec![TrackTransform::builder(source, 0, target).build()],
//!     TransformationOptions::new(),
//! )?;
//! let (mut progress, outcome) = handle.into_parts();
//! while let Some(value) = progress.next().await {
//!     println!("{:.0}%", value * 100.0);
//! }
//! let stats = outcome.await?;
//! println!("{} tracks", stats.len());
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio_stream::Stream;

use crate::configuration::TransformationOptions;
use crate::error::TransformError;
use crate::io;
use crate::listener::TransformationListener;
use crate::stats::TrackTransformationInfo;
use crate::track_transform::TrackTransform;
use crate::transformer::MediaTransformer;

type Outcome = Result<Vec<TrackTransformationInfo>, TransformError>;

/// Progress values of one request, ending when the request does.
///
/// Implements [`tokio_stream::Stream`], so it can be used with
/// [`StreamExt`](tokio_stream::StreamExt) combinators.
pub struct ProgressStream {
    receiver: UnboundedReceiver<f32>,
}

impl Stream for ProgressStream {
    type Item = f32;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Resolves to the per-track statistics of a completed request.
///
/// A cancelled request resolves to [`TransformError::Cancelled`]; a request
/// dropped by [`MediaTransformer::release`] resolves to
/// [`TransformError::Released`].
pub struct TransformFuture {
    receiver: oneshot::Receiver<Outcome>,
}

impl Future for TransformFuture {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.unwrap_or_else(|_| Err(TransformError::Released)))
    }
}

/// Both halves of an async request.
pub struct TransformHandle {
    /// Progress updates.
    pub progress: ProgressStream,
    /// Terminal outcome.
    pub outcome: TransformFuture,
}

impl TransformHandle {
    /// Split into the progress stream and the outcome future.
    pub fn into_parts(self) -> (ProgressStream, TransformFuture) {
        (self.progress, self.outcome)
    }
}

/// Forwards listener callbacks into the channels behind a [`TransformHandle`].
struct ChannelListener {
    progress: Mutex<Option<UnboundedSender<f32>>>,
    outcome: Mutex<Option<oneshot::Sender<Outcome>>>,
}

impl ChannelListener {
    fn finish(&self, outcome: Outcome) {
        io::lock(&self.progress).take();
        if let Some(sender) = io::lock(&self.outcome).take() {
            // The caller may have dropped the future.
            let _ = sender.send(outcome);
        }
    }
}

impl TransformationListener for ChannelListener {
    fn on_progress(&self, _id: &str, progress: f32) {
        if let Some(sender) = io::lock(&self.progress).as_ref() {
            let _ = sender.send(progress);
        }
    }

    fn on_completed(&self, _id: &str, stats: &[TrackTransformationInfo]) {
        self.finish(Ok(stats.to_vec()));
    }

    fn on_cancelled(&self, _id: &str, _stats: &[TrackTransformationInfo]) {
        self.finish(Err(TransformError::Cancelled));
    }

    fn on_error(&self, _id: &str, error: &TransformError, _stats: &[TrackTransformationInfo]) {
        self.finish(Err(error.clone()));
    }
}

impl MediaTransformer {
    /// Submit a request and observe it through Tokio channels.
    ///
    /// Does not need to be called from within a runtime.
    pub fn transform_async(
        &self,
        id: &str,
        transforms: Vec<TrackTransform>,
        options: TransformationOptions,
    ) -> Result<TransformHandle, TransformError> {
        let (progress_sender, progress_receiver) = tokio::sync::mpsc::unbounded_channel();
        let (outcome_sender, outcome_receiver) = oneshot::channel();
        let listener = Arc::new(ChannelListener {
            progress: Mutex::new(Some(progress_sender)),
            outcome: Mutex::new(Some(outcome_sender)),
        });

        self.transform_with_options(id, transforms, listener, options)?;

        Ok(TransformHandle {
            progress: ProgressStream {
                receiver: progress_receiver,
            },
            outcome: TransformFuture {
                receiver: outcome_receiver,
            },
        })
    }
}
