//! # mediaflow
//!
//! Track-level media transformation: read compressed samples from the tracks
//! of a source container, decode them, run them through a render stage,
//! re-encode them and multiplex the result into a target container, with
//! progress reporting and cancellation.
//!
//! The crate is the pipeline, not the codecs. Decoders, encoders, renderers
//! and containers are traits ([`Decoder`], [`Encoder`], [`Renderer`],
//! [`MediaSource`](io::MediaSource), [`MediaTarget`](io::MediaTarget))
//! supplied by the embedding application. Passthrough codecs, a software
//! buffer renderer and in-memory containers ship with the crate; FFmpeg
//! demuxing and stream-copy muxing are available behind the `ffmpeg` feature.
//!
//! ## Quick Start
//!
//! ### Trim a Track Without Re-encoding
//!
//! ```
//! use std::sync::{Arc, mpsc};
//!
//! use mediaflow::io::{self, MediaRange, MemoryMediaSource, MemoryMediaTarget};
//! use mediaflow::{
//!     BufferFlags, MediaFormat, MediaTransformer, TrackTransform, TrackTransformationInfo,
//!     TransformError, TransformationListener, TransformationOptions, mime,
//! };
//!
//! struct Wait(mpsc::Sender<Result<(), String>>);
//!
//! impl TransformationListener for Wait {
//!     fn on_completed(&self, _id: &str, _stats: &[TrackTransformationInfo]) {
//!         let _ = self.0.send(Ok(()));
//!     }
//!     fn on_cancelled(&self, _id: &str, _stats: &[TrackTransformationInfo]) {
//!         let _ = self.0.send(Err("cancelled".into()));
//!     }
//!     fn on_error(&self, _id: &str, error: &TransformError, _stats: &[TrackTransformationInfo]) {
//!         let _ = self.0.send(Err(error.to_string()));
//!     }
//! }
//!
//! let mut source = MemoryMediaSource::new(vec![MediaFormat::new(mime::AUDIO_AAC)])
//!     .with_selection(MediaRange::new(1_000, 3_000));
//! for i in 0..5 {
//!     source.push_sample(0, vec![i as u8], i * 1_000, BufferFlags::KEY_FRAME);
//! }
//! let source = io::share_source(source);
//! let target = Arc::new(std::sync::Mutex::new(MemoryMediaTarget::new(1)));
//!
//! let transformer = MediaTransformer::new()?;
//! let (sender, receiver) = mpsc::channel();
//! transformer.transform_with_options(
//!     "trim",
//!     vec![TrackTransform::builder(source, 0, target.clone()).build()],
//!     Arc::new(Wait(sender)),
//!     TransformationOptions::new().with_disk_space_check(false),
//! )?;
//! receiver.recv().unwrap().unwrap();
//!
//! let target = target.lock().unwrap();
//! let times: Vec<i64> = target.samples(0).iter().map(|s| s.info.presentation_time_us).collect();
//! assert_eq!(times, [0, 1_000]);
//! # Ok::<(), TransformError>(())
//! ```
//!
//! ## Features
//!
//! - **Round-robin job driver**: every track advances one step per cycle,
//!   so no track is starved and a stalled codec never blocks the loop
//! - **Three track strategies**: video (surface rendering, frame-rate
//!   down-conversion), audio (buffer rendering) and passthrough (sample copy)
//! - **Trimming**: a `[start, end)` selection on the source, with timestamps
//!   rebased to the selection start
//! - **Progress & cancellation**: throttled, monotonic progress callbacks
//!   and cooperative cancellation by request id
//! - **Cleanup**: partial output is deleted on failure or cancellation
//! - **Disk space preflight**: estimated output size is checked against
//!   free space before any work starts
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `ffmpeg` | FFmpeg-backed source and stream-copy target, and the `mediaflow-cli` binary |
//! | `async` | `transform_async` with a progress `Stream` and an outcome `Future` via Tokio |
//! | `full` | Enables all of the above |

pub mod codec;
pub mod configuration;
pub mod disk;
pub mod error;
pub mod estimate;
pub mod format;
pub mod frame;
pub mod io;
mod job;
pub mod listener;
pub mod progress;
pub mod render;
pub mod stats;
#[cfg(feature = "async")]
pub mod stream;
pub mod track_transform;
pub mod transcoder;
pub mod transformer;

pub use codec::{Decoder, DequeueStatus, Encoder, PassthroughBufferEncoder, PassthroughDecoder};
pub use configuration::{
    CallbackContext, CallbackExecutor, DEFAULT_AUDIO_BITRATE, DEFAULT_KEY_FRAME_INTERVAL,
    DEFAULT_SIZE_PADDING, GRANULARITY_DEFAULT, GRANULARITY_NONE, TransformationOptions,
    TransformerOptions,
};
pub use disk::{DiskSpaceProbe, FixedDiskSpace, SystemDiskSpace};
pub use error::{Phase, TranscoderContext, TranscoderErrorKind, TransformError};
pub use format::{MediaCategory, MediaFormat, mime};
pub use frame::{BufferFlags, BufferInfo, Frame, Surface};
pub use listener::TransformationListener;
pub use progress::{CancellationToken, ProgressThrottle};
pub use render::{
    DEFAULT_FRAME_WAIT_TIMEOUT, DefaultFrameDropper, FrameDropper, FrameSync,
    PassthroughSoftwareRenderer, RenderMode, RenderStatus, Renderer,
};
pub use stats::{TrackTransformationInfo, TransformationStatsCollector};
#[cfg(feature = "async")]
pub use stream::{ProgressStream, TransformFuture, TransformHandle};
pub use track_transform::{TrackTransform, TrackTransformBuilder};
pub use transcoder::{
    AudioTrackTranscoder, PassthroughTranscoder, TrackTranscoder, TrackTranscoderFactory,
    TranscodeResult, TranscoderFactory, VideoTrackTranscoder,
};
pub use transformer::{CodecProvider, MediaTransformer};
