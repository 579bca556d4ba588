//! Transformation configuration.
//!
//! [`TransformationOptions`] tunes a single request (progress granularity,
//! disk space preflight) and [`TransformerOptions`] tunes a
//! [`MediaTransformer`](crate::MediaTransformer) (where listener callbacks
//! run, what its worker thread is called).
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use mediaflow::{CallbackContext, FixedDiskSpace, TransformationOptions, TransformerOptions};
//!
//! let options = TransformationOptions::new()
//!     .with_granularity(20)
//!     .with_size_padding(0.25)
//!     .with_disk_space_probe(Arc::new(FixedDiskSpace(Some(1 << 30))));
//! assert_eq!(options.granularity, 20);
//!
//! let transformer_options = TransformerOptions::new()
//!     .with_callback_context(CallbackContext::Worker)
//!     .with_worker_thread_name("transcoder");
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use crate::disk::{DiskSpaceProbe, SystemDiskSpace};
use crate::estimate::COMMON_AUDIO_BITRATE;
use crate::transcoder::{TrackTranscoderFactory, TranscoderFactory};

/// Report every progress change.
pub const GRANULARITY_NONE: u32 = 0;

/// Report at most a hundred times per request.
pub const GRANULARITY_DEFAULT: u32 = 100;

/// Key frame interval, in seconds, given to upgraded video tracks.
pub const DEFAULT_KEY_FRAME_INTERVAL: f32 = 5.0;

/// Bit rate given to upgraded audio tracks whose source does not declare one.
pub const DEFAULT_AUDIO_BITRATE: u32 = 256_000;

/// Fraction added to the size estimate before comparing it to free space.
pub const DEFAULT_SIZE_PADDING: f64 = 0.10;

/// Settings for one transformation request.
#[derive(Clone)]
pub struct TransformationOptions {
    /// How often progress is reported; see [`ProgressThrottle`](crate::ProgressThrottle).
    pub granularity: u32,
    /// Fraction added to the estimated output size during preflight.
    pub size_padding: f64,
    /// Bit rate assumed for audio tracks that do not declare one.
    pub fallback_audio_bitrate: u32,
    /// Whether to refuse jobs whose output would not fit on disk.
    pub verify_disk_space: bool,
    /// Where free space figures come from.
    pub disk_space_probe: Arc<dyn DiskSpaceProbe>,
}

impl Default for TransformationOptions {
    fn default() -> Self {
        Self {
            granularity: GRANULARITY_DEFAULT,
            size_padding: DEFAULT_SIZE_PADDING,
            fallback_audio_bitrate: COMMON_AUDIO_BITRATE,
            verify_disk_space: true,
            disk_space_probe: Arc::new(SystemDiskSpace),
        }
    }
}

impl Debug for TransformationOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("TransformationOptions")
            .field("granularity", &self.granularity)
            .field("size_padding", &self.size_padding)
            .field("fallback_audio_bitrate", &self.fallback_audio_bitrate)
            .field("verify_disk_space", &self.verify_disk_space)
            .field("disk_space_probe", &self.disk_space_probe)
            .finish()
    }
}

impl TransformationOptions {
    /// Create options with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the progress granularity. `0` reports every change.
    #[must_use]
    pub fn with_granularity(mut self, granularity: u32) -> Self {
        self.granularity = granularity;
        self
    }

    /// Set the fraction added to the size estimate. Negative values are
    /// treated as `0`.
    #[must_use]
    pub fn with_size_padding(mut self, padding: f64) -> Self {
        self.size_padding = padding.max(0.0);
        self
    }

    /// Set the bit rate assumed for audio tracks that do not declare one.
    #[must_use]
    pub fn with_fallback_audio_bitrate(mut self, bit_rate: u32) -> Self {
        self.fallback_audio_bitrate = bit_rate;
        self
    }

    /// Enable or disable the disk space preflight.
    #[must_use]
    pub fn with_disk_space_check(mut self, enabled: bool) -> Self {
        self.verify_disk_space = enabled;
        self
    }

    /// Use `probe` to look up free disk space.
    #[must_use]
    pub fn with_disk_space_probe(mut self, probe: Arc<dyn DiskSpaceProbe>) -> Self {
        self.disk_space_probe = probe;
        self
    }
}

/// Runs one listener callback.
pub type CallbackExecutor = Arc<dyn Fn(Box<dyn FnOnce() + Send>) + Send + Sync>;

/// Where a [`MediaTransformer`](crate::MediaTransformer) runs listener callbacks.
///
/// Whatever the choice, callbacks of one transformer run in the order they
/// were posted.
#[derive(Clone, Default)]
pub enum CallbackContext {
    /// A thread owned by the transformer, used only for callbacks.
    #[default]
    Dedicated,
    /// Directly on the worker thread, blocking the job while they run.
    Worker,
    /// Handed to a caller-supplied executor, e.g. one that posts to a UI
    /// event loop. The executor must preserve order.
    Custom(CallbackExecutor),
}

impl Debug for CallbackContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            CallbackContext::Dedicated => f.write_str("Dedicated"),
            CallbackContext::Worker => f.write_str("Worker"),
            CallbackContext::Custom(_) => f.write_str("Custom(<executor>)"),
        }
    }
}

/// Settings for a [`MediaTransformer`](crate::MediaTransformer).
#[derive(Clone)]
pub struct TransformerOptions {
    /// Where listener callbacks run.
    pub callback_context: CallbackContext,
    /// Name of the worker thread.
    pub worker_thread_name: String,
    /// Builds the transcoder of each track.
    pub transcoder_factory: Arc<dyn TranscoderFactory>,
}

impl Default for TransformerOptions {
    fn default() -> Self {
        Self {
            callback_context: CallbackContext::default(),
            worker_thread_name: "mediaflow-worker".to_string(),
            transcoder_factory: Arc::new(TrackTranscoderFactory),
        }
    }
}

impl Debug for TransformerOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("TransformerOptions")
            .field("callback_context", &self.callback_context)
            .field("worker_thread_name", &self.worker_thread_name)
            .finish_non_exhaustive()
    }
}

impl TransformerOptions {
    /// Create options with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run listener callbacks in `context`.
    #[must_use]
    pub fn with_callback_context(mut self, context: CallbackContext) -> Self {
        self.callback_context = context;
        self
    }

    /// Name the worker thread.
    #[must_use]
    pub fn with_worker_thread_name(mut self, name: impl Into<String>) -> Self {
        self.worker_thread_name = name.into();
        self
    }

    /// Build track transcoders with `factory` instead of [`TrackTranscoderFactory`].
    #[must_use]
    pub fn with_transcoder_factory(mut self, factory: Arc<dyn TranscoderFactory>) -> Self {
        self.transcoder_factory = factory;
        self
    }
}
