//! Listener callbacks and their delivery.
//!
//! Every request reports to a [`TransformationListener`]: `on_started` once,
//! `on_progress` zero or more times, then exactly one of `on_completed`,
//! `on_cancelled` or `on_error`. Callbacks are not called on the worker
//! thread directly but posted to the transformer's [`CallbackContext`], so a
//! listener sees them one at a time and in order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::configuration::{CallbackContext, CallbackExecutor};
use crate::error::TransformError;
use crate::io;
use crate::stats::TrackTransformationInfo;

/// Receives the lifecycle events of transformation requests.
///
/// # Example
///
/// ```
/// use mediaflow::{TrackTransformationInfo, TransformError, TransformationListener};
///
/// struct Print;
///
/// impl TransformationListener for Print {
///     fn on_progress(&self, id: &str, progress: f32) {
///         println!("{id}: {:.0}%", progress * 100.0);
///     }
///
///     fn on_completed(&self, id: &str, stats: &[TrackTransformationInfo]) {
///         println!("{id}: done, {} tracks", stats.len());
///     }
///
///     fn on_cancelled(&self, id: &str, _stats: &[TrackTransformationInfo]) {
///         println!("{id}: cancelled");
///     }
///
///     fn on_error(&self, id: &str, error: &TransformError, _stats: &[TrackTransformationInfo]) {
///         eprintln!("{id}: {error}");
///     }
/// }
/// ```
pub trait TransformationListener: Send + Sync {
    /// The request entered its frame loop.
    fn on_started(&self, _id: &str) {}

    /// Aggregated progress in `[0, 1]`; never decreases within a request.
    fn on_progress(&self, _id: &str, _progress: f32) {}

    /// Every track reached end of stream and the output was finalised.
    fn on_completed(&self, id: &str, stats: &[TrackTransformationInfo]);

    /// The request was cancelled; its output has been deleted.
    fn on_cancelled(&self, id: &str, stats: &[TrackTransformationInfo]);

    /// The request failed; its output has been deleted.
    fn on_error(&self, id: &str, error: &TransformError, stats: &[TrackTransformationInfo]);
}

type Callback = Box<dyn FnOnce() + Send>;

enum Delivery {
    Dedicated {
        sender: Mutex<Option<Sender<Callback>>>,
        thread: Mutex<Option<JoinHandle<()>>>,
    },
    Inline,
    Custom(CallbackExecutor),
}

/// Runs listener callbacks in a [`CallbackContext`].
///
/// After [`release`](CallbackDispatcher::release) nothing else runs, including
/// callbacks posted earlier that are still queued.
pub(crate) struct CallbackDispatcher {
    delivery: Delivery,
    released: Arc<AtomicBool>,
}

impl CallbackDispatcher {
    pub(crate) fn new(context: &CallbackContext, thread_name: &str) -> Result<Self, TransformError> {
        let delivery = match context {
            CallbackContext::Dedicated => {
                let (sender, receiver) = mpsc::channel::<Callback>();
                let thread = thread::Builder::new()
                    .name(format!("{thread_name}-callbacks"))
                    .spawn(move || {
                        for callback in receiver {
                            callback();
                        }
                    })?;
                Delivery::Dedicated {
                    sender: Mutex::new(Some(sender)),
                    thread: Mutex::new(Some(thread)),
                }
            }
            CallbackContext::Worker => Delivery::Inline,
            CallbackContext::Custom(executor) => Delivery::Custom(executor.clone()),
        };
        Ok(Self {
            delivery,
            released: Arc::new(AtomicBool::new(false)),
        })
    }

    pub(crate) fn post(&self, callback: Callback) {
        if self.released.load(Ordering::Acquire) {
            return;
        }
        let released = self.released.clone();
        let guarded: Callback = Box::new(move || {
            if !released.load(Ordering::Acquire) {
                callback();
            }
        });

        match &self.delivery {
            Delivery::Dedicated { sender, .. } => {
                if let Some(sender) = io::lock(sender).as_ref() {
                    if sender.send(guarded).is_err() {
                        log::warn!("Callback thread is gone, dropping listener callback");
                    }
                }
            }
            Delivery::Inline => guarded(),
            Delivery::Custom(executor) => executor(guarded),
        }
    }

    /// Stop delivering callbacks and shut the callback thread down.
    ///
    /// Does not wait for the thread when called from a callback.
    pub(crate) fn release(&self) {
        self.released.store(true, Ordering::Release);
        if let Delivery::Dedicated { sender, thread } = &self.delivery {
            io::lock(sender).take();
            let handle = io::lock(thread).take();
            if let Some(handle) = handle {
                if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                    log::error!("Listener callback panicked");
                }
            }
        }
    }
}

impl Drop for CallbackDispatcher {
    fn drop(&mut self) {
        self.release();
    }
}

/// Posts the events of one request to its listener.
#[derive(Clone)]
pub(crate) struct JobNotifier {
    id: Arc<str>,
    listener: Arc<dyn TransformationListener>,
    dispatcher: Arc<CallbackDispatcher>,
}

impl JobNotifier {
    pub(crate) fn new(
        id: &str,
        listener: Arc<dyn TransformationListener>,
        dispatcher: Arc<CallbackDispatcher>,
    ) -> Self {
        Self {
            id: Arc::from(id),
            listener,
            dispatcher,
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    fn post(&self, event: impl FnOnce(&str, &dyn TransformationListener) + Send + 'static) {
        let id = self.id.clone();
        let listener = self.listener.clone();
        self.dispatcher.post(Box::new(move || event(&id, &*listener)));
    }

    pub(crate) fn started(&self) {
        self.post(|id, listener| listener.on_started(id));
    }

    pub(crate) fn progress(&self, progress: f32) {
        self.post(move |id, listener| listener.on_progress(id, progress));
    }

    pub(crate) fn completed(&self, stats: Vec<TrackTransformationInfo>) {
        self.post(move |id, listener| listener.on_completed(id, &stats));
    }

    pub(crate) fn cancelled(&self, stats: Vec<TrackTransformationInfo>) {
        self.post(move |id, listener| listener.on_cancelled(id, &stats));
    }

    pub(crate) fn error(&self, error: TransformError, stats: Vec<TrackTransformationInfo>) {
        self.post(move |id, listener| listener.on_error(id, &error, &stats));
    }
}
