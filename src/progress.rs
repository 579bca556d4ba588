//! Progress throttling and cancellation support.
//!
//! This module provides [`CancellationToken`] for cooperative cancellation
//! and [`ProgressThrottle`], which decides which progress values of a job are
//! worth reporting.
//!
//! # Example
//!
//! ```
//! use mediaflow::{CancellationToken, ProgressThrottle};
//!
//! // Report at most four times, each a quarter past the last report.
//! let mut throttle = ProgressThrottle::new(4);
//! assert_eq!(throttle.update(0.1), None);
//! assert_eq!(throttle.update(0.3), Some(0.3));
//! assert_eq!(throttle.update(0.5), None);
//! assert_eq!(throttle.update(0.56), Some(0.56));
//!
//! let token = CancellationToken::new();
//! token.clone().cancel();
//! assert!(token.is_cancelled());
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// Clone this token and share it between threads; call [`cancel`](CancellationToken::cancel)
/// from any thread to request cancellation of the associated job.
/// The job loop checks [`is_cancelled`](CancellationToken::is_cancelled)
/// once per round-robin cycle.
///
/// # Example
///
/// ```
/// use mediaflow::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(!token.is_cancelled());
///
/// // From another thread (or a signal handler, etc.):
/// token.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation.
    ///
    /// All clones of this token will observe the cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Filters a job's aggregated progress down to the values worth reporting.
///
/// With a granularity of `0` every change is reported. With `N > 0` a value
/// is reported once it is at least `1/N` past the last reported one, so at
/// most `N` reports are made over a job. Reported values never decrease.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressThrottle {
    granularity: u32,
    last: f32,
}

impl ProgressThrottle {
    /// Create a throttle that has reported nothing yet.
    pub fn new(granularity: u32) -> Self {
        Self { granularity, last: 0.0 }
    }

    /// Feed the current progress; returns it when it should be reported.
    pub fn update(&mut self, progress: f32) -> Option<f32> {
        let progress = progress.clamp(0.0, 1.0);
        let report = if self.granularity == 0 {
            progress > self.last
        } else {
            progress >= self.last + 1.0 / self.granularity as f32
        };
        if report {
            self.last = progress;
            Some(progress)
        } else {
            None
        }
    }

    /// The last reported value, `0.0` before the first report.
    pub fn last(&self) -> f32 {
        self.last
    }
}
