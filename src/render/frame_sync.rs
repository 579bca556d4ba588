use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

use crate::error::TransformError;

/// How long a surface renderer waits for the decoder before giving up.
pub const DEFAULT_FRAME_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// A latch signalled by the decoder side when a frame lands on a surface and
/// awaited by the renderer before drawing it.
///
/// Each [`notify_frame_available`](FrameSync::notify_frame_available) releases
/// exactly one [`await_frame`](FrameSync::await_frame).
#[derive(Debug)]
pub struct FrameSync {
    available: Mutex<bool>,
    signal: Condvar,
    timeout: Duration,
}

impl FrameSync {
    /// Create a latch with the default ten second timeout.
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_FRAME_WAIT_TIMEOUT)
    }

    /// Create a latch with a custom timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            available: Mutex::new(false),
            signal: Condvar::new(),
            timeout,
        }
    }

    /// Mark a frame as available and wake the waiting renderer.
    pub fn notify_frame_available(&self) {
        let mut available = self.available.lock().unwrap_or_else(PoisonError::into_inner);
        *available = true;
        self.signal.notify_one();
    }

    /// Block until a frame is available, then consume the signal.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::FrameWaitTimeout`] if no frame arrives
    /// within the timeout.
    pub fn await_frame(&self) -> Result<(), TransformError> {
        let guard = self.available.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut available, result) = self
            .signal
            .wait_timeout_while(guard, self.timeout, |available| !*available)
            .unwrap_or_else(PoisonError::into_inner);
        if result.timed_out() && !*available {
            return Err(TransformError::FrameWaitTimeout(self.timeout));
        }
        *available = false;
        Ok(())
    }
}

impl Default for FrameSync {
    fn default() -> Self {
        Self::new()
    }
}
