//! Per-operation deadline and cancellation handling.
//!
//! Every suspension point in the engine (in-process lock acquisition, retry
//! backoff sleep, store transaction begin) is bounded by the caller's
//! [`OpContext`]. On expiry or cancellation the operation unwinds cleanly,
//! dropping any lock guards it still holds.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::errors::{BookingError, Result};

/// Granularity of interruptible sleeps.
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Caller-supplied deadline/cancellation scope for one booking operation.
#[derive(Clone)]
pub struct OpContext {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

/// Handle for cancelling an in-flight operation from another thread.
#[derive(Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

impl OpContext {
    /// A context with no deadline that can only end by cancellation.
    pub fn background() -> Self {
        Self {
            deadline: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A context that expires at the given instant.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns a handle other threads can use to cancel this operation.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancelled))
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Fails fast if the operation was cancelled or its deadline has passed.
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(BookingError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(BookingError::DeadlineExceeded);
            }
        }
        Ok(())
    }

    /// Time left until the deadline, or `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Bounds a wait duration by the remaining deadline budget.
    pub fn clamp(&self, duration: Duration) -> Duration {
        match self.remaining() {
            Some(remaining) => duration.min(remaining),
            None => duration,
        }
    }

    /// Interruptible sleep used for retry backoff.
    ///
    /// Refuses to start a sleep the deadline cannot accommodate, and checks
    /// for cancellation between slices.
    pub fn sleep(&self, duration: Duration) -> Result<()> {
        self.checkpoint()?;
        if let Some(remaining) = self.remaining() {
            if remaining < duration {
                return Err(BookingError::DeadlineExceeded);
            }
        }
        let mut left = duration;
        while !left.is_zero() {
            let slice = left.min(SLEEP_SLICE);
            std::thread::sleep(slice);
            left -= slice;
            self.checkpoint()?;
        }
        Ok(())
    }
}

impl Default for OpContext {
    fn default() -> Self {
        Self::background()
    }
}
