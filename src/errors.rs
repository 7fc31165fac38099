use thiserror::Error;

use crate::locking::LockKey;
use crate::model::{BookingId, RoomNumber, StayRange};
use crate::store::StoreError;

/// The error type for every booking operation.
///
/// Variants fall into the classes callers care about: validation and
/// not-found errors are never retried, conflict outcomes (`RoomUnavailable`,
/// `StaleWrite`, `HasPayment`) are legitimate rejections the caller may react
/// to with different input, and transient store conflicts are retried
/// internally by the [`TxnRunner`](crate::retry::TxnRunner) before being
/// escalated as [`BookingError::RetryExhausted`].
#[derive(Error, Debug)]
pub enum BookingError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("room {0} not found")]
    RoomNotFound(RoomNumber),

    #[error("booking {0} not found")]
    BookingNotFound(BookingId),

    #[error("room {room} is unavailable for {stay}")]
    RoomUnavailable { room: RoomNumber, stay: StayRange },

    #[error("booking {0} was modified by a concurrent writer")]
    StaleWrite(BookingId),

    #[error("booking {0} already has a payment receipt")]
    HasPayment(BookingId),

    #[error("timed out waiting for lock {0}")]
    LockTimeout(LockKey),

    #[error("gave up after {attempts} attempt(s): {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<BookingError>,
    },

    #[error("operation cancelled by caller")]
    Cancelled,

    #[error("operation deadline exceeded")]
    DeadlineExceeded,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BookingError {
    /// Whether retrying the enclosing transaction could plausibly succeed.
    ///
    /// Only typed transient store conflicts qualify; business rejections,
    /// validation failures and backend faults are returned to the caller
    /// unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(self, BookingError::Store(e) if e.is_transient())
    }
}

pub type Result<T> = std::result::Result<T, BookingError>;
