//! Persistence seam for the booking engine.
//!
//! The engine never builds queries itself; it talks to a
//! [`ReservationStore`] that hands out transaction-scoped [`StoreTxn`]
//! handles. Implementations map these calls onto their backend's rows and
//! locks. [`MemoryStore`](memory::MemoryStore) is the in-process reference
//! implementation used by the tests and examples.

pub mod memory;

use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;

use crate::ledger::LedgerEntry;
use crate::model::{Booking, BookingId, Receipt, RoomNumber, RoomType, StayRange};

/// Typed classification of store-level failures.
///
/// Classification happens here, at the data-access boundary, so the retry
/// runner dispatches on a structured kind and never inspects error text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("deadlock detected between concurrent transactions")]
    Deadlock,

    #[error("could not serialize access due to concurrent commit")]
    Serialization,

    #[error("lock wait timeout exceeded")]
    LockWait,

    #[error("row changed by a concurrent update")]
    ConcurrentUpdate,

    /// Connectivity, schema mismatch, constraint violations: never retried.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether the condition is expected to resolve on retry.
    pub fn is_transient(&self) -> bool {
        !matches!(self, StoreError::Backend(_))
    }
}

/// Wall-clock source, injected so tests control time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Default clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// Handle to the reservation database.
///
/// Implementations must be shareable across request-handling threads; all
/// mutation goes through the transaction handles returned by [`begin`].
///
/// [`begin`]: ReservationStore::begin
pub trait ReservationStore: Send + Sync {
    /// Opens a transaction, waiting at most `max_wait` for the store to
    /// become available. A wait that times out is reported as the transient
    /// [`StoreError::LockWait`].
    fn begin(&self, max_wait: Duration) -> Result<Box<dyn StoreTxn + '_>, StoreError>;

    /// Lock-free count of occupied ledger days, for read-only availability
    /// queries that must not take row locks.
    fn occupied_days(&self, room: RoomNumber, stay: &StayRange) -> Result<u64, StoreError>;
}

/// One database transaction.
///
/// Dropping a handle without committing must roll it back.
pub trait StoreTxn {
    // Rooms.
    fn room_type(&mut self, room: RoomNumber) -> Result<Option<RoomType>, StoreError>;

    // Bookings.
    fn booking(&mut self, id: &BookingId) -> Result<Option<Booking>, StoreError>;
    fn insert_booking(&mut self, booking: &Booking) -> Result<(), StoreError>;
    fn update_booking(&mut self, booking: &Booking) -> Result<(), StoreError>;
    /// Optimistic version guard: persists `booking` only if the stored row's
    /// `last_modified` still equals `seen`. Returns `false` when a concurrent
    /// writer won the race (zero rows affected), never overwriting blindly.
    fn update_booking_if_unmodified(
        &mut self,
        booking: &Booking,
        seen: NaiveDateTime,
    ) -> Result<bool, StoreError>;
    fn delete_booking(&mut self, id: &BookingId) -> Result<(), StoreError>;

    // Availability ledger.
    /// Counts occupied days in the range under an exclusive row lock
    /// (`SELECT ... FOR UPDATE` semantics), optionally ignoring the days
    /// already owned by `exclude`.
    fn occupied_days_locked(
        &mut self,
        room: RoomNumber,
        stay: &StayRange,
        exclude: Option<&BookingId>,
    ) -> Result<u64, StoreError>;
    /// Insert-or-update every day of the stay to occupied-by-`owner` in one
    /// conflict-tolerant write on the `(room, day)` key.
    fn upsert_days(
        &mut self,
        room: RoomNumber,
        stay: &StayRange,
        owner: &BookingId,
    ) -> Result<(), StoreError>;
    /// Flips every day owned by `owner` back to available and clears the
    /// booking back-reference.
    fn release_days(&mut self, owner: &BookingId) -> Result<(), StoreError>;
    fn ledger_entry(
        &mut self,
        room: RoomNumber,
        day: NaiveDate,
    ) -> Result<Option<LedgerEntry>, StoreError>;

    // Receipts.
    fn receipt_for(&mut self, booking: &BookingId) -> Result<Option<Receipt>, StoreError>;
    fn insert_receipt(&mut self, receipt: &Receipt) -> Result<(), StoreError>;

    // Identifier sequences.
    /// Increments and returns the year-scoped running number. Runs inside
    /// this transaction so every draw is observed exactly once.
    fn next_sequence(&mut self, year: i32) -> Result<u32, StoreError>;

    // Lifecycle.
    fn commit(self: Box<Self>) -> Result<(), StoreError>;
    fn rollback(self: Box<Self>);
}
