//! In-process reference implementation of the store seam.
//!
//! A single mutex guards all tables; a transaction owns that mutex for its
//! whole lifetime, which gives it the exclusive-read semantics a row-locking
//! database would provide. A `begin` that cannot take the mutex within its
//! wait budget surfaces the transient [`StoreError::LockWait`], so the retry
//! runner exercises exactly the same paths it would against a real backend.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap as HashMap;
use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};

use crate::ledger::{DayStatus, LedgerEntry};
use crate::model::{Booking, BookingId, Receipt, RoomNumber, RoomType, StayRange};
use crate::store::{ReservationStore, StoreError, StoreTxn};

#[derive(Default, Clone)]
struct Tables {
    rooms: HashMap<RoomNumber, RoomType>,
    bookings: HashMap<BookingId, Booking>,
    /// Ordered by `(room, day)` so range scans mirror an indexed composite key.
    ledger: BTreeMap<(RoomNumber, NaiveDate), LedgerEntry>,
    receipts: HashMap<BookingId, Receipt>,
    sequences: HashMap<i32, u32>,
}

/// In-memory reservation store.
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    /// Internal cap on how long `begin` may block, independent of the caller.
    busy_wait: Duration,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_busy_wait(Duration::from_secs(5))
    }

    pub fn with_busy_wait(busy_wait: Duration) -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            busy_wait,
        }
    }

    /// Seeds a room outside any transaction.
    pub fn add_room(&self, room: RoomNumber, room_type: RoomType) {
        self.tables.lock().rooms.insert(room, room_type);
    }

    /// Direct read of one booking, for assertions.
    pub fn booking(&self, id: &BookingId) -> Option<Booking> {
        self.tables.lock().bookings.get(id).cloned()
    }

    /// Direct read of one receipt, for assertions.
    pub fn receipt(&self, booking: &BookingId) -> Option<Receipt> {
        self.tables.lock().receipts.get(booking).cloned()
    }

    /// Snapshot of every ledger entry for a room, ordered by day.
    pub fn ledger_snapshot(&self, room: RoomNumber) -> Vec<LedgerEntry> {
        self.tables
            .lock()
            .ledger
            .range((room, NaiveDate::MIN)..=(room, NaiveDate::MAX))
            .map(|(_, entry)| entry.clone())
            .collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ReservationStore for MemoryStore {
    fn begin(&self, max_wait: Duration) -> Result<Box<dyn StoreTxn + '_>, StoreError> {
        let wait = max_wait.min(self.busy_wait);
        let guard = self
            .tables
            .try_lock_arc_for(wait)
            .ok_or(StoreError::LockWait)?;
        let undo = guard.clone();
        Ok(Box::new(MemoryTxn {
            tables: guard,
            undo: Some(undo),
        }))
    }

    fn occupied_days(&self, room: RoomNumber, stay: &StayRange) -> Result<u64, StoreError> {
        let tables = self.tables.lock();
        Ok(count_occupied(&tables, room, stay, None))
    }
}

fn count_occupied(
    tables: &Tables,
    room: RoomNumber,
    stay: &StayRange,
    exclude: Option<&BookingId>,
) -> u64 {
    tables
        .ledger
        .range((room, stay.check_in())..(room, stay.check_out()))
        .filter(|(_, entry)| entry.is_occupied())
        .filter(|(_, entry)| match (exclude, &entry.booking) {
            (Some(excluded), Some(owner)) => owner != excluded,
            _ => true,
        })
        .count() as u64
}

/// Transaction over the in-memory tables.
///
/// Holds the store mutex exclusively and mutates in place; `undo` keeps the
/// pre-transaction state and is restored on rollback or drop-without-commit.
struct MemoryTxn {
    tables: ArcMutexGuard<RawMutex, Tables>,
    undo: Option<Tables>,
}

impl StoreTxn for MemoryTxn {
    fn room_type(&mut self, room: RoomNumber) -> Result<Option<RoomType>, StoreError> {
        Ok(self.tables.rooms.get(&room).cloned())
    }

    fn booking(&mut self, id: &BookingId) -> Result<Option<Booking>, StoreError> {
        Ok(self.tables.bookings.get(id).cloned())
    }

    fn insert_booking(&mut self, booking: &Booking) -> Result<(), StoreError> {
        if self.tables.bookings.contains_key(&booking.id) {
            return Err(StoreError::Backend(format!(
                "duplicate booking id {}",
                booking.id
            )));
        }
        self.tables.bookings.insert(booking.id.clone(), booking.clone());
        Ok(())
    }

    fn update_booking(&mut self, booking: &Booking) -> Result<(), StoreError> {
        match self.tables.bookings.get_mut(&booking.id) {
            Some(row) => {
                *row = booking.clone();
                Ok(())
            }
            None => Err(StoreError::Backend(format!(
                "update of missing booking {}",
                booking.id
            ))),
        }
    }

    fn update_booking_if_unmodified(
        &mut self,
        booking: &Booking,
        seen: NaiveDateTime,
    ) -> Result<bool, StoreError> {
        match self.tables.bookings.get_mut(&booking.id) {
            Some(row) if row.last_modified == seen => {
                *row = booking.clone();
                Ok(true)
            }
            // Marker moved or row gone: zero rows affected.
            _ => Ok(false),
        }
    }

    fn delete_booking(&mut self, id: &BookingId) -> Result<(), StoreError> {
        self.tables.bookings.remove(id);
        Ok(())
    }

    fn occupied_days_locked(
        &mut self,
        room: RoomNumber,
        stay: &StayRange,
        exclude: Option<&BookingId>,
    ) -> Result<u64, StoreError> {
        // Exclusivity comes from the transaction owning the store mutex.
        Ok(count_occupied(&self.tables, room, stay, exclude))
    }

    fn upsert_days(
        &mut self,
        room: RoomNumber,
        stay: &StayRange,
        owner: &BookingId,
    ) -> Result<(), StoreError> {
        for day in stay.days() {
            self.tables
                .ledger
                .insert((room, day), LedgerEntry::occupied(room, day, owner));
        }
        Ok(())
    }

    fn release_days(&mut self, owner: &BookingId) -> Result<(), StoreError> {
        for entry in self.tables.ledger.values_mut() {
            if entry.booking.as_ref() == Some(owner) {
                entry.status = DayStatus::Available;
                entry.booking = None;
            }
        }
        Ok(())
    }

    fn ledger_entry(
        &mut self,
        room: RoomNumber,
        day: NaiveDate,
    ) -> Result<Option<LedgerEntry>, StoreError> {
        Ok(self.tables.ledger.get(&(room, day)).cloned())
    }

    fn receipt_for(&mut self, booking: &BookingId) -> Result<Option<Receipt>, StoreError> {
        Ok(self.tables.receipts.get(booking).cloned())
    }

    fn insert_receipt(&mut self, receipt: &Receipt) -> Result<(), StoreError> {
        if self.tables.receipts.contains_key(&receipt.booking) {
            return Err(StoreError::Backend(format!(
                "duplicate receipt for booking {}",
                receipt.booking
            )));
        }
        self.tables
            .receipts
            .insert(receipt.booking.clone(), receipt.clone());
        Ok(())
    }

    fn next_sequence(&mut self, year: i32) -> Result<u32, StoreError> {
        let counter = self.tables.sequences.entry(year).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.undo = None;
        Ok(())
    }

    fn rollback(self: Box<Self>) {
        // Drop restores the undo image.
    }
}

impl Drop for MemoryTxn {
    fn drop(&mut self) {
        if let Some(undo) = self.undo.take() {
            *self.tables = undo;
        }
    }
}
