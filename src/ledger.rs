//! Per-room, per-day availability ledger.
//!
//! One [`LedgerEntry`] per `(room, day)` is the single source of truth for
//! whether a room is bookable on that day, and the unit of contention for
//! availability. The per-day model is a deliberate simplicity trade-off: a
//! long stay writes one row per night, which is a known scalability ceiling
//! accepted in exchange for trivially correct range checks.

use log::debug;
use serde::{Deserialize, Serialize};

use chrono::NaiveDate;

use crate::errors::{BookingError, Result};
use crate::model::{BookingId, RoomNumber, StayRange};
use crate::store::{ReservationStore, StoreTxn};

/// Occupancy state of one room on one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DayStatus {
    Available,
    Occupied,
}

/// One `(room, day)` occupancy record. At most one entry exists per key;
/// all writes are upserts, never duplicate rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub room: RoomNumber,
    pub day: NaiveDate,
    pub status: DayStatus,
    /// Back-reference to the owning booking while occupied.
    pub booking: Option<BookingId>,
}

impl LedgerEntry {
    pub fn occupied(room: RoomNumber, day: NaiveDate, owner: &BookingId) -> Self {
        Self {
            room,
            day,
            status: DayStatus::Occupied,
            booking: Some(owner.clone()),
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.status == DayStatus::Occupied
    }
}

/// Re-checks the ledger for the room and range under an exclusive read.
///
/// The row lock prevents two concurrent transactions from both observing
/// "all available" before either commits. `exclude` lets a date-change
/// operation ignore the booking's own current days.
pub fn confirm_available(
    txn: &mut dyn StoreTxn,
    room: RoomNumber,
    stay: &StayRange,
    exclude: Option<&BookingId>,
) -> Result<()> {
    let occupied = txn.occupied_days_locked(room, stay, exclude)?;
    if occupied > 0 {
        debug!("room {room} has {occupied} occupied day(s) in {stay}");
        return Err(BookingError::RoomUnavailable { room, stay: *stay });
    }
    Ok(())
}

/// Claims every day of the stay for `owner` in one upsert write.
pub fn claim(
    txn: &mut dyn StoreTxn,
    room: RoomNumber,
    stay: &StayRange,
    owner: &BookingId,
) -> Result<()> {
    txn.upsert_days(room, stay, owner)?;
    debug!("claimed {} day(s) of room {room} for {owner}", stay.nights());
    Ok(())
}

/// Releases every day currently owned by `owner` back to available.
pub fn release(txn: &mut dyn StoreTxn, owner: &BookingId) -> Result<()> {
    txn.release_days(owner)?;
    debug!("released ledger days of {owner}");
    Ok(())
}

/// Read-only availability probe; takes no locks of any kind.
pub fn is_free(store: &dyn ReservationStore, room: RoomNumber, stay: &StayRange) -> Result<bool> {
    Ok(store.occupied_days(room, stay)? == 0)
}
