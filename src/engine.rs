use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use log::debug;

use crate::UpdateStrategy;
use crate::context::OpContext;
use crate::errors::{BookingError, Result};
use crate::ledger;
use crate::locking::{LockKey, LockRegistry};
use crate::model::{Booking, BookingId, Receipt, RoomNumber, StayRange};
use crate::retry::TxnRunner;
use crate::store::{Clock, ReservationStore, SystemClock};

/// Innkeeper prelude.
pub mod prelude {
    pub use crate::context::*;
    pub use crate::engine::*;
    pub use crate::errors::*;
    pub use crate::ledger::*;
    pub use crate::locking::*;
    pub use crate::model::*;
    pub use crate::retry::*;
    pub use crate::store::memory::*;
    pub use crate::store::*;
    pub use crate::*;
}

/// Tuning knobs for the engine's concurrency control.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long an operation may wait for an in-process lock.
    pub lock_timeout: Duration,
    /// Transaction attempts before a transient conflict is escalated.
    pub max_attempts: u32,
    /// First retry backoff; doubles per attempt.
    pub backoff_base: Duration,
    /// Concurrency strategy for booking updates.
    pub update_strategy: UpdateStrategy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            max_attempts: 3,
            backoff_base: Duration::from_millis(20),
            update_strategy: UpdateStrategy::PessimisticLock,
        }
    }
}

/// Input for [`BookingEngine::create_booking`].
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub room: RoomNumber,
    pub guest: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

/// The main entry point for the Innkeeper reservation engine.
///
/// Orchestrates every booking operation across the three layers of mutual
/// exclusion: the in-process [`LockRegistry`] serializes same-room work
/// before any transaction opens, the [`TxnRunner`] absorbs transient store
/// conflicts, and the store's own row locking remains the ultimate authority
/// on the availability ledger.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use chrono::NaiveDate;
/// use innkeeper::prelude::*;
///
/// let store = Arc::new(MemoryStore::new());
/// store.add_room(101, RoomType {
///     nightly_rate: 120_00,
///     capacity: 2,
///     amenities: vec!["wifi".into()],
/// });
///
/// let engine = BookingEngine::with_defaults(store);
/// let ctx = OpContext::background();
/// let booking = engine
///     .create_booking(&ctx, &BookingRequest {
///         room: 101,
///         guest: "A. Lovelace".into(),
///         check_in: NaiveDate::from_ymd_opt(2099, 1, 10).unwrap(),
///         check_out: NaiveDate::from_ymd_opt(2099, 1, 13).unwrap(),
///     })
///     .unwrap();
///
/// assert_eq!(booking.stay.nights(), 3);
/// assert_eq!(booking.total, 3 * 120_00);
/// ```
pub struct BookingEngine {
    store: Arc<dyn ReservationStore>,
    clock: Arc<dyn Clock>,
    locks: LockRegistry,
    runner: TxnRunner,
    config: EngineConfig,
}

impl BookingEngine {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            runner: TxnRunner::new(config.max_attempts, config.backoff_base),
            locks: LockRegistry::new(),
            store,
            clock,
            config,
        }
    }

    /// Engine with the system clock and default configuration.
    pub fn with_defaults(store: Arc<dyn ReservationStore>) -> Self {
        Self::new(store, Arc::new(SystemClock), EngineConfig::default())
    }

    /// The engine's lock registry, exposed for state assertions.
    pub fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    /// Creates a booking for the requested room and stay.
    ///
    /// Validation happens before any lock is taken; a request that cannot
    /// possibly proceed never serializes other traffic on the room. The room
    /// lock is then held across the whole transaction: existence check,
    /// locked availability read, price computation, booking insert and
    /// ledger claim. The guard drops on every exit path.
    pub fn create_booking(&self, ctx: &OpContext, request: &BookingRequest) -> Result<Booking> {
        let stay = self.validate(request)?;
        let _room_lock = self
            .locks
            .acquire(LockKey::room(request.room), self.lock_wait(ctx)?)?;
        let booking = self.runner.run(ctx, self.store.as_ref(), |txn| {
            let room_type = txn
                .room_type(request.room)?
                .ok_or(BookingError::RoomNotFound(request.room))?;
            ledger::confirm_available(txn, request.room, &stay, None)?;
            let booking = Booking::new(
                request.room,
                stay,
                request.guest.clone(),
                room_type.nightly_rate,
                self.clock.now(),
            );
            txn.insert_booking(&booking)?;
            ledger::claim(txn, request.room, &stay, &booking.id)?;
            Ok(booking)
        })?;
        debug!(
            "created booking {} for room {} ({} nights, total {})",
            booking.id,
            booking.room,
            booking.stay.nights(),
            booking.total
        );
        Ok(booking)
    }

    /// Moves a booking to a new stay interval.
    ///
    /// Dispatches on the configured [`UpdateStrategy`]; the pessimistic path
    /// is the production default, the optimistic path trades lock contention
    /// for caller-visible [`BookingError::StaleWrite`] conflicts.
    pub fn update_booking(
        &self,
        ctx: &OpContext,
        id: &BookingId,
        new_check_in: NaiveDate,
        new_check_out: NaiveDate,
    ) -> Result<Booking> {
        let new_stay = StayRange::new(new_check_in, new_check_out)?;
        let booking = match self.config.update_strategy {
            UpdateStrategy::PessimisticLock => self.update_pessimistic(ctx, id, new_stay)?,
            UpdateStrategy::OptimisticVersion => self.update_optimistic(ctx, id, new_stay)?,
        };
        debug!(
            "updated booking {} to {} (total {})",
            booking.id, booking.stay, booking.total
        );
        Ok(booking)
    }

    fn update_pessimistic(
        &self,
        ctx: &OpContext,
        id: &BookingId,
        new_stay: StayRange,
    ) -> Result<Booking> {
        let current = self.booking(ctx, id)?;
        let _guards = self.locks.acquire_many(
            vec![LockKey::booking(id), LockKey::room(current.room)],
            self.lock_wait(ctx)?,
        )?;
        self.runner.run(ctx, self.store.as_ref(), |txn| {
            let mut booking = txn
                .booking(id)?
                .ok_or_else(|| BookingError::BookingNotFound(id.clone()))?;
            if booking.stay == new_stay {
                return Ok(booking);
            }
            // The booking's own days must not count against the new range.
            ledger::confirm_available(txn, booking.room, &new_stay, Some(id))?;
            let room_type = txn
                .room_type(booking.room)?
                .ok_or(BookingError::RoomNotFound(booking.room))?;
            ledger::release(txn, id)?;
            booking.stay = new_stay;
            booking.reprice(room_type.nightly_rate);
            booking.last_modified = self.clock.now();
            txn.update_booking(&booking)?;
            ledger::claim(txn, booking.room, &new_stay, id)?;
            Ok(booking)
        })
    }

    /// Version-guarded update: no in-process locks; commits only if no
    /// concurrent writer moved the booking's `last_modified` marker since it
    /// was read. The caller decides whether to re-read and retry a
    /// [`BookingError::StaleWrite`].
    fn update_optimistic(
        &self,
        ctx: &OpContext,
        id: &BookingId,
        new_stay: StayRange,
    ) -> Result<Booking> {
        let current = self.booking(ctx, id)?;
        let seen = current.last_modified;
        let dates_changed = current.stay != new_stay;
        self.runner.run(ctx, self.store.as_ref(), |txn| {
            let room_type = txn
                .room_type(current.room)?
                .ok_or(BookingError::RoomNotFound(current.room))?;
            if dates_changed {
                ledger::confirm_available(txn, current.room, &new_stay, Some(id))?;
            }
            let mut candidate = current.clone();
            candidate.stay = new_stay;
            candidate.reprice(room_type.nightly_rate);
            candidate.last_modified = self.clock.now();
            if !txn.update_booking_if_unmodified(&candidate, seen)? {
                return Err(BookingError::StaleWrite(id.clone()));
            }
            if dates_changed {
                ledger::release(txn, id)?;
                ledger::claim(txn, candidate.room, &new_stay, id)?;
            }
            Ok(candidate)
        })
    }

    /// Cancels a booking, releasing its ledger days and deleting the row.
    ///
    /// Refuses with [`BookingError::HasPayment`] while a receipt exists.
    pub fn cancel_booking(&self, ctx: &OpContext, id: &BookingId) -> Result<()> {
        let current = self.booking(ctx, id)?;
        let _guards = self.locks.acquire_many(
            vec![LockKey::booking(id), LockKey::room(current.room)],
            self.lock_wait(ctx)?,
        )?;
        self.runner.run(ctx, self.store.as_ref(), |txn| {
            txn.booking(id)?
                .ok_or_else(|| BookingError::BookingNotFound(id.clone()))?;
            if txn.receipt_for(id)?.is_some() {
                return Err(BookingError::HasPayment(id.clone()));
            }
            ledger::release(txn, id)?;
            txn.delete_booking(id)?;
            Ok(())
        })?;
        debug!("cancelled booking {id}");
        Ok(())
    }

    /// Read-only availability probe; takes neither in-process nor row locks.
    pub fn check_availability(
        &self,
        ctx: &OpContext,
        room: RoomNumber,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<bool> {
        let stay = StayRange::new(check_in, check_out)?;
        ctx.checkpoint()?;
        ledger::is_free(self.store.as_ref(), room, &stay)
    }

    /// Issues the payment receipt for a booking, at most once.
    ///
    /// The receipt number is drawn from the year-scoped sequence inside the
    /// same transaction that inserts the receipt, and the amount always
    /// equals the booking's current total.
    pub fn record_payment(&self, ctx: &OpContext, id: &BookingId) -> Result<Receipt> {
        let current = self.booking(ctx, id)?;
        let year = Receipt::year_of(current.created_at);
        let _guards = self.locks.acquire_many(
            vec![LockKey::booking(id), LockKey::sequence(year)],
            self.lock_wait(ctx)?,
        )?;
        let receipt = self.runner.run(ctx, self.store.as_ref(), |txn| {
            let booking = txn
                .booking(id)?
                .ok_or_else(|| BookingError::BookingNotFound(id.clone()))?;
            if txn.receipt_for(id)?.is_some() {
                return Err(BookingError::HasPayment(id.clone()));
            }
            let sequence = txn.next_sequence(year)?;
            let receipt = Receipt {
                id: Receipt::number(year, sequence),
                booking: id.clone(),
                amount: booking.total,
                issued_at: self.clock.now(),
            };
            txn.insert_receipt(&receipt)?;
            Ok(receipt)
        })?;
        debug!("issued receipt {} for booking {id}", receipt.id);
        Ok(receipt)
    }

    /// Fetches one booking by id.
    pub fn booking(&self, ctx: &OpContext, id: &BookingId) -> Result<Booking> {
        self.runner.run(ctx, self.store.as_ref(), |txn| {
            txn.booking(id)?
                .ok_or_else(|| BookingError::BookingNotFound(id.clone()))
        })
    }

    /// Validates the request before any lock is taken.
    fn validate(&self, request: &BookingRequest) -> Result<StayRange> {
        let stay = StayRange::new(request.check_in, request.check_out)?;
        let today = self.clock.now().date();
        if request.check_in < today {
            return Err(BookingError::Validation(format!(
                "check-in {} is in the past",
                request.check_in
            )));
        }
        if request.guest.trim().is_empty() {
            return Err(BookingError::Validation("guest name is empty".into()));
        }
        Ok(stay)
    }

    fn lock_wait(&self, ctx: &OpContext) -> Result<Duration> {
        ctx.checkpoint()?;
        Ok(ctx.clamp(self.config.lock_timeout))
    }
}
