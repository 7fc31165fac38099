//! Common utilities for Innkeeper integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use innkeeper::store::memory::MemoryStore;
use innkeeper::store::{Clock, ReservationStore, StoreError, StoreTxn};
use innkeeper::{
    Booking, BookingEngine, BookingId, BookingRequest, EngineConfig, LedgerEntry, Receipt,
    RoomNumber, RoomType, StayRange, UpdateStrategy,
};

/// Nightly rate used for every seeded room, in minor units.
pub const RATE: u64 = 120_00;

/// The tests' "today": seeded clocks start on 2026-01-05, so January stays
/// from the 10th onwards are always in the future.
pub const TODAY: (i32, u32, u32) = (2026, 1, 5);

pub fn d(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

// --- TestClock ---

/// Deterministic clock: fixed base date, each reading one microsecond later
/// than the previous so last-modified markers are always distinguishable.
pub struct TestClock {
    base: NaiveDateTime,
    ticks: AtomicU32,
}

impl TestClock {
    pub fn at(date: NaiveDate) -> Self {
        Self {
            base: date.and_hms_opt(12, 0, 0).unwrap(),
            ticks: AtomicU32::new(0),
        }
    }
}

impl Clock for TestClock {
    fn now(&self) -> NaiveDateTime {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
        self.base + chrono::Duration::microseconds(tick as i64)
    }
}

// --- Setup helpers ---

/// Memory store seeded with rooms 101 and 202 at the standard rate.
pub fn seeded_memory() -> MemoryStore {
    let store = MemoryStore::new();
    let room_type = RoomType {
        nightly_rate: RATE,
        capacity: 2,
        amenities: vec!["wifi".to_string()],
    };
    store.add_room(101, room_type.clone());
    store.add_room(202, room_type);
    store
}

pub fn seeded_store() -> Arc<MemoryStore> {
    Arc::new(seeded_memory())
}

pub fn engine_with(store: Arc<dyn ReservationStore>, config: EngineConfig) -> BookingEngine {
    let _ = env_logger::builder().is_test(true).try_init();
    let (y, m, day) = TODAY;
    BookingEngine::new(store, Arc::new(TestClock::at(d(y, m, day))), config)
}

pub fn engine(store: Arc<dyn ReservationStore>) -> BookingEngine {
    engine_with(store, EngineConfig::default())
}

pub fn optimistic_engine(store: Arc<dyn ReservationStore>) -> BookingEngine {
    engine_with(
        store,
        EngineConfig {
            update_strategy: UpdateStrategy::OptimisticVersion,
            ..EngineConfig::default()
        },
    )
}

pub fn request(room: RoomNumber, check_in: NaiveDate, check_out: NaiveDate) -> BookingRequest {
    BookingRequest {
        room,
        guest: "Guest".to_string(),
        check_in,
        check_out,
    }
}

/// Occupied `(day, owner)` pairs for a room, ordered by day.
pub fn occupied_days_of(store: &MemoryStore, room: RoomNumber) -> Vec<(NaiveDate, BookingId)> {
    store
        .ledger_snapshot(room)
        .into_iter()
        .filter(LedgerEntry::is_occupied)
        .map(|entry| (entry.day, entry.booking.expect("occupied entry has owner")))
        .collect()
}

pub fn stay(check_in: NaiveDate, check_out: NaiveDate) -> StayRange {
    StayRange::new(check_in, check_out).unwrap()
}

// --- FlakyStore ---

/// Fault-injection wrapper around [`MemoryStore`].
///
/// Keeps failure simulation out of the production path: the engine under
/// test sees an ordinary [`ReservationStore`] that happens to fail the next
/// N transaction begins or commits with a chosen [`StoreError`].
pub struct FlakyStore {
    inner: MemoryStore,
    error: StoreError,
    fail_begins: AtomicU32,
    fail_commits: AtomicU32,
    begin_calls: AtomicU32,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore, error: StoreError) -> Self {
        Self {
            inner,
            error,
            fail_begins: AtomicU32::new(0),
            fail_commits: AtomicU32::new(0),
            begin_calls: AtomicU32::new(0),
        }
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn fail_next_begins(&self, n: u32) {
        self.fail_begins.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_commits(&self, n: u32) {
        self.fail_commits.store(n, Ordering::SeqCst);
    }

    pub fn begin_count(&self) -> u32 {
        self.begin_calls.load(Ordering::SeqCst)
    }

    fn take_one(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl ReservationStore for FlakyStore {
    fn begin(&self, max_wait: Duration) -> Result<Box<dyn StoreTxn + '_>, StoreError> {
        self.begin_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_one(&self.fail_begins) {
            return Err(self.error.clone());
        }
        // Whether this transaction's commit fails is decided up front so the
        // interleaving stays deterministic.
        let fail_commit = Self::take_one(&self.fail_commits).then(|| self.error.clone());
        let inner = self.inner.begin(max_wait)?;
        Ok(Box::new(FlakyTxn { inner, fail_commit }))
    }

    fn occupied_days(&self, room: RoomNumber, stay: &StayRange) -> Result<u64, StoreError> {
        self.inner.occupied_days(room, stay)
    }
}

struct FlakyTxn<'a> {
    inner: Box<dyn StoreTxn + 'a>,
    fail_commit: Option<StoreError>,
}

impl StoreTxn for FlakyTxn<'_> {
    fn room_type(&mut self, room: RoomNumber) -> Result<Option<RoomType>, StoreError> {
        self.inner.room_type(room)
    }

    fn booking(&mut self, id: &BookingId) -> Result<Option<Booking>, StoreError> {
        self.inner.booking(id)
    }

    fn insert_booking(&mut self, booking: &Booking) -> Result<(), StoreError> {
        self.inner.insert_booking(booking)
    }

    fn update_booking(&mut self, booking: &Booking) -> Result<(), StoreError> {
        self.inner.update_booking(booking)
    }

    fn update_booking_if_unmodified(
        &mut self,
        booking: &Booking,
        seen: NaiveDateTime,
    ) -> Result<bool, StoreError> {
        self.inner.update_booking_if_unmodified(booking, seen)
    }

    fn delete_booking(&mut self, id: &BookingId) -> Result<(), StoreError> {
        self.inner.delete_booking(id)
    }

    fn occupied_days_locked(
        &mut self,
        room: RoomNumber,
        stay: &StayRange,
        exclude: Option<&BookingId>,
    ) -> Result<u64, StoreError> {
        self.inner.occupied_days_locked(room, stay, exclude)
    }

    fn upsert_days(
        &mut self,
        room: RoomNumber,
        stay: &StayRange,
        owner: &BookingId,
    ) -> Result<(), StoreError> {
        self.inner.upsert_days(room, stay, owner)
    }

    fn release_days(&mut self, owner: &BookingId) -> Result<(), StoreError> {
        self.inner.release_days(owner)
    }

    fn ledger_entry(
        &mut self,
        room: RoomNumber,
        day: NaiveDate,
    ) -> Result<Option<LedgerEntry>, StoreError> {
        self.inner.ledger_entry(room, day)
    }

    fn receipt_for(&mut self, booking: &BookingId) -> Result<Option<Receipt>, StoreError> {
        self.inner.receipt_for(booking)
    }

    fn insert_receipt(&mut self, receipt: &Receipt) -> Result<(), StoreError> {
        self.inner.insert_receipt(receipt)
    }

    fn next_sequence(&mut self, year: i32) -> Result<u32, StoreError> {
        self.inner.next_sequence(year)
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        if let Some(error) = this.fail_commit {
            this.inner.rollback();
            return Err(error);
        }
        this.inner.commit()
    }

    fn rollback(self: Box<Self>) {
        let this = *self;
        this.inner.rollback();
    }
}
