pub mod context;
pub mod engine;
pub mod errors;
pub mod ledger;
pub mod locking;
pub mod model;
pub mod retry;
pub mod store;

// Re-export key types and structs for easier access
pub use context::{CancelHandle, OpContext};
pub use engine::{BookingEngine, BookingRequest, EngineConfig, prelude};
pub use errors::{BookingError, Result};
pub use ledger::{DayStatus, LedgerEntry};
pub use locking::{LockGuard, LockKey, LockRegistry, ResourceKind};
pub use model::{Booking, BookingId, Receipt, RoomNumber, RoomType, StayRange};
pub use retry::TxnRunner;
pub use store::memory::MemoryStore;
pub use store::{Clock, ReservationStore, StoreError, StoreTxn, SystemClock};

// Define the UpdateStrategy enum here as it's a core part of the public API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
///
/// Concurrency strategies available for booking updates
pub enum UpdateStrategy {
    ///
    /// [UpdateStrategy::PessimisticLock] serializes date changes behind the
    /// in-process booking and room locks and re-checks the availability
    /// ledger under an exclusive row read before writing. Contending
    /// operations queue rather than conflict, which makes this the default
    /// production strategy.
    PessimisticLock,
    ///
    /// [UpdateStrategy::OptimisticVersion] takes no in-process locks.
    /// The booking is read together with its last-modified marker, changes
    /// are applied in memory, and the write commits only if no concurrent
    /// writer moved the marker in the meantime; otherwise the caller receives
    /// a stale-write conflict and decides whether to re-read and retry.
    /// Lower contention, caller-visible retry responsibility. Do not mix
    /// both strategies against the same booking at runtime: uncoordinated,
    /// they reintroduce the race each is meant to prevent.
    OptimisticVersion,
}
