//! Transactional retry with bounded exponential backoff.
//!
//! The [`TxnRunner`] executes a unit of work against a fresh store
//! transaction per attempt. Classification of failures is the load-bearing
//! decision here: only typed transient conflicts
//! ([`StoreError::is_transient`](crate::store::StoreError::is_transient))
//! are retried, everything else propagates unchanged after rollback. Getting
//! this wrong either masks real bugs behind silent retries or fails spuriously
//! on ordinary contention.

use std::time::Duration;

use log::debug;

use crate::context::OpContext;
use crate::errors::{BookingError, Result};
use crate::store::{ReservationStore, StoreTxn};

/// Upper bound on how long a transaction begin may wait for the store when
/// the caller supplied no deadline of its own.
const MAX_BEGIN_WAIT: Duration = Duration::from_secs(30);

/// Runs transactional closures with bounded retry on transient conflicts.
#[derive(Debug, Clone)]
pub struct TxnRunner {
    max_attempts: u32,
    backoff_base: Duration,
}

impl TxnRunner {
    /// `max_attempts` is clamped to at least one attempt.
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Executes `body` inside a store transaction, committing on success.
    ///
    /// Each attempt sees a fresh transaction handle. After a transient
    /// failure the runner sleeps `backoff_base × 2^(attempt-1)` and tries
    /// again, up to `max_attempts`; exhaustion returns
    /// [`BookingError::RetryExhausted`] wrapping the last underlying cause.
    /// Non-transient errors return immediately after rollback. The backoff
    /// sleep and the transaction begin both respect `ctx`.
    pub fn run<T>(
        &self,
        ctx: &OpContext,
        store: &dyn ReservationStore,
        mut body: impl FnMut(&mut dyn StoreTxn) -> Result<T>,
    ) -> Result<T> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            ctx.checkpoint()?;
            match self.attempt(ctx, store, &mut body) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    debug!(
                        "attempt {attempt}/{} hit transient conflict: {e}",
                        self.max_attempts
                    );
                    if attempt >= self.max_attempts {
                        return Err(BookingError::RetryExhausted {
                            attempts: attempt,
                            source: Box::new(e),
                        });
                    }
                    ctx.sleep(self.backoff_base * 2u32.pow(attempt - 1))?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn attempt<T>(
        &self,
        ctx: &OpContext,
        store: &dyn ReservationStore,
        body: &mut impl FnMut(&mut dyn StoreTxn) -> Result<T>,
    ) -> Result<T> {
        let mut txn = store.begin(ctx.clamp(MAX_BEGIN_WAIT))?;
        match body(&mut *txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(e) => {
                txn.rollback();
                Err(e)
            }
        }
    }
}
