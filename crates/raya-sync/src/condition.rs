//! Condition variables bound to a lock
//!
//! A [`Condition`] is created from a lock with [`Lock::new_condition`] and
//! stays bound to that lock for its whole life. Waiting releases every hold
//! the caller has on the lock in one step, parks, and re-acquires the same
//! number of holds before returning, whether the wait ended by signal,
//! timeout or cancellation.
//!
//! Waiters are woken in FIFO order. A signalled waiter joins the back of the
//! lock's acquire queue and runs once the signalling context releases the
//! lock.
//!
//! Signals are not remembered: a `signal` with nobody waiting is a no-op, and
//! a waiter may find its predicate still false after waking. Always wait in
//! a loop:
//!
//! ```ignore
//! lock.lock();
//! while !ready.load(Ordering::Relaxed) {
//!     cond.wait()?;
//! }
//! lock.unlock()?;
//! ```
//!
//! [`Lock::new_condition`]: crate::Lock::new_condition

use crate::error::LockResult;
use crate::lock::{LockId, RawLock};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Unique identifier for a Condition
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ConditionId(u64);

static NEXT_CONDITION_ID: AtomicU64 = AtomicU64::new(1);

impl ConditionId {
    fn next() -> Self {
        ConditionId(NEXT_CONDITION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Wait/notify endpoint bound to one lock
///
/// Every operation requires the calling context to hold the bound lock
/// exclusively and fails with
/// [`LockError::NotOwner`](crate::LockError::NotOwner) otherwise.
pub struct Condition {
    id: ConditionId,
    raw: Arc<RawLock>,
}

impl Condition {
    pub(crate) fn new(raw: Arc<RawLock>) -> Self {
        let id = ConditionId::next();
        raw.register_condition(id);
        Self { id, raw }
    }

    /// Get the condition ID
    pub fn id(&self) -> ConditionId {
        self.id
    }

    /// ID of the bound lock
    pub fn lock_id(&self) -> LockId {
        self.raw.id()
    }

    /// Release the lock and wait for a signal.
    ///
    /// Fails with [`LockError::Cancelled`](crate::LockError::Cancelled) if a
    /// cancellation signal is pending on entry or arrives before a signal
    /// does. The lock is re-held with its original hold count in every case.
    pub fn wait(&self) -> LockResult<()> {
        self.raw.wait_on(self.id, true, None).map(|_| ())
    }

    /// Release the lock and wait for a signal, ignoring cancellation.
    ///
    /// A cancellation signal arriving meanwhile stays pending.
    pub fn wait_uninterruptibly(&self) -> LockResult<()> {
        self.raw.wait_on(self.id, false, None).map(|_| ())
    }

    /// Release the lock and wait for a signal for at most `timeout`.
    ///
    /// Returns `true` if a signal ended the wait and `false` if the timeout
    /// elapsed first. Parker wakeups that are neither are absorbed, so
    /// `true` always means a signal was consumed. The lock is always released
    /// and re-acquired, even for a zero timeout.
    pub fn wait_for(&self, timeout: Duration) -> LockResult<bool> {
        self.raw
            .wait_on(self.id, true, Instant::now().checked_add(timeout))
    }

    /// Release the lock and wait for a signal until `deadline`.
    ///
    /// Same result as [`wait_for`](Condition::wait_for).
    pub fn wait_until(&self, deadline: Instant) -> LockResult<bool> {
        self.raw.wait_on(self.id, true, Some(deadline))
    }

    /// Wake the longest-waiting context, if any
    pub fn signal(&self) -> LockResult<()> {
        self.raw.signal(self.id, false).map(|_| ())
    }

    /// Wake every waiting context
    ///
    /// They re-acquire the lock one at a time, in the order they started
    /// waiting.
    pub fn signal_all(&self) -> LockResult<()> {
        self.raw.signal(self.id, true).map(|_| ())
    }

    /// Number of contexts waiting on this condition
    pub fn waiter_count(&self) -> LockResult<usize> {
        self.raw.condition_waiters(self.id)
    }

    /// Whether any context is waiting on this condition
    pub fn has_waiters(&self) -> LockResult<bool> {
        self.waiter_count().map(|count| count > 0)
    }
}

impl Drop for Condition {
    fn drop(&mut self) {
        self.raw.unregister_condition(self.id);
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("id", &self.id)
            .field("lock", &self.raw.id())
            .finish()
    }
}
