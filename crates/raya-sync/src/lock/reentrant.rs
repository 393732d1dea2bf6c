//! Reentrant exclusive lock

use super::{Lock, LockId, Mode, RawLock};
use crate::condition::Condition;
use crate::context::{Context, ContextId};
use crate::error::LockResult;
use crate::options::LockOptions;
use crate::stats::LockStats;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Reentrant mutual-exclusion lock
///
/// The owner may acquire again without blocking; each acquire increments the
/// hold count and the lock is released to others only once the count drops
/// back to zero.
///
/// Hand-off follows the lock's [`Fairness`](crate::Fairness): barging by
/// default, strict FIFO with [`ReentrantLock::fair`]. [`Lock::try_lock`]
/// barges on both.
pub struct ReentrantLock {
    raw: Arc<RawLock>,
}

impl ReentrantLock {
    /// Create a barging lock
    pub fn new() -> Self {
        Self::with_options(LockOptions::default())
    }

    /// Create a fair (FIFO hand-off) lock
    pub fn fair() -> Self {
        Self::with_options(LockOptions::fair())
    }

    /// Create a lock with explicit options
    pub fn with_options(options: LockOptions) -> Self {
        Self {
            raw: Arc::new(RawLock::new(options, true)),
        }
    }

    /// Get the lock ID
    pub fn id(&self) -> LockId {
        self.raw.id()
    }

    /// Whether the lock hands off fairly
    pub fn is_fair(&self) -> bool {
        self.raw.is_fair()
    }

    /// Whether any context holds the lock
    pub fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }

    /// Whether the calling context holds the lock
    pub fn is_held_by_current(&self) -> bool {
        self.raw.is_held_by(Context::current_id())
    }

    /// Holds of the calling context, 0 if it is not the owner
    pub fn hold_count(&self) -> usize {
        self.raw.hold_count(Context::current_id())
    }

    /// The owning context, if any
    pub fn owner(&self) -> Option<ContextId> {
        self.raw.owner()
    }

    /// Number of contexts queued to acquire
    pub fn queue_len(&self) -> usize {
        self.raw.queue_len()
    }

    /// Whether any context is queued to acquire
    pub fn has_queued_waiters(&self) -> bool {
        self.queue_len() > 0
    }

    /// Snapshot of the lock's state
    pub fn stats(&self) -> LockStats {
        self.raw.stats()
    }
}

impl Default for ReentrantLock {
    fn default() -> Self {
        Self::new()
    }
}

impl Lock for ReentrantLock {
    fn lock(&self) {
        self.raw.lock(Mode::Exclusive);
    }

    fn lock_interruptibly(&self) -> LockResult<()> {
        self.raw.acquire(Mode::Exclusive, true, None).map(|_| ())
    }

    fn try_lock(&self) -> bool {
        self.raw.try_acquire(Mode::Exclusive)
    }

    fn try_lock_for(&self, timeout: Duration) -> LockResult<bool> {
        self.raw.try_acquire_for(Mode::Exclusive, timeout)
    }

    fn unlock(&self) -> LockResult<()> {
        self.raw.release(Mode::Exclusive)
    }

    fn new_condition(&self) -> LockResult<Condition> {
        Ok(Condition::new(self.raw.clone()))
    }
}

impl fmt::Debug for ReentrantLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReentrantLock")
            .field("id", &self.raw.id())
            .field("owner", &self.raw.owner())
            .field("fair", &self.raw.is_fair())
            .finish()
    }
}
