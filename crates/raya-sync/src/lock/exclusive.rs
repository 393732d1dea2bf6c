//! Non-reentrant exclusive lock

use super::{Lock, LockId, Mode, RawLock};
use crate::condition::Condition;
use crate::context::{Context, ContextId};
use crate::error::LockResult;
use crate::options::LockOptions;
use crate::stats::LockStats;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Non-reentrant mutual-exclusion lock
///
/// The hold count is always 0 or 1. An acquire by the current owner can
/// never succeed, so it is reported instead of blocking forever:
///
/// - [`Lock::try_lock`] returns `false`
/// - [`Lock::lock_interruptibly`] and [`Lock::try_lock_for`] fail with
///   [`LockError::Deadlock`](crate::LockError::Deadlock)
/// - [`Lock::lock`] panics
pub struct ExclusiveLock {
    raw: Arc<RawLock>,
}

impl ExclusiveLock {
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
            raw: Arc::new(RawLock::new(options, false)),
        }
    }

    /// Get the lock ID
    pub fn id(&self) -> LockId {
        self.raw.id()
    }

    /// Whether any context holds the lock
    pub fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }

    /// Whether the calling context holds the lock
    pub fn is_held_by_current(&self) -> bool {
        self.raw.is_held_by(Context::current_id())
    }

    /// The owning context, if any
    pub fn owner(&self) -> Option<ContextId> {
        self.raw.owner()
    }

    /// Number of contexts queued to acquire
    pub fn queue_len(&self) -> usize {
        self.raw.queue_len()
    }

    /// Snapshot of the lock's state
    pub fn stats(&self) -> LockStats {
        self.raw.stats()
    }
}

impl Default for ExclusiveLock {
    fn default() -> Self {
        Self::new()
    }
}

impl Lock for ExclusiveLock {
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

impl fmt::Debug for ExclusiveLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExclusiveLock")
            .field("id", &self.raw.id())
            .field("owner", &self.raw.owner())
            .finish()
    }
}
