//! Shared/exclusive lock pair
//!
//! A [`ReadWriteLock`] hands out two [`Lock`] views over one state machine:
//! any number of contexts may hold the [`ReadLock`] at once, while the
//! [`WriteLock`] is exclusive. Both are reentrant. The write holder may also
//! take the read lock (downgrading by releasing the write lock afterwards);
//! taking the write lock while holding only the read lock would never
//! succeed and is reported as a deadlock. So is waiting on a write-lock
//! condition while also holding the read lock.
//!
//! Only the write lock supports conditions.

use crate::condition::Condition;
use crate::context::Context;
use crate::error::{LockError, LockResult};
use crate::lock::{Lock, LockId, Mode, RawLock};
use crate::options::LockOptions;
use crate::stats::LockStats;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Reentrant shared/exclusive lock
///
/// With barging hand-off a new reader does not overtake a writer at the head
/// of the queue, so a steady stream of readers cannot starve writers.
pub struct ReadWriteLock {
    raw: Arc<RawLock>,
}

impl ReadWriteLock {
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

    /// Shared view
    pub fn read(&self) -> ReadLock<'_> {
        ReadLock { rw: self }
    }

    /// Exclusive view
    pub fn write(&self) -> WriteLock<'_> {
        WriteLock { rw: self }
    }

    /// Get the lock ID
    pub fn id(&self) -> LockId {
        self.raw.id()
    }

    /// Whether the lock hands off fairly
    pub fn is_fair(&self) -> bool {
        self.raw.is_fair()
    }

    /// Total read holds across all contexts
    pub fn read_holds(&self) -> usize {
        self.raw.read_holds()
    }

    /// Read holds of the calling context
    pub fn read_hold_count(&self) -> usize {
        self.raw.read_hold_count(Context::current_id())
    }

    /// Whether any context holds the write lock
    pub fn is_write_locked(&self) -> bool {
        self.raw.is_write_locked()
    }

    /// Whether the calling context holds the write lock
    pub fn is_write_held_by_current(&self) -> bool {
        self.raw.is_held_by(Context::current_id())
    }

    /// Write holds of the calling context
    pub fn write_hold_count(&self) -> usize {
        self.raw.hold_count(Context::current_id())
    }

    /// Number of contexts queued in either mode
    pub fn queue_len(&self) -> usize {
        self.raw.queue_len()
    }

    /// Snapshot of the lock's state
    pub fn stats(&self) -> LockStats {
        self.raw.stats()
    }
}

impl Default for ReadWriteLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReadWriteLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadWriteLock")
            .field("id", &self.raw.id())
            .field("writer", &self.raw.owner())
            .field("read_holds", &self.raw.read_holds())
            .finish()
    }
}

/// Shared view of a [`ReadWriteLock`]
#[derive(Debug, Clone, Copy)]
pub struct ReadLock<'a> {
    rw: &'a ReadWriteLock,
}

impl Lock for ReadLock<'_> {
    fn lock(&self) {
        self.rw.raw.lock(Mode::Shared);
    }

    fn lock_interruptibly(&self) -> LockResult<()> {
        self.rw.raw.acquire(Mode::Shared, true, None).map(|_| ())
    }

    fn try_lock(&self) -> bool {
        self.rw.raw.try_acquire(Mode::Shared)
    }

    fn try_lock_for(&self, timeout: Duration) -> LockResult<bool> {
        self.rw.raw.try_acquire_for(Mode::Shared, timeout)
    }

    fn unlock(&self) -> LockResult<()> {
        self.rw.raw.release(Mode::Shared)
    }

    /// Always fails: shared holders cannot wait on a condition
    fn new_condition(&self) -> LockResult<Condition> {
        Err(LockError::CapabilityNotSupported("conditions on a read lock"))
    }
}

/// Exclusive view of a [`ReadWriteLock`]
#[derive(Debug, Clone, Copy)]
pub struct WriteLock<'a> {
    rw: &'a ReadWriteLock,
}

impl Lock for WriteLock<'_> {
    fn lock(&self) {
        self.rw.raw.lock(Mode::Exclusive);
    }

    fn lock_interruptibly(&self) -> LockResult<()> {
        self.rw.raw.acquire(Mode::Exclusive, true, None).map(|_| ())
    }

    fn try_lock(&self) -> bool {
        self.rw.raw.try_acquire(Mode::Exclusive)
    }

    fn try_lock_for(&self, timeout: Duration) -> LockResult<bool> {
        self.rw.raw.try_acquire_for(Mode::Exclusive, timeout)
    }

    fn unlock(&self) -> LockResult<()> {
        self.rw.raw.release(Mode::Exclusive)
    }

    fn new_condition(&self) -> LockResult<Condition> {
        Ok(Condition::new(self.rw.raw.clone()))
    }
}
