//! RAII guards for automatic unlock

use crate::error::LockResult;
use crate::lock::Lock;
use std::marker::PhantomData;
use std::time::Duration;

/// RAII guard for any [`Lock`] (auto-unlocks on drop)
///
/// Releases exactly one hold when dropped, including during unwinding. The
/// guard cannot be sent to another thread, since only the acquiring context
/// may release.
#[must_use = "if unused the lock will immediately unlock"]
pub struct LockGuard<'a, L: Lock + ?Sized> {
    lock: &'a L,
    /// Whether the guard has been manually unlocked
    unlocked: bool,
    // !Send
    _marker: PhantomData<*const ()>,
}

impl<'a, L: Lock + ?Sized> LockGuard<'a, L> {
    /// Wrap a hold the calling context already has on `lock`
    pub(crate) fn new(lock: &'a L) -> Self {
        Self {
            lock,
            unlocked: false,
            _marker: PhantomData,
        }
    }

    /// The guarded lock
    pub fn lock(&self) -> &'a L {
        self.lock
    }

    /// Manually unlock early (before drop)
    pub fn unlock(mut self) -> LockResult<()> {
        self.unlocked = true;
        self.lock.unlock()
    }
}

impl<L: Lock + ?Sized> Drop for LockGuard<'_, L> {
    fn drop(&mut self) {
        if !self.unlocked {
            // The guard only exists while its context holds the lock
            if let Err(err) = self.lock.unlock() {
                tracing::warn!(error = %err, "guard failed to release lock");
            }
        }
    }
}

/// Guard-returning acquire operations, available on every [`Lock`]
pub trait LockExt: Lock {
    /// Acquire uninterruptibly and return a guard
    fn guard(&self) -> LockGuard<'_, Self> {
        self.lock();
        LockGuard::new(self)
    }

    /// Acquire unless cancelled and return a guard
    fn guard_interruptibly(&self) -> LockResult<LockGuard<'_, Self>> {
        self.lock_interruptibly()?;
        Ok(LockGuard::new(self))
    }

    /// Acquire without blocking; `None` if the lock is unavailable
    fn try_guard(&self) -> Option<LockGuard<'_, Self>> {
        if self.try_lock() {
            Some(LockGuard::new(self))
        } else {
            None
        }
    }

    /// Acquire within `timeout`; `Ok(None)` if it elapsed
    fn try_guard_for(&self, timeout: Duration) -> LockResult<Option<LockGuard<'_, Self>>> {
        if self.try_lock_for(timeout)? {
            Ok(Some(LockGuard::new(self)))
        } else {
            Ok(None)
        }
    }
}

impl<L: Lock + ?Sized> LockExt for L {}
