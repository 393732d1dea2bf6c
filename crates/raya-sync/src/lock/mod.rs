//! Exclusive locks
//!
//! [`Lock`] is the contract every variant implements. Locks are owned by
//! execution contexts (threads, see [`crate::context`]): the context that
//! acquires must be the one that releases.
//!
//! | Operation              | Blocks  | Cancellable | Result                         |
//! |------------------------|---------|-------------|--------------------------------|
//! | `lock`                 | yes     | no          | `()`                           |
//! | `lock_interruptibly`   | yes     | yes         | `Ok(())` or `Cancelled`        |
//! | `try_lock`             | no      | -           | `bool`                         |
//! | `try_lock_for`         | bounded | yes         | `Ok(bool)` or `Cancelled`      |
//! | `unlock`               | no      | -           | `Ok(())` or `NotOwner`         |
//! | `new_condition`        | no      | -           | `Condition` or `CapabilityNotSupported` |

mod exclusive;
mod raw;
mod reentrant;

pub use exclusive::ExclusiveLock;
pub(crate) use raw::{Mode, RawLock};
pub use raw::LockId;
pub use reentrant::ReentrantLock;

use crate::condition::Condition;
use crate::error::LockResult;
use std::time::{Duration, Instant};

/// Mutual-exclusion lock owned by an execution context
///
/// A successful acquire happens-after the release that made the lock
/// available, so every write made before a release is visible after the
/// matching acquire.
pub trait Lock {
    /// Acquire the lock, blocking uninterruptibly until it is available.
    ///
    /// A cancellation signal arriving during the wait stays pending.
    ///
    /// # Panics
    ///
    /// Variants that detect a provable self-deadlock panic instead of
    /// blocking forever (see [`ExclusiveLock`]).
    fn lock(&self);

    /// Acquire the lock unless the calling context is cancelled.
    ///
    /// Fails with [`LockError::Cancelled`](crate::LockError::Cancelled) if a
    /// signal is pending on entry or arrives while queued. The signal is
    /// cleared and the lock is left as if the call was never made.
    fn lock_interruptibly(&self) -> LockResult<()>;

    /// Acquire the lock only if it is free right now. Never blocks.
    fn try_lock(&self) -> bool;

    /// Acquire the lock, waiting at most `timeout`.
    ///
    /// A zero timeout behaves like [`try_lock`](Lock::try_lock) and never
    /// waits. Cancellation is handled as in
    /// [`lock_interruptibly`](Lock::lock_interruptibly), including a signal
    /// pending on entry with a zero timeout.
    fn try_lock_for(&self, timeout: Duration) -> LockResult<bool>;

    /// Acquire the lock, waiting until `deadline` at the latest.
    fn try_lock_until(&self, deadline: Instant) -> LockResult<bool> {
        self.try_lock_for(deadline.saturating_duration_since(Instant::now()))
    }

    /// Release one hold on the lock.
    ///
    /// Fails with [`LockError::NotOwner`](crate::LockError::NotOwner),
    /// changing nothing, if the calling context does not hold it.
    fn unlock(&self) -> LockResult<()>;

    /// Create a condition bound to this lock.
    fn new_condition(&self) -> LockResult<Condition>;
}
