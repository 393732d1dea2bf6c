//! Lock diagnostics

use crate::context::ContextId;
use crate::lock::LockId;

/// Point-in-time snapshot of a lock's internal state
///
/// Taken under the lock's critical region, so the fields are consistent with
/// each other, but may be stale by the time they are read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockStats {
    /// The lock the snapshot was taken from
    pub lock: LockId,
    /// Exclusive owner, if any
    pub owner: Option<ContextId>,
    /// Exclusive hold count of the owner
    pub holds: usize,
    /// Shared holds across all readers
    pub read_holds: usize,
    /// Contexts queued to acquire
    pub queued: usize,
    /// Contexts parked on any condition of the lock
    pub condition_waiters: usize,
    /// Whether the lock hands off fairly
    pub fair: bool,
}

impl LockStats {
    /// Whether the lock was held in any mode
    pub fn is_locked(&self) -> bool {
        self.owner.is_some() || self.read_holds > 0
    }
}
