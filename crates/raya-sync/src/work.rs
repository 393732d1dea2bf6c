//! Units of work
//!
//! A unit of work is a single action with no arguments and no result, run
//! for its side effects. Any `FnMut()` closure is one.

use crate::error::LockResult;
use crate::guard::LockExt;
use crate::lock::Lock;

/// A single action to run on some execution context
pub trait UnitOfWork {
    /// Perform the action
    fn run(&mut self);
}

impl<F: FnMut()> UnitOfWork for F {
    fn run(&mut self) {
        self()
    }
}

/// Run `work` while holding `lock`
///
/// The lock is released on every exit path, including a panic in `work`.
pub fn run_locked<L, W>(lock: &L, work: &mut W)
where
    L: Lock + ?Sized,
    W: UnitOfWork + ?Sized,
{
    let _guard = lock.guard();
    work.run();
}

/// Run `work` while holding `lock`, unless cancelled before acquiring it
///
/// Once the lock is held the work always runs to completion.
pub fn run_locked_interruptibly<L, W>(lock: &L, work: &mut W) -> LockResult<()>
where
    L: Lock + ?Sized,
    W: UnitOfWork + ?Sized,
{
    let _guard = lock.guard_interruptibly()?;
    work.run();
    Ok(())
}
