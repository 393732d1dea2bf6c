//! Raya synchronization primitives
//!
//! This crate provides context-aware blocking locks:
//! - **Locks**: [`ReentrantLock`], [`ExclusiveLock`] and the
//!   [`ReadWriteLock`] pair, all implementing the [`Lock`] contract
//!   (blocking, interruptible, non-blocking and timed acquisition)
//! - **Conditions**: [`Condition`] wait/notify endpoints bound to a lock
//! - **Contexts**: per-thread [`Context`] identity and cooperative
//!   cancellation
//! - **Guards**: RAII [`LockGuard`] via [`LockExt`]
//!
//! # Example
//!
//! ```rust,ignore
//! use raya_sync::{Lock, LockExt, ReentrantLock};
//!
//! let lock = ReentrantLock::new();
//! let ready = lock.new_condition()?;
//!
//! let _guard = lock.guard();
//! while !is_ready() {
//!     ready.wait()?;
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod condition;
pub mod context;
pub mod error;
pub mod guard;
pub mod lock;
pub mod options;
pub mod ownership;
pub mod rwlock;
pub mod stats;
pub mod work;

pub use condition::{Condition, ConditionId};
pub use context::{Context, ContextHandle, ContextId, ContextRegistry};
pub use error::{LockError, LockResult};
pub use guard::{LockExt, LockGuard};
pub use lock::{ExclusiveLock, Lock, LockId, ReentrantLock};
pub use options::{Fairness, LockOptions};
pub use ownership::OwnershipRecord;
pub use rwlock::{ReadLock, ReadWriteLock, WriteLock};
pub use stats::LockStats;
pub use work::{run_locked, run_locked_interruptibly, UnitOfWork};
