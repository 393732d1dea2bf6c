//! Wait-queue state machine shared by every lock variant
//!
//! All lock state (owner record, hold counts, the acquire queue and the
//! per-condition wait queues) lives in one [`LockState`] behind a
//! `parking_lot` mutex. Every transition happens inside that critical region,
//! which also gives release → acquire its happens-before edge. Blocked
//! contexts park on their own parker outside the region.
//!
//! A waiter node moves through three statuses:
//!
//! - `WAITING`: parked on a condition queue
//! - `QUEUED`: on the acquire queue
//! - `GRANTED`: ownership was handed to it by a fair release
//!
//! Only the critical region reads or writes a waiter's status.

use crate::condition::ConditionId;
use crate::context::{Context, ContextHandle, ContextId};
use crate::error::{LockError, LockResult};
use crate::options::LockOptions;
use crate::ownership::OwnershipRecord;
use crate::stats::LockStats;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Unique identifier for a lock
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct LockId(u64);

static NEXT_LOCK_ID: AtomicU64 = AtomicU64::new(1);

impl LockId {
    fn next() -> Self {
        LockId(NEXT_LOCK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lock#{}", self.0)
    }
}

/// How a context holds the lock
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Mode {
    Exclusive,
    Shared,
}

const WAITING: u8 = 0;
const QUEUED: u8 = 1;
const GRANTED: u8 = 2;

struct Waiter {
    context: ContextHandle,
    mode: Mode,
    /// Hold count to install on acquisition
    holds: usize,
    status: AtomicU8,
}

impl Waiter {
    fn new(context: ContextHandle, mode: Mode, holds: usize, status: u8) -> Arc<Self> {
        Arc::new(Self {
            context,
            mode,
            holds,
            status: AtomicU8::new(status),
        })
    }

    fn status(&self) -> u8 {
        self.status.load(Ordering::Relaxed)
    }

    fn set_status(&self, status: u8) {
        self.status.store(status, Ordering::Relaxed);
    }
}

enum Attempt {
    Taken,
    Blocked,
    Deadlock,
}

#[derive(Default)]
struct LockState {
    ownership: OwnershipRecord,
    /// Exclusive hold count, nonzero iff `ownership` has an owner
    holds: usize,
    /// Shared hold count per reading context
    readers: FxHashMap<ContextId, usize>,
    queue: VecDeque<Arc<Waiter>>,
    conditions: FxHashMap<ConditionId, VecDeque<Arc<Waiter>>>,
}

impl LockState {
    fn is_held(&self) -> bool {
        !self.ownership.is_free() || !self.readers.is_empty()
    }

    fn not_owner(&self, caller: ContextId) -> LockError {
        LockError::NotOwner {
            caller,
            owner: self.ownership.owner(),
        }
    }

    /// Handle an acquire by a context that already holds the lock
    fn reenter(&mut self, context: ContextId, mode: Mode, reentrant: bool) -> Option<Attempt> {
        match mode {
            Mode::Exclusive if self.ownership.is_owned_by(context) => {
                if reentrant {
                    self.holds += 1;
                    Some(Attempt::Taken)
                } else {
                    Some(Attempt::Deadlock)
                }
            }
            // Upgrading a shared hold can never succeed
            Mode::Exclusive if self.readers.contains_key(&context) => Some(Attempt::Deadlock),
            Mode::Exclusive => None,
            Mode::Shared => {
                if let Some(count) = self.readers.get_mut(&context) {
                    *count += 1;
                    Some(Attempt::Taken)
                } else if self.ownership.is_owned_by(context) {
                    self.readers.insert(context, 1);
                    Some(Attempt::Taken)
                } else {
                    None
                }
            }
        }
    }

    /// Whether a context may take the lock in `mode`.
    ///
    /// `position` is the waiter's index in the acquire queue, `None` for a
    /// context that is not queued.
    fn eligible(&self, mode: Mode, position: Option<usize>, fair: bool) -> bool {
        let free = match mode {
            Mode::Exclusive => self.ownership.is_free() && self.readers.is_empty(),
            Mode::Shared => self.ownership.is_free(),
        };
        if !free {
            return false;
        }
        if fair {
            return position.unwrap_or(self.queue.len()) == 0;
        }
        match (mode, position) {
            (Mode::Exclusive, _) => true,
            // Readers don't barge past a queued writer
            (Mode::Shared, None) => self.queue.front().map_or(true, |w| w.mode == Mode::Shared),
            (Mode::Shared, Some(i)) => !self.queue.iter().take(i).any(|w| w.mode == Mode::Exclusive),
        }
    }

    fn take(&mut self, context: ContextId, mode: Mode, holds: usize) {
        match mode {
            Mode::Exclusive => {
                self.ownership.set_owner(Some(context));
                self.holds = holds;
            }
            Mode::Shared => {
                *self.readers.entry(context).or_insert(0) += holds;
            }
        }
    }

    fn attempt(&mut self, context: ContextId, mode: Mode, reentrant: bool, fair: bool) -> Attempt {
        if let Some(attempt) = self.reenter(context, mode, reentrant) {
            return attempt;
        }
        if self.eligible(mode, None, fair) {
            self.take(context, mode, 1);
            Attempt::Taken
        } else {
            Attempt::Blocked
        }
    }

    fn position(&self, waiter: &Arc<Waiter>) -> Option<usize> {
        self.queue.iter().position(|w| Arc::ptr_eq(w, waiter))
    }

    /// Remove an abandoned waiter and pass on any wakeup it may have consumed
    fn dequeue(&mut self, waiter: &Arc<Waiter>, fair: bool) {
        if let Some(position) = self.position(waiter) {
            self.queue.remove(position);
        }
        self.wake_next(fair);
    }

    /// Fair: grant the lock to the head of the queue (and the readers directly
    /// behind a reader head). Barging: unpark them and let them contend.
    fn wake_next(&mut self, fair: bool) {
        if fair {
            while let Some(mode) = self.queue.front().map(|w| w.mode) {
                if !self.eligible(mode, Some(0), true) {
                    break;
                }
                let Some(waiter) = self.queue.pop_front() else {
                    break;
                };
                self.take(waiter.context.id(), mode, waiter.holds);
                waiter.set_status(GRANTED);
                tracing::trace!(context = %waiter.context.id(), ?mode, "lock handed off");
                waiter.context.unpark();
                if mode == Mode::Exclusive {
                    break;
                }
            }
        } else {
            for (i, waiter) in self.queue.iter().enumerate() {
                if (i > 0 && waiter.mode == Mode::Exclusive) || !self.eligible(waiter.mode, Some(i), false) {
                    break;
                }
                waiter.context.unpark();
                if waiter.mode == Mode::Exclusive {
                    break;
                }
            }
        }
    }

    fn release(&mut self, context: ContextId, mode: Mode, fair: bool) -> LockResult<bool> {
        let freed = match mode {
            Mode::Exclusive => {
                if !self.ownership.is_owned_by(context) {
                    return Err(self.not_owner(context));
                }
                self.holds -= 1;
                if self.holds == 0 {
                    self.ownership.clear();
                    true
                } else {
                    false
                }
            }
            Mode::Shared => {
                let Some(count) = self.readers.get_mut(&context) else {
                    return Err(self.not_owner(context));
                };
                *count -= 1;
                if *count == 0 {
                    self.readers.remove(&context);
                    true
                } else {
                    false
                }
            }
        };
        if freed {
            self.wake_next(fair);
        }
        Ok(freed)
    }

    /// Move a timed-out or cancelled condition waiter to the acquire queue
    fn abandon_condition(&mut self, condition: ConditionId, waiter: &Arc<Waiter>, fair: bool) {
        if let Some(queue) = self.conditions.get_mut(&condition) {
            queue.retain(|w| !Arc::ptr_eq(w, waiter));
        }
        waiter.set_status(QUEUED);
        self.queue.push_back(waiter.clone());
        self.wake_next(fair);
    }
}

/// The lock core behind [`ReentrantLock`](crate::ReentrantLock),
/// [`ExclusiveLock`](crate::ExclusiveLock) and
/// [`ReadWriteLock`](crate::ReadWriteLock)
pub(crate) struct RawLock {
    id: LockId,
    options: LockOptions,
    reentrant: bool,
    state: Mutex<LockState>,
}

impl RawLock {
    pub(crate) fn new(options: LockOptions, reentrant: bool) -> Self {
        Self {
            id: LockId::next(),
            options,
            reentrant,
            state: Mutex::new(LockState::default()),
        }
    }

    pub(crate) fn id(&self) -> LockId {
        self.id
    }

    pub(crate) fn is_fair(&self) -> bool {
        self.options.is_fair()
    }

    /// Non-blocking acquire. Barges even on a fair lock.
    pub(crate) fn try_acquire(&self, mode: Mode) -> bool {
        let context = Context::current_id();
        matches!(
            self.state.lock().attempt(context, mode, self.reentrant, false),
            Attempt::Taken
        )
    }

    /// Uninterruptible blocking acquire
    ///
    /// # Panics
    ///
    /// Panics if the acquire can provably never succeed: a non-reentrant lock
    /// taken again by its owner, or a shared hold upgraded to exclusive.
    pub(crate) fn lock(&self, mode: Mode) {
        if let Err(err) = self.acquire(mode, false, None) {
            panic!("{}: {err}", self.id);
        }
    }

    /// Bounded acquire; a zero timeout never waits
    pub(crate) fn try_acquire_for(&self, mode: Mode, timeout: Duration) -> LockResult<bool> {
        if timeout.is_zero() {
            let context = Context::current();
            if context.take_cancellation() {
                return Err(LockError::Cancelled(context.id()));
            }
            return Ok(self.try_acquire(mode));
        }
        self.acquire(mode, true, Instant::now().checked_add(timeout))
    }

    /// Blocking acquire. Returns `Ok(false)` only when `deadline` passed.
    pub(crate) fn acquire(
        &self,
        mode: Mode,
        interruptible: bool,
        deadline: Option<Instant>,
    ) -> LockResult<bool> {
        let context = Context::current();
        let id = context.id();
        if interruptible && context.take_cancellation() {
            tracing::trace!(lock = %self.id, context = %id, "cancelled before acquire");
            return Err(LockError::Cancelled(id));
        }

        let fair = self.is_fair();
        if !fair {
            for _ in 0..self.options.spin_limit {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    break;
                }
                let attempt = self.state.lock().attempt(id, mode, self.reentrant, false);
                match attempt {
                    Attempt::Taken => return Ok(true),
                    Attempt::Deadlock => return Err(LockError::Deadlock(id)),
                    Attempt::Blocked => std::hint::spin_loop(),
                }
            }
        }

        let waiter = {
            let mut state = self.state.lock();
            match state.attempt(id, mode, self.reentrant, fair) {
                Attempt::Taken => return Ok(true),
                Attempt::Deadlock => {
                    tracing::debug!(lock = %self.id, context = %id, "self-deadlock detected");
                    return Err(LockError::Deadlock(id));
                }
                Attempt::Blocked => {}
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(false);
            }
            let waiter = Waiter::new(context, mode, 1, QUEUED);
            state.queue.push_back(waiter.clone());
            tracing::trace!(lock = %self.id, context = %id, ?mode, queued = state.queue.len(), "parking");
            waiter
        };
        self.wait_for_grant(&waiter, interruptible, deadline)
    }

    /// Park a queued waiter until it owns the lock, gives up on cancellation,
    /// or its deadline passes
    fn wait_for_grant(
        &self,
        waiter: &Arc<Waiter>,
        interruptible: bool,
        deadline: Option<Instant>,
    ) -> LockResult<bool> {
        let fair = self.is_fair();
        let id = waiter.context.id();
        loop {
            {
                let mut state = self.state.lock();
                // A hand-off wins over a racing cancellation or timeout
                if waiter.status() == GRANTED {
                    return Ok(true);
                }
                if !fair {
                    if let Some(position) = state.position(waiter) {
                        if state.eligible(waiter.mode, Some(position), false) {
                            state.queue.remove(position);
                            state.take(id, waiter.mode, waiter.holds);
                            return Ok(true);
                        }
                    }
                }
                if interruptible && waiter.context.take_cancellation() {
                    state.dequeue(waiter, fair);
                    tracing::trace!(lock = %self.id, context = %id, "acquire cancelled");
                    return Err(LockError::Cancelled(id));
                }
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    state.dequeue(waiter, fair);
                    tracing::trace!(lock = %self.id, context = %id, "acquire timed out");
                    return Ok(false);
                }
            }
            match deadline {
                Some(deadline) => Context::park_until(deadline),
                None => Context::park(),
            }
        }
    }

    pub(crate) fn release(&self, mode: Mode) -> LockResult<()> {
        let context = Context::current_id();
        let result = self.state.lock().release(context, mode, self.is_fair());
        match &result {
            Ok(true) => tracing::trace!(lock = %self.id, context = %context, ?mode, "released"),
            Ok(false) => {}
            Err(err) => tracing::debug!(lock = %self.id, error = %err, "release rejected"),
        }
        result.map(|_| ())
    }

    pub(crate) fn register_condition(&self, condition: ConditionId) {
        self.state.lock().conditions.insert(condition, VecDeque::new());
    }

    pub(crate) fn unregister_condition(&self, condition: ConditionId) {
        let removed = self.state.lock().conditions.remove(&condition);
        if removed.is_some_and(|queue| !queue.is_empty()) {
            tracing::warn!(lock = %self.id, ?condition, "condition dropped with queued waiters");
        }
    }

    /// Release every hold, park on `condition`, and re-acquire with the
    /// original hold count before returning.
    ///
    /// Returns `Ok(true)` if a signal woke the caller and `Ok(false)` if the
    /// deadline passed first. Cancellation is only honored while the caller
    /// is still on the condition queue; a signal already consumed wins.
    /// Waiting while also holding a read hold is a `Deadlock` error.
    pub(crate) fn wait_on(
        &self,
        condition: ConditionId,
        interruptible: bool,
        deadline: Option<Instant>,
    ) -> LockResult<bool> {
        let context = Context::current();
        let id = context.id();
        let fair = self.is_fair();

        let waiter = {
            let mut state = self.state.lock();
            if !state.ownership.is_owned_by(id) {
                return Err(state.not_owner(id));
            }
            // A read hold kept across the wait would block our own re-acquire
            if state.readers.contains_key(&id) {
                tracing::debug!(lock = %self.id, context = %id, "condition wait with read hold");
                return Err(LockError::Deadlock(id));
            }
            if interruptible && context.take_cancellation() {
                return Err(LockError::Cancelled(id));
            }
            let waiter = Waiter::new(context, Mode::Exclusive, state.holds, WAITING);
            state
                .conditions
                .entry(condition)
                .or_default()
                .push_back(waiter.clone());
            state.holds = 0;
            state.ownership.clear();
            state.wake_next(fair);
            waiter
        };
        tracing::trace!(lock = %self.id, context = %id, holds = waiter.holds, ?condition, "waiting");

        let mut outcome = Ok(true);
        loop {
            match deadline {
                Some(deadline) => Context::park_until(deadline),
                None => Context::park(),
            }
            let mut state = self.state.lock();
            if waiter.status() != WAITING {
                break;
            }
            if interruptible && waiter.context.take_cancellation() {
                outcome = Err(LockError::Cancelled(id));
                state.abandon_condition(condition, &waiter, fair);
                break;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                outcome = Ok(false);
                state.abandon_condition(condition, &waiter, fair);
                break;
            }
        }

        self.wait_for_grant(&waiter, false, None)?;
        tracing::trace!(lock = %self.id, context = %id, ?outcome, "woke from condition");
        outcome
    }

    /// Move one (or every) condition waiter to the acquire queue. They run
    /// once the caller releases the lock.
    pub(crate) fn signal(&self, condition: ConditionId, all: bool) -> LockResult<usize> {
        let id = Context::current_id();
        let mut state = self.state.lock();
        if !state.ownership.is_owned_by(id) {
            return Err(state.not_owner(id));
        }
        let mut moved = 0;
        while let Some(waiter) = state
            .conditions
            .get_mut(&condition)
            .and_then(VecDeque::pop_front)
        {
            waiter.set_status(QUEUED);
            state.queue.push_back(waiter);
            moved += 1;
            if !all {
                break;
            }
        }
        if moved > 0 {
            tracing::trace!(lock = %self.id, ?condition, moved, "signalled");
        }
        Ok(moved)
    }

    pub(crate) fn condition_waiters(&self, condition: ConditionId) -> LockResult<usize> {
        let id = Context::current_id();
        let state = self.state.lock();
        if !state.ownership.is_owned_by(id) {
            return Err(state.not_owner(id));
        }
        Ok(state.conditions.get(&condition).map_or(0, VecDeque::len))
    }

    pub(crate) fn owner(&self) -> Option<ContextId> {
        self.state.lock().ownership.owner()
    }

    pub(crate) fn is_locked(&self) -> bool {
        self.state.lock().is_held()
    }

    pub(crate) fn is_write_locked(&self) -> bool {
        !self.state.lock().ownership.is_free()
    }

    pub(crate) fn is_held_by(&self, context: ContextId) -> bool {
        self.state.lock().ownership.is_owned_by(context)
    }

    pub(crate) fn hold_count(&self, context: ContextId) -> usize {
        let state = self.state.lock();
        if state.ownership.is_owned_by(context) {
            state.holds
        } else {
            0
        }
    }

    pub(crate) fn read_hold_count(&self, context: ContextId) -> usize {
        self.state.lock().readers.get(&context).copied().unwrap_or(0)
    }

    pub(crate) fn read_holds(&self) -> usize {
        self.state.lock().readers.values().sum()
    }

    pub(crate) fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub(crate) fn stats(&self) -> LockStats {
        let state = self.state.lock();
        LockStats {
            lock: self.id,
            owner: state.ownership.owner(),
            holds: state.holds,
            read_holds: state.readers.values().sum(),
            queued: state.queue.len(),
            condition_waiters: state.conditions.values().map(VecDeque::len).sum(),
            fair: self.is_fair(),
        }
    }
}

impl Drop for RawLock {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.is_held() {
            tracing::warn!(
                lock = %self.id,
                owner = ?state.ownership.owner(),
                readers = state.readers.len(),
                "lock destroyed while held"
            );
        }
    }
}

impl fmt::Debug for RawLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawLock")
            .field("id", &self.id)
            .field("options", &self.options)
            .field("reentrant", &self.reentrant)
            .finish_non_exhaustive()
    }
}
