//! Execution contexts
//!
//! Every OS thread that touches a lock is lazily bound to a [`Context`]: a
//! process-unique [`ContextId`], a pending-cancellation flag and a parker the
//! lock uses to block and wake it. Locks only ever store the id, never a
//! reference to the context itself.
//!
//! Cancellation is message passing: [`ContextHandle::cancel`] sets the flag
//! and unparks the target, and the flag is observed (and cleared) only at the
//! interruptible checkpoints of the lock and condition APIs.

use crossbeam::sync::{Parker, Unparker};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Unique identifier for an execution context
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

impl ContextId {
    fn next() -> Self {
        ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Create a ContextId from a u64 value
    pub fn from_u64(id: u64) -> Self {
        ContextId(id)
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

struct Shared {
    id: ContextId,
    name: Option<String>,
    cancelled: AtomicBool,
    unparker: Unparker,
}

/// Cloneable handle to an execution context
///
/// Handles can be sent to other threads; they are how a cancellation signal
/// reaches a context that is blocked somewhere else.
#[derive(Clone)]
pub struct ContextHandle {
    shared: Arc<Shared>,
}

impl ContextHandle {
    /// The context's id
    pub fn id(&self) -> ContextId {
        self.shared.id
    }

    /// Name of the thread the context is bound to, if it has one
    pub fn name(&self) -> Option<&str> {
        self.shared.name.as_deref()
    }

    /// Deliver a cancellation signal
    ///
    /// The signal stays pending until the context reaches an interruptible
    /// checkpoint. If the context is currently parked it is woken so it can
    /// observe the signal.
    pub fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::Release);
        tracing::trace!(context = %self.shared.id, "cancellation delivered");
        self.shared.unparker.unpark();
    }

    /// Check whether a cancellation signal is pending, without clearing it
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::Acquire)
    }

    /// Check and clear the pending cancellation signal
    pub(crate) fn take_cancellation(&self) -> bool {
        self.shared.cancelled.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn unpark(&self) {
        self.shared.unparker.unpark();
    }

    /// Whether both handles refer to the same context
    pub fn same_context(&self, other: &ContextHandle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextHandle")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// The execution context bound to the current thread
///
/// Not constructible directly; use the associated functions, which all act on
/// the calling thread's context.
pub struct Context {
    handle: ContextHandle,
    parker: Parker,
}

thread_local! {
    static CURRENT: Context = Context::bind();
}

impl Context {
    fn bind() -> Self {
        let parker = Parker::new();
        let handle = ContextHandle {
            shared: Arc::new(Shared {
                id: ContextId::next(),
                name: std::thread::current().name().map(str::to_owned),
                cancelled: AtomicBool::new(false),
                unparker: parker.unparker().clone(),
            }),
        };
        ContextRegistry::global().insert(handle.clone());
        tracing::trace!(context = %handle.id(), name = ?handle.name(), "context bound");
        Context { handle, parker }
    }

    /// Handle to the calling thread's context
    pub fn current() -> ContextHandle {
        CURRENT.with(|ctx| ctx.handle.clone())
    }

    /// Id of the calling thread's context
    pub fn current_id() -> ContextId {
        CURRENT.with(|ctx| ctx.handle.id())
    }

    /// Check and clear the calling context's pending cancellation signal
    ///
    /// This is the same checkpoint the interruptible lock operations use.
    pub fn take_cancellation() -> bool {
        CURRENT.with(|ctx| ctx.handle.take_cancellation())
    }

    /// Check the calling context's pending cancellation signal without
    /// clearing it
    pub fn is_cancelled() -> bool {
        CURRENT.with(|ctx| ctx.handle.is_cancelled())
    }

    /// Block the calling context until it is unparked
    ///
    /// May return spuriously; callers re-check their wake condition.
    pub(crate) fn park() {
        CURRENT.with(|ctx| ctx.parker.park());
    }

    /// Block the calling context until it is unparked or `deadline` passes
    pub(crate) fn park_until(deadline: Instant) {
        let timeout = deadline.saturating_duration_since(Instant::now());
        if !timeout.is_zero() {
            CURRENT.with(|ctx| ctx.parker.park_timeout(timeout));
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        ContextRegistry::global().remove(self.handle.id());
    }
}

/// Process-wide registry of live execution contexts
///
/// Lets any thread reach a context by id, e.g. to cancel a context whose id
/// was read from a lock's owner record.
pub struct ContextRegistry {
    contexts: DashMap<ContextId, ContextHandle>,
}

static REGISTRY: Lazy<ContextRegistry> = Lazy::new(ContextRegistry::new);

impl ContextRegistry {
    fn new() -> Self {
        Self {
            contexts: DashMap::new(),
        }
    }

    /// The global registry
    pub fn global() -> &'static ContextRegistry {
        &REGISTRY
    }

    fn insert(&self, handle: ContextHandle) {
        self.contexts.insert(handle.id(), handle);
    }

    fn remove(&self, id: ContextId) -> Option<ContextHandle> {
        self.contexts.remove(&id).map(|(_, handle)| handle)
    }

    /// Look up a live context by id
    pub fn lookup(&self, id: ContextId) -> Option<ContextHandle> {
        self.contexts.get(&id).map(|entry| entry.clone())
    }

    /// Deliver a cancellation signal by id
    ///
    /// Returns false if no live context has that id.
    pub fn cancel(&self, id: ContextId) -> bool {
        match self.lookup(id) {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Number of live contexts
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Whether no context is registered
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_context_id_stable_per_thread() {
        let a = Context::current_id();
        let b = Context::current_id();
        assert_eq!(a, b);
        assert!(Context::current().same_context(&Context::current()));
    }

    #[test]
    fn test_context_id_unique_across_threads() {
        let here = Context::current_id();
        let there = thread::spawn(Context::current_id).join().unwrap();
        assert_ne!(here, there);
    }

    #[test]
    fn test_cancellation_is_pending_until_taken() {
        let handle = Context::current();
        assert!(!Context::take_cancellation());

        handle.cancel();
        assert!(handle.is_cancelled());
        assert!(Context::is_cancelled());

        assert!(Context::take_cancellation());
        assert!(!Context::take_cancellation());
        assert!(!handle.is_cancelled());
    }

    #[test]
    fn test_registry_lookup_and_cancel_by_id() {
        let id = Context::current_id();
        let handle = ContextRegistry::global().lookup(id).unwrap();
        assert_eq!(handle.id(), id);

        assert!(ContextRegistry::global().cancel(id));
        assert!(Context::take_cancellation());
    }

    #[test]
    fn test_registry_forgets_exited_threads() {
        let id = thread::spawn(Context::current_id).join().unwrap();
        assert!(ContextRegistry::global().lookup(id).is_none());
        assert!(!ContextRegistry::global().cancel(id));
    }

    #[test]
    fn test_context_name_follows_thread() {
        let name = thread::Builder::new()
            .name("ctx-worker".into())
            .spawn(|| Context::current().name().map(str::to_owned))
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(name.as_deref(), Some("ctx-worker"));
    }

    #[test]
    fn test_cancel_unparks_parked_context() {
        let (tx, rx) = std::sync::mpsc::channel();
        let worker = thread::spawn(move || {
            tx.send(Context::current()).unwrap();
            while !Context::take_cancellation() {
                Context::park();
            }
        });
        let handle = rx.recv().unwrap();
        handle.cancel();
        worker.join().unwrap();
    }

    #[test]
    fn test_park_until_past_deadline_returns() {
        Context::park_until(Instant::now());
    }
}
