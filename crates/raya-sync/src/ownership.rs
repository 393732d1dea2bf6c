//! Exclusive ownership record

use crate::context::ContextId;

/// Tracks which context, if any, holds exclusive access
///
/// Has no synchronization of its own. A lock keeps its record inside its
/// internal critical region and only touches it there; the record exists for
/// diagnostics (owner queries, self-deadlock detection), not to enforce
/// exclusion.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OwnershipRecord {
    owner: Option<ContextId>,
}

impl OwnershipRecord {
    /// Create a record with no owner
    pub const fn new() -> Self {
        Self { owner: None }
    }

    /// Set (or clear, with `None`) the owning context
    pub fn set_owner(&mut self, owner: Option<ContextId>) {
        self.owner = owner;
    }

    /// The owning context, if any
    pub fn owner(&self) -> Option<ContextId> {
        self.owner
    }

    /// Clear the owner
    pub fn clear(&mut self) {
        self.owner = None;
    }

    /// Whether `context` is the owner
    pub fn is_owned_by(&self, context: ContextId) -> bool {
        self.owner == Some(context)
    }

    /// Whether nobody owns the resource
    pub fn is_free(&self) -> bool {
        self.owner.is_none()
    }
}
