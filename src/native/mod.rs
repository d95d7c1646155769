//! Native transaction layer
//!
//! The coordinator never talks to a persistence layer directly. It drives
//! units of work through the traits below, which a persistence layer
//! implements. `memory` holds a journaled in-memory implementation.

pub mod memory;

pub use memory::{
    JournalEntry, MemoryScope, MemoryTransaction, MemoryTransactionFactory, Operation, TxnState,
};

use std::any::Any;

use crate::error::NativeResult;
use crate::types::Value;

/// Unit-of-work handle supplied by the persistence layer.
///
/// A handle is owned by exactly one transaction strategy at a time.
pub trait NativeTransaction {
    /// Make the changes of this transaction durable (or visible to the parent)
    fn commit(&mut self) -> NativeResult<()>;

    /// Discard the changes of this transaction
    fn rollback(&mut self) -> NativeResult<()>;

    /// Free the transaction. The handle must not be used afterwards.
    fn release(&mut self) -> NativeResult<()>;

    /// Make this transaction the active one.
    /// The returned token must be left before an enclosing scope is left.
    fn enter_scope(&mut self) -> NativeResult<Box<dyn TransactionScope>>;

    /// Create a nested transaction that commits into this one
    fn create_child(&mut self) -> NativeResult<Box<dyn NativeTransaction>>;

    /// Check that all objects can be used within this transaction.
    /// Mismatches are reported with `NativeErrorKind::Incompatible`.
    fn ensure_compatibility(&self, objects: &[Value]) -> NativeResult<()>;

    /// Access to the concrete handle type
    fn as_any(&self) -> &dyn Any;
}

/// Marker for "this transaction is currently active".
///
/// Leaving consumes the token, so only the party that entered a scope can
/// leave it, and only once.
pub trait TransactionScope {
    fn leave(self: Box<Self>) -> NativeResult<()>;
}

/// Source of parentless native transactions
pub trait TransactionFactory {
    fn create(&self) -> NativeResult<Box<dyn NativeTransaction>>;
}
