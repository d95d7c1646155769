//! In-memory native transactions
//!
//! A small reference implementation of the native layer. It does not store
//! any data; it keeps track of what was asked of each transaction so that
//! callers can inspect the exact sequence of native operations.
//!
//! ## Journal
//! Every successful operation appends a `JournalEntry { txn_id, op }`.
//! Failed operations are not journaled.
//!
//! ## Scope stack
//! Entered scopes form a stack shared by all transactions of one factory.
//! Leaving a scope that is not the innermost one fails, which makes
//! incorrectly nested teardown visible.
//!
//! ## Compatibility
//! An object bound to transaction `T` can be used in `T` and in every
//! descendant of `T`. Committing a child hands its objects to the parent, so
//! they become usable wherever the parent's objects are. Unbound objects and
//! plain values are compatible with every transaction.
//!
//! ## Fault injection
//! `inject_fault(txn_id, op, message)` makes the next `op` on `txn_id` fail
//! once with `NativeErrorKind::Failed`. A fault on `Operation::Begin` makes the
//! creation of that transaction ID fail (see `next_txn_id`).

use std::any::Any;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::{NativeTransaction, TransactionFactory, TransactionScope};
use crate::error::{NativeError, NativeResult};
use crate::types::{ObjectRef, TxnId, Value};

/// Native operation recorded in the journal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Begin,
    CreateChild,
    EnterScope,
    LeaveScope,
    Commit,
    Rollback,
    Release,
    EnsureCompatibility,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Begin => "BEGIN",
            Operation::CreateChild => "CREATE CHILD",
            Operation::EnterScope => "ENTER SCOPE",
            Operation::LeaveScope => "LEAVE SCOPE",
            Operation::Commit => "COMMIT",
            Operation::Rollback => "ROLLBACK",
            Operation::Release => "RELEASE",
            Operation::EnsureCompatibility => "ENSURE COMPATIBILITY",
        };
        write!(f, "{}", name)
    }
}

/// Transaction state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Active,
    Released,
}

/// One journaled native operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub txn_id: TxnId,
    pub op: Operation,
}

impl fmt::Display for JournalEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn {}: {}", self.txn_id, self.op)
    }
}

/// State shared by a factory and every transaction it created
struct Registry {
    next_txn_id: TxnId,
    journal: Vec<JournalEntry>,
    states: HashMap<TxnId, TxnState>,
    /// Parent of every child transaction
    parents: HashMap<TxnId, TxnId>,
    committed: HashSet<TxnId>,
    scopes: Vec<TxnId>,
    faults: HashMap<(TxnId, Operation), String>,
}

impl Registry {
    fn new() -> Self {
        Self {
            next_txn_id: 1,
            journal: Vec::new(),
            states: HashMap::new(),
            parents: HashMap::new(),
            committed: HashSet::new(),
            scopes: Vec::new(),
            faults: HashMap::new(),
        }
    }

    /// Fail once if a fault was injected for this operation
    fn trip(&mut self, txn_id: TxnId, op: Operation) -> NativeResult<()> {
        match self.faults.remove(&(txn_id, op)) {
            Some(message) => Err(NativeError::failed(message)),
            None => Ok(()),
        }
    }

    fn ensure_active(&self, txn_id: TxnId) -> NativeResult<()> {
        match self.states.get(&txn_id) {
            Some(TxnState::Active) => Ok(()),
            Some(TxnState::Released) => Err(NativeError::failed(format!(
                "Transaction {} has already been released",
                txn_id
            ))),
            None => Err(NativeError::failed(format!("Transaction {} not found", txn_id))),
        }
    }

    fn record(&mut self, txn_id: TxnId, op: Operation) {
        self.journal.push(JournalEntry { txn_id, op });
    }

    /// `owner` followed by every ancestor its objects reached through commits
    fn visible_owners(&self, owner: TxnId) -> Vec<TxnId> {
        let mut owners = vec![owner];
        let mut current = owner;
        while self.committed.contains(&current) {
            match self.parents.get(&current) {
                Some(parent) => {
                    owners.push(*parent);
                    current = *parent;
                }
                None => break,
            }
        }
        owners
    }

    fn begin(&mut self) -> NativeResult<TxnId> {
        let txn_id = self.next_txn_id;
        self.trip(txn_id, Operation::Begin)?;
        self.next_txn_id += 1;
        self.states.insert(txn_id, TxnState::Active);
        self.record(txn_id, Operation::Begin);
        Ok(txn_id)
    }
}

/// Factory for in-memory root transactions.
///
/// Clones share the same journal, so a clone can be handed to a transaction
/// mode while the original is kept for inspection.
#[derive(Clone)]
pub struct MemoryTransactionFactory {
    registry: Rc<RefCell<Registry>>,
}

impl Default for MemoryTransactionFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransactionFactory {
    pub fn new() -> Self {
        Self {
            registry: Rc::new(RefCell::new(Registry::new())),
        }
    }

    /// Create a root transaction with its concrete type
    pub fn begin(&self) -> NativeResult<MemoryTransaction> {
        let txn_id = self.registry.borrow_mut().begin()?;
        log::debug!("Began in-memory transaction {}", txn_id);
        Ok(MemoryTransaction {
            id: txn_id,
            ancestors: Vec::new(),
            registry: Rc::clone(&self.registry),
        })
    }

    /// ID the next created transaction will get
    pub fn next_txn_id(&self) -> TxnId {
        self.registry.borrow().next_txn_id
    }

    /// All operations performed so far, in order
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.registry.borrow().journal.clone()
    }

    /// Operations performed on one transaction, in order
    pub fn operations(&self, txn_id: TxnId) -> Vec<Operation> {
        self.registry
            .borrow()
            .journal
            .iter()
            .filter(|entry| entry.txn_id == txn_id)
            .map(|entry| entry.op)
            .collect()
    }

    /// Number of times `op` was performed on `txn_id`
    pub fn count(&self, txn_id: TxnId, op: Operation) -> usize {
        self.registry
            .borrow()
            .journal
            .iter()
            .filter(|entry| entry.txn_id == txn_id && entry.op == op)
            .count()
    }

    pub fn state(&self, txn_id: TxnId) -> Option<TxnState> {
        self.registry.borrow().states.get(&txn_id).copied()
    }

    /// Transactions with an entered scope, outermost first
    pub fn active_scopes(&self) -> Vec<TxnId> {
        self.registry.borrow().scopes.clone()
    }

    /// Make the next `op` on `txn_id` fail once with `message`
    pub fn inject_fault(&self, txn_id: TxnId, op: Operation, message: impl Into<String>) {
        self.registry
            .borrow_mut()
            .faults
            .insert((txn_id, op), message.into());
    }
}

impl TransactionFactory for MemoryTransactionFactory {
    fn create(&self) -> NativeResult<Box<dyn NativeTransaction>> {
        Ok(Box::new(self.begin()?))
    }
}

/// In-memory native transaction
pub struct MemoryTransaction {
    id: TxnId,
    /// Enclosing transactions, outermost first
    ancestors: Vec<TxnId>,
    registry: Rc<RefCell<Registry>>,
}

impl MemoryTransaction {
    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn parent_id(&self) -> Option<TxnId> {
        self.ancestors.last().copied()
    }

    /// Load an object into this transaction
    pub fn bind(&self, object: ObjectRef) -> Value {
        Value::Object(object.bound_to(self.id))
    }

    /// Check a single object against this transaction
    fn check_object(&self, object: &ObjectRef) -> NativeResult<()> {
        match object.transaction {
            None => Ok(()),
            Some(owner) if self.can_see(owner) => Ok(()),
            Some(owner) => Err(NativeError::incompatible(format!(
                "The object '{}' is bound to transaction {} and cannot be used in transaction {}.",
                object, owner, self.id
            ))),
        }
    }

    fn can_see(&self, owner: TxnId) -> bool {
        self.registry
            .borrow()
            .visible_owners(owner)
            .iter()
            .any(|txn| *txn == self.id || self.ancestors.contains(txn))
    }

    /// Run an operation that requires an active transaction
    fn perform(&self, op: Operation) -> NativeResult<()> {
        let mut registry = self.registry.borrow_mut();
        registry.trip(self.id, op)?;
        registry.ensure_active(self.id)?;
        registry.record(self.id, op);
        Ok(())
    }
}

impl fmt::Debug for MemoryTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTransaction")
            .field("id", &self.id)
            .field("ancestors", &self.ancestors)
            .finish()
    }
}

impl NativeTransaction for MemoryTransaction {
    fn commit(&mut self) -> NativeResult<()> {
        self.perform(Operation::Commit)?;
        self.registry.borrow_mut().committed.insert(self.id);
        Ok(())
    }

    fn rollback(&mut self) -> NativeResult<()> {
        self.perform(Operation::Rollback)
    }

    fn release(&mut self) -> NativeResult<()> {
        self.perform(Operation::Release)?;
        self.registry
            .borrow_mut()
            .states
            .insert(self.id, TxnState::Released);
        log::debug!("Released in-memory transaction {}", self.id);
        Ok(())
    }

    fn enter_scope(&mut self) -> NativeResult<Box<dyn TransactionScope>> {
        self.perform(Operation::EnterScope)?;
        self.registry.borrow_mut().scopes.push(self.id);
        Ok(Box::new(MemoryScope {
            txn_id: self.id,
            registry: Rc::clone(&self.registry),
        }))
    }

    fn create_child(&mut self) -> NativeResult<Box<dyn NativeTransaction>> {
        self.perform(Operation::CreateChild)?;
        let txn_id = {
            let mut registry = self.registry.borrow_mut();
            let txn_id = registry.begin()?;
            registry.parents.insert(txn_id, self.id);
            txn_id
        };
        let mut ancestors = self.ancestors.clone();
        ancestors.push(self.id);
        log::debug!("Began in-memory transaction {} as child of {}", txn_id, self.id);
        Ok(Box::new(MemoryTransaction {
            id: txn_id,
            ancestors,
            registry: Rc::clone(&self.registry),
        }))
    }

    fn ensure_compatibility(&self, objects: &[Value]) -> NativeResult<()> {
        self.perform(Operation::EnsureCompatibility)?;
        objects
            .iter()
            .filter_map(Value::as_object)
            .try_for_each(|object| self.check_object(object))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Scope token of an in-memory transaction
pub struct MemoryScope {
    txn_id: TxnId,
    registry: Rc<RefCell<Registry>>,
}

impl MemoryScope {
    pub fn txn_id(&self) -> TxnId {
        self.txn_id
    }
}

impl TransactionScope for MemoryScope {
    fn leave(self: Box<Self>) -> NativeResult<()> {
        let mut registry = self.registry.borrow_mut();
        if registry.scopes.last() != Some(&self.txn_id) {
            return Err(NativeError::failed(format!(
                "The scope of transaction {} is not the innermost active scope",
                self.txn_id
            )));
        }
        // An injected fault still removes the scope; the token is gone either way.
        registry.scopes.pop();
        registry.trip(self.txn_id, Operation::LeaveScope)?;
        registry.record(self.txn_id, Operation::LeaveScope);
        Ok(())
    }
}

#[cfg(test)]
mod tests;
