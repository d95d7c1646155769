//! Transaction strategies
//!
//! A transaction strategy binds one execution frame to a native transaction.
//! Strategies form a tree that mirrors the frame tree:
//!
//! - **Null**: sentinel above the top of every tree. Everything is a no-op or
//!   is passed straight to the listener.
//! - **None**: the frame explicitly runs without a transaction. Lifecycle
//!   callbacks go to the listener, commit/rollback/reset are unsupported, and
//!   child strategies are created by the enclosing strategy.
//! - **Root**: owns a parentless native transaction from a factory.
//! - **Child**: owns a native transaction nested in its outer strategy's
//!   transaction and is registered as that strategy's only child.
//!
//! ### State machine (Root and Child)
//! A strategy is *idle* until it is played, which enters the native scope.
//! Stop, pause and fail leave the scope again; stop and fail also release the
//! native transaction. Children are always torn down before their parent and
//! entered after it, so native scopes nest strictly.
//!
//! ### Ownership
//! `TransactionStrategy` is a cheap handle. A strategy owns its child; the
//! link back to the outer strategy is weak and reads as the Null sentinel once
//! the outer strategy is gone.

mod scoped;

use std::cell::Ref;
use std::error::Error;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::context::ExecutionContext;
use crate::error::{Incompatibility, Result, TransactionError};
use crate::listener::{
    ChildTransactionExecutionListener, ExecutionListener, TransactionExecutionListener,
};
use crate::native::{NativeTransaction, TransactionFactory};
use crate::types::Value;

use scoped::{ScopedStrategy, TransactionSource};

/// Strategy variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Null,
    None,
    Root,
    Child,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Null => write!(f, "Null"),
            StrategyKind::None => write!(f, "None"),
            StrategyKind::Root => write!(f, "Root"),
            StrategyKind::Child => write!(f, "Child"),
        }
    }
}

enum Variant {
    Null,
    None { outer: Weak<Variant> },
    Scoped(ScopedStrategy),
}

thread_local! {
    static NULL_STRATEGY: TransactionStrategy = TransactionStrategy {
        inner: Rc::new(Variant::Null),
    };
}

/// Handle to a node of the strategy tree
#[derive(Clone)]
pub struct TransactionStrategy {
    inner: Rc<Variant>,
}

impl TransactionStrategy {
    /// The Null sentinel of the current thread
    pub fn null() -> Self {
        NULL_STRATEGY.with(TransactionStrategy::clone)
    }

    /// A strategy without a transaction, nested in `outer`
    pub fn none(outer: &TransactionStrategy) -> Self {
        Self {
            inner: Rc::new(Variant::None {
                outer: Rc::downgrade(&outer.inner),
            }),
        }
    }

    /// A strategy with a fresh transaction from `factory`.
    ///
    /// `outer` is only used to validate output parameters on stop; the new
    /// strategy is not registered with it.
    pub fn root(
        auto_commit: bool,
        outer: &TransactionStrategy,
        context: Rc<dyn ExecutionContext>,
        factory: Rc<dyn TransactionFactory>,
    ) -> Result<Self> {
        let transaction = factory.create()?;
        Self::from_scoped(ScopedStrategy::new(
            TransactionSource::Factory(factory),
            outer,
            auto_commit,
            context,
            transaction,
        ))
    }

    fn from_scoped(scoped: ScopedStrategy) -> Result<Self> {
        scoped.validate_in_parameters()?;
        Ok(Self {
            inner: Rc::new(Variant::Scoped(scoped)),
        })
    }

    fn upgrade(outer: &Weak<Variant>) -> Self {
        outer
            .upgrade()
            .map(|inner| Self { inner })
            .unwrap_or_else(Self::null)
    }

    pub fn kind(&self) -> StrategyKind {
        match &*self.inner {
            Variant::Null => StrategyKind::Null,
            Variant::None { .. } => StrategyKind::None,
            Variant::Scoped(scoped) => scoped.kind(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(&*self.inner, Variant::Null)
    }

    /// Whether this strategy owns a native transaction (Root or Child)
    pub fn has_transaction(&self) -> bool {
        matches!(&*self.inner, Variant::Scoped(_))
    }

    pub fn auto_commit(&self) -> bool {
        match &*self.inner {
            Variant::Scoped(scoped) => scoped.auto_commit(),
            _ => false,
        }
    }

    /// Whether the native scope is currently entered
    pub fn is_playing(&self) -> bool {
        match &*self.inner {
            Variant::Scoped(scoped) => scoped.is_playing(),
            _ => false,
        }
    }

    /// The enclosing strategy; `None` only for the Null sentinel
    pub fn outer_transaction_strategy(&self) -> Option<TransactionStrategy> {
        match &*self.inner {
            Variant::Null => None,
            Variant::None { outer } => Some(Self::upgrade(outer)),
            Variant::Scoped(scoped) => Some(scoped.outer()),
        }
    }

    /// The registered child strategy, if any
    pub fn child_transaction_strategy(&self) -> Option<TransactionStrategy> {
        match &*self.inner {
            Variant::Scoped(scoped) => scoped.child(),
            _ => None,
        }
    }

    /// Whether both handles refer to the same strategy
    pub fn ptr_eq(&self, other: &TransactionStrategy) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// The native transaction as its concrete type.
    ///
    /// The returned guard must be dropped before the strategy is driven again.
    pub fn native_transaction<T: 'static>(&self) -> Option<Ref<'_, T>> {
        match &*self.inner {
            Variant::Scoped(scoped) => scoped.native_transaction::<T>(),
            _ => None,
        }
    }

    pub fn commit(&self) -> Result<()> {
        match &*self.inner {
            Variant::Null => Ok(()),
            Variant::None { .. } => Err(TransactionError::unsupported(
                "Commit is not supported by a strategy without a transaction.",
            )),
            Variant::Scoped(scoped) => scoped.commit(),
        }
    }

    pub fn rollback(&self) -> Result<()> {
        match &*self.inner {
            Variant::Null => Ok(()),
            Variant::None { .. } => Err(TransactionError::unsupported(
                "Rollback is not supported by a strategy without a transaction.",
            )),
            Variant::Scoped(scoped) => scoped.rollback(),
        }
    }

    /// Replace the native transaction with a new one in place.
    ///
    /// If the new transaction cannot be created, the strategy keeps the
    /// released one.
    pub fn reset(&self) -> Result<()> {
        match &*self.inner {
            Variant::Null => Ok(()),
            Variant::None { .. } => Err(TransactionError::unsupported(
                "Reset is not supported by a strategy without a transaction.",
            )),
            Variant::Scoped(scoped) => scoped.reset(),
        }
    }

    /// Create a Child strategy nested in this strategy's transaction and
    /// register it as the active child.
    pub fn create_child_transaction_strategy(
        &self,
        auto_commit: bool,
        context: Rc<dyn ExecutionContext>,
    ) -> Result<TransactionStrategy> {
        match &*self.inner {
            Variant::Null => Err(TransactionError::unsupported(
                "The null transaction strategy cannot create child transaction strategies.",
            )),
            Variant::None { outer } => {
                Self::upgrade(outer).create_child_transaction_strategy(auto_commit, context)
            }
            Variant::Scoped(scoped) => scoped.create_child(self, auto_commit, context),
        }
    }

    pub fn unregister_child_transaction_strategy(&self, child: &TransactionStrategy) -> Result<()> {
        match &*self.inner {
            Variant::None { outer } => {
                Self::upgrade(outer).unregister_child_transaction_strategy(child)
            }
            Variant::Scoped(scoped) => scoped.unregister_child(child),
            Variant::Null => Err(TransactionError::invalid_transition(
                "The null transaction strategy has no child transaction strategies to unregister.",
            )),
        }
    }

    /// Check that `objects` can be used within this strategy's transaction
    pub fn ensure_compatibility(&self, objects: &[Value]) -> Result<()> {
        self.check_compatibility(objects, Incompatibility::Objects)
    }

    fn check_compatibility(&self, objects: &[Value], target: Incompatibility) -> Result<()> {
        match &*self.inner {
            Variant::Null => Ok(()),
            Variant::None { outer } => Self::upgrade(outer).check_compatibility(objects, target),
            Variant::Scoped(scoped) => scoped.check_compatibility(objects, target),
        }
    }

    fn create_native_child(&self) -> Result<Box<dyn NativeTransaction>> {
        match &*self.inner {
            Variant::Scoped(scoped) => scoped.create_native_child(),
            _ => Err(TransactionError::unsupported(format!(
                "A {} transaction strategy has no transaction to create a child transaction from.",
                self.kind()
            ))),
        }
    }

    /// Listener that routes the frame's lifecycle through this strategy
    /// before it reaches `inner`
    pub fn create_execution_listener(
        &self,
        inner: Rc<dyn ExecutionListener>,
    ) -> Box<dyn ExecutionListener> {
        match self.kind() {
            StrategyKind::Child => Box::new(ChildTransactionExecutionListener::new(
                self.clone(),
                inner,
            )),
            _ => Box::new(TransactionExecutionListener::new(self.clone(), inner)),
        }
    }

    pub fn on_execution_play(
        &self,
        context: &dyn ExecutionContext,
        listener: &dyn ExecutionListener,
    ) -> Result<()> {
        match &*self.inner {
            Variant::Scoped(scoped) => scoped.on_execution_play(context, listener),
            _ => listener.on_execution_play(context),
        }
    }

    pub fn on_execution_stop(
        &self,
        context: &dyn ExecutionContext,
        listener: &dyn ExecutionListener,
    ) -> Result<()> {
        match &*self.inner {
            Variant::Scoped(scoped) => scoped.on_execution_stop(self, context, listener),
            _ => listener.on_execution_stop(context),
        }
    }

    pub fn on_execution_pause(
        &self,
        context: &dyn ExecutionContext,
        listener: &dyn ExecutionListener,
    ) -> Result<()> {
        match &*self.inner {
            Variant::Scoped(scoped) => scoped.on_execution_pause(context, listener),
            _ => listener.on_execution_pause(context),
        }
    }

    pub fn on_execution_fail(
        &self,
        context: &dyn ExecutionContext,
        listener: &dyn ExecutionListener,
        error: &dyn Error,
    ) -> Result<()> {
        match &*self.inner {
            Variant::Scoped(scoped) => scoped.on_execution_fail(self, context, listener, error),
            _ => listener.on_execution_fail(context, error),
        }
    }
}

impl fmt::Debug for TransactionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionStrategy")
            .field("kind", &self.kind())
            .field("auto_commit", &self.auto_commit())
            .field("playing", &self.is_playing())
            .finish()
    }
}
