//! Root and Child strategies
//!
//! Both variants hold a native transaction and drive its scope through the
//! play/stop/pause/fail state machine. They differ only in where a new
//! transaction comes from and in what release means: a Child also removes
//! itself from its outer strategy once its transaction is released.

use std::cell::{Ref, RefCell};
use std::error::Error;
use std::rc::{Rc, Weak};

use super::{StrategyKind, TransactionStrategy, Variant};
use crate::context::ExecutionContext;
use crate::error::{Incompatibility, Result, TransactionError};
use crate::listener::{ExecutionListener, NullExecutionListener};
use crate::native::{NativeTransaction, TransactionFactory, TransactionScope};
use crate::types::Value;

/// Where replacement transactions come from
pub(super) enum TransactionSource {
    /// Parentless transactions (Root)
    Factory(Rc<dyn TransactionFactory>),
    /// Children of the outer strategy's transaction (Child)
    Outer,
}

struct ScopedState {
    transaction: Box<dyn NativeTransaction>,
    /// Present iff the strategy is playing
    scope: Option<Box<dyn TransactionScope>>,
    child: Option<TransactionStrategy>,
}

// Borrows of `state` are never held across calls into other strategies,
// listeners or the execution context; those may call back into this strategy.
pub(super) struct ScopedStrategy {
    source: TransactionSource,
    outer: Weak<Variant>,
    auto_commit: bool,
    context: Rc<dyn ExecutionContext>,
    state: RefCell<ScopedState>,
}

impl ScopedStrategy {
    pub(super) fn new(
        source: TransactionSource,
        outer: &TransactionStrategy,
        auto_commit: bool,
        context: Rc<dyn ExecutionContext>,
        transaction: Box<dyn NativeTransaction>,
    ) -> Self {
        Self {
            source,
            outer: Rc::downgrade(&outer.inner),
            auto_commit,
            context,
            state: RefCell::new(ScopedState {
                transaction,
                scope: None,
                child: None,
            }),
        }
    }

    pub(super) fn kind(&self) -> StrategyKind {
        match self.source {
            TransactionSource::Factory(_) => StrategyKind::Root,
            TransactionSource::Outer => StrategyKind::Child,
        }
    }

    pub(super) fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    pub(super) fn is_playing(&self) -> bool {
        self.state.borrow().scope.is_some()
    }

    pub(super) fn outer(&self) -> TransactionStrategy {
        TransactionStrategy::upgrade(&self.outer)
    }

    pub(super) fn child(&self) -> Option<TransactionStrategy> {
        self.state.borrow().child.clone()
    }

    pub(super) fn native_transaction<T: 'static>(&self) -> Option<Ref<'_, T>> {
        Ref::filter_map(self.state.borrow(), |state| {
            state.transaction.as_any().downcast_ref::<T>()
        })
        .ok()
    }

    /// Reject the frame's input parameters if they do not fit the new
    /// transaction; the transaction is released in that case.
    pub(super) fn validate_in_parameters(&self) -> Result<()> {
        let in_parameters = self.context.in_parameters();
        let checked = self.check_compatibility(&in_parameters, Incompatibility::InputParameters);
        if let Err(error) = checked {
            if let Err(release_error) = self.state.borrow_mut().transaction.release() {
                log::warn!(
                    "Failed to release transaction after rejecting input parameters: {}",
                    release_error
                );
            }
            return Err(error);
        }
        Ok(())
    }

    pub(super) fn commit(&self) -> Result<()> {
        self.state.borrow_mut().transaction.commit()?;
        log::debug!("{} transaction strategy committed", self.kind());
        Ok(())
    }

    pub(super) fn rollback(&self) -> Result<()> {
        self.state.borrow_mut().transaction.rollback()?;
        log::debug!("{} transaction strategy rolled back", self.kind());
        Ok(())
    }

    pub(super) fn check_compatibility(
        &self,
        objects: &[Value],
        target: Incompatibility,
    ) -> Result<()> {
        let checked = self.state.borrow().transaction.ensure_compatibility(objects);
        checked.map_err(|cause| TransactionError::incompatible(target, cause))
    }

    pub(super) fn create_native_child(&self) -> Result<Box<dyn NativeTransaction>> {
        Ok(self.state.borrow_mut().transaction.create_child()?)
    }

    fn create_transaction(&self) -> Result<Box<dyn NativeTransaction>> {
        match &self.source {
            TransactionSource::Factory(factory) => Ok(factory.create()?),
            TransactionSource::Outer => self.outer().create_native_child(),
        }
    }

    pub(super) fn reset(&self) -> Result<()> {
        if self.child().is_some() {
            return Err(TransactionError::invalid_transition(
                "Reset may not be invoked while a child transaction strategy is registered.",
            ));
        }

        let was_playing = self.is_playing();
        if was_playing {
            self.leave_scope()?;
        }
        self.state.borrow_mut().transaction.release()?;

        // On failure the released transaction stays in place.
        let transaction = self.create_transaction()?;
        self.state.borrow_mut().transaction = transaction;
        log::debug!("{} transaction strategy reset its transaction", self.kind());

        if was_playing {
            self.enter_scope()?;
        }

        let variables = self.context.variables();
        self.check_compatibility(&variables, Incompatibility::Variables)
    }

    pub(super) fn create_child(
        &self,
        this: &TransactionStrategy,
        auto_commit: bool,
        context: Rc<dyn ExecutionContext>,
    ) -> Result<TransactionStrategy> {
        if self.child().is_some() {
            return Err(TransactionError::invalid_transition(
                "The transaction strategy already has an active child transaction strategy. \
                 This child transaction strategy must first be unregistered before invoking \
                 CreateChildTransactionStrategy again.",
            ));
        }

        let transaction = self.create_native_child()?;
        let child = TransactionStrategy::from_scoped(ScopedStrategy::new(
            TransactionSource::Outer,
            this,
            auto_commit,
            Rc::clone(&context),
            transaction,
        ))?;
        self.state.borrow_mut().child = Some(child.clone());
        log::debug!("{} transaction strategy registered a child", self.kind());

        if self.is_playing() {
            // The child is already registered, so a failure here cannot be undone.
            child
                .on_execution_play(&*context, &NullExecutionListener)
                .map_err(TransactionError::teardown_fault)?;
        }
        Ok(child)
    }

    pub(super) fn unregister_child(&self, child: &TransactionStrategy) -> Result<()> {
        let mut state = self.state.borrow_mut();
        match &state.child {
            Some(current) if current.ptr_eq(child) => {
                state.child = None;
                Ok(())
            }
            _ => Err(TransactionError::invalid_transition(
                "Unregistering a child transaction strategy that is different from the presently registered strategy is not supported.",
            )),
        }
    }

    fn enter_scope(&self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let scope = state.transaction.enter_scope()?;
        state.scope = Some(scope);
        Ok(())
    }

    fn leave_scope(&self) -> Result<()> {
        let scope = self.state.borrow_mut().scope.take();
        match scope {
            Some(scope) => Ok(scope.leave()?),
            None => Ok(()),
        }
    }

    /// Release the native transaction; a Child then leaves its outer strategy
    fn release_transaction(&self, this: &TransactionStrategy) -> Result<()> {
        self.state.borrow_mut().transaction.release()?;
        if let TransactionSource::Outer = self.source {
            self.outer().unregister_child_transaction_strategy(this)?;
        }
        Ok(())
    }

    fn leave_and_release(&self, this: &TransactionStrategy) -> Result<()> {
        let left = self.leave_scope();
        let released = self.release_transaction(this);
        match (left, released) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(error), Ok(())) | (Ok(()), Err(error)) => Err(error),
            (Err(left), Err(released)) => Err(TransactionError::double_fault(left, released)),
        }
    }

    pub(super) fn on_execution_play(
        &self,
        context: &dyn ExecutionContext,
        listener: &dyn ExecutionListener,
    ) -> Result<()> {
        if self.is_playing() {
            return Err(TransactionError::invalid_transition(
                "OnExecutionPlay may not be invoked twice without calling OnExecutionStop, \
                 OnExecutionPause, or OnExecutionFail in-between.",
            ));
        }

        self.enter_scope()?;
        log::debug!("{} transaction strategy entered its scope", self.kind());

        let notified = match self.child() {
            Some(child) => child.on_execution_play(context, listener),
            None => listener.on_execution_play(context),
        };
        if let Err(error) = notified {
            return settle(Err(error), self.leave_scope());
        }
        Ok(())
    }

    pub(super) fn on_execution_stop(
        &self,
        this: &TransactionStrategy,
        context: &dyn ExecutionContext,
        listener: &dyn ExecutionListener,
    ) -> Result<()> {
        if !self.is_playing() {
            return Err(TransactionError::invalid_transition(
                "OnExecutionStop may not be invoked unless OnExecutionPlay was called first.",
            ));
        }

        let completed = self.complete(context, listener);
        let torn_down = self.leave_and_release(this);
        log::debug!("{} transaction strategy stopped", self.kind());
        settle(completed, torn_down)
    }

    /// Steps of a successful stop that run before the teardown
    fn complete(
        &self,
        context: &dyn ExecutionContext,
        listener: &dyn ExecutionListener,
    ) -> Result<()> {
        match self.child() {
            Some(child) => child.on_execution_stop(context, listener)?,
            None => listener.on_execution_stop(context)?,
        }

        if self.auto_commit {
            self.commit()?;
        }

        let out_parameters = self.context.out_parameters();
        self.outer()
            .check_compatibility(&out_parameters, Incompatibility::OutputParameters)
    }

    pub(super) fn on_execution_pause(
        &self,
        context: &dyn ExecutionContext,
        listener: &dyn ExecutionListener,
    ) -> Result<()> {
        if !self.is_playing() {
            return Err(TransactionError::invalid_transition(
                "OnExecutionPause may not be invoked unless OnExecutionPlay was called first.",
            ));
        }

        let notified = match self.child() {
            Some(child) => child.on_execution_pause(context, listener),
            None => listener.on_execution_pause(context),
        };
        let left = self.leave_scope();
        log::debug!("{} transaction strategy paused", self.kind());
        settle(notified, left)
    }

    pub(super) fn on_execution_fail(
        &self,
        this: &TransactionStrategy,
        context: &dyn ExecutionContext,
        listener: &dyn ExecutionListener,
        error: &dyn Error,
    ) -> Result<()> {
        if !self.is_playing() {
            return Err(TransactionError::invalid_transition(
                "OnExecutionFail may not be invoked unless OnExecutionPlay was called first.",
            ));
        }

        let notified = match self.child() {
            Some(child) => child.on_execution_fail(context, listener, error),
            None => listener.on_execution_fail(context, error),
        };
        let torn_down = self.leave_and_release(this);
        log::debug!("{} transaction strategy failed: {}", self.kind(), error);
        settle(notified, torn_down)
    }
}

/// Merge the outcome of a notification step with the teardown after it
fn settle(notified: Result<()>, torn_down: Result<()>) -> Result<()> {
    match (notified, torn_down) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(error), Ok(())) => Err(error),
        (Err(error), Err(teardown_error)) => {
            Err(TransactionError::double_fault(error, teardown_error))
        }
        (Ok(()), Err(teardown_error)) => Err(TransactionError::teardown_fault(teardown_error)),
    }
}
